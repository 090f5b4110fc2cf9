//! Static GPU price catalog
//!
//! The provider CLI has no pricing command, so adapters without a live
//! pricing source report this list.

use gantry_core::domain::instance::GpuPricing;

pub fn default_pricing() -> Vec<GpuPricing> {
    vec![
        entry("RTX 4090", 0.50, "24GB", "83.0 TFLOPS"),
        entry("A100", 2.00, "40GB", "312 TFLOPS"),
        entry("H100", 4.00, "80GB", "1000 TFLOPS"),
    ]
}

fn entry(gpu_type: &str, price_per_hour: f64, memory: &str, compute: &str) -> GpuPricing {
    GpuPricing {
        gpu_type: gpu_type.to_string(),
        price_per_hour,
        memory: memory.to_string(),
        compute: compute.to_string(),
    }
}
