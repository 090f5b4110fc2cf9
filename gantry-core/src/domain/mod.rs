//! Core domain types
//!
//! This module contains the core domain structures used across Gantry crates.
//! The orchestrator persists and advances them, the provider crate reports
//! instance snapshots with them.

pub mod event;
pub mod instance;
pub mod job;
