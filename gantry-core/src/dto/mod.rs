//! Data Transfer Objects
//!
//! Request and response shapes used by the submission path.

pub mod job;
