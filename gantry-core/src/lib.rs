//! Gantry Core
//!
//! Core types and abstractions for the Gantry GPU job system.
//!
//! This crate contains:
//! - Domain types: Job, its lifecycle states and the transition table
//! - Provider snapshots: instance status, availability, pricing, metrics
//! - DTOs: Data transfer objects for the submission path and status views

pub mod domain;
pub mod dto;
