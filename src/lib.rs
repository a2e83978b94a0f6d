//! HOPPER: cost-gated multi-venue asset conversion engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod venues;
pub mod signals;
pub mod strategy;
pub mod engine;
pub mod storage;
pub mod dashboard;
