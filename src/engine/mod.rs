//! Core engine: snapshot, scan, gate, route, reconcile.
//!
//! `scheduler` owns one cycle end to end and drives the other modules;
//! everything else here is a single stage of that pipeline.

pub mod blocks;
pub mod executor;
pub mod momentum;
pub mod scanner;
pub mod scheduler;
pub mod validator;
