//! Strategy: conservative costing, the profit gate, and the path ledger
//! that remembers which conversions lose money.

pub mod cost;
pub mod gate;
pub mod paths;
