//! Data layer for the pharmacy dashboard.
//!
//! Discovers and reads JSONL consultation and inventory exports, aggregates
//! consultations into period, severity and pharmacist metrics, derives
//! inventory figures and runs the full analysis pass.

pub mod aggregator;
pub mod analysis;
pub mod inventory;
pub mod reader;

pub use pharmacy_core as core;
