//! Refresh runtime for the pharmacy dashboard.
//!
//! Caches analysis passes behind a TTL and drives periodic refreshes for the
//! watch view.

pub mod data_manager;
pub mod orchestrator;

pub use pharmacy_core as core;
pub use pharmacy_data as data;
