//! Core types and pure computations for the pharmacy analytics dashboard.
//!
//! Holds the record models, error types, CLI settings, calendar-period
//! helpers, percentile and forecasting maths, number formatting and the
//! persisted alert cooldown state. Nothing in this crate touches the data
//! sources directly.

pub mod alerts;
pub mod data_processors;
pub mod error;
pub mod forecast;
pub mod formatting;
pub mod models;
pub mod percentile;
pub mod settings;
pub mod time_utils;
