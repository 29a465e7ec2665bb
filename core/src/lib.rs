//! Synthetic timesheet anomaly lab: a seeded behaviour generator and an
//! ensemble detector that tries to recover the planted anomalies.

pub mod calendar;
pub mod composite;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod features;
pub mod flagger;
pub mod isolation;
pub mod kmeans;
pub mod rng;
pub mod roster;
pub mod scaler;
pub mod sink;
pub mod stats;
pub mod store;
pub mod synth;
pub mod types;
pub mod validation;
