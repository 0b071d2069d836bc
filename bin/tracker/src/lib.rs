pub mod config;
pub mod metrics;
pub mod service;

pub use service::{run, spawn_fact_forwarder, Coordinator};
