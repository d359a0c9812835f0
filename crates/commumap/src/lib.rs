pub mod availability;
pub mod config;
pub mod error;
pub mod telemetry;
