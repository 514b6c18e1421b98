//! Observability surfaces for the Call Controller.
//!
//! Health endpoints live here; Prometheus metrics are recorded via the
//! `metrics` crate and rendered by `metrics-exporter-prometheus`.

pub mod health;

pub use health::{health_router, HealthState};
