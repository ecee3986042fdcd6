//! Library entrypoint: re‑export modules

pub mod config;
pub mod errors;
pub mod geo;
pub mod metrics;
pub mod pipeline;
pub mod record;
