//! # Observability
//!
//! Structured logging for the bootstrap run. Progress and outcome of every
//! reconciliation are narrated through `tracing`.

pub mod logging;

pub use logging::init_logging;
