//! Relevé: meter-reading tracker with hierarchical period comparison.
//!
//! The core answers one question: how did consumption for a category
//! hierarchy change between two periods, and which readings breached their
//! bounds. Storage is a synchronous SQLite layer; everything above it is a
//! pure function of a loaded snapshot.

pub mod aggregate;
pub mod categories;
pub mod compare;
pub mod db;
mod error;
pub mod export;
pub mod graph;
pub mod hierarchy;
mod id;
mod logging;
pub mod meters;
pub mod parameters;
pub mod readings;
pub mod report;
pub mod thresholds;

pub use error::{AppError, AppResult};
pub use logging::{init_logging, LOG_ENV_VAR};
