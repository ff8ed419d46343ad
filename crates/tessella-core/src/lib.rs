//! Tessella Core Library
//!
//! Domain models, error types, configuration, and shared constants used by
//! every Tessella component: the asset record and its status machine, the
//! open metadata map keys, and the application-wide error taxonomy.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{AppError, LogLevel};
pub use models::{meta, Asset, AssetStatus, IngestReceipt, NewAsset};
