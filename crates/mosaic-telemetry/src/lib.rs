//! Mosaic Telemetry - logging setup for the mosaic runtime.
//!
//! The runtime itself only emits `tracing` events. Hosts call
//! [`setup_logging`] once at startup to decide where those events go.
//!
//! # Example
//!
//! ```rust,no_run
//! use mosaic_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), mosaic_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("mosaic_runtime=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("host page ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};
