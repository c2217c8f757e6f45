#![forbid(unsafe_code)]

//! Client-side control plane for agent CLIs speaking newline-delimited JSON.

pub mod capability;
pub mod config;
pub mod control;
pub mod errors;
pub mod transport;

pub use capability::CapabilityRegistry;
pub use config::{ClientSettings, ControlConfig};
pub use control::client::ControlClient;
pub use errors::{AppError, Result};
