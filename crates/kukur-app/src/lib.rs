//! The application facade (C6 + C9 + C10): configuration loading, logging
//! setup, and the `Kukur` struct that wires a built source registry to an
//! API-key repository.

mod app;
mod config;
mod logging;

pub use app::Kukur;
pub use config::from_toml;
pub use logging::{configure as configure_logging, LoggingGuard};
