//! The Arrow Flight RPC surface (C8): Action-mode JSON control plane
//! (`search`, `get_metadata`, `get_source_structure`, `list_sources`),
//! Get-mode Arrow data plane (`get_data`, `get_plot_data`), and a
//! Basic-auth gate in front of both.

mod action;
mod auth;
mod get;
mod json;
mod server;
mod service;

pub use auth::{BasicAuthInterceptor, NoAuthInterceptor};
pub use server::serve;
pub use service::KukurFlightService;
