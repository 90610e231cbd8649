//! Binds host/port from configuration, installs the auth interceptor
//! chosen by `flight.authentication`, and serves `KukurFlightService`.
//! Grounded in `JSONFlightServer.__init__`'s `flight.host`/`flight.port`
//! defaults (`0.0.0.0:8081`).

use std::net::SocketAddr;
use std::sync::Arc;

use arrow_flight::flight_service_server::FlightServiceServer;
use kukur_app::Kukur;
use kukur_core::{KukurError, Result};

use crate::auth::{BasicAuthInterceptor, NoAuthInterceptor};
use crate::service::KukurFlightService;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8081;

/// Run the Flight server until the process is terminated.
pub async fn serve(config: &toml::Value, app: Arc<Kukur>) -> Result<()> {
    let addr = socket_addr(config)?;
    // Authentication is on by default; `[flight] authentication = false` is
    // the explicit opt-out for trusted deployments.
    let authenticated = config
        .get("flight")
        .and_then(|f| f.get("authentication"))
        .and_then(toml::Value::as_bool)
        .unwrap_or(true);

    tracing::info!(%addr, authenticated, "starting Flight server");

    let service = KukurFlightService::new(app.clone());

    if authenticated {
        let interceptor = BasicAuthInterceptor::new(app);
        let server = FlightServiceServer::with_interceptor(service, interceptor);
        tonic::transport::Server::builder()
            .add_service(server)
            .serve(addr)
            .await
            .map_err(|e| KukurError::Transient(anyhow::anyhow!(e)))
    } else {
        let interceptor = NoAuthInterceptor;
        let server = FlightServiceServer::with_interceptor(service, interceptor);
        tonic::transport::Server::builder()
            .add_service(server)
            .serve(addr)
            .await
            .map_err(|e| KukurError::Transient(anyhow::anyhow!(e)))
    }
}

fn socket_addr(config: &toml::Value) -> Result<SocketAddr> {
    let flight = config.get("flight");
    let host = flight
        .and_then(|f| f.get("host"))
        .and_then(toml::Value::as_str)
        .unwrap_or(DEFAULT_HOST);
    let port = flight
        .and_then(|f| f.get("port"))
        .and_then(toml::Value::as_integer)
        .map(|p| p as u16)
        .unwrap_or(DEFAULT_PORT);

    format!("{host}:{port}")
        .parse()
        .map_err(|e| KukurError::InvalidConfiguration(format!("invalid flight.host/port: {e}")))
}
