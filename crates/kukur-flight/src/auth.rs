//! Authentication hook (§4.7): validates an HTTP Basic `authorization`
//! header against the API-key store before any RPC handler runs.
//!
//! `kukur/flight.py` authenticates through pyarrow's legacy
//! `ServerAuthHandler` handshake. `arrow-flight`'s tonic transport instead
//! exposes per-call gRPC metadata, so the same check — reject unless
//! `(name, key)` validates — is applied as a `tonic::service::Interceptor`
//! that runs ahead of every RPC, preserving "rejected before any handler is
//! invoked" (S6).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use kukur_app::Kukur;
use tonic::metadata::MetadataMap;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Installed when `flight.authentication` is configured truthy.
#[derive(Clone)]
pub struct BasicAuthInterceptor {
    app: Arc<Kukur>,
}

impl BasicAuthInterceptor {
    pub fn new(app: Arc<Kukur>) -> Self {
        BasicAuthInterceptor { app }
    }
}

impl Interceptor for BasicAuthInterceptor {
    fn call(&mut self, request: Request<()>) -> std::result::Result<Request<()>, Status> {
        let (name, key) = extract_basic_auth(request.metadata())?;
        if !self.app.api_keys().has_api_key(&name).unwrap_or(false) {
            return Err(Status::unauthenticated("invalid token"));
        }
        if !self.app.api_keys().validate(&name, &key).unwrap_or(false) {
            return Err(Status::unauthenticated("invalid token"));
        }
        Ok(request)
    }
}

/// Installed when authentication is disabled — mirrors
/// `KukurServerNoAuthHandler`, accepting every call unconditionally.
#[derive(Clone, Default)]
pub struct NoAuthInterceptor;

impl Interceptor for NoAuthInterceptor {
    fn call(&mut self, request: Request<()>) -> std::result::Result<Request<()>, Status> {
        Ok(request)
    }
}

fn extract_basic_auth(metadata: &MetadataMap) -> std::result::Result<(String, String), Status> {
    let header = metadata
        .get("authorization")
        .ok_or_else(|| Status::unauthenticated("invalid token"))?
        .to_str()
        .map_err(|_| Status::unauthenticated("invalid token"))?;

    let encoded = header
        .strip_prefix("Basic ")
        .ok_or_else(|| Status::unauthenticated("invalid token"))?;
    let decoded = BASE64_STANDARD
        .decode(encoded)
        .map_err(|_| Status::unauthenticated("invalid token"))?;
    let decoded = String::from_utf8(decoded).map_err(|_| Status::unauthenticated("invalid token"))?;

    let (name, key) = decoded
        .split_once(':')
        .ok_or_else(|| Status::unauthenticated("invalid username"))?;
    if name.is_empty() {
        return Err(Status::unauthenticated("invalid username"));
    }
    if key.is_empty() {
        return Err(Status::unauthenticated("invalid password"));
    }
    Ok((name.to_string(), key.to_string()))
}
