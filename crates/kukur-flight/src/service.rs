//! `KukurFlightService`: the Arrow Flight RPC surface binding the Action
//! and Get handlers to `tonic`'s `FlightService` trait. Grounded in
//! `kukur/flight.py::JSONFlightServer`/`KukurFlightServer`, adapted from
//! pyarrow's `do_get`/`do_action` dispatch to the generated tonic trait.

use std::pin::Pin;
use std::sync::Arc;

use arrow_flight::flight_service_server::FlightService;
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
};
use futures::{Stream, StreamExt};
use kukur_app::Kukur;
use kukur_core::KukurError;
use tonic::{Request, Response, Status, Streaming};

use crate::action;
use crate::get;

pub struct KukurFlightService {
    app: Arc<Kukur>,
}

impl KukurFlightService {
    pub fn new(app: Arc<Kukur>) -> Self {
        KukurFlightService { app }
    }
}

pub type TonicResult<T> = std::result::Result<T, Status>;
type ResultStream<T> = Pin<Box<dyn Stream<Item = TonicResult<T>> + Send + 'static>>;

fn to_status(err: KukurError) -> Status {
    match err {
        KukurError::UnknownSource(msg) => Status::not_found(msg),
        KukurError::InvalidSource(msg) | KukurError::InvalidConfiguration(msg) => {
            Status::invalid_argument(msg)
        }
        KukurError::InvalidData(msg) | KukurError::InvalidMetadata(msg) => {
            Status::invalid_argument(msg)
        }
        KukurError::NotSupported(msg) => Status::unimplemented(msg),
        KukurError::Timeout(msg) => Status::deadline_exceeded(msg),
        KukurError::Transient(err) => Status::unavailable(err.to_string()),
        KukurError::Unauthenticated(msg) => Status::unauthenticated(msg),
    }
}

#[tonic::async_trait]
impl FlightService for KukurFlightService {
    type HandshakeStream = ResultStream<HandshakeResponse>;
    type ListFlightsStream = ResultStream<FlightInfo>;
    type DoGetStream = ResultStream<FlightData>;
    type DoPutStream = ResultStream<PutResult>;
    type DoActionStream = ResultStream<arrow_flight::Result>;
    type ListActionsStream = ResultStream<ActionType>;
    type DoExchangeStream = ResultStream<FlightData>;

    /// Authentication runs entirely in the interceptor layer (see
    /// `auth.rs`); the handshake RPC itself is unused by this server and
    /// echoes nothing back.
    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> TonicResult<Response<Self::HandshakeStream>> {
        Err(Status::unimplemented("handshake is not used; authenticate via Basic auth metadata"))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> TonicResult<Response<Self::ListFlightsStream>> {
        Err(Status::unimplemented("list_flights is not supported"))
    }

    async fn get_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> TonicResult<Response<FlightInfo>> {
        Err(Status::unimplemented("get_flight_info is not supported"))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> TonicResult<Response<PollInfo>> {
        Err(Status::unimplemented("poll_flight_info is not supported"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> TonicResult<Response<SchemaResult>> {
        Err(Status::unimplemented("get_schema is not supported"))
    }

    /// The data plane: a JSON ticket selects `get_data` or `get_plot_data`
    /// and the response streams Arrow `FlightData`.
    async fn do_get(&self, request: Request<Ticket>) -> TonicResult<Response<Self::DoGetStream>> {
        let ticket = request.into_inner();
        let stream = get::handle_ticket(&self.app, &ticket.ticket)
            .await
            .map_err(to_status)?
            .map(|item| item.map_err(|e| Status::internal(e.to_string())));
        Ok(Response::new(Box::pin(stream)))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> TonicResult<Response<Self::DoPutStream>> {
        Err(Status::unimplemented("there is no write path"))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> TonicResult<Response<Self::DoExchangeStream>> {
        Err(Status::unimplemented("do_exchange is not supported"))
    }

    /// The control plane: `search`, `get_metadata`, `get_source_structure`,
    /// `list_sources`, each taking and returning JSON. `search`'s results
    /// are forwarded as a lazy stream straight from the dispatcher, rather
    /// than collected into a `Vec` first — a large or slow search must not
    /// be fully materialized in memory before the first result is sent.
    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> TonicResult<Response<Self::DoActionStream>> {
        let action_request = request.into_inner();
        let app = self.app.clone();

        match action_request.r#type.as_str() {
            action::SEARCH => {
                let stream = action::search(&app, &action_request.body).map_err(to_status)?;
                let results = stream.map(|body| {
                    body.map(|body| arrow_flight::Result { body: body.into() })
                        .map_err(to_status)
                });
                Ok(Response::new(Box::pin(results)))
            }
            action::GET_METADATA => {
                let body = action::get_metadata(&app, &action_request.body)
                    .await
                    .map_err(to_status)?;
                let result = arrow_flight::Result { body: body.into() };
                Ok(Response::new(Box::pin(futures::stream::iter(vec![Ok(result)]))))
            }
            action::GET_SOURCE_STRUCTURE => {
                let body = action::get_source_structure(&app, &action_request.body)
                    .await
                    .map_err(to_status)?;
                let result = arrow_flight::Result { body: body.into() };
                Ok(Response::new(Box::pin(futures::stream::iter(vec![Ok(result)]))))
            }
            action::LIST_SOURCES => {
                let body = action::list_sources(&app).map_err(to_status)?;
                let result = arrow_flight::Result { body: body.into() };
                Ok(Response::new(Box::pin(futures::stream::iter(vec![Ok(result)]))))
            }
            other => Err(Status::invalid_argument(format!("unknown action \"{other}\""))),
        }
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<Self::ListActionsStream>> {
        let actions = action::ALL_ACTIONS.iter().map(|name| {
            Ok(ActionType {
                r#type: name.to_string(),
                description: String::new(),
            })
        });
        Ok(Response::new(Box::pin(futures::stream::iter(actions))))
    }
}
