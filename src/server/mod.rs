//! # Server Module
//!
//! The boundary between the transport and the dispatch core.
//!
//! [`RestService`] implements `may_minihttp::HttpService`: it translates
//! the raw HTTP request into a [`RestRequest`](crate::request::RestRequest),
//! runs the authentication provider chain, invokes the
//! [`Dispatcher`](crate::dispatcher::Dispatcher), and applies the
//! cross-cutting response shaping — `_embed` link embedding, `_envelope`
//! wrapping, `_jsonp` output — before writing status, headers, and body
//! back to the wire. It is the only place an error response becomes
//! HTTP-visible.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_query_params, parse_request, HeaderVec, TransportRequest};
pub use service::{EmbedMode, RestService, WireResponse};
