//! # restgate
//!
//! **restgate** is a REST request-dispatch core for Rust: a regex route
//! table with named capture groups, a linear dispatcher with argument
//! validation and permission gates, and a server façade that shapes
//! responses (hypermedia links, `_embed`, `_envelope`, JSONP) before they
//! hit the wire. The HTTP transport runs on the `may` coroutine runtime
//! via `may_minihttp`.
//!
//! ## Architecture
//!
//! - **[`request`]** - [`RestRequest`]: a uniform, lazily-parsed view over
//!   an inbound call with five prioritized parameter buckets
//!   (JSON > body > query > URL captures > route defaults).
//! - **[`response`]** - [`RestResponse`]: status, headers, JSON data, and
//!   typed link relations with an RFC 5988 `Link:` header renderer.
//! - **[`router`]** - [`RouteTable`]: namespaced registration of regex
//!   patterns to endpoint descriptors, first-match-wins in registration
//!   order, plus the machine-readable self-description indexes.
//! - **[`dispatcher`]** - [`Dispatcher`]: the match → sanitize → validate
//!   → permission → invoke pipeline; every exit path is a response.
//! - **[`server`]** - [`RestService`]: transport adapter, authentication
//!   provider chain, link embedding via internal sub-dispatch, response
//!   enveloping, and JSONP output.
//! - **[`auth`]** - the [`AuthProvider`] contract (no opinion / explicit
//!   pass / structured error) and a sample API-key provider.
//! - **[`error`]** - [`RestError`]: stable code + message + data, with
//!   multi-error aggregation under `additional_errors`.
//!
//! ## Request Handling Flow
//!
//! 1. `RestService` translates the raw HTTP request into a `RestRequest`
//!    (canonicalized headers, query bucket, raw body, form decoding).
//! 2. The authentication chain runs; a structured error aborts dispatch.
//! 3. `Dispatcher::dispatch` walks the route table in registration order.
//!    The first pattern that full-matches the path wins; within it, the
//!    first endpoint answering the verb (`HEAD` aliased to `GET`) is
//!    selected.
//! 4. URL captures, attributes, and per-argument defaults are bound onto
//!    the request; sanitize callbacks rewrite values in place; required
//!    and validate failures aggregate into a single 400-class error.
//! 5. The permission gate and the handler callback run; plain JSON values
//!    are wrapped in a 200 response, errors in error responses.
//! 6. The façade adds `Allow` and `Link` headers, resolves embeddable
//!    links one level deep, optionally envelopes, serializes, and writes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restgate::{
//!     ArgSchema, Dispatcher, Endpoint, HttpServer, RestService, RouteTable, ServiceConfig,
//! };
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut table = RouteTable::new();
//! table.register_route(
//!     "demo/v1",
//!     r"/posts/(?P<id>\d+)",
//!     Endpoint::new("GET", |req: &mut restgate::RestRequest| {
//!         let id = req.get_param("id").cloned();
//!         Ok(json!({ "id": id }))
//!     })
//!     .arg("id", ArgSchema::required()),
//!     false,
//! )?;
//!
//! let service = RestService::new(Dispatcher::new(table), ServiceConfig::default());
//! let handle = HttpServer(service).start("0.0.0.0:8080")?;
//! handle.join().ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Runtime Considerations
//!
//! restgate uses the `may` coroutine runtime, not tokio. Connection
//! coroutine stack size is configurable via `RESTGATE_STACK_SIZE`. The
//! route table is built once at startup and shared read-only behind an
//! `Arc`; each request/response pair is confined to one logical call.

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod request;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod server;

pub use auth::{ApiKeyAuth, AuthProvider};
pub use config::ServiceConfig;
pub use dispatcher::Dispatcher;
pub use error::RestError;
pub use request::{canonicalize_header_name, ParamSource, RestRequest};
pub use response::{Link, RestResponse};
pub use router::{
    ArgSchema, Endpoint, EndpointCallback, HandlerValue, IndexInfo, RouteRegistration, RouteTable,
};
pub use server::{HttpServer, RestService, ServerHandle};
