//! # Dispatcher Module
//!
//! The dispatcher drives one request through the route table: match the
//! path, pick the endpoint for the verb, bind and validate parameters,
//! run the permission gate, invoke the callback, and normalize whatever
//! comes back into a [`RestResponse`](crate::response::RestResponse).
//!
//! Every exit path from [`Dispatcher::dispatch`] is a response; handler
//! errors and panics never cross into the server façade un-normalized.
//!
//! ## Extension points
//!
//! Three typed hook slots replace a string-keyed event bus:
//!
//! - **pre-dispatch**: a non-`None` return short-circuits the whole
//!   pipeline and is returned verbatim (caching, mocking).
//! - **permission override**: may supply a decision before the endpoint's
//!   own permission callback is consulted.
//! - **dispatch override**: may supply the handler result just before
//!   invocation (interception, logging).
//! - **post-dispatch**: transforms every outgoing response, including
//!   errors and 404s.

mod core;

pub use core::{
    Dispatcher, DispatchOverrideHook, PermissionOverrideHook, PostDispatchHook, PreDispatchHook,
};
