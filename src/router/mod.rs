//! # Router Module
//!
//! Route registration and path matching for the dispatch core.
//!
//! Routes are registered under a namespace with a regex path pattern
//! containing named capture groups, e.g.
//! `register_route("wp/v2", "/posts/(?P<id>\d+)", ...)`. Each route holds
//! an ordered list of endpoint descriptors: the method set, a handler
//! callback, a per-argument schema (required flag, default, enum,
//! sanitize/validate callbacks), and an optional permission gate.
//!
//! Matching is a full-string, case-insensitive regex test run in
//! registration order: the first pattern that matches wins, with no
//! specificity scoring. Callers that register overlapping patterns must
//! register the more specific one first.
//!
//! The table is built once at startup and is read-only afterwards, so it
//! can be shared across threads behind an `Arc` without locking.

mod core;

pub use core::{
    ArgSchema, CaptureVec, Endpoint, EndpointCallback, HandlerFn, HandlerValue, IndexInfo,
    PermissionFn, RouteEntry, RouteRegistration, RouteTable, SanitizeFn, SchemaFn, ValidateFn,
    MAX_INLINE_CAPTURES,
};
