//! Dispatcher core - the per-request match/validate/invoke state machine.

use crate::error::RestError;
use crate::request::RestRequest;
use crate::response::RestResponse;
use crate::router::{CaptureVec, Endpoint, EndpointCallback, HandlerValue, RouteTable};
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Short-circuit hook consulted before any matching happens. A `Some`
/// return is used verbatim as the response.
pub type PreDispatchHook = Arc<dyn Fn(&RestRequest) -> Option<RestResponse> + Send + Sync>;

/// Hook consulted just before callback invocation; a `Some` return
/// replaces the callback's result.
pub type DispatchOverrideHook =
    Arc<dyn Fn(&mut RestRequest) -> Option<Result<HandlerValue, RestError>> + Send + Sync>;

/// Hook that may decide permissions before the endpoint's own callback.
pub type PermissionOverrideHook =
    Arc<dyn Fn(&RestRequest, &Endpoint) -> Option<Result<bool, RestError>> + Send + Sync>;

/// Transform applied to every outgoing response.
pub type PostDispatchHook = Arc<dyn Fn(&RestRequest, RestResponse) -> RestResponse + Send + Sync>;

/// Matches requests against a read-only route table and runs the matched
/// endpoint. One request in, exactly one response out, synchronously; the
/// only nested call is the façade's link-embedding sub-dispatch, which
/// re-enters this same dispatcher one level deep.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    pre_dispatch: Option<PreDispatchHook>,
    dispatch_override: Option<DispatchOverrideHook>,
    permission_override: Option<PermissionOverrideHook>,
    post_dispatch: Option<PostDispatchHook>,
}

impl Dispatcher {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: Arc::new(table),
            pre_dispatch: None,
            dispatch_override: None,
            permission_override: None,
            post_dispatch: None,
        }
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub fn set_pre_dispatch<F>(&mut self, hook: F)
    where
        F: Fn(&RestRequest) -> Option<RestResponse> + Send + Sync + 'static,
    {
        self.pre_dispatch = Some(Arc::new(hook));
    }

    pub fn set_dispatch_override<F>(&mut self, hook: F)
    where
        F: Fn(&mut RestRequest) -> Option<Result<HandlerValue, RestError>> + Send + Sync + 'static,
    {
        self.dispatch_override = Some(Arc::new(hook));
    }

    pub fn set_permission_override<F>(&mut self, hook: F)
    where
        F: Fn(&RestRequest, &Endpoint) -> Option<Result<bool, RestError>> + Send + Sync + 'static,
    {
        self.permission_override = Some(Arc::new(hook));
    }

    pub fn set_post_dispatch<F>(&mut self, hook: F)
    where
        F: Fn(&RestRequest, RestResponse) -> RestResponse + Send + Sync + 'static,
    {
        self.post_dispatch = Some(Arc::new(hook));
    }

    /// Dispatch a request. The request's `route` holds the path to match;
    /// the dispatcher fills in URL captures, attributes, and defaults as
    /// a side effect of matching.
    pub fn dispatch(&self, req: &mut RestRequest) -> RestResponse {
        if let Some(hook) = &self.pre_dispatch {
            if let Some(early) = hook(req) {
                debug!(path = %req.route(), "Pre-dispatch hook supplied a response");
                return self.finish(req, early);
            }
        }

        let path = req.route().to_string();
        let method = req.method().clone();
        // HEAD dispatches through GET handlers; the request keeps its real
        // method for handler logic.
        let checked_method = if method == Method::HEAD {
            Method::GET
        } else {
            method.clone()
        };
        debug!(method = %method, path = %path, "Route match attempt");

        let mut matched: Option<(usize, usize, CaptureVec)> = None;
        'routes: for (entry_idx, entry) in self.table.routes().iter().enumerate() {
            let Some(captures) = entry.matches(&path) else {
                continue;
            };
            for (endpoint_idx, endpoint) in entry.endpoints().iter().enumerate() {
                if endpoint.methods.contains(&checked_method) {
                    matched = Some((entry_idx, endpoint_idx, captures));
                    break 'routes;
                }
            }
            // The path matched but no endpoint answers this method; a
            // later route may still claim the request.
        }

        let Some((entry_idx, endpoint_idx, captures)) = matched else {
            warn!(method = %method, path = %path, "No route matched");
            let err = RestError::new(
                "rest_no_route",
                "No route was found matching the URL and request method.",
            )
            .with_status(404);
            return self.finish(req, RestResponse::from_error(&err));
        };

        let entry = &self.table.routes()[entry_idx];
        let endpoint = Arc::clone(&entry.endpoints()[endpoint_idx]);
        info!(
            method = %method,
            path = %path,
            route = %entry.full_pattern(),
            endpoint = endpoint_idx,
            "Route matched"
        );

        if endpoint.callback.is_none() {
            error!(route = %entry.full_pattern(), "Matched endpoint has no invocable callback");
            let err = RestError::new(
                "rest_invalid_handler",
                "The handler for the route is invalid.",
            )
            .with_status(500);
            return self.finish(req, RestResponse::from_error(&err));
        }

        // Parameter binding: URL captures become the URL bucket, the
        // descriptor becomes the request attributes, then sanitize,
        // defaults, validate.
        let mut url_params = HashMap::new();
        for (name, value) in &captures {
            url_params.insert(name.to_string(), Value::String(value.clone()));
        }
        req.set_url_params(url_params);
        req.set_attributes(Arc::clone(&endpoint));

        if let Err(err) = req.sanitize_params() {
            debug!(path = %path, code = err.code(), "Parameter sanitization failed");
            return self.finish(req, RestResponse::from_error(&err));
        }

        let mut defaults = HashMap::new();
        for (name, arg) in &endpoint.args {
            if let Some(default) = &arg.default {
                defaults.insert(name.clone(), default.clone());
            }
        }
        req.set_default_params(defaults);

        if let Err(err) = req.has_valid_params() {
            debug!(path = %path, code = err.code(), "Parameter validation failed");
            return self.finish(req, RestResponse::from_error(&err));
        }

        // Permission gate: an explicit error propagates as-is, a false
        // decision becomes a 403, no callback means allow.
        let decision = match &self.permission_override {
            Some(hook) => hook(req, &endpoint),
            None => None,
        };
        let decision = match decision {
            Some(d) => Some(d),
            None => endpoint.permission.as_ref().map(|cb| cb(req)),
        };
        match decision {
            Some(Err(err)) => {
                warn!(path = %path, code = err.code(), "Permission callback returned an error");
                return self.finish(req, RestResponse::from_error(&err));
            }
            Some(Ok(false)) => {
                warn!(path = %path, "Permission denied");
                let err = RestError::new(
                    "rest_forbidden",
                    "Sorry, you are not allowed to do that.",
                )
                .with_status(403);
                return self.finish(req, RestResponse::from_error(&err));
            }
            _ => {}
        }

        let overridden = match &self.dispatch_override {
            Some(hook) => hook(req),
            None => None,
        };
        let result = match overridden {
            Some(result) => {
                debug!(path = %path, "Dispatch override hook supplied a result");
                result
            }
            None => self.invoke(&endpoint, req),
        };

        let mut response = match result {
            Ok(HandlerValue::Response(resp)) => resp,
            // A falsy-but-not-error value is still a normal 200.
            Ok(HandlerValue::Value(value)) => RestResponse::ok(value),
            Err(err) => RestResponse::from_error(&err),
        };
        response.set_matched_route(entry.pattern());
        response.set_matched_handler(endpoint_idx);
        info!(
            method = %method,
            path = %path,
            status = response.status(),
            "Request dispatched"
        );
        self.finish(req, response)
    }

    fn invoke(&self, endpoint: &Endpoint, req: &mut RestRequest) -> Result<HandlerValue, RestError> {
        match endpoint.callback.as_ref() {
            Some(EndpointCallback::Handler(callback)) => {
                match catch_unwind(AssertUnwindSafe(|| callback(req))) {
                    Ok(result) => result,
                    Err(panic) => {
                        error!(panic = %panic_message(&*panic), "Handler panicked");
                        Err(RestError::new(
                            "rest_internal_error",
                            "The handler failed unexpectedly.",
                        )
                        .with_status(500))
                    }
                }
            }
            Some(EndpointCallback::RootIndex) => Ok(HandlerValue::Value(self.table.index())),
            Some(EndpointCallback::NamespaceIndex(namespace)) => self
                .table
                .namespace_index(namespace)
                .map(HandlerValue::Value),
            None => Err(RestError::new(
                "rest_invalid_handler",
                "The handler for the route is invalid.",
            )
            .with_status(500)),
        }
    }

    fn finish(&self, req: &RestRequest, response: RestResponse) -> RestResponse {
        match &self.post_dispatch {
            Some(hook) => hook(req, response),
            None => response,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
