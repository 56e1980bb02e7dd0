use super::request::{parse_request, TransportRequest};
use super::response::write_response;
use crate::auth::AuthProvider;
use crate::config::ServiceConfig;
use crate::dispatcher::Dispatcher;
use crate::error::RestError;
use crate::ids::RequestId;
use crate::request::RestRequest;
use crate::response::RestResponse;
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// Strict callback charset; anything outside [\w.] is rejected before
// dispatch so attacker-controlled names never reach the output.
static JSONP_CALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.]+$").expect("JSONP callback regex is valid"));

/// The shaped wire form of a response: status, header list (duplicates
/// allowed), and an optional body (`None` for HEAD and 204).
pub type WireResponse = (u16, Vec<(String, String)>, Option<Vec<u8>>);

/// Which link relations get eagerly resolved into `_embedded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedMode {
    Off,
    All,
    Rels(Vec<String>),
}

impl EmbedMode {
    fn wants(&self, rel: &str) -> bool {
        match self {
            EmbedMode::Off => false,
            EmbedMode::All => true,
            EmbedMode::Rels(rels) => rels.iter().any(|r| r == rel),
        }
    }
}

/// The server façade: owns the dispatcher, the authentication provider
/// chain, and the response-shaping pipeline.
#[derive(Clone)]
pub struct RestService {
    dispatcher: Arc<Dispatcher>,
    auth_providers: Vec<Arc<dyn AuthProvider>>,
    config: Arc<ServiceConfig>,
}

impl RestService {
    pub fn new(dispatcher: Dispatcher, config: ServiceConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            auth_providers: Vec::new(),
            config: Arc::new(config),
        }
    }

    pub fn register_auth_provider(&mut self, provider: Arc<dyn AuthProvider>) {
        self.auth_providers.push(provider);
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Translate the transport record into a dispatchable request:
    /// canonicalized headers, query bucket, raw body, and form decoding.
    pub fn build_request(&self, parts: TransportRequest) -> Result<RestRequest, RestError> {
        let method: Method = parts.method.parse().map_err(|_| {
            RestError::new("rest_invalid_method", "The request method is not recognized.")
                .with_status(400)
        })?;
        let mut req = RestRequest::new(method.clone(), parts.path);
        for (name, value) in &parts.headers {
            req.add_header(name, value.clone());
        }
        let mut query = HashMap::new();
        for (key, value) in parts.query {
            query.insert(key, Value::String(value));
        }
        req.set_query_params(query);
        if !parts.body.is_empty() {
            req.set_body(parts.body);
            if method == Method::POST
                && req.content_type().as_deref() == Some("application/x-www-form-urlencoded")
            {
                // The canonical form submit: the transport layer decodes
                // straight into the body bucket.
                let form: Vec<(String, String)> = url::form_urlencoded::parse(req.body())
                    .into_owned()
                    .collect();
                let mut body_params = HashMap::new();
                for (key, value) in form {
                    body_params.insert(key, Value::String(value));
                }
                req.set_body_params(body_params);
            } else {
                req.parse_body_params();
            }
        }
        Ok(req)
    }

    fn check_authentication(&self, req: &RestRequest) -> Option<RestError> {
        for provider in &self.auth_providers {
            match provider.authenticate(req) {
                Some(Err(err)) => {
                    warn!(code = err.code(), "Authentication rejected");
                    return Some(err);
                }
                Some(Ok(())) => {
                    debug!("Authentication accepted");
                    return None;
                }
                None => {}
            }
        }
        None
    }

    fn jsonp_callback(&self, req: &RestRequest) -> Result<Option<String>, RestError> {
        let raw = match req.query_params().get("_jsonp") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Ok(None),
        };
        if !self.config.jsonp_enabled {
            return Err(RestError::new(
                "rest_callback_disabled",
                "JSONP support is disabled on this site.",
            )
            .with_status(400));
        }
        if raw.is_empty() || !JSONP_CALLBACK.is_match(&raw) {
            return Err(RestError::new(
                "rest_callback_invalid",
                "The JSONP callback function is invalid.",
            )
            .with_status(400));
        }
        Ok(Some(raw))
    }

    /// Drive one transport record through authentication, dispatch, and
    /// response shaping. This is the full request lifecycle minus the
    /// socket, which makes it the natural seam for tests.
    pub fn serve(&self, parts: TransportRequest) -> WireResponse {
        let request_id = RequestId::from_header_or_new(
            parts
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("x-request-id"))
                .map(|(_, v)| v.as_str()),
        );
        let mut req = match self.build_request(parts) {
            Ok(req) => req,
            Err(err) => return self.error_wire(&err, &request_id),
        };
        info!(
            request_id = %request_id,
            method = %req.method(),
            path = %req.route(),
            "REST request received"
        );

        let jsonp = match self.jsonp_callback(&req) {
            Ok(callback) => callback,
            Err(err) => return self.error_wire(&err, &request_id),
        };

        // A structured error from the provider chain aborts dispatch
        // entirely and becomes the final response.
        let response = match self.check_authentication(&req) {
            Some(err) => RestResponse::from_error(&err),
            None => self.dispatcher.dispatch(&mut req),
        };
        self.shape(&req, response, jsonp, &request_id)
    }

    fn shape(
        &self,
        req: &RestRequest,
        mut response: RestResponse,
        jsonp: Option<String>,
        request_id: &RequestId,
    ) -> WireResponse {
        if response.matched_route().is_some() {
            if let Some(entry) = self.dispatcher.table().find_matching_entry(req.route()) {
                let allow: Vec<String> = entry
                    .allowed_methods()
                    .iter()
                    .map(|m| m.to_string())
                    .collect();
                response.set_header("Allow", allow.join(", "));
            }
        }

        let embed = embed_mode(req);
        let mut payload = self.response_to_data(&response, &embed);
        let mut status = response.status();
        let mut wire_headers: Vec<(String, String)> =
            vec![("X-Request-Id".to_string(), request_id.to_string())];

        if req.query_params().contains_key("_envelope") {
            // Flatten status and headers into the body for clients that
            // cannot read either from the transport.
            let mut header_obj = Map::new();
            for (name, value) in response.headers() {
                header_obj.insert(name.clone(), json!(value));
            }
            payload = json!({
                "body": payload,
                "status": status,
                "headers": header_obj,
            });
            status = 200;
            debug!(request_id = %request_id, "Response enveloped");
        } else {
            for (name, value) in response.headers() {
                wire_headers.push((name.clone(), value.clone()));
            }
            for fragment in response.link_header() {
                wire_headers.push(("Link".to_string(), fragment));
            }
        }

        let mut body = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Degrade to an encoded error rather than crashing the call.
                error!(request_id = %request_id, error = %err, "Failed to encode response body");
                status = 500;
                let fallback = RestError::new(
                    "rest_encode_error",
                    "The response cannot be converted to JSON.",
                )
                .with_status(500);
                serde_json::to_vec(&fallback.to_value()).unwrap_or_default()
            }
        };

        let content_type = if let Some(callback) = &jsonp {
            let mut wrapped = Vec::with_capacity(body.len() + callback.len() + 6);
            // The comment prefix blocks the Flash content-sniffing attack
            // against JSONP endpoints.
            wrapped.extend_from_slice(b"/**/");
            wrapped.extend_from_slice(callback.as_bytes());
            wrapped.push(b'(');
            wrapped.append(&mut body);
            wrapped.push(b')');
            body = wrapped;
            "application/javascript; charset=utf-8"
        } else {
            "application/json; charset=utf-8"
        };
        if !wire_headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        {
            wire_headers.insert(0, ("Content-Type".to_string(), content_type.to_string()));
        }

        let body = if req.method() == Method::HEAD || status == 204 {
            None
        } else {
            Some(body)
        };
        info!(request_id = %request_id, status = status, "REST response ready");
        (status, wire_headers, body)
    }

    fn error_wire(&self, err: &RestError, request_id: &RequestId) -> WireResponse {
        let response = RestResponse::from_error(err);
        let body = serde_json::to_vec(response.data()).unwrap_or_default();
        (
            response.status(),
            vec![
                (
                    "Content-Type".to_string(),
                    "application/json; charset=utf-8".to_string(),
                ),
                ("X-Request-Id".to_string(), request_id.to_string()),
            ],
            Some(body),
        )
    }

    /// Convert a response into its payload value, merging `_links` and
    /// (when requested) `_embedded` into object bodies. Non-object bodies
    /// pass through untouched.
    pub fn response_to_data(&self, response: &RestResponse, embed: &EmbedMode) -> Value {
        let mut data = response.data().clone();
        if let Value::Object(map) = &mut data {
            if !response.links().is_empty() {
                map.insert("_links".to_string(), response.links_value());
                if *embed != EmbedMode::Off {
                    let embedded = self.embed_links(response, embed);
                    if !embedded.is_empty() {
                        map.insert("_embedded".to_string(), Value::Object(embedded));
                    }
                }
            }
        }
        data
    }

    // Resolve embeddable links through an internal sub-dispatch, one
    // level deep: the nested call renders with embedding off, so
    // self-referential links cannot recurse.
    fn embed_links(&self, response: &RestResponse, embed: &EmbedMode) -> Map<String, Value> {
        let mut out = Map::new();
        for (rel, links) in response.links() {
            if rel == "self" || !embed.wants(rel) {
                continue;
            }
            let mut embeds = Vec::new();
            for link in links {
                let embeddable = link
                    .attributes
                    .get("embeddable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if !embeddable {
                    continue;
                }
                let Some((path, query)) = self.internal_target(&link.href) else {
                    debug!(rel = %rel, href = %link.href, "Skipping external embed target");
                    continue;
                };
                let mut sub = RestRequest::new(Method::GET, path);
                let mut params: HashMap<String, Value> = HashMap::new();
                for (key, value) in query {
                    params.insert(key, Value::String(value));
                }
                params
                    .entry("context".to_string())
                    .or_insert_with(|| json!("embed"));
                sub.set_query_params(params);
                debug!(rel = %rel, href = %link.href, "Embedding link target");
                let sub_response = self.dispatcher.dispatch(&mut sub);
                if sub_response.is_error() {
                    debug!(
                        rel = %rel,
                        href = %link.href,
                        status = sub_response.status(),
                        "Embed target returned an error, skipping"
                    );
                    continue;
                }
                embeds.push(self.response_to_data(&sub_response, &EmbedMode::Off));
            }
            // A relation where nothing embedded is omitted outright.
            if !embeds.is_empty() {
                out.insert(rel.clone(), Value::Array(embeds));
            }
        }
        out
    }

    // Accepts hrefs under the configured public root or any relative
    // path; everything else is an external target.
    fn internal_target(&self, href: &str) -> Option<(String, Vec<(String, String)>)> {
        let root = self.config.root_url.trim_end_matches('/');
        let local = if !root.is_empty() && href.starts_with(root) {
            &href[root.len()..]
        } else if href.starts_with('/') {
            href
        } else {
            return None;
        };
        if !local.starts_with('/') {
            return None;
        }
        let (path, query_str) = match local.split_once('?') {
            Some((p, q)) => (p, q),
            None => (local, ""),
        };
        let query = url::form_urlencoded::parse(query_str.as_bytes())
            .into_owned()
            .collect();
        Some((path.to_string(), query))
    }
}

fn embed_mode(req: &RestRequest) -> EmbedMode {
    match req.query_params().get("_embed") {
        None => EmbedMode::Off,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "1" || trimmed.eq_ignore_ascii_case("true") {
                EmbedMode::All
            } else {
                EmbedMode::Rels(trimmed.split(',').map(|r| r.trim().to_string()).collect())
            }
        }
        Some(_) => EmbedMode::All,
    }
}

impl HttpService for RestService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parts = parse_request(req);
        let (status, headers, body) = self.serve(parts);
        write_response(res, status, &headers, body);
        Ok(())
    }
}
