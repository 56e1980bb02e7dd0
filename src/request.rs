use crate::error::RestError;
use crate::router::Endpoint;
use http::Method;
use once_cell::unsync::OnceCell;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Canonical header-name form: lowercase with `-` folded to `_`.
///
/// Lookups against a [`RestRequest`] are insensitive to both case and the
/// dash/underscore distinction, so `Content-Type`, `content-type` and
/// `CONTENT_TYPE` all address the same header.
pub fn canonicalize_header_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

/// One of the named parameter buckets a request resolves keys against.
///
/// The lookup priority is `Json > Body > Query > Url > Defaults`, with the
/// `Body` bucket consulted only for methods that accept a request body.
/// The order can be overridden per request via
/// [`RestRequest::set_parameter_order`]. Uploaded files live in their own
/// bucket outside this merge order and are reached through
/// [`RestRequest::file_params`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Json,
    Body,
    Query,
    Url,
    Defaults,
}

/// Uniform, lazily-parsed view over an inbound call.
///
/// Created per call by the server façade, mutated by the dispatcher while
/// matching (URL captures, attributes, defaults), read by handler
/// callbacks, and discarded when the call completes.
pub struct RestRequest {
    method: Method,
    route: String,
    headers: HashMap<String, Vec<String>>,
    url_params: HashMap<String, Value>,
    query_params: HashMap<String, Value>,
    body_params: HashMap<String, Value>,
    file_params: HashMap<String, Value>,
    default_params: HashMap<String, Value>,
    body: Vec<u8>,
    // Compute-once JSON parse. Uninitialized = body not inspected yet;
    // Some(None) = inspected and not (valid) JSON. set_body resets it.
    json: OnceCell<Option<Map<String, Value>>>,
    attributes: Option<Arc<Endpoint>>,
    param_order: Option<Vec<ParamSource>>,
}

impl RestRequest {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            headers: HashMap::new(),
            url_params: HashMap::new(),
            query_params: HashMap::new(),
            body_params: HashMap::new(),
            file_params: HashMap::new(),
            default_params: HashMap::new(),
            body: Vec::new(),
            json: OnceCell::new(),
            attributes: None,
            param_order: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// The matched route pattern. Empty until the dispatcher matches.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = route.into();
    }

    // ----- headers -------------------------------------------------------

    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    /// All values for a header, comma-joined, or `None` if absent.
    pub fn get_header(&self, name: &str) -> Option<String> {
        self.headers
            .get(&canonicalize_header_name(name))
            .map(|values| values.join(","))
    }

    pub fn get_header_as_array(&self, name: &str) -> Option<&Vec<String>> {
        self.headers.get(&canonicalize_header_name(name))
    }

    /// Replace any existing values for `name`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .insert(canonicalize_header_name(name), vec![value.into()]);
    }

    /// Append a value, preserving any already present.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(canonicalize_header_name(name))
            .or_default()
            .push(value.into());
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(&canonicalize_header_name(name));
    }

    /// The declared content type, lowercased, with parameters stripped
    /// (`application/json; charset=utf-8` reads as `application/json`).
    pub fn content_type(&self) -> Option<String> {
        let raw = self.get_header_as_array("content-type")?.first()?;
        let value = raw.split(';').next().unwrap_or("").trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_ascii_lowercase())
        }
    }

    pub fn is_json_content_type(&self) -> bool {
        self.content_type().as_deref() == Some("application/json")
    }

    fn is_form_content_type(&self) -> bool {
        self.content_type().as_deref() == Some("application/x-www-form-urlencoded")
    }

    // ----- body ----------------------------------------------------------

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Store raw body bytes, invalidating any cached JSON parse result.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
        self.json = OnceCell::new();
    }

    /// Parse the body as JSON, but only when the declared content type is
    /// exactly `application/json`. The outcome is cached, including the
    /// negative: malformed or non-object JSON yields an absent bucket on
    /// every subsequent call without re-parsing.
    pub fn get_json_params(&self) -> Option<&Map<String, Value>> {
        self.json
            .get_or_init(|| {
                if !self.is_json_content_type() || self.body.is_empty() {
                    return None;
                }
                match serde_json::from_slice::<Value>(&self.body) {
                    Ok(Value::Object(map)) => Some(map),
                    Ok(_) => {
                        debug!(route = %self.route, "JSON body is not an object, ignoring");
                        None
                    }
                    Err(err) => {
                        debug!(route = %self.route, error = %err, "JSON body parse failed");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// URL-decode a `key=value&...` body into the body-params bucket.
    ///
    /// Applies only when the body was not already decoded as form data by
    /// the transport (the canonical `POST` form-submit case) and the
    /// content type is URL-encoded or absent. Keys already set through
    /// [`set_body_params`](Self::set_body_params) are never overridden.
    pub fn parse_body_params(&mut self) {
        if self.body.is_empty() {
            return;
        }
        if self.method == Method::POST && self.is_form_content_type() {
            return;
        }
        match self.content_type() {
            None => {}
            Some(ct) if ct == "application/x-www-form-urlencoded" => {}
            Some(_) => return,
        }
        let parsed: Vec<(String, String)> = url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect();
        for (key, value) in parsed {
            self.body_params.entry(key).or_insert(Value::String(value));
        }
    }

    // ----- parameter buckets ---------------------------------------------

    pub fn url_params(&self) -> &HashMap<String, Value> {
        &self.url_params
    }

    pub fn set_url_params(&mut self, params: HashMap<String, Value>) {
        self.url_params = params;
    }

    pub fn query_params(&self) -> &HashMap<String, Value> {
        &self.query_params
    }

    pub fn set_query_params(&mut self, params: HashMap<String, Value>) {
        self.query_params = params;
    }

    pub fn body_params(&self) -> &HashMap<String, Value> {
        &self.body_params
    }

    pub fn set_body_params(&mut self, params: HashMap<String, Value>) {
        self.body_params = params;
    }

    pub fn file_params(&self) -> &HashMap<String, Value> {
        &self.file_params
    }

    pub fn set_file_params(&mut self, params: HashMap<String, Value>) {
        self.file_params = params;
    }

    pub fn default_params(&self) -> &HashMap<String, Value> {
        &self.default_params
    }

    pub fn set_default_params(&mut self, params: HashMap<String, Value>) {
        self.default_params = params;
    }

    /// The matched endpoint descriptor, set by the dispatcher.
    pub fn attributes(&self) -> Option<&Arc<Endpoint>> {
        self.attributes.as_ref()
    }

    pub fn set_attributes(&mut self, endpoint: Arc<Endpoint>) {
        self.attributes = Some(endpoint);
    }

    /// Override the bucket priority for this request.
    pub fn set_parameter_order(&mut self, order: Vec<ParamSource>) {
        self.param_order = Some(order);
    }

    fn accepts_body_params(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    /// Bucket priority for this request: the per-request override, or the
    /// default `Json > Body > Query > Url > Defaults` (Body only for
    /// methods that accept one).
    pub fn parameter_order(&self) -> Vec<ParamSource> {
        if let Some(order) = &self.param_order {
            return order.clone();
        }
        let mut order = Vec::with_capacity(5);
        order.push(ParamSource::Json);
        if self.accepts_body_params() {
            order.push(ParamSource::Body);
        }
        order.push(ParamSource::Query);
        order.push(ParamSource::Url);
        order.push(ParamSource::Defaults);
        order
    }

    fn bucket_get(&self, source: ParamSource, key: &str) -> Option<&Value> {
        match source {
            ParamSource::Json => self.get_json_params().and_then(|m| m.get(key)),
            ParamSource::Body => self.body_params.get(key),
            ParamSource::Query => self.query_params.get(key),
            ParamSource::Url => self.url_params.get(key),
            ParamSource::Defaults => self.default_params.get(key),
        }
    }

    // Err hands the value back when the bucket is not writable (a JSON
    // bucket that never materialized).
    fn bucket_store(&mut self, source: ParamSource, key: &str, value: Value) -> Result<(), Value> {
        match source {
            ParamSource::Json => {
                if let Some(Some(map)) = self.json.get_mut() {
                    map.insert(key.to_string(), value);
                    Ok(())
                } else {
                    Err(value)
                }
            }
            ParamSource::Body => {
                self.body_params.insert(key.to_string(), value);
                Ok(())
            }
            ParamSource::Query => {
                self.query_params.insert(key.to_string(), value);
                Ok(())
            }
            ParamSource::Url => {
                self.url_params.insert(key.to_string(), value);
                Ok(())
            }
            ParamSource::Defaults => {
                self.default_params.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    fn bucket_holding(&self, key: &str) -> Option<ParamSource> {
        self.parameter_order()
            .into_iter()
            .find(|source| self.bucket_get(*source, key).is_some())
    }

    /// Resolve a key by walking the buckets in priority order; the first
    /// bucket containing the key wins.
    pub fn get_param(&self, key: &str) -> Option<&Value> {
        for source in self.parameter_order() {
            if let Some(value) = self.bucket_get(source, key) {
                return Some(value);
            }
        }
        None
    }

    /// Update the key in the bucket where it already lives, or store it in
    /// the highest-priority writable bucket.
    pub fn set_param(&mut self, key: &str, value: Value) {
        if let Some(source) = self.bucket_holding(key) {
            let _ = self.bucket_store(source, key, value);
            return;
        }
        let mut pending = value;
        for source in self.parameter_order() {
            match self.bucket_store(source, key, pending) {
                Ok(()) => return,
                Err(returned) => pending = returned,
            }
        }
    }

    /// Merge all buckets, with higher-priority buckets overriding lower
    /// ones for the same key.
    pub fn get_params(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for source in self.parameter_order().into_iter().rev() {
            match source {
                ParamSource::Json => {
                    if let Some(map) = self.get_json_params() {
                        for (k, v) in map {
                            merged.insert(k.clone(), v.clone());
                        }
                    }
                }
                ParamSource::Body => {
                    for (k, v) in &self.body_params {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                ParamSource::Query => {
                    for (k, v) in &self.query_params {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                ParamSource::Url => {
                    for (k, v) in &self.url_params {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                ParamSource::Defaults => {
                    for (k, v) in &self.default_params {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        merged
    }

    // ----- schema-driven sanitization & validation -----------------------

    /// Rewrite parameter values in place through each argument's sanitize
    /// callback. Violations are collected across all arguments and reported
    /// as one aggregate `rest_invalid_param` error.
    pub fn sanitize_params(&mut self) -> Result<(), RestError> {
        let attributes = match &self.attributes {
            Some(a) => Arc::clone(a),
            None => return Ok(()),
        };
        let mut invalid = Map::new();
        let mut details = Map::new();
        for (name, arg) in &attributes.args {
            let sanitize = match &arg.sanitize {
                Some(f) => f,
                None => continue,
            };
            let current = match self.get_param(name) {
                Some(v) => v.clone(),
                None => continue,
            };
            match sanitize(&current, name) {
                Ok(clean) => {
                    if let Some(source) = self.bucket_holding(name) {
                        let _ = self.bucket_store(source, name, clean);
                    }
                }
                Err(err) => {
                    invalid.insert(name.clone(), json!(err.message()));
                    details.insert(name.clone(), err.to_value());
                }
            }
        }
        if invalid.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = invalid.keys().map(String::as_str).collect();
        Err(RestError::new(
            "rest_invalid_param",
            format!("Invalid parameter(s): {}", names.join(", ")),
        )
        .with_data(json!({
            "status": 400,
            "params": invalid,
            "details": details,
        })))
    }

    /// Check the matched endpoint's argument schema: `required` arguments
    /// must resolve after the bucket merge, enum'd arguments must hold an
    /// allowed value, and validate callbacks must pass. All violations are
    /// collected and reported together as a single 400-class error.
    pub fn has_valid_params(&self) -> Result<(), RestError> {
        let attributes = match &self.attributes {
            Some(a) => Arc::clone(a),
            None => return Ok(()),
        };
        let mut required = Vec::new();
        let mut invalid = Map::new();
        let mut details = Map::new();
        for (name, arg) in &attributes.args {
            let value = match self.get_param(name) {
                Some(v) => v,
                None => {
                    if arg.required {
                        required.push(name.clone());
                    }
                    continue;
                }
            };
            if let Some(allowed) = &arg.enum_values {
                if !allowed.contains(value) {
                    invalid.insert(
                        name.clone(),
                        json!(format!("{name} is not one of the allowed values.")),
                    );
                    continue;
                }
            }
            if let Some(validate) = &arg.validate {
                match validate(value, name) {
                    Ok(true) => {}
                    Ok(false) => {
                        invalid.insert(name.clone(), json!("Invalid parameter."));
                    }
                    Err(err) => {
                        invalid.insert(name.clone(), json!(err.message()));
                        details.insert(name.clone(), err.to_value());
                    }
                }
            }
        }

        let missing_error = if required.is_empty() {
            None
        } else {
            Some(
                RestError::new(
                    "rest_missing_callback_param",
                    format!("Missing parameter(s): {}", required.join(", ")),
                )
                .with_data(json!({ "status": 400, "params": required })),
            )
        };
        let invalid_error = if invalid.is_empty() {
            None
        } else {
            let names: Vec<&str> = invalid.keys().map(String::as_str).collect();
            Some(
                RestError::new(
                    "rest_invalid_param",
                    format!("Invalid parameter(s): {}", names.join(", ")),
                )
                .with_data(json!({
                    "status": 400,
                    "params": invalid,
                    "details": details,
                })),
            )
        };
        match (missing_error, invalid_error) {
            (None, None) => Ok(()),
            (Some(err), None) | (None, Some(err)) => Err(err),
            (Some(mut missing), Some(inv)) => {
                missing.add(inv);
                Err(missing)
            }
        }
    }
}

impl std::fmt::Debug for RestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRequest")
            .field("method", &self.method)
            .field("route", &self.route)
            .field("headers", &self.headers)
            .field("url_params", &self.url_params)
            .field("query_params", &self.query_params)
            .field("body_params", &self.body_params)
            .field("default_params", &self.default_params)
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_header_name() {
        assert_eq!(canonicalize_header_name("Content-Type"), "content_type");
        assert_eq!(canonicalize_header_name("X-API-Key"), "x_api_key");
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let mut req = RestRequest::new(Method::POST, "");
        req.set_header("Content-Type", "Application/JSON; charset=utf-8");
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
        assert!(req.is_json_content_type());
    }

    #[test]
    fn test_headers_multi_value_join() {
        let mut req = RestRequest::new(Method::GET, "");
        req.add_header("Accept", "application/json");
        req.add_header("accept", "text/html");
        assert_eq!(
            req.get_header("ACCEPT").as_deref(),
            Some("application/json,text/html")
        );
    }
}
