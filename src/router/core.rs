//! Route table core - registration, normalization, and path matching.

use crate::error::RestError;
use crate::request::RestRequest;
use crate::response::RestResponse;
use anyhow::Context;
use http::Method;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum number of URL captures before heap allocation.
/// Most REST patterns carry ≤4 named groups.
pub const MAX_INLINE_CAPTURES: usize = 8;

/// Stack-allocated capture storage for the match hot path.
///
/// Capture names use `Arc<str>`: they come from the compiled pattern, so
/// cloning is an O(1) refcount bump rather than a string copy. Values are
/// per-request data from the URL and stay `String`.
pub type CaptureVec = SmallVec<[(Arc<str>, String); MAX_INLINE_CAPTURES]>;

/// What a handler callback hands back: a full response when it wants
/// control over status/headers/links, or a bare JSON value that the
/// dispatcher wraps in a default 200 response.
#[derive(Debug)]
pub enum HandlerValue {
    Response(RestResponse),
    Value(Value),
}

impl From<RestResponse> for HandlerValue {
    fn from(resp: RestResponse) -> Self {
        HandlerValue::Response(resp)
    }
}

impl From<Value> for HandlerValue {
    fn from(value: Value) -> Self {
        HandlerValue::Value(value)
    }
}

pub type HandlerFn =
    Arc<dyn Fn(&mut RestRequest) -> Result<HandlerValue, RestError> + Send + Sync>;
pub type PermissionFn = Arc<dyn Fn(&RestRequest) -> Result<bool, RestError> + Send + Sync>;
pub type SanitizeFn = Arc<dyn Fn(&Value, &str) -> Result<Value, RestError> + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&Value, &str) -> Result<bool, RestError> + Send + Sync>;
pub type SchemaFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// The invocable attached to an endpoint. The index variants are resolved
/// by the dispatcher against its own table, which is how the
/// self-description routes avoid capturing a reference cycle back into
/// the table that owns them.
#[derive(Clone)]
pub enum EndpointCallback {
    Handler(HandlerFn),
    RootIndex,
    NamespaceIndex(String),
}

/// Per-argument schema: required flag, default, enum restriction, and
/// sanitize/validate callbacks. Serialized (minus the callbacks) into the
/// self-description index.
#[derive(Clone, Default)]
pub struct ArgSchema {
    pub required: bool,
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
    pub description: Option<String>,
    pub sanitize: Option<SanitizeFn>,
    pub validate: Option<ValidateFn>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    #[must_use]
    pub fn describe_as(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn sanitize_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<Value, RestError> + Send + Sync + 'static,
    {
        self.sanitize = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn validate_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<bool, RestError> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    /// Schema description for the index, callbacks omitted.
    pub fn describe(&self) -> Value {
        let mut map = Map::new();
        map.insert("required".to_string(), json!(self.required));
        if let Some(default) = &self.default {
            map.insert("default".to_string(), default.clone());
        }
        if let Some(values) = &self.enum_values {
            map.insert("enum".to_string(), json!(values));
        }
        if let Some(description) = &self.description {
            map.insert("description".to_string(), json!(description));
        }
        Value::Object(map)
    }
}

impl std::fmt::Debug for ArgSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgSchema")
            .field("required", &self.required)
            .field("default", &self.default)
            .field("enum_values", &self.enum_values)
            .field("has_sanitize", &self.sanitize.is_some())
            .field("has_validate", &self.validate.is_some())
            .finish()
    }
}

/// One method-specific handler descriptor under a route.
#[derive(Clone)]
pub struct Endpoint {
    pub methods: HashSet<Method>,
    pub callback: Option<EndpointCallback>,
    pub args: BTreeMap<String, ArgSchema>,
    pub permission: Option<PermissionFn>,
    pub show_in_index: bool,
    pub accept_json: bool,
    pub accept_raw: bool,
}

impl Endpoint {
    /// Build an endpoint answering the given methods. `methods` is a
    /// comma-separated verb list (`"GET"`, `"GET, POST"`); unknown verbs
    /// are dropped with a warning.
    pub fn new<F, R>(methods: &str, handler: F) -> Self
    where
        F: Fn(&mut RestRequest) -> Result<R, RestError> + Send + Sync + 'static,
        R: Into<HandlerValue>,
    {
        let callback: HandlerFn = Arc::new(move |req| handler(req).map(Into::into));
        Self::with_callback(methods, Some(EndpointCallback::Handler(callback)))
    }

    /// An endpoint registered without an invocable callback. Dispatching
    /// to it is a configuration defect and yields a 500.
    pub fn without_callback(methods: &str) -> Self {
        Self::with_callback(methods, None)
    }

    pub(crate) fn with_callback(methods: &str, callback: Option<EndpointCallback>) -> Self {
        Self {
            methods: parse_methods(methods),
            callback,
            args: BTreeMap::new(),
            permission: None,
            show_in_index: true,
            accept_json: false,
            accept_raw: false,
        }
    }

    /// Replace the method set from an explicit verb list.
    #[must_use]
    pub fn method_list(mut self, methods: &[Method]) -> Self {
        self.methods = methods.iter().cloned().collect();
        self
    }

    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, schema: ArgSchema) -> Self {
        self.args.insert(name.into(), schema);
        self
    }

    #[must_use]
    pub fn permission<F>(mut self, f: F) -> Self
    where
        F: Fn(&RestRequest) -> Result<bool, RestError> + Send + Sync + 'static,
    {
        self.permission = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn hide_from_index(mut self) -> Self {
        self.show_in_index = false;
        self
    }

    #[must_use]
    pub fn accepts_json(mut self) -> Self {
        self.accept_json = true;
        self
    }

    #[must_use]
    pub fn accepts_raw(mut self) -> Self {
        self.accept_raw = true;
        self
    }

    /// Endpoint description for the index: sorted methods plus the
    /// argument schemas.
    pub fn describe(&self) -> Value {
        let mut methods: Vec<String> = self.methods.iter().map(|m| m.to_string()).collect();
        methods.sort();
        let mut args = Map::new();
        for (name, schema) in &self.args {
            args.insert(name.clone(), schema.describe());
        }
        json!({ "methods": methods, "args": args })
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("methods", &self.methods)
            .field("args", &self.args.keys().collect::<Vec<_>>())
            .field("show_in_index", &self.show_in_index)
            .finish()
    }
}

fn parse_methods(spec: &str) -> HashSet<Method> {
    let mut set = HashSet::new();
    for part in spec.split(',') {
        let name = part.trim().to_ascii_uppercase();
        if name.is_empty() {
            continue;
        }
        match name.parse::<Method>() {
            Ok(method) => {
                set.insert(method);
            }
            Err(_) => warn!(method = %name, "Ignoring unknown HTTP method in registration"),
        }
    }
    set
}

/// What gets registered under a route: the endpoint list plus optional
/// route-level options that live alongside (not inside) it, such as a
/// documentation schema callback.
pub struct RouteRegistration {
    pub endpoints: Vec<Endpoint>,
    pub schema: Option<SchemaFn>,
}

impl RouteRegistration {
    #[must_use]
    pub fn schema<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.schema = Some(Arc::new(f));
        self
    }
}

impl From<Endpoint> for RouteRegistration {
    fn from(endpoint: Endpoint) -> Self {
        Self {
            endpoints: vec![endpoint],
            schema: None,
        }
    }
}

impl From<Vec<Endpoint>> for RouteRegistration {
    fn from(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            schema: None,
        }
    }
}

/// Identity block reported by the root index.
#[derive(Debug, Clone, Default)]
pub struct IndexInfo {
    pub name: String,
    pub description: String,
    pub url: String,
}

/// A registered route: the pattern as given, the namespaced full pattern,
/// its compiled regex, and the ordered endpoint list.
pub struct RouteEntry {
    namespace: String,
    pattern: String,
    full_pattern: String,
    regex: Regex,
    endpoints: Vec<Arc<Endpoint>>,
    schema: Option<SchemaFn>,
}

impl RouteEntry {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The pattern as passed to `register_route`, relative to the
    /// namespace.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The namespace-prefixed pattern used for matching and index keys.
    pub fn full_pattern(&self) -> &str {
        &self.full_pattern
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn schema(&self) -> Option<&SchemaFn> {
        self.schema.as_ref()
    }

    /// Full-string match against a request path. Named captures are
    /// returned under their group name, unnamed groups under their index;
    /// the whole-match group 0 is discarded.
    pub fn matches(&self, path: &str) -> Option<CaptureVec> {
        let caps = self.regex.captures(path)?;
        let mut out = CaptureVec::new();
        for (i, name) in self.regex.capture_names().enumerate() {
            if i == 0 {
                continue;
            }
            if let Some(m) = caps.get(i) {
                let key: Arc<str> = match name {
                    Some(n) => Arc::from(n),
                    None => Arc::from(i.to_string().as_str()),
                };
                out.push((key, m.as_str().to_string()));
            }
        }
        Some(out)
    }

    /// Union of methods across all endpoints, sorted for stable `Allow`
    /// headers.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut set = HashSet::new();
        for endpoint in &self.endpoints {
            set.extend(endpoint.methods.iter().cloned());
        }
        let mut methods: Vec<Method> = set.into_iter().collect();
        methods.sort_by_key(|m| m.to_string());
        methods
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("namespace", &self.namespace)
            .field("full_pattern", &self.full_pattern)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

/// Ordered route table, built at startup and read-only during request
/// processing.
pub struct RouteTable {
    routes: Vec<RouteEntry>,
    namespaces: Vec<String>,
    info: IndexInfo,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// An empty table with the root self-description route (`GET /`)
    /// pre-registered.
    pub fn new() -> Self {
        let mut table = Self {
            routes: Vec::new(),
            namespaces: Vec::new(),
            info: IndexInfo::default(),
        };
        let root = Endpoint::with_callback("GET", Some(EndpointCallback::RootIndex));
        // The root route has no namespace; bad patterns here are impossible.
        if let Err(err) = table.add_entry("", "/", root.into(), false) {
            warn!(error = %err, "Failed to register root index route");
        }
        table
    }

    pub fn set_index_info(&mut self, info: IndexInfo) {
        self.info = info;
    }

    pub fn index_info(&self) -> &IndexInfo {
        &self.info
    }

    /// Register endpoints under `namespace` + `pattern`.
    ///
    /// The first registration in a namespace auto-registers that
    /// namespace's index route (`GET /{namespace}`). Registering the same
    /// pattern again merges the endpoint lists by default, or replaces the
    /// whole descriptor when `override_existing` is set. Either way the
    /// route keeps its original position in the match order.
    pub fn register_route(
        &mut self,
        namespace: &str,
        pattern: &str,
        registration: impl Into<RouteRegistration>,
        override_existing: bool,
    ) -> anyhow::Result<()> {
        let namespace = namespace.trim_matches('/').to_string();
        if namespace.is_empty() {
            anyhow::bail!("route namespace must not be empty");
        }
        if !self.namespaces.contains(&namespace) {
            self.namespaces.push(namespace.clone());
            let index = Endpoint::with_callback(
                "GET",
                Some(EndpointCallback::NamespaceIndex(namespace.clone())),
            );
            self.add_entry(&namespace, "/", index.into(), false)?;
        }
        self.add_entry(&namespace, pattern, registration.into(), override_existing)
    }

    fn add_entry(
        &mut self,
        namespace: &str,
        pattern: &str,
        registration: RouteRegistration,
        override_existing: bool,
    ) -> anyhow::Result<()> {
        let pattern = normalize_pattern(pattern);
        let full_pattern = if namespace.is_empty() {
            pattern.clone()
        } else if pattern == "/" {
            format!("/{namespace}")
        } else {
            format!("/{namespace}{pattern}")
        };
        let endpoints: Vec<Arc<Endpoint>> =
            registration.endpoints.into_iter().map(Arc::new).collect();

        if let Some(pos) = self.routes.iter().position(|r| r.full_pattern == full_pattern) {
            let entry = &mut self.routes[pos];
            if override_existing {
                entry.pattern = pattern;
                entry.endpoints = endpoints;
                entry.schema = registration.schema;
            } else {
                entry.endpoints.extend(endpoints);
                if entry.schema.is_none() {
                    entry.schema = registration.schema;
                }
            }
            info!(
                route = %full_pattern,
                override_existing,
                endpoints = entry.endpoints.len(),
                "Route re-registered"
            );
            return Ok(());
        }

        let regex = RegexBuilder::new(&format!("^{full_pattern}$"))
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid route pattern {full_pattern}"))?;

        info!(
            namespace = %namespace,
            route = %full_pattern,
            endpoints = endpoints.len(),
            "Route registered"
        );
        self.routes.push(RouteEntry {
            namespace: namespace.to_string(),
            pattern,
            full_pattern,
            regex,
            endpoints,
            schema: registration.schema,
        });
        Ok(())
    }

    /// Routes in registration order, the order matching iterates in.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// First entry whose pattern matches the path, honoring registration
    /// order.
    pub fn find_matching_entry(&self, path: &str) -> Option<&RouteEntry> {
        self.routes.iter().find(|e| e.matches(path).is_some())
    }

    /// Machine-readable index of the whole API: identity block,
    /// namespaces, and every visible route.
    pub fn index(&self) -> Value {
        json!({
            "name": self.info.name,
            "description": self.info.description,
            "url": self.info.url,
            "namespaces": self.namespaces,
            "routes": self.route_map(None),
        })
    }

    /// Index of a single namespace; unknown namespaces are a 404.
    pub fn namespace_index(&self, namespace: &str) -> Result<Value, RestError> {
        if !self.namespaces.iter().any(|n| n == namespace) {
            return Err(RestError::new(
                "rest_invalid_namespace",
                "The specified namespace could not be found.",
            )
            .with_status(404));
        }
        Ok(json!({
            "namespace": namespace,
            "routes": self.route_map(Some(namespace)),
        }))
    }

    fn route_map(&self, namespace: Option<&str>) -> Value {
        let mut map = Map::new();
        for entry in &self.routes {
            if let Some(ns) = namespace {
                if entry.namespace != ns {
                    continue;
                }
            }
            let visible: Vec<&Arc<Endpoint>> = entry
                .endpoints
                .iter()
                .filter(|e| e.show_in_index)
                .collect();
            if visible.is_empty() {
                continue;
            }
            let mut methods: Vec<String> = visible
                .iter()
                .flat_map(|e| e.methods.iter().map(|m| m.to_string()))
                .collect();
            methods.sort();
            methods.dedup();
            let endpoints: Vec<Value> = visible.iter().map(|e| e.describe()).collect();
            let mut route_data = json!({
                "namespace": entry.namespace,
                "methods": methods,
                "endpoints": endpoints,
            });
            route_data["_links"] = json!({
                "self": [{ "href": format!("{}{}", self.info.url, entry.full_pattern) }],
            });
            map.insert(entry.full_pattern.clone(), route_data);
        }
        Value::Object(map)
    }
}

fn normalize_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pattern() {
        assert_eq!(normalize_pattern("/posts/"), "/posts");
        assert_eq!(normalize_pattern("posts"), "/posts");
        assert_eq!(normalize_pattern("/"), "/");
        assert_eq!(normalize_pattern(""), "/");
    }

    #[test]
    fn test_parse_methods_expands_comma_list() {
        let set = parse_methods("GET, post,DELETE");
        assert!(set.contains(&Method::GET));
        assert!(set.contains(&Method::POST));
        assert!(set.contains(&Method::DELETE));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_capture_extraction() {
        let mut table = RouteTable::new();
        table
            .register_route(
                "wp/v2",
                r"/posts/(?P<id>\d+)",
                Endpoint::new("GET", |_req: &mut RestRequest| Ok(json!(null))),
                false,
            )
            .unwrap();
        let entry = table.find_matching_entry("/wp/v2/posts/42").unwrap();
        let captures = entry.matches("/wp/v2/posts/42").unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].0.as_ref(), "id");
        assert_eq!(captures[0].1, "42");
    }
}
