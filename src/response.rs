use crate::error::RestError;
use serde_json::{json, Map, Value};

/// A single hyperlink under a relation: target plus extra attributes
/// (`embeddable`, `title`, media hints, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub href: String,
    pub attributes: Map<String, Value>,
}

/// Outcome of a handler plus hypermedia metadata.
///
/// Created by a handler callback or synthesized from a [`RestError`],
/// shaped by the server façade (link embedding, enveloping), and terminal
/// once written to the transport.
#[derive(Debug, Clone)]
pub struct RestResponse {
    status: u16,
    headers: Vec<(String, String)>,
    data: Value,
    // Relations keep insertion order; links within a relation keep call
    // order. A relation with zero links is removed outright.
    links: Vec<(String, Vec<Link>)>,
    matched_route: Option<String>,
    matched_handler: Option<usize>,
}

impl RestResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            data,
            links: Vec::new(),
            matched_route: None,
            matched_handler: None,
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(200, data)
    }

    /// Build an error response from a structured error. The status comes
    /// from the error's `data.status`, defaulting to 500.
    pub fn from_error(error: &RestError) -> Self {
        Self::new(error.status().unwrap_or(500), error.to_value())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    // ----- headers -------------------------------------------------------

    /// Header list in insertion order; duplicate names are preserved
    /// (repeated `Link` headers rely on this).
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any existing values for `name`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Append without touching existing values.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    // ----- links ---------------------------------------------------------

    /// Append a link under a relation. Multiple links per relation are
    /// preserved in call order.
    pub fn add_link(&mut self, rel: &str, href: impl Into<String>, attributes: Option<Map<String, Value>>) {
        let link = Link {
            href: href.into(),
            attributes: attributes.unwrap_or_default(),
        };
        if let Some((_, links)) = self.links.iter_mut().find(|(r, _)| r == rel) {
            links.push(link);
        } else {
            self.links.push((rel.to_string(), vec![link]));
        }
    }

    /// Remove one href under a relation, or the whole relation when no
    /// href is given. A relation left without links disappears from
    /// [`links`](Self::links) entirely.
    pub fn remove_link(&mut self, rel: &str, href: Option<&str>) {
        if let Some(pos) = self.links.iter().position(|(r, _)| r == rel) {
            match href {
                Some(target) => {
                    let (_, links) = &mut self.links[pos];
                    links.retain(|l| l.href != target);
                    if links.is_empty() {
                        self.links.remove(pos);
                    }
                }
                None => {
                    self.links.remove(pos);
                }
            }
        }
    }

    pub fn links(&self) -> &[(String, Vec<Link>)] {
        &self.links
    }

    /// Render links as RFC 5988 `Link:` header values, one per link.
    /// A `title` attribute is quoted; other attributes are emitted bare.
    pub fn link_header(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (rel, links) in &self.links {
            for link in links {
                let mut value = format!("<{}>; rel=\"{}\"", link.href, rel);
                for (name, attr) in &link.attributes {
                    let rendered = match attr {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if name == "title" {
                        value.push_str(&format!("; {name}=\"{rendered}\""));
                    } else {
                        value.push_str(&format!("; {name}={rendered}"));
                    }
                }
                out.push(value);
            }
        }
        out
    }

    /// Links serialized for a `_links` member: relation name to an array
    /// of `{href, ...attributes}` objects.
    pub fn links_value(&self) -> Value {
        let mut map = Map::new();
        for (rel, links) in &self.links {
            let items: Vec<Value> = links
                .iter()
                .map(|l| {
                    let mut obj = Map::new();
                    obj.insert("href".to_string(), json!(l.href));
                    for (k, v) in &l.attributes {
                        obj.insert(k.clone(), v.clone());
                    }
                    Value::Object(obj)
                })
                .collect();
            map.insert(rel.clone(), Value::Array(items));
        }
        Value::Object(map)
    }

    // ----- error view ----------------------------------------------------

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Reconstruct a structured error from an error response. When the body
    /// follows the `{code, message, data}` convention the full error
    /// (including `additional_errors`) comes back; otherwise a minimal
    /// error carrying only the status is synthesized.
    pub fn as_error(&self) -> Option<RestError> {
        if !self.is_error() {
            return None;
        }
        if let Some(err) = RestError::from_value(&self.data) {
            return Some(err);
        }
        Some(
            RestError::new(self.status.to_string(), "")
                .with_data(json!({ "status": self.status })),
        )
    }

    // ----- dispatch diagnostics ------------------------------------------

    /// The route pattern that produced this response, as registered.
    pub fn matched_route(&self) -> Option<&str> {
        self.matched_route.as_deref()
    }

    pub fn set_matched_route(&mut self, route: impl Into<String>) {
        self.matched_route = Some(route.into());
    }

    /// Index of the endpoint descriptor within the matched route.
    pub fn matched_handler(&self) -> Option<usize> {
        self.matched_handler
    }

    pub fn set_matched_handler(&mut self, index: usize) {
        self.matched_handler = Some(index);
    }
}
