use serde::ser::{Serialize, Serializer};
use serde_json::{json, Map, Value};

/// Structured protocol error carried through dispatch.
///
/// Every error has a stable string `code`, a human-readable `message`, and
/// optional JSON `data`. The HTTP status rides inside `data` under the
/// `"status"` key, which is exactly how clients see it on the wire.
/// Secondary errors attached via [`RestError::add`] survive serialization
/// under `additional_errors`.
///
/// Handler callbacks return `Result<_, RestError>`; the dispatcher turns
/// every `Err` into an error response, so no handler failure reaches the
/// transport un-normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RestError {
    code: String,
    message: String,
    data: Option<Value>,
    additional: Vec<RestError>,
}

impl RestError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
            additional: Vec::new(),
        }
    }

    /// Attach an HTTP status by storing it under `data.status`.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        let mut map = match self.data.take() {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
            None => Map::new(),
        };
        map.insert("status".to_string(), json!(status));
        self.data = Some(Value::Object(map));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// HTTP status carried in `data.status`, if any.
    pub fn status(&self) -> Option<u16> {
        self.data
            .as_ref()
            .and_then(|d| d.get("status"))
            .and_then(Value::as_u64)
            .map(|s| s as u16)
    }

    /// Append another error. The receiver stays the primary error; the
    /// argument (and anything it had already accumulated) is flattened into
    /// `additional_errors`.
    pub fn add(&mut self, mut other: RestError) {
        let tail = std::mem::take(&mut other.additional);
        self.additional.push(other);
        self.additional.extend(tail);
    }

    pub fn additional_errors(&self) -> &[RestError] {
        &self.additional
    }

    /// Serialize into the wire convention:
    /// `{code, message, data, additional_errors?}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), json!(self.code));
        map.insert("message".to_string(), json!(self.message));
        map.insert(
            "data".to_string(),
            self.data.clone().unwrap_or(Value::Null),
        );
        if !self.additional.is_empty() {
            let rest: Vec<Value> = self
                .additional
                .iter()
                .map(|e| {
                    json!({
                        "code": e.code,
                        "message": e.message,
                        "data": e.data.clone().unwrap_or(Value::Null),
                    })
                })
                .collect();
            map.insert("additional_errors".to_string(), Value::Array(rest));
        }
        Value::Object(map)
    }

    /// Reconstruct an error from a body following the wire convention.
    /// Returns `None` when the value does not carry a string `code`.
    pub fn from_value(value: &Value) -> Option<RestError> {
        let obj = value.as_object()?;
        let code = obj.get("code")?.as_str()?.to_string();
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let data = match obj.get("data") {
            Some(Value::Null) | None => None,
            Some(other) => Some(other.clone()),
        };
        let mut err = RestError {
            code,
            message,
            data,
            additional: Vec::new(),
        };
        if let Some(Value::Array(rest)) = obj.get("additional_errors") {
            for item in rest {
                if let Some(extra) = RestError::from_value(item) {
                    err.additional.push(extra);
                }
            }
        }
        Some(err)
    }
}

impl std::fmt::Display for RestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RestError {}

impl Serialize for RestError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        let err = RestError::new("rest_no_route", "No route").with_status(404);
        assert_eq!(err.status(), Some(404));
        let parsed = RestError::from_value(&err.to_value()).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_add_flattens_nested_errors() {
        let mut first = RestError::new("a", "first");
        let mut second = RestError::new("b", "second");
        second.add(RestError::new("c", "third"));
        first.add(second);
        let codes: Vec<&str> = first.additional_errors().iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec!["b", "c"]);
    }

    #[test]
    fn test_additional_errors_omitted_when_empty() {
        let err = RestError::new("a", "alone");
        assert!(err.to_value().get("additional_errors").is_none());
    }
}
