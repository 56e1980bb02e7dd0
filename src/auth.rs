//! Authentication providers consulted by the server façade before
//! dispatch.
//!
//! A provider returns one of three verdicts: no opinion (`None`), an
//! explicit pass (`Some(Ok(()))`) which stops the chain, or a structured
//! error (`Some(Err(_))`) which aborts dispatch entirely and is rendered
//! as the final response. A chain where every provider abstains lets the
//! request through: authentication success is implicit "no complaint",
//! and per-route permission callbacks make the real authorization call.

use crate::error::RestError;
use crate::request::RestRequest;

pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, req: &RestRequest) -> Option<Result<(), RestError>>;
}

/// Static API key compared against a request header.
///
/// A missing header is "no opinion" so anonymous traffic can fall through
/// to routes whose permission callbacks allow it; a wrong key is an
/// explicit 401.
pub struct ApiKeyAuth {
    header: String,
    key: String,
}

impl ApiKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            header: "X-Api-Key".to_string(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header = name.into();
        self
    }
}

impl AuthProvider for ApiKeyAuth {
    fn authenticate(&self, req: &RestRequest) -> Option<Result<(), RestError>> {
        let presented = req.get_header(&self.header)?;
        if presented == self.key {
            Some(Ok(()))
        } else {
            Some(Err(RestError::new(
                "rest_invalid_api_key",
                "The provided API key is not valid.",
            )
            .with_status(401)))
        }
    }
}
