use may_minihttp::Request;
use smallvec::SmallVec;
use std::io::Read;
use tracing::{debug, info};

/// Maximum inline headers before heap allocation. Most requests carry
/// ≤16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the transport edge.
pub type HeaderVec = SmallVec<[(String, String); MAX_INLINE_HEADERS]>;

/// The transport-level call record handed to the façade: method, path,
/// query pairs, raw headers, and body bytes. Everything downstream works
/// on this shape, so tests can drive the façade without a socket.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

/// Parse query string parameters from a URL path.
///
/// Extracts everything after the `?` character and URL-decodes names and
/// values, preserving pair order.
pub fn parse_query_params(path: &str) -> Vec<(String, String)> {
    if let Some(pos) = path.find('?') {
        let query_str = &path[pos + 1..];
        url::form_urlencoded::parse(query_str.as_bytes())
            .into_owned()
            .collect()
    } else {
        Vec::new()
    }
}

/// Extract a [`TransportRequest`] from a raw `may_minihttp` request.
pub fn parse_request(req: Request) -> TransportRequest {
    let method = req.method().to_string();
    let raw_path = req.path().to_string();
    let path = raw_path.split('?').next().unwrap_or("/").to_string();

    let headers: HeaderVec = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();
    debug!(
        header_count = headers.len(),
        size_bytes = headers.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>(),
        "Headers extracted"
    );

    let query = parse_query_params(&raw_path);
    debug!(param_count = query.len(), "Query params parsed");

    let mut body = Vec::new();
    if let Ok(size) = req.body().read_to_end(&mut body) {
        if size > 0 {
            info!(body_size_bytes = size, "Request body read");
        }
    }

    info!(method = %method, path = %path, "HTTP request parsed");
    TransportRequest {
        method,
        path,
        query,
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("/p?x=1&y=2");
        assert_eq!(q, vec![("x".into(), "1".into()), ("y".into(), "2".into())]);
    }

    #[test]
    fn test_parse_query_params_decodes() {
        let q = parse_query_params("/p?name=a%20b&empty=");
        assert_eq!(q[0], ("name".to_string(), "a b".to_string()));
        assert_eq!(q[1], ("empty".to_string(), String::new()));
    }
}
