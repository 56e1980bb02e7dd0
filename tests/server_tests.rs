//! Tests for the server façade: request translation, authentication,
//! response shaping (_embed, _envelope, _jsonp), and one live HTTP
//! round-trip over the `may` runtime.

use restgate::server::{parse_query_params, HeaderVec, TransportRequest};
use restgate::{
    ArgSchema, AuthProvider, Dispatcher, Endpoint, IndexInfo, RestError, RestRequest,
    RestResponse, RestService, RouteTable, ServiceConfig,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const ROOT: &str = "https://self-root";

fn fixture_table(root: &str) -> RouteTable {
    let mut table = RouteTable::new();
    table.set_index_info(IndexInfo {
        name: "fixture".to_string(),
        description: "server test fixture".to_string(),
        url: root.to_string(),
    });

    let link_root = root.to_string();
    table
        .register_route(
            "wp/v2",
            r"/posts/(?P<id>\d+)",
            Endpoint::new("GET", move |req: &mut RestRequest| {
                let id: u64 = req
                    .get_param("id")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let mut resp = RestResponse::ok(json!({
                    "id": id,
                    "title": format!("Post {id}"),
                    "context": req.get_param("context").cloned().unwrap_or(Value::Null),
                }));
                let mut embeddable = Map::new();
                embeddable.insert("embeddable".to_string(), json!(true));
                if id != 7 {
                    resp.add_link(
                        "related",
                        format!("{link_root}/wp/v2/posts/7"),
                        Some(embeddable.clone()),
                    );
                }
                resp.add_link(
                    "author",
                    format!("{link_root}/wp/v2/users/3"),
                    Some(embeddable.clone()),
                );
                resp.add_link(
                    "external",
                    "https://elsewhere.test/thing",
                    Some(embeddable),
                );
                resp.add_link("self", format!("{link_root}/wp/v2/posts/{id}"), None);
                Ok(resp)
            })
            .arg("id", ArgSchema::required()),
            false,
        )
        .unwrap();

    table
        .register_route(
            "wp/v2",
            r"/posts/(?P<id>\d+)",
            Endpoint::new("DELETE", |_req: &mut RestRequest| Ok(json!(true)))
                .hide_from_index(),
            false,
        )
        .unwrap();

    table
        .register_route(
            "wp/v2",
            r"/users/(?P<id>\d+)",
            Endpoint::new("GET", |req: &mut RestRequest| {
                let id = req
                    .get_param("id")
                    .and_then(Value::as_str)
                    .unwrap_or("0")
                    .to_string();
                Ok(json!({ "id": id, "name": "Author" }))
            })
            .arg("id", ArgSchema::required()),
            false,
        )
        .unwrap();
    table
}

fn fixture_service(config: ServiceConfig) -> RestService {
    RestService::new(Dispatcher::new(fixture_table(&config.root_url)), config)
}

fn default_service() -> RestService {
    fixture_service(ServiceConfig {
        root_url: ROOT.to_string(),
        ..ServiceConfig::default()
    })
}

fn get(path: &str) -> TransportRequest {
    request("GET", path)
}

fn request(method: &str, path: &str) -> TransportRequest {
    TransportRequest {
        method: method.to_string(),
        path: path.split('?').next().unwrap_or("/").to_string(),
        query: parse_query_params(path),
        headers: HeaderVec::new(),
        body: Vec::new(),
    }
}

fn body_json(body: &Option<Vec<u8>>) -> Value {
    serde_json::from_slice(body.as_deref().unwrap_or_default()).unwrap()
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[test]
fn test_serve_renders_links_and_allow() {
    let service = default_service();
    let (status, headers, body) = service.serve(get("/wp/v2/posts/1"));
    assert_eq!(status, 200);
    assert_eq!(
        header(&headers, "content-type"),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(header(&headers, "allow"), Some("DELETE, GET"));
    assert!(header(&headers, "x-request-id").is_some());

    let link_count = headers.iter().filter(|(k, _)| k == "Link").count();
    assert_eq!(link_count, 4);

    let data = body_json(&body);
    assert_eq!(data["id"], json!(1));
    assert_eq!(
        data["_links"]["self"][0]["href"],
        json!(format!("{ROOT}/wp/v2/posts/1"))
    );
    // No _embed requested, so nothing was expanded.
    assert!(data.get("_embedded").is_none());
}

#[test]
fn test_embed_expands_embeddable_relations() {
    let service = default_service();
    let (status, _, body) = service.serve(get("/wp/v2/posts/1?_embed"));
    assert_eq!(status, 200);
    let data = body_json(&body);

    let related = data["_embedded"]["related"].as_array().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0]["id"], json!(7));
    // The sub-dispatch forces context=embed unless the link already set one.
    assert_eq!(related[0]["context"], json!("embed"));

    let author = data["_embedded"]["author"].as_array().unwrap();
    assert_eq!(author[0]["name"], json!("Author"));

    // External targets embed nothing, so the relation is omitted, and
    // self is never expanded.
    assert!(data["_embedded"].get("external").is_none());
    assert!(data["_embedded"].get("self").is_none());
}

#[test]
fn test_embed_is_one_level_deep() {
    let service = default_service();
    let (_, _, body) = service.serve(get("/wp/v2/posts/1?_embed"));
    let data = body_json(&body);
    let related = &data["_embedded"]["related"][0];
    // Post 7 carries its own links but no nested _embedded.
    assert!(related.get("_links").is_some());
    assert!(related.get("_embedded").is_none());
}

#[test]
fn test_embed_relation_filter() {
    let service = default_service();
    let (_, _, body) = service.serve(get("/wp/v2/posts/1?_embed=author"));
    let data = body_json(&body);
    assert!(data["_embedded"].get("author").is_some());
    assert!(data["_embedded"].get("related").is_none());
}

#[test]
fn test_envelope_flattens_error_into_200() {
    let service = default_service();
    let (status, _, body) = service.serve(get("/wp/v2/missing?_envelope"));
    assert_eq!(status, 200);
    let data = body_json(&body);
    assert_eq!(data["status"], json!(404));
    assert_eq!(data["body"]["code"], json!("rest_no_route"));
}

#[test]
fn test_jsonp_wraps_output() {
    let service = default_service();
    let (status, headers, body) = service.serve(get("/wp/v2/posts/1?_jsonp=my.Callback_1"));
    assert_eq!(status, 200);
    assert_eq!(
        header(&headers, "content-type"),
        Some("application/javascript; charset=utf-8")
    );
    let text = String::from_utf8(body.unwrap()).unwrap();
    assert!(text.starts_with("/**/my.Callback_1("));
    assert!(text.ends_with(')'));
}

#[test]
fn test_jsonp_rejects_unsafe_callback_names() {
    let service = default_service();
    for bad in ["alert(1)", "cb;evil", "a b", "<script>"] {
        let encoded = format!("/wp/v2/posts/1?_jsonp={}", urlencoding::encode(bad));
        let (status, _, body) = service.serve(get(&encoded));
        assert_eq!(status, 400, "callback {bad:?} should be rejected");
        let data = body_json(&body);
        assert_eq!(data["code"], json!("rest_callback_invalid"));
    }
}

#[test]
fn test_jsonp_disabled_by_config() {
    let service = fixture_service(ServiceConfig {
        root_url: ROOT.to_string(),
        jsonp_enabled: false,
        ..ServiceConfig::default()
    });
    let (status, _, body) = service.serve(get("/wp/v2/posts/1?_jsonp=cb"));
    assert_eq!(status, 400);
    assert_eq!(body_json(&body)["code"], json!("rest_callback_disabled"));
}

struct DenyAll;
impl AuthProvider for DenyAll {
    fn authenticate(&self, _req: &RestRequest) -> Option<Result<(), RestError>> {
        Some(Err(
            RestError::new("rest_denied", "No entry.").with_status(401)
        ))
    }
}

struct PassAll;
impl AuthProvider for PassAll {
    fn authenticate(&self, _req: &RestRequest) -> Option<Result<(), RestError>> {
        Some(Ok(()))
    }
}

struct NoOpinion;
impl AuthProvider for NoOpinion {
    fn authenticate(&self, _req: &RestRequest) -> Option<Result<(), RestError>> {
        None
    }
}

#[test]
fn test_auth_error_aborts_dispatch() {
    let mut service = default_service();
    service.register_auth_provider(Arc::new(DenyAll));
    let (status, _, body) = service.serve(get("/wp/v2/posts/1"));
    assert_eq!(status, 401);
    assert_eq!(body_json(&body)["code"], json!("rest_denied"));
}

#[test]
fn test_auth_explicit_pass_stops_the_chain() {
    let mut service = default_service();
    service.register_auth_provider(Arc::new(NoOpinion));
    service.register_auth_provider(Arc::new(PassAll));
    service.register_auth_provider(Arc::new(DenyAll));
    let (status, _, _) = service.serve(get("/wp/v2/posts/1"));
    assert_eq!(status, 200);
}

#[test]
fn test_auth_all_abstain_allows() {
    let mut service = default_service();
    service.register_auth_provider(Arc::new(NoOpinion));
    let (status, _, _) = service.serve(get("/wp/v2/posts/1"));
    assert_eq!(status, 200);
}

#[test]
fn test_head_suppresses_body() {
    let service = default_service();
    let (status, headers, body) = service.serve(request("HEAD", "/wp/v2/posts/1"));
    assert_eq!(status, 200);
    assert!(body.is_none());
    assert_eq!(header(&headers, "allow"), Some("DELETE, GET"));
}

#[test]
fn test_request_id_echoed_from_header() {
    let service = default_service();
    let mut parts = get("/wp/v2/posts/1");
    let id = "01J9ZX2N9GVQ5H1T5C3W8K4D2M";
    parts
        .headers
        .push(("X-Request-Id".to_string(), id.to_string()));
    let (_, headers, _) = service.serve(parts);
    assert_eq!(header(&headers, "x-request-id"), Some(id));
}

#[test]
fn test_index_round_trips_registered_routes() {
    let service = default_service();
    let (status, _, body) = service.serve(get("/"));
    assert_eq!(status, 200);
    let data = body_json(&body);
    assert_eq!(data["name"], json!("fixture"));
    assert_eq!(data["namespaces"], json!(["wp/v2"]));
    let routes = data["routes"].as_object().unwrap();
    assert!(routes.contains_key(r"/wp/v2/posts/(?P<id>\d+)"));
    assert!(routes.contains_key(r"/wp/v2/users/(?P<id>\d+)"));

    let (status, _, body) = service.serve(get("/wp/v2"));
    assert_eq!(status, 200);
    assert_eq!(body_json(&body)["namespace"], json!("wp/v2"));
}

#[test]
fn test_form_body_decoded_for_post() {
    let mut table = RouteTable::new();
    table
        .register_route(
            "wp/v2",
            "/echo",
            Endpoint::new("POST", |req: &mut RestRequest| {
                Ok(json!({ "title": req.get_param("title").cloned() }))
            }),
            false,
        )
        .unwrap();
    let service = RestService::new(Dispatcher::new(table), ServiceConfig::default());

    let mut parts = request("POST", "/wp/v2/echo");
    parts.headers.push((
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    ));
    parts.body = b"title=hello%20form".to_vec();
    let (status, _, body) = service.serve(parts);
    assert_eq!(status, 200);
    assert_eq!(body_json(&body)["title"], json!("hello form"));
}

#[test]
fn test_json_body_wins_over_query() {
    let mut table = RouteTable::new();
    table
        .register_route(
            "wp/v2",
            "/echo",
            Endpoint::new("POST", |req: &mut RestRequest| {
                Ok(json!({ "title": req.get_param("title").cloned() }))
            }),
            false,
        )
        .unwrap();
    let service = RestService::new(Dispatcher::new(table), ServiceConfig::default());

    let mut parts = request("POST", "/wp/v2/echo?title=from_query");
    parts
        .headers
        .push(("Content-Type".to_string(), "application/json".to_string()));
    parts.body = br#"{"title":"from_json"}"#.to_vec();
    let (_, _, body) = service.serve(parts);
    assert_eq!(body_json(&body)["title"], json!("from_json"));
}

#[test]
fn test_http_round_trip() {
    use restgate::HttpServer;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    may::config().set_stack_size(0x8000);
    let service = default_service();
    let handle = HttpServer(service)
        .start("127.0.0.1:18431")
        .expect("bind test port");
    handle.wait_ready().expect("server ready");

    let mut stream = TcpStream::connect("127.0.0.1:18431").expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .write_all(b"GET /wp/v2/posts/42 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .expect("write request");

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);
                if raw.windows(4).any(|w| w == b"\r\n\r\n") && raw.ends_with(b"}") {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    let text = String::from_utf8_lossy(&raw);
    assert!(text.starts_with("HTTP/1.1 200"), "got: {text}");
    assert!(text.contains("\"id\":42"), "got: {text}");

    handle.stop();
}
