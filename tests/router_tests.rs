//! Tests for route registration, normalization, and the self-description
//! indexes.

use restgate::{ArgSchema, Endpoint, IndexInfo, RestRequest, RouteTable};
use serde_json::{json, Value};

fn noop(methods: &str) -> Endpoint {
    Endpoint::new(methods, |_req: &mut RestRequest| Ok(json!(null)))
}

#[test]
fn test_root_index_route_preregistered() {
    let table = RouteTable::new();
    assert_eq!(table.routes().len(), 1);
    assert_eq!(table.routes()[0].full_pattern(), "/");
}

#[test]
fn test_first_registration_adds_namespace_index() {
    let mut table = RouteTable::new();
    table
        .register_route("wp/v2", "/posts", noop("GET"), false)
        .unwrap();
    let patterns: Vec<&str> = table.routes().iter().map(|r| r.full_pattern()).collect();
    // Root, then the namespace index, then the route itself.
    assert_eq!(patterns, vec!["/", "/wp/v2", "/wp/v2/posts"]);
    assert_eq!(table.namespaces(), ["wp/v2".to_string()]);

    // A second route in the same namespace does not re-register the index.
    table
        .register_route("wp/v2", "/pages", noop("GET"), false)
        .unwrap();
    assert_eq!(table.routes().len(), 4);
}

#[test]
fn test_reregistration_merges_by_default() {
    let mut table = RouteTable::new();
    table
        .register_route("wp/v2", "/posts", noop("GET"), false)
        .unwrap();
    table
        .register_route("wp/v2", "/posts", noop("POST"), false)
        .unwrap();
    let entry = table.find_matching_entry("/wp/v2/posts").unwrap();
    assert_eq!(entry.endpoints().len(), 2);
    let methods: Vec<String> = entry
        .allowed_methods()
        .iter()
        .map(|m| m.to_string())
        .collect();
    assert_eq!(methods, vec!["GET", "POST"]);
}

#[test]
fn test_reregistration_override_replaces() {
    let mut table = RouteTable::new();
    table
        .register_route("wp/v2", "/posts", vec![noop("GET"), noop("POST")], false)
        .unwrap();
    table
        .register_route("wp/v2", "/posts", noop("DELETE"), true)
        .unwrap();
    let entry = table.find_matching_entry("/wp/v2/posts").unwrap();
    assert_eq!(entry.endpoints().len(), 1);
    let methods: Vec<String> = entry
        .allowed_methods()
        .iter()
        .map(|m| m.to_string())
        .collect();
    assert_eq!(methods, vec!["DELETE"]);
}

#[test]
fn test_first_match_wins_regardless_of_specificity() {
    let mut table = RouteTable::new();
    // The general pattern is registered first and shadows the specific one.
    table
        .register_route("wp/v2", "/posts/(?P<id>[^/]+)", noop("GET"), false)
        .unwrap();
    table
        .register_route("wp/v2", r"/posts/(?P<id>\d+)", noop("GET"), false)
        .unwrap();
    let entry = table.find_matching_entry("/wp/v2/posts/42").unwrap();
    assert_eq!(entry.pattern(), "/posts/(?P<id>[^/]+)");
}

#[test]
fn test_match_is_case_insensitive_and_anchored() {
    let mut table = RouteTable::new();
    table
        .register_route("wp/v2", "/posts", noop("GET"), false)
        .unwrap();
    assert!(table.find_matching_entry("/WP/V2/POSTS").is_some());
    assert!(table.find_matching_entry("/wp/v2/posts/extra").is_none());
    assert!(table.find_matching_entry("/prefix/wp/v2/posts").is_none());
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let mut table = RouteTable::new();
    let result = table.register_route("wp/v2", "/posts/(?P<id>[", noop("GET"), false);
    assert!(result.is_err());
}

#[test]
fn test_empty_namespace_is_rejected() {
    let mut table = RouteTable::new();
    assert!(table.register_route("", "/posts", noop("GET"), false).is_err());
    assert!(table.register_route("//", "/posts", noop("GET"), false).is_err());
}

#[test]
fn test_index_lists_visible_routes_once() {
    let mut table = RouteTable::new();
    table.set_index_info(IndexInfo {
        name: "Test API".to_string(),
        description: "fixture".to_string(),
        url: "http://api.test".to_string(),
    });
    table
        .register_route(
            "wp/v2",
            "/posts",
            noop("GET").arg("page", ArgSchema::new().default_value(json!(1))),
            false,
        )
        .unwrap();
    table
        .register_route("wp/v2", "/secret", noop("GET").hide_from_index(), false)
        .unwrap();

    let index = table.index();
    assert_eq!(index["name"], json!("Test API"));
    assert_eq!(index["namespaces"], json!(["wp/v2"]));
    let routes = index["routes"].as_object().unwrap();
    assert!(routes.contains_key("/wp/v2/posts"));
    assert!(!routes.contains_key("/wp/v2/secret"));

    let posts = &routes["/wp/v2/posts"];
    assert_eq!(posts["namespace"], json!("wp/v2"));
    assert_eq!(posts["methods"], json!(["GET"]));
    assert_eq!(
        posts["_links"]["self"][0]["href"],
        json!("http://api.test/wp/v2/posts")
    );
    let args = &posts["endpoints"][0]["args"];
    assert_eq!(args["page"]["required"], json!(false));
    assert_eq!(args["page"]["default"], json!(1));
}

#[test]
fn test_namespace_index_filters_and_rejects_unknown() {
    let mut table = RouteTable::new();
    table
        .register_route("wp/v2", "/posts", noop("GET"), false)
        .unwrap();
    table
        .register_route("other/v1", "/widgets", noop("GET"), false)
        .unwrap();

    let ns = table.namespace_index("wp/v2").unwrap();
    let routes = ns["routes"].as_object().unwrap();
    assert!(routes.contains_key("/wp/v2/posts"));
    assert!(!routes.contains_key("/other/v1/widgets"));

    let err = table.namespace_index("missing/v9").unwrap_err();
    assert_eq!(err.code(), "rest_invalid_namespace");
    assert_eq!(err.status(), Some(404));
}

#[test]
fn test_route_schema_option_lives_alongside_endpoints() {
    let mut table = RouteTable::new();
    let registration = restgate::RouteRegistration::from(noop("GET"))
        .schema(|| json!({ "title": "post" }));
    table
        .register_route("wp/v2", "/posts", registration, false)
        .unwrap();
    let entry = table.find_matching_entry("/wp/v2/posts").unwrap();
    let schema = entry.schema().unwrap().as_ref()();
    assert_eq!(schema, json!({ "title": "post" }));
    assert_eq!(entry.endpoints().len(), 1);
}

#[test]
fn test_positional_captures_use_group_index() {
    let mut table = RouteTable::new();
    table
        .register_route("wp/v2", r"/archive/(\d{4})/(\d{2})", noop("GET"), false)
        .unwrap();
    let entry = table.find_matching_entry("/wp/v2/archive/2024/07").unwrap();
    let captures = entry.matches("/wp/v2/archive/2024/07").unwrap();
    let got: Vec<(String, String)> = captures
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("1".to_string(), "2024".to_string()),
            ("2".to_string(), "07".to_string())
        ]
    );
}

#[test]
fn test_mixed_value_capture() {
    let mut table = RouteTable::new();
    table
        .register_route(
            "wp/v2",
            r"/posts/(?P<parent>\d+)/revisions/(?P<id>\d+)",
            noop("GET"),
            false,
        )
        .unwrap();
    let entry = table
        .find_matching_entry("/wp/v2/posts/3/revisions/11")
        .unwrap();
    let captures = entry.matches("/wp/v2/posts/3/revisions/11").unwrap();
    let map: std::collections::HashMap<String, String> = captures
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    assert_eq!(map["parent"], "3");
    assert_eq!(map["id"], "11");
}

#[test]
fn test_describe_skips_callbacks() {
    let endpoint = noop("GET").arg(
        "id",
        ArgSchema::required()
            .describe_as("Resource ID.")
            .validate_with(|v: &Value, _: &str| Ok(v.is_string())),
    );
    let described = endpoint.describe();
    let arg = &described["args"]["id"];
    assert_eq!(arg["required"], json!(true));
    assert_eq!(arg["description"], json!("Resource ID."));
    assert!(arg.get("validate").is_none());
}
