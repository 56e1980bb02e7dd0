use clap::Parser;
use restgate::{
    ApiKeyAuth, ArgSchema, Dispatcher, Endpoint, HttpServer, IndexInfo, RestError, RestResponse,
    RestService, RouteTable, ServiceConfig,
};
use restgate::runtime_config::RuntimeConfig;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "restgate", about = "Serve the restgate demo API")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,
    /// Optional YAML service config
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone)]
struct Post {
    id: u64,
    title: String,
    author_id: u64,
}

impl Post {
    fn to_value(&self) -> Value {
        json!({ "id": self.id, "title": self.title, "author": self.author_id })
    }
}

type PostStore = Arc<Mutex<BTreeMap<u64, Post>>>;

fn seed_posts() -> PostStore {
    let mut posts = BTreeMap::new();
    posts.insert(
        1,
        Post {
            id: 1,
            title: "Hello world".to_string(),
            author_id: 7,
        },
    );
    posts.insert(
        2,
        Post {
            id: 2,
            title: "Dispatch tables for fun and profit".to_string(),
            author_id: 7,
        },
    );
    Arc::new(Mutex::new(posts))
}

fn numeric(value: &Value, name: &str) -> Result<bool, RestError> {
    match value {
        Value::Number(_) => Ok(true),
        Value::String(s) if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() => Ok(true),
        _ => Err(RestError::new(
            "rest_invalid_param",
            format!("{name} must be an integer."),
        )
        .with_status(400)),
    }
}

fn post_response(post: &Post, root_url: &str) -> RestResponse {
    let mut resp = RestResponse::ok(post.to_value());
    resp.add_link("self", format!("{root_url}/demo/v1/posts/{}", post.id), None);
    let mut attrs = Map::new();
    attrs.insert("embeddable".to_string(), json!(true));
    resp.add_link(
        "author",
        format!("{root_url}/demo/v1/users/{}", post.author_id),
        Some(attrs),
    );
    resp
}

fn register_demo_routes(table: &mut RouteTable, posts: PostStore, root_url: String) -> anyhow::Result<()> {
    let store = Arc::clone(&posts);
    let root = root_url.clone();
    table.register_route(
        "demo/v1",
        "/posts",
        vec![
            Endpoint::new("GET", move |_req: &mut restgate::RestRequest| {
                let posts = store.lock().map_err(|_| storage_error())?;
                let items: Vec<Value> = posts.values().map(Post::to_value).collect();
                Ok(json!(items))
            }),
            {
                let store = Arc::clone(&posts);
                let root = root.clone();
                Endpoint::new("POST", move |req: &mut restgate::RestRequest| {
                    let title = req
                        .get_param("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let mut posts = store.lock().map_err(|_| storage_error())?;
                    let id = posts.keys().next_back().copied().unwrap_or(0) + 1;
                    let post = Post {
                        id,
                        title,
                        author_id: 7,
                    };
                    posts.insert(id, post.clone());
                    let mut resp = post_response(&post, &root);
                    resp.set_status(201);
                    Ok(resp)
                })
                .arg("title", ArgSchema::required().describe_as("Post title."))
                .accepts_json()
            },
        ],
        false,
    )?;

    let store = Arc::clone(&posts);
    let root = root_url.clone();
    table.register_route(
        "demo/v1",
        r"/posts/(?P<id>\d+)",
        Endpoint::new("GET", move |req: &mut restgate::RestRequest| {
            let id: u64 = req
                .get_param("id")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let posts = store.lock().map_err(|_| storage_error())?;
            match posts.get(&id) {
                Some(post) => Ok(post_response(post, &root)),
                None => Err(RestError::new("rest_post_invalid_id", "Invalid post ID.")
                    .with_status(404)),
            }
        })
        .arg(
            "id",
            ArgSchema::required().validate_with(numeric),
        ),
        false,
    )?;

    table.register_route(
        "demo/v1",
        r"/users/(?P<id>\d+)",
        Endpoint::new("GET", |req: &mut restgate::RestRequest| {
            let id = req
                .get_param("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(json!({ "id": id, "name": "Demo Author" }))
        })
        .arg("id", ArgSchema::required().validate_with(numeric)),
        false,
    )?;
    Ok(())
}

fn storage_error() -> RestError {
    RestError::new("rest_storage_unavailable", "The post store is unavailable.").with_status(500)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ServiceConfig::from_yaml_file(path)?,
        None => ServiceConfig {
            title: "restgate demo".to_string(),
            description: "In-memory demo posts API.".to_string(),
            ..ServiceConfig::default()
        },
    };

    let runtime = RuntimeConfig::from_env();
    may::config().set_stack_size(runtime.stack_size);

    let mut table = RouteTable::new();
    table.set_index_info(IndexInfo {
        name: config.title.clone(),
        description: config.description.clone(),
        url: config.root_url.clone(),
    });
    register_demo_routes(&mut table, seed_posts(), config.root_url.clone())?;

    let mut service = RestService::new(Dispatcher::new(table), config.clone());
    if let Some(key) = &config.api_key {
        service.register_auth_provider(Arc::new(ApiKeyAuth::new(key.clone())));
    }

    info!(addr = %cli.addr, "restgate demo server starting");
    let handle = HttpServer(service).start(&cli.addr)?;
    handle
        .join()
        .map_err(|e| anyhow::anyhow!("server failed: {e:?}"))?;
    Ok(())
}
