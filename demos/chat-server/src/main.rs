//! Chat demo
//!
//! Runs a scripted chat session through the engine: a live subscription
//! on the message feed, then a series of queries and mutations.
//!
//! # Running
//! ```bash
//! cargo run -p shapeql-chat-server
//! SHAPEQL_CONFIG=engine.json RUST_LOG=shapeql_runtime=debug cargo run -p shapeql-chat-server
//! ```

mod schema;
mod store;

use serde_json::Value;
use shapeql_runtime::{
    ConfigError, Context, Engine, EngineConfig, RequestError, SchemaError, Variables,
};
use std::sync::Arc;
use store::ChatStore;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const SCRIPT: &[(&str, &str)] = &[
    ("list users", "{ users { id name } }"),
    (
        "ann says hi",
        r#"mutation { postMessage(message: "morning all", user: "ann") { id text } }"#,
    ),
    (
        "bob replies",
        r#"mutation { postMessage(message: "hey ann", user: "bob") { id author { name bio } } }"#,
    ),
    (
        "cy fixes a typo",
        r#"mutation { editMessage(input: { id: 2, text: "hey Ann" }) { id text } }"#,
    ),
    (
        "stranger posts",
        r#"mutation { postMessage(message: "hello?", user: "zed") { id } }"#,
    ),
    (
        "history",
        r#"query History($limit: Int = 5) { messages(limit: $limit) { id text author { name } } }"#,
    ),
    ("typo in request", "{ users { id handle } }"),
];

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("feed listener stopped: {0}")]
    Listener(#[from] tokio::task::JoinError),
}

fn load_config() -> Result<EngineConfig, ConfigError> {
    match std::env::var_os("SHAPEQL_CONFIG") {
        Some(path) => {
            info!(path = %path.to_string_lossy(), "loading engine config");
            EngineConfig::from_file(path)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_server=info,shapeql_runtime=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = load_config()?;
    let store = Arc::new(ChatStore::with_seed_data());
    let engine = Engine::with_config(schema::build(&store)?, config);
    info!(users = store.users().len(), "chat store ready");

    let mut feed = engine.subscribe(
        "subscription Feed { onMessage { id text author { name } } }",
        &Variables::new(),
        || Context::new().with("client", "feed-listener"),
    )?;
    let listener = tokio::spawn(async move {
        let mut seen = 0_usize;
        while let Some(event) = feed.next().await {
            match event {
                Ok(response) => {
                    seen += 1;
                    println!("[feed] {}", render(&response.to_json()));
                }
                Err(error) => warn!(%error, "feed failed"),
            }
        }
        seen
    });

    for (step, request) in SCRIPT {
        if let Err(error) = engine.compile(request, &Variables::new()) {
            for diagnostic in error.diagnostics() {
                warn!(step, "{}", diagnostic.render(request));
            }
        }
        let response = engine
            .execute(request, &Variables::new(), &Value::Null, &Context::new())
            .await;
        if response.has_errors() {
            warn!(step, "request reported errors");
        }
        println!("[{step}] {}", render(&response.to_json()));
    }

    store.close();
    let seen = listener.await?;
    info!(
        events = seen,
        cached_plans = engine.plan_cache().map_or(0, |cache| cache.len()),
        "session finished"
    );
    Ok(())
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
