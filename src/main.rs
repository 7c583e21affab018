use std::sync::Arc;

use axum::{extract::Extension, routing::post, Router};
use gallery_gateway::{auth, build_schema, Config, Fanout, HttpIdentityClient, SharedIdentity};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("invalid configuration");
    let identity: SharedIdentity =
        Arc::new(HttpIdentityClient::new(&config).expect("identity client"));

    // process-wide notification channel, created once and injected
    let fanout = Fanout::new(64);
    let schema = build_schema(identity.clone(), fanout, &config);

    let app = Router::new()
        .route("/graphql", post(auth::graphql_handler))
        .layer(Extension(schema))
        .layer(Extension(identity));

    info!(addr = %config.bind_addr, auth_url = %config.auth_url, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("bind");
    axum::serve(listener, app).await.expect("server");
}
