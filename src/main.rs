use std::sync::Arc;

use judgement_bot::config::Config;
use judgement_bot::gateway::RelayGateway;
use judgement_bot::handlers::Context;
use judgement_bot::{build_pool, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().expect("Invalid configuration.");
    let pool = build_pool(&config.database_url, 8).expect("Failed to create pool.");
    let gateway = RelayGateway::new(&config.gateway_url).expect("Failed to build gateway client.");

    let addr = config.bind_addr;
    let ctx = Context::new(pool, Arc::new(gateway), config);
    server::serve(ctx, addr).await.expect("Server error.");
}
