use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;

use crate::handlers::{dispatch, Context, Interaction};
use crate::view::Reply;

async fn interactions(State(ctx): State<Context>, Json(interaction): Json<Interaction>) -> Json<Reply> {
    Json(dispatch(&ctx, interaction).await)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

pub fn router(ctx: Context) -> Router {
    Router::new()
        .route("/interactions", post(interactions))
        .route("/health", get(health))
        .with_state(ctx)
}

pub async fn serve(ctx: Context, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx).into_make_service()).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::gateway::testing::RecordingGateway;

    fn app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = dir.path().join("server.db").to_string_lossy().into_owned();
        let pool = crate::build_pool(&url, 2).expect("pool builds");
        let config = Config::from_lookup(|var| match var {
            "DATABASE_URL" => Some(url.clone()),
            "GATEWAY_URL" => Some("http://relay.test".to_string()),
            "EARNING_REVIEW_CHANNEL_ID" => Some("1".to_string()),
            "SPENDING_REVIEW_CHANNEL_ID" => Some("2".to_string()),
            "EARNING_APPROVED_CHANNEL_ID" => Some("3".to_string()),
            "SPENDING_APPROVED_CHANNEL_ID" => Some("4".to_string()),
            _ => None,
        })
        .expect("config is complete");
        let ctx = Context::new(pool, Arc::new(RecordingGateway::default()), config);
        (router(ctx), dir)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_balance_over_http() {
        let (app, _dir) = app();
        let body = serde_json::json!({
            "actor": "42",
            "kind": { "command": { "name": "balance" } }
        });
        let response = app
            .oneshot(
                Request::post("/interactions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let reply: Reply = serde_json::from_slice(&bytes).unwrap();
        assert!(!reply.ephemeral);
        assert_eq!(
            reply.content.as_deref(),
            Some("Your Judgement Point balance is: `0`")
        );
    }

    #[tokio::test]
    async fn test_malformed_interaction_is_rejected() {
        let (app, _dir) = app();
        let response = app
            .oneshot(
                Request::post("/interactions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"actor":"1","kind":{"command":{"name":"lottery"}}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
