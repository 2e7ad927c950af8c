mod error;
mod extractors;
mod transform;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use rollup_common::types::ServiceInfo;
use rollup_config::{init_tracing, AppConfig};
use rollup_db::document::pg_repository::PgDocumentStore;
use rollup_db::transform::document_repository::DocumentTransformRepository;
use rollup_db::transform::repositories::TransformRepository;
use rollup_engine::TransformControl;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub control: TransformControl<Arc<dyn TransformRepository>>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("rollup-api"))
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .merge(transform::router())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    tracing::info!(service = "rollup-api", primary_term = config.primary_term, "starting");

    let pool = rollup_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let store = PgDocumentStore::new(pool, config.primary_term);
    store
        .ensure_schema()
        .await
        .expect("failed to prepare document schema");

    let repo: Arc<dyn TransformRepository> = Arc::new(DocumentTransformRepository::new(store));
    let state = AppState {
        control: TransformControl::new(repo),
    };

    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rollup_db::document::memory::InMemoryDocumentStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let repo: Arc<dyn TransformRepository> = Arc::new(DocumentTransformRepository::new(
            InMemoryDocumentStore::new(),
        ));
        build_router(AppState {
            control: TransformControl::new(repo),
        })
    }

    async fn read_body(resp: axum::http::Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn transform_body() -> Value {
        json!({
            "transform": {
                "description": "orders per region",
                "schedule": { "interval": { "period": 1, "unit": "minutes" } },
                "source": { "index": "orders" },
                "destination": { "index": "orders-by-region" },
                "page_size": 500,
                "groups": [ { "terms": { "source_field": "region" } } ]
            }
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> axum::http::Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    fn token_query(doc: &Value) -> String {
        format!(
            "if_seq_no={}&if_primary_term={}",
            doc["_seq_no"], doc["_primary_term"]
        )
    }

    // ── Health / Info ───────────────────────────────────────────────

    #[tokio::test]
    async fn health_returns_ok() {
        let resp = send(&test_app(), "GET", "/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn info_names_the_service() {
        let resp = send(&test_app(), "GET", "/info", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await["name"], "rollup-api");
    }

    // ── Transforms ──────────────────────────────────────────────────

    #[tokio::test]
    async fn put_creates_with_location_and_token() {
        let app = test_app();
        let resp = send(&app, "PUT", "/_transform/orders-rollup", Some(transform_body())).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/_transform/orders-rollup"
        );

        let body = read_body(resp).await;
        assert_eq!(body["_id"], "orders-rollup");
        assert_eq!(body["_version"], 1);
        assert!(body["_seq_no"].as_i64().unwrap() >= 1);
        assert_eq!(body["_primary_term"], 1);
        assert_eq!(body["transform"]["status"], "created");
        assert_eq!(body["transform"]["checkpoint"]["cursor"], 0);
        assert_eq!(body["transform"]["page_size"], 500);
    }

    #[tokio::test]
    async fn get_returns_404_for_unknown_id() {
        let resp = send(&test_app(), "GET", "/_transform/missing", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(read_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn put_existing_without_token_is_conflict() {
        let app = test_app();
        let created = read_body(send(&app, "PUT", "/_transform/j1", Some(transform_body())).await).await;
        let resp = send(&app, "PUT", "/_transform/j1", Some(transform_body())).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let conflict = read_body(resp).await;
        assert_eq!(conflict["_seq_no"], created["_seq_no"]);
        assert_eq!(conflict["_primary_term"], created["_primary_term"]);
    }

    #[tokio::test]
    async fn replace_with_token_then_stale_token_conflicts() {
        let app = test_app();
        let created = read_body(send(&app, "PUT", "/_transform/j1", Some(transform_body())).await).await;

        let mut body = transform_body();
        body["transform"]["description"] = json!("renamed");
        let uri = format!("/_transform/j1?{}", token_query(&created));
        let resp = send(&app, "PUT", &uri, Some(body.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let replaced = read_body(resp).await;
        assert_eq!(replaced["_version"], 2);
        assert_eq!(replaced["transform"]["description"], "renamed");

        let resp = send(&app, "PUT", &uri, Some(body)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let conflict = read_body(resp).await;
        assert_eq!(conflict["_seq_no"], replaced["_seq_no"]);
        assert_eq!(conflict["_primary_term"], replaced["_primary_term"]);
    }

    #[tokio::test]
    async fn invalid_definition_is_bad_request() {
        let mut body = transform_body();
        body["transform"]["destination"]["index"] = json!("orders");
        let resp = send(&test_app(), "PUT", "/_transform/j1", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn half_a_token_is_bad_request() {
        let resp = send(
            &test_app(),
            "PUT",
            "/_transform/j1?if_seq_no=3",
            Some(transform_body()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_then_stop_moves_status() {
        let app = test_app();
        let created = read_body(send(&app, "PUT", "/_transform/j1", Some(transform_body())).await).await;

        let uri = format!("/_transform/j1/_start?{}", token_query(&created));
        let resp = send(&app, "POST", &uri, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let started = read_body(resp).await;
        assert_eq!(started["transform"]["status"], "started");

        // Stopping with the pre-start token loses the race.
        let stale = format!("/_transform/j1/_stop?{}", token_query(&created));
        assert_eq!(send(&app, "POST", &stale, None).await.status(), StatusCode::CONFLICT);

        let uri = format!("/_transform/j1/_stop?{}", token_query(&started));
        let resp = send(&app, "POST", &uri, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let stopped = read_body(resp).await;
        assert_eq!(stopped["transform"]["status"], "stopped");

        let again = format!("/_transform/j1/_stop?{}", token_query(&stopped));
        assert_eq!(send(&app, "POST", &again, None).await.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn start_without_token_is_bad_request() {
        let app = test_app();
        send(&app, "PUT", "/_transform/j1", Some(transform_body())).await;
        let resp = send(&app, "POST", "/_transform/j1/_start", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_requires_current_token() {
        let app = test_app();
        let created = read_body(send(&app, "PUT", "/_transform/j1", Some(transform_body())).await).await;

        assert_eq!(
            send(&app, "DELETE", "/_transform/j1", None).await.status(),
            StatusCode::BAD_REQUEST
        );

        let stale = "/_transform/j1?if_seq_no=999&if_primary_term=1";
        assert_eq!(send(&app, "DELETE", stale, None).await.status(), StatusCode::CONFLICT);
        assert_eq!(
            send(&app, "GET", "/_transform/j1", None).await.status(),
            StatusCode::OK
        );

        let uri = format!("/_transform/j1?{}", token_query(&created));
        let resp = send(&app, "DELETE", &uri, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_body(resp).await["result"], "deleted");

        assert_eq!(
            send(&app, "GET", "/_transform/j1", None).await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(send(&app, "DELETE", &uri, None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_returns_all_transforms() {
        let app = test_app();
        for id in ["a", "b"] {
            send(&app, "PUT", &format!("/_transform/{id}"), Some(transform_body())).await;
        }
        let resp = send(&app, "GET", "/_transform", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_body(resp).await;
        assert_eq!(body["total_transforms"], 2);
        assert_eq!(body["transforms"][0]["_id"], "a");
        assert_eq!(body["transforms"][1]["_id"], "b");
    }
}
