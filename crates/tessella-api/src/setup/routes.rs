//! Router construction and middleware layering.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use http::header::HeaderValue;
use tessella_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router> {
    let cors = setup_cors(config)?;

    let router = Router::new()
        .route("/health", get(health))
        .route("/ingest/sip", post(handlers::ingest::ingest_sip))
        .route("/assets", get(handlers::assets::list_assets))
        .route("/assets/{id}", get(handlers::assets::get_asset))
        .route("/assets/{id}", delete(handlers::assets::delete_asset))
        .route("/assets/{id}/export", get(handlers::export::export_asset))
        .route("/iiif/{id}/manifest", get(handlers::manifest::get_manifest))
        .with_state(state)
        // Axum's built-in limit is replaced by the tower-http layer so the
        // ceiling applies to streamed multipart bodies as well.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

/// Manifests are consumed by browser-based viewers on other origins, so the
/// default posture is permissive.
fn setup_cors(config: &Config) -> Result<CorsLayer> {
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };
    Ok(cors)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::Value as JsonValue;
    use tessella_core::config::RegistryBackend;
    use tessella_core::Config;
    use tower::ServiceExt;

    const HELLO_SHA256: &str =
        "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9";

    fn test_config(upload_dir: &std::path::Path) -> Config {
        Config {
            server_port: 0,
            cors_origins: vec!["*".to_string()],
            environment: "test".to_string(),
            registry_backend: RegistryBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            upload_dir: upload_dir.to_path_buf(),
            max_upload_bytes: 10 * 1024 * 1024,
            api_public_url: Some("http://api.test".to_string()),
            image_service_url: Some("http://images.test/iiif/2".to_string()),
            convert_extensions: vec![],
            vips_path: "vips".to_string(),
            exiftool_path: "false".to_string(),
            worker_count: 1,
            queue_depth: 4,
            source_organization: "Test Organization".to_string(),
        }
    }

    async fn test_app(upload_dir: &std::path::Path) -> Router {
        let config = test_config(upload_dir);
        let (_state, router) = crate::setup::initialize_app(config).await.unwrap();
        router
    }

    fn multipart_ingest_request(hash: &str) -> Request<Body> {
        let boundary = "test-boundary";
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"manifest\"\r\n\r\n\
             {{\"hash\":\"{hash}\",\"metadata\":{{\"title\":\"Test Scroll\"}}}}\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"hello.bin\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             hello world!\r\n\
             --{b}--\r\n",
            b = boundary,
            hash = hash,
        );
        Request::builder()
            .method("POST")
            .uri("/ingest/sip")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> JsonValue {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path()).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ingest_then_read_manifest_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path()).await;

        let response = app
            .clone()
            .oneshot(multipart_ingest_request(HELLO_SHA256))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = body_json(response).await;
        assert_eq!(receipt["fixity_check"], "PASS");
        assert_eq!(receipt["sha256"], HELLO_SHA256);
        assert_eq!(receipt["file_size"], 12);
        let asset_id = receipt["asset_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/assets/{}", asset_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let asset = body_json(response).await;
        assert_eq!(asset["filename"], "hello.bin");
        assert_eq!(asset["status"], "ready");

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/iiif/{}/manifest", asset_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let manifest = body_json(response).await;
        assert_eq!(manifest["type"], "Manifest");
        assert_eq!(
            manifest["id"],
            format!("http://api.test/iiif/{}/manifest", asset_id)
        );

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/assets/{}/export", asset_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!("{}-bag.tar.gz", asset_id)));
    }

    #[tokio::test]
    async fn ingest_with_bad_digest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path()).await;

        let response = app
            .clone()
            .oneshot(multipart_ingest_request("deadbeef"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "FIXITY_MISMATCH");

        let response = app
            .oneshot(Request::get("/assets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let listing = body_json(response).await;
        assert_eq!(listing["total"], 0);
    }

    #[tokio::test]
    async fn unknown_asset_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path()).await;

        let id = uuid::Uuid::new_v4();
        for uri in [
            format!("/assets/{}", id),
            format!("/iiif/{}/manifest", id),
            format!("/assets/{}/export", id),
        ] {
            let response = app
                .clone()
                .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }
}
