//! Defines routes for the publishing pipeline.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST /api/sign-upload`: issue a single-use credential for a path
//!   - `PUT  /storage/v1/object/upload/sign/photos/{key}?token=`: consume it
//!   - `GET  /storage/v1/object/public/photos/{key}`: public read
//!
//! - **Pages**
//!   - `POST /api/create-valentine`: validate and persist a page
//!   - `GET  /api/valentines/{id}`: page record incl. payment status
//!   - `GET  /api/debug-photos`: five newest pages (diagnostic)
//!
//! - **Payments**
//!   - `POST /api/create-order`: order for the unlock price
//!   - `POST /api/verify-payment`: verify a checkout and unlock the page

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        page_handlers::{create_valentine, debug_photos, get_valentine},
        payment_handlers::{create_order, verify_payment},
        upload_handlers::{get_object, sign_upload, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for every endpoint.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // uploads
        .route("/api/sign-upload", post(sign_upload))
        .route(
            "/storage/v1/object/upload/sign/photos/{key}",
            put(upload_object),
        )
        .route("/storage/v1/object/public/photos/{key}", get(get_object))
        // pages
        .route("/api/create-valentine", post(create_valentine))
        .route("/api/valentines/{id}", get(get_valentine))
        .route("/api/debug-photos", get(debug_photos))
        // payments
        .route("/api/create-order", post(create_order))
        .route("/api/verify-payment", post(verify_payment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        services::{
            page_service::PageService,
            payment_service::{LocalOrderGateway, PaymentService, payment_signature},
            storage_service::StorageService,
        },
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "router-secret";

    async fn app(dir: &std::path::Path) -> Router {
        let pool = Arc::new(db::connect("sqlite::memory:", 1).await.unwrap());
        db::run_migrations(&pool).await.unwrap();
        let state = AppState {
            storage: StorageService::new(pool.clone(), dir, "http://localhost:3000"),
            pages: PageService::new(pool.clone()),
            payments: PaymentService::new(pool, Arc::new(LocalOrderGateway), SECRET),
        };
        routes().with_state(state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn six_photos() -> Vec<String> {
        (0..6)
            .map(|i| format!("http://localhost:3000/storage/v1/object/public/photos/{i}_p.jpg"))
            .collect()
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, body) = send(
            &app,
            Request::get("/healthz").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readyz_checks_schema_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, body) =
            send(&app, Request::get("/readyz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
        assert_eq!(body["checks"]["disk"]["ok"], true);
    }

    #[tokio::test]
    async fn sign_upload_without_path_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, body) = send(&app, post_json("/api/sign-upload", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing path");
    }

    #[tokio::test]
    async fn signed_upload_round_trip_and_reuse_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, cred) = send(
            &app,
            post_json("/api/sign-upload", json!({"path": "1700_a.jpg"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cred["path"], "1700_a.jpg");
        let token = cred["token"].as_str().unwrap().to_string();

        let put = |body: &'static str| {
            Request::put(format!(
                "/storage/v1/object/upload/sign/photos/1700_a.jpg?token={token}"
            ))
            .header("content-type", "image/jpeg")
            .body(Body::from(body))
            .unwrap()
        };
        let (status, uploaded) = send(&app, put("photo")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(uploaded["size"], 5);

        let (status, _) = send(&app, put("again")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            post_json("/api/sign-upload", json!({"path": "1700_a.jpg"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        let res = app
            .clone()
            .oneshot(
                Request::get("/storage/v1/object/public/photos/1700_a.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "image/jpeg");
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"photo");
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        for uri in ["/api/sign-upload", "/api/create-valentine", "/api/verify-payment"] {
            let (status, body) = send(
                &app,
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["status"], 400, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }

        // No content type is fine when the body is JSON.
        let (status, cred) = send(
            &app,
            Request::post("/api/sign-upload")
                .body(Body::from(r#"{"path":"7_plain.jpg"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cred["path"], "7_plain.jpg");
    }

    #[tokio::test]
    async fn upload_without_token_is_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, _) = send(
            &app,
            Request::put("/storage/v1/object/upload/sign/photos/x.jpg")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_valentine_validates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, body) = send(
            &app,
            post_json(
                "/api/create-valentine",
                json!({"recipientName": "Alex", "message": "I love you", "photos": ["a", "b"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("id").is_none());

        let photos = six_photos();
        let (status, body) = send(
            &app,
            post_json(
                "/api/create-valentine",
                json!({"partner_name": "Alex", "message": "I love you", "photos": photos, "music_url": null}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, page) = send(
            &app,
            Request::get(format!("/api/valentines/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["recipientName"], "Alex");
        assert_eq!(page["paymentStatus"], "unpaid");
        assert_eq!(page["photos"], json!(photos));

        let (status, listing) = send(
            &app,
            Request::get("/api/debug-photos").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["data"][0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn unknown_or_malformed_page_ids() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, _) = send(
            &app,
            Request::get(format!("/api/valentines/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Request::get("/api/valentines/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn payment_order_then_verification_unlocks() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (_, created) = send(
            &app,
            post_json(
                "/api/create-valentine",
                json!({"recipientName": "Alex", "message": "hi", "photos": six_photos()}),
            ),
        )
        .await;
        let page_id = created["id"].as_str().unwrap().to_string();

        let (status, order) = send(
            &app,
            Request::post("/api/create-order").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["amount"], 4900);
        assert_eq!(order["currency"], "INR");
        let order_id = order["id"].as_str().unwrap().to_string();

        // Legacy field names, no content type.
        let bad = json!({
            "orderCreationId": order_id,
            "razorpayPaymentId": "pay_1",
            "razorpaySignature": "00",
            "valentineId": page_id,
        });
        let (status, body) = send(
            &app,
            Request::post("/api/verify-payment")
                .body(Body::from(bad.to_string()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isOk"], false);

        let good = json!({
            "orderId": order_id,
            "paymentId": "pay_1",
            "signature": payment_signature(SECRET, &order_id, "pay_1").unwrap(),
            "pageId": page_id,
        });
        let (status, body) = send(&app, post_json("/api/verify-payment", good)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isOk"], true);

        let (_, page) = send(
            &app,
            Request::get(format!("/api/valentines/{page_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(page["paymentStatus"], "paid");
    }

    #[tokio::test]
    async fn verify_payment_with_missing_fields_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, body) =
            send(&app, post_json("/api/verify-payment", json!({"orderId": "o"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("paymentId"));
    }
}
