//! # Live Adapter Flows
//!
//! The gateway with its real HTTP adapters, talking to the fake provider
//! cloud from [`crate::support`].
//!
//! ## Flows Tested:
//!
//! 1. **Account journey**: sign up, identify, generate, list, sign out
//! 2. **Failure reconciliation**: model refusals, provider outages, circuits
//! 3. **Degradation**: storage and row failures never lose a generated image

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::support::{FakeCloud, TestApp};

    // =========================================================================
    // ACCOUNT JOURNEY
    // =========================================================================

    #[tokio::test]
    async fn test_full_generation_journey() {
        let cloud = FakeCloud::spawn().await;
        cloud.set_pending_polls(2);
        let app = TestApp::live(&cloud);

        let token = app.sign_up("Ann@Example.com", "ann").await;
        let (status, me) = app.get("/api/auth/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "ann");
        assert_eq!(me["email"], "ann@example.com");

        let (status, generated) = app
            .post(
                "/api/generate",
                Some(&token),
                json!({"prompt": "  a lighthouse at dusk ", "style_id": "1",
                       "settings": {"aspect_ratio": "16:9", "output_format": "png"}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{generated}");
        assert_eq!(generated["saved"], true);
        assert_eq!(generated["quota"]["used"], 1);
        assert!(generated["provider_url"]
            .as_str()
            .unwrap()
            .starts_with(&format!("{}/files/pred-", cloud.base_url)));

        let stored_prefix = format!(
            "{}/storage/v1/object/public/generated-images/",
            cloud.base_url
        );
        let image_url = generated["image_url"].as_str().unwrap();
        assert!(image_url.starts_with(&stored_prefix), "{image_url}");
        assert!(image_url.ends_with(".png"));

        let uploads = cloud.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].content_type, "image/png");
        assert!(uploads[0].size > 0);
        assert!(uploads[0].path.starts_with(me["id"].as_str().unwrap()));

        let (status, page) = app.get("/api/images", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_items"], 1);
        assert_eq!(page["items"][0]["prompt"], "a lighthouse at dusk");
        assert_eq!(page["items"][0]["aspect_ratio"], "16:9");
        assert_eq!(page["items"][0]["image_url"], image_url);

        let (status, _) = app.post("/api/auth/signout", Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = app.get("/api/auth/me", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthenticated");
    }

    #[tokio::test]
    async fn test_history_is_per_user_and_explore_is_shared() {
        let cloud = FakeCloud::spawn().await;
        let app = TestApp::live(&cloud);
        let ann = app.sign_up("ann@example.com", "ann").await;
        let bob = app.sign_up("bob@example.com", "bob").await;

        for (token, prompt) in [(&ann, "first"), (&bob, "second"), (&ann, "third")] {
            let (status, body) = app
                .post("/api/generate", Some(token), json!({"prompt": prompt}))
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }
        assert_eq!(cloud.row_count(), 3);

        let (_, mine) = app.get("/api/images", Some(&ann)).await;
        let prompts: Vec<_> = mine["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["prompt"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(prompts, vec!["third", "first"]);

        let (status, explore) = app.get("/api/explore", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(explore["total_items"], 3);
        assert_eq!(explore["items"][0]["prompt"], "third");
    }

    #[tokio::test]
    async fn test_credential_failures_are_reconciled() {
        let cloud = FakeCloud::spawn().await;
        let app = TestApp::live(&cloud);
        app.sign_up("ann@example.com", "ann").await;

        let (status, body) = app
            .post(
                "/api/auth/signin",
                None,
                json!({"email": "ann@example.com", "password": "wrong-password"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_credentials");
        assert_eq!(body["error"]["message"], "Invalid login credentials");

        let (status, body) = app
            .post(
                "/api/auth/signup",
                None,
                json!({"email": "ann@example.com", "password": "Passw0rd!", "username": "ann2"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "User already registered");

        let (status, session) = app
            .post(
                "/api/auth/signin",
                None,
                json!({"email": "ann@example.com", "password": "Passw0rd!"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(session["access_token"].is_string());
    }

    // =========================================================================
    // FAILURE RECONCILIATION
    // =========================================================================

    #[tokio::test]
    async fn test_model_refusal_does_not_consume_quota() {
        let cloud = FakeCloud::spawn().await;
        let app = TestApp::live(&cloud);
        let token = app.sign_up("ann@example.com", "ann").await;

        let (status, body) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a forbidden scene"}))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "generation_failed");
        assert_eq!(body["error"]["message"], "NSFW content detected");
        assert_eq!(body["error"]["retryable"], true);

        let (_, quota) = app.get("/api/quota", Some(&token)).await;
        assert_eq!(quota["used"], 0);
        assert!(cloud.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_requests_cannot_exceed_quota() {
        let cloud = FakeCloud::spawn().await;
        cloud.set_pending_polls(3);
        let mut config = cloud.config();
        config.quota.daily_limit = 2;
        let app = TestApp::live_with(config);
        let token = app.sign_up("ann@example.com", "ann").await;

        let body = || json!({"prompt": "a cat"});
        let t = Some(token.as_str());
        let (a, b, c, d, e, f) = tokio::join!(
            app.post("/api/generate", t, body()),
            app.post("/api/generate", t, body()),
            app.post("/api/generate", t, body()),
            app.post("/api/generate", t, body()),
            app.post("/api/generate", t, body()),
            app.post("/api/generate", t, body())
        );
        let statuses: Vec<StatusCode> = [a, b, c, d, e, f].into_iter().map(|(s, _)| s).collect();
        let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
        let refused = statuses
            .iter()
            .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
            .count();
        assert_eq!((ok, refused), (2, 4), "{statuses:?}");

        let (_, quota) = app.get("/api/quota", Some(&token)).await;
        assert_eq!(quota["used"], 2);
        assert_eq!(cloud.row_count(), 2);
    }

    #[tokio::test]
    async fn test_provider_outage_opens_circuit() {
        let cloud = FakeCloud::spawn().await;
        let mut config = cloud.config();
        config.circuit_breaker.failure_threshold = 2;
        config.circuit_breaker.open_timeout_secs = 60;
        let app = TestApp::live_with(config);
        let token = app.sign_up("ann@example.com", "ann").await;

        cloud.set_prediction_status(500);
        for _ in 0..2 {
            let (status, body) = app
                .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
                .await;
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(body["error"]["code"], "generation_failed");
        }

        // the provider recovers but the circuit stays open until the timeout
        cloud.set_prediction_status(0);
        let (status, headers, body) = app
            .send(crate::support::request(
                axum::http::Method::POST,
                "/api/generate",
                Some(&token),
                Some(json!({"prompt": "a cat"})),
            ))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "overloaded");
        assert!(body["error"]["retry_after_ms"].as_u64().unwrap() > 0);
        assert!(headers.contains_key(axum::http::header::RETRY_AFTER));

        let (_, health) = app.get("/health", None).await;
        let generation = health["circuits"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["provider"] == "generation")
            .cloned()
            .unwrap();
        assert_eq!(generation["state"], "open");
    }

    #[tokio::test]
    async fn test_overloaded_model_maps_to_503() {
        let cloud = FakeCloud::spawn().await;
        let app = TestApp::live(&cloud);
        let token = app.sign_up("ann@example.com", "ann").await;

        cloud.set_prediction_status(503);
        let (status, body) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "overloaded");
    }

    // =========================================================================
    // DEGRADATION
    // =========================================================================

    #[tokio::test]
    async fn test_storage_outage_keeps_provider_url() {
        let cloud = FakeCloud::spawn().await;
        cloud.set_storage_down(true);
        let app = TestApp::live(&cloud);
        let token = app.sign_up("ann@example.com", "ann").await;

        let (status, generated) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(generated["image_url"], generated["provider_url"]);
        assert_eq!(generated["saved"], true);
        assert_eq!(app.studio.metrics().snapshot().storage_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_row_failure_still_returns_image() {
        let cloud = FakeCloud::spawn().await;
        cloud.set_rows_down(true);
        let app = TestApp::live(&cloud);
        let token = app.sign_up("ann@example.com", "ann").await;

        let (status, generated) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(generated["saved"], false);
        assert!(generated["image"].is_null());
        assert_eq!(generated["quota"]["used"], 1);

        let (status, body) = app.get("/api/images", Some(&token)).await;
        assert!(status.is_server_error());
        assert_eq!(body["error"]["code"], "storage");
    }

    #[tokio::test]
    async fn test_enhancement_and_its_fallback() {
        let cloud = FakeCloud::spawn().await;
        let app = TestApp::live(&cloud);

        let (status, body) = app
            .post("/api/enhance", None, json!({"prompt": "a quiet harbor"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enhanced"], true);
        assert_eq!(
            body["prompt"],
            "a quiet harbor, cinematic lighting, ultra detailed"
        );

        cloud.set_enhance_status(500);
        let (status, body) = app
            .post("/api/enhance", None, json!({"prompt": "a quiet harbor"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enhanced"], false);
        assert_eq!(body["prompt"], "a quiet harbor");
        assert_eq!(app.studio.metrics().snapshot().enhancement_failures, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_google_sign_in() {
        let cloud = FakeCloud::spawn().await;
        let app = TestApp::live(&cloud);
        let (status, body) = app.get("/api/auth/google", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "not_configured");
    }
}
