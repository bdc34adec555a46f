//! # Offline Flows
//!
//! The gateway over the in-memory providers, exercising the policy that
//! lives in the gateway itself: quotas, request limits, rate limiting,
//! OAuth state checks and the middleware envelope.

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::json;

    use studio_gateway::adapters::memory::{MemoryOAuth, ScriptedGenerator};
    use studio_gateway::adapters::{offline_ports, InMemoryQuotaStore};
    use studio_gateway::ports::{ImageGenerator, OAuthIdentity, OAuthProvider, SystemTimeSource};
    use studio_gateway::GatewayConfig;

    use crate::support::TestApp;

    /// A request relayed by a proxy at `proxy` on behalf of `client`.
    fn proxied_request(uri: &str, proxy: [u8; 4], client: &str) -> Request<Body> {
        let mut req = Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((proxy, 41000))));
        req
    }

    // =========================================================================
    // QUOTA
    // =========================================================================

    #[tokio::test]
    async fn test_daily_quota_is_enforced_server_side() {
        let mut config = GatewayConfig::default();
        config.quota.daily_limit = 2;
        let app = TestApp::offline(config);
        let token = app.sign_up("ann@example.com", "ann").await;

        for expected in 1..=2 {
            let (status, body) = app
                .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["quota"]["used"], expected);
        }

        let (status, body) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "quota_exceeded");

        let (_, quota) = app.get("/api/quota", Some(&token)).await;
        assert_eq!(quota["exhausted"], true);
        assert_eq!(quota["remaining"], 0);
        assert_eq!(app.studio.metrics().snapshot().quota_rejections, 1);

        // another account has its own allowance
        let bob = app.sign_up("bob@example.com", "bob").await;
        let (status, _) = app
            .post("/api/generate", Some(&bob), json!({"prompt": "a dog"}))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_quota_snapshot_written_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("quota.json");
        let mut config = GatewayConfig::default();
        config.quota.daily_limit = 1;

        let store = Arc::new(InMemoryQuotaStore::with_snapshot(&snapshot));
        let app = TestApp::new(config, offline_ports(Arc::new(SystemTimeSource), store));
        let token = app.sign_up("ann@example.com", "ann").await;
        let (_, me) = app.get("/api/auth/me", Some(&token)).await;
        let (status, _) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        app.studio.flush_quota().await;
        drop(app);

        let ledger: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&snapshot).unwrap()).unwrap();
        assert_eq!(ledger[me["id"].as_str().unwrap()]["count"], 1);
        assert_eq!(InMemoryQuotaStore::with_snapshot(&snapshot).len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_and_style_validation() {
        let mut config = GatewayConfig::default();
        config.limits.max_prompt_chars = 20;
        let app = TestApp::offline(config);
        let token = app.sign_up("ann@example.com", "ann").await;

        let (status, body) = app
            .post("/api/generate", Some(&token), json!({"prompt": "   "}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_prompt");

        let (_, body) = app
            .post("/api/generate", Some(&token), json!({"prompt": "x".repeat(21)}))
            .await;
        assert_eq!(body["error"]["code"], "invalid_prompt");

        let (status, body) = app
            .post(
                "/api/generate",
                Some(&token),
                json!({"prompt": "a cat", "style_id": "99"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Unknown style: 99");

        let (_, quota) = app.get("/api/quota", Some(&token)).await;
        assert_eq!(quota["used"], 0);
    }

    #[tokio::test]
    async fn test_unconfigured_generator() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.set_configured(false);
        let mut ports = offline_ports(Arc::new(SystemTimeSource), Arc::new(InMemoryQuotaStore::new()));
        ports.generator = Arc::clone(&generator) as Arc<dyn ImageGenerator>;
        let app = TestApp::new(GatewayConfig::default(), ports);
        let token = app.sign_up("ann@example.com", "ann").await;

        let (status, body) = app
            .post("/api/generate", Some(&token), json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "not_configured");
        assert_eq!(generator.calls(), 0);

        let (_, health) = app.get("/health", None).await;
        assert_eq!(health["providers"]["generation"], false);
    }

    // =========================================================================
    // GOOGLE SIGN-IN
    // =========================================================================

    #[tokio::test]
    async fn test_google_state_is_checked_and_single_use() {
        let oauth = Arc::new(MemoryOAuth::new());
        oauth.register_code(
            "code-1",
            OAuthIdentity {
                sub: "g-42".into(),
                email: "ann@example.com".into(),
                name: "Ann".into(),
                picture: None,
                email_verified: true,
            },
        );
        let mut ports = offline_ports(Arc::new(SystemTimeSource), Arc::new(InMemoryQuotaStore::new()));
        ports.oauth = Arc::clone(&oauth) as Arc<dyn OAuthProvider>;
        let app = TestApp::new(GatewayConfig::default(), ports);

        let (status, auth) = app.get("/api/auth/google", None).await;
        assert_eq!(status, StatusCode::OK);
        let state = auth["state"].as_str().unwrap().to_string();
        assert!(auth["url"].as_str().unwrap().ends_with(&format!("state={state}")));

        let (status, body) = app
            .post(
                "/api/auth/google/callback",
                None,
                json!({"code": "code-1", "state": "forged"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Invalid or expired OAuth state");

        let (status, identity) = app
            .post(
                "/api/auth/google/callback",
                None,
                json!({"code": "code-1", "state": state}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(identity["sub"], "g-42");

        let (status, _) = app
            .post(
                "/api/auth/google/callback",
                None,
                json!({"code": "code-1", "state": state}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // =========================================================================
    // MIDDLEWARE ENVELOPE
    // =========================================================================

    #[tokio::test]
    async fn test_rate_limit_is_per_client() {
        let proxy = [10, 0, 0, 1];
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst_size = 2;
        config.rate_limit.trusted_proxies = vec![IpAddr::from(proxy)];
        let app = TestApp::offline(config);

        for _ in 0..2 {
            let (status, _, _) = app
                .send(proxied_request("/api/styles", proxy, "203.0.113.7"))
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, headers, body) = app
            .send(proxied_request("/api/styles", proxy, "203.0.113.7"))
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "rate_limited");
        assert!(headers.contains_key(header::RETRY_AFTER));

        let (status, _, _) = app
            .send(proxied_request("/api/styles", proxy, "198.51.100.9"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.studio.metrics().snapshot().rate_limited, 1);
    }

    #[tokio::test]
    async fn test_forged_forwarding_headers_are_ignored() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst_size = 1;
        let app = TestApp::offline(config);

        // a direct client claiming to be whitelisted localhost, then rotating
        for (i, forged) in ["127.0.0.1", "127.0.0.1", "192.0.2.1", "192.0.2.2"].iter().enumerate() {
            let mut req = Request::builder()
                .uri("/api/styles")
                .header("x-forwarded-for", *forged)
                .header("x-real-ip", *forged)
                .body(Body::empty())
                .unwrap();
            req.extensions_mut()
                .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 50], 41000))));
            let (status, _, _) = app.send(req).await;
            let expected = if i == 0 {
                StatusCode::OK
            } else {
                StatusCode::TOO_MANY_REQUESTS
            };
            assert_eq!(status, expected, "request {i} forging {forged}");
        }
        assert_eq!(app.studio.metrics().snapshot().rate_limited, 3);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = GatewayConfig::default();
        config.limits.max_request_size = 256;
        let app = TestApp::offline(config);

        let (status, body) = app
            .post("/api/enhance", None, json!({"prompt": "y".repeat(1024)}))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "payload_too_large");
    }

    #[tokio::test]
    async fn test_non_object_body_is_rejected() {
        let app = TestApp::offline(GatewayConfig::default());
        let (status, body) = app.post("/api/enhance", None, json!(["a", "b"])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_request_id_and_cors_headers() {
        let app = TestApp::offline(GatewayConfig::default());

        let (_, headers, _) = app
            .send(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(headers["x-request-id"], "req-123");

        let (status, headers, _) = app
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/generate")
                    .header(header::ORIGIN, "https://studio.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert!(status.is_success());
        assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_offline_enhancement() {
        let app = TestApp::offline(GatewayConfig::default());
        let (status, body) = app
            .post("/api/enhance", None, json!({"prompt": "a cat"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enhanced"], true);
        assert!(body["prompt"].as_str().unwrap().starts_with("a cat, "));

        let (status, body) = app.post("/api/enhance", None, json!({"prompt": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_prompt");
    }
}
