//! # Pipeline Tests
//!
//! Concurrency and failure behaviour of the refresh-aware request pipeline.

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures::future::join_all;
    use http::{StatusCode, header};
    use url::Url;

    use crate::{
        error::{AuthError, PipelineError},
        pipeline::RequestPipeline,
        session::{Credential, Session},
        test_support::{FakeBackend, RefreshReply},
        transport::PreparedRequest,
    };

    fn base_url() -> Url {
        Url::parse("http://localhost/api").unwrap()
    }

    fn signed_in_session(access: &str) -> Session {
        let session = Session::new(Duration::from_secs(60));
        session.set_credential(access, "r1", 3600);
        session
    }

    fn pipeline(backend: &Arc<FakeBackend>, session: Session) -> RequestPipeline {
        RequestPipeline::new(backend.clone(), session, base_url(), "vi")
    }

    fn get(pipeline: &RequestPipeline, path: &str) -> PreparedRequest {
        PreparedRequest::get(pipeline.url(path))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_unauthorized_requests_share_one_refresh() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let calls = (0..8).map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let request = get(&pipeline, &format!("/items/{i}"));
                pipeline.send(request).await
            })
        });
        let results = join_all(calls).await;

        assert_eq!(backend.refresh_calls(), 1);
        for result in results {
            let response = result.unwrap().unwrap();
            assert_eq!(response.status, StatusCode::OK);
        }
        assert_eq!(pipeline.session().access_token().as_deref(), Some("fresh"));
        assert!(!pipeline.is_refreshing());

        let replays = backend
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.authorization() == Some("Bearer fresh"))
            .count();
        assert_eq!(replays, 8);
    }

    #[tokio::test]
    async fn request_arriving_mid_refresh_is_replayed() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.send(get(&pipeline, "/first")).await }
        });
        while !pipeline.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let second = pipeline.send(get(&pipeline, "/second")).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(
            backend.requests_to("/api/second").last().unwrap().authorization(),
            Some("Bearer fresh")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_refresh_clears_credential_and_rejects_every_waiter() {
        let backend = Arc::new(
            FakeBackend::new("fresh").with_refresh(RefreshReply::Status(StatusCode::BAD_GATEWAY)),
        );
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let calls = (0..5).map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.send(get(&pipeline, &format!("/x/{i}"))).await })
        });
        let results = join_all(calls).await;

        assert_eq!(backend.refresh_calls(), 1);
        for result in results {
            let err = result.unwrap().unwrap_err();
            assert!(err.is_authorization());
            assert!(matches!(err, PipelineError::Auth(AuthError::RefreshFailed(_))));
        }
        assert_eq!(pipeline.session().credential(), Credential::default());
        assert!(!pipeline.is_refreshing());
    }

    #[tokio::test]
    async fn unreachable_refresh_endpoint_is_a_refresh_failure() {
        let backend =
            Arc::new(FakeBackend::new("fresh").with_refresh(RefreshReply::Unreachable));
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let err = pipeline.send(get(&pipeline, "/x")).await.unwrap_err();

        assert!(matches!(err, PipelineError::Auth(AuthError::RefreshFailed(_))));
        assert_eq!(pipeline.session().credential(), Credential::default());
    }

    #[tokio::test]
    async fn refresh_endpoint_unauthorized_is_terminal() {
        let backend = Arc::new(
            FakeBackend::new("fresh").with_refresh(RefreshReply::Status(StatusCode::UNAUTHORIZED)),
        );
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let err = pipeline.send(get(&pipeline, "/x")).await.unwrap_err();

        assert!(matches!(err, PipelineError::Auth(AuthError::RefreshRejected)));
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(pipeline.session().credential(), Credential::default());
    }

    #[tokio::test]
    async fn refresh_endpoint_sent_through_pipeline_is_never_refreshed() {
        let backend = Arc::new(
            FakeBackend::new("fresh").with_refresh(RefreshReply::Status(StatusCode::UNAUTHORIZED)),
        );
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let err = pipeline
            .send(PreparedRequest::post(pipeline.url("/auth/refresh-token")))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Auth(AuthError::RefreshRejected)));
        // The one call is the request itself, not a refresh triggered by it.
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(pipeline.session().credential(), Credential::default());
    }

    #[tokio::test]
    async fn second_unauthorized_after_replay_is_expired() {
        let backend = Arc::new(
            FakeBackend::new("fresh").with_refresh(RefreshReply::Rotate("still-wrong".into())),
        );
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        let err = pipeline.send(get(&pipeline, "/x")).await.unwrap_err();

        assert!(matches!(err, PipelineError::Auth(AuthError::Expired)));
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.requests_to("/api/x").len(), 2);
    }

    #[tokio::test]
    async fn signed_out_request_fails_as_not_authenticated() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        let pipeline = pipeline(&backend, Session::new(Duration::from_secs(60)));

        let err = pipeline.send(get(&pipeline, "/x")).await.unwrap_err();

        assert!(matches!(err, PipelineError::Auth(AuthError::NotAuthenticated)));
        assert_eq!(backend.requests_to("/api/auth/refresh-token").len(), 0);
    }

    #[tokio::test]
    async fn non_authorization_responses_pass_through() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        backend.route("/api/teapot", StatusCode::IM_A_TEAPOT, "short and stout");
        backend.route("/api/forbidden", StatusCode::FORBIDDEN, "");
        let pipeline = pipeline(&backend, signed_in_session("fresh"));

        let teapot = pipeline.send(get(&pipeline, "/teapot")).await.unwrap();
        let forbidden = pipeline.send(get(&pipeline, "/forbidden")).await.unwrap();

        assert_eq!(teapot.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(teapot.body, b"short and stout");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn send_json_maps_error_statuses() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        backend.route(
            "/api/bidder/bids",
            StatusCode::BAD_REQUEST,
            r#"{"status":400,"message":"bid too low"}"#,
        );
        let pipeline = pipeline(&backend, signed_in_session("fresh"));

        let err = pipeline
            .send_json::<serde_json::Value>(PreparedRequest::post(pipeline.url("/bidder/bids")))
            .await
            .unwrap_err();

        assert!(!err.is_authorization());
        assert!(err.to_string().contains("bid too low"));
    }

    #[tokio::test]
    async fn language_is_attached_to_every_request() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        let pipeline = pipeline(&backend, signed_in_session("stale"));

        pipeline.send(get(&pipeline, "/x")).await.unwrap();

        let requests = backend.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        for request in requests {
            assert_eq!(request.headers.get(header::ACCEPT_LANGUAGE).unwrap(), "vi");
        }
    }

    #[tokio::test]
    async fn ensure_fresh_only_refreshes_expired_credentials() {
        let backend = Arc::new(FakeBackend::new("fresh"));
        let session = Session::new(Duration::from_secs(60));
        session.set_credential("stale", "r1", 10);
        let pipeline = pipeline(&backend, session);

        pipeline.ensure_fresh().await.unwrap();
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(pipeline.session().access_token().as_deref(), Some("fresh"));

        pipeline.ensure_fresh().await.unwrap();
        assert_eq!(backend.refresh_calls(), 1);
    }
}
