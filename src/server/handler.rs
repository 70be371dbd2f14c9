// src/server/handler.rs
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::health::{AvailabilityStatus, CheckContext, Checker, CheckerResult};

/// Serves the checker's result as JSON on a single path.
///
/// `up` answers 200, `down` and `unknown` answer 503.
#[derive(Clone)]
pub struct HealthHandler {
    checker: Checker,
    path: Arc<str>,
}

impl HealthHandler {
    pub fn new(checker: Checker, path: impl Into<String>) -> Self {
        Self {
            checker,
            path: Arc::from(path.into()),
        }
    }

    async fn handle(checker: Checker, path: Arc<str>, req: Request<Body>) -> Response<Body> {
        if req.uri().path() != &*path {
            return plain(StatusCode::NOT_FOUND, "Not Found");
        }
        if req.method() != Method::GET {
            return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        let result = checker.check(&CheckContext::new()).await;
        health_response(&result)
    }
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let checker = self.checker.clone();
        let path = self.path.clone();
        Box::pin(async move { Ok(Self::handle(checker, path, req).await) })
    }
}

fn status_code(status: AvailabilityStatus) -> StatusCode {
    match status {
        AvailabilityStatus::Up => StatusCode::OK,
        AvailabilityStatus::Unknown | AvailabilityStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn health_response(result: &CheckerResult) -> Response<Body> {
    let body = match serde_json::to_vec(result) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(%err, "failed to serialize health result");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status_code(result.status);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("-1"));
    response
}

fn plain(status: StatusCode, text: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{probe_fn, CheckDefinition};
    use tower::ServiceExt;

    fn handler(fail: bool) -> HealthHandler {
        let checker = Checker::builder()
            .with_check(CheckDefinition::new(
                "dep",
                probe_fn(move |_| async move {
                    if fail {
                        anyhow::bail!("dependency unreachable");
                    }
                    Ok(())
                }),
            ))
            .build()
            .unwrap();
        HealthHandler::new(checker, "/health")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_up_is_ok() {
        let response = handler(false).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[EXPIRES], "-1");
        assert_eq!(response.headers()[PRAGMA], "no-cache");

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "up");
        assert_eq!(json["details"]["dep"]["status"], "up");
    }

    #[tokio::test]
    async fn test_down_is_unavailable() {
        let response = handler(true).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["details"]["dep"]["error"], "dependency unreachable");
    }

    #[tokio::test]
    async fn test_other_path_not_found() {
        let response = handler(false).oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_not_allowed() {
        let req = Request::post("/health").body(Body::empty()).unwrap();
        let response = handler(false).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_unknown_maps_to_unavailable() {
        assert_eq!(status_code(AvailabilityStatus::Unknown), StatusCode::SERVICE_UNAVAILABLE);
    }
}
