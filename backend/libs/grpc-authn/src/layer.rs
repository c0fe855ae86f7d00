//! Tower layer running an authenticator in front of a gRPC service
//!
//! Works below tonic's codec so unary and streaming calls are handled alike.
//! The authenticator sees the request headers as metadata; whatever it strips
//! is gone from the request the inner service receives. On success the
//! `Requester` is inserted into the request extensions, where tonic exposes
//! it to handlers (see `RequesterExt`). On failure the call ends with a
//! trailers-only gRPC status and the inner service is never called.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::{HeaderValue, CONTENT_TYPE};
use tonic::metadata::MetadataMap;
use tonic::Status;
use tower::{Layer, Service};
use tracing::error;

use crate::authenticator::Authenticator;

#[derive(Clone)]
pub struct AuthnLayer {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthnLayer {
    pub fn new(authenticator: impl Authenticator + 'static) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
        }
    }

    pub fn from_shared(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthnLayer {
    type Service = AuthnService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthnService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthnService<S> {
    inner: S,
    authenticator: Arc<dyn Authenticator>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AuthnService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // Use the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authenticator = self.authenticator.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let mut metadata = MetadataMap::from_headers(std::mem::take(&mut parts.headers));
            let outcome = authenticator.authenticate(&mut metadata).await;
            parts.headers = metadata.into_headers();

            match outcome {
                Ok(requester) => {
                    parts.extensions.insert(requester);
                    inner.call(http::Request::from_parts(parts, body)).await
                }
                Err(err) => Ok(status_response(err.to_status())),
            }
        })
    }
}

/// Trailers-only gRPC response carrying `status`
fn status_response<B: Default>(status: Status) -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    if let Err(e) = status.add_header(headers) {
        error!(error = %e, "failed to encode gRPC status headers");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::BasicAuthenticator;
    use crate::identity::Requester;
    use crate::metadata::AUTHORIZATION;
    use std::convert::Infallible;
    use tower::ServiceExt;

    async fn echo(req: http::Request<()>) -> Result<http::Response<String>, Infallible> {
        let user = match req.extensions().get::<Requester>() {
            Some(Requester::Static { username }) => username.clone(),
            _ => "anonymous".to_string(),
        };
        let forwarded = req.headers().contains_key(AUTHORIZATION);
        Ok(http::Response::new(format!("{user} forwarded={forwarded}")))
    }

    #[tokio::test]
    async fn test_layer_attaches_requester_and_strips_header() {
        let service = AuthnLayer::new(BasicAuthenticator::new("ops", "pw")).layer(tower::service_fn(echo));

        let req = http::Request::builder()
            .header(AUTHORIZATION, "Basic b3BzOnB3")
            .header("x-request-id", "abc")
            .body(())
            .unwrap();

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.into_body(), "ops forwarded=false");
    }

    #[tokio::test]
    async fn test_layer_rejects_without_calling_inner() {
        let service = AuthnLayer::new(BasicAuthenticator::new("ops", "pw")).layer(tower::service_fn(echo));

        let response = service.oneshot(http::Request::new(())).await.unwrap();

        assert!(response.body().is_empty());
        assert_eq!(response.headers()["content-type"], "application/grpc");
        assert_eq!(
            response.headers()["grpc-status"],
            (tonic::Code::Unauthenticated as i32).to_string().as_str()
        );
    }
}
