//! Tower layer that checks the API-key authorization header on every request

use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use http::Request;
use keyseal_core::SecurityError;
use keyseal_token::{validate_authorization_header, Claims};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::{GateConfig, Session};
use crate::response::reject;

/// Claims of an accepted request, keyed by the header they came from.
#[derive(Debug, Clone)]
pub struct Authorized {
    pub header: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct ApiKeyLayer {
    config: Arc<GateConfig>,
}

impl ApiKeyLayer {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for ApiKeyLayer {
    type Service = ApiKeyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

#[derive(Clone)]
pub struct ApiKeyService<S> {
    inner: S,
    config: Arc<GateConfig>,
}

impl<S> Service<Request<Body>> for ApiKeyService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let config = Arc::clone(&self.config);
        // take the instance poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if !config.applies_to(req.uri()) {
                return inner.call(req).await;
            }

            let outcome = match req.headers().get(&config.header) {
                Some(value) if !value.is_empty() => Some(match value.to_str() {
                    Ok(value) => validate_authorization_header(
                        &config.tokens,
                        Some(value),
                        config.encoding,
                    ),
                    Err(_) => Err(SecurityError::unauthorized("invalid authorization")),
                }),
                _ => None,
            };

            match outcome {
                None if config.required => {
                    let error = format!("missing {} header", config.header);
                    return Ok(reject(&config, &req, "unauthorized".into(), error));
                }
                None => {}
                Some(Ok(claims)) => {
                    debug!(apikey = %claims.apikey, path = %req.uri().path(), "request authorized");

                    if let Some(value) = &config.use_session {
                        if let Some(session) = req.extensions().get::<Session>() {
                            session.insert(&config.session_key, value);
                        }
                    }

                    req.extensions_mut().insert(Authorized {
                        header: config.header.to_string(),
                        claims: claims.clone(),
                    });
                    req.extensions_mut().insert(claims.clone());

                    if let Some(handler) = &config.success_handler {
                        if let Some(response) = handler(&req, &claims) {
                            return Ok(response);
                        }
                    }
                }
                Some(Err(e)) if config.required => {
                    warn!(error = %e, path = %req.uri().path(), "authorization rejected");
                    let message = e.to_string();
                    return Ok(reject(&config, &req, message.clone(), message));
                }
                Some(Err(e)) => {
                    debug!(error = %e, "authorization ignored, continuing anonymously");
                }
            }

            inner.call(req).await
        })
    }
}
