use axum::body::Body;
use axum::extract::OriginalUri;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{HOST, LOCATION};
use http::{Request, StatusCode};
use serde_json::{json, Value};

use crate::config::GateConfig;
use crate::negotiate::{accepts, is_xhr, Media};

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Short reason (`unauthorized`, or the validation error message)
    pub reason: String,
    /// Detail message
    pub error: String,
    /// Where a browser caller would be sent, when a redirect is configured
    pub redirect_url: Option<String>,
}

impl Rejection {
    /// `{success:false, code:401, message, error, url?}`
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "code": StatusCode::UNAUTHORIZED.as_u16(),
            "message": self.reason,
            "error": self.error,
        });
        if let Some(url) = &self.redirect_url {
            body["url"] = Value::String(url.clone());
        }
        body
    }
}

/// Absolute URL of the request as the caller addressed it.
///
/// Prefers [`OriginalUri`] so nested routers still report the full path.
pub fn full_url(req: &Request<Body>) -> String {
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(req.uri());

    let secure = uri.scheme_str() == Some("https")
        || req
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
    let scheme = if secure { "https" } else { "http" };

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("{scheme}://{host}{path}")
}

/// `redirect` with `param=<url-encoded target>` appended to its query.
pub fn redirect_url(redirect: &str, param: &str, target: &str) -> String {
    let separator = if redirect.contains('?') { '&' } else { '?' };
    format!(
        "{redirect}{separator}{param}={}",
        urlencoding::encode(target)
    )
}

pub(crate) fn reject(
    config: &GateConfig,
    req: &Request<Body>,
    reason: String,
    error: String,
) -> Response {
    let rejection = Rejection {
        reason,
        error,
        redirect_url: config
            .redirect
            .as_deref()
            .map(|to| redirect_url(to, &config.redirect_url_param, &full_url(req))),
    };
    tracing::debug!(
        path = %req.uri().path(),
        reason = %rejection.reason,
        "request rejected"
    );

    if let Some(handler) = &config.error_handler {
        return handler(req, &rejection);
    }

    if accepts(req.headers()) == Media::Json || is_xhr(req.headers()) {
        return (StatusCode::UNAUTHORIZED, Json(rejection.to_json())).into_response();
    }

    if let Some(location) = &rejection.redirect_url {
        return (StatusCode::FOUND, [(LOCATION, location.clone())]).into_response();
    }

    if let Some(render) = &config.render_unauthorized {
        let mut response = render(&rejection);
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        return response;
    }

    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}
