use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::response::Response;
use http::{HeaderName, Request, Uri};
use keyseal_core::config::{GateSettings, TokenParams};
use keyseal_core::{Encoding, SecurityError, SecurityResult};
use keyseal_token::{Claims, SessionTokens};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::response::Rejection;

/// Replaces the built-in rejection entirely.
pub type ErrorHandler = Arc<dyn Fn(&Request<Body>, &Rejection) -> Response + Send + Sync>;
/// Renders the browser rejection page; the gate forces status 401.
pub type RenderUnauthorized = Arc<dyn Fn(&Rejection) -> Response + Send + Sync>;
/// Runs after a successful check. `Some` answers the request without calling the inner service.
pub type SuccessHandler = Arc<dyn Fn(&Request<Body>, &Claims) -> Option<Response> + Send + Sync>;

/// Per-caller session storage the gate writes into after a successful check.
///
/// Put a [`Session`] into the request extensions ahead of the gate to enable it.
pub trait SessionStore: Send + Sync {
    fn insert(&self, key: &str, value: &str);
}

#[derive(Clone)]
pub struct Session(pub Arc<dyn SessionStore>);

impl Session {
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.0.insert(key, value);
    }
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySession {
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }
}

impl SessionStore for MemorySession {
    fn insert(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

impl SessionStore for Arc<MemorySession> {
    fn insert(&self, key: &str, value: &str) {
        self.as_ref().insert(key, value);
    }
}

/// Validated gate configuration. Build one with [`GateConfig::builder`].
pub struct GateConfig {
    pub(crate) tokens: SessionTokens,
    pub(crate) header: HeaderName,
    pub(crate) url_pattern: Option<Regex>,
    pub(crate) redirect: Option<String>,
    pub(crate) redirect_url_param: String,
    pub(crate) encoding: Encoding,
    pub(crate) required: bool,
    pub(crate) use_session: Option<String>,
    pub(crate) session_key: String,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) render_unauthorized: Option<RenderUnauthorized>,
    pub(crate) success_handler: Option<SuccessHandler>,
}

impl GateConfig {
    pub fn builder() -> GateBuilder {
        GateBuilder::default()
    }

    pub fn header(&self) -> &str {
        self.header.as_str()
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub(crate) fn applies_to(&self, uri: &Uri) -> bool {
        self.url_pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(uri.path()))
    }
}

impl std::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConfig")
            .field("header", &self.header)
            .field("url_pattern", &self.url_pattern.as_ref().map(Regex::as_str))
            .field("redirect", &self.redirect)
            .field("redirect_url_param", &self.redirect_url_param)
            .field("encoding", &self.encoding)
            .field("required", &self.required)
            .field("use_session", &self.use_session)
            .field("session_key", &self.session_key)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct GateBuilder {
    secret: Option<SecretString>,
    settings: GateSettings,
    token: TokenParams,
    error_handler: Option<ErrorHandler>,
    render_unauthorized: Option<RenderUnauthorized>,
    success_handler: Option<SuccessHandler>,
}

impl GateBuilder {
    /// The master secret session tokens were issued under.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Start from file-backed settings; later setters override individual fields.
    pub fn settings(mut self, settings: GateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn token_params(mut self, params: TokenParams) -> Self {
        self.token = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.settings.header = name.into();
        self
    }

    pub fn url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.settings.url_pattern = Some(pattern.into());
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.settings.redirect = Some(url.into());
        self
    }

    pub fn redirect_url_param(mut self, param: impl Into<String>) -> Self {
        self.settings.redirect_url_param = param.into();
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.settings.encoding = encoding;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.settings.required = required;
        self
    }

    pub fn use_session(mut self, value: impl Into<String>) -> Self {
        self.settings.use_session = Some(value.into());
        self
    }

    pub fn session_key(mut self, key: impl Into<String>) -> Self {
        self.settings.session_key = Some(key.into());
        self
    }

    pub fn error_handler(
        mut self,
        handler: impl Fn(&Request<Body>, &Rejection) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn render_unauthorized(
        mut self,
        render: impl Fn(&Rejection) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.render_unauthorized = Some(Arc::new(render));
        self
    }

    pub fn success_handler(
        mut self,
        handler: impl Fn(&Request<Body>, &Claims) -> Option<Response> + Send + Sync + 'static,
    ) -> Self {
        self.success_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> SecurityResult<GateConfig> {
        let secret = self
            .secret
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or_else(|| {
                SecurityError::InvalidParameter("missing required options \"secret\"".into())
            })?;

        let settings = self.settings;
        let header = HeaderName::from_bytes(settings.header.as_bytes()).map_err(|_| {
            SecurityError::InvalidParameter(format!("invalid header name: {}", settings.header))
        })?;
        let url_pattern = settings
            .url_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| SecurityError::InvalidParameter(format!("invalid url pattern: {e}")))?;
        let session_key = settings
            .session_key
            .unwrap_or_else(|| header.as_str().to_string());

        Ok(GateConfig {
            tokens: SessionTokens::new(secret, self.token),
            header,
            url_pattern,
            redirect: settings.redirect,
            redirect_url_param: settings.redirect_url_param,
            encoding: settings.encoding,
            required: settings.required,
            use_session: settings.use_session,
            session_key,
            error_handler: self.error_handler,
            render_unauthorized: self.render_unauthorized,
            success_handler: self.success_handler,
        })
    }
}
