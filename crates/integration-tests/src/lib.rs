//! Integration tests for the DSI storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dsi-integration-tests
//! ```
//!
//! Tests drive the storefront router in-process with `tower::ServiceExt`, so
//! no server or external services are needed. [`TestClient`] keeps the
//! session cookie between requests the way a browser would.

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use dsi_storefront::config::StorefrontConfig;
use dsi_storefront::state::AppState;
use tower::ServiceExt;

/// Base URL used by test configurations.
pub const TEST_BASE_URL: &str = "http://localhost:3000";

/// A single visitor talking to an in-process storefront.
pub struct TestClient {
    app: Router,
    cookie: Option<String>,
}

/// Response with the body already collected.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// Value of `name` as a string, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestClient {
    /// Create a client for a storefront with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StorefrontConfig::with_defaults(TEST_BASE_URL))
    }

    /// Create a client for a storefront with the given configuration.
    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        Self {
            app: dsi_storefront::app(AppState::new(config)),
            cookie: None,
        }
    }

    /// Another visitor of the same storefront, without this one's session.
    #[must_use]
    pub fn new_visitor(&self) -> Self {
        Self {
            app: self.app.clone(),
            cookie: None,
        }
    }

    /// Send a GET request.
    pub async fn get(&mut self, path: &str) -> TestResponse {
        let request = self.request("GET", path).body(Body::empty());
        self.send(request).await
    }

    /// Send a form-encoded POST request.
    pub async fn post_form(&mut self, path: &str, form: &str) -> TestResponse {
        let request = self
            .request("POST", path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()));
        self.send(request).await
    }

    fn request(&self, method: &str, path: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(path);
        match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn send(
        &mut self,
        request: Result<Request<Body>, axum::http::Error>,
    ) -> TestResponse {
        let request = request.expect("valid test request");
        let response = match self.app.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        if let Some(cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
        {
            self.cookie = Some(cookie.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable response body");

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull every line item id out of a rendered cart page or fragment.
#[must_use]
pub fn line_item_ids(html: &str) -> Vec<String> {
    const MARKER: &str = r#"name="id" value=""#;

    html.match_indices(MARKER)
        .filter_map(|(start, _)| {
            let rest = html.get(start + MARKER.len()..)?;
            rest.split('"').next().map(String::from)
        })
        .collect()
}
