//! The shared client handle and its request transport.
//!
//! # Design
//! `Client` holds the base URL, API key and a `reqwest::Client`, and is never
//! mutated after construction, so clones can be shared freely between tasks.
//! A call goes through three steps: `build_request` produces an
//! authenticated `HttpRequest`, `execute` sends it, and `check_response`
//! classifies the status into success or a typed error.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, Secret};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::dataset::DatasetService;
use crate::error::{ApiError, Error, Result, UrlError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Client for the Geckoboard dataset API.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    api_key: Secret<String>,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl Client {
    /// Create a client for the hosted Geckoboard API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client for the API served at `base_url`.
    pub fn with_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(api_key).with_base_url(base_url))
    }

    /// The configured timeout is applied to each request rather than to the
    /// underlying `reqwest::Client`, whose default construction cannot be
    /// misconfigured.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            timeout: config.timeout,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dataset operations bound to this client, sending at most 500 records
    /// per request.
    pub fn datasets(&self) -> DatasetService<'_> {
        DatasetService::new(self)
    }

    /// Build an authenticated request for `path` relative to the base URL.
    ///
    /// The JSON content type is only set when there is a body. `path` is sent
    /// verbatim: control characters, and anything URL parsing would rewrite
    /// such as `..` segments, fail with [`Error::InvalidUrl`].
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> Result<HttpRequest> {
        let raw = format!("{}{path}", self.base_url);
        let url = parse_url(&raw, path).map_err(|source| Error::InvalidUrl { url: raw, source })?;

        let credentials = STANDARD.encode(format!("{}:", self.api_key.expose_secret()));
        let mut headers = vec![("authorization".to_string(), format!("Basic {credentials}"))];
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        })
    }

    /// Send `request` and classify the response.
    ///
    /// Returns [`Error::Cancelled`] as soon as `cancel` fires; the in-flight
    /// request is dropped with it.
    pub async fn execute(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<()> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        debug!(
            %method,
            %url,
            body_bytes = body.as_ref().map_or(0, String::len),
            "sending request"
        );

        let mut builder = self
            .http_client
            .request(method.into(), &url)
            .timeout(self.timeout);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = builder.send() => response?,
        };

        let status = response.status().as_u16();
        let body = if (300..500).contains(&status) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                text = response.text() => text?,
            }
        } else {
            String::new()
        };

        check_response(&HttpResponse { status, body }).inspect_err(|error| {
            warn!(%method, %url, status, %error, "request failed");
        })
    }
}

fn parse_url(raw: &str, path: &str) -> Result<url::Url, UrlError> {
    if raw.chars().any(char::is_control) {
        return Err(UrlError::ControlCharacter);
    }
    let url = url::Url::parse(raw)?;
    if !url.path().ends_with(path) || url.query().is_some() || url.fragment().is_some() {
        return Err(UrlError::PathRewritten(url.path().to_string()));
    }
    Ok(url)
}

/// Map a response to success or the matching error.
///
/// Statuses below 300 succeed and 5xx collapse to [`Error::UnexpectedResponse`].
/// Anything in between must carry a JSON error body; when it does not, the
/// decode error itself is returned.
pub fn check_response(response: &HttpResponse) -> Result<()> {
    if response.status < 300 {
        return Ok(());
    }
    if response.status >= 500 {
        return Err(Error::UnexpectedResponse);
    }

    let mut api_error: ApiError =
        serde_json::from_str(&response.body).map_err(Error::MalformedErrorBody)?;
    api_error.status_code = response.status;
    Err(Error::Api(api_error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::with_url("key-444", "http://localhost:3000")
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn new_targets_hosted_service() {
        assert_eq!(Client::new("apikey-1245").base_url(), "https://api.geckoboard.com");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = Client::with_url("key-444", "http://localhost:3000/");
        let req = client.build_request(HttpMethod::Put, "/datasets/x", None).unwrap();
        assert_eq!(req.url, "http://localhost:3000/datasets/x");
    }

    #[test]
    fn build_request_sets_basic_auth_and_json_content_type() {
        let req = client()
            .build_request(HttpMethod::Post, "/datasets/sales/data", Some("{}".to_string()))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/datasets/sales/data");
        assert_eq!(
            req.headers,
            vec![
                ("authorization".to_string(), "Basic a2V5LTQ0NDo=".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
            ]
        );
        assert_eq!(req.body.as_deref(), Some("{}"));
    }

    #[test]
    fn build_request_without_body_has_no_content_type() {
        let req = client().build_request(HttpMethod::Put, "/datasets/sales", None).unwrap();
        assert_eq!(req.header("authorization"), Some("Basic a2V5LTQ0NDo="));
        assert_eq!(req.header("content-type"), None);
    }

    #[test]
    fn build_request_rejects_base_url_without_scheme() {
        for base_url in ["", "/datasets", "//host-only"] {
            let err = Client::with_url("key-444", base_url)
                .build_request(HttpMethod::Put, "/datasets/x", None)
                .unwrap_err();
            assert!(
                matches!(err, Error::InvalidUrl { source: UrlError::Parse(_), .. }),
                "{base_url:?}: {err}"
            );
        }
    }

    #[test]
    fn build_request_rejects_control_characters_in_path() {
        for name in ["bad\nname", "bad\tname", "bad\rname", "bad\u{1}name", "bad\u{7f}name"] {
            let err = client()
                .build_request(HttpMethod::Put, &format!("/datasets/{name}"), None)
                .unwrap_err();
            match err {
                Error::InvalidUrl {
                    url,
                    source: UrlError::ControlCharacter,
                } => assert_eq!(url, format!("http://localhost:3000/datasets/{name}")),
                other => panic!("{name:?}: unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn build_request_rejects_control_characters_in_base_url() {
        let err = Client::with_url("key-444", "http://local\u{7f}host")
            .build_request(HttpMethod::Put, "/datasets/x", None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidUrl {
                source: UrlError::ControlCharacter,
                ..
            }
        ));
    }

    #[test]
    fn build_request_rejects_rewritten_paths() {
        for path in [
            "/datasets/a/../b",
            "/datasets/./b/data",
            "/datasets/a b",
            "/datasets/a?b",
            "/datasets/a#b",
        ] {
            let err = client().build_request(HttpMethod::Put, path, None).unwrap_err();
            assert!(
                matches!(err, Error::InvalidUrl { source: UrlError::PathRewritten(_), .. }),
                "{path:?}: {err}"
            );
        }
    }

    #[test]
    fn build_request_keeps_path_verbatim() {
        let client = Client::with_url("key-444", "http://localhost:3000/api");
        for name in ["sales.by_day", "bullhorn-test", "a%20b", "x_1"] {
            let req = client
                .build_request(HttpMethod::Post, &format!("/datasets/{name}/data"), None)
                .unwrap();
            assert_eq!(req.url, format!("http://localhost:3000/api/datasets/{name}/data"));
        }
    }

    #[test]
    fn timeout_comes_from_config() {
        let config = ClientConfig::new("key-444").with_timeout(Duration::from_millis(250));
        assert_eq!(Client::from_config(config).timeout(), Duration::from_millis(250));
        assert_eq!(client().timeout(), Duration::from_secs(30));
    }

    #[test]
    fn success_statuses() {
        for status in [200, 201, 204, 299] {
            assert!(check_response(&response(status, "ignored {")).is_ok(), "{status}");
        }
    }

    #[test]
    fn server_errors_collapse_to_fixed_error() {
        for status in [500, 502, 503, 599] {
            let err = check_response(&response(status, r#"{"error":{"message":"boom"}}"#))
                .unwrap_err();
            assert!(matches!(err, Error::UnexpectedResponse), "{status}");
        }
    }

    #[test]
    fn client_errors_decode_api_error() {
        let err = check_response(&response(400, r#"{"error":{"message": "invalid field type"}}"#))
            .unwrap_err();
        match err {
            Error::Api(api_error) => {
                assert_eq!(api_error, ApiError::new(400, "invalid field type"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn redirects_are_treated_as_api_errors() {
        let err = check_response(&response(302, r#"{"error":{"message":"moved"}}"#)).unwrap_err();
        assert!(matches!(err, Error::Api(ApiError { status_code: 302, .. })));
    }

    #[test]
    fn malformed_error_body_surfaces_decode_error() {
        let err = check_response(&response(400, "{invalid json}")).unwrap_err();
        match err {
            Error::MalformedErrorBody(source) => assert!(source.is_syntax()),
            other => panic!("unexpected error: {other}"),
        }

        let err = check_response(&response(404, "")).unwrap_err();
        assert!(matches!(err, Error::MalformedErrorBody(_)));
    }
}
