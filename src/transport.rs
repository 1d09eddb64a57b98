//! HTTP transport: request dispatch, retry on transient server errors, and
//! response-header extraction into a [`SessionDelta`] (spec §4.1, §6).

use std::time::Duration;

use rand::Rng;
use reqwest::{Method, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::headers::{ProtocolHeaders, ResponseHeader};
use crate::session::SessionDelta;

/// Base delay for the retry backoff (Open Question Decision #3).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
/// Growth factor applied to the retry delay on every attempt.
const RETRY_FACTOR: u32 = 2;
/// Ceiling the retry delay will never exceed.
const RETRY_CAP: Duration = Duration::from_secs(5);
/// Maximum number of attempts (the initial try plus this many retries).
const RETRY_MAX_ATTEMPTS: u32 = 10;

/// Status codes considered transient and worth retrying (spec §4.1
/// "Resilience to transient server errors").
fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Dispatches HTTP requests on behalf of a statement client, applying the
/// header namespace, request timeout, and transient-error retry policy.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    headers: ProtocolHeaders,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport from client configuration. The caller supplies the
    /// already-configured `reqwest::Client` (TLS trust, proxy, etc. are an
    /// external collaborator, spec §1).
    pub fn new(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            headers: ProtocolHeaders::new(config.header_namespace.clone()),
            request_timeout: config.request_timeout,
        }
    }

    /// The resolved header table, exposed so callers can attach request
    /// headers before calling [`Self::execute`].
    pub fn headers(&self) -> &ProtocolHeaders {
        &self.headers
    }

    /// Build a request builder for `method` against `url`, with the
    /// transport's request timeout pre-applied.
    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url).timeout(self.request_timeout)
    }

    /// Send a prepared request, retrying on transient HTTP status codes with
    /// a bounded exponential backoff (Open Question Decision #3).
    ///
    /// `rebuild` recreates the request for each attempt, since a
    /// `reqwest::Request` cannot be cloned once it carries a streaming body.
    pub async fn execute<F>(&self, mut rebuild: F) -> Result<Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0u32;

        loop {
            let response = rebuild().send().await.map_err(Error::Http)?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if !is_transient(status) || attempt + 1 >= RETRY_MAX_ATTEMPTS {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Protocol(format!(
                    "request failed with status {status}: {body}"
                )));
            }

            attempt += 1;
            let jittered = jitter(delay);
            warn!(
                status = %status,
                attempt,
                delay_ms = jittered.as_millis() as u64,
                "retrying after transient server error"
            );
            tokio::time::sleep(jittered).await;
            delay = std::cmp::min(delay.saturating_mul(RETRY_FACTOR), RETRY_CAP);
        }
    }

    /// Extract the response's session-mutation headers and JSON body
    /// together, since both must be read from the same `Response` before it
    /// is consumed. The returned `usize` is the encoded body length, used as
    /// the page-queue budget metric (spec §9: the budget tracks encoded, not
    /// decoded, size).
    pub async fn read_page<T>(&self, response: Response) -> Result<(T, SessionDelta, usize)>
    where
        T: serde::de::DeserializeOwned,
    {
        let delta = extract_session_delta(&self.headers, response.headers());
        let bytes = response.bytes().await.map_err(Error::Http)?;
        let page: T = serde_json::from_slice(&bytes).map_err(Error::Json)?;
        Ok((page, delta, bytes.len()))
    }
}

fn jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.8..=1.2);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Read the namespaced session-mutation headers off a response into a
/// [`SessionDelta`] (spec §4.1 "Header-driven session delta accumulation").
pub fn extract_session_delta(
    headers: &ProtocolHeaders,
    response_headers: &reqwest::header::HeaderMap,
) -> SessionDelta {
    let header_str = |name: String| -> Option<String> {
        response_headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let header_values = |name: String| -> Vec<String> {
        response_headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    };

    let mut delta = SessionDelta::default();
    delta.set_catalog = header_str(headers.response(ResponseHeader::SetCatalog));
    delta.set_schema = header_str(headers.response(ResponseHeader::SetSchema));
    delta.set_path = header_str(headers.response(ResponseHeader::SetPath));
    delta.set_authorization_user =
        header_str(headers.response(ResponseHeader::SetAuthorizationUser));
    delta.reset_authorization_user = header_str(headers.response(ResponseHeader::ResetAuthorizationUser))
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    for raw in header_values(headers.response(ResponseHeader::AddedSession)) {
        if let Some((key, value)) = split_key_value(&raw) {
            delta.added_session_properties.insert(key, value);
        }
    }
    for raw in header_values(headers.response(ResponseHeader::AddedPrepare)) {
        if let Some((key, value)) = split_key_value(&raw) {
            delta.added_prepared_statements.insert(key, value);
        }
    }
    for raw in header_values(headers.response(ResponseHeader::DeallocatedPrepare)) {
        delta.deallocated_prepared_statements.push(raw);
    }

    debug!(?delta, "extracted session delta from response headers");
    delta
}

/// Split a `name=value` header fragment, percent-decoding the value half
/// back to plain text (the wire form produced by `statement.rs`'s
/// `url_encode` when the same map is resent on a later request).
fn split_key_value(raw: &str) -> Option<(String, String)> {
    raw.split_once('=').map(|(k, v)| {
        let decoded = percent_encoding::percent_decode_str(v.trim())
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| v.trim().to_string());
        (k.trim().to_string(), decoded)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_match_spec_list() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn extracts_added_session_properties_from_headers() {
        let headers = ProtocolHeaders::new(crate::config::HeaderNamespace::default());
        let mut map = reqwest::header::HeaderMap::new();
        map.insert(
            "X-Trino-Set-Session",
            "writer_min_size=64MB".parse().unwrap(),
        );
        let delta = extract_session_delta(&headers, &map);
        assert_eq!(
            delta.added_session_properties.get("writer_min_size"),
            Some(&"64MB".to_string())
        );
    }

    #[test]
    fn percent_decodes_added_prepared_statement_sql() {
        let headers = ProtocolHeaders::new(crate::config::HeaderNamespace::default());
        let mut map = reqwest::header::HeaderMap::new();
        map.insert(
            "X-Trino-Added-Prepare",
            "q1=select%20%2A%20from%20t%20where%20x%20%3D%20%27a%27".parse().unwrap(),
        );
        let delta = extract_session_delta(&headers, &map);
        assert_eq!(
            delta.added_prepared_statements.get("q1"),
            Some(&"select * from t where x = 'a'".to_string())
        );
    }

    #[test]
    fn reset_authorization_user_requires_true_value() {
        let headers = ProtocolHeaders::new(crate::config::HeaderNamespace::default());

        let mut present_but_false = reqwest::header::HeaderMap::new();
        present_but_false.insert("X-Trino-Reset-Authorization-User", "false".parse().unwrap());
        assert!(!extract_session_delta(&headers, &present_but_false).reset_authorization_user);

        let mut present_and_true = reqwest::header::HeaderMap::new();
        present_and_true.insert("X-Trino-Reset-Authorization-User", "true".parse().unwrap());
        assert!(extract_session_delta(&headers, &present_and_true).reset_authorization_user);

        let absent = reqwest::header::HeaderMap::new();
        assert!(!extract_session_delta(&headers, &absent).reset_authorization_user);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..50 {
            let j = jitter(base);
            assert!(j >= Duration::from_millis(79) && j <= Duration::from_millis(121));
        }
    }
}
