//! Client-wide configuration: server address, header namespace, TLS trust,
//! and the soft byte budget used by [`crate::queue::PageQueue`].

use std::time::Duration;

/// Default soft byte budget for queued pages: 5 pages of 10MB = 50MB.
pub const DEFAULT_BUFFER_SIZE_BYTES: usize = 5 * 10 * 1024 * 1024;

/// Minimum read-ahead delay, applied after the fetcher has observed several
/// consecutive empty responses (spec §4.1 "Adaptive read pacing").
pub const MIN_READ_DELAY: Duration = Duration::from_millis(50);

/// Maximum read-ahead delay the adaptive backoff will grow to.
pub const MAX_READ_DELAY: Duration = Duration::from_secs(5);

/// Growth factor applied to the read-ahead delay after every unproductive
/// poll once the read count threshold has been crossed.
pub const READ_DELAY_GROWTH: f64 = 1.2;

/// Number of unproductive reads tolerated before the adaptive delay kicks in.
pub const READ_DELAY_GRACE_COUNT: u32 = 4;

/// `targetResultSize` appended to `/executing` continuation URIs.
pub const TARGET_RESULT_SIZE: &str = "5MB";

/// TLS trust configuration. The core only carries these as plain data; actual
/// certificate validation is performed by the caller's `reqwest::Client`
/// construction (TLS configuration is an external collaborator, spec §1).
#[derive(Debug, Clone, Default)]
pub struct TlsTrust {
    /// Use the platform's trust store (default when nothing else is set).
    pub use_system_trust: bool,
    /// PEM-encoded certificate to add to the trust root, if any.
    pub custom_pem: Option<Vec<u8>>,
    /// Accept server certificates whose hostname does not match the
    /// certificate's CN/SAN.
    pub allow_hostname_mismatch: bool,
    /// Accept self-signed roots, but only when the *entire* certificate
    /// chain's sole validation failure is an untrusted root (spec §9).
    pub allow_self_signed: bool,
}

/// The namespace a server variant uses for its request/response headers
/// (e.g. `X-Trino-`, `X-Presto-`, or a fully custom prefix).
#[derive(Debug, Clone)]
pub struct HeaderNamespace(pub String);

impl Default for HeaderNamespace {
    fn default() -> Self {
        HeaderNamespace("X-Trino-".to_string())
    }
}

/// Per-client configuration: server address, TLS trust, compression, the
/// header namespace, and resource limits shared by every statement executed
/// through this client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base server URL, e.g. `https://coordinator.example.com:8443`.
    pub server_url: String,
    /// Header namespace for this server variant.
    pub header_namespace: HeaderNamespace,
    /// TLS trust configuration.
    pub tls: TlsTrust,
    /// Advertise `Accept-Encoding: gzip` and transparently decompress.
    pub compression_enabled: bool,
    /// Soft byte budget for [`crate::queue::PageQueue`] (spec §6 "Buffer
    /// size"). Must be strictly positive.
    pub buffer_size_bytes: usize,
    /// Per-statement wall-clock timeout, if any (spec §4.1 "Timeout").
    pub statement_timeout: Option<Duration>,
    /// Per-request HTTP timeout used when polling continuation URIs.
    pub request_timeout: Duration,
    /// Additional headers attached to every request.
    pub extra_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            header_namespace: HeaderNamespace::default(),
            tls: TlsTrust::default(),
            compression_enabled: true,
            buffer_size_bytes: DEFAULT_BUFFER_SIZE_BYTES,
            statement_timeout: None,
            request_timeout: Duration::from_secs(30),
            extra_headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Start building a configuration for the given server URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Override the header namespace (e.g. `"X-Presto-"`).
    #[must_use]
    pub fn header_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.header_namespace = HeaderNamespace(namespace.into());
        self
    }

    /// Set the soft byte budget for queued pages.
    #[must_use]
    pub fn buffer_size_bytes(mut self, bytes: usize) -> Self {
        self.buffer_size_bytes = bytes;
        self
    }

    /// Set a per-statement wall-clock timeout.
    #[must_use]
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Disable response compression negotiation.
    #[must_use]
    pub fn without_compression(mut self) -> Self {
        self.compression_enabled = false;
        self
    }

    /// Attach an additional header sent with every request.
    #[must_use]
    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_is_fifty_megabytes() {
        assert_eq!(ClientConfig::default().buffer_size_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = ClientConfig::new("https://coord:8443")
            .header_namespace("X-Presto-")
            .buffer_size_bytes(1024)
            .statement_timeout(Duration::from_secs(10))
            .without_compression();

        assert_eq!(config.server_url, "https://coord:8443");
        assert_eq!(config.header_namespace.0, "X-Presto-");
        assert_eq!(config.buffer_size_bytes, 1024);
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(10)));
        assert!(!config.compression_enabled);
    }
}
