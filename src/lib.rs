//! statement-core: the streaming statement-execution engine behind a
//! paged, HTTP-based distributed SQL client.
//!
//! This crate implements the protocol-facing core only: submitting a
//! statement, following its chain of continuation URIs, decoding typed
//! rows, and merging session mutations carried on response headers. The
//! authentication plug-ins, a tabular driver façade, TLS certificate
//! configuration, and CLI/connection-string parsing are external
//! collaborators this crate does not implement.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(clippy::unwrap_used)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod headers;
pub mod info;
pub mod queue;
pub mod session;
pub mod statement;
pub mod stream;
pub mod transport;
pub mod types;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use queue::{PageQueue, PageQueueItem};
pub use session::{SelectedRole, SessionDelta, SessionProperties};
pub use statement::{QueryState, StatementClient, StatementPage, Stats};
pub use stream::PageStream;
pub use types::{Column, LogicalType, Value};

use std::sync::Arc;

use crate::transport::HttpTransport;

/// Entry point: builds the `reqwest::Client` implied by [`ClientConfig`] and
/// hands out statement executions (spec §2 "Control flow").
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    transport: HttpTransport,
}

impl Client {
    /// Build a client from configuration, constructing the underlying HTTP
    /// client with the configured TLS trust and compression settings (spec
    /// §6 "Compression", "TLS").
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(session::DEFAULT_AGENT)
            .timeout(config.request_timeout);

        if !config.compression_enabled {
            builder = builder.no_gzip().no_deflate();
        }
        if let Some(pem) = &config.tls.custom_pem {
            let cert = reqwest::Certificate::from_pem(pem).map_err(Error::Http)?;
            builder = builder.add_root_certificate(cert);
        }
        if config.tls.allow_hostname_mismatch {
            builder = builder.danger_accept_invalid_hostnames(true);
        }
        if config.tls.allow_self_signed {
            // Open Question Decision #2 (see DESIGN.md): the spec's corrected
            // rule is "accept iff the chain's only error is an untrusted
            // root", which `reqwest` cannot express selectively. This flag
            // is the coarser escape hatch; callers needing the precise rule
            // should supply their own verifier via a custom `rustls`
            // `ClientConfig` (TLS configuration is an external collaborator,
            // spec §1).
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(Error::Http)?;
        let transport = HttpTransport::new(http, &config);
        Ok(Self { config, transport })
    }

    /// Submit a statement and return its driving [`StatementClient`]
    /// together with the [`PageStream`] a caller reads rows from.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        session: SessionProperties,
    ) -> Result<(Arc<StatementClient>, Arc<PageStream>)> {
        self.execute_with_mode(sql, params, session, false).await
    }

    /// Submit a statement whose rows the caller does not intend to read
    /// (spec glossary "Discard-result mode"). The fetcher still drains the
    /// continuation chain to `FINISHED`, but never enqueues data.
    pub async fn execute_discard(
        &self,
        sql: &str,
        params: &[Value],
        session: SessionProperties,
    ) -> Result<(Arc<StatementClient>, Arc<PageStream>)> {
        self.execute_with_mode(sql, params, session, true).await
    }

    async fn execute_with_mode(
        &self,
        sql: &str,
        params: &[Value],
        session: SessionProperties,
        discard_results: bool,
    ) -> Result<(Arc<StatementClient>, Arc<PageStream>)> {
        let client = Arc::new(StatementClient::new(
            self.transport.clone(),
            self.config.clone(),
            session,
        ));
        client.submit_initial(sql, params).await?;
        let queue = PageQueue::new(Arc::clone(&client), self.config.buffer_size_bytes, discard_results)?;
        if let Some(page) = client.last_page().await {
            queue.seed_initial_page(page).await;
        }
        let stream = Arc::new(PageStream::new(Arc::clone(&client), queue));
        Ok((client, stream))
    }

    /// Fetch `/v1/info` (spec §6 "Endpoints").
    pub async fn server_info(&self) -> Result<info::ServerInfo> {
        info::fetch_server_info(&self.transport, &self.config.server_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_default_config() {
        let client = Client::new(ClientConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn client_builds_with_self_signed_trust_enabled() {
        let config = ClientConfig::new("https://coordinator.internal:8443");
        let mut config = config;
        config.tls.allow_self_signed = true;
        let client = Client::new(config);
        assert!(client.is_ok());
    }
}
