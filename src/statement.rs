//! StatementClient: drives the statement state machine across a chain of
//! server-supplied continuation URIs (spec §4.1).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use rand::RngCore;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{ClientConfig, MAX_READ_DELAY, MIN_READ_DELAY, READ_DELAY_GRACE_COUNT, READ_DELAY_GROWTH, TARGET_RESULT_SIZE};
use crate::error::{Error, Result, ServerErrorInfo};
use crate::headers::RequestHeader;
use crate::session::{SessionDelta, SessionProperties};
use crate::transport::HttpTransport;
use crate::types::{Column, Value};

/// Lifecycle state of a statement (spec §3 "QueryState"). Only legal
/// transitions are `Running` → one of the others; once out of `Running` the
/// state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// The statement is still executing.
    Running,
    /// A server-reported error terminated the statement.
    ClientError,
    /// The caller or an external signal aborted the statement.
    ClientAborted,
    /// The statement ran to completion.
    Finished,
}

impl QueryState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => QueryState::ClientError,
            2 => QueryState::ClientAborted,
            3 => QueryState::Finished,
            _ => QueryState::Running,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    fn load(&self) -> QueryState {
        QueryState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Attempt a `Running` → `to` transition; returns whether it succeeded.
    fn try_transition(&self, to: QueryState) -> bool {
        self.0
            .compare_exchange(0, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Runtime statistics reported on every page (spec §3 "Stats").
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Stats {
    /// Server-reported run-state string (e.g. `"RUNNING"`, `"FINISHED"`).
    #[serde(rename = "state", default)]
    pub run_state: String,
    /// Whether the statement is queued awaiting a worker slot.
    #[serde(default)]
    pub queued: bool,
    /// Whether the statement has been scheduled onto workers.
    #[serde(default)]
    pub scheduled: bool,
    /// Number of nodes participating in execution.
    #[serde(rename = "nodes", default)]
    pub node_count: i64,
    /// Total splits planned.
    #[serde(rename = "totalSplits", default)]
    pub total_splits: i64,
    /// Splits still queued.
    #[serde(rename = "queuedSplits", default)]
    pub queued_splits: i64,
    /// Splits currently running.
    #[serde(rename = "runningSplits", default)]
    pub running_splits: i64,
    /// Splits completed.
    #[serde(rename = "completedSplits", default)]
    pub completed_splits: i64,
    /// Cumulative CPU time, in milliseconds.
    #[serde(rename = "cpuTimeMillis", default)]
    pub cpu_time_millis: i64,
    /// Cumulative wall time, in milliseconds.
    #[serde(rename = "wallTimeMillis", default)]
    pub wall_time_millis: i64,
    /// Time spent queued, in milliseconds.
    #[serde(rename = "queuedTimeMillis", default)]
    pub queued_time_millis: i64,
    /// Elapsed wall time since submission, in milliseconds.
    #[serde(rename = "elapsedTimeMillis", default)]
    pub elapsed_time_millis: i64,
    /// Rows processed so far.
    #[serde(rename = "processedRows", default)]
    pub processed_rows: i64,
    /// Bytes processed so far.
    #[serde(rename = "processedBytes", default)]
    pub processed_bytes: i64,
    /// Peak memory usage, in bytes.
    #[serde(rename = "peakMemoryBytes", default)]
    pub peak_memory_bytes: i64,
    /// Bytes spilled to disk.
    #[serde(rename = "spilledBytes", default)]
    pub spilled_bytes: i64,
    /// Progress percentage; the server may send the literal string `"NaN"`
    /// before statistics become available (spec §8 scenario S6).
    #[serde(rename = "progressPercentage", default, with = "progress_percentage")]
    pub progress_percentage: Option<f64>,
}

mod progress_percentage {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s == "NaN" => Some(f64::NAN),
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => None,
        })
    }

    pub fn serialize<S>(value: &Option<f64>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            None => serializer.serialize_none(),
            Some(v) if v.is_nan() => serializer.serialize_str("NaN"),
            Some(v) => serializer.serialize_f64(*v),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WirePage {
    id: String,
    #[serde(rename = "nextUri")]
    next_uri: Option<String>,
    #[serde(rename = "infoUri")]
    info_uri: Option<String>,
    #[serde(default)]
    stats: Stats,
    error: Option<ServerErrorInfo>,
    columns: Option<Vec<Column>>,
    data: Option<Vec<Vec<serde_json::Value>>>,
}

/// One page in the continuation chain, with columns resolved to their
/// logical types (spec §3 "Statement Response").
#[derive(Debug, Clone)]
pub struct StatementPage {
    /// Server-assigned query id.
    pub id: String,
    /// Next continuation URI; absent means this is the last page.
    pub next_uri: Option<String>,
    /// Informational status-page URI.
    pub info_uri: Option<String>,
    /// Runtime statistics as of this page.
    pub stats: Stats,
    /// Columns, once the server has reported them. Never changes across
    /// pages once set (spec §8 property 3).
    pub columns: Option<Vec<Column>>,
    /// Raw data rows, each a sequence of JSON values aligned to `columns`.
    pub data: Option<Vec<Vec<serde_json::Value>>>,
}

impl StatementPage {
    fn from_wire(wire: WirePage) -> Result<Self> {
        let columns = wire
            .columns
            .map(|cols| cols.into_iter().map(Column::resolve).collect::<Result<Vec<_>>>())
            .transpose()?;
        Ok(Self {
            id: wire.id,
            next_uri: wire.next_uri,
            info_uri: wire.info_uri,
            stats: wire.stats,
            columns,
            data: wire.data,
        })
    }
}

/// Drives a single statement's state machine (spec §4.1).
pub struct StatementClient {
    transport: HttpTransport,
    config: ClientConfig,
    session: Mutex<SessionProperties>,
    state: StateCell,
    next_uri: Mutex<Option<String>>,
    last_page: Mutex<Option<StatementPage>>,
    pending_delta: Mutex<SessionDelta>,
    started_at: Instant,
    read_delay: Mutex<Duration>,
    unproductive_reads: Mutex<u32>,
    last_page_size: Mutex<usize>,
    query_id: OnceLock<String>,
}

impl StatementClient {
    /// Build a client ready to submit its first statement.
    pub fn new(transport: HttpTransport, config: ClientConfig, session: SessionProperties) -> Self {
        Self {
            transport,
            config,
            session: Mutex::new(session),
            state: StateCell::new(),
            next_uri: Mutex::new(None),
            last_page: Mutex::new(None),
            pending_delta: Mutex::new(SessionDelta::default()),
            started_at: Instant::now(),
            read_delay: Mutex::new(MIN_READ_DELAY),
            unproductive_reads: Mutex::new(0),
            last_page_size: Mutex::new(0),
            query_id: OnceLock::new(),
        }
    }

    /// The server-assigned query id, available synchronously as soon as the
    /// first page has been ingested. The id never changes across a
    /// statement's continuation chain (spec §8 property 3).
    pub fn current_query_id(&self) -> Option<&str> {
        self.query_id.get().map(String::as_str)
    }

    /// Encoded byte length of the most recently ingested page, used by
    /// [`crate::queue::PageQueue`] as its budget metric.
    pub async fn last_page_size(&self) -> usize {
        *self.last_page_size.lock().await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> QueryState {
        self.state.load()
    }

    /// True when a configured statement timeout has elapsed.
    pub fn is_timed_out(&self) -> bool {
        match self.config.statement_timeout {
            Some(timeout) => self.started_at.elapsed() > timeout,
            None => false,
        }
    }

    /// The most recently observed page, if any.
    pub async fn last_page(&self) -> Option<StatementPage> {
        self.last_page.lock().await.clone()
    }

    /// A snapshot of the current session properties.
    pub async fn session(&self) -> SessionProperties {
        self.session.lock().await.clone()
    }

    /// Submit the initial statement. Rewrites the body to an `EXECUTE ...
    /// USING ...` form and attaches a prepared-statement header when
    /// `params` is non-empty (spec §4.1 "Initial submission").
    pub async fn submit_initial(&self, sql: &str, params: &[Value]) -> Result<Stats> {
        let (body, prepared_header) = self.build_initial_body(sql, params);
        let url = format!("{}/v1/statement", self.config.server_url.trim_end_matches('/'));
        let session = self.session.lock().await.clone();

        let response = self
            .transport
            .execute(|| {
                let mut builder = self
                    .transport
                    .request(Method::POST, &url)
                    .body(body.clone());
                builder = attach_request_headers(builder, &self.transport, &self.config, &session);
                if let Some((name, value)) = &prepared_header {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder
            })
            .await?;

        let stats = self.ingest_response(response).await?;
        if self.next_uri.lock().await.is_none() {
            self.finish().await;
        }
        Ok(stats)
    }

    /// Issue GET on the last observed continuation URI, decode the page,
    /// apply adaptive read pacing, and return the decoded page (spec §4.1
    /// "Advance").
    pub async fn advance(&self) -> Result<StatementPage> {
        let uri = self
            .next_uri
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::Programming("advance() called with no continuation URI".to_string()))?;
        let url = with_target_result_size(&uri);
        let session = self.session.lock().await.clone();

        let response = self
            .transport
            .execute(|| {
                let builder = self.transport.request(Method::GET, &url);
                attach_request_headers(builder, &self.transport, &self.config, &session)
            })
            .await?;

        self.ingest_response(response).await?;
        let page = self
            .last_page
            .lock()
            .await
            .clone()
            .expect("ingest_response always records a page on success");

        self.apply_read_pacing(&page).await;

        if page.next_uri.is_none() {
            self.finish().await;
        }

        Ok(page)
    }

    async fn ingest_response(&self, response: reqwest::Response) -> Result<Stats> {
        let (wire, delta, size_bytes): (WirePage, SessionDelta, usize) =
            self.transport.read_page(response).await?;
        *self.last_page_size.lock().await = size_bytes;

        if !delta.is_empty() {
            let mut pending = self.pending_delta.lock().await;
            merge_delta_into(&mut pending, &delta);
        }

        let error = wire.error.clone();
        let _ = self.query_id.set(wire.id.clone());
        let page = StatementPage::from_wire(wire)?;

        if let Some(error) = error {
            self.state.try_transition(QueryState::ClientError);
            *self.last_page.lock().await = Some(page);
            return Err(Error::Server(error));
        }

        *self.next_uri.lock().await = page.next_uri.clone();
        let stats = page.stats.clone();
        *self.last_page.lock().await = Some(page);
        Ok(stats)
    }

    async fn apply_read_pacing(&self, page: &StatementPage) {
        let has_data = page.data.as_ref().is_some_and(|rows| !rows.is_empty());
        if has_data {
            *self.unproductive_reads.lock().await = 0;
            *self.read_delay.lock().await = MIN_READ_DELAY;
            return;
        }
        if self.state() != QueryState::Running {
            return;
        }

        let mut count = self.unproductive_reads.lock().await;
        *count += 1;
        if *count <= READ_DELAY_GRACE_COUNT {
            return;
        }
        drop(count);

        let mut delay = self.read_delay.lock().await;
        debug!(delay_ms = delay.as_millis() as u64, "adaptive read pacing sleep");
        tokio::time::sleep(*delay).await;
        let grown = delay.as_secs_f64() * READ_DELAY_GROWTH;
        *delay = Duration::from_secs_f64(grown).min(MAX_READ_DELAY);
    }

    /// Transition `Running` → `ClientAborted` and, if a continuation URI
    /// exists, issue a DELETE so cancellation always reaches the server
    /// (spec §4.1 "Cancel", §5 "non-cancellable context").
    pub async fn cancel(&self) -> bool {
        let transitioned = self.state.try_transition(QueryState::ClientAborted);
        if !transitioned {
            return self.state() == QueryState::ClientAborted;
        }

        let uri = self.next_uri.lock().await.clone();
        if let Some(uri) = uri {
            let session = self.session.lock().await.clone();
            let builder = attach_request_headers(
                self.transport.request(Method::DELETE, &uri),
                &self.transport,
                &self.config,
                &session,
            );
            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !(status.is_success() || status == reqwest::StatusCode::NO_CONTENT) {
                        debug!(%status, "cancellation DELETE returned unexpected status");
                    }
                }
                Err(error) => debug!(%error, "cancellation DELETE failed"),
            }
        }

        true
    }

    /// Stop the wall clock and merge the accumulated session delta (spec
    /// §4.1 "Finish"). Idempotent: only the first `Running` → `Finished`
    /// transition applies the merge.
    pub async fn finish(&self) {
        if !self.state.try_transition(QueryState::Finished) {
            return;
        }
        let delta = std::mem::take(&mut *self.pending_delta.lock().await);
        let mut session = self.session.lock().await;
        *session = session.merge(&delta);
        info!("statement finished, session delta merged");
    }

    fn build_initial_body(&self, sql: &str, params: &[Value]) -> (String, Option<(String, String)>) {
        if params.is_empty() {
            return (sql.to_string(), None);
        }
        let namespace = sanitize_namespace(self.transport.headers().namespace());
        let fresh_id = generate_fresh_id(&namespace);
        let literals: Vec<String> = params.iter().map(crate::types::encode_literal).collect();
        let body = format!("EXECUTE {fresh_id} USING {}", literals.join(", "));
        let header_name = self.transport.headers().prepared_statement_header();
        let header_value = format!("{fresh_id}={}", url_encode(sql));
        (body, Some((header_name, header_value)))
    }
}

fn merge_delta_into(pending: &mut SessionDelta, incoming: &SessionDelta) {
    if incoming.set_catalog.is_some() {
        pending.set_catalog = incoming.set_catalog.clone();
    }
    if incoming.set_schema.is_some() {
        pending.set_schema = incoming.set_schema.clone();
    }
    if incoming.set_path.is_some() {
        pending.set_path = incoming.set_path.clone();
    }
    if incoming.set_authorization_user.is_some() {
        pending.set_authorization_user = incoming.set_authorization_user.clone();
    }
    if incoming.reset_authorization_user {
        pending.reset_authorization_user = true;
    }
    for (k, v) in &incoming.added_session_properties {
        pending.added_session_properties.entry(k.clone()).or_insert_with(|| v.clone());
    }
    for (k, v) in &incoming.added_prepared_statements {
        pending.added_prepared_statements.entry(k.clone()).or_insert_with(|| v.clone());
    }
    for name in &incoming.deallocated_prepared_statements {
        if !pending.deallocated_prepared_statements.contains(name) {
            pending.deallocated_prepared_statements.push(name.clone());
        }
    }
}

fn with_target_result_size(uri: &str) -> String {
    if !uri.contains("/executing") {
        return uri.to_string();
    }
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}targetResultSize={TARGET_RESULT_SIZE}")
}

fn sanitize_namespace(namespace: &str) -> String {
    namespace.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn generate_fresh_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}{token}")
}

fn url_encode(value: &str) -> String {
    percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC).to_string()
}

fn attach_request_headers(
    mut builder: reqwest::RequestBuilder,
    transport: &HttpTransport,
    config: &ClientConfig,
    session: &SessionProperties,
) -> reqwest::RequestBuilder {
    let headers = transport.headers();
    let agent = session.effective_agent();
    builder = builder.header("User-Agent", agent);
    builder = builder.header(headers.request(RequestHeader::User), agent);

    if let Some(source) = &session.source {
        builder = builder.header(headers.request(RequestHeader::Source), source);
    }
    if let Some(trace_token) = &session.trace_token {
        builder = builder.header(headers.request(RequestHeader::TraceToken), trace_token);
    }
    if !session.client_tags.is_empty() {
        builder = builder.header(headers.request(RequestHeader::ClientTags), session.client_tags.join(","));
    }
    if let Some(catalog) = &session.catalog {
        builder = builder.header(headers.request(RequestHeader::Catalog), catalog);
    }
    if let Some(schema) = &session.schema {
        builder = builder.header(headers.request(RequestHeader::Schema), schema);
    }
    if let Some(path) = &session.path {
        builder = builder.header(headers.request(RequestHeader::Path), path);
    }
    if let Some(tz) = &session.time_zone {
        builder = builder.header(headers.request(RequestHeader::TimeZone), tz);
    }
    if let Some(locale) = &session.locale {
        builder = builder.header(headers.request(RequestHeader::Language), locale);
    }
    if let Some(txn) = &session.transaction_id {
        builder = builder.header(headers.request(RequestHeader::TransactionId), txn);
    }
    for (key, value) in &session.session_properties {
        builder = builder.header(headers.request(RequestHeader::Session), format!("{key}={}", url_encode(value)));
    }
    for (key, value) in &session.resource_estimates {
        builder = builder.header(headers.request(RequestHeader::ResourceEstimate), format!("{key}={value}"));
    }
    for (catalog, role) in &session.roles {
        builder = builder.header(headers.request(RequestHeader::Role), format!("{catalog}={}", role.to_wire()));
    }
    for (key, value) in &session.extra_credentials {
        builder = builder.header(headers.request(RequestHeader::ExtraCredential), format!("{key}={value}"));
    }
    for (name, sql) in &session.prepared_statements {
        builder = builder.header(headers.prepared_statement_header(), format!("{name}={}", url_encode(sql)));
    }
    builder = builder.header(
        headers.request(RequestHeader::ClientCapabilities),
        crate::headers::PARAMETRIC_DATETIME,
    );
    for (name, value) in &session.extra_headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (name, value) in &config.extra_headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_are_monotonic() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), QueryState::Running);
        assert!(cell.try_transition(QueryState::Finished));
        assert_eq!(cell.load(), QueryState::Finished);
        assert!(!cell.try_transition(QueryState::ClientAborted));
        assert_eq!(cell.load(), QueryState::Finished);
    }

    #[test]
    fn target_result_size_only_appended_to_executing_uris() {
        assert_eq!(
            with_target_result_size("http://host/v1/statement/executing/abc"),
            "http://host/v1/statement/executing/abc?targetResultSize=5MB"
        );
        assert_eq!(
            with_target_result_size("http://host/v1/statement/executing/abc?foo=bar"),
            "http://host/v1/statement/executing/abc?foo=bar&targetResultSize=5MB"
        );
        assert_eq!(
            with_target_result_size("http://host/v1/statement/queued/abc"),
            "http://host/v1/statement/queued/abc"
        );
    }

    #[test]
    fn fresh_id_strips_namespace_separators() {
        let namespace = sanitize_namespace("X-Trino-");
        assert_eq!(namespace, "XTrino");
        let id = generate_fresh_id(&namespace);
        assert!(id.starts_with("XTrino"));
        assert_eq!(id.len(), "XTrino".len() + 32);
    }

    #[test]
    fn current_query_id_is_unset_before_any_page_arrives() {
        let config = ClientConfig::new("http://localhost:8080");
        let transport = HttpTransport::new(reqwest::Client::new(), &config);
        let client = StatementClient::new(transport, config, SessionProperties::default());
        assert_eq!(client.current_query_id(), None);
    }

    #[tokio::test]
    async fn current_query_id_is_set_once_and_survives_page_transitions() {
        let config = ClientConfig::new("http://localhost:8080");
        let transport = HttpTransport::new(reqwest::Client::new(), &config);
        let client = StatementClient::new(transport, config, SessionProperties::default());
        assert!(client.query_id.set("abc123".to_string()).is_ok());
        assert_eq!(client.current_query_id(), Some("abc123"));
        assert!(client.query_id.set("xyz789".to_string()).is_err());
        assert_eq!(client.current_query_id(), Some("abc123"));
    }

    #[test]
    fn deserializes_nan_progress_percentage() {
        let stats: Stats = serde_json::from_str(r#"{"state":"RUNNING","progressPercentage":"NaN"}"#).unwrap();
        assert!(stats.progress_percentage.unwrap().is_nan());

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["progressPercentage"], serde_json::json!("NaN"));
    }
}
