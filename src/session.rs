//! Session state and the delta protocol that mutates it (spec §3 "Session
//! Properties" / "Session Delta", §4.5).

use std::collections::BTreeMap;

/// A selected role: `ROLE(name)`, `ALL`, or `NONE`, with an optional catalog
/// qualifier (spec §3 "selected roles (name → {ROLE,ALL,NONE}+value)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedRole {
    /// No role selected.
    None,
    /// All roles granted to the principal.
    All,
    /// A specific named role.
    Role(String),
}

impl SelectedRole {
    /// Render in the `{ROLE|ALL|NONE}:{name}` wire form (spec §6).
    pub fn to_wire(&self) -> String {
        match self {
            SelectedRole::None => "NONE".to_string(),
            SelectedRole::All => "ALL".to_string(),
            SelectedRole::Role(name) => format!("ROLE:{name}"),
        }
    }
}

/// Identifies who issued a statement: an explicit user, or a principal
/// supplied by an external auth collaborator (spec §3 invariant: exactly one
/// of these, or neither, in which case a default agent string is used).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    /// No identity was supplied; a default agent string is used.
    #[default]
    Unspecified,
    /// Caller-supplied user name.
    User(String),
    /// Principal identified by an external auth collaborator.
    AuthProvided(String),
}

/// Default `User-Agent`-style identity used when neither a user nor an auth
/// collaborator identifies the caller.
pub const DEFAULT_AGENT: &str = "statement-core";

/// Mutable per-connection configuration carried on every request.
#[derive(Debug, Clone)]
pub struct SessionProperties {
    /// Server URL.
    pub server_url: String,
    /// Caller identity.
    pub principal: Principal,
    /// Current catalog.
    pub catalog: Option<String>,
    /// Current schema.
    pub schema: Option<String>,
    /// Current SQL path.
    pub path: Option<String>,
    /// Active transaction id.
    pub transaction_id: Option<String>,
    /// Session time zone (IANA name or UTC offset).
    pub time_zone: Option<String>,
    /// Session locale.
    pub locale: Option<String>,
    /// Client source tag.
    pub source: Option<String>,
    /// Caller-supplied trace token.
    pub trace_token: Option<String>,
    /// Client tags.
    pub client_tags: Vec<String>,
    /// Source-agent identity string (falls back to [`DEFAULT_AGENT`]).
    pub source_agent: Option<String>,
    /// Whether response compression is negotiated.
    pub compression: bool,
    /// Dictionary of prepared statements: name → original SQL text.
    pub prepared_statements: BTreeMap<String, String>,
    /// Named session properties: key → URL-encoded value.
    pub session_properties: BTreeMap<String, String>,
    /// Resource estimates sent with every query.
    pub resource_estimates: BTreeMap<String, String>,
    /// Extra credentials sent with every query.
    pub extra_credentials: BTreeMap<String, String>,
    /// Selected roles, keyed by catalog name (or a sentinel for the system
    /// catalog).
    pub roles: BTreeMap<String, SelectedRole>,
    /// Additional custom headers.
    pub extra_headers: Vec<(String, String)>,
}

impl Default for SessionProperties {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            principal: Principal::Unspecified,
            catalog: None,
            schema: None,
            path: None,
            transaction_id: None,
            time_zone: None,
            locale: None,
            source: None,
            trace_token: None,
            client_tags: Vec::new(),
            source_agent: None,
            compression: true,
            prepared_statements: BTreeMap::new(),
            session_properties: BTreeMap::new(),
            resource_estimates: BTreeMap::new(),
            extra_credentials: BTreeMap::new(),
            roles: BTreeMap::new(),
            extra_headers: Vec::new(),
        }
    }
}

impl SessionProperties {
    /// Resolve the effective agent identity for this session.
    pub fn effective_agent(&self) -> &str {
        match &self.principal {
            Principal::User(user) => user,
            Principal::AuthProvided(principal) => principal,
            Principal::Unspecified => self.source_agent.as_deref().unwrap_or(DEFAULT_AGENT),
        }
    }
}

/// The set of mutations a query's response headers carry, applied atomically
/// at statement `Finish` (spec §3 "Session Delta", §4.1 "Finish").
#[derive(Debug, Clone, Default)]
pub struct SessionDelta {
    /// New catalog, if the server set one.
    pub set_catalog: Option<String>,
    /// New schema, if the server set one.
    pub set_schema: Option<String>,
    /// New SQL path, if the server set one.
    pub set_path: Option<String>,
    /// New authorization user, if the server set one.
    pub set_authorization_user: Option<String>,
    /// Whether the server asked to clear the authorization user.
    pub reset_authorization_user: bool,
    /// Session properties added by the server.
    pub added_session_properties: BTreeMap<String, String>,
    /// Prepared statements added by the server.
    pub added_prepared_statements: BTreeMap<String, String>,
    /// Prepared statement names the server asked to deallocate.
    pub deallocated_prepared_statements: Vec<String>,
}

impl SessionDelta {
    /// True if this delta carries no mutation at all.
    pub fn is_empty(&self) -> bool {
        self.set_catalog.is_none()
            && self.set_schema.is_none()
            && self.set_path.is_none()
            && self.set_authorization_user.is_none()
            && !self.reset_authorization_user
            && self.added_session_properties.is_empty()
            && self.added_prepared_statements.is_empty()
            && self.deallocated_prepared_statements.is_empty()
    }
}

impl SessionProperties {
    /// Apply a delta, returning the new session state. Per spec §4.5:
    /// single-valued fields are replaced when set; added maps are inserted
    /// but never overwrite existing keys; deallocated names are removed; the
    /// reset flag clears the authorization user regardless of whether `set`
    /// is also present; everything else is copied unchanged.
    #[must_use]
    pub fn merge(&self, delta: &SessionDelta) -> Self {
        let mut next = self.clone();

        if let Some(catalog) = &delta.set_catalog {
            next.catalog = Some(catalog.clone());
        }
        if let Some(schema) = &delta.set_schema {
            next.schema = Some(schema.clone());
        }
        if let Some(path) = &delta.set_path {
            next.path = Some(path.clone());
        }

        if delta.reset_authorization_user {
            next.principal = Principal::Unspecified;
        } else if let Some(user) = &delta.set_authorization_user {
            next.principal = Principal::AuthProvided(user.clone());
        }

        for (key, value) in &delta.added_session_properties {
            next.session_properties
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (name, sql) in &delta.added_prepared_statements {
            next.prepared_statements
                .entry(name.clone())
                .or_insert_with(|| sql.clone());
        }
        for name in &delta.deallocated_prepared_statements {
            next.prepared_statements.remove(name);
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_empty_delta_is_identity() {
        let mut session = SessionProperties::default();
        session.catalog = Some("tpch".to_string());
        session
            .session_properties
            .insert("writer_min_size".to_string(), "64MB".to_string());

        let merged = session.merge(&SessionDelta::default());
        assert_eq!(merged.catalog, session.catalog);
        assert_eq!(merged.session_properties, session.session_properties);
    }

    #[test]
    fn added_session_properties_do_not_overwrite_existing() {
        let mut session = SessionProperties::default();
        session
            .session_properties
            .insert("k".to_string(), "original".to_string());

        let mut delta = SessionDelta::default();
        delta
            .added_session_properties
            .insert("k".to_string(), "new".to_string());

        let merged = session.merge(&delta);
        assert_eq!(merged.session_properties.get("k").unwrap(), "original");
    }

    #[test]
    fn deallocated_names_are_absent_post_merge() {
        let mut session = SessionProperties::default();
        session
            .prepared_statements
            .insert("q1".to_string(), "select 1".to_string());

        let mut delta = SessionDelta::default();
        delta.deallocated_prepared_statements.push("q1".to_string());

        let merged = session.merge(&delta);
        assert!(!merged.prepared_statements.contains_key("q1"));
    }

    #[test]
    fn reset_authorization_user_wins_over_set() {
        let session = SessionProperties::default();

        let mut delta = SessionDelta::default();
        delta.set_authorization_user = Some("alice".to_string());
        delta.reset_authorization_user = true;

        let merged = session.merge(&delta);
        assert_eq!(merged.principal, Principal::Unspecified);
    }

    #[test]
    fn set_session_after_use_updates_catalog_and_schema() {
        // Scenario S7: `set session ...` then `USE tpch.sf10`.
        let session = SessionProperties::default();

        let mut delta = SessionDelta::default();
        delta
            .added_session_properties
            .insert("writer_min_size".to_string(), "64MB".to_string());
        delta.set_catalog = Some("tpch".to_string());
        delta.set_schema = Some("sf10".to_string());

        let merged = session.merge(&delta);
        assert_eq!(merged.catalog.as_deref(), Some("tpch"));
        assert_eq!(merged.schema.as_deref(), Some("sf10"));
        assert_eq!(
            merged.session_properties.get("writer_min_size").unwrap(),
            "64MB"
        );
    }
}
