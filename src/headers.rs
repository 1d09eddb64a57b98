//! The request/response header name table (spec §3 "Session Properties",
//! §6 "Wire protocol").
//!
//! Every header is namespaced per server variant (e.g. `X-Trino-User`,
//! `X-Presto-User`); [`ProtocolHeaders`] resolves a logical header to its
//! wire name given a [`crate::config::HeaderNamespace`].

use crate::config::HeaderNamespace;

/// Logical request headers, resolved against a server's header namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestHeader {
    /// Caller's user/principal name.
    User,
    /// Client source tag (e.g. `"cli"`, `"jdbc"`).
    Source,
    /// Free-form client info string.
    ClientInfo,
    /// Comma-joined client tags.
    ClientTags,
    /// Caller-supplied trace token.
    TraceToken,
    /// Current catalog.
    Catalog,
    /// Current schema.
    Schema,
    /// Current SQL path.
    Path,
    /// Session time zone.
    TimeZone,
    /// Session locale/language.
    Language,
    /// Repeated `key=url(value)` session property.
    Session,
    /// Repeated resource estimate.
    ResourceEstimate,
    /// Repeated `{ROLE|ALL|NONE}:{name}` role selection.
    Role,
    /// Repeated extra credential.
    ExtraCredential,
    /// Repeated `name=url(sql)` prepared statement.
    PreparedStatement,
    /// Active transaction id.
    TransactionId,
    /// Comma-joined client capability list.
    ClientCapabilities,
}

impl RequestHeader {
    const fn suffix(self) -> &'static str {
        match self {
            RequestHeader::User => "User",
            RequestHeader::Source => "Source",
            RequestHeader::ClientInfo => "Client-Info",
            RequestHeader::ClientTags => "Client-Tags",
            RequestHeader::TraceToken => "Trace-Token",
            RequestHeader::Catalog => "Catalog",
            RequestHeader::Schema => "Schema",
            RequestHeader::Path => "Path",
            RequestHeader::TimeZone => "Time-Zone",
            RequestHeader::Language => "Language",
            RequestHeader::Session => "Session",
            RequestHeader::ResourceEstimate => "Resource-Estimate",
            RequestHeader::Role => "Role",
            RequestHeader::ExtraCredential => "Extra-Credential",
            RequestHeader::PreparedStatement => "Prepared-Statement",
            RequestHeader::TransactionId => "Transaction-Id",
            RequestHeader::ClientCapabilities => "Client-Capabilities",
        }
    }
}

/// Logical response headers carrying session mutations (spec §4.1
/// "Header-driven session delta accumulation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHeader {
    /// Server wants the session catalog changed.
    SetCatalog,
    /// Server wants the session schema changed.
    SetSchema,
    /// Server wants the session path changed.
    SetPath,
    /// Server wants the authorization user changed.
    SetAuthorizationUser,
    /// Server wants the authorization user cleared.
    ///
    /// Modeled as a header name distinct from [`Self::SetAuthorizationUser`]
    /// (spec §9 flags the source's reuse of the same key as likely a bug).
    ResetAuthorizationUser,
    /// Repeated `key=value` added session property.
    AddedSession,
    /// Repeated `key=value` added prepared statement.
    AddedPrepare,
    /// Repeated `key=value` deallocated prepared statement name.
    DeallocatedPrepare,
}

impl ResponseHeader {
    const fn suffix(self) -> &'static str {
        match self {
            ResponseHeader::SetCatalog => "Set-Catalog",
            ResponseHeader::SetSchema => "Set-Schema",
            ResponseHeader::SetPath => "Set-Path",
            ResponseHeader::SetAuthorizationUser => "Set-Authorization-User",
            ResponseHeader::ResetAuthorizationUser => "Reset-Authorization-User",
            ResponseHeader::AddedSession => "Set-Session",
            ResponseHeader::AddedPrepare => "Added-Prepare",
            ResponseHeader::DeallocatedPrepare => "Deallocated-Prepare",
        }
    }
}

/// Resolves logical header names to wire names for a given namespace.
#[derive(Debug, Clone)]
pub struct ProtocolHeaders {
    namespace: HeaderNamespace,
}

impl ProtocolHeaders {
    /// Build a header table for the given namespace.
    pub fn new(namespace: HeaderNamespace) -> Self {
        Self { namespace }
    }

    /// Wire name for a request header, e.g. `"X-Trino-User"`.
    pub fn request(&self, header: RequestHeader) -> String {
        format!("{}{}", self.namespace.0, header.suffix())
    }

    /// Wire name for a response header.
    pub fn response(&self, header: ResponseHeader) -> String {
        format!("{}{}", self.namespace.0, header.suffix())
    }

    /// The `RequestPreparedStatement` header name, used both to send and to
    /// recognize added-prepare deltas.
    pub fn prepared_statement_header(&self) -> String {
        self.request(RequestHeader::PreparedStatement)
    }

    /// The raw namespace prefix, e.g. `"X-Trino-"`.
    pub fn namespace(&self) -> &str {
        &self.namespace.0
    }
}

/// Client capability advertised on every request (spec §6).
pub const PARAMETRIC_DATETIME: &str = "PARAMETRIC_DATETIME";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_namespace() {
        let headers = ProtocolHeaders::new(HeaderNamespace::default());
        assert_eq!(headers.request(RequestHeader::User), "X-Trino-User");
        assert_eq!(
            headers.response(ResponseHeader::SetCatalog),
            "X-Trino-Set-Catalog"
        );
    }

    #[test]
    fn resolves_custom_namespace() {
        let headers = ProtocolHeaders::new(HeaderNamespace("X-Presto-".to_string()));
        assert_eq!(headers.request(RequestHeader::Catalog), "X-Presto-Catalog");
    }

    #[test]
    fn reset_and_set_authorization_user_are_distinct_headers() {
        let headers = ProtocolHeaders::new(HeaderNamespace::default());
        assert_ne!(
            headers.response(ResponseHeader::SetAuthorizationUser),
            headers.response(ResponseHeader::ResetAuthorizationUser)
        );
    }
}
