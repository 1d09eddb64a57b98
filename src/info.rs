//! `GET /v1/info`: an optional collaborator reporting coordinator status
//! (spec §6 "Endpoints").

use reqwest::Method;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::transport::HttpTransport;

/// Node version reported by the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeVersion {
    /// Free-form version string.
    pub version: String,
}

/// Coordinator status, as returned by `/v1/info`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Coordinator build/version.
    #[serde(rename = "nodeVersion")]
    pub node_version: NodeVersion,
    /// Deployment environment name.
    pub environment: String,
    /// True if this node is acting as coordinator.
    pub coordinator: bool,
    /// True while the coordinator is still starting up.
    pub starting: bool,
    /// Human-readable uptime string.
    pub uptime: Option<String>,
}

/// Fetch `/v1/info` from the configured server.
pub async fn fetch_server_info(transport: &HttpTransport, server_url: &str) -> Result<ServerInfo> {
    let url = format!("{}/v1/info", server_url.trim_end_matches('/'));
    let response = transport
        .execute(|| transport.request(Method::GET, &url))
        .await?;
    let bytes = response.bytes().await.map_err(Error::Http)?;
    serde_json::from_slice(&bytes).map_err(Error::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_server_info() {
        let json = serde_json::json!({
            "nodeVersion": {"version": "440"},
            "environment": "production",
            "coordinator": true,
            "starting": false,
            "uptime": "2.00m"
        });
        let info: ServerInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.node_version.version, "440");
        assert!(info.coordinator);
        assert!(!info.starting);
    }
}
