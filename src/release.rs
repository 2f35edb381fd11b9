//! Latest-release metadata and update script retrieval

use crate::error::ReleaseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Build version reported by the `version` procedure and the user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release metadata as returned by the release endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub version: String,
    #[serde(default)]
    pub release_notes: String,
    /// URL of the script that performs the update, when one is published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_script: Option<String>,
}

/// Version summary exposed to clients, without the script URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableVersion {
    pub version: String,
    pub release_notes: String,
}

impl From<ReleaseInfo> for AvailableVersion {
    fn from(release: ReleaseInfo) -> Self {
        Self {
            version: release.version,
            release_notes: release.release_notes,
        }
    }
}

/// Where release metadata and update scripts come from
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the latest release. Never cached.
    async fn latest_release(&self) -> Result<ReleaseInfo, ReleaseError>;

    /// Download an update script body as text
    async fn fetch_script(&self, url: &str) -> Result<String, ReleaseError>;
}

/// [`ReleaseSource`] backed by the remote release endpoint
pub struct HttpReleaseFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReleaseFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ReleaseError> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().map_err(ReleaseError::Client)?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ReleaseError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ReleaseError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ReleaseError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseFetcher {
    async fn latest_release(&self) -> Result<ReleaseInfo, ReleaseError> {
        debug!("Fetching latest release from {}", self.endpoint);

        let release: ReleaseInfo =
            self.get(&self.endpoint)
                .await?
                .json()
                .await
                .map_err(|source| ReleaseError::Decode {
                    url: self.endpoint.clone(),
                    source,
                })?;

        info!(
            "Latest release is {} (update script {})",
            release.version,
            if release.update_script.is_some() {
                "available"
            } else {
                "missing"
            }
        );
        Ok(release)
    }

    async fn fetch_script(&self, url: &str) -> Result<String, ReleaseError> {
        info!("Downloading update script from {}", url);

        let script = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|source| ReleaseError::Decode {
                url: url.to_string(),
                source,
            })?;

        debug!("Update script is {} bytes", script.len());
        Ok(script)
    }
}

fn user_agent() -> String {
    format!("umbrelOS {}", VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_info_parses_endpoint_payload() {
        let release: ReleaseInfo = serde_json::from_str(
            r#"{
                "version": "1.2.0",
                "releaseNotes": "Bug fixes",
                "updateScript": "https://example.com/update.sh"
            }"#,
        )
        .unwrap();

        assert_eq!(release.version, "1.2.0");
        assert_eq!(release.release_notes, "Bug fixes");
        assert_eq!(
            release.update_script.as_deref(),
            Some("https://example.com/update.sh")
        );
    }

    #[test]
    fn test_update_script_is_optional() {
        let release: ReleaseInfo =
            serde_json::from_str(r#"{"version": "1.2.0", "releaseNotes": ""}"#).unwrap();
        assert!(release.update_script.is_none());
    }

    #[test]
    fn test_available_version_hides_script() {
        let available = AvailableVersion::from(ReleaseInfo {
            version: "1.2.0".to_string(),
            release_notes: "notes".to_string(),
            update_script: Some("https://example.com/update.sh".to_string()),
        });

        assert_eq!(
            serde_json::to_value(available).unwrap(),
            serde_json::json!({"version": "1.2.0", "releaseNotes": "notes"})
        );
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert_eq!(user_agent(), format!("umbrelOS {}", env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let fetcher = HttpReleaseFetcher::new(
            "http://127.0.0.1:9/latest-release",
            Some(Duration::from_secs(2)),
        )
        .unwrap();

        let result = fetcher.latest_release().await;
        assert!(matches!(result, Err(ReleaseError::Request { .. })));
    }
}
