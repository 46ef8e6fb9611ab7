//! Release resolution against the GitHub releases registry.
//!
//! A channel selects which release to deploy: `stable` resolves to the
//! registry's latest non-prerelease tag, `prerelease` to the most recent
//! beta/rc-tagged entry. Resolution is read-only and must tolerate a
//! registry with zero matching releases.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LifecycleError, Result};

/// Registry the bundles are published to.
pub const GITHUB_REPO: &str = "gpslink/gpslink";

/// Read-only API calls get a short timeout; the archive transfer a long one.
const API_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stable,
    Prerelease,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => write!(f, "stable"),
            Channel::Prerelease => write!(f, "prerelease"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Ok(Channel::Stable),
            "prerelease" | "beta" => Ok(Channel::Prerelease),
            other => Err(format!("unknown channel '{other}' (stable|prerelease)")),
        }
    }
}

/// One entry from the registry. Immutable once selected by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: String,
    pub tarball_url: String,
}

impl Release {
    /// Version with any 'v' tag prefix stripped.
    pub fn version(&self) -> &str {
        self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name)
    }

    /// Tags following the beta/rc naming convention count as prerelease
    /// even when the registry flag was not set on publish.
    pub fn is_prerelease(&self) -> bool {
        self.prerelease
            || self.tag_name.contains("-beta")
            || self.tag_name.contains("-rc")
    }

    /// Publish time, or the epoch floor when the registry omits it.
    fn published_time(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.published_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Pick the release a channel resolves to: the most recently published
/// entry matching the channel. Listings arrive newest-first, so position
/// breaks ties for entries without a usable publish time.
pub fn select_release(releases: &[Release], channel: Channel) -> Option<&Release> {
    releases
        .iter()
        .enumerate()
        .filter(|(_, r)| match channel {
            Channel::Stable => !r.is_prerelease(),
            Channel::Prerelease => r.is_prerelease(),
        })
        .max_by_key(|(i, r)| (r.published_time(), std::cmp::Reverse(*i)))
        .map(|(_, r)| r)
}

/// Registry client for resolving and downloading releases.
pub struct ReleaseClient {
    repo: String,
    user_agent: String,
}

impl ReleaseClient {
    pub fn new() -> Self {
        Self::for_repo(GITHUB_REPO)
    }

    pub fn for_repo(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            user_agent: format!("gpslinkctl/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Resolve a channel to a concrete release.
    pub async fn resolve(&self, channel: Channel) -> Result<Release> {
        let url = format!("https://api.github.com/repos/{}/releases", self.repo);

        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(API_TIMEOUT)
            .build()?;

        let response = client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LifecycleError::Resolution {
                channel: channel.to_string(),
                reason: format!("registry returned {}", response.status()),
            });
        }

        let releases: Vec<Release> = response.json().await?;

        let release =
            select_release(&releases, channel).ok_or_else(|| LifecycleError::Resolution {
                channel: channel.to_string(),
                reason: "no matching release published".to_string(),
            })?;

        info!(tag = %release.tag_name, %channel, "resolved release");
        Ok(release.clone())
    }

    /// Download the release archive into `dest_dir` and return its path.
    /// A transfer that yields no file, or an empty one, is a download error.
    pub async fn download(&self, release: &Release, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(format!("{}.tar.gz", release.version()));

        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;

        let response = client.get(&release.tarball_url).send().await?;
        if !response.status().is_success() {
            return Err(LifecycleError::Download(format!(
                "transfer of {} failed: {}",
                release.tarball_url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        fs::write(&dest, &bytes)?;

        let size = fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(LifecycleError::Download(format!(
                "transfer of {} produced an empty file",
                release.tarball_url
            )));
        }

        info!(archive = %dest.display(), size, "downloaded release archive");
        Ok(dest)
    }
}

impl Default for ReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Vec<Release> {
        // Registry listings arrive newest-first
        serde_json::from_str(
            r#"[
                {"tag_name": "v1.4.0-beta.2", "prerelease": true,
                 "published_at": "2025-07-01T10:00:00Z",
                 "tarball_url": "https://api.github.com/repos/gpslink/gpslink/tarball/v1.4.0-beta.2"},
                {"tag_name": "v1.3.0", "prerelease": false,
                 "published_at": "2025-06-01T10:00:00Z",
                 "tarball_url": "https://api.github.com/repos/gpslink/gpslink/tarball/v1.3.0"},
                {"tag_name": "v1.3.0-rc1", "prerelease": false,
                 "published_at": "2025-05-20T10:00:00Z",
                 "tarball_url": "https://api.github.com/repos/gpslink/gpslink/tarball/v1.3.0-rc1"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_stable_skips_prereleases() {
        let releases = listing();
        let picked = select_release(&releases, Channel::Stable).unwrap();
        assert_eq!(picked.tag_name, "v1.3.0");
    }

    #[test]
    fn test_prerelease_picks_newest_beta() {
        let releases = listing();
        let picked = select_release(&releases, Channel::Prerelease).unwrap();
        assert_eq!(picked.tag_name, "v1.4.0-beta.2");
    }

    #[test]
    fn test_rc_naming_counts_as_prerelease_without_flag() {
        let releases = listing();
        // v1.3.0-rc1 has prerelease=false but the rc tag convention applies
        assert!(releases[2].is_prerelease());
    }

    #[test]
    fn test_empty_registry_resolves_to_none() {
        assert!(select_release(&[], Channel::Stable).is_none());
        assert!(select_release(&[], Channel::Prerelease).is_none());
    }

    #[test]
    fn test_stable_only_listing_has_no_prerelease() {
        let releases: Vec<Release> = listing()
            .into_iter()
            .filter(|r| !r.is_prerelease())
            .collect();
        assert!(select_release(&releases, Channel::Prerelease).is_none());
    }

    #[test]
    fn test_selection_orders_by_publish_time_not_position() {
        let mut releases = listing();
        releases.swap(0, 2); // registry pagination can reorder entries
        let picked = select_release(&releases, Channel::Prerelease).unwrap();
        assert_eq!(picked.tag_name, "v1.4.0-beta.2");
    }

    #[test]
    fn test_version_strips_tag_prefix() {
        let r = &listing()[1];
        assert_eq!(r.version(), "1.3.0");
    }

    #[test]
    fn test_channel_from_str() {
        assert_eq!("stable".parse::<Channel>().unwrap(), Channel::Stable);
        assert_eq!("BETA".parse::<Channel>().unwrap(), Channel::Prerelease);
        assert!("nightly".parse::<Channel>().is_err());
    }
}
