//! S3-hosted update feed
//!
//! Reads the electron-builder style channel manifest (`latest*.yml`) from the
//! feed directory and streams the referenced artifact to disk, checking the
//! published sha512 as it goes.

use async_trait::async_trait;
use base64::Engine;
use futures_util::StreamExt;
use semver::Version;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use shared::{process_debug, process_info, ProcessId, ReleaseInfo};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use url::Url;

use crate::config::FeedConfig;
use crate::error::{ShellError, ShellResult};
use crate::traits::{ArtifactRef, FeedRelease, UpdateFeed};

const FEED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ManifestFile {
    url: String,
    #[serde(default)]
    sha512: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReleaseNotes {
    Text(String),
    Entries(Vec<ReleaseNoteEntry>),
}

#[derive(Debug, Deserialize)]
struct ReleaseNoteEntry {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

impl ReleaseNotes {
    fn into_text(self) -> Option<String> {
        match self {
            ReleaseNotes::Text(text) => Some(text),
            ReleaseNotes::Entries(entries) => {
                let text = entries
                    .into_iter()
                    .filter_map(|entry| match (entry.version, entry.note) {
                        (Some(version), Some(note)) => Some(format!("{version}: {note}")),
                        (None, Some(note)) => Some(note),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                (!text.is_empty()).then_some(text)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelManifest {
    version: String,
    #[serde(default)]
    files: Vec<ManifestFile>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    sha512: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    release_notes: Option<ReleaseNotes>,
}

/// Parse a release version, tolerating a leading `v`
pub fn parse_version(raw: &str) -> ShellResult<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(trimmed).map_err(|e| ShellError::feed(format!("invalid version '{raw}': {e}")))
}

/// Whether `candidate` is strictly newer than `current`
pub fn is_newer(candidate: &str, current: &str) -> ShellResult<bool> {
    Ok(parse_version(candidate)? > parse_version(current)?)
}

/// Parse a channel manifest into a release, resolving artifact URLs against `base`
pub fn parse_manifest(raw: &str, base: &Url) -> ShellResult<FeedRelease> {
    let manifest: ChannelManifest =
        serde_yaml::from_str(raw).map_err(|e| ShellError::feed(format!("malformed feed manifest: {e}")))?;

    parse_version(&manifest.version)?;

    let artifact = match manifest.files.into_iter().next() {
        Some(file) => (file.url, file.sha512.or_else(|| manifest.sha512.clone()), file.size),
        None => match manifest.path {
            Some(path) => (path, manifest.sha512.clone(), None),
            None => return Err(ShellError::feed("feed manifest lists no artifacts")),
        },
    };

    let url = base
        .join(&artifact.0)
        .map_err(|e| ShellError::feed(format!("invalid artifact url '{}': {e}", artifact.0)))?;

    Ok(FeedRelease {
        info: ReleaseInfo {
            version: manifest.version,
            release_date: manifest.release_date.unwrap_or_default(),
            release_notes: manifest.release_notes.and_then(ReleaseNotes::into_text),
        },
        artifact: ArtifactRef {
            url: url.to_string(),
            sha512: artifact.1,
            size: artifact.2,
        },
    })
}

pub struct S3UpdateFeed {
    client: reqwest::Client,
    base_url: Url,
    manifest: String,
    download_dir: PathBuf,
}

impl S3UpdateFeed {
    pub fn new(config: &FeedConfig) -> ShellResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(FEED_TIMEOUT)
            .build()
            .map_err(|e| ShellError::feed(format!("failed to build feed client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            manifest: config.manifest.clone(),
            download_dir: config.download_dir.clone(),
        })
    }

    fn manifest_url(&self) -> ShellResult<Url> {
        self.base_url
            .join(&self.manifest)
            .map_err(|e| ShellError::feed(format!("invalid manifest url: {e}")))
    }

    fn artifact_path(&self, url: &Url) -> PathBuf {
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("update.bin");
        self.download_dir.join(name)
    }
}

#[async_trait]
impl UpdateFeed for S3UpdateFeed {
    async fn latest(&self) -> ShellResult<FeedRelease> {
        let url = self.manifest_url()?;
        process_debug!(ProcessId::current(), "Querying update feed {}", url);

        let response = self
            .client
            .get(url.clone())
            .timeout(FEED_TIMEOUT)
            .send()
            .await
            .map_err(|e| ShellError::feed(format!("feed unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ShellError::feed(format!("{url} returned HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ShellError::feed(format!("failed to read feed: {e}")))?;
        parse_manifest(&body, &self.base_url)
    }

    async fn download(&self, release: &FeedRelease, progress: mpsc::UnboundedSender<u8>) -> ShellResult<PathBuf> {
        let url = Url::parse(&release.artifact.url)
            .map_err(|e| ShellError::download(format!("invalid artifact url: {e}")))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ShellError::download(format!("artifact unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ShellError::download(format!("{url} returned HTTP {}", response.status())));
        }

        let total = response.content_length().or(release.artifact.size).filter(|total| *total > 0);

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.artifact_path(&url);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha512::new();
        let mut received: u64 = 0;
        let mut last_percent: Option<u8> = None;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ShellError::download(format!("transfer interrupted: {e}")))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let percent = ((received.saturating_mul(100)) / total).min(100) as u8;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    let _ = progress.send(percent);
                }
            }
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = release.artifact.size {
            if expected != received {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(ShellError::download(format!(
                    "size mismatch: expected {expected} bytes, got {received}"
                )));
            }
        }

        if let Some(expected) = &release.artifact.sha512 {
            let actual = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());
            if &actual != expected {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(ShellError::download("sha512 mismatch"));
            }
        }

        let _ = progress.send(100);
        process_info!(
            ProcessId::current(),
            "📦 Downloaded {} ({} bytes) to {}",
            release.info.version,
            received,
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://your-app-updates.s3.us-east-1.amazonaws.com/updates/").unwrap()
    }

    #[test]
    fn test_parse_manifest_with_files() {
        let raw = r#"
version: 1.2.0
files:
  - url: Desktop-Shell-1.2.0.AppImage
    sha512: c2hhNTEyLWJhc2U2NA==
    size: 1024
path: Desktop-Shell-1.2.0.AppImage
sha512: c2hhNTEyLWJhc2U2NA==
releaseDate: '2025-09-07T10:00:00.000Z'
releaseNotes: Faster startup
"#;
        let release = parse_manifest(raw, &base()).unwrap();
        assert_eq!(release.info.version, "1.2.0");
        assert_eq!(release.info.release_date, "2025-09-07T10:00:00.000Z");
        assert_eq!(release.info.release_notes.as_deref(), Some("Faster startup"));
        assert_eq!(
            release.artifact.url,
            "https://your-app-updates.s3.us-east-1.amazonaws.com/updates/Desktop-Shell-1.2.0.AppImage"
        );
        assert_eq!(release.artifact.size, Some(1024));
    }

    #[test]
    fn test_parse_manifest_path_only_and_note_list() {
        let raw = r#"
version: v2.0.0
path: setup.exe
sha512: abc
releaseNotes:
  - version: 2.0.0
    note: New dashboard
"#;
        let release = parse_manifest(raw, &base()).unwrap();
        assert_eq!(release.info.version, "v2.0.0");
        assert!(release.artifact.url.ends_with("/updates/setup.exe"));
        assert_eq!(release.artifact.sha512.as_deref(), Some("abc"));
        assert_eq!(release.info.release_notes.as_deref(), Some("2.0.0: New dashboard"));
    }

    #[test]
    fn test_parse_manifest_rejects_garbage() {
        assert!(matches!(
            parse_manifest("not: [valid", &base()),
            Err(ShellError::FeedQuery { .. })
        ));
        assert!(parse_manifest("version: banana\npath: a.exe", &base()).is_err());
        assert!(parse_manifest("version: 1.0.0", &base()).is_err());
    }

    #[test]
    fn test_version_comparison() {
        assert!(is_newer("v1.2.0", "1.1.9").unwrap());
        assert!(!is_newer("1.1.9", "1.1.9").unwrap());
        assert!(!is_newer("1.0.0-beta.1", "1.0.0").unwrap());
        assert!(is_newer("not-a-version", "1.0.0").is_err());
    }
}
