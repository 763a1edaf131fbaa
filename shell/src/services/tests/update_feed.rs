//! Tests for the S3 update feed against a mock bucket

use base64::Engine;
use sha2::{Digest, Sha512};
use std::path::Path;
use tempfile::tempdir;
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::FeedConfig;
use crate::error::ShellError;
use crate::services::update_feed::S3UpdateFeed;
use crate::traits::UpdateFeed;

const ARTIFACT: &[u8] = b"pretend this is a whole AppImage";

fn sha512_b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha512::digest(bytes))
}

fn feed(server: &MockServer, download_dir: &Path) -> S3UpdateFeed {
    S3UpdateFeed::new(&FeedConfig {
        base_url: Url::parse(&format!("{}/updates/", server.uri())).unwrap(),
        manifest: "latest-linux.yml".to_string(),
        current_version: "1.0.0".to_string(),
        download_dir: download_dir.to_path_buf(),
    })
    .unwrap()
}

async fn mount_manifest(server: &MockServer, sha512: &str) {
    let manifest = format!(
        "version: 1.2.0\nfiles:\n  - url: Desktop-Shell-1.2.0.AppImage\n    sha512: {sha512}\n    size: {}\nreleaseDate: '2025-09-07T10:00:00.000Z'\n",
        ARTIFACT.len()
    );
    Mock::given(method("GET"))
        .and(path("/updates/latest-linux.yml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/updates/Desktop-Shell-1.2.0.AppImage"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ARTIFACT))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_latest_reads_channel_manifest() {
    let server = MockServer::start().await;
    mount_manifest(&server, &sha512_b64(ARTIFACT)).await;
    let dir = tempdir().unwrap();

    let release = feed(&server, dir.path()).latest().await.unwrap();
    assert_eq!(release.info.version, "1.2.0");
    assert_eq!(
        release.artifact.url,
        format!("{}/updates/Desktop-Shell-1.2.0.AppImage", server.uri())
    );
}

#[tokio::test]
async fn test_missing_manifest_is_feed_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();

    let result = feed(&server, dir.path()).latest().await;
    assert!(matches!(result, Err(ShellError::FeedQuery { .. })));
}

#[tokio::test]
async fn test_download_verifies_and_reports_progress() {
    let server = MockServer::start().await;
    mount_manifest(&server, &sha512_b64(ARTIFACT)).await;
    let dir = tempdir().unwrap();
    let feed = feed(&server, dir.path());

    let release = feed.latest().await.unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let artifact = feed.download(&release, tx).await.unwrap();

    assert_eq!(std::fs::read(&artifact).unwrap(), ARTIFACT);
    assert_eq!(artifact.file_name().unwrap(), "Desktop-Shell-1.2.0.AppImage");

    let mut ticks = Vec::new();
    while let Some(tick) = rx.recv().await {
        ticks.push(tick);
    }
    assert_eq!(ticks.last(), Some(&100));
    assert!(ticks.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn test_hash_mismatch_discards_artifact() {
    let server = MockServer::start().await;
    mount_manifest(&server, &sha512_b64(b"something else")).await;
    let dir = tempdir().unwrap();
    let feed = feed(&server, dir.path());

    let release = feed.latest().await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = feed.download(&release, tx).await;

    assert!(matches!(result, Err(ShellError::Download { .. })));
    assert!(!dir.path().join("Desktop-Shell-1.2.0.AppImage").exists());
}
