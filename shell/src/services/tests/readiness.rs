//! Tests for the bounded readiness probe

use shared::{BackendProcessHandle, BackendStatus};
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::running_handle;
use crate::config::ReadinessConfig;
use crate::services::readiness::{Readiness, ReadinessProbe};

fn probe(attempts: u32) -> ReadinessProbe {
    ReadinessProbe::new(ReadinessConfig {
        path: "/api/health".to_string(),
        attempts,
        interval: Duration::from_millis(10),
    })
    .unwrap()
}

#[tokio::test]
async fn test_ready_after_backend_warms_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(running_handle(server.address().port()));
    assert_eq!(probe(5).wait_ready(&rx, 1).await, Readiness::Ready { attempts: 3 });
}

#[tokio::test]
async fn test_exhaustion_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let (_tx, rx) = watch::channel(running_handle(server.address().port()));
    assert_eq!(probe(3).wait_ready(&rx, 1).await, Readiness::Exhausted { attempts: 3 });
}

#[tokio::test]
async fn test_exited_backend_aborts_probe() {
    let mut handle = running_handle(portpicker::pick_unused_port().unwrap());
    handle.status = BackendStatus::Exited;
    handle.exit_code = Some(1);
    let (_tx, rx) = watch::channel(handle);

    assert_eq!(probe(50).wait_ready(&rx, 1).await, Readiness::BackendGone);
}

#[tokio::test]
async fn test_newer_generation_aborts_probe() {
    let (_tx, rx) = watch::channel(BackendProcessHandle {
        generation: 2,
        ..running_handle(portpicker::pick_unused_port().unwrap())
    });
    assert_eq!(probe(50).wait_ready(&rx, 1).await, Readiness::BackendGone);
}
