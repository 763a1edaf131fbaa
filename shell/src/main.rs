//! Main entry point for the desktop shell binary
//!
//! Builds the real service implementations and hands them to the shell.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use shared::{logging, process_debug, process_info, process_warn, ProcessId};
use shell::{
    bridge::{BridgeServer, BridgeState},
    config::{Args, UiSource},
    services::{
        instance_guard::request_activation, ApiGateway, BrowserSurface, OsPortAllocator, PageTracker,
        RealSupervisor, S3UpdateFeed, SelfReplaceInstaller, SingleInstanceGuard,
    },
    shell::spawn_signal_listener,
    LaunchOutcome, ProcessSupervisor, Shell, ShellConfig, ShellContext, ShellResult, Updater,
};

/// How long a relaunched shell waits for its predecessor's lock
const RELAUNCH_LOCK_WAIT: Duration = Duration::from_secs(30);

/// Timeout for handing activation over to the running instance
const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> ShellResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    ProcessId::init_shell();
    let config = Arc::new(ShellConfig::from_args(&args)?);
    let _log_guard = logging::init_tracing(Some(&args.log_level), config.log_dir.as_deref());
    logging::log_startup(
        ProcessId::current(),
        if config.dev_mode { "desktop shell (development mode)" } else { "desktop shell" },
    );
    process_debug!(ProcessId::current(), "Backend: {:?}", config.backend);

    let mut guard = SingleInstanceGuard::new(&config.lock_path);
    let acquired = if args.relaunched {
        guard.acquire_within(RELAUNCH_LOCK_WAIT).await?
    } else {
        guard.acquire()?
    };
    if !acquired {
        hand_over_to_running_instance(&guard).await;
        return Ok(());
    }

    // Wire services; every component reports back through the event channel
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let supervisor = Arc::new(
        RealSupervisor::new()
            .with_events(events_tx.clone())
            .with_stop_grace(config.stop_grace),
    );
    let context = ShellContext::new(supervisor.watch(), events_tx.clone(), config.clone());

    let pages = PageTracker::new(config.window_close_grace, events_tx.clone());
    let surface = Arc::new(BrowserSurface::new(pages.clone()).with_browser(config.open_browser));

    let feed = Arc::new(S3UpdateFeed::new(&config.feed)?);
    let installer = Arc::new(SelfReplaceInstaller::new()?);
    let updater = Updater::from_config(&config, feed, installer).with_events(events_tx);

    let gateway = Arc::new(ApiGateway::from_context(&context)?);
    let static_dir = match &config.ui {
        UiSource::Packaged(dir) => Some(dir.clone()),
        UiSource::DevServer(_) => None,
    };
    let state = BridgeState::new(gateway, updater.clone(), context.clone(), pages);
    let bridge = BridgeServer::bind(config.bridge_addr, state, static_dir).await?;
    guard.record_bridge(&bridge.base_url())?;

    spawn_signal_listener(context.clone());

    let mut shell = Shell::new(
        context,
        events_rx,
        Arc::new(OsPortAllocator::new()),
        supervisor,
        surface,
        updater.clone(),
    )?
    .with_bridge_url(bridge.base_url());

    if let LaunchOutcome::Started { backend } = shell.launch(&mut guard).await? {
        process_info!(ProcessId::current(), "Backend status after launch: {:?}", backend.status);
    }

    if config.check_updates_on_start && updater.is_enabled() {
        updater.schedule_check(config.startup_check_delay);
    }

    let reason = shell.run().await?;

    bridge.shutdown().await;
    guard.release();
    logging::log_success(ProcessId::current(), &format!("Desktop shell stopped ({reason})"));
    Ok(())
}

/// Ask the instance holding the lock to show its window
async fn hand_over_to_running_instance(guard: &SingleInstanceGuard) {
    match guard.holder() {
        Some(record) => match request_activation(&record, ACTIVATION_TIMEOUT).await {
            Ok(()) => {
                process_info!(ProcessId::current(), "Activated running instance (pid {})", record.pid);
            }
            Err(e) => logging::log_error(ProcessId::current(), "Activating running instance", &e),
        },
        None => {
            process_warn!(ProcessId::current(), "Another instance is starting up; exiting");
        }
    }
}
