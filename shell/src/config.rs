//! Command-line arguments and the validated shell configuration

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{ShellError, ShellResult};

/// Environment marker passed to the backend so it knows it runs under the shell
pub const SHELL_RUN_MARKER: (&str, &str) = ("DESKTOP_SHELL_RUN", "1");

const DEFAULT_S3_BUCKET: &str = "your-app-updates";
const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_S3_PATH: &str = "/updates";

/// Desktop shell hosting the presentation layer and supervising its backend
#[derive(Parser, Debug, Clone)]
#[command(name = "desktop-shell")]
#[command(about = "Hosts the UI, supervises the backend service and applies updates")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Development mode: UI from the dev server, updates disabled
    #[arg(long)]
    pub dev: bool,

    /// Application directory containing `backend/` (defaults to the executable's directory)
    #[arg(long)]
    pub app_dir: Option<PathBuf>,

    /// Backend executable, overriding the bundled interpreter layout
    #[arg(long)]
    pub backend_exe: Option<PathBuf>,

    /// Extra backend argument (repeatable); replaces the default `main.py`
    #[arg(long = "backend-arg", allow_hyphen_values = true)]
    pub backend_args: Vec<String>,

    /// Liveness endpoint probed before the window opens
    #[arg(long, default_value = "/api/health")]
    pub health_path: String,

    /// Readiness probe attempts
    #[arg(long, default_value = "40")]
    pub health_attempts: u32,

    /// Delay between readiness probes in milliseconds
    #[arg(long, default_value = "250")]
    pub health_interval_ms: u64,

    /// Gateway request timeout in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout_secs: u64,

    /// Presentation bridge bind address (port 0 picks a free port)
    #[arg(long, default_value = "127.0.0.1:0")]
    pub bridge_addr: SocketAddr,

    /// Development UI server
    #[arg(long, default_value = "http://localhost:5173")]
    pub dev_server_url: String,

    /// Directory with the packaged UI (defaults to `<app_dir>/ui`)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Single-instance lock file (defaults to the platform runtime/cache directory)
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// Directory for the rolling log file (defaults to the platform data directory)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Log to stdout only
    #[arg(long)]
    pub no_log_file: bool,

    /// Run a silent update check shortly after startup
    #[arg(long)]
    pub check_updates_on_start: bool,

    /// Do not open a browser window (the UI is opened manually)
    #[arg(long)]
    pub headless: bool,

    #[arg(long, env = "SHELL_UPDATER_S3_BUCKET", default_value = DEFAULT_S3_BUCKET)]
    pub s3_bucket: String,

    #[arg(long, env = "SHELL_UPDATER_S3_REGION", default_value = DEFAULT_S3_REGION)]
    pub s3_region: String,

    #[arg(long, env = "SHELL_UPDATER_S3_PATH", default_value = DEFAULT_S3_PATH)]
    pub s3_path: String,

    /// Custom S3-compatible endpoint
    #[arg(long, env = "SHELL_UPDATER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "SHELL_UPDATER_S3_FORCE_PATH_STYLE")]
    pub s3_force_path_style: bool,

    /// Full feed URL, bypassing the S3 settings
    #[arg(long, env = "SHELL_UPDATER_FEED_URL")]
    pub feed_url: Option<String>,

    /// Started by the installer; wait for the previous instance to let go
    #[arg(long, hide = true)]
    pub relaunched: bool,
}

/// S3 location of the update feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3FeedLocation {
    pub bucket: String,
    pub region: String,
    pub path: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl S3FeedLocation {
    /// Base URL of the feed directory, always ending in `/`
    pub fn base_url(&self) -> ShellResult<Url> {
        let path = self.path.trim_end_matches('/');
        let path = if path.is_empty() || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let raw = match &self.endpoint {
            None => format!("https://{}.s3.{}.amazonaws.com{}/", self.bucket, self.region, path),
            Some(endpoint) if self.force_path_style => {
                format!("{}/{}{}/", endpoint.trim_end_matches('/'), self.bucket, path)
            }
            Some(endpoint) => {
                let endpoint = Url::parse(endpoint)
                    .map_err(|e| ShellError::config(format!("s3 endpoint '{endpoint}': {e}")))?;
                let host = endpoint
                    .host_str()
                    .ok_or_else(|| ShellError::config("s3 endpoint has no host"))?;
                let port = endpoint.port().map(|p| format!(":{p}")).unwrap_or_default();
                format!("{}://{}.{}{}{}/", endpoint.scheme(), self.bucket, host, port, path)
            }
        };

        Url::parse(&raw).map_err(|e| ShellError::config(format!("update feed url '{raw}': {e}")))
    }
}

/// Update feed settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub base_url: Url,
    /// Channel manifest for this platform
    pub manifest: String,
    pub current_version: String,
    /// Where downloaded artifacts are staged
    pub download_dir: PathBuf,
}

/// Channel manifest name for the platform the shell runs on
pub fn platform_manifest() -> &'static str {
    if cfg!(target_os = "windows") {
        "latest.yml"
    } else if cfg!(target_os = "macos") {
        "latest-mac.yml"
    } else {
        "latest-linux.yml"
    }
}

/// How the backend is launched (the port is added per launch)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendLaunchConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Readiness probe settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub path: String,
    pub attempts: u32,
    pub interval: Duration,
}

/// Where the presentation layer is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSource {
    DevServer(Url),
    Packaged(PathBuf),
}

/// Validated configuration shared by every shell component
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub app_dir: PathBuf,
    pub dev_mode: bool,
    pub backend: BackendLaunchConfig,
    pub readiness: ReadinessConfig,
    pub request_timeout: Duration,
    pub bridge_addr: SocketAddr,
    pub ui: UiSource,
    pub open_browser: bool,
    pub lock_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub feed: FeedConfig,
    pub check_updates_on_start: bool,
    pub startup_check_delay: Duration,
    /// Zero windows quits the shell unless the platform keeps apps alive
    pub quit_when_windows_closed: bool,
    /// Time a closed page has to reconnect before it counts as closed
    pub window_close_grace: Duration,
    /// Time the backend has to exit after SIGTERM before it is killed
    pub stop_grace: Duration,
}

impl ShellConfig {
    /// Build and validate the configuration from parsed arguments
    pub fn from_args(args: &Args) -> ShellResult<Self> {
        let app_dir = match &args.app_dir {
            Some(dir) => dir.clone(),
            None => default_app_dir()?,
        };

        let backend = resolve_backend(&app_dir, args.backend_exe.as_deref(), &args.backend_args);

        let ui = if args.dev {
            let url = Url::parse(&args.dev_server_url)
                .map_err(|e| ShellError::config(format!("dev server url '{}': {e}", args.dev_server_url)))?;
            UiSource::DevServer(url)
        } else {
            UiSource::Packaged(args.static_dir.clone().unwrap_or_else(|| app_dir.join("ui")))
        };

        let base_url = match &args.feed_url {
            Some(raw) => {
                let normalized = if raw.ends_with('/') { raw.clone() } else { format!("{raw}/") };
                Url::parse(&normalized).map_err(|e| ShellError::config(format!("feed url '{raw}': {e}")))?
            }
            None => S3FeedLocation {
                bucket: args.s3_bucket.clone(),
                region: args.s3_region.clone(),
                path: args.s3_path.clone(),
                endpoint: args.s3_endpoint.clone(),
                force_path_style: args.s3_force_path_style,
            }
            .base_url()?,
        };

        let log_dir = if args.no_log_file {
            None
        } else {
            args.log_dir.clone().or_else(default_log_dir)
        };

        let config = Self {
            dev_mode: args.dev,
            backend,
            readiness: ReadinessConfig {
                path: shared::normalize_endpoint(&args.health_path),
                attempts: args.health_attempts,
                interval: Duration::from_millis(args.health_interval_ms),
            },
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            bridge_addr: args.bridge_addr,
            ui,
            open_browser: !args.headless,
            lock_path: args.lock_file.clone().unwrap_or_else(default_lock_path),
            log_dir,
            feed: FeedConfig {
                base_url,
                manifest: platform_manifest().to_string(),
                current_version: env!("CARGO_PKG_VERSION").to_string(),
                download_dir: std::env::temp_dir().join("desktop-shell-updates"),
            },
            check_updates_on_start: args.check_updates_on_start,
            startup_check_delay: Duration::from_secs(5),
            quit_when_windows_closed: !cfg!(target_os = "macos"),
            window_close_grace: Duration::from_secs(3),
            stop_grace: Duration::from_secs(5),
            app_dir,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the shell misbehave at runtime
    pub fn validate(&self) -> ShellResult<()> {
        if self.readiness.attempts == 0 {
            return Err(ShellError::config("health attempts must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ShellError::config("request timeout must be greater than zero"));
        }
        if !self.bridge_addr.ip().is_loopback() {
            return Err(ShellError::config(format!(
                "bridge must bind to loopback, got {}",
                self.bridge_addr
            )));
        }
        if !matches!(self.feed.base_url.scheme(), "http" | "https") {
            return Err(ShellError::config(format!(
                "update feed must be http(s), got {}",
                self.feed.base_url
            )));
        }
        Ok(())
    }

    /// Configuration for tests and embedding: everything rooted at `app_dir`,
    /// no browser, no log file.
    pub fn for_app_dir(app_dir: impl Into<PathBuf>) -> ShellResult<Self> {
        let app_dir = app_dir.into();
        let base_url = Url::parse("http://127.0.0.1:9/updates/")
            .map_err(|e| ShellError::config(format!("update feed url: {e}")))?;
        Ok(Self {
            dev_mode: false,
            backend: resolve_backend(&app_dir, None, &[]),
            readiness: ReadinessConfig {
                path: "/api/health".to_string(),
                attempts: 40,
                interval: Duration::from_millis(250),
            },
            request_timeout: Duration::from_secs(30),
            bridge_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            ui: UiSource::Packaged(app_dir.join("ui")),
            open_browser: false,
            lock_path: app_dir.join("desktop-shell.lock"),
            log_dir: None,
            feed: FeedConfig {
                base_url,
                manifest: platform_manifest().to_string(),
                current_version: env!("CARGO_PKG_VERSION").to_string(),
                download_dir: app_dir.join("updates"),
            },
            check_updates_on_start: false,
            startup_check_delay: Duration::from_secs(5),
            quit_when_windows_closed: true,
            window_close_grace: Duration::from_secs(3),
            stop_grace: Duration::from_secs(5),
            app_dir,
        })
    }
}

/// Backend layout: `backend/venv` interpreter running `main.py`, unless an
/// explicit executable is given.
pub fn resolve_backend(app_dir: &Path, exe_override: Option<&Path>, extra_args: &[String]) -> BackendLaunchConfig {
    let working_dir = app_dir.join("backend");

    match exe_override {
        Some(exe) => BackendLaunchConfig {
            executable: exe.to_path_buf(),
            args: extra_args.to_vec(),
            working_dir,
        },
        None => {
            let interpreter = if cfg!(target_os = "windows") {
                working_dir.join(".venv").join("Scripts").join("python.exe")
            } else {
                working_dir.join("venv").join("bin").join("python")
            };
            let args = if extra_args.is_empty() {
                vec!["main.py".to_string()]
            } else {
                extra_args.to_vec()
            };
            BackendLaunchConfig {
                executable: interpreter,
                args,
                working_dir,
            }
        }
    }
}

fn default_app_dir() -> ShellResult<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ShellError::config("cannot determine application directory"))
}

fn default_lock_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("desktop-shell.lock")
}

fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("desktop-shell").join("logs"))
}
