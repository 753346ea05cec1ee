//! sockterm - a browser terminal over WebSockets.
//!
//! Serves a single terminal page plus a WebSocket endpoint. Each connected
//! browser gets its own session; typed commands arrive as JSON packets and
//! the server drives the page by sending DOM directives back.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sockterm::{
    config::Config,
    flows,
    origin::OriginPolicy,
    server::{self, AppState},
    tls,
    users::{default_users_dir, FileStore},
};

/// sockterm - a browser terminal over WebSockets.
///
/// Flags override the config file; anything left unset falls back to the
/// file, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "sockterm", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP listener [default: 127.0.0.1:8080]
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Address to bind the HTTPS listener (requires a certificate and key)
    #[arg(long)]
    tls_bind: Option<SocketAddr>,

    /// Host name browsers use to reach this server [default: localhost]
    #[arg(long)]
    host: Option<String>,

    /// Path to the PEM certificate chain
    #[arg(long, env = "SOCKTERM_CERT")]
    cert: Option<PathBuf>,

    /// Path to the PEM private key
    #[arg(long, env = "SOCKTERM_KEY")]
    key: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long, default_value = "sockterm.toml")]
    config: PathBuf,

    /// Directory for user account records
    #[arg(long)]
    users_dir: Option<PathBuf>,

    /// Reject WebSocket upgrades from unexpected origins instead of just
    /// logging them
    #[arg(long)]
    enforce_origin: bool,

    /// Seconds a synchronous query waits for the browser [default: 30]
    #[arg(long)]
    query_timeout: Option<u64>,
}

/// Effective settings after folding CLI flags over the config file.
struct Settings {
    bind: SocketAddr,
    tls_bind: Option<SocketAddr>,
    host: String,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    users_dir: PathBuf,
    origin_policy: OriginPolicy,
    query_timeout: Duration,
}

fn resolve(cli: Cli, file: Config) -> Settings {
    let server_cfg = file.server.unwrap_or_default();
    let users_cfg = file.users.unwrap_or_default();

    let origin_policy = if cli.enforce_origin {
        OriginPolicy::Enforce
    } else {
        server_cfg.origin_policy.unwrap_or_default()
    };

    let users_dir = cli
        .users_dir
        .or(users_cfg.dir)
        .unwrap_or_else(default_users_dir);

    Settings {
        bind: cli
            .bind
            .or(server_cfg.bind)
            .unwrap_or_else(|| ([127, 0, 0, 1], 8080).into()),
        tls_bind: cli.tls_bind.or(server_cfg.tls_bind),
        host: cli
            .host
            .or(server_cfg.hostname)
            .unwrap_or_else(|| "localhost".to_string()),
        cert: cli.cert.or(file.tls.as_ref().map(|t| t.cert.clone())),
        key: cli.key.or(file.tls.as_ref().map(|t| t.key.clone())),
        users_dir,
        origin_policy,
        query_timeout: Duration::from_secs(
            cli.query_timeout
                .or(server_cfg.query_timeout_secs)
                .unwrap_or(30),
        ),
    }
}

/// WebSocket URL the served page opens. Once a TLS listener exists, every
/// page points at it, so credentials typed into an HTTP-served page still
/// travel encrypted.
fn sock_url(host: &str, bind: SocketAddr, tls_bind: Option<SocketAddr>) -> String {
    match tls_bind {
        Some(tls) => format!("wss://{}:{}/sock", host, tls.port()),
        None => format!("ws://{}:{}/sock", host, bind.port()),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sockterm=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let file = Config::load(&cli.config)?.unwrap_or_default();
    let settings = resolve(cli, file);

    tracing::info!("sockterm starting");

    std::fs::create_dir_all(&settings.users_dir)
        .with_context(|| format!("cannot create users directory {}", settings.users_dir.display()))?;
    let users = Arc::new(FileStore::new(settings.users_dir.clone()));
    let registry = Arc::new(flows::builtin_registry());

    // Origins this server is legitimately reachable from; used by the
    // WebSocket Origin check on both listeners.
    let mut allowed_origins = vec![format!("http://{}:{}", settings.host, settings.bind.port())];
    if let Some(tls_bind) = settings.tls_bind {
        allowed_origins.push(format!("https://{}:{}", settings.host, tls_bind.port()));
    }

    let mut tls_task = None;
    if let Some(tls_bind) = settings.tls_bind {
        let (cert, key) = match (&settings.cert, &settings.key) {
            (Some(cert), Some(key)) => (cert.clone(), key.clone()),
            _ => anyhow::bail!("--tls-bind requires both a certificate and a key"),
        };
        let acceptor = tls::load_tls_config(&cert, &key)?;

        let state = AppState {
            registry: registry.clone(),
            users: users.clone(),
            sock_url: sock_url(&settings.host, settings.bind, Some(tls_bind)),
            secured: true,
            query_timeout: settings.query_timeout,
        };
        let app = server::router(state, allowed_origins.clone(), settings.origin_policy);
        let listener = tokio::net::TcpListener::bind(tls_bind)
            .await
            .with_context(|| format!("cannot bind {tls_bind}"))?;
        tracing::info!(addr = %tls_bind, "HTTPS listener ready");
        tls_task = Some(tokio::spawn(server::serve_tls(listener, app, acceptor)));
    }

    let state = AppState {
        registry,
        users,
        sock_url: sock_url(&settings.host, settings.bind, settings.tls_bind),
        secured: false,
        query_timeout: settings.query_timeout,
    };
    let app = server::router(state, allowed_origins, settings.origin_policy);
    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("cannot bind {}", settings.bind))?;
    tracing::info!(addr = %settings.bind, "HTTP listener ready");
    let http_task = tokio::spawn(server::serve_http(listener, app));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C");
        }
        result = http_task => {
            result.context("HTTP server task panicked")??;
        }
        result = async {
            match tls_task {
                Some(task) => task.await,
                // No TLS listener configured; park this branch forever.
                None => std::future::pending().await,
            }
        } => {
            result.context("HTTPS server task panicked")??;
        }
    }

    tracing::info!("sockterm exiting");
    Ok(())
}
