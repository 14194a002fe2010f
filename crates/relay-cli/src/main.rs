use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use relay_core::{
    ContextStore, MemoryContextStore, RequestRouter, SimulatedAgentBackend, SqliteContextStore,
};
use relay_gateway::GatewayServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{RelayConfig, StoreBackend};

#[derive(Parser)]
#[command(name = "relay")]
#[command(version)]
#[command(about = "Relay — routes supervisor recommendations to child agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Handle a single event and print the response as JSON
    Invoke {
        /// Event file; reads stdin when omitted or "-"
        event: Option<PathBuf>,
    },

    /// Serve invocations over HTTP
    Serve {
        /// Address to bind, overrides gateway.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Delete expired conversation context records
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `invoke` output stays pipeable
    let filter = if cli.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Invoke { event } => cmd_invoke(&cli.config, event).await,
        Commands::Serve { bind } => cmd_serve(&cli.config, bind).await,
        Commands::Prune => cmd_prune(&cli.config).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Relay initialized at {}", config_dir.display());
    println!(
        "Edit {} to configure your child agents.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

async fn cmd_invoke(config_path: &Option<PathBuf>, event: Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let raw = load_event(event).await?;
    println!("{}", invoke_event(&cfg, &raw).await?);
    Ok(())
}

/// Event JSON from a file, or from stdin when omitted or "-"
async fn load_event(event: Option<PathBuf>) -> Result<String> {
    match event {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read event file {}", path.display())),
        _ => read_event(tokio::io::stdin()).await,
    }
}

async fn read_event(mut input: impl AsyncRead + Unpin) -> Result<String> {
    let mut buf = String::new();
    input
        .read_to_string(&mut buf)
        .await
        .context("Failed to read event from stdin")?;
    Ok(buf)
}

/// Run one raw JSON event through a fresh router, returning pretty JSON
async fn invoke_event(cfg: &RelayConfig, raw: &str) -> Result<String> {
    let event: serde_json::Value = serde_json::from_str(raw).context("Event is not valid JSON")?;
    let router = build_router(cfg)?;
    let response = router.handle_value(event).await?;
    Ok(serde_json::to_string_pretty(&response)?)
}

async fn cmd_serve(config_path: &Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let bind = bind.unwrap_or_else(|| cfg.gateway.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))?;

    if cfg.gateway.auth_token.is_empty() && !addr.ip().is_loopback() {
        warn!("Gateway bound to {} with no auth token", addr);
    }

    info!("Serving invocations in {} mode", cfg.mode());
    let router = Arc::new(build_router(&cfg)?);
    let server = GatewayServer::new(addr, router, cfg.gateway.auth_token.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    server.run(cancel).await
}

async fn cmd_prune(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    if cfg.store.backend != StoreBackend::Sqlite {
        bail!("prune only applies to the sqlite store backend");
    }
    let store = open_sqlite_store(&cfg)?;
    let purged = store.purge_expired(chrono::Utc::now()).await?;
    let remaining = store.count().await?;
    println!(
        "Removed {} expired context records, {} remaining",
        purged, remaining
    );
    Ok(())
}

fn build_router(cfg: &RelayConfig) -> Result<RequestRouter> {
    let store: Arc<dyn ContextStore> = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(MemoryContextStore::new(cfg.router.state_table.clone())),
        StoreBackend::Sqlite => Arc::new(open_sqlite_store(cfg)?),
    };
    Ok(RequestRouter::new(
        cfg.router.clone(),
        store,
        Arc::new(SimulatedAgentBackend::new()),
    ))
}

fn open_sqlite_store(cfg: &RelayConfig) -> Result<SqliteContextStore> {
    let path = cfg.store.resolved_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store dir: {}", parent.display()))?;
    }
    SqliteContextStore::open(&path, &cfg.router.state_table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn memory_config(mode: &str) -> RelayConfig {
        let toml = format!(
            r#"
[router]
mode = "{mode}"

[router.child_agents]
"0" = "agent-data"
"1" = "agent-code"
"2" = "agent-infra"

[store]
backend = "memory"
"#
        );
        RelayConfig::parse(&toml, |_| None).unwrap()
    }

    #[tokio::test]
    async fn test_read_event_from_reader() {
        let raw = read_event(&br#"{"sessionId":"s-1"}"#[..]).await.unwrap();
        assert_eq!(raw, r#"{"sessionId":"s-1"}"#);
    }

    #[tokio::test]
    async fn test_load_event_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_event(Some(dir.path().join("absent.json")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read event file"));
    }

    #[tokio::test]
    async fn test_invoke_event_prints_decision() {
        let raw = r#"{
            "supervisorResponse": { "completion": "Infrastructure Planning" },
            "sessionId": "s-1",
            "userInput": "plan a cluster"
        }"#;
        let output = invoke_event(&memory_config("dual"), raw).await.unwrap();

        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["selectedAgentId"], "agent-infra");
        assert_eq!(value["selectedAgentIndex"], 2);
        assert_eq!(value["originalQuery"], "plan a cluster");
        assert!(output.contains('\n'));
    }

    #[tokio::test]
    async fn test_invoke_event_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        let event = r#"{"isFormatting": true, "sessionId": "s-2", "userInput": "hi"}"#;
        tokio::fs::write(&path, event).await.unwrap();

        let raw = load_event(Some(path)).await.unwrap();
        let output = invoke_event(&memory_config("dual"), &raw).await.unwrap();
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["response"], "Here's the formatted response for you: hi");
        assert_eq!(value["sessionId"], "s-2");
    }

    #[tokio::test]
    async fn test_invoke_event_rejects_bad_input() {
        let cfg = memory_config("route-only");
        let err = invoke_event(&cfg, "{not json").await.unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));

        let err = invoke_event(&cfg, r#"{"sessionId":"s"}"#).await.unwrap_err();
        assert!(err.to_string().contains("invalid event"));
    }

    #[tokio::test]
    async fn test_invoke_event_persists_to_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = memory_config("dual");
        cfg.store.backend = StoreBackend::Sqlite;
        cfg.store.path = dir.path().join("state.db").display().to_string();

        let raw = r#"{
            "supervisorResponse": { "completion": "Code Generation" },
            "sessionId": "s-3",
            "userInput": "write a parser"
        }"#;
        invoke_event(&cfg, raw).await.unwrap();

        let store = open_sqlite_store(&cfg).unwrap();
        let record = store.get("s-3").await.unwrap().unwrap();
        assert_eq!(record.conversation_context.selected_agent_id, "agent-code");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invoke_logs_event_and_outcome() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let raw = r#"{
            "supervisorResponse": { "completion": "Code Generation" },
            "sessionId": "s-4",
            "userInput": "write a lexer"
        }"#;
        invoke_event(&memory_config("dual"), raw).await.unwrap();

        let lines = logs.lines();
        assert!(
            lines
                .iter()
                .any(|l| l.contains("DEBUG") && l.contains("Event received"))
        );
        assert!(lines.iter().any(|l| {
            l.contains("INFO") && l.contains("Routing to Code Generation agent 'agent-code'")
        }));
    }
}
