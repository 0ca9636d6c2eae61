use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use iachat_dropzone::{
    ClassList, DragEventKind, DropOutcome, DropZone, DroppedFile, HttpUploadTransport, LogView,
    SyntheticDragEvent,
};
use iachat_llm::{ChatModel, OpenAiChatModel, StaticChatModel};
use iachat_server::{build_router, AppState, ServerSettings};
use iachat_storage::{StorageConfig, UploadStore};
use serde::Deserialize;
use tracing::{info, warn};

const OFFLINE_REPLY: &str = "No language model is configured on this server.";

#[derive(Debug, Parser)]
#[command(author, version, about = "Self-hosted chat and file upload daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve {
        #[arg(long, default_value = "config/iachat.toml")]
        config: PathBuf,
    },
    /// Upload local files through the drag-and-drop flow.
    Drop {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    http: HttpSection,
    storage: StorageSection,
    llm: LlmSection,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpSection {
    bind: String,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    sqlite_path: String,
    upload_dir: PathBuf,
    #[serde(default = "default_keep_last")]
    keep_last: i64,
    #[serde(default = "default_max_age_days")]
    max_age_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmSection {
    base_url: Option<String>,
    model: String,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
}

fn default_max_upload_bytes() -> usize {
    ServerSettings::default().max_upload_bytes
}

fn default_keep_last() -> i64 {
    100
}

fn default_max_age_days() -> i64 {
    30
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Drop { server, files } => drop_files(server, files).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config_source = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    let config: RuntimeConfig = toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))?;

    ensure_sqlite_parent(&config.storage.sqlite_path)?;
    let store = UploadStore::connect(&StorageConfig {
        sqlite_path: config.storage.sqlite_path.clone(),
        upload_dir: config.storage.upload_dir.clone(),
    })
    .await?;

    if let Err(err) = store
        .purge_expired(config.storage.keep_last, config.storage.max_age_days)
        .await
    {
        warn!(error = %err, "upload retention sweep failed");
    }

    let model_name = resolve_model_name(&config.llm, std::env::var("OPENAI_MODEL").ok());
    let api_key = std::env::var(&config.llm.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty());
    let model = build_model(&config.llm, api_key);
    info!(provider = model.name(), model = %model_name, "chat model ready");

    let settings = ServerSettings {
        default_model: model_name,
        max_upload_bytes: config.http.max_upload_bytes,
    };
    let app = build_router(AppState::new(store, model, settings));

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "iachatd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn ensure_sqlite_parent(sqlite_path: &str) -> Result<()> {
    if sqlite_path.starts_with("sqlite:") {
        return Ok(());
    }
    match Path::new(sqlite_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}

/// `OPENAI_MODEL` wins over the configured model when set.
fn resolve_model_name(llm: &LlmSection, env_override: Option<String>) -> String {
    env_override
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| llm.model.clone())
}

fn build_model(llm: &LlmSection, api_key: Option<String>) -> Arc<dyn ChatModel> {
    match api_key {
        Some(key) => {
            let mut model = OpenAiChatModel::new(key);
            if let Some(base_url) = &llm.base_url {
                model = model.with_base_url(base_url.clone());
            }
            Arc::new(model)
        }
        None => {
            warn!(
                env = %llm.api_key_env,
                "no API key found; chat and summaries will use a canned reply"
            );
            Arc::new(StaticChatModel::reply(OFFLINE_REPLY))
        }
    }
}

/// Prints each log line to stdout; a terminal is always scrolled to the end.
struct StdoutLog;

impl LogView for StdoutLog {
    fn append_line(&self, line: &str) {
        println!("{line}");
    }

    fn scroll_to_bottom(&self) {}
}

async fn drop_files(server: String, paths: Vec<PathBuf>) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(DroppedFile::new(name, bytes));
    }

    let zone = DropZone::new(
        Arc::new(ClassList::new()),
        Arc::new(StdoutLog),
        Arc::new(HttpUploadTransport::new(server)),
    );

    zone.handle_event(&SyntheticDragEvent::new(DragEventKind::Enter))
        .await;
    match zone.handle_event(&SyntheticDragEvent::drop_files(files)).await {
        DropOutcome::Uploaded(reply) => {
            let pretty = serde_json::to_string_pretty(&reply.body)
                .context("failed to render upload reply")?;
            println!("{pretty}");
            if !reply.is_success_status() {
                bail!("server answered HTTP {}", reply.status);
            }
            Ok(())
        }
        DropOutcome::Failed(err) => Err(err).context("upload failed"),
        DropOutcome::Ignored | DropOutcome::Tracked => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_sqlite_parent, resolve_model_name, RuntimeConfig};
    use clap::Parser;

    const SAMPLE: &str = include_str!("../../../config/iachat.toml");

    #[test]
    fn sample_config_parses() {
        let config: RuntimeConfig = toml::from_str(SAMPLE).expect("config");
        assert_eq!(config.http.bind, "0.0.0.0:8080");
        assert_eq!(config.http.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(config.storage.keep_last, 100);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn optional_sections_fall_back_to_defaults() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [http]
            bind = "127.0.0.1:9000"
            [storage]
            sqlite_path = "sqlite::memory:"
            upload_dir = "/tmp/uploads"
            [llm]
            model = "gpt-4o"
            "#,
        )
        .expect("config");
        assert_eq!(config.storage.max_age_days, 30);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert!(config.llm.base_url.is_none());
    }

    #[test]
    fn env_model_overrides_config() {
        let config: RuntimeConfig = toml::from_str(SAMPLE).expect("config");
        assert_eq!(resolve_model_name(&config.llm, None), "gpt-4o-mini");
        assert_eq!(
            resolve_model_name(&config.llm, Some("gpt-4o".to_string())),
            "gpt-4o"
        );
        assert_eq!(
            resolve_model_name(&config.llm, Some("  ".to_string())),
            "gpt-4o-mini"
        );
    }

    #[test]
    fn memory_sqlite_needs_no_directory() {
        ensure_sqlite_parent("sqlite::memory:").expect("noop");
        ensure_sqlite_parent("iachat.db").expect("no parent");
    }

    #[test]
    fn drop_requires_at_least_one_file() {
        assert!(super::Cli::try_parse_from(["iachatd", "drop"]).is_err());
        assert!(super::Cli::try_parse_from(["iachatd", "drop", "a.txt", "b.png"]).is_ok());
    }
}
