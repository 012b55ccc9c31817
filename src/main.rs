use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitesmith_agent::{GenerateSiteRequest, SiteService};
use sitesmith_core::config::{dirs_home, AppConfig};
use sitesmith_gateway::GatewayServer;
use sitesmith_store::{ManageSiteFilesTool, SiteStore};

#[derive(Parser)]
#[command(name = "sitesmith", version, about = "Generate single-page websites with an LLM")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sitesmith.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/SSE gateway server
    Serve {
        /// Override the bind address from config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Generate one site and print the result
    Generate {
        /// What the site should contain (read from stdin when empty)
        #[arg(trailing_var_arg = true)]
        requirements: Vec<String>,
        /// Kind of site (landing page, portfolio, game, ...)
        #[arg(long)]
        site_type: Option<String>,
        /// Styling preferences
        #[arg(long)]
        style: Option<String>,
    },
    /// Operate on files of a generated site
    Files {
        #[arg(value_enum)]
        operation: FileOp,
        #[arg(long)]
        site_id: String,
        #[arg(long, default_value = "index.html")]
        path: String,
        /// Content for create_file
        #[arg(long)]
        content: Option<String>,
        /// String to replace for edit_file
        #[arg(long)]
        old: Option<String>,
        /// Replacement for edit_file
        #[arg(long)]
        new: Option<String>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum FileOp {
    CreateFile,
    EditFile,
    ReadFile,
    DeleteFile,
}

impl FileOp {
    fn as_str(self) -> &'static str {
        match self {
            FileOp::CreateFile => "create_file",
            FileOp::EditFile => "edit_file",
            FileOp::ReadFile => "read_file",
            FileOp::DeleteFile => "delete_file",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sitesmith=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "sitesmith", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            let mut shown = config.clone();
            for model in std::iter::once(&mut shown.model).chain(shown.fallback_models.iter_mut()) {
                if model.api_key.is_some() {
                    model.api_key = Some("***".to_string());
                }
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Some(Commands::Files {
            operation,
            site_id,
            path,
            content,
            old,
            new,
        }) => {
            let store = Arc::new(SiteStore::new(config.sites_dir()));
            let tool = ManageSiteFilesTool::new(
                store,
                config.gateway.clone(),
                config.store.max_old_string_len,
            );
            let mut args = serde_json::json!({
                "operation": operation.as_str(),
                "site_id": site_id,
                "file_path": path,
            });
            for (key, value) in [("content", content), ("old_string", old), ("new_string", new)] {
                if let Some(v) = value {
                    args[key] = serde_json::Value::String(v);
                }
            }
            let result = tool.handle(args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(Commands::Generate {
            requirements,
            site_type,
            style,
        }) => {
            let mut text = requirements.join(" ");
            if text.trim().is_empty() {
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            let service = build_service(&mut config)?;
            let result = service
                .generate_site(GenerateSiteRequest {
                    requirements: text,
                    site_type,
                    style_preferences: style,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Some(Commands::Serve { bind }) => {
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            let service = build_service(&mut config)?;
            info!(
                bind = %config.gateway.bind,
                model = %config.model.model_id,
                sites_dir = %config.sites_dir().display(),
                "Starting gateway"
            );
            let server = GatewayServer::new(Arc::new(service));
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Some(Commands::Completions { .. }) => {}
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

/// `--config` if present, then `~/.sitesmith/config.toml`, then environment defaults.
fn load_config(path: &PathBuf) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    if let Some(home_config) = dirs_home().map(|h| h.join(".sitesmith").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }
    eprintln!("Warning: No config file found. Using environment defaults (OPENROUTER_API_KEY, OPENAI_API_KEY, or local Ollama).");
    Ok(AppConfig::from_env())
}

fn build_service(config: &mut AppConfig) -> anyhow::Result<SiteService> {
    let llm = sitesmith_llm::build_client(config);
    let store = Arc::new(SiteStore::new(config.sites_dir()));
    Ok(SiteService::with_llm(config.clone(), store, llm)?)
}
