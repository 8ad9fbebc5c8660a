use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use file_forge::config::{load_config, ConfigOverlay, LogPatch, ServerConfig};
use file_forge::filesystem::config::SandboxConfigPatch;
use file_forge::filesystem::FileSystemService;
use file_forge::server::Server;

#[derive(Parser, Debug)]
#[command(name = "mcp-file-forge", version, about)]
struct Cli {
    /// Config file (default: mcp-file-forge.json or .mcp-file-forge.json in cwd or ancestors)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Allowed root directory; repeat for several
    #[arg(long = "allowed-path", value_name = "PATH")]
    allowed_paths: Vec<String>,

    /// Denied glob pattern; repeat for several
    #[arg(long = "denied-path", value_name = "GLOB")]
    denied_paths: Vec<String>,

    /// Reject every write tool
    #[arg(long)]
    read_only: bool,

    /// Let symlinks point outside the allowed roots
    #[arg(long)]
    follow_symlinks: bool,

    /// error, warn, info or debug
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn overlay(&self) -> ConfigOverlay {
        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        ConfigOverlay {
            sandbox: SandboxConfigPatch {
                allowed_paths: non_empty(&self.allowed_paths),
                denied_paths: non_empty(&self.denied_paths),
                follow_symlinks: self.follow_symlinks.then_some(true),
                ..Default::default()
            },
            logging: LogPatch {
                level: self.log_level.clone(),
                file: None,
            },
            read_only: self.read_only.then_some(true),
            ..Default::default()
        }
    }
}

fn init_tracing(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // stdout carries the protocol, so logs go to stderr
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref());
    let mut config = loaded.config;
    config.apply(cli.overlay());

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(&config)?;

    match (&loaded.file, &loaded.file_error) {
        (_, Some(e)) => tracing::warn!("Ignoring config file: {}", e),
        (Some(path), None) => tracing::info!("Loaded config from {}", path.display()),
        (None, None) => tracing::debug!("No config file found, using defaults and environment"),
    }

    let service = Arc::new(FileSystemService::new(
        config.sandbox.clone(),
        &config.templates,
        config.read_only,
    ));
    tracing::info!(
        "Sandbox roots: {:?}, read-only: {}",
        service.sandbox().allowed_paths(),
        service.gate().is_enabled()
    );

    Server::new(service).run().await?;
    Ok(())
}
