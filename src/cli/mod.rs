use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::clipboard::SystemClipboard;
use crate::config::Config;
use crate::state::ConnectionState;
use crate::store::{EndpointStore, FileEndpointStore};
use crate::sync::ClipboardClient;
use crate::transport::{parse_pairing_code, Endpoint, WebSocketConnector};

#[derive(Parser)]
#[command(name = "clipsync-client")]
#[command(about = "Mirror a paired computer's clipboard over a persistent connection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the client, connecting to the saved computer")]
    Run,

    #[command(about = "Pair with a computer and start the client")]
    Connect {
        /// Pairing code (ws://host:port) or bare host name
        code: String,
    },

    #[command(about = "Forget the saved computer")]
    Forget,

    #[command(about = "Show the saved computer and connection settings")]
    Status,

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Validate configuration")]
    Validate,
}

pub struct CliHandler {
    config: Config,
    config_path: Option<PathBuf>,
    store: FileEndpointStore,
}

impl CliHandler {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_config(config_path)?;
        let store = FileEndpointStore::new(&config.state_file);

        Ok(Self {
            config,
            config_path: config_path.map(Path::to_path_buf),
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn handle_command(self, command: Commands) -> Result<()> {
        match command {
            Commands::Run => self.run_client(None).await,
            Commands::Connect { code } => self.pair(&code).await,
            Commands::Forget => self.forget(),
            Commands::Status => self.show_status(),
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn pair(self, code: &str) -> Result<()> {
        let host = parse_pairing_code(code)
            .ok_or_else(|| anyhow!("Invalid pairing code: {:?}", code))?;

        self.store
            .save(&host)
            .with_context(|| format!("Failed to save {}", self.store.path().display()))?;
        println!("Paired with {}", host);

        self.run_client(Some(host)).await
    }

    async fn run_client(self, host: Option<String>) -> Result<()> {
        let state = Arc::new(ConnectionState::new());
        state.subscribe(|snapshot| {
            let endpoint = snapshot.endpoint.as_deref().unwrap_or("-");
            println!("[{}] {} - {}", snapshot.status, endpoint, snapshot.status.hint());
        });

        let connector = Arc::new(WebSocketConnector::new(self.config.websocket_config()));
        let client = ClipboardClient::start(
            &self.config,
            state,
            connector,
            Arc::new(SystemClipboard::new()),
        );

        match host {
            Some(host) => client.connect(Some(host.as_str())).await?,
            None => {
                if client.resume(&self.store).await?.is_none() {
                    warn!("No saved computer; run 'clipsync-client connect <code>' to pair");
                }
            }
        }

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        client.shutdown().await?;

        Ok(())
    }

    fn forget(&self) -> Result<()> {
        self.store.clear()?;
        println!("Forgot saved computer");
        Ok(())
    }

    fn show_status(&self) -> Result<()> {
        println!("ClipSync Client Status:");
        println!("  Version: {}", env!("CARGO_PKG_VERSION"));
        match &self.config_path {
            Some(path) => println!("  Config: {}", path.display()),
            None => println!("  Config: Default"),
        }
        println!("  State file: {}", self.store.path().display());

        match self.store.load()? {
            Some(host) => {
                let endpoint = Endpoint::new(host, self.config.connection.port);
                println!("  Paired computer: {}", endpoint.url());
                if let Some(saved_at) = self.store.saved_at()? {
                    println!("  Paired at: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
                }
            }
            None => println!("  Paired computer: none"),
        }
        println!(
            "  Auto-connect: {}",
            if self.config.connection.auto_connect { "on" } else { "off" }
        );

        let policy = self.config.reconnection_config();
        let attempts = match policy.max_attempts {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        };
        println!(
            "  Retry: every {:?} (max {:?}, x{}), attempts {}",
            policy.initial_delay, policy.max_delay, policy.backoff_multiplier, attempts
        );

        Ok(())
    }

    fn handle_config_action(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("Current Configuration:");
                println!("{:#?}", self.config);
            }
            ConfigAction::Init { force } => {
                let path = self
                    .config_path
                    .clone()
                    .or_else(Config::default_path)
                    .ok_or_else(|| anyhow!("Could not determine config directory"))?;
                Config::write_example(&path, force)?;
                println!("Example configuration written to {}", path.display());
            }
            ConfigAction::Validate => {
                // Config is already loaded and validated in CliHandler::new()
                println!("Configuration is valid");
            }
        }
        Ok(())
    }
}
