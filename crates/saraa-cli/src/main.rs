use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use saraa_core::{Engine, Lexicon, ProfileResponder, demo_registry, spawn_watcher};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::SaraaConfig;

#[derive(Parser)]
#[command(name = "saraa")]
#[command(version)]
#[command(about = "SARAA: campus assistant query understanding and dispatch")]
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
    /// Ask a single question
    Ask {
        /// The question to ask
        message: String,

        /// Session to run the turn in
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// Print the structured response as JSON
        #[arg(long)]
        json: bool,

        /// Student profile (TOML) to use for the session
        #[arg(short, long)]
        profile: Option<PathBuf>,
    },

    /// Start an interactive session
    Chat {
        /// Session id; a new one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,

        /// Student profile (TOML) to use for the session
        #[arg(short, long)]
        profile: Option<PathBuf>,
    },

    /// Show entities, intents and routing for a question without dispatching
    Explain {
        message: String,

        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// Validate the lexicon and capability table
    Check,

    /// Initialize config directory with default config and lexicon
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Check => cmd_check(&cli.config).await,
        Commands::Ask {
            message,
            session,
            json,
            profile,
        } => cmd_ask(&cli.config, &session, &message, json, &profile).await,
        Commands::Chat { session, profile } => cmd_chat(&cli.config, session, &profile).await,
        Commands::Explain { message, session } => {
            cmd_explain(&cli.config, &session, &message).await
        }
    }
}

/// Build an engine from config with the demo responders, sharing `profiles`
fn build_engine(cfg: &SaraaConfig, profiles: Arc<ProfileResponder>) -> Result<Engine> {
    let lexicon = match cfg.lexicon.resolved_path() {
        Some(path) => Lexicon::load(&path)?,
        None => Lexicon::builtin(),
    };
    Engine::builder()
        .lexicon(lexicon)
        .registry(demo_registry())
        .responder(profiles)
        .capabilities(cfg.capabilities.clone())
        .config(cfg.to_engine_config())
        .build()
        .context("Invalid engine configuration")
}

/// Profile store with the session's profile loaded from `path`, if given
async fn profiles_for(session: &str, path: &Option<PathBuf>) -> Result<Arc<ProfileResponder>> {
    let profiles = Arc::new(ProfileResponder::new());
    if let Some(path) = path {
        let profile = config::load_profile(path)?;
        info!("Using profile of {} from {}", profile.name, path.display());
        profiles.set_profile(session, profile).await;
    }
    Ok(profiles)
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
        info!("Created default config at {}", config_path.display());
    }

    // Editable copy of the built-in lexicon
    let lexicon_path = config_dir.join("lexicon.yaml");
    if lexicon_path.exists() {
        warn!("Lexicon already exists at {}", lexicon_path.display());
    } else {
        tokio::fs::write(&lexicon_path, Lexicon::builtin().to_yaml_string()?).await?;
        info!("Created lexicon at {}", lexicon_path.display());
    }

    println!("SARAA initialized at {}", config_dir.display());
    println!(
        "Set lexicon.path = \"{}\" in {} to use your own vocabulary.",
        lexicon_path.display(),
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = SaraaConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_check(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = SaraaConfig::load(config_path)?;
    let engine = build_engine(&cfg, Arc::new(ProfileResponder::new()))?;
    let lexicon = engine.lexicon().snapshot();
    println!(
        "OK: {} slot table(s), {} intent table(s), {} responder(s)",
        lexicon.slots.len(),
        lexicon.intents.len(),
        engine.router().responder_ids().len()
    );
    for intent in engine.router().uncovered_intents() {
        println!("warning: no responder handles {}", intent);
    }
    Ok(())
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    session: &str,
    message: &str,
    json: bool,
    profile: &Option<PathBuf>,
) -> Result<()> {
    let cfg = SaraaConfig::load(config_path)?;
    let engine = build_engine(&cfg, profiles_for(session, profile).await?)?;

    let response = engine.process_turn(session, message).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", response.render());
    }
    Ok(())
}

async fn cmd_explain(config_path: &Option<PathBuf>, session: &str, message: &str) -> Result<()> {
    let cfg = SaraaConfig::load(config_path)?;
    let engine = build_engine(&cfg, Arc::new(ProfileResponder::new()))?;
    let understanding = engine.explain(session, message).await;
    println!("{}", serde_json::to_string_pretty(&understanding)?);
    Ok(())
}

async fn cmd_chat(
    config_path: &Option<PathBuf>,
    session: Option<String>,
    profile: &Option<PathBuf>,
) -> Result<()> {
    let cfg = SaraaConfig::load(config_path)?;
    let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let engine = Arc::new(build_engine(&cfg, profiles_for(&session, profile).await?)?);
    let cancel = CancellationToken::new();

    let sweeper = Arc::clone(engine.contexts()).spawn_sweeper(
        Duration::from_secs(cfg.context.sweep_interval_secs.max(1)),
        cancel.clone(),
    );

    let watcher = match (cfg.lexicon.watch, cfg.lexicon.resolved_path()) {
        (true, Some(path)) => Some(spawn_watcher(
            engine.lexicon().clone(),
            path,
            cancel.clone(),
        )?),
        _ => None,
    };

    info!("Chat session '{}' started", session);
    println!("Ask about courses, the library, campus events or your profile.");
    println!("Commands: /reset clears the conversation, /quit exits.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/reset" => {
                        engine.contexts().close(&session).await;
                        println!("Conversation cleared.\n");
                        continue;
                    }
                    _ => {}
                }
                let response = engine.process_turn(&session, line).await;
                println!("\n{}\n", response.render());
            }
        }
    }

    cancel.cancel();
    let _ = sweeper.await;
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }

    println!("Goodbye.");
    Ok(())
}
