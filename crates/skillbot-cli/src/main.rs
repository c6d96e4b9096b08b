mod chat;
mod skills;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use skillbot_config::SkillBotConfig;

#[derive(Parser)]
#[command(name = "skillbot", about = "Skill-augmented tool-using agent")]
struct Cli {
    /// Config file (default: ~/.skillbot/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory skills and tool roots are resolved against
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },
    /// Start an interactive chat session with the agent
    Chat {
        /// Directory skills and tool roots are resolved against
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },
    /// List the skills that would be loaded
    Skills {
        #[arg(short, long)]
        working_dir: Option<PathBuf>,
    },
    /// Check configuration health
    Health,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SkillBotConfig> {
    match path {
        Some(p) => skillbot_config::load_config_from(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => skillbot_config::load_config().context("loading config"),
    }
}

fn working_dir(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, working_dir: wd } => {
            let wd = working_dir(wd)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(skillbot_gateway::start_gateway(config, &wd, port))?;
        }
        Commands::Chat { working_dir: wd } => {
            let wd = working_dir(wd)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(chat::run_chat(config, &wd))?;
        }
        Commands::Skills { working_dir: wd } => {
            let wd = working_dir(wd)?;
            skills::list_skills(&config, &wd)?;
        }
        Commands::Health => {
            let wd = working_dir(None)?;
            println!("skillbot is healthy");
            println!("  agent: {}", config.agent.name);
            println!("  max steps: {}", config.agent.max_steps);
            println!("  model: {} ({})", config.model.model, config.model.base_url);
            println!(
                "  api key (${}): {}",
                config.model.api_key_env,
                if config.model.api_key().is_some() { "set" } else { "missing" }
            );
            println!("  gateway: {}:{}", config.gateway.host, config.gateway.port);
            println!("  auth header: {}", config.auth.header);
            println!("  auth tokens configured: {}", config.auth.tokens.len());
            let skills_dir = config.skills_dir(&wd);
            match skillbot_skills::load(&skills_dir) {
                Ok(snapshot) => println!(
                    "  skills: {} loaded, {} skipped ({})",
                    snapshot.count(),
                    snapshot.warnings().len(),
                    skills_dir.display()
                ),
                Err(e) => println!("  skills: {e}"),
            }
        }
    }

    Ok(())
}
