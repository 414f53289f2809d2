use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use git2::ConfigLevel;
use git_automation::App;
use git_automation::Config;
use git_automation::transport;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "git-automation")]
#[command(about = "Fetch, merge and push git branches over an external ssh executable", long_about = None)]
pub struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', long, default_value = ".")]
    pub path: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a remote
    Fetch {
        #[arg(default_value = "origin")]
        remote: String,
    },
    /// Push a branch to the branch of the same name on a remote
    Push {
        branch: String,
        #[arg(short, long, default_value = "origin")]
        remote: String,
    },
    /// Merge each branch's upstream into it and push it back
    Send {
        #[arg(required = true)]
        branches: Vec<String>,
        #[arg(short, long, default_value = "origin")]
        remote: String,
    },
    /// Show a commit
    Show {
        #[arg(default_value = "HEAD")]
        revision: String,
        /// Print the commit as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a git configuration value
    Config {
        key: String,
        /// Only consult this configuration level
        #[arg(short, long)]
        level: Option<Level>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Level {
    System,
    Xdg,
    Global,
    Local,
}

impl From<Level> for ConfigLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::System => ConfigLevel::System,
            Level::Xdg => ConfigLevel::XDG,
            Level::Global => ConfigLevel::Global,
            Level::Local => ConfigLevel::Local,
        }
    }
}

fn setup_logging() -> Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    tracing_subscriber::fmt()
        .with_timer(timer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging()?;

    let config = Config::load(&cli.path)?;
    transport::register(&config.scheme, config.ssh_options())
        .with_context(|| format!("Failed to register transport for {}://", config.scheme))?;

    let app = App::new(config, cli.path);
    let stdout = &mut std::io::stdout();

    match cli.command {
        Commands::Fetch { remote } => {
            app.cmd_fetch(&remote, stdout).await?;
        }
        Commands::Push { branch, remote } => {
            app.cmd_push(&remote, &branch, stdout).await?;
        }
        Commands::Send { branches, remote } => {
            app.cmd_send(&remote, &branches, stdout).await?;
        }
        Commands::Show { revision, json } => {
            app.cmd_show(&revision, json, stdout).await?;
        }
        Commands::Config { key, level } => {
            app.cmd_config(&key, level.map(Into::into), stdout).await?;
        }
    }

    Ok(())
}
