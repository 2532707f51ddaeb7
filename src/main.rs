// Entrypoint for the CLI application.
// - Parses arguments, sets up logging and loads configuration, then hands
//   the chosen subcommand to `commands`.
// - Exits with status 1 when any item failed, so scripts can retry.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use syft_deploy::batch::{BatchOptions, RetryPolicy};
use syft_deploy::config::{Config, Overrides};

#[derive(Parser, Debug)]
#[command(
    name = "syft-deploy",
    version,
    about = "Deploy, publish and repair Syft Space datasets and endpoints"
)]
struct Cli {
    /// Config file (default: <config dir>/syft-deploy/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Service base URL, e.g. http://localhost:8080/api/v1
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Admin API key (prefer SYFT_ADMIN_API_KEY)
    #[arg(long, global = true, value_name = "KEY", hide = true)]
    api_key: Option<String>,

    /// Completion model for description generation
    #[arg(long, global = true)]
    model: Option<String>,

    /// -v for info, -vv for debug (RUST_LOG wins when set)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List datasets and endpoints
    List(ListArgs),
    /// Create one dataset and one endpoint per local dataset directory
    Deploy(DeployArgs),
    /// Delete endpoints and/or datasets
    Delete(DeleteArgs),
    /// Publish endpoints that are not on any marketplace
    Publish(PublishArgs),
    /// Update endpoint descriptions from a descriptions file
    Update(UpdateArgs),
    /// Generate descriptions for local dataset directories
    Generate(GenerateArgs),
    /// Recreate endpoints whose name contains spaces
    FixNames(FixNamesArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Deploy(_) => "deploy",
            Self::Delete(_) => "delete",
            Self::Publish(_) => "publish",
            Self::Update(_) => "update",
            Self::Generate(_) => "generate",
            Self::FixNames(_) => "fix-names",
        }
    }
}

/// Flags shared by every batch command.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Print what would happen without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Process at most N items (0 = all)
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub limit: usize,

    /// Skip items the ledger already records as done
    #[arg(long)]
    pub resume: bool,

    /// Seconds to wait between API calls
    #[arg(long, value_name = "SECS")]
    pub delay: Option<f64>,

    /// Progress ledger (default: .syft-deploy/<command>-progress.json)
    #[arg(long, value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    /// Attempts per item for transient failures
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub retries: u32,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl BatchArgs {
    pub fn options(&self, default_delay: f64) -> BatchOptions {
        use std::io::IsTerminal;

        BatchOptions {
            dry_run: self.dry_run,
            resume: self.resume,
            limit: (self.limit > 0).then_some(self.limit),
            delay: self.delay_or(default_delay),
            retry: RetryPolicy {
                max_attempts: self.retries.max(1),
                ..RetryPolicy::default()
            },
            progress: !self.no_progress && std::io::stdout().is_terminal(),
        }
    }

    pub fn delay_or(&self, default_delay: f64) -> Duration {
        Duration::from_secs_f64(self.delay.unwrap_or(default_delay).max(0.0))
    }

    pub fn ledger_path(&self, command: &str) -> PathBuf {
        self.ledger.clone().unwrap_or_else(|| {
            PathBuf::from(".syft-deploy").join(format!("{command}-progress.json"))
        })
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only datasets
    #[arg(long)]
    pub datasets: bool,
    /// Only endpoints
    #[arg(long)]
    pub endpoints: bool,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Directory holding one subdirectory per dataset
    #[arg(long, value_name = "DIR")]
    pub source_dir: PathBuf,

    /// The source directory as mounted inside the service container
    #[arg(long, default_value = "/root/datasets", value_name = "DIR")]
    pub container_dir: String,

    /// Dataset name template; {name} is the directory name
    #[arg(long, default_value = "{name}")]
    pub name_template: String,

    /// Endpoint slug template
    #[arg(long, default_value = "{name}-oa")]
    pub slug_template: String,

    /// Summary template; {name} is the title-cased directory name
    #[arg(long, default_value = "Open access articles: {name}")]
    pub summary_template: String,

    #[arg(long, default_value = "open-access")]
    pub tags: String,

    #[arg(long, default_value = "both")]
    pub response_type: String,

    /// Comma-separated extensions to ingest (default: detected)
    #[arg(long, value_name = "LIST")]
    pub file_types: Option<String>,

    /// Descriptions JSON used when a directory has no description file
    #[arg(long, value_name = "PATH")]
    pub descriptions: Option<PathBuf>,

    /// Generate descriptions that are missing
    #[arg(long)]
    pub generate_missing: bool,

    /// Publish each endpoint after creating it
    #[arg(long)]
    pub publish: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Only datasets
    #[arg(long)]
    pub datasets: bool,
    /// Only endpoints
    #[arg(long)]
    pub endpoints: bool,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Descriptions JSON keyed by dataset name or endpoint slug
    #[arg(long, value_name = "PATH")]
    pub descriptions: PathBuf,

    /// Also rewrite the summary; {name} is the title-cased dataset name
    #[arg(long)]
    pub summary_template: Option<String>,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory holding one subdirectory per dataset
    #[arg(long, value_name = "DIR")]
    pub source_dir: PathBuf,

    /// Descriptions JSON to merge results into
    #[arg(long, default_value = "descriptions.json", value_name = "PATH")]
    pub output: PathBuf,

    /// Regenerate descriptions that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Replacement system prompt
    #[arg(long, value_name = "TEXT", conflicts_with = "system_prompt_file")]
    pub system_prompt: Option<String>,

    /// File with a replacement system prompt
    #[arg(long, value_name = "PATH")]
    pub system_prompt_file: Option<PathBuf>,

    /// Replacement user prompt; {name} and {samples} are filled in
    #[arg(long, value_name = "TEXT")]
    pub user_prompt_template: Option<String>,

    #[arg(long, default_value = "title")]
    pub title_field: String,

    #[arg(long, default_value = "abstract")]
    pub abstract_field: String,

    /// Metadata records to include in each prompt
    #[arg(long, default_value_t = 5)]
    pub samples: usize,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug)]
pub struct FixNamesArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let overrides = Overrides {
        api_url: cli.api_url.clone(),
        api_key: cli.api_key.clone(),
        model: cli.model.clone(),
    };
    let config = Config::load(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    tracing::debug!(command = cli.command.name(), ?config, "starting");

    let clean = match &cli.command {
        Command::List(args) => commands::list(&config, args)?,
        Command::Deploy(args) => commands::deploy(&config, args)?,
        Command::Delete(args) => commands::delete(&config, args)?,
        Command::Publish(args) => commands::publish(&config, args)?,
        Command::Update(args) => commands::update(&config, args)?,
        Command::Generate(args) => commands::generate(&config, args)?,
        Command::FixNames(args) => commands::fix_names(&config, args)?,
    };
    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::from(1) })
}
