use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use clickquery::{
    ast::SelectQuery,
    clickhouse_query_generator::CompiledQuery,
    compile_funnel, compile_select, compile_stickiness,
    config::{CliOverrides, CompilerConfig},
    event_query::{funnel::FunnelRequest, stickiness::StickinessRequest},
};
use serde::de::DeserializeOwned;

/// clickquery - compile analytics queries into parameterized ClickHouse SQL
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to CLICKQUERY_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Team every query is scoped to
    #[arg(long, global = true)]
    team_id: Option<i64>,

    /// Read person fields from the flattened columns on events
    #[arg(long, global = true)]
    person_on_events: bool,

    /// Fraction of events to sample, in (0, 1]
    #[arg(long, global = true)]
    sampling_factor: Option<f64>,

    /// Timezone for date filters and interval truncation
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Largest LIMIT a select may use
    #[arg(long, global = true)]
    max_limit: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON select over logical tables
    Select { file: PathBuf },
    /// Compile a JSON funnel request into its event query
    Funnel { file: PathBuf },
    /// Compile a JSON stickiness request into its event query
    Stickiness { file: PathBuf },
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        CliOverrides {
            team_id: cli.team_id,
            person_on_events: cli.person_on_events,
            sampling_factor: cli.sampling_factor,
            timezone: cli.timezone.clone(),
            max_limit: cli.max_limit,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn load_config(cli: &Cli) -> anyhow::Result<CompilerConfig> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => CompilerConfig::from_env().context("loading configuration from environment")?,
    };
    config.merge_cli(cli.into())?;
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<CompiledQuery> {
    let config = load_config(&cli)?;
    log::info!(
        "Compiling for team {} (person on events: {}, timezone: {})",
        config.team_id,
        config.person_on_events,
        config.timezone
    );

    let compiled = match &cli.command {
        Command::Select { file } => compile_select(read_json::<SelectQuery>(file)?, &config)?,
        Command::Funnel { file } => compile_funnel(&read_json::<FunnelRequest>(file)?, &config)?,
        Command::Stickiness { file } => {
            compile_stickiness(&read_json::<StickinessRequest>(file)?, &config)?
        }
    };
    log::debug!("Compiled {} parameter(s)", compiled.params.len());
    Ok(compiled)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let compiled = run(Cli::parse())?;
    println!("{}", serde_json::to_string_pretty(&compiled)?);
    Ok(())
}
