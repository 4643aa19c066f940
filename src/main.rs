use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use parallel_flow::config::{Config, Setting};
use parallel_flow::consts::{API_KEY_ENV, MAX_POLL_ATTEMPTS, POLL_TIMEOUT_SECS, default_db_path};
use parallel_flow::error::Error;
use parallel_flow::host::{Connector, Request, SearchOperation, TaskOperation, parse_requests, run_batch};
use parallel_flow::request::{
    MetadataPair, OutputMode, Processor, SearchParams, SearchProcessor, TaskParams,
};
use parallel_flow::runner::{RunnerConfig, TaskRunner};
use parallel_flow::transport::http::HttpTransport;

#[derive(Parser)]
#[command(
    name = "parallel-flow",
    version,
    about = "Run Parallel research tasks and web searches, one item at a time."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite config database path (use :memory: for ephemeral)
    #[arg(short, long, global = true)]
    db: Option<String>,

    /// Override the API host
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Long-poll attempts before giving up on a task run
    #[arg(
        long,
        global = true,
        default_value_t = MAX_POLL_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_attempts: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a task and wait for completion
    Task {
        /// Input to the task, either text or a JSON object
        #[arg(short, long)]
        input: String,

        /// Description of the desired output
        #[arg(short, long)]
        output_description: Option<String>,

        /// Output schema mode (inferred from the other flags when omitted)
        #[arg(short, long, value_enum)]
        mode: Option<OutputMode>,

        /// JSON schema for the output, or @path to read it from a file
        #[arg(short, long)]
        schema: Option<String>,

        /// Free-text description of the input's shape
        #[arg(long)]
        input_schema: Option<String>,

        #[arg(short, long, value_enum, default_value_t = Processor::Base)]
        processor: Processor,

        /// Metadata to store with the run, as key=value (repeatable)
        #[arg(long = "metadata", value_parser = parse_metadata)]
        metadata: Vec<MetadataPair>,

        /// Comma-separated domains to include
        #[arg(long)]
        include_domains: Option<String>,

        /// Comma-separated domains to exclude
        #[arg(long)]
        exclude_domains: Option<String>,
    },
    /// Search the web
    Search {
        /// What the search is trying to find
        #[arg(short, long)]
        objective: Option<String>,

        #[arg(short, long, value_enum, default_value_t = SearchProcessor::Base)]
        processor: SearchProcessor,

        /// Comma-separated keyword queries
        #[arg(short, long)]
        queries: Option<String>,

        /// Maximum number of results
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
        max_results: Option<u32>,

        /// Maximum characters per result excerpt
        #[arg(long, value_parser = clap::value_parser!(u32).range(100..=10000))]
        max_chars_per_result: Option<u32>,

        /// Comma-separated domains to include
        #[arg(long)]
        include_domains: Option<String>,

        /// Comma-separated domains to exclude
        #[arg(long)]
        exclude_domains: Option<String>,
    },
    /// Run newline-delimited JSON requests from a file (- for stdin)
    Batch {
        file: PathBuf,

        /// Record per-item failures instead of aborting the batch
        #[arg(long, default_value_t = false)]
        continue_on_fail: bool,
    },
    /// Read or write stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Store a value
    Set {
        #[arg(value_enum)]
        key: Setting,
        value: String,
    },
    /// Print a stored value
    Get {
        #[arg(value_enum)]
        key: Setting,
    },
    /// Remove a stored value
    Unset {
        #[arg(value_enum)]
        key: Setting,
    },
    /// Print every stored value, secrets masked
    List,
}

fn parse_metadata(s: &str) -> Result<MetadataPair, String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    Ok(MetadataPair {
        key: key.trim().to_string(),
        value: value.trim().to_string(),
    })
}

fn read_schema(schema: Option<String>) -> anyhow::Result<Option<String>> {
    match schema {
        Some(s) if s.starts_with('@') => {
            let path = &s[1..];
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read schema file {path}"))?;
            Ok(Some(text))
        }
        other => Ok(other),
    }
}

fn read_input(file: &Path) -> anyhow::Result<String> {
    if file.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("failed to read stdin");
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}

fn open_config(db: Option<&str>) -> anyhow::Result<Config> {
    match db {
        Some(path) => Config::open(path),
        None => {
            let path = default_db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            Config::open(&path.to_string_lossy())
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parallel_flow=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = open_config(cli.db.as_deref())?;
    let connect = || build_connector(&config, cli.base_url.clone(), cli.max_attempts);

    match cli.command {
        Command::Config { action } => handle_config(&config, &action),
        Command::Task {
            input,
            output_description,
            mode,
            schema,
            input_schema,
            processor,
            metadata,
            include_domains,
            exclude_domains,
        } => {
            let request = Request::Task(TaskOperation::Execute(TaskParams {
                input,
                output_description,
                output_mode: mode,
                output_schema: read_schema(schema)?,
                input_schema,
                processor,
                metadata,
                include_domains,
                exclude_domains,
            }));
            let result: Value = connect()?.execute(0, &request).await?;
            print_json(&result)
        }
        Command::Search {
            objective,
            processor,
            queries,
            max_results,
            max_chars_per_result,
            include_domains,
            exclude_domains,
        } => {
            if objective.is_none() && queries.is_none() {
                bail!("search needs --objective or --queries");
            }
            let request = Request::Search(SearchOperation::Search(SearchParams {
                objective,
                processor,
                search_queries: queries,
                max_results,
                max_chars_per_result,
                include_domains,
                exclude_domains,
            }));
            let result = connect()?.execute(0, &request).await?;
            print_json(&result)
        }
        Command::Batch {
            file,
            continue_on_fail,
        } => {
            let requests = parse_requests(&read_input(&file)?)?;
            let outputs = run_batch(&connect()?, &requests, continue_on_fail).await?;
            print_json(&outputs)
        }
    }
}

fn build_connector(
    config: &Config,
    base_url: Option<String>,
    max_attempts: u32,
) -> anyhow::Result<Connector> {
    let api_key = config.api_key(API_KEY_ENV)?.ok_or(Error::MissingApiKey)?;
    let base_url = match base_url {
        Some(url) => url,
        None => config.base_url()?,
    };
    let transport = Arc::new(HttpTransport::new(api_key, Some(base_url)));
    let runner = TaskRunner::new(
        transport,
        RunnerConfig {
            max_attempts,
            poll_timeout_secs: POLL_TIMEOUT_SECS,
        },
    );
    Ok(Connector::new(runner))
}

fn handle_config(config: &Config, action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(*key, value)?;
            println!("✓ {key} saved");
        }
        ConfigAction::Get { key } => match config.get(*key)? {
            Some(value) => println!("{}", display_value(*key, &value)),
            None => bail!("{key} is not set"),
        },
        ConfigAction::Unset { key } => {
            if config.remove(*key)? {
                println!("✓ {key} removed");
            } else {
                println!("{key} was not set");
            }
        }
        ConfigAction::List => {
            for (setting, value) in config.entries()? {
                println!("{setting} = {}", display_value(setting, &value));
            }
        }
    }
    Ok(())
}

fn display_value(setting: Setting, value: &str) -> String {
    if setting.is_secret() {
        mask(value)
    } else {
        value.to_string()
    }
}

/// Show only the last four characters of a secret.
fn mask(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{visible}")
}
