//! corvid: drive a service through the corvid client pipeline
//!
//! Sends single requests, walks paged listings and polls long-running
//! operations using the same policies generated clients get: request ids,
//! api versions, retry, logging and per-call traces.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use corvid_runtime::{
    Context, FinalStateVia, Method, OperationId, Pager, Pipeline, PollOptions, Poller, Request, Response,
};
use corvid_trace::{SharedCollector, TraceCollector, TraceWriter, WriterConfig};
use serde_json::Value;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;

/// Client name used in the operation identity of CLI requests.
const CLI_CLIENT: &str = "CorvidCli";

/// Drive a service through the corvid client pipeline
#[derive(Parser)]
#[command(name = "corvid")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .corvid directory or config file (default: search for .corvid/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service endpoint, overriding [client] endpoint
    #[arg(long, global = true, env = "CORVID_ENDPOINT")]
    endpoint: Option<String>,

    /// api-version query parameter, overriding [client] api_version
    #[arg(long, global = true)]
    api_version: Option<String>,

    /// Maximum retries, overriding [retry] max_retries
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Record a trace of every pipeline call
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request and print the response body
    Send {
        /// Path relative to the endpoint
        path: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        /// Operation name recorded in logs and traces
        #[arg(long, default_value = "Send")]
        operation: String,
    },

    /// Walk a paged listing and print every item
    Pages {
        /// Path relative to the endpoint
        path: String,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Start or resume a long-running operation and poll it
    Poll {
        /// Path relative to the endpoint (omit with --resume-token)
        path: Option<String>,

        /// HTTP method for the initial request
        #[arg(short = 'X', long, default_value = "PUT")]
        method: String,

        /// JSON request body for the initial request
        #[arg(long)]
        body: Option<String>,

        /// Resume from a token printed by an earlier --no-wait run
        #[arg(long, conflicts_with = "path")]
        resume_token: Option<String>,

        /// Seconds between polls, overriding [poller] frequency_secs
        #[arg(long)]
        frequency: Option<u64>,

        /// Where the result is read once a status monitor reports success:
        /// azure-async-operation, location, original-uri or operation-location
        #[arg(long, value_parser = parse_final_state_via)]
        final_state_via: Option<FinalStateVia>,

        /// Print a resume token instead of waiting for completion
        #[arg(long)]
        no_wait: bool,
    },

    /// Initialize a new .corvid directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration and report every problem
    Validate,
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging to stderr for interactive use.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(verbose))
        .init();
}

/// Initialize logging to rotating files in .corvid/logs/ with daily rotation.
fn init_file_logging(corvid_dir: &Path, verbose: bool) {
    let logs_dir = corvid_dir.join("logs");

    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "corvid.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(env_filter(verbose))
        .init();
}

/// Load configuration from an explicit path or by discovery.
///
/// Returns the config and the `.corvid` directory, if one was found.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let corvid_dir = config_file.parent().unwrap_or(path).to_path_buf();
        let config = Config::from_file(&config_file)?;
        return Ok((config, Some(corvid_dir)));
    }

    match Config::find_and_load()? {
        Some((config, corvid_dir)) => Ok((config, Some(corvid_dir))),
        None => Ok((Config::default(), None)),
    }
}

/// Apply command line overrides on top of the file configuration.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(endpoint) = &cli.endpoint {
        config.client.endpoint = Some(endpoint.clone());
    }
    if let Some(version) = &cli.api_version {
        config.client.api_version = Some(version.clone());
    }
    if let Some(retries) = cli.max_retries {
        config.retry.max_retries = retries;
    }
    if cli.trace {
        config.trace.enabled = true;
    }
    if cli.verbose {
        config.client.logging = true;
    }
}

/// A context cancelled by Ctrl-C.
fn interruptible() -> Context {
    let (ctx, handle) = Context::background().with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });
    ctx
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))
}

fn parse_final_state_via(value: &str) -> std::result::Result<FinalStateVia, String> {
    value.parse().map_err(|e: corvid_runtime::RuntimeError| e.to_string())
}

fn build_request(
    config: &Config,
    method: &str,
    path: &str,
    body: Option<&str>,
    operation: &str,
) -> Result<Request> {
    let url = config
        .endpoint()?
        .join(path)
        .with_context(|| format!("Invalid path: {}", path))?;
    let mut request = Request::new(parse_method(method)?, url)
        .with_operation(OperationId::new(CLI_CLIENT, operation)?);
    if let Some(body) = body {
        let value: Value = serde_json::from_str(body).context("Request body is not valid JSON")?;
        request = request.with_json(&value)?;
    }
    Ok(request)
}

fn print_body(response: &Response) -> Result<()> {
    if response.body().is_empty() {
        return Ok(());
    }
    match response.json::<Value>() {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", String::from_utf8_lossy(response.body())),
    }
    Ok(())
}

async fn run_send(pipeline: &Pipeline, ctx: &Context, request: Request) -> Result<()> {
    let response = pipeline.send(ctx, &request).await?;
    info!(status = response.status().as_u16(), "Response received");
    if !response.status().is_success() {
        let error = response.into_service_error();
        anyhow::bail!("{}", error);
    }
    print_body(&response)
}

async fn run_pages(
    pipeline: &Pipeline,
    ctx: &Context,
    request: Request,
    max_pages: Option<usize>,
) -> Result<()> {
    let mut pager: Pager<Value> = Pager::from_pipeline(pipeline.clone(), request, &[200]);
    let mut pages = 0;
    while pager.more() && max_pages.is_none_or(|max| pages < max) {
        let page = pager.next_page(ctx).await?;
        pages += 1;
        info!(page = pages, items = page.items.len(), "Fetched page");
        for item in page.items {
            println!("{}", serde_json::to_string(&item)?);
        }
    }
    if pager.more() {
        info!(pages, "Stopped before the last page");
    }
    Ok(())
}

async fn run_poll(
    ctx: &Context,
    mut poller: Poller<Value>,
    options: PollOptions,
    no_wait: bool,
) -> Result<()> {
    if no_wait {
        if poller.done() {
            info!(state = ?poller.state(), "Operation already finished");
            println!("{}", serde_json::to_string_pretty(&poller.result()?)?);
        } else {
            println!("{}", poller.resume_token()?);
        }
        return Ok(());
    }

    let result = poller.poll_until_done(ctx, options).await?;
    info!(poll_url = %poller.poll_url(), "Operation finished");
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Write the collected trace, if tracing is enabled.
fn write_trace(collector: &SharedCollector, dir: PathBuf) -> Result<()> {
    let trace = collector.finalize();
    let writer = TraceWriter::new(WriterConfig::daily(dir.clone()))
        .with_context(|| format!("Failed to open trace directory: {}", dir.display()))?;
    writer.write(&trace)?;
    info!(spans = trace.spans.len(), dir = %dir.display(), "Wrote trace");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, corvid_dir) = load_config(cli.config.as_ref())?;

    match &corvid_dir {
        Some(dir) => init_file_logging(dir, cli.verbose),
        None => init_logging(cli.verbose),
    }
    if let Some(dir) = &corvid_dir {
        info!("Found config at {}", dir.display());
    }

    apply_overrides(&mut config, &cli);

    match &cli.command {
        Commands::Init { force } => {
            let corvid_dir = PathBuf::from(config::CORVID_DIR);
            let config_path = corvid_dir.join(config::CONFIG_FILE);

            if config_path.exists() && !*force {
                anyhow::bail!(".corvid/config.toml already exists. Use --force to overwrite.");
            }
            std::fs::create_dir_all(&corvid_dir)?;
            std::fs::write(&config_path, config::DEFAULT_CONFIG)?;
            info!("Created {}", config_path.display());
            println!("Created {}", config_path.display());
            return Ok(());
        }
        Commands::Validate => {
            let errors = config.validate();
            if errors.is_empty() {
                println!("Configuration is valid");
                return Ok(());
            }
            for error in &errors {
                println!("{}", error);
            }
            anyhow::bail!("{} configuration error(s)", errors.len());
        }
        _ => {}
    }

    let mut options = config.client_options()?;
    let collector = config.trace.enabled.then(TraceCollector::shared);
    if let Some(collector) = &collector {
        collector.add_metadata("command", std::env::args().collect::<Vec<_>>());
        options = options.with_trace(collector.clone());
    }
    let pipeline = options.build_pipeline(None)?;
    let ctx = interruptible();

    let outcome = match cli.command {
        Commands::Send {
            path,
            method,
            body,
            operation,
        } => {
            let request = build_request(&config, &method, &path, body.as_deref(), &operation)?;
            run_send(&pipeline, &ctx, request).await
        }
        Commands::Pages { path, max_pages } => {
            let request = build_request(&config, "GET", &path, None, "Pages")?;
            run_pages(&pipeline, &ctx, request, max_pages).await
        }
        Commands::Poll {
            path,
            method,
            body,
            resume_token,
            frequency,
            final_state_via,
            no_wait,
        } => {
            let mut poll_options = config.poll_options();
            if let Some(secs) = frequency {
                poll_options.frequency = std::time::Duration::from_secs(secs);
            }
            let poller = match (resume_token, path) {
                (Some(token), _) => Poller::resume(pipeline.clone(), &token)?,
                (None, Some(path)) => {
                    let request = build_request(&config, &method, &path, body.as_deref(), "Poll")?;
                    let response = pipeline.send(&ctx, &request).await?;
                    let poller = Poller::from_response(pipeline.clone(), &request, response)?;
                    match final_state_via {
                        Some(via) => poller.with_final_state_via(via),
                        None => poller,
                    }
                }
                (None, None) => anyhow::bail!("Either a path or --resume-token is required"),
            };
            run_poll(&ctx, poller, poll_options, no_wait).await
        }
        Commands::Init { .. } | Commands::Validate => Ok(()),
    };

    if let Some(collector) = &collector {
        if let Err(e) = write_trace(collector, config.resolve_trace_dir(corvid_dir.as_deref())) {
            tracing::warn!("Failed to write trace: {}", e);
        }
    }

    outcome
}
