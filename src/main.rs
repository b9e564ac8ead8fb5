//! SiteScout - dependency-driven SEO and local-search analysis
//!
//! A CLI tool that fetches one page, runs a graph of analysis units over
//! it and writes a ranked action plan as a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success (no actions above threshold, or no --fail-on set)
//!   1 - Runtime error (invalid config, failed run, unwritable report, etc.)
//!   2 - Actions found at or above --fail-on priority

mod analysis;
mod cli;
mod config;
mod error;
mod graph;
mod models;
mod pipeline;
mod report;
mod services;
mod state;
mod store;
mod units;

use analysis::aggregator::{generate_summary_text, summarize_outcomes, PlanSummary};
use anyhow::{bail, Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::{Priority, RunId, RunInput, RunResults, RunStatus};
use pipeline::{default_graph, Orchestrator, RunController};
use services::{
    GooglePlacesClient, HttpFetcher, OllamaClient, SerpApiClient, SnapshotCache,
};
use std::sync::Arc;
use std::time::Duration;
use store::{CheckpointStore, MemoryStore, SqliteStore};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use units::Collaborators;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("SiteScout v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_audit(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Audit failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .sitescout.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set API keys, unit weights, timeouts and more.");
    Ok(())
}

/// Initialize logging; `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Run the complete audit workflow. Returns exit code (0 or 2).
async fn run_audit(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.apply_env();
    config.merge_with_args(&args);

    let collaborators = build_collaborators(&config)?;
    let graph = default_graph(&collaborators, &config.pipeline)
        .context("Invalid pipeline configuration")?;

    if args.dry_run {
        return handle_dry_run(&graph);
    }

    let store = open_store(&config).await?;
    let orchestrator = Orchestrator::new(
        Arc::new(graph),
        Arc::clone(&store),
        config.orchestrator_options(),
    );
    let controller = RunController::new(Arc::new(orchestrator), store);

    println!("🔎 Analyzing {} ({})", args.target_url(), args.locale);
    let run_id = controller
        .start(RunInput::new(args.target_url(), args.locale.clone()))
        .await?;
    info!(run_id = %run_id, "Run started");

    let status = follow_run(&controller, &run_id, !args.quiet).await?;
    let results = controller.results(&run_id).await?;

    let output_path = std::path::PathBuf::from(&config.general.output);
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&results)?,
        OutputFormat::Markdown => report::generate_markdown_report(&results),
    };
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&results);

    if status.status != RunStatus::Completed {
        bail!(
            "run {} ended {}: {}",
            run_id,
            status.status.as_str(),
            status.error.as_deref().unwrap_or("unknown error")
        );
    }

    println!(
        "\n✅ Audit complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let threshold: Priority = fail_level.into();
        let plan = results.action_plan.as_deref().unwrap_or_default();
        if PlanSummary::from_items(plan).at_or_above(threshold) > 0 {
            eprintln!(
                "\n⛔ Actions found at or above {} priority. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Poll the run until it settles, driving a progress bar. Ctrl-C cancels.
async fn follow_run(
    controller: &RunController,
    run_id: &RunId,
    show_progress: bool,
) -> Result<models::RunStatusView> {
    let progress_bar = if show_progress {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let wait = controller.wait(run_id);
    tokio::pin!(wait);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    let status = loop {
        tokio::select! {
            status = &mut wait => break status?,
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!(run_id = %run_id, "Interrupted, cancelling run");
                controller.cancel(run_id).await?;
            }
            _ = ticker.tick() => {
                if let (Some(pb), Ok(status)) = (&progress_bar, controller.status(run_id).await) {
                    pb.set_position(status.progress.round() as u64);
                    if let Some(last) = status.settled_units.last() {
                        pb.set_message(format!("{} settled", last));
                    }
                }
            }
        }
    };

    if let Some(pb) = progress_bar {
        pb.set_position(status.progress.round() as u64);
        pb.finish_with_message(status.status.as_str());
    }
    Ok(status)
}

/// Print the run summary to stdout.
fn print_summary(results: &RunResults) {
    let outcomes = summarize_outcomes(results);
    println!("\n📊 Analysis Summary:");
    println!(
        "   Units: {} ok | {} failed | {} skipped",
        outcomes.ok, outcomes.failed, outcomes.skipped
    );
    if outcomes.tokens_used > 0 {
        println!(
            "   Model tokens: {} (~${:.4})",
            outcomes.tokens_used, outcomes.cost_usd
        );
    }
    if let Some(ref plan) = results.action_plan {
        let summary = generate_summary_text(&PlanSummary::from_items(plan));
        for line in summary.lines() {
            println!("   {}", line);
        }
    }
}

/// Handle --dry-run: print the execution layers of the graph and exit.
fn handle_dry_run(graph: &graph::TaskGraph) -> Result<i32> {
    println!("\n🔍 Dry run: analysis graph (nothing is fetched)...\n");

    for (depth, layer) in graph.execution_layers().iter().enumerate() {
        println!("   Layer {}: {}", depth, layer.join(", "));
    }
    println!("\n   Total: {} units", graph.len());

    println!("\n✅ Dry run complete. No requests were made.");
    Ok(0)
}

/// Wire up the external services the configuration enables.
fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let fetcher = HttpFetcher::new(config.fetcher_config())?;
    let mut collaborators = Collaborators::with_fetcher(Arc::new(fetcher));

    if config.fetch.cache_ttl_seconds > 0 {
        collaborators.cache = Some(Arc::new(SnapshotCache::new(Duration::from_secs(
            config.fetch.cache_ttl_seconds,
        ))));
    }

    if config.model.enabled {
        info!("Using model {} at {}", config.model.name, config.model.ollama_url);
        collaborators.inference = Some(Arc::new(OllamaClient::new(config.ollama_config())?));
        collaborators.completion = config.completion_options();
        collaborators.cost_per_1k_tokens = config.model.cost_per_1k_tokens;
    } else {
        info!("Language model disabled, content analysis uses heuristics only");
    }

    let services = &config.services;
    let timeout = Duration::from_secs(services.timeout_seconds);
    if let Some(ref key) = services.places_api_key {
        collaborators.places = Some(Arc::new(GooglePlacesClient::new(
            services.places_url.as_str(),
            key.as_str(),
            timeout,
        )?));
    } else {
        debug!("No places API key, listing lookups disabled");
    }
    if let Some(ref key) = services.search_api_key {
        collaborators.search = Some(Arc::new(SerpApiClient::new(
            services.search_url.as_str(),
            key.as_str(),
            timeout,
        )?));
    } else {
        debug!("No search API key, SERP lookups disabled");
    }

    Ok(collaborators)
}

/// Open the configured checkpoint store, in memory by default.
async fn open_store(config: &Config) -> Result<Arc<dyn CheckpointStore>> {
    match config.storage.database_url {
        Some(ref url) => {
            info!("Checkpointing runs to {}", url);
            let store = SqliteStore::connect(url)
                .await
                .with_context(|| format!("Failed to open checkpoint database {}", url))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
