//! CLI definition and command dispatch for incidex.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--config`, `--device`)
//! 2. Environment variables (`INCIDEX_CONFIG`, `INCIDEX_DATASET`,
//!    `INCIDEX_INDEX_PATH`, `INCIDEX_DEVICE`)
//! 3. Config file (`~/.incidex/config.yaml` or the `--config` path)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use incidex_core::{
    build_user_prompt, format_context, summarize_sources, EngineConfig, EngineContext,
    IncidexError, IncidexResult, IndexStatus, RetrievalResult, RetrieveOptions, REQUIRED_COLUMNS,
};
use incidex_db::vector::MetadataFilter;
use incidex_db::DbError;
use incidex_model::DevicePreference;

use crate::ui::color::terminal_width;
use crate::ui::format::{format_relative_time, format_thousands, one_line, truncate_str};
use crate::ui::{table, ColorMode, MessageType, Progress, ProgressMode, Style};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// incidex - retrieval engine for safety incident reports
#[derive(Parser, Debug)]
#[command(name = "incidex")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "INCIDEX_VERBOSE")]
    pub verbose: bool,

    /// Path to configuration file (default: ~/.incidex/config.yaml)
    #[arg(long, global = true, env = "INCIDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device preference for embedding inference (auto/gpu/cpu)
    #[arg(long, global = true, env = "INCIDEX_DEVICE")]
    pub device: Option<String>,

    /// Color output mode
    #[arg(long, global = true, env = "INCIDEX_COLOR", value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the retrieval index, or reuse the current one if it is up to date
    #[command(after_help = r#"EXAMPLES:
    # Build or reuse the index for the configured dataset
    incidex index

    # Rebuild even if the current index is compatible
    incidex index --force

    # Replace the dataset and rebuild
    incidex index --dataset exports/incidents-2024.csv
"#)]
    Index {
        /// Rebuild even when the existing index could be reused
        #[arg(long)]
        force: bool,

        /// Validate this CSV, install it as the dataset and rebuild (implies --force)
        #[arg(long, value_name = "PATH")]
        dataset: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Retrieve the incident excerpts most relevant to a question
    #[command(after_help = r#"EXAMPLES:
    # Location and year are detected from the question
    incidex ask "What happened in Vancouver in 2023?"

    # Explicit filter (replaces the detected one)
    incidex ask "valve failures" --filter '{"country": "Canada"}'

    # Conjunction filter, top 3 records
    incidex ask "lessons learned" -n 3 --filter '{"$and": [{"severity": "Major"}, {"year": "2023"}]}'

    # Print the prompt handed to the language model
    incidex ask "forklift near misses" --context

    # Raw question, no filter extraction or query expansion
    incidex ask "arc flash" --no-parse --json
"#)]
    Ask {
        /// The question to answer
        question: String,

        /// Number of records to return (default: retrieval.defaultResults)
        #[arg(short = 'n', long = "results", value_parser = clap::value_parser!(u32).range(1..))]
        results: Option<u32>,

        /// Metadata filter as JSON, e.g. {"city": "Vancouver"}
        #[arg(long, value_name = "JSON")]
        filter: Option<String>,

        /// Skip filter extraction and query expansion
        #[arg(long)]
        no_parse: bool,

        /// Also print the formatted source context and prompt
        #[arg(long)]
        context: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show index readiness, counts, years and severity distribution
    #[command(after_help = r#"EXAMPLES:
    # Show current status
    incidex status

    # Get status as JSON for scripting
    incidex status --json | jq '.status'
"#)]
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Inspect and validate configuration
    #[command(after_help = r#"EXAMPLES:
    # Validate the config file
    incidex config check

    # Show resolved config (file + environment + flags)
    incidex config show --json
"#)]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration and report warnings
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn wants_json(&self) -> bool {
        match self {
            Command::Index { json, .. }
            | Command::Ask { json, .. }
            | Command::Status { json } => *json,
            Command::Config { action } => match action {
                ConfigAction::Check { json } | ConfigAction::Show { json } => *json,
            },
        }
    }
}

// ============================================================================
// Run function
// ============================================================================

/// Run the CLI application.
///
/// Parses arguments, resolves configuration and dispatches to a command
/// handler. Returns `ExitCode::FAILURE` on any error.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays parseable.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!(
        "incidex_core={lvl},incidex_db={lvl},incidex_model={lvl},incidex_cli={lvl}",
        lvl = log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter.as_str())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = Style::new(cli.color);
    let json = cli.command.wants_json();
    let config_path = cli.config.clone().or_else(EngineConfig::default_path);

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let hint = match &config_path {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Pass a config file with --config".to_string(),
            };
            report_error(&style, &e, Some(&hint), json);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Index {
            force,
            dataset,
            json,
        } => handle_index(&style, config, force, dataset.as_deref(), json),
        Command::Ask {
            question,
            results,
            filter,
            no_parse,
            context,
            json,
        } => handle_ask(
            &style,
            config,
            &question,
            results,
            filter.as_deref(),
            no_parse,
            context,
            json,
        ),
        Command::Status { json } => handle_status(&style, config, json),
        Command::Config { action } => match action {
            ConfigAction::Check { json } => {
                handle_config_check(&style, &config, config_path.as_deref(), json)
            }
            ConfigAction::Show { json } => {
                handle_config_show(&style, &config, config_path.as_deref(), json)
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&style, &e, hint_for(&e).as_deref(), json);
            ExitCode::FAILURE
        }
    }
}

/// Config file (or defaults) plus environment overrides plus `--device`.
fn resolve_config(cli: &Cli) -> IncidexResult<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?.with_env_overrides(),
        None => EngineConfig::load_default()?,
    };

    if let Some(device) = &cli.device {
        config.embedding.device = device.parse::<DevicePreference>().map_err(|_| {
            IncidexError::invalid_config(
                format!("invalid device preference '{}'", device),
                "Valid options: auto, gpu, cpu",
            )
        })?;
    }

    Ok(config)
}

fn report_error(style: &Style, err: &IncidexError, hint: Option<&str>, json: bool) {
    if json {
        println!(
            "{}",
            json!({ "error": { "code": err.code(), "message": err.to_string() } })
        );
    } else {
        eprintln!("{}", style.error_with_context(&err.to_string(), None, hint));
    }
}

fn hint_for(err: &IncidexError) -> Option<String> {
    match err {
        IncidexError::RebuildInProgress => Some("Retry once the running rebuild finishes".to_string()),
        IncidexError::DatasetNotFound { .. } => {
            Some("Set datasetPath in the config, INCIDEX_DATASET, or pass --dataset".to_string())
        }
        IncidexError::DatasetMissingColumns { .. } => {
            Some(format!("Required columns: {}", REQUIRED_COLUMNS.join(", ")))
        }
        IncidexError::IndexIncompatible { .. } => {
            Some("Run `incidex index` to rebuild the index for the configured model".to_string())
        }
        IncidexError::EmbeddingUnavailable { .. } => {
            Some("Download the model or set embedding.modelPath in the config".to_string())
        }
        IncidexError::InvalidFilter { .. } => Some(
            r#"Filters look like {"city": "Vancouver"} or {"$and": [{"year": "2023"}, {"severity": "Major"}]}"#
                .to_string(),
        ),
        _ => None,
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_index(
    style: &Style,
    config: EngineConfig,
    force: bool,
    dataset: Option<&Path>,
    json: bool,
) -> IncidexResult<()> {
    let engine = EngineContext::new(config);
    let progress = Progress::spinner("Indexing incident reports...", ProgressMode::detect(json));

    let outcome = match dataset {
        Some(path) => engine.replace_dataset(path),
        None => engine.initialize(force),
    };
    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            progress.finish_clear();
            return Err(e);
        }
    };
    let stats = engine.stats()?;

    if json {
        progress.finish_clear();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "report": report, "stats": stats }))?
        );
        return Ok(());
    }

    let headline = if report.reused {
        format!(
            "Index up to date: {} chunks from {} records",
            format_thousands(report.chunks),
            format_thousands(report.records)
        )
    } else {
        format!(
            "Indexed {} chunks from {} records in {:.1}s",
            format_thousands(report.chunks),
            format_thousands(report.records),
            progress.elapsed().as_secs_f64()
        )
    };
    progress.finish_with_message(&style.message(MessageType::Ok, &headline));
    println!("  {}", style.key_value("Collection", &report.collection));
    println!("  {}", style.key_value("Generation", &report.generation.to_string()));

    if stats.status == IndexStatus::NotReady {
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                "No section met the minimum length; the index is empty"
            )
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_ask(
    style: &Style,
    config: EngineConfig,
    question: &str,
    results: Option<u32>,
    filter: Option<&str>,
    no_parse: bool,
    context: bool,
    json: bool,
) -> IncidexResult<()> {
    let mut opts = RetrieveOptions::default();
    if let Some(n) = results {
        opts = opts.with_results(n as usize);
    }
    if let Some(raw) = filter {
        opts = opts.with_filter(parse_filter(raw)?);
    }
    if no_parse {
        opts = opts.without_parse();
    }

    let engine = EngineContext::new(config);
    if !engine.attach()? {
        return Err(IncidexError::NotInitialized);
    }
    let result = engine.retrieve(question, opts)?;
    let max_body_chars = engine.config().context.max_body_chars;

    if json {
        let mut output = json!({
            "question": question,
            "result": result,
            "sources": summarize_sources(&result.hits),
        });
        if context {
            output["prompt"] = json!(build_user_prompt(
                question,
                &result.hits,
                &result.facts,
                max_body_chars
            ));
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_query_summary(style, question, &result);

    if result.hits.is_empty() {
        println!();
        println!("{}", style.message(MessageType::Info, "No matching incident excerpts."));
        return Ok(());
    }

    println!();
    println!("{}", style.section("RESULTS"));
    println!();
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!(
                "{} records from {} candidates",
                result.hits.len(),
                result.candidate_count
            )
        )
    );
    println!();
    println!(
        "{}",
        table::render_sources_table(&summarize_sources(&result.hits), terminal_width())
    );

    if context {
        println!();
        println!("{}", style.section("CONTEXT"));
        println!();
        println!("{}", format_context(&result.hits, max_body_chars));
    } else {
        println!();
        for (i, hit) in result.hits.iter().take(3).enumerate() {
            let body = hit.text.split("\n\n").nth(1).unwrap_or(hit.text.as_str());
            println!(
                "  {}. {} {}",
                i + 1,
                style.record_id(hit.report_id()),
                truncate_str(&one_line(body), 100)
            );
        }
    }
    Ok(())
}

fn print_query_summary(style: &Style, question: &str, result: &RetrievalResult) {
    println!("{}", style.section("QUERY"));
    println!();
    println!("  {}", style.key_value("Question", question));
    if result.expanded_query != question {
        println!("  {}", style.key_value("Expanded", &result.expanded_query));
    }
    let filter = result
        .filter
        .as_ref()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("  {}", style.key_value("Filter", &filter));

    let facts = &result.facts;
    if !facts.is_empty() {
        let mut detected = Vec::new();
        if let Some(location) = &facts.location {
            detected.push(format!("location={}", location));
        }
        if let Some(severity) = &facts.severity {
            detected.push(format!("severity={}", severity));
        }
        if !facts.years_mentioned.is_empty() {
            let years: Vec<String> = facts.years_mentioned.iter().map(|y| y.to_string()).collect();
            detected.push(format!("years={}", years.join(",")));
        }
        println!("  {}", style.key_value("Detected", &detected.join(" ")));
    }
    if result.blended {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                "Few records matched the filter; closest unfiltered records were blended in"
            )
        );
    }
}

/// Parse a `--filter` argument into a metadata filter.
fn parse_filter(raw: &str) -> IncidexResult<MetadataFilter> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| IncidexError::invalid_filter(format!("not valid JSON: {}", e)))?;
    MetadataFilter::from_json(&value).map_err(|e| match e {
        DbError::InvalidFilter { reason } => IncidexError::invalid_filter(reason),
        other => IncidexError::Store(other),
    })
}

fn handle_status(style: &Style, config: EngineConfig, json: bool) -> IncidexResult<()> {
    let engine = EngineContext::new(config);
    engine.attach()?;
    let stats = engine.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", style.section("STATUS"));
    println!();
    println!("  {}", style.key_value("Status", &style.status(stats.status.as_str())));
    println!(
        "  {}",
        style.key_value("Dataset", &engine.config().dataset_path.display().to_string())
    );

    if stats.status == IndexStatus::NotInitialized {
        println!();
        println!(
            "{}",
            style.message(MessageType::Hint, "Run `incidex index` to build the index")
        );
        return Ok(());
    }

    if let Some(collection) = &stats.collection {
        println!("  {}", style.key_value("Collection", collection));
    }
    if let Some(model) = &stats.embedding_model {
        println!("  {}", style.key_value("Model", model));
    }
    if let Some(built_at) = &stats.built_at {
        println!("  {}", style.key_value("Built", &format_relative_time(built_at)));
    }
    println!(
        "  {}",
        style.key_value(
            "Indexed",
            &format!(
                "{} chunks, {} records",
                format_thousands(stats.chunks),
                format_thousands(stats.records)
            )
        )
    );
    let years: Vec<String> = stats.years.iter().map(|y| y.to_string()).collect();
    println!("  {}", style.key_value("Years", &years.join(", ")));
    if stats.rebuilding {
        println!("  {}", style.key_value("Rebuilding", "yes"));
    }

    if !stats.severity_dist.is_empty() {
        println!();
        println!("{}", style.section("SEVERITY"));
        println!();
        println!("{}", table::render_severity_table(&stats.severity_dist));
    }
    Ok(())
}

/// Validate the resolved configuration and report warnings.
///
/// Parse and validation errors surface while the config is resolved, so
/// reaching this handler means the config loaded.
fn handle_config_check(
    style: &Style,
    config: &EngineConfig,
    path: Option<&Path>,
    json: bool,
) -> IncidexResult<()> {
    let mut warnings = config.validate()?;
    if !config.dataset_path.exists() {
        warnings.push(format!(
            "dataset not found at {}",
            config.dataset_path.display()
        ));
    }
    let exists = path.is_some_and(Path::exists);

    if json {
        let output = json!({
            "path": path.map(|p| p.display().to_string()),
            "exists": exists,
            "valid": true,
            "warnings": warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match path {
        Some(p) if exists => println!(
            "{}",
            style.message(MessageType::Info, &format!("Checked {}", p.display()))
        ),
        Some(p) => println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!("No config at {}, using defaults", p.display())
            )
        ),
        None => println!("{}", style.message(MessageType::Info, "Using built-in defaults")),
    }

    if warnings.is_empty() {
        println!("{}", style.message(MessageType::Ok, "Configuration is valid"));
    } else {
        println!(
            "{}",
            style.message(MessageType::Warn, &format!("{} warning(s):", warnings.len()))
        );
        for warning in &warnings {
            println!("  • {}", warning);
        }
        println!();
        println!(
            "{}",
            style.message(MessageType::Ok, "Configuration is valid with warnings")
        );
    }
    Ok(())
}

/// Show the resolved configuration.
fn handle_config_show(
    style: &Style,
    config: &EngineConfig,
    path: Option<&Path>,
    json: bool,
) -> IncidexResult<()> {
    let pretty = serde_json::to_string_pretty(config)?;
    if json {
        println!("{}", pretty);
        return Ok(());
    }

    let source = match path {
        Some(p) if p.exists() => p.display().to_string(),
        _ => "built-in defaults".to_string(),
    };
    println!(
        "{}",
        style.message(
            MessageType::Info,
            &format!("Resolved configuration ({}):", source)
        )
    );
    println!();
    println!("{}", pretty);
    Ok(())
}
