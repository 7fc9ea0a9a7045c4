//! qjoin CLI: optimize, explain and run equi-join requests written in YAML.

use clap::{Args, Parser, Subcommand, ValueEnum};
use qjoin_core::cancel::CancelToken;
use qjoin_core::catalog::InMemoryCatalog;
use qjoin_core::config::{EnumerationConfig, TreeShape};
use qjoin_exec::Executor;
use qjoin_io::{read_csv_path, MemoryStore};
use qjoin_planner::{optimize, parse_yaml_request, ConfigOverrides, JoinGraph, ParsedRequest};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qjoin", version = qjoin_core::VERSION)]
#[command(about = "qjoin: cost-based join-order optimizer for equi-join pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a request and print the explain report
    Explain {
        /// Path to the request YAML file
        #[arg(short, long)]
        request: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: Format,

        /// Maximum rejected plans to report
        #[arg(long, default_value_t = 3)]
        max_rejected: usize,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Validate a request YAML file (syntax and join graph)
    Validate {
        /// Path to the request YAML file
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Optimize a request, execute the chosen plan and print a summary
    Run {
        /// Path to the request YAML file
        #[arg(short, long)]
        request: PathBuf,

        /// Print up to this many result rows
        #[arg(long, default_value_t = 0)]
        show_rows: usize,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

/// Optimizer settings that take precedence over the environment and the
/// request's `config:` block.
#[derive(Args, Default)]
struct OverrideArgs {
    /// Disable join reordering (use the pipeline-order plan)
    #[arg(long)]
    disable: bool,

    /// Ignore unique indexes when estimating join cardinality
    #[arg(long)]
    no_index_uniqueness: bool,

    /// Rows sampled per relation
    #[arg(long)]
    sampling_size: Option<usize>,

    /// Lowest subset level enumerated in ALL-plans mode
    #[arg(long)]
    min_level: Option<usize>,

    /// Highest subset level enumerated in ALL-plans mode
    #[arg(long)]
    max_level: Option<usize>,

    /// Join tree shape: zigZag, leftDeep or bushy
    #[arg(long)]
    tree_shape: Option<TreeShape>,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Optimization deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl OverrideArgs {
    fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            enabled: self.disable.then_some(false),
            use_index_uniqueness: self.no_index_uniqueness.then_some(false),
            sampling_size: self.sampling_size,
            min_subset_level: self.min_level,
            max_subset_level: self.max_level,
            tree_shape: self.tree_shape,
            sampling_seed: self.seed,
            timeout_ms: self.timeout_ms,
            ..Default::default()
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explain {
            request,
            format,
            max_rejected,
            overrides,
        } => {
            if let Err(e) = explain_request(&request, format, max_rejected, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { request } => {
            if let Err(e) = validate_request(&request) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Request is valid");
        }
        Commands::Run {
            request,
            show_rows,
            json,
            overrides,
        } => {
            if let Err(e) = run_request(&request, show_rows, json, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// A request with its relations loaded and its configuration resolved.
struct Loaded {
    parsed: ParsedRequest,
    store: MemoryStore,
    catalog: InMemoryCatalog,
    config: EnumerationConfig,
}

fn load_request(path: &Path, cli: &OverrideArgs) -> Result<Loaded, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    let mut parsed = parse_yaml_request(&yaml_content)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let store = MemoryStore::new();
    for decl in parsed.request.relations.iter_mut() {
        let Some(source) = parsed.sources.get(&decl.name) else {
            continue;
        };
        let table = read_csv_path(base_dir.join(source))?;
        if decl.fields.is_empty() {
            decl.fields = table.schema.names().map(str::to_string).collect();
        }
        store.insert_table(decl.name.clone(), table)?;
        for index in parsed.indexes.get(&decl.name).into_iter().flatten() {
            store.create_index(&decl.name, index.clone())?;
        }
    }

    let mut catalog = store.snapshot()?;
    for decl in &parsed.request.relations {
        if parsed.sources.contains_key(&decl.name) {
            continue;
        }
        // Without data, only a hinted relation can carry catalog statistics.
        match (decl.cardinality_hint, parsed.indexes.get(&decl.name)) {
            (Some(rows), indexes) => {
                catalog.add_relation(decl.name.clone(), rows);
                for index in indexes.into_iter().flatten() {
                    catalog.add_index(&decl.name, index.clone());
                }
            }
            (None, Some(_)) => {
                tracing::warn!(relation = %decl.name, "indexes ignored: relation has no source and no cardinality hint");
            }
            (None, None) => {}
        }
    }

    let config = resolve_config(EnumerationConfig::from_env(), &parsed.config, &cli.to_overrides());
    config.validate()?;
    Ok(Loaded {
        parsed,
        store,
        catalog,
        config,
    })
}

/// Environment < request `config:` block < command-line flags.
fn resolve_config(
    base: EnumerationConfig,
    request: &ConfigOverrides,
    cli: &ConfigOverrides,
) -> EnumerationConfig {
    cli.applied_to(request.applied_to(base))
}

fn validate_request(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    let parsed = parse_yaml_request(&yaml_content)?;
    if parsed.request.relations.iter().any(|r| r.fields.is_empty()) {
        // Fields may come from the CSV header; load to check the graph.
        let loaded = load_request(path, &OverrideArgs::default())?;
        JoinGraph::build(&loaded.parsed.request)?;
    } else {
        JoinGraph::build(&parsed.request)?;
    }
    Ok(())
}

fn explain_request(
    path: &Path,
    format: Format,
    max_rejected: usize,
    overrides: &OverrideArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_request(path, overrides)?;
    let optimized = optimize(
        &loaded.parsed.request,
        &loaded.catalog,
        &loaded.store,
        &loaded.config,
        &CancelToken::new(),
    )?;
    match format {
        Format::Json => println!("{}", optimized.report.to_json(max_rejected)?),
        Format::Markdown => print!("{}", optimized.report.to_markdown(max_rejected)),
    }
    Ok(())
}

fn run_request(
    path: &Path,
    show_rows: usize,
    json: bool,
    overrides: &OverrideArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_request(path, overrides)?;
    let optimized = optimize(
        &loaded.parsed.request,
        &loaded.catalog,
        &loaded.store,
        &loaded.config,
        &CancelToken::new(),
    )?;
    let summary = Executor::new(&loaded.store).run(&optimized.graph, &optimized.plan)?;
    let winning = &optimized.report.winning_plan;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("✓ Plan executed successfully");
    println!("  Plan: {}", summary.plan);
    println!("  Join optimization used: {}", winning.join_optimization_used);
    match winning.cardinality_estimate {
        Some(estimate) => println!("  Estimated rows: {}", estimate),
        None => println!("  Estimated rows: n/a"),
    }
    println!("  Actual rows: {}", summary.rows);
    println!("  Duration: {}ms", summary.duration_ms());
    println!("  Plan fingerprint: {}", summary.plan_fingerprint);
    if show_rows > 0 {
        let names: Vec<&str> = summary.output.schema.names().collect();
        println!();
        println!("{}", names.join(","));
        for row in summary.output.rows.iter().take(show_rows) {
            let cells: Vec<String> = row.iter().map(|s| s.to_string()).collect();
            println!("{}", cells.join(","));
        }
    }
    Ok(())
}
