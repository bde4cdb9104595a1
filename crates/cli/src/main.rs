use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use flame_tree_core::differential::DifferentialProvider;
use flame_tree_core::metrics::{DataType, MetricType, MetricValue};
use flame_tree_core::parsers::collapsed::{CollapsedOptions, parse_collapsed};
use flame_tree_core::{
    CancellationToken, FlameGraphConfig, FlameGraphEngine, SimpleTreeProvider, Symbol,
    WeightedTreeProvider, WeightedTreeSet,
};
use flame_tree_protocol::{EntryType, FetchParameters, QueryBuilder, Response, Status};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

#[derive(Parser)]
#[command(name = "flame-tree")]
#[command(version)]
#[command(about = "Flame graph queries over collapsed stack files")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine settings (JSON).
    #[arg(long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Name of the root entry, overriding the config file.
    #[arg(long = "trace-name", value_name = "NAME", global = true)]
    trace_name: Option<String>,

    /// Use the first frame of every stack as its thread.
    #[arg(long = "by-first-frame", global = true)]
    by_first_frame: bool,

    /// Collapsed stack file (`frame;frame;... count` per line).
    #[arg(value_name = "FILE")]
    profile: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the entry tree.
    Tree(TreeArgs),
    /// Print the states of some entries around some times.
    Rows(RowsArgs),
    /// Print the metrics of the node under one time of one entry.
    Tooltip(TooltipArgs),
    /// Print the style table.
    Styles,
    /// Print the rows of the differential tree against another file.
    Diff(DiffArgs),
}

#[derive(Args)]
struct TreeArgs {
    /// Regroup threads at this hierarchy level (0 merges everything).
    #[arg(long = "group-by", value_name = "LEVEL")]
    group_by: Option<usize>,
}

#[derive(Args)]
struct RowsArgs {
    #[command(flatten)]
    tree: TreeArgs,

    #[arg(long = "times", value_name = "T", num_args = 1.., value_delimiter = ',', required = true)]
    times: Vec<i64>,

    /// Entry ids; every entry when omitted.
    #[arg(long = "items", value_name = "ID", num_args = 1.., value_delimiter = ',')]
    items: Vec<i64>,

    /// Keep only states matching REGEX at DEPTH (-1 for every depth).
    #[arg(long = "filter", value_name = "DEPTH=REGEX", value_parser = parse_filter)]
    filters: Vec<(i64, String)>,
}

#[derive(Args)]
struct TooltipArgs {
    #[command(flatten)]
    tree: TreeArgs,

    #[arg(long = "item", value_name = "ID")]
    item: i64,

    #[arg(long = "time", value_name = "T")]
    time: i64,
}

#[derive(Args)]
struct DiffArgs {
    /// File compared against the base FILE.
    #[arg(value_name = "OTHER")]
    other: PathBuf,

    /// Number of evenly spaced times the rows are sampled at.
    #[arg(long = "samples", value_name = "N", default_value_t = 512)]
    samples: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => {
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            FlameGraphConfig::from_json(&data)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => FlameGraphConfig::default(),
    };
    if let Some(name) = cli.trace_name {
        config = config.with_trace_name(name);
    }
    let options = CollapsedOptions {
        group_by_first_frame: cli.by_first_frame,
    };
    let base = load(&cli.profile, &options)?;
    let title = cli.profile.display().to_string();
    let cancel = CancellationToken::new();

    match cli.command {
        Command::Tree(args) => {
            let engine = FlameGraphEngine::new(Arc::new(sample_provider(title, base)), config);
            emit(&engine.fetch_tree(&tree_params(&args), &cancel))
        }
        Command::Rows(args) => {
            let engine = FlameGraphEngine::new(Arc::new(sample_provider(title, base)), config);
            ensure_built(&engine.fetch_tree(&tree_params(&args.tree), &cancel))?;
            let mut query = QueryBuilder::new().times(args.times);
            if !args.items.is_empty() {
                query = query.items(args.items);
            }
            for (depth, pattern) in args.filters {
                query = query.filter(depth, pattern);
            }
            emit(&engine.fetch_rows(&query.build(), &cancel))
        }
        Command::Tooltip(args) => {
            let engine = FlameGraphEngine::new(Arc::new(sample_provider(title, base)), config);
            ensure_built(&engine.fetch_tree(&tree_params(&args.tree), &cancel))?;
            let query = QueryBuilder::new().times([args.time]).items([args.item]).build();
            emit(&engine.fetch_tooltip(&query, &cancel))
        }
        Command::Styles => {
            let engine = FlameGraphEngine::new(Arc::new(sample_provider(title, base)), config);
            emit(&engine.fetch_style(&FetchParameters::new()))
        }
        Command::Diff(args) => {
            let other = load(&args.other, &options)?;
            let title = format!("{title} vs {}", args.other.display());
            let provider = DifferentialProvider::new(title, &base, &other);
            let engine = FlameGraphEngine::new(Arc::new(provider), config);
            info!(provider = engine.provider().title(), "comparing profiles");
            let tree = engine.fetch_tree(&FetchParameters::new(), &cancel);
            ensure_built(&tree)?;
            let end = tree
                .model
                .iter()
                .flat_map(|m| m.of_type(EntryType::Trace))
                .map(|e| e.end_time)
                .max()
                .unwrap_or(0);
            let query = QueryBuilder::new().times(sample_times(end, args.samples)).build();
            emit(&engine.fetch_rows(&query, &cancel))
        }
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env()?
    } else {
        let level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,flame_tree={level},flame_tree_core={level}"))
    };

    // Logs go to stderr; stdout carries the JSON output.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

fn load(path: &Path, options: &CollapsedOptions) -> Result<WeightedTreeSet<Symbol, Symbol>> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let set = parse_collapsed(&data, options)
        .with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), threads = set.all_elements().len(), "profile loaded");
    Ok(set)
}

fn sample_provider(
    title: String,
    set: WeightedTreeSet<Symbol, Symbol>,
) -> SimpleTreeProvider<Symbol, Symbol> {
    SimpleTreeProvider::new(title, set)
        .with_weight_type(MetricType::new("Samples", DataType::Number))
        .with_metric(MetricType::new("Self", DataType::Number), |tree| {
            MetricValue::Integer(tree.self_weight())
        })
}

fn tree_params(args: &TreeArgs) -> FetchParameters {
    let query = QueryBuilder::new();
    match args.group_by {
        Some(level) => query.group_by(level),
        None => query,
    }
    .build()
}

fn parse_filter(raw: &str) -> Result<(i64, String), String> {
    let (depth, pattern) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected DEPTH=REGEX, got `{raw}`"))?;
    let depth = depth
        .trim()
        .parse()
        .map_err(|_| format!("invalid depth `{depth}`"))?;
    Ok((depth, pattern.to_string()))
}

/// `samples` times spread over `[0, end]`, both ends included.
fn sample_times(end: i64, samples: usize) -> Vec<i64> {
    let samples = i64::try_from(samples.max(2)).unwrap_or(i64::MAX);
    let step = (end / (samples - 1)).max(1);
    let mut times: Vec<i64> = (0..=end).step_by(step as usize).collect();
    if times.last() != Some(&end) {
        times.push(end);
    }
    times
}

fn ensure_built<T>(response: &Response<T>) -> Result<()> {
    if response.status == Status::Failed || response.status == Status::Cancelled {
        bail!("building the tree failed: {}", response.message);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn emit<T: Serialize>(response: &Response<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if response.status == Status::Failed {
        bail!("{}", response.message);
    }
    Ok(())
}
