use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loomck::constraints::TensorDTypesAreValid;
use loomck::environments::expression_environment_with;
use loomck::graph::LoomGraph;
use loomck::report::Report;
use loomck::traversal::tensor_operation_coloring;
use loomck::ValidationIssueCollector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "loomck",
    version,
    about = "Check shape, range and tiling consistency of Loom graphs"
)]
struct Cli {
    /// Input graph document (JSON)
    graph: PathBuf,

    /// Allowed tensor dtype (repeatable; replaces the default int32/float32 set)
    #[arg(long = "dtype")]
    dtypes: Vec<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Include a greedy tensor/operation coloring in the report
    #[arg(long)]
    coloring: bool,

    /// Include the SHA-256 fingerprint of the graph in the report
    #[arg(long)]
    fingerprint: bool,

    /// Log validation progress and each issue to stderr
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ── Environment ──
    let dtypes = if cli.dtypes.is_empty() {
        TensorDTypesAreValid::default()
    } else {
        TensorDTypesAreValid::new(cli.dtypes.iter().cloned())
    };
    let env = match expression_environment_with(dtypes) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("loomck: error: {e}");
            std::process::exit(2);
        }
    };

    // ── Load graph ──
    let source = match std::fs::read_to_string(&cli.graph) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("loomck: error: {}: {}", cli.graph.display(), e);
            std::process::exit(2);
        }
    };
    let graph = match LoomGraph::from_json(&source, Some(env.clone())) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("loomck: error: {}: {}", cli.graph.display(), e);
            std::process::exit(2);
        }
    };
    info!(path = %cli.graph.display(), nodes = graph.len(), "graph loaded");

    // ── Validate ──
    let mut collector = ValidationIssueCollector::new();
    env.validate_graph(&graph, &mut collector);
    let issues = collector.into_issues();
    if cli.verbose {
        for issue in &issues {
            warn!(issue_type = %issue.issue_type, "{}", issue.summary);
        }
    }

    let mut report = Report::new(graph.id(), issues);
    if cli.fingerprint {
        match graph.fingerprint() {
            Ok(fp) => report = report.with_fingerprint(fp),
            Err(e) => {
                eprintln!("loomck: error: {e}");
                std::process::exit(2);
            }
        }
    }
    if cli.coloring {
        report = report.with_coloring(tensor_operation_coloring(&graph));
    }

    // ── Emit ──
    match cli.format {
        Format::Text => print!("{}", report.text(Some(env.as_ref()))),
        Format::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("loomck: error: {e}");
                std::process::exit(2);
            }
        },
    }

    std::process::exit(if report.valid { 0 } else { 1 });
}
