//! rowtrace CLI: run plan descriptions against directories of raw data.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rowtrace_exec::{EvalOptions, Evaluator};
use rowtrace_io::{DirExporter, DirImporter, Exporter, Importer};
use rowtrace_plan::dsl::parse_yaml_plan;
use rowtrace_store::{ResultStore, StoreConfig};
use rowtrace_trace::TraceManifest;

#[derive(Parser)]
#[command(name = "rowtrace")]
#[command(about = "Tabular transformation engine with row-level lineage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan against an input directory
    Run {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,

        /// Directory containing <input>.csv / <input>.jsonl files
        #[arg(long)]
        input_dir: PathBuf,

        /// Directory into which <output>.csv files are written
        #[arg(long)]
        output_dir: PathBuf,

        /// Directory into which the trace manifest and drop ledger are
        /// written; tracing is enabled iff this is given
        #[arg(long)]
        trace_dir: Option<PathBuf>,

        /// Result cache directory (omit for an in-memory cache)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Cache budget in bytes
        #[arg(long, default_value = "268435456")] // 256 MiB
        cache_budget: u64,

        /// Pin this run's cache entries against eviction
        #[arg(long)]
        pin: bool,
    },

    /// Parse and validate a plan YAML file
    Validate {
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Print a plan's nodes in evaluation order
    Explain {
        #[arg(short, long)]
        plan: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            plan,
            input_dir,
            output_dir,
            trace_dir,
            cache_dir,
            cache_budget,
            pin,
        } => run_plan(
            &plan,
            &input_dir,
            &output_dir,
            trace_dir.as_deref(),
            cache_dir,
            cache_budget,
            pin,
        ),
        Commands::Validate { plan } => validate_plan(&plan),
        Commands::Explain { plan } => explain_plan(&plan),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run_plan(
    plan_path: &PathBuf,
    input_dir: &PathBuf,
    output_dir: &PathBuf,
    trace_dir: Option<&std::path::Path>,
    cache_dir: Option<PathBuf>,
    cache_budget: u64,
    pin: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = fs::read_to_string(plan_path)?;
    let plan = Arc::new(parse_yaml_plan(&source)?);

    // The cache is an optimization: if the configured directory cannot
    // be opened, fall back to memory and keep going.
    let store = match ResultStore::open(StoreConfig {
        dir: cache_dir,
        budget_bytes: cache_budget,
    }) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("warning: {e}; continuing with an in-memory cache");
            ResultStore::in_memory(cache_budget)
        }
    };

    let importer = DirImporter::new(input_dir);
    let mut inputs = BTreeMap::new();
    for (name, &node) in plan.inputs() {
        let table = importer.import(name, &plan.node(node).schema)?;
        inputs.insert(name.clone(), table);
    }

    let evaluator = Evaluator::new(Arc::new(store));
    let opts = EvalOptions {
        trace: trace_dir.is_some(),
        pin,
        ..EvalOptions::default()
    };
    let run = evaluator.evaluate(plan.clone(), &inputs, &opts)?;

    let exporter = DirExporter::new(output_dir);
    for (name, table) in &run.outputs {
        exporter.export(name, table)?;
    }

    if let Some(dir) = trace_dir {
        fs::create_dir_all(dir)?;
        if let Some(trace) = &run.trace {
            let manifest = TraceManifest::new(&plan, trace);
            fs::write(dir.join("trace.json"), manifest.to_json()?)?;
        }
        fs::write(
            dir.join("drops.json"),
            serde_json::to_string_pretty(&run.drops)?,
        )?;
    }

    println!("✓ Run {} complete", run.id);
    for (name, table) in &run.outputs {
        println!("  {}: {} rows", name, table.num_rows());
    }
    println!(
        "  cache: {} hits, {} misses",
        run.cache.hits, run.cache.misses
    );
    if !run.drops.is_empty() {
        println!("  drops:");
        for (reason, count) in run.drops.summarize() {
            println!("    {reason}: {count}");
        }
    }
    Ok(())
}

fn validate_plan(plan_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let source = fs::read_to_string(plan_path)?;
    let plan = parse_yaml_plan(&source)?;
    println!(
        "✓ Plan is valid ({} nodes, {} inputs, {} outputs)",
        plan.len(),
        plan.inputs().len(),
        plan.outputs().len()
    );
    Ok(())
}

fn explain_plan(plan_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let source = fs::read_to_string(plan_path)?;
    let plan = parse_yaml_plan(&source)?;

    println!("Evaluation order");
    println!("================");
    for id in plan.topo_order()? {
        let node = plan.node(id);
        let inputs: Vec<String> = node.inputs.iter().map(|i| i.to_string()).collect();
        let columns: Vec<&str> = node
            .schema
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        println!(
            "  {} {} inputs=[{}] columns=[{}]",
            id,
            node.kind.name(),
            inputs.join(", "),
            columns.join(", ")
        );
    }
    println!();
    for (name, node) in plan.outputs() {
        println!("output '{name}' ← {node}");
    }
    Ok(())
}
