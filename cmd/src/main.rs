use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use extpromql::{
    rules::shard_rules, value::Value, FunctionTable, QueryEngine, RecordingRule, RuleFilters,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "PromQL extension functions over local samples")]
struct Cli {
    /// Directory with Prometheus API JSON dumps; every metric becomes a table
    #[arg(long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/../samples"))]
    samples: PathBuf,
    /// Evaluation time as Unix seconds [default: read from samples/timestamp.log]
    #[arg(long)]
    time: Option<i64>,
    /// How far back instant selectors look for a sample, in seconds
    #[arg(long, default_value_t = 300)]
    lookback: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluates a selector or a literal
    Query { expr: String },
    /// Calls an extension function
    #[command(after_help = r#"Examples:
    select2 'pod_name|pod' container_cpu_usage_seconds kube_pod_labels label_app:app
    labels_rename container_cpu_usage_seconds pod_name pod
    aggregate_matrix_max 'container_cpu_usage_seconds[5m]'"#)]
    Call {
        name: String,
        /// Selectors, numbers or strings, as the function declares
        args: Vec<String>,
    },
    /// Evaluates the recording rules of a JSON file
    Rules {
        path: PathBuf,
        /// Prints the shard groups instead of evaluating
        #[arg(long)]
        shards: Option<u32>,
    },
    /// Lists extension functions and rule filters
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let start_time = time::Instant::now();

    let seconds = match cli.time {
        Some(t) => t,
        None => prom_ext::load_timestamps(&cli.samples)?.1,
    };
    let timestamp = prom_ext::to_micros(seconds)?;

    let ctx = prom_ext::create_context(&cli.samples)?;
    let engine = QueryEngine::new(Arc::new(ctx), FunctionTable::builtin())
        .with_lookback_delta(Duration::from_secs(cli.lookback));
    tracing::info!("prepare time: {}", start_time.elapsed());

    match cli.command {
        Command::Query { expr } => {
            let data = engine.query(&expr, timestamp).await?;
            print_json(&data)?;
        }
        Command::Call { name, args } => {
            let args = args.iter().map(String::as_str).collect::<Vec<_>>();
            let data = engine.call(&name, &args, timestamp).await?;
            print_json(&data)?;
        }
        Command::Rules { path, shards } => {
            let rules = prom_ext::load_rules(path)?;
            if let Some(shards) = shards {
                print_json(&shard_rules(rules, shards)?)?;
                return Ok(());
            }
            let filters = RuleFilters::builtin();
            let mut recorded = Vec::new();
            for rule in rules {
                let rule = RecordingRule::new(rule)?;
                let vector = engine.eval_rule(&rule, &filters, timestamp).await?;
                tracing::info!(rule = rule.name(), series = vector.len(), "rule evaluated");
                recorded.extend(vector);
            }
            print_json(&Value::Vector(recorded))?;
        }
        Command::List => {
            for name in engine.functions().names() {
                println!("function\t{name}");
            }
            for name in RuleFilters::builtin().names() {
                println!("filter\t{name}");
            }
        }
    }
    tracing::info!("execute time: {}", start_time.elapsed());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
