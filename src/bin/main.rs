//! Command-line front end: compile queries against a registry and print the
//! SQL that would run, without touching an engine. Useful for inspecting
//! what the compiler and planner will do for a given query.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use facet::compile::SqlBuilder;
use facet::ir::QueryIR;
use facet::registry::Registry;

#[derive(Parser)]
#[command(name = "facet", version, about = "Semantic query compiler")]
struct Cli {
    /// Registry TOML with [[model]] and [[dataset]] tables.
    #[arg(short, long, global = true, default_value = "registry.toml")]
    registry: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a query (JSON on disk) and print the SQL.
    Compile {
        /// Query description as JSON.
        #[arg(short, long)]
        query: PathBuf,
    },
    /// Print the cardinality-estimation probe for a query.
    Estimate {
        #[arg(short, long)]
        query: PathBuf,
    },
    /// Print every bucket statement for a fixed bucket grid.
    Buckets {
        #[arg(short, long)]
        query: PathBuf,
        /// Number of hash buckets.
        #[arg(short = 'n', long, default_value_t = 4)]
        buckets: u64,
        /// Dimension names to hash; defaults to all requested dimensions.
        #[arg(short, long)]
        key: Vec<String>,
    },
    /// List the models in the registry.
    Models,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let registry = Registry::from_path(&cli.registry).map_err(|e| e.to_string())?;
    let builder = SqlBuilder::new(&registry);

    match cli.command {
        Command::Compile { query } => {
            let ir = load_query(&query)?;
            println!("{}", builder.build(&ir).map_err(|e| e.to_string())?);
        }
        Command::Estimate { query } => {
            let ir = load_query(&query)?;
            println!(
                "{}",
                builder.build_estimation_query(&ir).map_err(|e| e.to_string())?
            );
        }
        Command::Buckets {
            query,
            buckets,
            key,
        } => {
            let ir = load_query(&query)?;
            let keys = if key.is_empty() { ir.dimensions.clone() } else { key };
            for bucket in 0..buckets {
                let sql = builder
                    .build_partitioned_query(&ir, &keys, buckets, bucket, ir.limit)
                    .map_err(|e| e.to_string())?;
                println!("-- bucket {}/{}", bucket + 1, buckets);
                println!("{sql};\n");
            }
        }
        Command::Models => {
            let mut names: Vec<&str> = registry.model_names().collect();
            names.sort_unstable();
            for name in names {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn load_query(path: &PathBuf) -> Result<QueryIR, String> {
    let input = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&input).map_err(|e| format!("invalid query: {e}"))
}
