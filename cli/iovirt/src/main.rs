//! iovirt CLI: decode IORT images and device-tree blobs into an I/O
//! virtualization topology and query it.

mod commands;

use std::process;

use clap::{ArgAction, Parser, Subcommand};

use commands::InputArgs;

#[derive(Parser)]
#[command(name = "iovirt", version, about = "I/O virtualization topology decoder")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the topology and print block counts
    Build {
        #[command(flatten)]
        inputs: InputArgs,
        /// Print the whole table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Dump every block and list topology warnings
    Inspect {
        #[command(flatten)]
        inputs: InputArgs,
        /// Print the warning report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Query a built topology
    Query {
        #[command(subcommand)]
        query: QueryAction,
    },
    /// Run the per-block uniqueness checks; exits non-zero on failure
    Check {
        #[command(flatten)]
        inputs: InputArgs,
    },
}

#[derive(Subcommand)]
enum QueryAction {
    /// Resolve the SMMU translating a requester ID
    SmmuBase {
        /// PCI segment number
        #[arg(long, default_value_t = 0, value_parser = commands::parse_u32)]
        segment: u32,
        /// Requester ID (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = commands::parse_u32)]
        rid: u32,
        #[command(flatten)]
        inputs: InputArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build { inputs, json } => commands::build::run(&inputs, json),
        Commands::Inspect { inputs, json } => commands::inspect::run(&inputs, json),
        Commands::Query { query } => match query {
            QueryAction::SmmuBase {
                segment,
                rid,
                inputs,
                json,
            } => commands::query::smmu_base(&inputs, segment, rid, json),
        },
        Commands::Check { inputs } => commands::check::run(&inputs),
    }
}
