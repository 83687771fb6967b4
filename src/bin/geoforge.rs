mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_build, cmd_inspect, cmd_query};

#[derive(Parser)]
#[command(name = "geoforge")]
#[command(
    about = "Build MaxMind DB files from IP geolocation dumps",
    long_about = "geoforge - Build MaxMind DB (MMDB v2.0) files from authoritative IP geolocation dumps\n\n\
    Reads gzip-compressed JSON lines (one network record per line), merges them into a\n\
    binary prefix tree with longest-prefix-wins semantics, and writes a deduplicated MMDB\n\
    file that any standard MMDB reader can query.\n\n\
    Examples:\n\
      geoforge build dumps/ -o City.mmdb\n\
      geoforge build v4-*.json.gz -o City-v4.mmdb --protocol 4\n\
      geoforge build dumps/ -o City.mmdb --aliasing -j 8\n\
      geoforge inspect City.mmdb\n\
      geoforge query City.mmdb 1.1.1.1"
)]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database from JSON-lines dumps
    Build {
        /// Input files or directories of *.gz files ("-" for stdin)
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output database file (.mmdb)
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Tree protocol: 4 for an IPv4-only tree, 6 for IPv6
        #[arg(short, long, value_name = "4|6", default_value = "6")]
        protocol: u8,

        /// Map IPv4-mapped (::ffff:0:0/96) and 6to4 (2002::/16) space onto IPv4
        #[arg(long)]
        aliasing: bool,

        /// Refuse records for private, loopback and other reserved networks
        #[arg(long)]
        exclude_reserved: bool,

        /// Database type stored in the metadata
        #[arg(short = 't', long, value_name = "TYPE", default_value = "City")]
        database_type: String,

        /// Description stored in the metadata
        #[arg(short, long, value_name = "TEXT")]
        description: Option<String>,

        /// Language code of the description
        #[arg(long, value_name = "LANG", default_value = "en")]
        desc_lang: String,

        /// Force a record size (24, 28 or 32) instead of the smallest that fits
        #[arg(long, value_name = "BITS")]
        record_size: Option<u16>,

        /// Build timestamp in seconds since the epoch (defaults to now)
        #[arg(long, value_name = "SECONDS")]
        build_epoch: Option<u64>,

        /// Decoder threads (0 = one per CPU)
        #[arg(short = 'j', long, value_name = "N", default_value = "0")]
        threads: usize,

        /// Log and skip malformed lines instead of aborting
        #[arg(long)]
        skip_malformed: bool,
    },

    /// Show database metadata
    Inspect {
        /// Path to the database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Output metadata as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Look up an IP address
    Query {
        /// Path to the database
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// IPv4 or IPv6 address
        #[arg(value_name = "IP")]
        ip: String,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Build {
            inputs,
            output,
            protocol,
            aliasing,
            exclude_reserved,
            database_type,
            description,
            desc_lang,
            record_size,
            build_epoch,
            threads,
            skip_malformed,
        } => cmd_build(
            inputs,
            output,
            protocol,
            aliasing,
            exclude_reserved,
            database_type,
            description,
            desc_lang,
            record_size,
            build_epoch,
            threads,
            skip_malformed,
        ),
        Commands::Inspect { database, json } => cmd_inspect(database, json),
        Commands::Query {
            database,
            ip,
            quiet,
        } => cmd_query(database, ip, quiet),
    }
}
