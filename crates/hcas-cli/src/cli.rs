use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hcas_crypto::HashAlgorithm;
use hcas_server::ExtractorKind;
use hcas_sync::{DEFAULT_URL, DEFAULT_WORKERS};
use hcas_types::ContentHash;

#[derive(Parser)]
#[command(
    name = "hcas",
    about = "Content-addressable storage for static site distributions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at DEBUG level.
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the CAS HTTP server
    Serve(ServeArgs),
    /// Serve distribution files by path or subdomain
    Route(RouteArgs),
    /// Upload a directory as a distribution
    Sync(SyncArgs),
    /// Point a label at an existing distribution
    SetLabel(SetLabelArgs),
    /// Print the content hash of files, or the distribution hash of directories
    Hash(HashArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Store root directory.
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Directory published distributions are materialized in.
    #[arg(long)]
    pub sites_root: Option<PathBuf>,
    /// Keep everything in memory instead of on disk.
    #[arg(long)]
    pub memory: bool,
    #[arg(long)]
    pub algorithm: Option<HashAlgorithm>,
}

#[derive(Args)]
pub struct RouteArgs {
    #[command(flatten)]
    pub serve: ServeArgs,
    /// Extractors to try in order.
    #[arg(long, value_delimiter = ',')]
    pub extractors: Vec<ExtractorKind>,
    /// Parent domain for subdomain extraction.
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Directory to upload.
    pub path: PathBuf,
    #[arg(short = 'u', long, default_value = DEFAULT_URL)]
    pub api_url: String,
    /// Label to point at the new distribution.
    #[arg(short, long)]
    pub label: Option<String>,
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
    /// Retries per HTTP request.
    #[arg(long, default_value_t = 3)]
    pub request_retries: u32,
    /// Retries of the whole sync.
    #[arg(short, long, default_value_t = 0)]
    pub retries: u32,
    /// Timeout for file existence checks and uploads.
    #[arg(long, default_value_t = 5_000)]
    pub timeout_ms: u64,
    /// Timeout for manifest publish and label updates.
    #[arg(long, default_value_t = 30_000)]
    pub distro_timeout_ms: u64,
    #[arg(long, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
}

#[derive(Args)]
pub struct SetLabelArgs {
    #[arg(short = 'u', long, default_value = DEFAULT_URL)]
    pub api_url: String,
    /// Label to set.
    #[arg(short, long)]
    pub name: String,
    /// Distribution hash to point the label at.
    #[arg(short = 'a', long)]
    pub hash: ContentHash,
    #[arg(short, long, default_value_t = 3)]
    pub retries: u32,
}

#[derive(Args)]
pub struct HashArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    #[arg(long, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
}
