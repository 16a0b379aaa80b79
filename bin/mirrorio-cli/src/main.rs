//! MirrorIO CLI - Mirror Set Test Harness and Admin Tool
//!
//! Provisions member images, drives the harness scenarios against a mirror
//! set, and runs offline verification and status queries.

mod harness;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use harness::Harness;
use mirrorio_common::{MirrorConfig, ReadPolicy};
use mirrorio_mirror::{MirrorOptions, MirrorSet, VerifyMode};
use mirrorio_storage::{BlockStore, FileStore, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mirrorio-cli")]
#[command(about = "MirrorIO mirror set harness and admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "MIRRORIO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Mirror settings that override the configuration file
#[derive(clap::Args, Debug, Default)]
struct MirrorArgs {
    /// Member images or devices in slot order (MISSING for an absent slot)
    members: Vec<String>,

    /// Block size in bytes
    #[arg(long)]
    block_size: Option<u64>,

    /// Read policy: round-robin, fixed-primary or verify-all
    #[arg(long)]
    read_policy: Option<ReadPolicy>,

    /// Primary member for fixed-primary reads
    #[arg(long)]
    primary: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create zero-filled member images
    Create {
        /// Image size in bytes
        #[arg(long)]
        size: u64,
        /// Image paths
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Zero every member of a mirror set
    Init {
        #[command(flatten)]
        mirror: MirrorArgs,
    },
    /// Run the harness scenarios against a mirror set
    Check {
        #[command(flatten)]
        mirror: MirrorArgs,
        /// Iterations for the random and interleaved scenarios
        #[arg(long, default_value_t = 20)]
        times: usize,
        /// Seed for the random scenario
        #[arg(long)]
        seed: Option<u64>,
        /// Run on in-memory members of this many bytes instead of images
        #[arg(long)]
        memory: Option<usize>,
    },
    /// Compare the members of a mirror set
    Verify {
        #[command(flatten)]
        mirror: MirrorArgs,
        /// Report every differing range, not just the first
        #[arg(long)]
        all_ranges: bool,
        /// Start of the region to verify
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Length of the region (default: to the end of the device)
        #[arg(long)]
        length: Option<u64>,
    },
    /// Show mirror set status as JSON
    Status {
        #[command(flatten)]
        mirror: MirrorArgs,
    },
}

/// Load the config file (if any) and apply command-line overrides
fn resolve_config(path: Option<&PathBuf>, args: MirrorArgs) -> Result<MirrorConfig> {
    let mut config = match path {
        Some(path) => MirrorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MirrorConfig::default(),
    };

    if !args.members.is_empty() {
        config.member_paths = args.members;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if let Some(policy) = args.read_policy {
        config.read_policy = policy;
    }
    if let Some(primary) = args.primary {
        config.primary = primary;
    }
    Ok(config)
}

fn open_mirror(config: &MirrorConfig) -> Result<MirrorSet> {
    info!("Members: {:?}", config.member_paths);
    MirrorSet::open(config).context("assembling mirror set")
}

fn memory_mirror(config: &MirrorConfig, size: usize) -> Result<MirrorSet> {
    let count = config.member_paths.len().max(2);
    let stores = (0..count)
        .map(|i| Some(Arc::new(MemoryStore::new(format!("mem{i}"), size)) as Arc<dyn BlockStore>))
        .collect();
    MirrorSet::assemble(stores, &MirrorOptions::from(config)).context("assembling mirror set")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        args.log_level.clone()
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Create { size, paths } => {
            for path in &paths {
                FileStore::create(path, size)
                    .with_context(|| format!("creating {}", path.display()))?;
                println!("Created {} ({} bytes)", path.display(), size);
            }
        }
        Commands::Init { mirror } => {
            let config = resolve_config(args.config.as_ref(), mirror)?;
            let set = open_mirror(&config)?;
            set.initialize().await?;
            println!("Initialized {} bytes", set.capacity());
            set.close().await?;
        }
        Commands::Check {
            mirror,
            times,
            seed,
            memory,
        } => {
            let config = resolve_config(args.config.as_ref(), mirror)?;
            let set = match memory {
                Some(size) => memory_mirror(&config, size)?,
                None => open_mirror(&config)?,
            };

            let failed = Harness::new(&set, seed).run_all(times).await;
            set.close().await?;
            if failed > 0 {
                error!("{} scenario(s) failed", failed);
                bail!("{failed} harness scenario(s) failed");
            }
        }
        Commands::Verify {
            mirror,
            all_ranges,
            offset,
            length,
        } => {
            let config = resolve_config(args.config.as_ref(), mirror)?;
            let set = open_mirror(&config)?;
            let length = length.unwrap_or_else(|| set.capacity().saturating_sub(offset));
            let mode = if all_ranges {
                VerifyMode::AllRanges
            } else {
                VerifyMode::FirstMismatch
            };

            match set.verify_with(offset, length, mode).await? {
                None => println!("Members agree over [{}, {})", offset, offset + length),
                Some(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    bail!("members diverge at offset {}", report.first.offset);
                }
            }
        }
        Commands::Status { mirror } => {
            let config = resolve_config(args.config.as_ref(), mirror)?;
            let set = open_mirror(&config)?;
            println!("{}", serde_json::to_string_pretty(&set.status())?);
        }
    }

    Ok(())
}
