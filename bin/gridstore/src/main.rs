//! Gridstore CLI
//!
//! Seven commands against a base directory of stores: init, put, get,
//! list, destroy, replicate, ha. Success messages go to stdout (`get`
//! streams the raw object bytes), diagnostics go to stderr, and any
//! failure exits with code 1.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gridstore_common::{Config, ObjectId, StoreId};
use gridstore_engine::Engine;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gridstore")]
#[command(about = "File-backed block store with replica pairs and HA parity groups")]
#[command(version)]
struct Args {
    /// Base directory holding store and group directories
    #[arg(long)]
    base: Option<PathBuf>,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty store
    Init {
        /// Store ID
        store_id: u32,
    },
    /// Store a file as a new object
    Put {
        /// Store ID
        store_id: u32,
        /// File to store (at most one block, 1 MiB)
        path: PathBuf,
    },
    /// Write an object's bytes to stdout
    Get {
        /// Store ID
        store_id: u32,
        /// Object ID as printed by put
        object_id: String,
    },
    /// List all stores
    List,
    /// Destroy a store
    Destroy {
        /// Store ID
        store_id: u32,
    },
    /// Create a replica of a store; prints the replica's id
    Replicate {
        /// Store ID of the source
        store_id: u32,
    },
    /// Create an HA parity group from two or more stores
    Ha {
        /// Member store IDs; the first becomes the group ID
        #[arg(num_args = 2.., required = true)]
        store_ids: Vec<u32>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(base) = &args.base {
        config.base_dir = base.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logging goes to stderr; stdout is reserved for command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    let engine = Engine::new(&config);

    match args.command {
        Commands::Init { store_id } => {
            engine.init(StoreId::new(store_id))?;
            println!("Successfully initialized store {store_id}");
        }

        Commands::Put { store_id, path } => {
            if !path.exists() {
                bail!("File does not exist: {}", path.display());
            }
            let object_id = engine.put(StoreId::new(store_id), &path)?;
            println!("Successfully put object id {object_id} into {store_id}");
        }

        Commands::Get {
            store_id,
            object_id,
        } => {
            let object_id = ObjectId::parse(object_id)?;
            let data = engine.get(StoreId::new(store_id), object_id.as_str())?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
            eprintln!("Successfully get the object {object_id}");
        }

        Commands::List => {
            let stores = engine.list()?;
            if stores.is_empty() {
                println!("No stores found");
            } else {
                for store in stores {
                    println!(
                        "{} - {} (used: {}/{} blocks)",
                        store.store_id,
                        store.status_text(),
                        store.used_blocks,
                        store.total_blocks
                    );
                }
            }
        }

        Commands::Destroy { store_id } => {
            engine.destroy(StoreId::new(store_id))?;
            println!("Store {store_id} destroyed successfully");
        }

        Commands::Replicate { store_id } => {
            let replica_id = engine.replicate(StoreId::new(store_id))?;
            println!("{replica_id}");
        }

        Commands::Ha { store_ids } => {
            let ids: Vec<StoreId> = store_ids.iter().copied().map(StoreId::new).collect();
            let group_id = engine.ha_create(&ids)?;
            println!("Successfully created HA group with ID {group_id}");
        }
    }

    Ok(())
}
