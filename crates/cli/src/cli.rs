use clap::Parser;

use bmo_core::{Config, InsertMode};

pub const BMO_ART: &str = r"
    ▄██████████████████████▄
    █                      █
    █ ▄██████████████████▄ █
    █ █                  █ █
    █ █                  █ █
    █ █  █            █  █ █
    █ █     ▄▄▄▄▄▄▄▄     █ █
    █ █     ▀▄    ▄▀     █ █
    █ █       ▀▀▀▀       █ █
    █ █                  █ █
 █▌ █ ▀██████████████████▀ █ ▐█
 █  █                      █  █
 █  █ ████████████     ██  █  █
 █  █                      █  █
 █  █               ▄      █  █
 ▀█▄█   ▐█▌       ▄███▄ ██ █▄█▀
   ▀█  █████               █▀
    █   ▐█▌         ▄██▄   █
    █              ▐████▌  █
    █ ▄▄▄ ▄▄▄       ▀██▀   █
    █                      █
    ▀██████████████████████▀
        ██            ██
        ██            ██
        ██            ██
        ██            ██
       ▐██            ██▌";

/// Stream JSON values from stdin into a table, creating it on first use.
///
/// Unset flags fall back to the environment (BMO_NODES, BMO_DATABASE,
/// BMO_TABLE, BMO_POOL_SIZE, BMO_BATCH_SIZE, BMO_INSERT_MODE, PG_*),
/// optionally prefixed by the profile named in BMO_PROFILE.
#[derive(Parser, Debug)]
#[command(name = "bmo", version, before_help = BMO_ART)]
pub struct CliArgs {
    /// Store host[:port], can specify multiple times
    #[arg(long = "node", value_name = "HOST[:PORT]")]
    pub nodes: Vec<String>,

    /// Name of target database
    #[arg(long)]
    pub database: Option<String>,

    /// Name of target table
    #[arg(long)]
    pub table: Option<String>,

    /// Maximum concurrent insert operations
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Documents per insert batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Write one request per batch or one per document: batch, per-document
    #[arg(long)]
    pub insert_mode: Option<InsertMode>,
}

impl CliArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if !self.nodes.is_empty() {
            config.store.nodes = self.nodes.clone();
        }
        if let Some(ref database) = self.database {
            config.store.database = database.clone();
        }
        if let Some(ref table) = self.table {
            config.store.table = table.clone();
        }
        if let Some(pool_size) = self.pool_size {
            config.pipeline.pool_size = pool_size;
        }
        if let Some(batch_size) = self.batch_size {
            config.pipeline.batch_size = batch_size;
        }
        if let Some(insert_mode) = self.insert_mode {
            config.pipeline.insert_mode = insert_mode;
        }
    }
}

/// Check the settings the pipeline cannot run without.
pub fn validate(config: &Config) -> Result<(), String> {
    if config.store.nodes.is_empty() {
        return Err("Specify at least one node address".into());
    }
    if config.store.database.trim().is_empty() {
        return Err("Specify the database".into());
    }
    if config.store.table.trim().is_empty() {
        return Err("Specify the target table".into());
    }
    if config.pipeline.pool_size == 0 {
        return Err("Pool size must be at least 1".into());
    }
    if config.pipeline.batch_size == 0 {
        return Err("Batch size must be at least 1".into());
    }
    Ok(())
}
