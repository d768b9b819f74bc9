use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hls-dtg")]
#[command(author, version, about = "Offline download manager for HTTP Live Streaming media")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a master playlist, select renditions, and plan its fetch tasks
    Add {
        /// Caller-supplied opaque item id
        item_id: String,

        /// URL of the remote master playlist
        master_url: String,

        /// Device supports hardware HEVC decoding
        #[arg(long)]
        hardware_hevc: bool,

        /// Device permits software HEVC decoding when inefficient codecs are allowed
        #[arg(long)]
        software_hevc_permitted: bool,

        /// Device supports AC-3 audio passthrough
        #[arg(long)]
        ac3: bool,

        /// Device supports E-AC-3 audio passthrough
        #[arg(long)]
        eac3: bool,
    },

    /// Start (or resume) downloading an item
    Start { item_id: String },

    /// Pause an in-progress item after its current chunk completes
    Pause { item_id: String },

    /// Cancel an item, deleting its planned and in-flight tasks
    Cancel { item_id: String },

    /// Remove an item entirely, deleting its files from disk
    Remove { item_id: String },

    /// List every known item and its current state
    List,

    /// Run the loopback playback server against an existing item store
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (0 lets the OS assign one)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Display version information
    Version,
}
