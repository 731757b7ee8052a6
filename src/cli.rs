use clap::{Parser, Subcommand};
use imgrelay_core::ImageId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imgrelay")]
#[command(author, version, about = "Image relay backed by a WebDAV object store")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep remote objects in memory instead of talking to the WebDAV server
    #[arg(long, global = true)]
    pub dry_remote: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the maintenance scheduler until interrupted
    Start,

    /// Run one maintenance job now
    RunJob {
        /// Job name (log_retention, orphan_sweep, storage_compaction)
        name: String,
    },

    /// Show maintenance jobs and their last outcome
    Jobs,

    /// Upload an image file
    Upload {
        /// File to upload
        #[arg(required = true)]
        file: PathBuf,

        /// Content type (guessed from the extension if omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Original name to record (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Resolve a public token and record an access
    Get {
        /// Public token, optionally with its extension
        token: String,
    },

    /// Delete an image (remote object, cached copy, then soft delete)
    Delete { id: ImageId },

    /// Permanently remove an image record and its access logs
    Purge { id: ImageId },

    /// List images
    List {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        limit: u32,

        /// Sort column
        #[arg(long, default_value = "created_at")]
        sort: String,

        /// Sort order (asc or desc)
        #[arg(long, default_value = "desc")]
        order: String,

        /// Include soft-deleted records
        #[arg(long)]
        include_deleted: bool,
    },

    /// Check whether an image's remote object is present
    Check { id: ImageId },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Generate a random token key and IV
    GenerateKeys,

    /// Display version information
    Version,
}
