use clap::{Parser, Subcommand};

/// Command-line options for the storage tool.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run storage operations against configured disks")]
pub struct Args {
    /// Storage config file (overrides DISK_STORAGE_CONFIG)
    #[arg(long)]
    pub config: Option<String>,

    /// Disk to operate on (defaults to the configured default disk)
    #[arg(long)]
    pub disk: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a local file
    Put {
        path: String,
        file: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download an object to a file, or stdout when no output is given
    Get {
        path: String,
        #[arg(long)]
        output: Option<String>,
    },
    /// List objects under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Show object metadata
    Meta { path: String },
    /// Check whether an object exists
    Exists { path: String },
    /// Print the public URL of an object
    Url { path: String },
    /// Print a time-limited URL
    Sign {
        path: String,
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Delete objects in batches
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Delete everything under a prefix
    RmPath { prefix: String },
    /// Copy an object within the disk
    Cp { from: String, to: String },
    /// Move an object within the disk
    Mv { from: String, to: String },
}
