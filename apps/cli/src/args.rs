//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Transfer a single file through a pre-issued transfer link
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON transfer configuration (defaults are used if missing)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server the link was issued by
    #[arg(long, default_value = "")]
    pub server: String,

    /// Account the link was issued to
    #[arg(long, default_value = "")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Download a file through a GET link
    Download {
        /// Transfer link
        link: String,

        /// Destination file
        local_path: PathBuf,

        /// Repository the file belongs to
        #[arg(long, default_value = "")]
        repo: String,

        /// Remote path of the file
        #[arg(long, default_value = "")]
        path: String,

        /// Content identifier reported with the link
        #[arg(long, default_value = "")]
        file_id: String,
    },

    /// Upload a file through a POST link
    Upload {
        /// Transfer link
        link: String,

        /// Source file
        local_path: PathBuf,

        /// Repository to upload into
        #[arg(long, default_value = "")]
        repo: String,

        /// Remote directory to upload into
        #[arg(long, default_value = "/")]
        parent_dir: String,
    },
}
