//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// calwidget - Your Google Calendar week on the desktop
#[derive(Debug, Parser)]
#[command(name = "calwidget")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALWIDGET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Show generated demo data instead of contacting Google
    #[arg(long)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands. Without one, the widget window opens.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in to Google and store the token
    Auth {
        /// Sign in again even if a usable token is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Delete the stored token and the cached data
    Logout,

    /// Show the files calwidget reads and writes
    Paths,
}
