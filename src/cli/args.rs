//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Inspect outliner trees over a TOML world fixture: hierarchy, filters, drag/drop and pinning
#[derive(Parser, Debug)]
#[command(name = "outliner")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub debug: u8,

    /// Directory holding a local .outliner.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which world to load and how to look at it.
#[derive(Args, Debug, Clone)]
pub struct WorldArgs {
    /// World fixture (TOML)
    #[arg(value_hint = ValueHint::FilePath)]
    pub fixture: PathBuf,

    /// Show only the content of this nested scope (object label)
    #[arg(long, value_name = "LABEL")]
    pub nested: Option<String>,

    /// Text filter on labels (prefix with "re:" for a regular expression)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Activate a named filter (repeatable)
    #[arg(long = "enable", value_name = "FILTER")]
    pub enable: Vec<String>,

    /// Deactivate a named filter (repeatable)
    #[arg(long = "disable", value_name = "FILTER")]
    pub disable: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the materialized tree
    Tree {
        #[command(flatten)]
        world: WorldArgs,
    },

    /// List the resolved children of an item
    Children {
        #[command(flatten)]
        world: WorldArgs,
        /// Item reference: scope, folder:<path>, unloaded:<label>, nested:<label>, <label>, <label>/<sub>
        item: String,
    },

    /// Check whether dropping items onto a target would be accepted
    Validate {
        #[command(flatten)]
        world: WorldArgs,
        /// Drop target
        target: String,
        /// Dragged items
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Drop items onto a target and print the resulting tree
    Drop {
        #[command(flatten)]
        world: WorldArgs,
        /// Drop target
        target: String,
        /// Dragged items
        #[arg(required = true)]
        items: Vec<String>,
        /// Attachment socket to use when the target offers several
        #[arg(long)]
        socket: Option<String>,
    },

    /// Pin items and their materialized children (partitioned worlds only)
    Pin {
        #[command(flatten)]
        world: WorldArgs,
        /// Items to pin (default: the fixture's selection)
        items: Vec<String>,
        /// Unpin instead
        #[arg(long)]
        unpin: bool,
    },

    /// Print the status line
    Status {
        #[command(flatten)]
        world: WorldArgs,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Show config paths
    Path,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },
}
