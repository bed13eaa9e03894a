//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::{CustomerId, PointId, ProjectId, Timestamp};

/// Registration-point hierarchies: paths, rollups, cascading soft-deletes and project scopes
#[derive(Parser, Debug)]
#[command(name = "wastetree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Turn debugging information on (repeat for more: -d -d -d)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Project directory holding a local .wastetree.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    /// JSON dataset (overrides data_file from the config)
    #[arg(long, global = true, env = "WASTETREE_DATA_FILE", value_hint = ValueHint::FilePath)]
    pub data_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the hierarchy of every customer (or one)
    Tree {
        /// Only this customer
        #[arg(short, long)]
        tenant: Option<CustomerId>,
    },

    /// Show the breadcrumb path root ... point
    Path {
        /// Registration point id
        id: PointId,
    },

    /// Roll leaf metrics up to every internal point
    Rollup {
        /// Only this customer (default: all)
        #[arg(short, long)]
        tenant: Option<CustomerId>,
        /// Write the aggregates onto the stored internal points
        #[arg(long)]
        persist: bool,
    },

    /// Soft-delete a point and its whole subtree
    Delete {
        /// Registration point id
        id: PointId,
        /// Deletion timestamp (RFC 3339, default: now)
        #[arg(long)]
        at: Option<Timestamp>,
    },

    /// Restore one soft-deleted point (descendants stay deleted)
    Restore {
        /// Registration point id
        id: PointId,
    },

    /// Move a point and its subtree under a new parent
    Move {
        /// Registration point id
        id: PointId,
        /// New parent (omit to make the point a root)
        #[arg(short, long)]
        parent: Option<PointId>,
    },

    /// Show the effective leaf set of a project scope
    Scope {
        /// Project id
        project: ProjectId,
        /// Customer the scope is resolved for
        #[arg(short, long)]
        tenant: CustomerId,
    },

    /// Registrations of a project scope with totals
    Report {
        /// Project id
        project: ProjectId,
        /// Customer the report is built for
        #[arg(short, long)]
        tenant: CustomerId,
    },

    /// Per-customer health: build errors, path drift, rollup state
    Health,

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

    /// Print config template
    Template,

    /// Create config file from template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
