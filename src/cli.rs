use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Color, Styles};
use clap::{Parser, Subcommand, ValueEnum};

use arbor::config::SharedKind;
use arbor::repair::Strategy;

/// Custom styles for help output
fn help_styles() -> Styles {
    Styles::styled()
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .literal(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .placeholder(anstyle::Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum ShareType {
    #[default]
    Symlink,
    Copy,
    Command,
}

impl From<ShareType> for SharedKind {
    fn from(value: ShareType) -> Self {
        match value {
            ShareType::Symlink => SharedKind::Symlink,
            ShareType::Copy => SharedKind::Copy,
            ShareType::Command => SharedKind::Command,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum RepairStrategy {
    /// Move the directory to match the branch
    #[default]
    Branch,
    /// Rename the branch to match the directory
    Dir,
}

impl From<RepairStrategy> for Strategy {
    fn from(value: RepairStrategy) -> Self {
        match value {
            RepairStrategy::Branch => Strategy::BranchIsTruth,
            RepairStrategy::Dir => Strategy::DirIsTruth,
        }
    }
}

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Keep a fleet of git worktrees named, placed, and provisioned", long_about = None)]
#[command(version)]
#[command(disable_help_subcommand = true)]
#[command(styles = help_styles())]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "\
Getting started

  arbor create --create feature   # New branch and worktree at <root>/feature
  arbor share add .env --managed  # Share .env with every worktree
  arbor status                    # Find misplaced worktrees
  arbor repair                    # Move them where they belong")]
pub(crate) struct Cli {
    /// Working directory for this command
    #[arg(
        short = 'C',
        global = true,
        value_name = "path",
        display_order = 100,
        help_heading = "Global Options"
    )]
    pub directory: Option<PathBuf>,

    /// Show debug logs (-v), or trace every command (-vv)
    #[arg(
        long,
        short = 'v',
        global = true,
        action = clap::ArgAction::Count,
        display_order = 101,
        help_heading = "Global Options"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List worktrees
    List,

    /// Show where each worktree sits relative to its expected location
    Status {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Print the path of a worktree
    ///
    /// Accepts a branch name, a path relative to the repository root, a
    /// directory name, or `@` for the default-branch worktree. With no
    /// argument, prints the worktree containing the current directory.
    Resolve {
        #[arg(default_value = "")]
        name: String,
    },

    /// Create a worktree at <root>/<branch>
    Create {
        branch: String,

        /// Create a new branch
        #[arg(short = 'c', long)]
        create: bool,

        /// Base to create the branch from (only with --create)
        #[arg(short = 'b', long, requires = "create")]
        base: Option<String>,
    },

    /// Remove a worktree
    Remove {
        name: String,

        /// Remove even with uncommitted changes
        #[arg(short = 'f', long)]
        force: bool,
    },

    /// Rename a worktree's branch and directory together
    Rename { name: String, new_branch: String },

    /// Fix worktrees whose directory does not match their branch
    ///
    /// Without a name, repairs every misplaced worktree. Worktrees whose
    /// directory was moved outside git's knowledge are reported; register
    /// their new location with `fix-paths`.
    Repair {
        name: Option<String>,

        /// Which side of a mismatch is correct
        #[arg(long, value_enum, default_value_t)]
        strategy: RepairStrategy,
    },

    /// Register the new location of a moved worktree
    FixPaths { name: String, new_path: PathBuf },

    /// Manage files shared across worktrees
    #[command(subcommand)]
    Share(ShareCommand),
}

#[derive(Subcommand)]
pub(crate) enum ShareCommand {
    /// Share a file, directory, or setup command with every worktree
    Add {
        /// Path relative to the worktree root, or a shell command
        source: String,

        #[arg(long = "type", value_enum, default_value_t)]
        kind: ShareType,

        /// Keep the canonical copy in <root>/.shared instead of the
        /// default-branch worktree
        #[arg(long)]
        managed: bool,
    },

    /// Stop sharing a source
    Remove {
        source: String,

        /// Also delete copies (symlinks are always removed)
        #[arg(long)]
        remove_copies: bool,
    },

    /// Re-apply every shared source to every worktree
    Apply,

    /// List shared sources
    List,
}
