use std::path::PathBuf;
use std::process;

use clap::Parser;

use arbor::GitError;
use arbor::config::{ConfigStore, TomlConfigStore};
use arbor::git::GitBackend;
use arbor::styling::{eprintln, error_message};
use arbor::worktree::{Layout, Repo};

mod cli;
mod commands;

use cli::{Cli, Commands, ShareCommand};
use commands::Context;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn invocation_dir(directory: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = match directory {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    dunce::canonicalize(&dir).map_err(|e| {
        GitError::Other {
            message: format!("Cannot use {}: {e}", dir.display()),
        }
        .into()
    })
}

/// Returns `Ok(false)` when the command completed but reported failures.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let cwd = invocation_dir(cli.directory)?;
    let backend = GitBackend::discover(&cwd)?;
    let layout = Layout::for_git(&backend);
    let store = TomlConfigStore::at(layout.config_path());
    let config = store.load()?;
    log::debug!(
        "Repository root {}, backing store {}",
        layout.root().display(),
        layout.backing_store().display()
    );

    let ctx = Context {
        repo: Repo::new(&backend, layout),
        config,
        store,
        cwd,
    };

    match cli.command {
        Commands::List => commands::handle_list(&ctx)?,
        Commands::Status { format } => commands::handle_status(&ctx, format)?,
        Commands::Resolve { name } => commands::handle_resolve(&ctx, &name)?,
        Commands::Create {
            branch,
            create,
            base,
        } => commands::handle_create(&ctx, &branch, create, base.as_deref())?,
        Commands::Remove { name, force } => commands::handle_remove(&ctx, &name, force)?,
        Commands::Rename { name, new_branch } => {
            commands::handle_rename(&ctx, &name, &new_branch)?
        }
        Commands::Repair { name, strategy } => {
            return commands::handle_repair(&ctx, name.as_deref(), strategy.into());
        }
        Commands::FixPaths { name, new_path } => {
            commands::handle_fix_paths(&ctx, &name, &new_path)?
        }
        Commands::Share(share) => match share {
            ShareCommand::Add {
                source,
                kind,
                managed,
            } => commands::handle_share_add(&ctx, &source, kind.into(), managed)?,
            ShareCommand::Remove {
                source,
                remove_copies,
            } => commands::handle_share_remove(&ctx, &source, remove_copies)?,
            ShareCommand::Apply => commands::handle_share_apply(&ctx)?,
            ShareCommand::List => commands::handle_share_list(&ctx)?,
        },
    }
    Ok(true)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            if let Some(git_error) = e.downcast_ref::<GitError>() {
                eprintln!("{git_error}");
            } else {
                eprintln!("{}", error_message(format!("{e:#}")));
            }
            process::exit(1);
        }
    }
}
