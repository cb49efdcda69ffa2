//! Process execution
//!
//! Every external command (git, and shell commands from `type = "command"`
//! shared entries) runs through [`run`], so logging and timing are uniform.
//! Shell strings are interpreted by `/bin/sh -c` on Unix.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Instant;

static SHELL_CONFIG: OnceLock<ShellConfig> = OnceLock::new();

/// Shell used to interpret command strings
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Path to the shell executable
    pub executable: PathBuf,
    /// Arguments passed before the command string (e.g. `["-c"]`)
    pub args: Vec<String>,
    /// Human-readable name for messages
    pub name: String,
}

impl ShellConfig {
    /// The shell configuration for the current platform.
    pub fn get() -> &'static ShellConfig {
        SHELL_CONFIG.get_or_init(detect_shell)
    }

    /// Build a `Command` that runs `shell_command` through this shell.
    pub fn command(&self, shell_command: &str) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args);
        cmd.arg(shell_command);
        cmd
    }
}

fn detect_shell() -> ShellConfig {
    #[cfg(unix)]
    {
        ShellConfig {
            executable: PathBuf::from("sh"),
            args: vec!["-c".to_string()],
            name: "sh".to_string(),
        }
    }

    #[cfg(windows)]
    {
        ShellConfig {
            executable: PathBuf::from("cmd.exe"),
            args: vec!["/C".to_string()],
            name: "cmd".to_string(),
        }
    }
}

/// Execute a command with timing and debug logging.
///
/// ```text
/// $ git worktree list --porcelain [repo]
/// [arbor-trace] context=repo cmd="git worktree list --porcelain" dur=4.1ms ok=true
/// ```
///
/// `context` is usually the worktree or repository name the command runs in.
pub fn run(cmd: &mut Command, context: Option<&str>) -> std::io::Result<std::process::Output> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
    let cmd_str = if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args.join(" "))
    };

    match context {
        Some(ctx) => log::debug!("$ {} [{}]", cmd_str, ctx),
        None => log::debug!("$ {}", cmd_str),
    }

    let t0 = Instant::now();
    let result = cmd.output();
    let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

    let ctx = context.map(|c| format!("context={c} ")).unwrap_or_default();
    match &result {
        Ok(output) => log::debug!(
            "[arbor-trace] {ctx}cmd=\"{cmd_str}\" dur={duration_ms:.1}ms ok={}",
            output.status.success()
        ),
        Err(e) => log::debug!("[arbor-trace] {ctx}cmd=\"{cmd_str}\" dur={duration_ms:.1}ms err=\"{e}\""),
    }

    result
}

/// Outcome of a shell command run inside a worktree.
#[derive(Debug, Clone)]
pub struct ShellOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Combined, trimmed stderr and stdout (for error display)
    pub output: String,
}

/// Run a shell command string in `dir`.
///
/// Spawn failures are errors; a non-zero exit is reported in the outcome.
pub fn run_shell_in(command: &str, dir: &Path, context: Option<&str>) -> std::io::Result<ShellOutcome> {
    let mut cmd = ShellConfig::get().command(command);
    cmd.current_dir(dir);
    let output = run(&mut cmd, context)?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let combined = [stderr.trim(), stdout.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ShellOutcome {
        success: output.status.success(),
        exit_code: output.status.code(),
        output: combined,
    })
}
