//! Command suggestion helpers for hint messages.
//!
//! ```
//! use arbor::styling::suggest_command;
//!
//! let cmd = suggest_command("repair", &["feature"], &["--strategy", "dir"]);
//! assert_eq!(cmd, "arbor repair feature --strategy dir");
//!
//! // Dash-prefixed args get a `--` separator, spaces are quoted
//! assert_eq!(suggest_command("remove", &["-wip"], &[]), "arbor remove -- -wip");
//! assert_eq!(suggest_command("remove", &["my tree"], &[]), "arbor remove 'my tree'");
//! ```

use shell_escape::escape;
use std::borrow::Cow;

/// Binary name used in suggestions.
pub const COMMAND_NAME: &str = "arbor";

/// Build a copy-pasteable command like `arbor remove feature --force`.
///
/// Arguments are shell-escaped. A `--` separator is inserted before the first
/// positional argument that starts with `-`.
pub fn suggest_command(subcommand: &str, args: &[&str], flags: &[&str]) -> String {
    let mut parts = vec![COMMAND_NAME.to_string(), subcommand.to_string()];

    let mut separator_inserted = false;
    for arg in args {
        if arg.starts_with('-') && !separator_inserted {
            parts.push("--".to_string());
            separator_inserted = true;
        }
        parts.push(escape(Cow::Borrowed(*arg)).into_owned());
    }

    parts.extend(flags.iter().map(|s| s.to_string()));
    parts.join(" ")
}
