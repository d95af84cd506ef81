//! Shell subprocess helpers shared by actions, scans and the self-rebuild.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Runs a command through `/bin/sh -c` with inherited stdio, returning
/// whether it exited successfully.  Spawn failures are errors; a non-zero
/// exit is the caller's to classify.
pub fn run_shell(cmd: &str) -> Result<bool> {
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .status()
        .with_context(|| format!("spawn /bin/sh -c {:?}", cmd))?;
    Ok(status.success())
}

/// Double-quotes a string for `/bin/sh`, escaping the characters the shell
/// interprets inside double quotes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}
