//! `compile_commands.json` emission for editor tooling.

use crate::flags::FlagSet;
use crate::graph::Input;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CompileCommand {
    pub command: String,
    pub file: String,
    pub directory: String,
}

/// Renders a configure-time compile entry.  Step-referencing include and
/// library paths have no artifact yet at configure time and are omitted;
/// plain paths resolve against the project root.
pub fn entry_for(root: &Path, flags: &FlagSet, source: &Path) -> CompileCommand {
    let mut cmd = flags.compile_driver.to_string_lossy().into_owned();
    if !flags.extra.is_empty() {
        cmd.push(' ');
        cmd.push_str(&flags.extra);
    }
    for define in &flags.defines {
        cmd.push_str(" -D");
        cmd.push_str(&define.name);
        if !define.value.is_empty() {
            cmd.push('=');
            cmd.push_str(&define.value);
        }
    }
    for input in &flags.include_paths {
        if let Input::Path(p) = input {
            cmd.push_str(" -I");
            cmd.push_str(&root.join(p).to_string_lossy());
        }
    }
    cmd.push_str(" -c ");
    cmd.push_str(&source.to_string_lossy());
    CompileCommand {
        command: cmd,
        file: source.to_string_lossy().into_owned(),
        directory: root.to_string_lossy().into_owned(),
    }
}

pub fn dump(path: &Path, entries: &[CompileCommand]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries).context("render compile_commands.json")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
