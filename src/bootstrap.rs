//! The self-rebuild loop: keep the configure binary current with its own
//! source.
//!
//! Before configure runs, the source closure of the configure script is
//! hashed (through the dependency-scan cache) and compared with the value
//! stored on the last successful recompile.  On mismatch the binary is
//! recompiled in place and the process replaced with the new image, carrying
//! the original arguments.  The new hash is written *before* recompiling so
//! a failed recompile cannot loop.

use crate::cache::Cache;
use crate::depscan;
use crate::errors::BuildError;
use crate::hash::Fingerprint;
use crate::process;
use crate::progress::ConsoleProgress;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// How this configure binary is rebuilt from source.  Both commands are
/// build-time constants supplied by the configure script; `scan_cmd` is the
/// toolchain's dependency-emit invocation with an `{out}` placeholder for
/// the depfile.
pub struct SelfCompile {
    pub source: PathBuf,
    pub compile_cmd: String,
    pub scan_cmd: String,
}

/// Checks the configure source closure against the stored hash and, on
/// mismatch, recompiles and replaces the running process.  Returns only when
/// the binary is already current.
pub fn ensure_current(
    cache: &Cache,
    progress: &ConsoleProgress,
    sc: &SelfCompile,
    exe: &Path,
    argv: &[String],
) -> Result<()> {
    let fresh = depscan::source_closure(cache, &sc.scan_cmd, &sc.source)?;
    if stored_hash(cache) == Some(fresh) {
        return Ok(());
    }
    recompile_and_exec(cache, progress, sc, exe, argv, fresh)
}

pub(crate) fn stored_hash(cache: &Cache) -> Option<Fingerprint> {
    std::fs::read_to_string(cache.self_hash_path())
        .ok()
        .and_then(|text| Fingerprint::parse(&text))
}

fn recompile_and_exec(
    cache: &Cache,
    progress: &ConsoleProgress,
    sc: &SelfCompile,
    exe: &Path,
    argv: &[String],
    fresh: Fingerprint,
) -> Result<()> {
    // The new hash is stored before the compile runs; the failure paths
    // below delete it again.
    std::fs::write(cache.self_hash_path(), fresh.to_string())
        .with_context(|| format!("write {}", cache.self_hash_path().display()))?;

    progress.note("bpp: recompiling configure binary, source changed");
    let cmd = format!(
        "{} {} -o {}",
        sc.compile_cmd,
        process::quote_path(&sc.source),
        process::quote_path(exe)
    );
    progress.command("recompile", &cmd);
    let compiled = process::run_shell(&cmd).unwrap_or(false);
    if !compiled {
        let _ = std::fs::remove_file(cache.self_hash_path());
        bail!(BuildError::RecompileFailed);
    }

    exec_replace(exe, argv);
    // exec only returns on failure; force re-evaluation next run.
    let _ = std::fs::remove_file(cache.self_hash_path());
    bail!(BuildError::RecompileFailed);
}

#[cfg(unix)]
fn exec_replace(exe: &Path, argv: &[String]) {
    use std::os::unix::process::CommandExt;
    let err = std::process::Command::new(exe).args(&argv[1..]).exec();
    crate::progress::diagnostic(&anyhow::anyhow!(
        "exec {} failed: {}",
        exe.display(),
        err
    ));
}

#[cfg(not(unix))]
fn exec_replace(_exe: &Path, _argv: &[String]) {}
