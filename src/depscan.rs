//! The dependency-scan cache: discovering a source file's transitive
//! include closure through the toolchain's dependency-emit mode, and caching
//! the resulting depfile content-addressed by the scan itself.

use crate::cache::Cache;
use crate::depfile;
use crate::errors::BuildError;
use crate::hash::{self, Fingerprint};
use crate::process;
use anyhow::{bail, Result};
use std::path::Path;

/// Computes the source-closure hash for `source`.
///
/// `scan_cmd` is the full scanner invocation with an `{out}` placeholder for
/// the depfile path.  The scan-key is the command string hash combined with
/// the source content hash; if `arts/<scan-key>` exists the cached depfile
/// is reused and the scanner is not invoked.  The result is the scan-key
/// combined with the ordered fold of the content hashes of every path the
/// depfile names.
pub fn source_closure(cache: &Cache, scan_cmd: &str, source: &Path) -> Result<Fingerprint> {
    let scan_key = hash::hash_str(scan_cmd).combine(hash::hash_file(source)?);
    if !cache.contains(scan_key) {
        let tmp = cache.fresh_tmp()?;
        let cmd = scan_cmd.replace("{out}", &process::quote_path(&tmp));
        let ok = process::run_shell(&cmd)?;
        if !ok || !tmp.exists() {
            bail!(BuildError::ScanFailed(source.display().to_string()));
        }
        cache.promote(scan_key, &tmp)?;
    }

    let deps = depfile::parse_file(&cache.path_of(scan_key))?;
    let mut deps_hash = Fingerprint::ZERO;
    for dep in &deps {
        deps_hash = deps_hash.combine(hash::hash_file(Path::new(dep))?);
    }
    Ok(scan_key.combine(deps_hash))
}
