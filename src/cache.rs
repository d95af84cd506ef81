//! The content-addressed artifact store.
//!
//! `arts/` maps a stringified fingerprint to one immutable filesystem entry
//! (file or directory); `tmp/` receives in-progress outputs and is wiped at
//! startup.  Promotion from tmp to arts is a single rename, so an artifact
//! either exists completely or not at all.

use crate::errors::BuildError;
use crate::hash::Fingerprint;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

#[derive(Debug)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Opens (creating if needed) the cache at `root`.  `tmp/` is emptied;
    /// existing artifacts are kept.  A `.gitignore` covering the whole tree
    /// is written so the cache never shows up in version control.
    pub fn open(root: &Path) -> Result<Cache> {
        std::fs::create_dir_all(root.join("arts"))
            .map_err(|err| cache_io("create", &root.join("arts"), err))?;
        let tmp = root.join("tmp");
        match std::fs::remove_dir_all(&tmp) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(cache_io("wipe", &tmp, err).into()),
        }
        std::fs::create_dir_all(&tmp).map_err(|err| cache_io("create", &tmp, err))?;
        std::fs::write(root.join(".gitignore"), "*\n")
            .map_err(|err| cache_io("write", &root.join(".gitignore"), err))?;
        Ok(Cache {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The canonical artifact path for a fingerprint.  Existence implies the
    /// artifact is complete and up to date.
    pub fn path_of(&self, fp: Fingerprint) -> PathBuf {
        self.root.join("arts").join(fp.to_string())
    }

    pub fn contains(&self, fp: Fingerprint) -> bool {
        self.path_of(fp).exists()
    }

    /// Mints a tmp path no other caller holds, by uniform 64-bit sampling
    /// until a free name is found.
    pub fn fresh_tmp(&self) -> Result<PathBuf> {
        loop {
            let path = self.root.join("tmp").join(random_u64().to_string());
            if !path.exists() {
                return Ok(path);
            }
        }
    }

    /// Atomically moves a finished tmp entry to `arts/<fp>`.  If the target
    /// already exists the existing entry is authoritative and the tmp copy
    /// is discarded.
    pub fn promote(&self, fp: Fingerprint, tmp: &Path) -> Result<()> {
        let dst = self.path_of(fp);
        if dst.exists() {
            discard(tmp);
            return Ok(());
        }
        match std::fs::rename(tmp, &dst) {
            Ok(()) => Ok(()),
            Err(_) if dst.exists() => {
                // Lost a promotion race; same content by construction.
                discard(tmp);
                Ok(())
            }
            Err(err) => bail!(BuildError::CacheIo(format!(
                "promote {} to {}: {}",
                tmp.display(),
                dst.display(),
                err
            ))),
        }
    }

    /// The file recording the configure-script source-closure fingerprint of
    /// the last successful self-recompile.
    pub fn self_hash_path(&self) -> PathBuf {
        self.root.join("bpp.hash")
    }

    /// The accumulated `key :: description` catalogue of options declared on
    /// past runs.
    pub fn options_path(&self) -> PathBuf {
        self.root.join("bpp.options")
    }
}

fn cache_io(what: &str, path: &Path, err: std::io::Error) -> BuildError {
    BuildError::CacheIo(format!("{} {}: {}", what, path.display(), err))
}

fn discard(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    // A leftover under tmp/ is wiped on the next startup anyway.
    result
        .with_context(|| format!("discard {}", path.display()))
        .ok();
}

/// splitmix64 over a seed drawn from std's randomly-keyed hasher; the pack of
/// crates this engine builds on carries no RNG, and tmp names only need to
/// not collide.
fn random_u64() -> u64 {
    use std::hash::{BuildHasher, Hasher};
    static SEED: OnceLock<u64> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seed = *SEED.get_or_init(|| {
        std::collections::hash_map::RandomState::new()
            .build_hasher()
            .finish()
    });
    let mut z = seed
        .wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
