//! The 64-bit fingerprint primitive and content hashing over strings, files
//! and directories.
//!
//! A fingerprint identifies a step's output and doubles as its cache
//! filename.  Two composition operators exist: `combine` is an ordered
//! FNV-style mix (non-commutative), `combine_unordered` is a wrapping add
//! (commutative and associative), used where dependency order must not
//! matter.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

const FNV_OFFSET: u64 = 0xCBF2_9CE4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

/// Content-derived identity of a step's output.  Zero is an ordinary value,
/// not a sentinel; in particular it is the hash of an empty file.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub const ZERO: Fingerprint = Fingerprint(0);

    /// Ordered composition: `a.combine(b) != b.combine(a)` in general.
    #[must_use]
    pub fn combine(self, other: Fingerprint) -> Fingerprint {
        let mut h = FNV_OFFSET;
        h ^= self.0;
        h = h.wrapping_mul(FNV_PRIME);
        h ^= other.0;
        h = h.wrapping_mul(FNV_PRIME);
        Fingerprint(h)
    }

    /// Unordered composition: commutative and associative, overflow wraps.
    #[must_use]
    pub fn combine_unordered(self, other: Fingerprint) -> Fingerprint {
        Fingerprint(self.0.wrapping_add(other.0))
    }

    /// Parses the decimal form used in cache filenames and state files.
    pub fn parse(text: &str) -> Option<Fingerprint> {
        text.trim().parse::<u64>().ok().map(Fingerprint)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hashes a string by folding `combine` over its bytes.
pub fn hash_str(s: &str) -> Fingerprint {
    s.bytes()
        .fold(Fingerprint::ZERO, |h, b| h.combine(Fingerprint(b as u64)))
}

fn file_memo() -> &'static Mutex<HashMap<PathBuf, Fingerprint>> {
    static MEMO: OnceLock<Mutex<HashMap<PathBuf, Fingerprint>>> = OnceLock::new();
    MEMO.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Drops all memoized file hashes.  File hashes are cached for the process
/// lifetime, which assumes one build invocation per process; an embedder
/// that drives several invocations from one process must call this between
/// them so edited files are re-read.
pub fn reset_file_memo() {
    file_memo().lock().unwrap().clear();
}

/// Hashes a file's contents, memoized per canonicalized path for the
/// process lifetime.  Hashing is I/O bound, so a single lock around the
/// memo table is not a contention concern.
pub fn hash_file(path: &Path) -> Result<Fingerprint> {
    let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if let Some(&fp) = file_memo().lock().unwrap().get(&key) {
        return Ok(fp);
    }
    let fp = hash_file_contents(&key)?;
    file_memo().lock().unwrap().insert(key, fp);
    Ok(fp)
}

const CHUNK: usize = 32 * 1024;

/// Folds `combine` over the file interpreted as little-endian 64-bit lanes;
/// trailing bytes that do not fill a lane are mixed in individually.  The
/// byte order is fixed so fingerprints agree across architectures.  An empty
/// file hashes to `Fingerprint::ZERO`.
fn hash_file_contents(path: &Path) -> Result<Fingerprint> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("open {} for hashing", path.display()))?;
    let mut buf = [0u8; CHUNK];
    let mut filled = 0;
    let mut h = Fingerprint::ZERO;
    loop {
        let n = file
            .read(&mut buf[filled..])
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            // CHUNK is a multiple of 8, so full buffers never split a lane.
            h = fold_lanes(h, &buf);
            filled = 0;
        }
    }
    if filled > 0 {
        h = fold_lanes(h, &buf[..filled]);
    }
    Ok(h)
}

fn fold_lanes(mut h: Fingerprint, bytes: &[u8]) -> Fingerprint {
    let mut lanes = bytes.chunks_exact(8);
    for lane in &mut lanes {
        h = h.combine(Fingerprint(u64::from_le_bytes(lane.try_into().unwrap())));
    }
    for &b in lanes.remainder() {
        h = h.combine(Fingerprint(b as u64));
    }
    h
}

/// Hashes a directory: every regular file below it contributes
/// `combine(hash(relative path), hash(contents))`, folded with
/// `combine_unordered` after sorting the relative paths lexicographically.
/// The sort makes the result independent of filesystem enumeration order.
pub fn hash_dir(dir: &Path) -> Result<Fingerprint> {
    let mut rels: Vec<String> = Vec::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(dir)
                .expect("walkdir yields paths under its root");
            rels.push(
                rel.iter()
                    .map(|c| c.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
    }
    rels.sort();
    let mut h = Fingerprint::ZERO;
    for rel in &rels {
        let full = dir.join(rel);
        h = h.combine_unordered(hash_str(rel).combine(hash_file(&full)?));
    }
    Ok(h)
}

/// Hashes a filesystem entry: directories recursively, files by content.
pub fn hash_entry(path: &Path) -> Result<Fingerprint> {
    if path.is_dir() {
        hash_dir(path)
    } else {
        hash_file(path)
    }
}
