//! Support code for e2e tests: a tempdir workspace and an in-process engine
//! invocation helper.

use anyhow::Result;
use bpp::build::{Build, BuildEnv};
use std::path::{Path, PathBuf};

/// A stand-in compiler.  `-M` emits a depfile listing the source plus every
/// `#include "..."` it names; `-c` "compiles" by concatenating the source
/// with its headers; otherwise it "links" by concatenating its inputs.
/// Compile and link invocations are appended to `<script>.log`.
pub const STUB_CC: &str = r#"#!/bin/sh
set -e
log="$0.log"
out=""
srcs=""
has_m=0
has_c=0
expect_out=0
for a in "$@"; do
  if [ "$expect_out" = 1 ]; then out="$a"; expect_out=0; continue; fi
  case "$a" in
    -M) has_m=1 ;;
    -c) has_c=1 ;;
    -o) expect_out=1 ;;
    -*) ;;
    *) srcs="$srcs $a" ;;
  esac
done
deps=""
for s in $srcs; do
  dir=$(dirname "$s")
  for h in $(sed -n 's/^#include "\(.*\)"$/\1/p' "$s"); do
    deps="$deps $dir/$h"
  done
done
if [ "$has_m" = 1 ]; then
  printf 'obj:%s%s\n' "$srcs" "$deps" > "$out"
elif [ "$has_c" = 1 ]; then
  cat $srcs $deps > "$out"
  echo "compile$srcs" >> "$log"
else
  cat $srcs > "$out"
  echo "link" >> "$log"
fi
"#;

/// Manages a temporary project directory for engine invocations.
pub struct TestSpace {
    dir: tempfile::TempDir,
    root: PathBuf,
}

impl TestSpace {
    pub fn new() -> Result<TestSpace> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().canonicalize()?;
        Ok(TestSpace { dir, root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, path: &str, content: &str) -> Result<PathBuf> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;
        Ok(full)
    }

    /// Writes a shell script and marks it executable.
    pub fn write_executable(&self, path: &str, content: &str) -> Result<PathBuf> {
        let full = self.write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&full, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(full)
    }

    pub fn read(&self, path: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.root.join(path))?)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    /// Lines the stub compiler logged so far.
    pub fn cc_log(&self, cc: &Path) -> Vec<String> {
        std::fs::read_to_string(format!("{}.log", cc.display()))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn artifact_count(&self) -> usize {
        std::fs::read_dir(self.root.join(".cache/arts"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Keep the tempdir alive even if a child process still points at it.
    pub fn leak(self) -> PathBuf {
        let root = self.root.clone();
        std::mem::forget(self.dir);
        root
    }
}

pub fn build_env(space: &TestSpace, cxx: Option<&Path>) -> BuildEnv {
    BuildEnv {
        root: space.path().to_path_buf(),
        cache_prefix: None,
        install_prefix: None,
        cxx: cxx.map(|p| p.to_string_lossy().into_owned()),
        cxxflags: None,
    }
}

/// One in-process engine invocation: fresh `Build`, configure, execute.
/// Returns the exit code and the captured progress lines.
pub fn run_build(
    space: &TestSpace,
    cxx: Option<&Path>,
    args: &[&str],
    configure: impl FnOnce(&mut Build) -> Result<()>,
) -> Result<(i32, Vec<String>)> {
    // Each invocation models a fresh process.
    bpp::hash::reset_file_memo();
    let mut argv = vec!["bpp-test".to_string()];
    argv.extend(args.iter().map(|s| s.to_string()));
    let mut build = Build::new(argv, build_env(space, cxx))?;
    let lines = build.capture_output();
    configure(&mut build)?;
    let code = build.execute()?;
    let lines = lines.lock().unwrap().clone();
    Ok((code, lines))
}

pub fn assert_contains(lines: &[String], needle: &str) {
    assert!(
        lines.iter().any(|line| line.contains(needle)),
        "expected a line containing {:?} in:\n{}",
        needle,
        lines.join("\n")
    );
}

pub fn assert_not_contains(lines: &[String], needle: &str) {
    assert!(
        !lines.iter().any(|line| line.contains(needle)),
        "expected no line containing {:?} in:\n{}",
        needle,
        lines.join("\n")
    );
}
