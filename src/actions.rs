//! External action steps: file wrapping, fetch-by-URL, archive unpacking,
//! installation and run steps.  The engine contributes each step's hash
//! closure and atomic promotion; the heavy lifting is an opaque subprocess.

use crate::build::Build;
use crate::errors::BuildError;
use crate::graph::{HasherOpts, Input, StepId, StepOptions};
use crate::hash::{self, Fingerprint};
use crate::process;
use crate::toolchain::{Exe, Lib};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct RunOptions {
    pub name: String,
    pub desc: String,
    pub working_dir: PathBuf,
    pub ld_library_paths: Vec<PathBuf>,
    pub args: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> RunOptions {
        RunOptions {
            name: String::new(),
            desc: String::new(),
            working_dir: PathBuf::from("."),
            ld_library_paths: Vec::new(),
            args: Vec::new(),
        }
    }
}

impl Build {
    /// Wraps a plain source file as a step so it can serve as an input edge.
    /// Its fingerprint is the file's content hash; its artifact is a copy.
    pub fn add_file(&mut self, src: impl Into<PathBuf>) -> Result<Input> {
        let src = src.into();
        let step = self.add_step(StepOptions {
            name: format!("file-{}", src.display()),
            desc: format!("File {}", src.display()),
            phony: false,
            silent: true,
        })?;
        let abs = self.root().join(&src);
        let hash_abs = abs.clone();
        self.set_inputs_hash(step, move |_cx, _h| hash::hash_file(&hash_abs))?;
        self.set_action(step, move |_cx, out| {
            std::fs::copy(&abs, out)
                .with_context(|| format!("copy {} to {}", abs.display(), out.display()))?;
            Ok(())
        })?;
        Ok(Input::Step { id: step, sub: None })
    }

    /// Downloads a URL into the cache.  The step's fingerprint is the
    /// caller-supplied expected content fingerprint, so the artifact is
    /// immutable by contract; after download the content is re-hashed and a
    /// disagreement fails the build.
    pub fn fetch_url(&mut self, name: &str, url: &str, expected: Fingerprint) -> Result<StepId> {
        let step = self.add_step(StepOptions {
            name: name.to_string(),
            desc: format!("Fetch {}", url),
            phony: false,
            silent: false,
        })?;
        self.set_inputs_hash(step, move |_cx, _h| Ok(expected))?;
        let url = url.to_string();
        self.set_action(step, move |cx, out| {
            let cmd = format!(
                "curl --silent -L {} -o {}",
                process::quote(&url),
                process::quote_path(out)
            );
            cx.progress.command("fetch", &cmd);
            if !process::run_shell(&cmd)? {
                bail!(BuildError::ActionFailed(cmd));
            }
            verify_fetched(out, expected)
        })?;
        Ok(step)
    }

    /// Extracts an upstream step's archive artifact into a directory,
    /// stripping the customary single leading path component.
    pub fn unpack_archive(&mut self, name: &str, archive: StepId) -> Result<StepId> {
        let upstream = self.graph.step(archive).opts.name.clone();
        let step = self.add_step(StepOptions {
            name: name.to_string(),
            desc: format!("Unpack {}", upstream),
            phony: false,
            silent: false,
        })?;
        self.add_input_step(step, archive, None)?;
        self.set_inputs_hasher(
            step,
            HasherOpts {
                stable_id: format!("unpack-{}", upstream),
                ..Default::default()
            },
        )?;
        self.set_action(step, move |cx, out| {
            std::fs::create_dir_all(out)
                .with_context(|| format!("create {}", out.display()))?;
            let inputs = cx.inputs(step)?;
            let archive_path = &inputs[0];
            let cmd = format!(
                "tar -xf {} -C {} --strip-components=1",
                process::quote_path(archive_path),
                process::quote_path(out)
            );
            cx.progress.command("unpack", &cmd);
            if !process::run_shell(&cmd)? {
                bail!(BuildError::ActionFailed(cmd));
            }
            Ok(())
        })?;
        Ok(step)
    }

    /// Copies a step's artifact to `dst` under the install prefix.  The
    /// step's own artifact is a marker keyed to the destination path, so a
    /// prior install short-circuits without probing the destination.
    pub fn install(&mut self, target: StepId, dst: impl AsRef<Path>) -> Result<StepId> {
        let target_name = self.graph.step(target).opts.name.clone();
        let step = self.add_step(StepOptions {
            name: format!("install-{}", target_name),
            desc: format!("Installs {}", target_name),
            phony: false,
            silent: true,
        })?;
        let dst = self.prefix().join(dst.as_ref());
        self.add_input_step(step, target, None)?;
        self.add_input_step(self.install_step, step, None)?;
        self.set_inputs_hasher(
            step,
            HasherOpts {
                stable_id: format!("install-{}", target_name),
                strings: vec![dst.to_string_lossy().into_owned()],
                ..Default::default()
            },
        )?;
        self.set_action(step, move |cx, out| {
            let inputs = cx.inputs(step)?;
            let src = &inputs[0];
            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            copy_recursive(src, &dst)?;
            std::fs::write(out, dst.to_string_lossy().as_bytes())
                .with_context(|| format!("write install marker {}", out.display()))?;
            Ok(())
        })?;
        Ok(step)
    }

    pub fn install_exe(&mut self, exe: &Exe) -> Result<StepId> {
        self.install(exe.step, Path::new("bin").join(&exe.name))
    }

    pub fn install_lib(&mut self, lib: &Lib) -> Result<StepId> {
        self.install(lib.step, Path::new("lib").join(lib.file_name()))
    }

    /// Copies headers under `<prefix>/include/<sub>` right away; header
    /// installation has no build inputs, so it is not modeled as a step.
    pub fn install_headers(&mut self, headers: &[&str], sub: impl AsRef<Path>) -> Result<()> {
        self.check_mutable("header installation")?;
        for header in headers {
            let from = self.root().join(header);
            let to = self.prefix().join("include").join(sub.as_ref()).join(header);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            std::fs::copy(&from, &to)
                .with_context(|| format!("install header {}", from.display()))?;
        }
        Ok(())
    }

    /// Runs a built executable.  Phony: the program runs every time the step
    /// is scheduled.
    pub fn add_run_exe(&mut self, exe: &Exe, opts: RunOptions) -> Result<StepId> {
        let step = self.add_step(StepOptions {
            name: opts.name.clone(),
            desc: opts.desc.clone(),
            phony: true,
            silent: false,
        })?;
        self.add_input_step(step, exe.step, None)?;
        let working_dir = self.root().join(&opts.working_dir);
        self.set_action(step, move |cx, _out| {
            let inputs = cx.inputs(step)?;
            let binary = &inputs[0];
            let mut cmd = format!("cd {} && ", process::quote_path(&working_dir));
            if !opts.ld_library_paths.is_empty() {
                cmd.push_str("LD_LIBRARY_PATH=");
                for path in &opts.ld_library_paths {
                    cmd.push_str(&path.to_string_lossy());
                    cmd.push(':');
                }
                cmd.push_str("\"$LD_LIBRARY_PATH\" ");
            }
            cmd.push_str(&process::quote_path(binary));
            for arg in &opts.args {
                cmd.push(' ');
                cmd.push_str(&process::quote(arg));
            }
            cx.progress.command("run", &cmd);
            if !process::run_shell(&cmd)? {
                bail!(BuildError::ActionFailed(cmd));
            }
            Ok(())
        })?;
        Ok(step)
    }
}

pub(crate) fn verify_fetched(path: &Path, expected: Fingerprint) -> Result<()> {
    let actual = hash::hash_entry(path)?;
    if actual != expected {
        bail!(BuildError::HashMismatch { expected, actual });
    }
    Ok(())
}

/// Copies a file, or a directory tree recursively, onto `dst`.
pub(crate) fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        for entry in walkdir::WalkDir::new(src) {
            let entry = entry.with_context(|| format!("walk {}", src.display()))?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .expect("walkdir yields paths under its root");
            let to = dst.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&to)
                    .with_context(|| format!("create {}", to.display()))?;
            } else {
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                std::fs::copy(entry.path(), &to).with_context(|| {
                    format!("copy {} to {}", entry.path().display(), to.display())
                })?;
            }
        }
    } else {
        std::fs::copy(src, dst)
            .with_context(|| format!("copy {} to {}", src.display(), dst.display()))?;
    }
    Ok(())
}
