//! Subprojects as recursive engine invocations.
//!
//! A subproject is another configure binary.  At configure time the parent
//! runs it with the hidden `--export-steps` flag and imports the JSON
//! manifest of its declared steps and options; each imported step becomes a
//! phony delegating step whose action re-invokes the child binary with the
//! cache shared and the install prefix nested under the parent's.  The
//! child does its own up-to-date checking against the shared cache.

use crate::build::Build;
use crate::errors::BuildError;
use crate::graph::{StepId, StepOptions};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Serialize, Deserialize)]
pub struct StepExport {
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OptionExport {
    pub key: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub steps: Vec<StepExport>,
    pub options: Vec<OptionExport>,
}

pub struct SubProject {
    pub name: String,
    pub dir: PathBuf,
    /// Imported delegating steps, named `<subproject>/<step>`.
    pub steps: Vec<(String, StepId)>,
}

/// Renders the `--export-steps` manifest of a configured build.
pub fn export_manifest(build: &Build) -> Result<String> {
    let mut steps = Vec::new();
    for id in build.graph.ids() {
        let step = build.graph.step(id);
        if step.opts.silent {
            continue;
        }
        steps.push(StepExport {
            name: step.opts.name.clone(),
            desc: step.opts.desc.clone(),
        });
    }
    let options = build
        .options()
        .decls()
        .map(|decl| OptionExport {
            key: decl.key.clone(),
            description: decl.description.clone(),
        })
        .collect();
    serde_json::to_string_pretty(&Manifest { steps, options }).context("render step manifest")
}

impl Build {
    /// Imports a subproject whose configure binary lives at `binary`
    /// (relative to the project root) and runs in `dir`.
    pub fn add_subproject(
        &mut self,
        name: &str,
        dir: impl AsRef<Path>,
        binary: impl AsRef<Path>,
    ) -> Result<SubProject> {
        self.check_mutable(&format!("subproject \"{}\"", name))?;
        let dir = self.root().join(dir.as_ref());
        let binary = self.root().join(binary.as_ref());
        let child_prefix = self.prefix().join(name);
        std::fs::create_dir_all(&child_prefix)
            .with_context(|| format!("create {}", child_prefix.display()))?;

        let output = Command::new(&binary)
            .arg("--export-steps")
            .current_dir(&dir)
            .env("CACHE_PREFIX", self.cache_dir())
            .env("INSTALL_PREFIX", &child_prefix)
            .output()
            .with_context(|| format!("run subproject configure {}", binary.display()))?;
        if !output.status.success() {
            bail!(BuildError::ActionFailed(format!(
                "subproject \"{}\" --export-steps exited with {}",
                name, output.status
            )));
        }
        let manifest: Manifest = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parse step manifest of subproject \"{}\"", name))?;

        for option in manifest.options {
            self.merge_option_decl(option.key, option.description);
        }

        let mut steps = Vec::new();
        for exported in manifest.steps {
            let step = self.add_step(StepOptions {
                name: format!("{}/{}", name, exported.name),
                desc: exported.desc,
                phony: true,
                silent: false,
            })?;
            let (binary, dir, cache, prefix) = (
                binary.clone(),
                dir.clone(),
                self.cache_dir().to_path_buf(),
                child_prefix.clone(),
            );
            let child_step = exported.name.clone();
            let jobs = self.jobs;
            self.set_action(step, move |cx, _out| {
                let mut cmd = Command::new(&binary);
                cmd.arg(&child_step)
                    .current_dir(&dir)
                    .env("CACHE_PREFIX", &cache)
                    .env("INSTALL_PREFIX", &prefix);
                if let Some(jobs) = jobs {
                    cmd.arg("-j").arg(jobs.to_string());
                }
                cx.progress
                    .command("subproject", &format!("{} {}", binary.display(), child_step));
                let status = cmd
                    .status()
                    .with_context(|| format!("run subproject {}", binary.display()))?;
                if !status.success() {
                    bail!(BuildError::ActionFailed(format!(
                        "subproject step \"{}\" exited with {}",
                        child_step, status
                    )));
                }
                Ok(())
            })?;
            steps.push((exported.name, step));
        }

        Ok(SubProject { name: name.to_string(), dir, steps })
    }
}
