//! Step factories for the toolchain: object compilation, executable
//! linkage, static archiving and shared-library linkage.
//!
//! A factory-produced step's hash closure mixes the source path string, the
//! source content hash, the merged flag-set hash, and the source-closure
//! hash obtained through the dependency-scan cache; its action assembles and
//! runs the canonical command.

use crate::build::Build;
use crate::depscan;
use crate::errors::BuildError;
use crate::flags::{FlagOverlay, FlagSet};
use crate::graph::{StepCx, StepId, StepOptions};
use crate::hash;
use crate::process;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub struct ObjOpts {
    pub source: PathBuf,
    pub flags: FlagOverlay,
}

pub struct Obj {
    pub step: StepId,
    pub source: PathBuf,
}

#[derive(Default)]
pub struct ExeOpts {
    pub name: String,
    pub desc: String,
    /// Flags for the per-source object steps.
    pub obj: FlagOverlay,
    /// Flags for the link step.
    pub link: FlagOverlay,
}

pub struct Exe {
    pub step: StepId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibKind {
    Static,
    Shared,
}

pub struct LibOpts {
    pub name: String,
    pub desc: String,
    pub obj: FlagOverlay,
    pub kind: LibKind,
}

pub struct Lib {
    pub step: StepId,
    pub name: String,
    pub kind: LibKind,
}

impl Lib {
    pub fn file_name(&self) -> String {
        match self.kind {
            LibKind::Static => format!("lib{}.a", self.name),
            LibKind::Shared => format!("lib{}.so", self.name),
        }
    }
}

fn render_compile(cx: &StepCx, flags: &FlagSet, source: &Path, out: &str) -> Result<String> {
    let mut cmd = flags.render_front(cx)?;
    cmd.push_str(" -c ");
    cmd.push_str(&process::quote_path(source));
    cmd.push_str(&flags.render_libs(cx)?);
    cmd.push_str(" -o ");
    cmd.push_str(out);
    Ok(cmd)
}

fn render_link(cx: &StepCx, flags: &FlagSet, inputs: &[PathBuf], out: &Path) -> Result<String> {
    let mut cmd = flags.render_front(cx)?;
    for input in inputs {
        cmd.push(' ');
        cmd.push_str(&process::quote_path(input));
    }
    cmd.push_str(&flags.render_libs(cx)?);
    cmd.push_str(" -o ");
    cmd.push_str(&process::quote_path(out));
    Ok(cmd)
}

fn run_action(cmd: &str) -> Result<()> {
    if !process::run_shell(cmd)? {
        bail!(BuildError::ActionFailed(cmd.to_string()));
    }
    Ok(())
}

impl Build {
    /// Compiles one source file into one object file.
    pub fn add_object(&mut self, opts: ObjOpts) -> Result<Obj> {
        self.add_object_inner(opts, false)
    }

    fn add_object_inner(&mut self, opts: ObjOpts, silent: bool) -> Result<Obj> {
        let name = opts.source.with_extension("o").to_string_lossy().into_owned();
        let desc = format!(
            "Object file for {}",
            opts.source
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let step = self.add_step(StepOptions {
            name,
            desc,
            phony: false,
            silent,
        })?;
        self.depend_on(self.build_all_step, step)?;

        let source = self.root().join(&opts.source);
        let flags = self.global_flags.overlay(&opts.flags);
        self.record_compile_command(&source, &flags);

        let (hash_source, hash_flags) = (source.clone(), flags.clone());
        self.set_inputs_hash(step, move |cx, h| {
            let mut h = h.combine(hash::hash_str(&hash_source.to_string_lossy()));
            h = h.combine(hash::hash_file(&hash_source)?);
            h = h.combine(hash_flags.fingerprint(cx)?);
            let scan_cmd = format!(
                "{} -M",
                render_compile(cx, &hash_flags, &hash_source, "{out}")?
            );
            h = h.combine(depscan::source_closure(cx.cache, &scan_cmd, &hash_source)?);
            Ok(h)
        })?;

        let (action_source, action_flags) = (source.clone(), flags);
        self.set_action(step, move |cx, out| {
            let cmd = render_compile(
                cx,
                &action_flags,
                &action_source,
                &process::quote_path(out),
            )?;
            cx.progress.command("compile", &cmd);
            run_action(&cmd)
        })?;

        Ok(Obj { step, source })
    }

    /// Links an executable from per-source object steps.
    pub fn add_executable(&mut self, opts: ExeOpts, sources: &[&str]) -> Result<Exe> {
        let step = self.add_step(StepOptions {
            name: opts.name.clone(),
            desc: opts.desc.clone(),
            phony: false,
            silent: false,
        })?;
        self.depend_on(self.build_all_step, step)?;
        for source in sources {
            let obj = self.add_object_inner(
                ObjOpts {
                    source: PathBuf::from(source),
                    flags: opts.obj.clone(),
                },
                true,
            )?;
            self.add_input_step(step, obj.step, None)?;
        }

        let link_flags = self.global_flags.overlay(&opts.link);
        let (name, desc) = (opts.name.clone(), opts.desc.clone());
        let hash_flags = link_flags.clone();
        self.set_inputs_hash(step, move |cx, h| {
            let mut h = h.combine(hash_flags.fingerprint(cx)?);
            h = h.combine(hash::hash_str(&name));
            h = h.combine(hash::hash_str(&desc));
            Ok(h)
        })?;
        self.set_action(step, move |cx, out| {
            let inputs = cx.inputs(step)?;
            let cmd = render_link(cx, &link_flags, &inputs, out)?;
            cx.progress.command("link", &cmd);
            run_action(&cmd)
        })?;

        Ok(Exe {
            step,
            name: opts.name,
        })
    }

    /// Builds a static archive or shared library from per-source objects.
    pub fn add_library(&mut self, opts: LibOpts, sources: &[&str]) -> Result<Lib> {
        if opts.kind == LibKind::Static && self.static_link_tool.is_none() {
            bail!(BuildError::ActionFailed(format!(
                "no archiver (llvm-ar or ar) found on PATH for static library \"{}\"",
                opts.name
            )));
        }
        let lib = Lib {
            step: StepId::from(0usize),
            name: opts.name.clone(),
            kind: opts.kind,
        };
        let step = self.add_step(StepOptions {
            name: lib.file_name(),
            desc: opts.desc.clone(),
            phony: false,
            silent: false,
        })?;
        self.depend_on(self.build_all_step, step)?;
        for source in sources {
            let obj = self.add_object_inner(
                ObjOpts {
                    source: PathBuf::from(source),
                    flags: opts.obj.clone(),
                },
                true,
            )?;
            self.add_input_step(step, obj.step, None)?;
        }

        let flags = self.global_flags.overlay(&opts.obj);
        let (name, desc, kind) = (opts.name.clone(), opts.desc.clone(), opts.kind);
        let hash_flags = flags.clone();
        self.set_inputs_hash(step, move |cx, h| {
            let mut h = h.combine(hash_flags.fingerprint(cx)?);
            h = h.combine(hash::hash_str(&name));
            h = h.combine(hash::hash_str(&desc));
            h = h.combine(crate::hash::Fingerprint(kind as u64));
            Ok(h)
        })?;

        let archiver = self.static_link_tool.clone();
        self.set_action(step, move |cx, out| {
            let inputs = cx.inputs(step)?;
            let cmd = match kind {
                LibKind::Static => {
                    let mut cmd = archiver
                        .as_ref()
                        .expect("checked at configure time")
                        .to_string_lossy()
                        .into_owned();
                    cmd.push_str(" rsc ");
                    cmd.push_str(&process::quote_path(out));
                    for input in &inputs {
                        cmd.push(' ');
                        cmd.push_str(&process::quote_path(input));
                    }
                    cmd
                }
                LibKind::Shared => {
                    let mut front = flags.render_front(cx)?;
                    front.push_str(" -shared");
                    let mut cmd = front;
                    for input in &inputs {
                        cmd.push(' ');
                        cmd.push_str(&process::quote_path(input));
                    }
                    cmd.push_str(&flags.render_libs(cx)?);
                    cmd.push_str(" -o ");
                    cmd.push_str(&process::quote_path(out));
                    cmd
                }
            };
            cx.progress.command("link", &cmd);
            run_action(&cmd)
        })?;

        Ok(Lib { step, ..lib })
    }

    /// Makes a target (an executable or library link step) wait on another
    /// step, including its object steps, so e.g. generated headers exist
    /// before compilation.
    pub fn depend_target_on(&mut self, target: StepId, other: StepId) -> Result<()> {
        self.check_mutable("dependency")?;
        let obj_steps: Vec<StepId> = self
            .graph
            .step(target)
            .inputs
            .iter()
            .filter_map(|input| match input {
                crate::graph::Input::Step { id, .. } => Some(*id),
                crate::graph::Input::Path(_) => None,
            })
            .collect();
        self.graph.depend(target, other);
        for obj in obj_steps {
            self.graph.depend(obj, other);
        }
        Ok(())
    }

    fn record_compile_command(&mut self, source: &Path, flags: &FlagSet) {
        // One entry per source; the first flag set wins.
        if self.seen_sources.iter().any(|s| s == source) {
            return;
        }
        self.seen_sources.push(source.to_path_buf());
        let entry = crate::compile_commands::entry_for(self.root(), flags, source);
        self.compile_commands.push(entry);
    }
}
