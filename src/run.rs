//! The engine entry point a configure binary calls from `main`.

use crate::bootstrap::{self, SelfCompile};
use crate::build::{Build, BuildEnv};
use crate::compile_commands::CompileCommand;
use crate::progress;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct EngineOpts {
    /// Enables the self-rebuild loop.  `None` disables it, e.g. while
    /// bootstrapping the very first binary by hand.
    pub self_compile: Option<SelfCompile>,
}

/// Runs one engine invocation: bootstrap, configure, plan, execute.
/// Returns the process exit code; the caller is expected to pass it to
/// `std::process::exit`.
pub fn run(
    opts: EngineOpts,
    configure: impl FnOnce(&mut Build) -> Result<()>,
) -> i32 {
    match run_impl(opts, configure) {
        Ok(code) => code,
        Err(err) => {
            progress::diagnostic(&err);
            1
        }
    }
}

fn run_impl(
    opts: EngineOpts,
    configure: impl FnOnce(&mut Build) -> Result<()>,
) -> Result<i32> {
    let argv: Vec<String> = std::env::args().collect();
    let exe = PathBuf::from(&argv[0]);
    let root = match exe.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut build = Build::new(argv.clone(), BuildEnv::from_process(root))?;

    if let Some(sc) = &opts.self_compile {
        bootstrap::ensure_current(&build.cache, &build.progress, sc, &exe, &argv)?;
        build.compile_commands.insert(
            0,
            CompileCommand {
                command: format!("{} {}", sc.compile_cmd, sc.source.display()),
                file: sc.source.display().to_string(),
                directory: build.root().display().to_string(),
            },
        );
    }

    configure(&mut build).context("configure script failed")?;
    build.execute()
}
