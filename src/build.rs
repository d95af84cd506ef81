//! The `Build` context a configure script mutates: directories, options,
//! the step graph, and the execute entry point.
//!
//! Configuration is single-threaded and append-only; once `execute` starts
//! the graph is frozen and any further mutation is a `LateMutation` error.

use crate::cache::Cache;
use crate::cli;
use crate::compile_commands::{self, CompileCommand};
use crate::errors::BuildError;
use crate::flags::FlagSet;
use crate::graph::{
    inputs_hasher, Graph, HasherOpts, Input, StepCx, StepId, StepOptions,
};
use crate::hash::Fingerprint;
use crate::options::{OptionValue, Options};
use crate::plan;
use crate::progress::ConsoleProgress;
use crate::subproj;
use crate::terminal;
use crate::work::Work;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Process-environment intake, kept separate so tests can construct builds
/// against scratch directories without touching real environment variables.
pub struct BuildEnv {
    pub root: PathBuf,
    pub cache_prefix: Option<String>,
    pub install_prefix: Option<String>,
    pub cxx: Option<String>,
    pub cxxflags: Option<String>,
}

impl BuildEnv {
    pub fn from_process(root: PathBuf) -> BuildEnv {
        BuildEnv {
            root,
            cache_prefix: std::env::var("CACHE_PREFIX").ok(),
            install_prefix: std::env::var("INSTALL_PREFIX")
                .or_else(|_| std::env::var("PREFIX"))
                .ok(),
            cxx: std::env::var("CXX").ok(),
            cxxflags: std::env::var("CXXFLAGS").ok(),
        }
    }
}

#[derive(Debug)]
pub struct Build {
    pub(crate) graph: Graph,
    pub(crate) cache: Cache,
    pub(crate) progress: ConsoleProgress,
    root: PathBuf,
    prefix: PathBuf,
    options: Options,
    pub(crate) global_flags: FlagSet,
    pub(crate) static_link_tool: Option<PathBuf>,
    pub(crate) compile_commands: Vec<CompileCommand>,
    pub(crate) seen_sources: Vec<PathBuf>,
    pub(crate) jobs: Option<usize>,
    requested: Vec<String>,
    help: bool,
    dump_compile_commands: bool,
    export_steps: bool,
    frozen: bool,

    /// Aggregates every `install(...)` declaration; always phony.
    pub install_step: StepId,
    /// Depends on every declared target.
    pub build_all_step: StepId,
    /// Tokens after `--`, untouched by flag parsing.
    pub run_args: Vec<String>,
}

impl Build {
    pub fn new(argv: Vec<String>, env: BuildEnv) -> Result<Build> {
        let args = cli::parse(&argv)?;

        let root = if env.root.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            env.root
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve project root {}", root.display()))?;

        let cache_dir = root.join(env.cache_prefix.as_deref().unwrap_or(".cache"));
        let cache = Cache::open(&cache_dir)?;

        let prefix = root.join(env.install_prefix.as_deref().unwrap_or("build"));
        std::fs::create_dir_all(&prefix)
            .with_context(|| format!("create install prefix {}", prefix.display()))?;
        std::fs::write(prefix.join(".gitignore"), "*\n")
            .with_context(|| format!("write {}", prefix.join(".gitignore").display()))?;

        let mut options = Options::default();
        options.load_catalogue(&cache.options_path())?;
        for (key, value) in args.defines {
            options.set_value(key, value);
        }

        let mut global_flags = FlagSet::default();
        if let Some(cxx) = env.cxx {
            global_flags.compile_driver = cxx.into();
        }
        if let Some(cxxflags) = env.cxxflags {
            global_flags.extra = cxxflags;
        }

        let mut graph = Graph::default();
        let install_step = graph.add_step(StepOptions {
            name: "install".into(),
            desc: "Install targets".into(),
            phony: true,
            silent: true,
        });
        graph.set_hash_fn(
            install_step,
            inputs_hasher(HasherOpts {
                stable_id: "install-all".into(),
                ..Default::default()
            }),
        );
        let build_all_step = graph.add_step(StepOptions {
            name: "build".into(),
            desc: "Build all targets".into(),
            phony: false,
            silent: true,
        });

        let mut build = Build {
            graph,
            cache,
            // Export mode must keep stdout parseable: the manifest is the
            // only thing written.
            progress: ConsoleProgress::new(args.verbose, args.silent || args.export_steps),
            root,
            prefix,
            options,
            global_flags,
            static_link_tool: detect_static_link_tool(),
            compile_commands: Vec::new(),
            seen_sources: Vec::new(),
            jobs: args.jobs,
            requested: args.steps,
            help: args.help,
            dump_compile_commands: args.dump_compile_commands,
            export_steps: args.export_steps,
            frozen: false,
            install_step,
            build_all_step,
            run_args: args.run_args,
        };
        build.apply_builtin_options()?;
        Ok(build)
    }

    /// The pre-declared options every build understands, feeding the global
    /// flag set.
    fn apply_builtin_options(&mut self) -> Result<()> {
        use crate::flags::{Optimize, Standard};
        if let Some(driver) = self.option::<String>("compiler", "C++ compiler driver")? {
            self.global_flags.compile_driver = driver.into();
        }
        if let Some(level) =
            self.option::<String>("optimize", "Optimization level (O0..O3, Fast)")?
        {
            self.global_flags.optimize = match level.as_str() {
                "default" => Optimize::Default,
                "O0" => Optimize::O0,
                "O1" => Optimize::O1,
                "O2" => Optimize::O2,
                "O3" => Optimize::O3,
                "Fast" => Optimize::Fast,
                _ => bail!(BuildError::OptionParse {
                    key: "optimize".into(),
                    kind: "optimization level",
                    value: level,
                }),
            };
        }
        if let Some(std) = self.option::<String>("standard", "C++ standard (c++11..c++23)")? {
            self.global_flags.standard = match std.as_str() {
                "default" => Standard::Default,
                "c++11" => Standard::Cxx11,
                "c++14" => Standard::Cxx14,
                "c++17" => Standard::Cxx17,
                "c++20" => Standard::Cxx20,
                "c++23" => Standard::Cxx23,
                _ => bail!(BuildError::OptionParse {
                    key: "standard".into(),
                    kind: "C++ standard",
                    value: std,
                }),
            };
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The user-visible install prefix.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.root()
    }

    pub fn global_flags_mut(&mut self) -> &mut FlagSet {
        &mut self.global_flags
    }

    /// Tees progress lines into a buffer; test hook.
    pub fn capture_output(&mut self) -> std::sync::Arc<std::sync::Mutex<Vec<String>>> {
        self.progress.capture_lines()
    }

    pub(crate) fn check_mutable(&self, what: &str) -> Result<()> {
        if self.frozen {
            bail!(BuildError::LateMutation(what.to_string()));
        }
        Ok(())
    }

    /// Declares an option and reads its typed value if one was supplied with
    /// `-D`.  Newly declared keys are appended to the persisted catalogue so
    /// help can list them on later runs.
    pub fn option<T: OptionValue>(&mut self, key: &str, description: &str) -> Result<Option<T>> {
        self.check_mutable(&format!("option \"{}\"", key))?;
        let is_new = self
            .options
            .declare(key, description, &self.cache.options_path())?;
        if is_new {
            self.progress
                .note(&format!("bpp: new option -D{} :: {}", key, description));
        }
        match self.options.value(key) {
            None => Ok(None),
            Some(raw) => T::parse_opt(key, raw).map(Some),
        }
    }

    pub fn add_step(&mut self, opts: StepOptions) -> Result<StepId> {
        self.check_mutable(&format!("step \"{}\"", opts.name))?;
        Ok(self.graph.add_step(opts))
    }

    pub fn depend_on(&mut self, id: StepId, on: StepId) -> Result<()> {
        self.check_mutable("dependency")?;
        self.graph.depend(id, on);
        Ok(())
    }

    pub fn add_input_path(&mut self, id: StepId, path: impl Into<PathBuf>) -> Result<()> {
        self.check_mutable("input")?;
        self.graph.add_input(id, Input::Path(path.into()));
        Ok(())
    }

    pub fn add_input_step(
        &mut self,
        id: StepId,
        step: StepId,
        sub: Option<PathBuf>,
    ) -> Result<()> {
        self.check_mutable("input")?;
        self.graph.add_input(id, Input::Step { id: step, sub });
        Ok(())
    }

    /// Installs a caller-supplied hash closure; the caller is responsible
    /// for mixing in every externally read input.
    pub fn set_inputs_hash(
        &mut self,
        id: StepId,
        f: impl Fn(&StepCx, Fingerprint) -> Result<Fingerprint> + Send + Sync + 'static,
    ) -> Result<()> {
        self.check_mutable("hash closure")?;
        self.graph.set_hash(id, f);
        Ok(())
    }

    pub fn set_inputs_hasher(&mut self, id: StepId, opts: HasherOpts) -> Result<()> {
        self.check_mutable("hash closure")?;
        self.graph.set_hash_fn(id, inputs_hasher(opts));
        Ok(())
    }

    pub fn set_action(
        &mut self,
        id: StepId,
        f: impl Fn(&StepCx, &Path) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        self.check_mutable("action closure")?;
        self.graph.set_action(id, f);
        Ok(())
    }

    /// The execution-context view of this build; valid for closure use once
    /// the referenced steps have completed.
    pub fn step_cx(&self) -> StepCx<'_> {
        StepCx {
            graph: &self.graph,
            cache: &self.cache,
            root: &self.root,
            prefix: &self.prefix,
            progress: &self.progress,
        }
    }

    /// Ends the configure phase and runs the requested steps.  Returns the
    /// process exit code for success paths; fatal action failures abort the
    /// process from inside the worker pool.
    pub fn execute(mut self) -> Result<i32> {
        self.frozen = true;

        if self.export_steps {
            println!("{}", subproj::export_manifest(&self)?);
            return Ok(0);
        }
        if self.dump_compile_commands {
            compile_commands::dump(
                &self.root.join("compile_commands.json"),
                &self.compile_commands,
            )?;
        }
        if self.help {
            self.render_help();
            return Ok(0);
        }

        let roots = plan::resolve(&self.graph, &self.requested)?;
        let order = plan::plan(&self.graph, &roots)?;
        let jobs = self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)
        });
        let work = Work {
            graph: &self.graph,
            cache: &self.cache,
            root: &self.root,
            prefix: &self.prefix,
            progress: &self.progress,
        };
        work.run(order, jobs);
        Ok(0)
    }

    pub(crate) fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn merge_option_decl(&mut self, key: String, description: String) {
        self.options
            .insert_decl(crate::options::OptionDecl { key, description });
    }

    fn render_help(&self) {
        let s = terminal::stdout_style();
        let log = |line: String| self.progress.note(&line);
        log(format!(
            "{}{}bpp build tool{}",
            s.cyan(),
            s.bold(),
            s.reset()
        ));
        log("usage: <configure-binary> [flags...] [steps...] [-- run-args...]".into());
        log(format!("{}flags:{}", s.cyan(), s.reset()));
        log("  -h, --help               show this help".into());
        log("  -v, --verbose            print commands and up-to-date notices".into());
        log("  -s, --silent             suppress output except errors".into());
        log("  -j, --jobs N             parallel worker count".into());
        log("  --dump-compile-commands  write compile_commands.json".into());
        log(format!("{}options:{}", s.cyan(), s.reset()));
        for decl in self.options.decls() {
            log(format!("  -D{} :: {}", decl.key, decl.description));
        }
        log(format!("{}steps:{}", s.cyan(), s.reset()));
        for id in self.graph.ids() {
            let step = self.graph.step(id);
            if step.opts.silent && step.opts.desc.is_empty() {
                continue;
            }
            log(format!(
                "  {}{}{} :: {}",
                s.bold(),
                step.opts.name,
                s.reset(),
                step.opts.desc
            ));
        }
    }
}

/// Probes `PATH` for an archiver; static archiving is unavailable without
/// one.
fn detect_static_link_tool() -> Option<PathBuf> {
    for tool in ["llvm-ar", "ar"] {
        if let Some(path) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path) {
                let candidate = dir.join(tool);
                if candidate.is_file() {
                    return Some(PathBuf::from(tool));
                }
            }
        }
    }
    None
}
