//! The step graph: node data, edges, hash/action closures and the
//! completion latch workers synchronize on.

use crate::cache::Cache;
use crate::densemap::{self, DenseMap};
use crate::hash::{self, Fingerprint};
use crate::progress::ConsoleProgress;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

/// Stable integer identity of a step.  Edges are stored as id lists, never
/// pointers, so the arena may grow freely during configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepId(u32);

impl densemap::Index for StepId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for StepId {
    fn from(u: usize) -> StepId {
        StepId(u as u32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub name: String,
    pub desc: String,
    /// Phony steps never consult the cache; they always run when scheduled.
    pub phony: bool,
    /// Silent steps produce no progress lines.
    pub silent: bool,
}

/// An input edge: a concrete path, or another step whose artifact this step
/// consumes.  A step reference may carry a sub-path into a directory
/// artifact.
#[derive(Clone, Debug)]
pub enum Input {
    Path(PathBuf),
    Step { id: StepId, sub: Option<PathBuf> },
}

pub type HashFn = Box<dyn Fn(&StepCx, Fingerprint) -> Result<Fingerprint> + Send + Sync>;
pub type ActionFn = Box<dyn Fn(&StepCx, &Path) -> Result<()> + Send + Sync>;

pub struct Step {
    pub opts: StepOptions,
    /// Steps that must complete first but whose artifacts are not consumed.
    pub deps: Vec<StepId>,
    pub inputs: Vec<Input>,
    pub(crate) hash: HashFn,
    pub(crate) action: ActionFn,
    pub(crate) latch: Latch,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("opts", &self.opts)
            .field("deps", &self.deps)
            .field("inputs", &self.inputs)
            .field("latch", &self.latch)
            .finish()
    }
}

impl Step {
    fn new(opts: StepOptions) -> Step {
        Step {
            opts,
            deps: Vec::new(),
            inputs: Vec::new(),
            hash: Box::new(|_, h| Ok(h)),
            action: Box::new(|_, _| Ok(())),
            latch: Latch::new(),
        }
    }
}

/// One-shot completion gate.  Completing a step publishes its fingerprint in
/// the same event, so a waiter that wakes up may immediately read it; this
/// is the ordering the executor relies on.  Waiting blocks on a condition
/// variable, never spins.
#[derive(Debug)]
pub struct Latch {
    state: Mutex<Option<Fingerprint>>,
    cond: Condvar,
}

impl Latch {
    fn new() -> Latch {
        Latch {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn complete(&self, fp: Fingerprint) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.is_none(), "step completed twice");
        *state = Some(fp);
        self.cond.notify_all();
    }

    pub fn get(&self) -> Option<Fingerprint> {
        *self.state.lock().unwrap()
    }

    pub fn wait(&self) -> Fingerprint {
        let mut state = self.state.lock().unwrap();
        while state.is_none() {
            state = self.cond.wait(state).unwrap();
        }
        state.unwrap()
    }
}

#[derive(Default)]
#[derive(Debug)]
pub struct Graph {
    steps: DenseMap<StepId, Step>,
}

impl Graph {
    pub fn add_step(&mut self, opts: StepOptions) -> StepId {
        self.steps.push(Step::new(opts))
    }

    pub fn step(&self, id: StepId) -> &Step {
        self.steps.get(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = StepId> {
        self.steps.keys()
    }

    /// All steps carrying the given name, in insertion order.
    pub fn lookup(&self, name: &str) -> Vec<StepId> {
        self.ids()
            .filter(|&id| self.step(id).opts.name == name)
            .collect()
    }

    pub fn depend(&mut self, id: StepId, on: StepId) {
        self.steps.get_mut(id).deps.push(on);
    }

    pub fn add_input(&mut self, id: StepId, input: Input) {
        self.steps.get_mut(id).inputs.push(input);
    }

    pub fn set_hash(
        &mut self,
        id: StepId,
        f: impl Fn(&StepCx, Fingerprint) -> Result<Fingerprint> + Send + Sync + 'static,
    ) {
        self.steps.get_mut(id).hash = Box::new(f);
    }

    pub fn set_hash_fn(&mut self, id: StepId, f: HashFn) {
        self.steps.get_mut(id).hash = f;
    }

    pub fn set_action(
        &mut self,
        id: StepId,
        f: impl Fn(&StepCx, &Path) -> Result<()> + Send + Sync + 'static,
    ) {
        self.steps.get_mut(id).action = Box::new(f);
    }
}

/// The view hash and action closures get of the running build: the frozen
/// graph, the cache, and the project directories.  Resolution of step
/// references is only legal for completed steps, which the executor
/// guarantees before invoking a dependant's closures.
#[derive(Clone, Copy)]
pub struct StepCx<'a> {
    pub graph: &'a Graph,
    pub cache: &'a Cache,
    pub root: &'a Path,
    pub prefix: &'a Path,
    pub progress: &'a ConsoleProgress,
}

impl<'a> StepCx<'a> {
    pub fn fingerprint(&self, id: StepId) -> Result<Fingerprint> {
        match self.graph.step(id).latch.get() {
            Some(fp) => Ok(fp),
            None => bail!(
                "fingerprint of \"{}\" read before it completed",
                self.graph.step(id).opts.name
            ),
        }
    }

    /// The cache path of a completed step's artifact.
    pub fn artifact(&self, id: StepId) -> Result<PathBuf> {
        Ok(self.cache.path_of(self.fingerprint(id)?))
    }

    pub fn resolve(&self, input: &Input) -> Result<PathBuf> {
        match input {
            Input::Path(p) => Ok(if p.is_absolute() {
                p.clone()
            } else {
                self.root.join(p)
            }),
            Input::Step { id, sub } => {
                let base = self.artifact(*id)?;
                Ok(match sub {
                    Some(sub) => base.join(sub),
                    None => base,
                })
            }
        }
    }

    /// Resolved paths of all of a step's input edges, in declaration order.
    pub fn inputs(&self, id: StepId) -> Result<Vec<PathBuf>> {
        self.graph
            .step(id)
            .inputs
            .iter()
            .map(|input| self.resolve(input))
            .collect()
    }
}

/// Declarative ingredients for a step's hash closure: a stable identifier
/// salt (so steps with coincidentally identical inputs do not alias), plus
/// directories, files and strings to mix in.
#[derive(Default, Clone)]
pub struct HasherOpts {
    pub stable_id: String,
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub strings: Vec<String>,
}

pub fn inputs_hasher(opts: HasherOpts) -> HashFn {
    Box::new(move |_cx, mut h| {
        h = h.combine(hash::hash_str(&opts.stable_id));
        for dir in &opts.dirs {
            h = h.combine(hash::hash_dir(dir)?);
        }
        for file in &opts.files {
            h = h.combine(hash::hash_file(file)?);
        }
        for s in &opts.strings {
            h = h.combine(hash::hash_str(s));
        }
        Ok(h)
    })
}
