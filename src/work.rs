//! The parallel executor: a fixed pool of workers draining the planned
//! order and materialising stale steps into the cache.

use crate::cache::Cache;
use crate::graph::{Graph, Input, StepCx, StepId};
use crate::hash::Fingerprint;
use crate::progress::{self, ConsoleProgress};
use anyhow::Result;
use std::path::Path;
use std::sync::Mutex;

pub struct Work<'a> {
    pub graph: &'a Graph,
    pub cache: &'a Cache,
    pub root: &'a Path,
    pub prefix: &'a Path,
    pub progress: &'a ConsoleProgress,
}

impl<'a> Work<'a> {
    /// Runs the planned order on `jobs` worker threads.  The queue is
    /// drained exactly once, so no step executes twice; workers block only
    /// on the queue mutex and on dependency completion latches.
    pub fn run(&self, order: Vec<StepId>, jobs: usize) {
        let queue = Mutex::new(order);
        let cx = StepCx {
            graph: self.graph,
            cache: self.cache,
            root: self.root,
            prefix: self.prefix,
            progress: self.progress,
        };
        std::thread::scope(|scope| {
            for _ in 0..jobs.max(1) {
                scope.spawn(|| worker(&cx, &queue));
            }
        });
    }
}

fn worker(cx: &StepCx, queue: &Mutex<Vec<StepId>>) {
    loop {
        // The list is reverse-topological, so the back is ready-first.
        let id = match queue.lock().unwrap().pop() {
            Some(id) => id,
            None => return,
        };
        let step = cx.graph.step(id);
        for &dep in &step.deps {
            cx.graph.step(dep).latch.wait();
        }
        for input in &step.inputs {
            if let Input::Step { id: dep, .. } = input {
                cx.graph.step(*dep).latch.wait();
            }
        }
        if let Err(err) = perform_if_needed(cx, id) {
            // Fatal: no retry, no graceful shutdown of other workers.  The
            // failed step has no artifact, so the next invocation re-enters
            // here via cache miss.
            progress::fatal(&err.context(format!("step \"{}\"", step.opts.name)));
        }
    }
}

/// Derives the step's fingerprint, short-circuits on a cache hit, otherwise
/// runs the action and promotes its output.
fn perform_if_needed(cx: &StepCx, id: StepId) -> Result<()> {
    let step = cx.graph.step(id);
    if step.latch.get().is_some() {
        return Ok(());
    }

    // All dependencies completed before this point, so their fingerprints
    // are readable; the fold is unordered so edge order cannot matter.
    let mut acc = Fingerprint::ZERO;
    for &dep in &step.deps {
        acc = acc.combine_unordered(cx.fingerprint(dep)?);
    }
    for input in &step.inputs {
        if let Input::Step { id: dep, .. } = input {
            acc = acc.combine_unordered(cx.fingerprint(*dep)?);
        }
    }
    let fp = (step.hash)(cx, acc)?;

    if !step.opts.phony {
        if cx.cache.contains(fp) {
            if !step.opts.silent {
                cx.progress.up_to_date(&step.opts.name);
            }
            step.latch.complete(fp);
            return Ok(());
        }
        if !step.opts.silent {
            cx.progress.cache_miss(&step.opts.name, &cx.cache.path_of(fp));
        }
    }

    let tmp = cx.cache.fresh_tmp()?;
    (step.action)(cx, &tmp)?;
    if tmp.exists() {
        cx.cache.promote(fp, &tmp)?;
    }
    if !step.opts.silent {
        cx.progress.completed(&step.opts.name);
    }
    step.latch.complete(fp);
    Ok(())
}
