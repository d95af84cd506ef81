//! Resolving requested step names and flattening their transitive closure
//! into an execution order, detecting cycles along the way.

use crate::densemap::Index;
use crate::errors::BuildError;
use crate::graph::{Graph, Input, StepId};
use anyhow::{bail, Result};

/// Maps requested names to step ids, preserving request order.  A name may
/// match several steps; all of them are scheduled.
pub fn resolve(graph: &Graph, names: &[String]) -> Result<Vec<StepId>> {
    let mut roots = Vec::new();
    for name in names {
        let matches = graph.lookup(name);
        if matches.is_empty() {
            bail!(BuildError::UnknownStep(name.clone()));
        }
        roots.extend(matches);
    }
    Ok(roots)
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Produces the execution list for the requested roots: a three-colour DFS
/// yields a post-order (dependencies before dependants), which is reversed
/// so the executor can pop ready steps from the back.  Plain dependencies
/// are traversed before input edges; siblings keep insertion order.
pub fn plan(graph: &Graph, roots: &[StepId]) -> Result<Vec<StepId>> {
    let mut colors = vec![Color::White; graph.len()];
    let mut grey_stack = Vec::new();
    let mut order = Vec::new();
    for &root in roots {
        visit(graph, root, &mut colors, &mut grey_stack, &mut order)?;
    }
    order.reverse();
    Ok(order)
}

fn visit(
    graph: &Graph,
    id: StepId,
    colors: &mut [Color],
    grey_stack: &mut Vec<StepId>,
    order: &mut Vec<StepId>,
) -> Result<()> {
    match colors[id.index()] {
        Color::Black => return Ok(()),
        Color::Grey => bail!(BuildError::CycleDetected(describe_cycle(
            graph, id, grey_stack
        ))),
        Color::White => {}
    }
    colors[id.index()] = Color::Grey;
    grey_stack.push(id);
    for &dep in &graph.step(id).deps {
        visit(graph, dep, colors, grey_stack, order)?;
    }
    for input in &graph.step(id).inputs {
        if let Input::Step { id: dep, .. } = input {
            visit(graph, *dep, colors, grey_stack, order)?;
        }
    }
    order.push(id);
    colors[id.index()] = Color::Black;
    grey_stack.pop();
    Ok(())
}

/// Renders the grey stack from the reoccurring step back to itself, e.g.
/// `a -> b -> a`.
fn describe_cycle(graph: &Graph, at: StepId, grey_stack: &[StepId]) -> String {
    let mut msg = graph.step(at).opts.name.clone();
    for &id in grey_stack.iter().rev() {
        msg.push_str(" -> ");
        msg.push_str(&graph.step(id).opts.name);
        if id == at {
            break;
        }
    }
    msg
}
