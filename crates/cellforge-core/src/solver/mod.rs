//! Integer Constraint Solver: turns a tree of cells plus the
//! constraints posted on it into a concrete assignment of integer
//! corner coordinates, or a diagnosed [`SolverError`].
//!
//! This is a small, purpose-built constraint engine — interval bound
//! propagation plus chronological backtracking — rather than a
//! generic MILP solve. The one feature a generic LP/MILP formulation
//! cannot express cleanly is the bounding-box aggregation invariant
//! (a container's extent is the min/max of its children's corners):
//! that is a genuine global constraint, not a linear inequality, so
//! it gets first-class propagation here instead of a big-M encoding.

mod model;
mod propagate;
mod search;

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cell::{Arena, Cell, CellKind, FreezeState};
use crate::error::SolverError;
use crate::geom::{CellId, Rect, COORD_MAX};
use model::{ArenaExt, Bound};
use search::SearchOutcome;

/// Tunables for [`solve`].
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Wall-clock budget for the search phase. `None` disables the
    /// timeout (bounded instead by the search's internal node cap).
    pub timeout: Option<Duration>,
    /// Penalty weight on the deviation variable of a soft `xcenter`/
    /// `ycenter` constraint with no explicit tolerance.
    pub centering_weight: i64,
    /// Largest magnitude a free variable's domain may take before any
    /// constraint narrows it.
    pub coord_max: i32,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            centering_weight: 10_000,
            coord_max: COORD_MAX,
        }
    }
}

/// Solves the whole tree `root` belongs to (not just `root`'s
/// subtree — the solver always operates on a complete, independent
/// tree) and commits the result back onto every cell's `position`.
///
/// Re-solving is not incremental: the model is rebuilt from scratch
/// every call; `root`'s tree is otherwise untouched until a solution
/// is found, so a failed solve leaves prior positions exactly as they
/// were.
pub fn solve(root: &Cell, options: SolveOptions) -> Result<(), SolverError> {
    let (model, vars) = model::build(root, options.centering_weight, options.coord_max)?;
    info!(
        variables = model.bounds.len(),
        linear_constraints = model.linear.len(),
        aggregates = model.aggregates.len(),
        "starting layout solve"
    );

    let deadline = options.timeout.map(|d| Instant::now() + d);
    match search::search(&model, deadline) {
        SearchOutcome::Solved(bounds) => {
            debug!("solve succeeded");
            commit(root, &vars, &bounds);
            Ok(())
        }
        SearchOutcome::Infeasible => {
            warn!("solve found no feasible assignment");
            Err(SolverError::Infeasible {
                context: model.linear.iter().map(|c| c.diagnostic.clone()).collect(),
            })
        }
        SearchOutcome::Timeout => Err(SolverError::Timeout),
    }
}

fn commit(root: &Cell, vars: &hashbrown::HashMap<CellId, [usize; 4]>, bounds: &[Bound]) {
    let arena_rc = root.arena.clone();
    let mut arena = arena_rc.borrow_mut();
    let root_id = arena.root.unwrap_or(root.id);

    for (&cell, &[x1, y1, x2, y2]) in vars {
        let rect = Rect::new(
            bounds[x1].lo as i32,
            bounds[y1].lo as i32,
            bounds[x2].lo as i32,
            bounds[y2].lo as i32,
        );
        arena.set_position(cell, rect);
    }

    rewrite_opaque_descendants(&mut arena, root_id);
}

/// Frozen and fixed cells hide their descendants from the solver
/// entirely: those descendants keep whatever
/// absolute position they had before this solve, and the whole
/// subtree is rigidly translated by however far the opaque cell
/// itself just moved (zero, for a fixed cell, since its position is
/// hard-pinned in the model).
fn rewrite_opaque_descendants(arena: &mut Arena, cell: CellId) {
    let data = arena.get_data(cell);

    if data.freeze != FreezeState::Normal {
        let anchor = data
            .cached_bbox
            .expect("frozen/fixed cell always has a cached_bbox");
        let solved = data.position.expect("just committed by solve()");
        let (dx, dy) = (solved.x1 - anchor.x1, solved.y1 - anchor.y1);

        let children = match &data.kind {
            CellKind::Container { children } => children.clone(),
            CellKind::Leaf { .. } => Vec::new(),
        };
        for child in &children {
            translate_subtree(arena, *child, dx, dy);
        }
        arena.get_data_mut(cell).cached_bbox = Some(solved);
        return;
    }

    if let CellKind::Container { children } = &data.kind {
        let children = children.clone();
        for child in children {
            rewrite_opaque_descendants(arena, child);
        }
    }
}

fn translate_subtree(arena: &mut Arena, cell: CellId, dx: i32, dy: i32) {
    let data = arena.get_data_mut(cell);
    if let Some(p) = data.position {
        data.position = Some(p.translate(dx, dy));
    }
    if let Some(b) = data.cached_bbox {
        data.cached_bbox = Some(b.translate(dx, dy));
    }

    let children = match &data.kind {
        CellKind::Container { children } => children.clone(),
        CellKind::Leaf { .. } => Vec::new(),
    };
    for child in children {
        translate_subtree(arena, child, dx, dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_solves_to_explicit_size() {
        let leaf = Cell::leaf("m1", "metal1");
        leaf.constrain_self("x1 = 0, y1 = 0, width = 40, height = 120").unwrap();
        solve(&leaf, SolveOptions::default()).unwrap();
        let r = leaf.bbox().unwrap();
        assert_eq!((r.x1, r.y1, r.width(), r.height()), (0, 0, 40, 120));
    }

    #[test]
    fn container_bbox_aggregates_over_children() {
        let top = Cell::container("top");
        let a = Cell::leaf("a", "metal1");
        let b = Cell::leaf("b", "metal1");
        top.constrain_abs(&a, "sx1 = 0, sy1 = 0, swidth = 10, sheight = 10").unwrap();
        top.constrain_abs(&b, "sx1 = 50, sy1 = 0, swidth = 10, sheight = 10").unwrap();

        solve(&top, SolveOptions::default()).unwrap();

        let r = top.bbox().unwrap();
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (0, 0, 60, 10));
    }

    #[test]
    fn relative_constraint_places_one_child_against_another() {
        let top = Cell::container("top");
        let a = Cell::leaf("a", "metal1");
        let b = Cell::leaf("b", "metal1");
        top.constrain_abs(&a, "sx1 = 0, sy1 = 0, swidth = 10, sheight = 10").unwrap();
        top.constrain_abs(&b, "sy1 = 0, swidth = 10, sheight = 10").unwrap();
        top.constrain_rel(&b, "lr_edge = 5", &a).unwrap();

        solve(&top, SolveOptions::default()).unwrap();

        assert_eq!(a.bbox().unwrap().x2, 10);
        assert_eq!(b.bbox().unwrap().x1, 15);
    }

    #[test]
    fn infeasible_system_reports_diagnostics() {
        let leaf = Cell::leaf("a", "poly");
        leaf.constrain_self("x1 = 0, x2 = 10, x2 - x1 = 5").unwrap();
        let err = solve(&leaf, SolveOptions::default()).unwrap_err();
        match err {
            SolverError::Infeasible { context } => assert!(!context.is_empty()),
            other => panic!("expected Infeasible, got {other:?}"),
        }
    }

    #[test]
    fn fixed_cell_keeps_children_rigid_under_reposition() {
        let top = Cell::container("top");
        let block = Cell::container("block");
        let inner = Cell::leaf("inner", "metal1");
        block.constrain_abs(&inner, "sx1 = 0, sy1 = 0, swidth = 10, sheight = 10").unwrap();
        solve(&block, SolveOptions::default()).unwrap();
        block.fix_layout().unwrap();

        // `block` was built in a separate arena, so attaching it grafts
        // a fresh copy into `top`'s tree; fetch that copy to inspect it.
        top.constrain_abs(&block, "sx1 = 100, sy1 = 0, swidth = 10, sheight = 10").unwrap();
        let block_in_top = top.children().into_iter().next().unwrap();
        solve(&top, SolveOptions::default()).unwrap();

        let inner_after = block_in_top.children().first().unwrap().bbox().unwrap();
        assert_eq!(inner_after.x1, 100);
        assert_eq!(inner_after.width(), 10);
    }
}
