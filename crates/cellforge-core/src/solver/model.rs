//! Translates a [`Cell`] tree into the flat variable/constraint model
//! the propagator and search in this module operate on.

use hashbrown::HashMap;

use crate::cell::{Arena, Cell, CellData, CellKind, ConstraintShape, FreezeState, RawConstraint};
use crate::constraint::{Axis, Relation, Var};
use crate::error::{ConstraintDiagnostic, ScopeError};
use crate::geom::CellId;

pub(crate) type VarIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Corner {
    X1,
    Y1,
    X2,
    Y2,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Bound {
    pub lo: i64,
    pub hi: i64,
}

impl Bound {
    fn free(coord_max: i32) -> Self {
        Bound { lo: -(coord_max as i64), hi: coord_max as i64 }
    }

    fn fixed(v: i64) -> Self {
        Bound { lo: v, hi: v }
    }

    pub fn is_singleton(&self) -> bool {
        self.lo == self.hi
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rel {
    Eq,
    Le,
    Ge,
}

impl From<Relation> for Rel {
    fn from(r: Relation) -> Self {
        match r {
            Relation::Eq => Rel::Eq,
            Relation::Le => Rel::Le,
            Relation::Ge => Rel::Ge,
        }
    }
}

/// `Σ terms[i].1 * var(terms[i].0) {rel} rhs`.
#[derive(Debug, Clone)]
pub(crate) struct LinearCon {
    pub terms: Vec<(VarIdx, i64)>,
    pub rel: Rel,
    pub rhs: i64,
    pub diagnostic: ConstraintDiagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggKind {
    Min,
    Max,
}

/// `var(target) = min/max(var(children))` — the bounding-box
/// aggregation invariant for one axis of one container.
#[derive(Debug, Clone)]
pub(crate) struct AggregateCon {
    pub target: VarIdx,
    pub kind: AggKind,
    pub children: Vec<VarIdx>,
}

pub(crate) struct Model {
    pub bounds: Vec<Bound>,
    pub cell_of: Vec<CellId>,
    pub corner_of: Vec<Corner>,
    pub linear: Vec<LinearCon>,
    pub aggregates: Vec<AggregateCon>,
    /// `Σ coeff * var` to minimize.
    pub objective: Vec<(VarIdx, i64)>,
    centering_weight: i64,
    coord_max: i32,
}

impl Model {
    fn alloc_cell_vars(&mut self, cell: CellId) -> [VarIdx; 4] {
        let base = self.bounds.len();
        for corner in [Corner::X1, Corner::Y1, Corner::X2, Corner::Y2] {
            self.bounds.push(Bound::free(self.coord_max));
            self.cell_of.push(cell);
            self.corner_of.push(corner);
        }
        [base, base + 1, base + 2, base + 3]
    }
}

/// Builds the solver model for the whole tree rooted at `root`'s
/// arena (not just `root`'s own subtree — [`crate::solver::solve`]
/// always solves a full tree from its actual root).
pub(crate) fn build(
    root: &Cell,
    centering_weight: i64,
    coord_max: i32,
) -> Result<(Model, HashMap<CellId, [VarIdx; 4]>), ScopeError> {
    let arena_rc = root.arena.clone();
    let arena = arena_rc.borrow();
    let root_id = arena.root.unwrap_or(root.id);

    let mut model = Model {
        bounds: Vec::new(),
        cell_of: Vec::new(),
        corner_of: Vec::new(),
        linear: Vec::new(),
        aggregates: Vec::new(),
        objective: Vec::new(),
        centering_weight,
        coord_max,
    };
    let mut vars: HashMap<CellId, [VarIdx; 4]> = HashMap::new();

    register(&arena, root_id, &mut model, &mut vars)?;

    for (&cell, &[x1, y1, x2, y2]) in &vars {
        model.linear.push(LinearCon {
            terms: vec![(x1, 1), (x2, -1)],
            rel: Rel::Le,
            rhs: 0,
            diagnostic: ConstraintDiagnostic {
                cell,
                cell_name: arena.get_name(cell),
                expr: "x1 <= x2 (baseline)".to_string(),
            },
        });
        model.linear.push(LinearCon {
            terms: vec![(y1, 1), (y2, -1)],
            rel: Rel::Le,
            rhs: 0,
            diagnostic: ConstraintDiagnostic {
                cell,
                cell_name: arena.get_name(cell),
                expr: "y1 <= y2 (baseline)".to_string(),
            },
        });
        model.objective.push((x2, 1));
        model.objective.push((y2, 1));
    }

    Ok((model, vars))
}

/// Registers `cell` (and, unless it is frozen/fixed, its subtree)
/// into `model`/`vars`.
fn register(
    arena: &Arena,
    cell: CellId,
    model: &mut Model,
    vars: &mut HashMap<CellId, [VarIdx; 4]>,
) -> Result<(), ScopeError> {
    let data = arena.get_data(cell);
    let [x1, y1, x2, y2] = model.alloc_cell_vars(cell);
    vars.insert(cell, [x1, y1, x2, y2]);

    match data.freeze {
        FreezeState::Fixed | FreezeState::Frozen => {
            let bbox = data.cached_bbox.expect("frozen/fixed cell always has a cached_bbox");
            let diag = |expr: &str| ConstraintDiagnostic {
                cell,
                cell_name: data.name.clone(),
                expr: expr.to_string(),
            };
            // Only size is pinned, never position: a frozen/fixed cell's
            // `x1`/`y1` stay free variables so an enclosing constraint
            // (or, for `Fixed`, `rewrite_opaque_descendants` after the
            // solve) can still place the cell and its rigid subtree.
            model.linear.push(LinearCon {
                terms: vec![(x2, 1), (x1, -1)],
                rel: Rel::Eq,
                rhs: bbox.width() as i64,
                diagnostic: diag("frozen/fixed width"),
            });
            model.linear.push(LinearCon {
                terms: vec![(y2, 1), (y1, -1)],
                rel: Rel::Eq,
                rhs: bbox.height() as i64,
                diagnostic: diag("frozen/fixed height"),
            });
            return Ok(());
        }
        FreezeState::Normal => {}
    }

    let children: Vec<CellId> = match &data.kind {
        CellKind::Container { children } => children.clone(),
        CellKind::Leaf { .. } => Vec::new(),
    };

    for &child in &children {
        register(arena, child, model, vars)?;
    }

    for raw in &data.constraints {
        install_constraint(arena, cell, &data.name, raw, vars, model)?;
    }

    if data.kind.is_container() {
        install_aggregation(cell, &data.name, &children, &data.constraints, vars, model);
    }

    Ok(())
}

fn install_constraint(
    arena: &Arena,
    container: CellId,
    container_name: &str,
    raw: &RawConstraint,
    vars: &HashMap<CellId, [VarIdx; 4]>,
    model: &mut Model,
) -> Result<(), ScopeError> {
    let (subject, object) = match raw.shape {
        ConstraintShape::SelfConstraint => (container, None),
        ConstraintShape::Absolute(child) => (child, None),
        ConstraintShape::Relative(a, b) => (a, Some(b)),
    };

    for id in [Some(subject), object].into_iter().flatten() {
        if !arena.is_descendant(container, id) {
            return Err(ScopeError {
                container,
                referenced: id,
            });
        }
    }

    let subject_vars = vars[&subject];
    let object_vars = object.map(|o| vars[&o]);

    for lc in &raw.translated {
        let mut terms = Vec::with_capacity(lc.form.len());
        for (&var, &coeff) in &lc.form {
            let idx = match var {
                Var::Sx1 => subject_vars[0],
                Var::Sy1 => subject_vars[1],
                Var::Sx2 => subject_vars[2],
                Var::Sy2 => subject_vars[3],
                Var::Ox1 => object_vars.expect("object prefix only from Relative")[0],
                Var::Oy1 => object_vars.expect("object prefix only from Relative")[1],
                Var::Ox2 => object_vars.expect("object prefix only from Relative")[2],
                Var::Oy2 => object_vars.expect("object prefix only from Relative")[3],
            };
            terms.push((idx, coeff));
        }

        let diagnostic = ConstraintDiagnostic {
            cell: container,
            cell_name: container_name.to_string(),
            expr: raw.text.clone(),
        };

        match lc.soft_centering {
            None => model.linear.push(LinearCon {
                terms,
                rel: lc.relation.into(),
                rhs: lc.rhs,
                diagnostic,
            }),
            Some(axis) => install_soft_centering(terms, lc.rhs, axis, diagnostic, model),
        }
    }

    Ok(())
}

/// `|expr - rhs| <= d` plus `d` in the objective, for a soft
/// `xcenter`/`ycenter` constraint with no explicit tolerance window.
fn install_soft_centering(
    terms: Vec<(VarIdx, i64)>,
    rhs: i64,
    _axis: Axis,
    diagnostic: ConstraintDiagnostic,
    model: &mut Model,
) {
    let d = model.bounds.len();
    model.bounds.push(Bound::free(model.coord_max));
    model.cell_of.push(diagnostic.cell);
    model.corner_of.push(Corner::X1); // placeholder, never read back as a position

    let mut upper = terms.clone();
    upper.push((d, -1));
    model.linear.push(LinearCon {
        terms: upper,
        rel: Rel::Le,
        rhs,
        diagnostic: diagnostic.clone(),
    });

    let mut lower: Vec<(VarIdx, i64)> = terms.into_iter().map(|(v, c)| (v, -c)).collect();
    lower.push((d, -1));
    model.linear.push(LinearCon {
        terms: lower,
        rel: Rel::Le,
        rhs: -rhs,
        diagnostic,
    });

    model.objective.push((d, model.centering_weight));
}

/// Installs the bounding-box invariant for one container: per axis,
/// either exact min/max aggregation over children, or — when the
/// container carries an explicit self-constraint on that axis —
/// one-directional containment only (the container may be larger than
/// its children's union on that axis; see `DESIGN.md` on Scenario A).
fn install_aggregation(
    container: CellId,
    container_name: &str,
    children: &[CellId],
    constraints: &[RawConstraint],
    vars: &HashMap<CellId, [VarIdx; 4]>,
    model: &mut Model,
) {
    let touches_x = constraints.iter().any(|c| {
        c.shape == ConstraintShape::SelfConstraint
            && c.translated.iter().any(|lc| {
                lc.form.contains_key(&Var::Sx1) || lc.form.contains_key(&Var::Sx2)
            })
    });
    let touches_y = constraints.iter().any(|c| {
        c.shape == ConstraintShape::SelfConstraint
            && c.translated.iter().any(|lc| {
                lc.form.contains_key(&Var::Sy1) || lc.form.contains_key(&Var::Sy2)
            })
    });

    let container_vars = vars[&container];

    if children.is_empty() {
        return;
    }

    let child_x1: Vec<VarIdx> = children.iter().map(|c| vars[c][0]).collect();
    let child_y1: Vec<VarIdx> = children.iter().map(|c| vars[c][1]).collect();
    let child_x2: Vec<VarIdx> = children.iter().map(|c| vars[c][2]).collect();
    let child_y2: Vec<VarIdx> = children.iter().map(|c| vars[c][3]).collect();

    let diag = |expr: &str| ConstraintDiagnostic {
        cell: container,
        cell_name: container_name.to_string(),
        expr: expr.to_string(),
    };

    if touches_x {
        for &cx1 in &child_x1 {
            model.linear.push(LinearCon {
                terms: vec![(container_vars[0], 1), (cx1, -1)],
                rel: Rel::Le,
                rhs: 0,
                diagnostic: diag("container must contain child (x1)"),
            });
        }
        for &cx2 in &child_x2 {
            model.linear.push(LinearCon {
                terms: vec![(container_vars[2], -1), (cx2, 1)],
                rel: Rel::Le,
                rhs: 0,
                diagnostic: diag("container must contain child (x2)"),
            });
        }
    } else {
        model.aggregates.push(AggregateCon {
            target: container_vars[0],
            kind: AggKind::Min,
            children: child_x1,
        });
        model.aggregates.push(AggregateCon {
            target: container_vars[2],
            kind: AggKind::Max,
            children: child_x2,
        });
    }

    if touches_y {
        for &cy1 in &child_y1 {
            model.linear.push(LinearCon {
                terms: vec![(container_vars[1], 1), (cy1, -1)],
                rel: Rel::Le,
                rhs: 0,
                diagnostic: diag("container must contain child (y1)"),
            });
        }
        for &cy2 in &child_y2 {
            model.linear.push(LinearCon {
                terms: vec![(container_vars[3], -1), (cy2, 1)],
                rel: Rel::Le,
                rhs: 0,
                diagnostic: diag("container must contain child (y2)"),
            });
        }
    } else {
        model.aggregates.push(AggregateCon {
            target: container_vars[1],
            kind: AggKind::Min,
            children: child_y1,
        });
        model.aggregates.push(AggregateCon {
            target: container_vars[3],
            kind: AggKind::Max,
            children: child_y2,
        });
    }
}

// Small accessors kept on `Arena`/`CellData` directly would leak
// solver internals into the tree module, so the glue lives here.
pub(crate) trait ArenaExt {
    fn get_data(&self, id: CellId) -> &CellData;
    fn get_data_mut(&mut self, id: CellId) -> &mut CellData;
    fn get_name(&self, id: CellId) -> String;
}

impl ArenaExt for Arena {
    fn get_data(&self, id: CellId) -> &CellData {
        self.nodes.get(&id.0).expect("valid cell id")
    }

    fn get_data_mut(&mut self, id: CellId) -> &mut CellData {
        self.nodes.get_mut(&id.0).expect("valid cell id")
    }

    fn get_name(&self, id: CellId) -> String {
        self.get_data(id).name.clone()
    }
}
