//! Error taxonomy for cellforge-core.

use thiserror::Error;

use crate::geom::CellId;

/// A DSL expression failed to parse, or referenced an unknown
/// identifier, or formed a non-linear product of two variables.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("constraint parse error at byte {position} in `{source_text}`: {reason}")]
pub struct ParseError {
    pub source_text: String,
    pub position: usize,
    pub reason: String,
}

/// A binary constraint referenced a cell that is not a descendant of
/// the container the constraint was posted on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cell {referenced} is not in scope of container {container} (not a descendant)")]
pub struct ScopeError {
    pub container: CellId,
    pub referenced: CellId,
}

/// A self-constraint used `s`/`o`-prefixed variables, or a binary
/// constraint omitted the object cell while using an `o`-prefixed
/// variable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DimensionError {
    #[error("self-constraint `{expr}` may not reference subject/object-prefixed variables")]
    PrefixedInSelfConstraint { expr: String },
    #[error("absolute constraint `{expr}` on a single cell may not reference object-prefixed variables")]
    ObjectPrefixInAbsoluteConstraint { expr: String },
}

/// A lifecycle operation was attempted in a state that forbids it:
/// freezing/fixing an unsolved cell, or mutating a frozen/fixed cell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidState {
    #[error("cannot freeze cell {cell}: it has not been solved yet")]
    FreezeUnsolved { cell: CellId },
    #[error("cannot fix cell {cell}: it has not been solved yet")]
    FixUnsolved { cell: CellId },
    #[error("cell {cell} is frozen and cannot be mutated")]
    MutateFrozen { cell: CellId },
    #[error("cell {cell} is fixed and cannot be mutated")]
    MutateFixed { cell: CellId },
    #[error("{child} is already a direct child of {parent}")]
    DuplicateChild { parent: CellId, child: CellId },
    #[error("cell {cell} is a leaf and cannot hold children")]
    NotAContainer { cell: CellId },
    #[error("{child} already belongs to {current_parent} and cannot be re-parented to {new_parent}")]
    AlreadyParented {
        child: CellId,
        current_parent: CellId,
        new_parent: CellId,
    },
}

/// One constraint rendered as diagnostic context for an infeasible
/// solve, so an error message can show the offending expression
/// instead of just an opaque failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDiagnostic {
    pub cell: CellId,
    pub cell_name: String,
    pub expr: String,
}

/// Failure modes of [`crate::solver::solve`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("no assignment satisfies all constraints ({} constraints in context)", .context.len())]
    Infeasible { context: Vec<ConstraintDiagnostic> },
    #[error("solve exceeded its wall-clock budget")]
    Timeout,
    #[error("constraint solver backend failure: {status}")]
    Backend { status: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Dimension(#[from] DimensionError),
}
