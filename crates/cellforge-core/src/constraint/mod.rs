//! Constraint Language: a small linear-arithmetic DSL with symbolic
//! keywords that expands to integer linear constraints over a subject
//! cell's four corners and, for binary constraints, an object cell's
//! four corners.

mod keywords;
mod parser;

use hashbrown::HashMap;
use std::fmt;

use crate::error::{DimensionError, ParseError};

pub use parser::Poly;

/// One of the (up to) eight corner variables a constraint expression
/// can reference.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Var {
    Sx1,
    Sy1,
    Sx2,
    Sy2,
    Ox1,
    Oy1,
    Ox2,
    Oy2,
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Var::Sx1 => "sx1",
            Var::Sy1 => "sy1",
            Var::Sx2 => "sx2",
            Var::Sy2 => "sy2",
            Var::Ox1 => "ox1",
            Var::Oy1 => "oy1",
            Var::Ox2 => "ox2",
            Var::Oy2 => "oy2",
        };
        f.write_str(s)
    }
}

/// The shape a raw, user-authored constraint can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintContext {
    /// `(expr)` — subject is the container itself. Accepts unprefixed
    /// `x1,y1,x2,y2` and `s`-prefixed forms; rejects `o`-prefixed.
    SelfConstraint,
    /// `(child, expr)` — subject is one child, no object exists.
    /// Accepts `s`-prefixed forms; rejects unprefixed and `o`-prefixed.
    Absolute,
    /// `(child_a, expr, child_b)` — both subject and object exist.
    /// Accepts `s`- and `o`-prefixed forms; rejects unprefixed.
    Relative,
}

/// Strict vs non-strict vs exact relation. After keyword/strictness
/// normalization all constraints end up as one of these three:
/// `<`/`>` become `<=`/`>=` with an adjusted constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

/// One fully parsed linear constraint: `Σ coeff·var {relation} rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConstraint {
    pub form: HashMap<Var, i64>,
    pub relation: Relation,
    pub rhs: i64,
    /// Set when this constraint originated from the soft `xcenter`/
    /// `ycenter` keyword with no explicit tolerance: the solver
    /// installs it as a penalty term rather than a hard bound.
    pub soft_centering: Option<Axis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Parses a comma-separated DSL string into fully translated linear
/// constraints, expanding semantic keywords first.
///
/// Errors eagerly on malformed syntax, unknown identifiers, non-linear
/// products, and context/prefix mismatches — everything that needs to
/// be caught at `constrain()` time rather than surfacing later as a
/// confusing solver failure.
pub fn parse_constraint_string(
    text: &str,
    context: ConstraintContext,
) -> Result<Vec<LinearConstraint>, ConstraintSyntaxError> {
    let mut out = Vec::new();
    for clause in keywords::expand(text)? {
        out.push(parser::parse_clause(&clause.text, context, clause.soft_centering)?);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintSyntaxError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Dimension(#[from] DimensionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coeff(c: &LinearConstraint, v: Var) -> i64 {
        *c.form.get(&v).unwrap_or(&0)
    }

    #[test]
    fn self_width_height() {
        let cs = parse_constraint_string("width = 100, height = 50", ConstraintContext::SelfConstraint)
            .unwrap();
        assert_eq!(cs.len(), 2);
        assert_eq!(coeff(&cs[0], Var::Sx2), 1);
        assert_eq!(coeff(&cs[0], Var::Sx1), -1);
        assert_eq!(cs[0].rhs, 100);
        assert_eq!(cs[0].relation, Relation::Eq);
    }

    #[test]
    fn strict_inequality_normalizes() {
        let cs = parse_constraint_string("x1 > 10", ConstraintContext::SelfConstraint).unwrap();
        assert_eq!(cs[0].relation, Relation::Ge);
        assert_eq!(cs[0].rhs, 11);

        let cs = parse_constraint_string("x1 < 10", ConstraintContext::SelfConstraint).unwrap();
        assert_eq!(cs[0].relation, Relation::Le);
        assert_eq!(cs[0].rhs, 9);
    }

    #[test]
    fn center_expands_to_two_soft_constraints() {
        let cs = parse_constraint_string("center", ConstraintContext::Relative).unwrap();
        assert_eq!(cs.len(), 2);
        assert!(cs.iter().any(|c| c.soft_centering == Some(Axis::X)));
        assert!(cs.iter().any(|c| c.soft_centering == Some(Axis::Y)));
    }

    #[test]
    fn unprefixed_in_binary_is_error() {
        let err = parse_constraint_string("x1 = 0", ConstraintContext::Relative).unwrap_err();
        assert!(matches!(err, ConstraintSyntaxError::Parse(_)));
    }

    #[test]
    fn object_prefix_without_object_is_dimension_error() {
        let err = parse_constraint_string("sx1 = ox1", ConstraintContext::Absolute).unwrap_err();
        assert!(matches!(err, ConstraintSyntaxError::Dimension(_)));
    }

    #[test]
    fn non_linear_product_is_parse_error() {
        let err = parse_constraint_string("x1 * x2 = 10", ConstraintContext::SelfConstraint).unwrap_err();
        assert!(matches!(err, ConstraintSyntaxError::Parse(_)));
    }

    #[test]
    fn edge_distance_keyword() {
        let cs = parse_constraint_string("ll_edge = 5", ConstraintContext::Relative).unwrap();
        assert_eq!(coeff(&cs[0], Var::Sx1), 1);
        assert_eq!(coeff(&cs[0], Var::Ox1), -1);
        assert_eq!(cs[0].rhs, 5);
    }

    #[test]
    fn parenthesized_constant_factor() {
        let cs = parse_constraint_string("x2 = (2 + 3) * 10", ConstraintContext::SelfConstraint).unwrap();
        assert_eq!(cs[0].rhs, 50);
    }
}
