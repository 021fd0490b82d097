//! Keyword expansion: purely textual/structural — each keyword clause
//! is rewritten into one or more ordinary linear expressions before
//! the real parser ever sees them.

use super::{Axis, ConstraintSyntaxError};
use crate::error::ParseError;

pub struct ExpandedClause {
    pub text: String,
    pub soft_centering: Option<Axis>,
}

fn plain(text: impl Into<String>) -> ExpandedClause {
    ExpandedClause {
        text: text.into(),
        soft_centering: None,
    }
}

fn soft(text: impl Into<String>, axis: Axis) -> ExpandedClause {
    ExpandedClause {
        text: text.into(),
        soft_centering: Some(axis),
    }
}

/// Splits `text` on top-level commas and expands each resulting clause,
/// recursively unrolling `center` into `xcenter, ycenter`.
pub fn expand(text: &str) -> Result<Vec<ExpandedClause>, ConstraintSyntaxError> {
    let mut queue: Vec<String> = split_commas(text);
    let mut out = Vec::new();

    // Bound the number of keyword-expansion rounds: `center` expands
    // to two clauses and nothing expands further from there, so this
    // can never actually loop; the cap only guards against a future
    // keyword addition that expands into itself by mistake.
    let mut rounds = 0;
    while let Some(raw) = queue.pop() {
        rounds += 1;
        if rounds > 10_000 {
            return Err(ParseError {
                source_text: text.to_string(),
                position: 0,
                reason: "keyword expansion did not terminate".to_string(),
            }
            .into());
        }

        let clause = raw.trim();
        if clause.is_empty() {
            return Err(ParseError {
                source_text: text.to_string(),
                position: 0,
                reason: "empty expression clause".to_string(),
            }
            .into());
        }

        match clause {
            "center" => {
                queue.push("ycenter".to_string());
                queue.push("xcenter".to_string());
            }
            "left" => out.push(plain("sx1 = ox1")),
            "right" => out.push(plain("sx2 = ox2")),
            "bottom" => out.push(plain("sy1 = oy1")),
            "top" => out.push(plain("sy2 = oy2")),
            "xcenter" => out.push(soft("sx1 + sx2 = ox1 + ox2", Axis::X)),
            "ycenter" => out.push(soft("sy1 + sy2 = oy1 + oy2", Axis::Y)),
            _ => match edge_or_size_keyword(clause) {
                Some(expanded) => out.push(plain(expanded)),
                None => out.push(plain(clause.to_string())),
            },
        }
    }

    // `expand` pops from the back of `queue`, which is a stack; walk
    // the input in forward order by pushing in reverse up front.
    out.reverse();
    Ok(out)
}

fn split_commas(text: &str) -> Vec<String> {
    let mut clauses: Vec<String> = text.split(',').map(|s| s.to_string()).collect();
    clauses.reverse();
    clauses
}

/// Recognizes `keyword = N` clauses and rewrites them to the
/// corresponding plain linear expression, substituting `N` verbatim
/// (so `N` may itself be any constant-valued expression the general
/// parser accepts, e.g. `(2 + 3) * 10`).
fn edge_or_size_keyword(clause: &str) -> Option<String> {
    let (lhs, rhs) = clause.split_once('=')?;
    let lhs = lhs.trim();
    let rhs = rhs.trim();

    let template = match lhs {
        "ll_edge" => "sx1 - ox1",
        "lr_edge" => "sx1 - ox2",
        "rl_edge" => "sx2 - ox1",
        "rr_edge" => "sx2 - ox2",
        "bb_edge" => "sy1 - oy1",
        "bt_edge" => "sy1 - oy2",
        "tb_edge" => "sy2 - oy1",
        "tt_edge" => "sy2 - oy2",
        "swidth" => "sx2 - sx1",
        "sheight" => "sy2 - sy1",
        "owidth" => "ox2 - ox1",
        "oheight" => "oy2 - oy1",
        "width" => "x2 - x1",
        "height" => "y2 - y1",
        _ => return None,
    };

    Some(format!("{template} = {rhs}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(clauses: &[ExpandedClause]) -> Vec<&str> {
        clauses.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn center_unrolls_in_order() {
        let clauses = expand("center").unwrap();
        assert_eq!(
            texts(&clauses),
            vec!["sx1 + sx2 = ox1 + ox2", "sy1 + sy2 = oy1 + oy2"]
        );
    }

    #[test]
    fn preserves_clause_order() {
        let clauses = expand("ll_edge = 0, bt_edge = 5").unwrap();
        assert_eq!(texts(&clauses), vec!["sx1 - ox1 = 0", "sy1 - oy2 = 5"]);
    }

    #[test]
    fn passes_through_plain_expressions() {
        let clauses = expand("x1 > 10, y1 > 10").unwrap();
        assert_eq!(texts(&clauses), vec!["x1 > 10", "y1 > 10"]);
    }

    #[test]
    fn rejects_empty_clause() {
        assert!(expand("width = 10, , height = 5").is_err());
    }
}
