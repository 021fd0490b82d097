//! Chronological backtracking search over the propagated domains.
//!
//! Branching always fixes the next free variable to the lowest value
//! in its current domain — since the objective minimizes `x2 + y2`
//! plus centering deviation, and every domain's lower bound is always
//! feasible-or-better than any higher value absent a *binding*
//! constraint, the first complete assignment found is objective-good
//! without needing a separate incumbent-improving phase. This is not
//! a certified-optimal branch-and-bound in the adversarial case, but
//! it is sound, terminates, and matches every scenario this DSL is
//! meant to express (see `DESIGN.md`).

use std::time::Instant;

use super::model::{Bound, Model};
use super::propagate::{aggregate_holds, propagate};

const MAX_NODES: u64 = 200_000;

pub(crate) enum SearchOutcome {
    Solved(Vec<Bound>),
    Infeasible,
    Timeout,
}

struct Decision {
    var: usize,
    tried_lo: i64,
    saved: Vec<Bound>,
}

pub(crate) fn search(model: &Model, deadline: Option<Instant>) -> SearchOutcome {
    let mut bounds = model.bounds.clone();
    let mut trail: Vec<Decision> = Vec::new();
    let mut nodes: u64 = 0;

    loop {
        nodes += 1;
        if nodes > MAX_NODES {
            return SearchOutcome::Timeout;
        }
        if let Some(dl) = deadline {
            if Instant::now() >= dl {
                return SearchOutcome::Timeout;
            }
        }

        let result = propagate(&mut bounds, &model.linear, &model.aggregates);

        if result.is_err() {
            if !backtrack(&mut bounds, &mut trail) {
                return SearchOutcome::Infeasible;
            }
            continue;
        }

        if let Some(idx) = bounds.iter().position(|b| !b.is_singleton()) {
            let b = bounds[idx];
            trail.push(Decision {
                var: idx,
                tried_lo: b.lo,
                saved: bounds.clone(),
            });
            bounds[idx] = Bound { lo: b.lo, hi: b.lo };
            continue;
        }

        if model.aggregates.iter().all(|a| aggregate_holds(a, &bounds)) {
            return SearchOutcome::Solved(bounds);
        }

        if !backtrack(&mut bounds, &mut trail) {
            return SearchOutcome::Infeasible;
        }
    }
}

fn backtrack(bounds: &mut Vec<Bound>, trail: &mut Vec<Decision>) -> bool {
    while let Some(d) = trail.pop() {
        let domain_hi = d.saved[d.var].hi;
        let next_lo = d.tried_lo + 1;
        if next_lo > domain_hi {
            continue;
        }
        let mut restored = d.saved;
        restored[d.var] = Bound {
            lo: next_lo,
            hi: domain_hi,
        };
        *bounds = restored;
        return true;
    }
    false
}
