//! Interval bound propagation to a fixpoint. Sound but not complete
//! for the `AggregateCon` global constraint — full consistency
//! (the target actually equalling some child, not merely bracketed by
//! the children's bounds) is checked once a candidate assignment is
//! fully bound, in `search.rs`.

use super::model::{AggKind, AggregateCon, Bound, LinearCon, Rel};

/// Runs propagation to a fixpoint over `bounds`, given a fixed set of
/// linear and aggregate constraints. Returns `Ok(())` if bounds remain
/// consistent, `Err(())` the moment any variable's domain empties.
pub(crate) fn propagate(
    bounds: &mut [Bound],
    linear: &[LinearCon],
    aggregates: &[AggregateCon],
) -> Result<(), ()> {
    loop {
        let mut changed = false;

        for con in linear {
            changed |= tighten_linear(con, bounds)?;
        }
        for agg in aggregates {
            changed |= tighten_aggregate(agg, bounds)?;
        }

        if !changed {
            return Ok(());
        }
    }
}

/// `Σ a_i x_i {rel} rhs`. For each term `a_i x_i`, derive a bound on
/// `x_i` from the bounds of every other term; tighten if it narrows
/// the existing bound.
fn tighten_linear(con: &LinearCon, bounds: &mut [Bound]) -> Result<bool, ()> {
    let mut changed = false;

    let relations: Vec<Rel> = match con.rel {
        Rel::Eq => vec![Rel::Le, Rel::Ge],
        other => vec![other],
    };

    for &rel in &relations {
        for &(idx, coeff) in &con.terms {
            if coeff == 0 {
                continue;
            }

            let mut others_lo: i64 = -con.rhs;
            let mut others_hi: i64 = -con.rhs;
            let mut overflow = false;
            for &(j, c) in &con.terms {
                if j == idx {
                    continue;
                }
                let b = bounds[j];
                let (lo_term, hi_term) = if c >= 0 {
                    (c.saturating_mul(b.lo), c.saturating_mul(b.hi))
                } else {
                    (c.saturating_mul(b.hi), c.saturating_mul(b.lo))
                };
                others_lo = others_lo.saturating_add(lo_term);
                others_hi = others_hi.saturating_add(hi_term);
                if lo_term.unsigned_abs() > i64::MAX as u64 / 2 {
                    overflow = true;
                }
            }
            if overflow {
                continue;
            }

            // rel applied to `coeff * x_i + others <= /= 0` (rhs folded above
            // via `-rhs` seed), i.e. `coeff * x_i {rel} -others`.
            let bound = bounds[idx];
            let new_bound = match rel {
                Rel::Le => bound_from_le(coeff, -others_lo, bound),
                Rel::Ge => bound_from_ge(coeff, -others_hi, bound),
                Rel::Eq => unreachable!("Eq is split into Le/Ge above"),
            };

            let Some(new_bound) = new_bound else { continue };
            if new_bound.is_empty() {
                return Err(());
            }
            if new_bound.lo > bound.lo || new_bound.hi < bound.hi {
                bounds[idx] = Bound {
                    lo: bound.lo.max(new_bound.lo),
                    hi: bound.hi.min(new_bound.hi),
                };
                changed = true;
            }
        }
    }

    Ok(changed)
}

/// From `coeff * x <= target`, derive a bound on `x`.
fn bound_from_le(coeff: i64, target: i64, current: Bound) -> Option<Bound> {
    if coeff > 0 {
        Some(Bound {
            lo: current.lo,
            hi: div_floor(target, coeff),
        })
    } else {
        Some(Bound {
            lo: div_ceil(target, coeff),
            hi: current.hi,
        })
    }
}

/// From `coeff * x >= target`, derive a bound on `x`.
fn bound_from_ge(coeff: i64, target: i64, current: Bound) -> Option<Bound> {
    if coeff > 0 {
        Some(Bound {
            lo: div_ceil(target, coeff),
            hi: current.hi,
        })
    } else {
        Some(Bound {
            lo: current.lo,
            hi: div_floor(target, coeff),
        })
    }
}

/// Floor of the real quotient `a / b`, for any nonzero `b`.
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Ceiling of the real quotient `a / b`, for any nonzero `b`.
fn div_ceil(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) == (b < 0) {
        q + 1
    } else {
        q
    }
}

fn tighten_aggregate(agg: &AggregateCon, bounds: &mut [Bound]) -> Result<bool, ()> {
    let mut changed = false;
    let target = bounds[agg.target];

    match agg.kind {
        AggKind::Min => {
            let children_lo = agg.children.iter().map(|&c| bounds[c].lo).min().unwrap();
            let children_hi = agg.children.iter().map(|&c| bounds[c].hi).min().unwrap();
            let new_target = Bound {
                lo: target.lo.max(children_lo),
                hi: target.hi.min(children_hi),
            };
            if new_target.is_empty() {
                return Err(());
            }
            if new_target.lo > target.lo || new_target.hi < target.hi {
                bounds[agg.target] = new_target;
                changed = true;
            }
            for &c in &agg.children {
                let cb = bounds[c];
                if cb.lo < bounds[agg.target].lo {
                    let nb = Bound {
                        lo: bounds[agg.target].lo,
                        hi: cb.hi,
                    };
                    if nb.is_empty() {
                        return Err(());
                    }
                    bounds[c] = nb;
                    changed = true;
                }
            }
        }
        AggKind::Max => {
            let children_lo = agg.children.iter().map(|&c| bounds[c].lo).max().unwrap();
            let children_hi = agg.children.iter().map(|&c| bounds[c].hi).max().unwrap();
            let new_target = Bound {
                lo: target.lo.max(children_lo),
                hi: target.hi.min(children_hi),
            };
            if new_target.is_empty() {
                return Err(());
            }
            if new_target.lo > target.lo || new_target.hi < target.hi {
                bounds[agg.target] = new_target;
                changed = true;
            }
            for &c in &agg.children {
                let cb = bounds[c];
                if cb.hi > bounds[agg.target].hi {
                    let nb = Bound {
                        lo: cb.lo,
                        hi: bounds[agg.target].hi,
                    };
                    if nb.is_empty() {
                        return Err(());
                    }
                    bounds[c] = nb;
                    changed = true;
                }
            }
        }
    }

    Ok(changed)
}

/// Whether an aggregate's current singleton bounds are actually
/// consistent: the target must equal at least one child, not merely
/// lie within their span.
pub(crate) fn aggregate_holds(agg: &AggregateCon, bounds: &[Bound]) -> bool {
    let target = bounds[agg.target].lo;
    match agg.kind {
        AggKind::Min => agg.children.iter().any(|&c| bounds[c].lo == target) && agg
            .children
            .iter()
            .all(|&c| bounds[c].lo >= target),
        AggKind::Max => agg.children.iter().any(|&c| bounds[c].hi == target) && agg
            .children
            .iter()
            .all(|&c| bounds[c].hi <= target),
    }
}
