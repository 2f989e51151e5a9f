//! Partition functions of circular sequences.
//!
//! In a circular molecule the exterior loop is closed across the seam
//! between n and 1. Given the forward matrices of the linear sequence,
//! the exterior loop is either the open chain (no pairs), a hairpin
//! closed by one pair, an interior loop formed by two pairs, or a
//! multi-branch loop with at least three branches.

use log::debug;
use ff_energy::MAXLOOP;
use ff_energy::TURN;

use crate::CircularTotals;
use crate::FoldingContext;
use crate::PfError;
use crate::PfMatrices;

/// Calls `f(k, l)` for every pair (k,l) downstream of (p,q) that may
/// form a seam interior loop with it.
pub(crate) fn for_each_seam_partner(n: usize, p: usize, q: usize, mut f: impl FnMut(usize, usize)) {
    let outer = p - 1;
    if outer > MAXLOOP {
        return;
    }
    for k in q + 1..=(q + 1 + MAXLOOP - outer).min(n) {
        let u2 = k - q - 1;
        let minl = (k + TURN + 1).max(n.saturating_sub(MAXLOOP - outer - u2));
        for l in minl..=n {
            f(k, l);
        }
    }
}

pub(crate) fn circular(ctx: &FoldingContext, m: &mut PfMatrices) -> Result<(), PfError> {
    let n = ctx.len();
    let terms = ctx.terms();

    // Two branches on k..=n.
    let mut qm2 = vec![0.0; n + 2];
    for k in 1..(n.saturating_sub(TURN + 1)) {
        let mut s = 0.0;
        for u in k + TURN + 1..n.saturating_sub(TURN + 1) {
            s += m.qm1(k, u) * m.qm1(u + 1, n);
        }
        qm2[k] = s;
    }

    let mut qho = 0.0;
    let mut qio = 0.0;
    for p in 1..=n {
        for q in p + TURN + 1..=n {
            let qb = m.qb(p, q);
            if qb == 0.0 {
                continue;
            }
            qho += qb * terms.seam_hairpin(p, q);
            for_each_seam_partner(n, p, q, |k, l| {
                let inner = m.qb(k, l);
                if inner > 0.0 {
                    qio += qb * inner * terms.seam_interior(p, q, k, l);
                }
            });
        }
    }

    let mut qmo = 0.0;
    for k in TURN + 2..n.saturating_sub(2 * TURN + 3) {
        qmo += m.qm(1, k) * qm2[k + 1];
    }
    qmo *= terms.seam_multi();

    let qo = qho + qio + qmo + terms.open_chain();
    if !qo.is_finite() || qo >= f64::MAX {
        return Err(PfError::ForwardOverflow { i: 1, j: n });
    }
    debug!("Circular: qho = {qho:e}, qio = {qio:e}, qmo = {qmo:e}, qo = {qo:e}.");

    m.circular = Some(CircularTotals { qm2, qho, qio, qmo, qo });
    Ok(())
}
