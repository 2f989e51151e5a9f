//! The backward (outside) recursion for base-pair probabilities.
//!
//! For every forward matrix the recursion computes the outside weight
//! of each cell divided by the total partition function: the exterior
//! loop first, then columns by decreasing j, so every enclosing cell is
//! final before its weight is passed on. Each forward decomposition is
//! reversed with the factors the forward pass used, taken from
//! [`LoopTerms`]. The probability of (i,j) is its outside weight times
//! `qb[i,j]`.

use std::ops::ControlFlow;

use log::debug;
use log::warn;
use ndarray::Array2;
use ff_energy::TURN;

use crate::circular::for_each_seam_partner;
use crate::Decomposition;
use crate::FoldingContext;
use crate::LoopTerms;
use crate::PfError;
use crate::PfMatrices;
use crate::TriMatrix;

/// Base-pair (and quadruplex) probabilities of the ensemble.
#[derive(Debug, Clone)]
pub struct PairProbabilities {
    n: usize,
    probs: TriMatrix<f64>,
    gquad: Option<TriMatrix<f64>>,
    overflows: usize,
}

impl PairProbabilities {
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Probability that i and j are paired (symmetric in i, j).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (i, j) = (i.min(j), i.max(j));
        if i == 0 || j > self.n || i == j {
            return 0.0;
        }
        self.probs[(i, j)]
    }

    /// Probability of a quadruplex spanning exactly i..=j.
    pub fn gquad(&self, i: usize, j: usize) -> f64 {
        self.gquad.as_ref().map_or(0.0, |g| if i >= 1 && j <= self.n { g.get(i, j) } else { 0.0 })
    }

    /// Probability that i is unpaired.
    pub fn unpaired(&self, i: usize) -> f64 {
        let paired: f64 = (1..=self.n).map(|k| self.get(i, k)).sum();
        (1.0 - paired).max(0.0)
    }

    /// All pairs with a probability of at least `cutoff`, sorted by position.
    pub fn pairs_above(&self, cutoff: f64) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::new();
        for i in 1..=self.n {
            for j in i + 1..=self.n {
                let p = self.probs[(i, j)];
                if p >= cutoff && p > 0.0 {
                    out.push((i, j, p));
                }
            }
        }
        out
    }

    /// Dense symmetric matrix, indexed 0-based.
    pub fn to_array2(&self) -> Array2<f64> {
        let n = self.n;
        let mut a = Array2::zeros((n, n));
        for i in 1..=n {
            for j in i + 1..=n {
                let p = self.probs[(i, j)];
                a[(i - 1, j - 1)] = p;
                a[(j - 1, i - 1)] = p;
            }
        }
        a
    }

    /// Number of entries that overflowed and were clamped.
    pub fn overflows(&self) -> usize {
        self.overflows
    }

    pub fn is_degraded(&self) -> bool {
        self.overflows > 0
    }
}

/// Outside weights of one column of `qm1`, and of the column to its
/// left which is being accumulated. Rotating moves one column left.
#[derive(Debug)]
pub(crate) struct RowBuffers {
    rows: [Vec<f64>; 2],
    current: usize,
}

impl RowBuffers {
    pub(crate) fn new(n: usize) -> Self {
        RowBuffers {
            rows: [vec![0.0; n + 2], vec![0.0; n + 2]],
            current: 0,
        }
    }

    /// (current, next)
    pub(crate) fn split(&mut self) -> (&mut [f64], &mut [f64]) {
        let (a, b) = self.rows.split_at_mut(1);
        if self.current == 0 {
            (a[0].as_mut_slice(), b[0].as_mut_slice())
        } else {
            (b[0].as_mut_slice(), a[0].as_mut_slice())
        }
    }

    /// The next row becomes current, the new next row is cleared.
    pub(crate) fn rotate(&mut self) {
        self.rows[self.current].fill(0.0);
        self.current ^= 1;
    }
}

/// Outside weights (divided by Z) of the matrices below the exterior loop.
struct Outside {
    qb: TriMatrix<f64>,
    qm: TriMatrix<f64>,
    g: Option<TriMatrix<f64>>,
    qm1: RowBuffers,
    /// Circular: outside weight of `qm2[k]`.
    qm2: Vec<f64>,
}

/// Linear: the exterior loop of 1..=n, following the decomposition
/// `Q[1,j] = qq[1,j] + unpaired + sum_k Q[1,k] qq[k+1,j]`.
fn exterior_linear(terms: &LoopTerms<'_>, m: &PfMatrices, out: &mut Outside) {
    let n = m.len();
    let mut q_out = vec![0.0; n + 1];
    q_out[n] = 1.0 / m.total();
    let mut qq_out: TriMatrix<f64> = TriMatrix::new(n);
    for j in (1..=n).rev() {
        let outside = q_out[j];
        if outside == 0.0 {
            continue;
        }
        qq_out[(1, j)] += outside;
        for k in 1..j {
            let stem = m.qq(k + 1, j);
            if stem == 0.0 {
                continue;
            }
            let w = outside * terms.weight(1, j, k, k + 1, Decomposition::ExteriorConcat);
            q_out[k] += w * stem;
            qq_out[(k + 1, j)] += w * m.q(1, k);
        }
    }
    for i in 1..=n {
        for j in (i..=n).rev() {
            let outside = qq_out[(i, j)];
            if outside == 0.0 {
                continue;
            }
            out.qb[(i, j)] += outside * terms.ext_stem(i, j);
            if let Some(g) = out.g.as_mut() {
                g[(i, j)] += outside;
            }
            if j > i && m.qq(i, j - 1) > 0.0 {
                qq_out[(i, j - 1)] += outside
                    * terms.ext_unpaired(j, 1)
                    * terms.weight(i, j, j - 1, j, Decomposition::ExteriorExtend);
            }
        }
    }
}

/// Circular: the exterior loop closed across the seam.
fn exterior_circular(terms: &LoopTerms<'_>, m: &PfMatrices, out: &mut Outside) {
    let n = m.len();
    let z = m.total();
    for p in 1..=n {
        for q in p + TURN + 1..=n {
            let qb = m.qb(p, q);
            if qb == 0.0 {
                continue;
            }
            out.qb[(p, q)] += terms.seam_hairpin(p, q) / z;
            for_each_seam_partner(n, p, q, |k, l| {
                let inner = m.qb(k, l);
                if inner > 0.0 {
                    let w = terms.seam_interior(p, q, k, l) / z;
                    out.qb[(p, q)] += inner * w;
                    out.qb[(k, l)] += qb * w;
                }
            });
        }
    }

    let closing = terms.seam_multi() / z;
    for k in TURN + 2..n.saturating_sub(2 * TURN + 3) {
        out.qm[(1, k)] += closing * m.qm2(k + 1);
        out.qm2[k + 1] += closing * m.qm(1, k);
    }

    // The rightmost branch of the seam loop ends in column n.
    let (last, _) = out.qm1.split();
    for (k, &outside) in out.qm2.iter().enumerate() {
        if outside == 0.0 {
            continue;
        }
        for u in k + TURN + 1..n.saturating_sub(TURN + 1) {
            last[u + 1] += outside * m.qm1(k, u);
        }
    }
}

/// Circular: outside weight of the left branch of `qm2[k]` ending at u.
fn seam_split(m: &PfMatrices, qm2_out: &[f64], u: usize, column: &mut [f64]) {
    let n = m.len();
    if u + TURN + 2 > n {
        return;
    }
    let right = m.qm1(u + 1, n);
    if right == 0.0 {
        return;
    }
    for k in 1..u.saturating_sub(TURN) {
        column[k] += qm2_out[k] * right;
    }
}

#[inline]
fn clamp(p: f64, overflows: &mut usize) -> f64 {
    if !p.is_finite() || p > f64::MAX {
        *overflows += 1;
        f64::MAX
    } else {
        p
    }
}

pub(crate) fn backward(ctx: &FoldingContext, m: &PfMatrices) -> Result<PairProbabilities, PfError> {
    let n = ctx.len();
    let terms = ctx.terms();
    let z = m.total();
    if !(z > 0.0) {
        return Err(PfError::EmptyEnsemble);
    }

    let mut out = Outside {
        qb: TriMatrix::new(n),
        qm: TriMatrix::new(n),
        g: m.has_gquad().then(|| TriMatrix::new(n)),
        qm1: RowBuffers::new(n),
        qm2: vec![0.0; n + 2],
    };
    if ctx.is_circular() {
        exterior_circular(&terms, m, &mut out);
    } else {
        exterior_linear(&terms, m, &mut out);
    }

    // Column by column, right to left. Within a column, increasing i:
    // qm[i,j] hands weight to qm1[k,j] (k > i), qm1[i,j] to qb[i,j],
    // and everything else goes to strictly shorter columns.
    for j in (1..=n).rev() {
        let (qm1_out, qm1_next) = out.qm1.split();
        if ctx.is_circular() && j < n {
            seam_split(m, &out.qm2, j, qm1_out);
        }
        for i in 1..=j {
            if j - i <= TURN {
                continue;
            }

            let outside = out.qm[(i, j)];
            if outside != 0.0 {
                qm1_out[i] += outside;
                for k in i + 1..=j {
                    let right = m.qm1(k, j);
                    if right == 0.0 {
                        continue;
                    }
                    out.qm[(i, k - 1)] += outside * right;
                    let mut left = m.qm(i, k - 1);
                    let up = terms.ml_unpaired(i, k - i);
                    if up > 0.0 {
                        left += up * terms.weight(i, j, k, j, Decomposition::MultiExtend5);
                    }
                    qm1_out[k] += outside * left;
                }
            }

            let outside = qm1_out[i];
            if outside != 0.0 {
                out.qb[(i, j)] += outside * terms.ml_stem(i, j);
                if let Some(g) = out.g.as_mut() {
                    g[(i, j)] += outside * terms.ml_quadruplex();
                }
                if m.qm1(i, j - 1) > 0.0 {
                    qm1_next[i] += outside
                        * terms.ml_unpaired(j, 1)
                        * terms.weight(i, j, j - 1, j, Decomposition::MultiExtend3);
                }
            }

            let outside = out.qb[(i, j)];
            if outside == 0.0 || m.qb(i, j) == 0.0 {
                continue;
            }
            let qb_out = &mut out.qb;
            let _ = terms.visit_interior(i, j, |k, l, w| {
                qb_out[(k, l)] += outside * w;
                ControlFlow::<()>::Continue(())
            });
            if let Some(g) = out.g.as_mut() {
                let _ = terms.visit_gquad_interior(i, j, |k, l, w| {
                    g[(k, l)] += outside * w;
                    ControlFlow::<()>::Continue(())
                });
            }
            let closing = terms.multi_closing(i, j);
            if closing > 0.0 {
                let outside = outside * closing;
                for k in i + TURN + 3..(j - 1).saturating_sub(TURN) {
                    out.qm[(i + 1, k - 1)] += outside * m.qm1(k, j - 1);
                    qm1_next[k] += outside * m.qm(i + 1, k - 1);
                }
            }
        }
        out.qm1.rotate();
    }

    let mut overflows = 0;
    let mut probs = out.qb;
    for i in 1..=n {
        for j in i..=n {
            let qb = m.qb(i, j);
            probs[(i, j)] = if qb > 0.0 { clamp(probs[(i, j)] * qb, &mut overflows) } else { 0.0 };
        }
    }
    let mut gprobs = out.g;
    if let Some(g) = gprobs.as_mut() {
        for i in 1..=n {
            for j in i..=n {
                let gij = m.g(i, j);
                g[(i, j)] = if gij > 0.0 { clamp(g[(i, j)] * gij, &mut overflows) } else { 0.0 };
            }
        }
    }
    if overflows > 0 {
        warn!("{overflows} base-pair probabilities overflowed, consider a larger pf_scale.");
    }
    debug!("Backward recursion done ({overflows} overflows).");

    Ok(PairProbabilities { n, probs, gquad: gprobs, overflows })
}

/// Probability that (i,j) and (i+1,j-1) are both formed.
pub(crate) fn stack_probabilities(
    ctx: &FoldingContext,
    m: &PfMatrices,
    probs: &PairProbabilities,
    cutoff: f64,
) -> Vec<(usize, usize, f64)> {
    let n = ctx.len();
    let terms = ctx.terms();
    let mut out = Vec::new();
    for i in 1..=n {
        for j in i + TURN + 3..=n {
            let p = probs.get(i, j);
            let qb = m.qb(i, j);
            if p < cutoff || qb < f64::MIN_POSITIVE {
                continue;
            }
            let ps = p * m.qb(i + 1, j - 1) / qb * terms.interior(i, j, i + 1, j - 1);
            if ps > cutoff {
                out.push((i, j, ps));
            }
        }
    }
    out
}
