//! The dynamic programming matrices of one computation.

use crate::TriMatrix;

/// Partition functions of the circular post-processing step.
#[derive(Debug, Clone, PartialEq)]
pub struct CircularTotals {
    /// `qm2[k]`: segment k..=n split into exactly two multi-loop branches.
    pub qm2: Vec<f64>,
    /// Hairpin across the seam.
    pub qho: f64,
    /// Interior loop across the seam.
    pub qio: f64,
    /// Multi-branch loop across the seam.
    pub qmo: f64,
    /// All of the above plus the open chain.
    pub qo: f64,
}

/// Forward matrices, all scaled by `scale[j-i+1]`.
///
/// - `q[i,j]`: i..j as an exterior loop segment.
/// - `qq[i,j]`: exterior segment i..j whose first nucleotide i starts a
///   stem (or a quadruplex), followed by unpaired nucleotides up to j.
/// - `qb[i,j]`: i..j with i and j paired.
/// - `qm[i,j]`: i..j inside a multi-branch loop with at least one branch.
/// - `qm1[i,j]`: exactly one branch starting at i, unpaired up to j.
/// - `g[i,j]`: quadruplexes spanning exactly i..j.
#[derive(Debug, Clone)]
pub struct PfMatrices {
    n: usize,
    pub(crate) q: TriMatrix<f64>,
    pub(crate) qq: TriMatrix<f64>,
    pub(crate) qb: TriMatrix<f64>,
    pub(crate) qm: TriMatrix<f64>,
    pub(crate) qm1: TriMatrix<f64>,
    pub(crate) g: Option<TriMatrix<f64>>,
    pub(crate) circular: Option<CircularTotals>,
}

impl PfMatrices {
    pub(crate) fn new(n: usize, gquad: bool) -> Self {
        PfMatrices {
            n,
            q: TriMatrix::new(n),
            qq: TriMatrix::new(n),
            qb: TriMatrix::new(n),
            qm: TriMatrix::new(n),
            qm1: TriMatrix::new(n),
            g: gquad.then(|| TriMatrix::new(n)),
            circular: None,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    pub fn q(&self, i: usize, j: usize) -> f64 {
        self.q.get(i, j)
    }

    /// Like [`PfMatrices::q`], but the empty segment (j < i) has weight 1.
    #[inline]
    pub fn exterior(&self, i: usize, j: usize) -> f64 {
        if j < i { 1.0 } else { self.q[(i, j)] }
    }

    #[inline]
    pub fn qq(&self, i: usize, j: usize) -> f64 {
        self.qq.get(i, j)
    }

    #[inline]
    pub fn qb(&self, i: usize, j: usize) -> f64 {
        self.qb.get(i, j)
    }

    #[inline]
    pub fn qm(&self, i: usize, j: usize) -> f64 {
        self.qm.get(i, j)
    }

    #[inline]
    pub fn qm1(&self, i: usize, j: usize) -> f64 {
        self.qm1.get(i, j)
    }

    #[inline]
    pub fn g(&self, i: usize, j: usize) -> f64 {
        self.g.as_ref().map_or(0.0, |g| g.get(i, j))
    }

    pub fn has_gquad(&self) -> bool {
        self.g.is_some()
    }

    pub fn circular(&self) -> Option<&CircularTotals> {
        self.circular.as_ref()
    }

    #[inline]
    pub fn qm2(&self, k: usize) -> f64 {
        self.circular.as_ref().and_then(|c| c.qm2.get(k).copied()).unwrap_or(0.0)
    }

    /// The (scaled) partition function of the whole sequence.
    pub fn total(&self) -> f64 {
        match &self.circular {
            Some(c) => c.qo,
            None => self.q.get(1, self.n),
        }
    }
}
