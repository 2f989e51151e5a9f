//! Scaled Boltzmann factors of single loop decompositions.
//!
//! Every engine (forward, circular, backward, sampler) obtains its loop
//! weights from [`LoopTerms`]. A term already includes the hard
//! constraint gate, the soft constraint factors, the generalized
//! decomposition weight and the rescaling for the nucleotides it
//! accounts for, so the same decomposition has the same weight
//! wherever it is used.
//!
//! Nucleotides are accounted for as follows: a hairpin or interior loop
//! term covers its closing pair and unpaired nucleotides, a multi-loop
//! closing term covers the closing pair, unpaired terms cover the
//! unpaired stretch. Stems entering a multi-branch or exterior loop are
//! not rescaled.

use std::ops::ControlFlow;

use ff_energy::BoltzmannFactors;
use ff_energy::PairType;
use ff_energy::MAXLOOP;
use ff_energy::TURN;

use crate::Context;
use crate::Decomposition;
use crate::ExpSoftConstraints;
use crate::FoldingContext;
use crate::HardConstraints;
use crate::LoopKind;
use crate::Scaling;
use crate::GQUAD_MIN_SPAN;

#[derive(Debug, Clone, Copy)]
pub struct LoopTerms<'a> {
    ctx: &'a FoldingContext,
    bf: &'a BoltzmannFactors,
    hc: &'a HardConstraints,
    sc: Option<&'a ExpSoftConstraints>,
    scaling: &'a Scaling,
    n: usize,
}

impl<'a> LoopTerms<'a> {
    pub fn new(ctx: &'a FoldingContext) -> Self {
        LoopTerms {
            ctx,
            bf: ctx.boltzmann_factors(),
            hc: ctx.hard_constraints(),
            sc: ctx.soft_constraints(),
            scaling: ctx.scaling(),
            n: ctx.len(),
        }
    }

    #[inline]
    fn sc_unpaired(&self, i: usize, u: usize) -> f64 {
        self.sc.map_or(1.0, |sc| sc.unpaired(i, u))
    }

    #[inline]
    fn sc_pair(&self, i: usize, j: usize) -> f64 {
        self.sc.map_or(1.0, |sc| sc.pair(i, j))
    }

    #[inline]
    fn sc_stack(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.sc.map_or(1.0, |sc| sc.stack(i, j, k, l))
    }

    /// The generalized decomposition weight, 1 without soft constraints.
    #[inline]
    pub fn weight(&self, i: usize, j: usize, k: usize, l: usize, kind: Decomposition) -> f64 {
        self.sc.map_or(1.0, |sc| sc.weight(i, j, k, l, kind))
    }

    #[inline]
    fn allowed(&self, i: usize, j: usize, ctx: Context) -> Option<PairType> {
        if self.hc.pair(i, j).contains(ctx) {
            self.ctx.pair_type(i, j)
        } else {
            None
        }
    }

    /// Hairpin loop closed by (i,j).
    pub fn hairpin(&self, i: usize, j: usize) -> f64 {
        let Some(pt) = self.allowed(i, j, Context::HP) else {
            return 0.0;
        };
        let u = j - i - 1;
        if !self.hc.stretch_ok(LoopKind::Hairpin, i + 1, u) {
            return 0.0;
        }
        self.bf.hairpin(u, pt)
            * self.scaling.scale(u + 2)
            * self.sc_unpaired(i + 1, u)
            * self.sc_pair(i, j)
            * self.weight(i, j, i, j, Decomposition::Hairpin)
    }

    /// Interior loop closed by (i,j) enclosing (k,l).
    pub fn interior(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        if !(i < k && k < l && l < j) {
            return 0.0;
        }
        let (u1, u2) = (k - i - 1, j - l - 1);
        if u1 + u2 > MAXLOOP
            || !self.hc.stretch_ok(LoopKind::Interior, i + 1, u1)
            || !self.hc.stretch_ok(LoopKind::Interior, l + 1, u2)
        {
            return 0.0;
        }
        let Some(pt) = self.allowed(i, j, Context::INT) else {
            return 0.0;
        };
        if !self.hc.pair(k, l).contains(Context::INT_ENC) {
            return 0.0;
        }
        self.interior_unchecked(i, j, k, l, pt)
    }

    #[inline]
    fn interior_unchecked(&self, i: usize, j: usize, k: usize, l: usize, pt: PairType) -> f64 {
        let Some(pt_inner) = self.ctx.pair_type(l, k) else {
            return 0.0;
        };
        let (u1, u2) = (k - i - 1, j - l - 1);
        self.bf.interior(u1, u2, pt, pt_inner)
            * self.scaling.scale(u1 + u2 + 2)
            * self.sc_unpaired(i + 1, u1)
            * self.sc_unpaired(l + 1, u2)
            * self.sc_pair(i, j)
            * self.sc_stack(i, j, k, l)
            * self.weight(i, j, k, l, Decomposition::InteriorPair)
    }

    /// Calls `f(k, l, w)` for every interior loop closed by (i,j) with
    /// non-zero weight `w`, by increasing k and decreasing l.
    pub fn visit_interior<B>(
        &self,
        i: usize,
        j: usize,
        mut f: impl FnMut(usize, usize, f64) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let Some(pt) = self.allowed(i, j, Context::INT) else {
            return ControlFlow::Continue(());
        };
        if j < i + TURN + 3 {
            return ControlFlow::Continue(());
        }
        let maxk = (i + MAXLOOP + 1).min(j - TURN - 2).min(i + 1 + self.hc.up_int(i + 1));
        for k in i + 1..=maxk {
            let u1 = k - i - 1;
            let minl = (k + TURN + 1).max((j - 1 + u1).saturating_sub(MAXLOOP));
            for l in (minl..j).rev() {
                let u2 = j - l - 1;
                if self.hc.up_int(l + 1) < u2 {
                    break;
                }
                if !self.hc.pair(k, l).contains(Context::INT_ENC) {
                    continue;
                }
                let w = self.interior_unchecked(i, j, k, l, pt);
                if w > 0.0 {
                    f(k, l, w)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Closing (i,j) of a multi-branch loop, including the closing stem.
    pub fn multi_closing(&self, i: usize, j: usize) -> f64 {
        let Some(pt) = self.allowed(i, j, Context::ML) else {
            return 0.0;
        };
        let pt = pt.reversed();
        if !self.bf.can_close(pt) {
            return 0.0;
        }
        self.bf.ml_closing()
            * self.bf.ml_stem(pt)
            * self.scaling.scale(2)
            * self.sc_pair(i, j)
            * self.weight(i, j, i + 1, j - 1, Decomposition::MultiClose)
    }

    /// Stem (i,j) as a branch of a multi-branch loop.
    #[inline]
    pub fn ml_stem(&self, i: usize, j: usize) -> f64 {
        self.allowed(i, j, Context::ML_ENC).map_or(0.0, |pt| self.bf.ml_stem(pt))
    }

    /// A quadruplex as a branch of a multi-branch loop.
    #[inline]
    pub fn ml_quadruplex(&self) -> f64 {
        self.bf.ml_intern()
    }

    /// Stem (i,j) in the exterior loop.
    #[inline]
    pub fn ext_stem(&self, i: usize, j: usize) -> f64 {
        self.allowed(i, j, Context::EXT).map_or(0.0, |pt| self.bf.ext_stem(pt))
    }

    /// `u` unpaired nucleotides i..i+u in a multi-branch loop.
    #[inline]
    pub fn ml_unpaired(&self, i: usize, u: usize) -> f64 {
        if !self.hc.stretch_ok(LoopKind::Multi, i, u) {
            return 0.0;
        }
        self.scaling.ml_base(u) * self.sc_unpaired(i, u)
    }

    /// `u` unpaired nucleotides i..i+u in the exterior loop.
    #[inline]
    pub fn ext_unpaired(&self, i: usize, u: usize) -> f64 {
        if !self.hc.stretch_ok(LoopKind::Exterior, i, u) {
            return 0.0;
        }
        self.scaling.scale(u) * self.sc_unpaired(i, u)
    }

    /// A quadruplex spanning k..=l as the only element inside (i,j).
    pub fn gquad_interior(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        if !(i < k && k < l && l < j) {
            return 0.0;
        }
        let (u1, u2) = (k - i - 1, j - l - 1);
        let u = u1 + u2;
        if u > MAXLOOP || (u1 == 0 && u2 < 3) || (u2 == 0 && u1 < 3) {
            return 0.0;
        }
        if !self.hc.stretch_ok(LoopKind::Interior, i + 1, u1)
            || !self.hc.stretch_ok(LoopKind::Interior, l + 1, u2)
        {
            return 0.0;
        }
        let Some(pt) = self.allowed(i, j, Context::INT) else {
            return 0.0;
        };
        self.bf.gquad_interior(u, pt)
            * self.scaling.scale(u + 2)
            * self.sc_unpaired(i + 1, u1)
            * self.sc_unpaired(l + 1, u2)
            * self.sc_pair(i, j)
    }

    /// Calls `f(k, l, w)` for every quadruplex position (k,l) that may be
    /// enclosed by (i,j), see [`LoopTerms::gquad_interior`].
    pub fn visit_gquad_interior<B>(
        &self,
        i: usize,
        j: usize,
        mut f: impl FnMut(usize, usize, f64) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        if self.allowed(i, j, Context::INT).is_none() || j < i + GQUAD_MIN_SPAN + 4 {
            return ControlFlow::Continue(());
        }
        for k in i + 1..=(i + MAXLOOP + 1).min(j - 1) {
            let u1 = k - i - 1;
            let minl = (k + GQUAD_MIN_SPAN - 1).max((j - 1 + u1).saturating_sub(MAXLOOP));
            for l in (minl..j).rev() {
                let w = self.gquad_interior(i, j, k, l);
                if w > 0.0 {
                    f(k, l, w)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Circular: the exterior loop closed by (p,q) across the seam is a
    /// hairpin with the nucleotides q+1..n and 1..p-1.
    pub fn seam_hairpin(&self, p: usize, q: usize) -> f64 {
        let n = self.n;
        if !self.hc.pair(p, q).contains(Context::HP) {
            return 0.0;
        }
        let Some(pt) = self.ctx.pair_type(q, p) else {
            return 0.0;
        };
        let u = n - q + p - 1;
        if !self.hc.stretch_ok(LoopKind::Hairpin, q + 1, n - q)
            || !self.hc.stretch_ok(LoopKind::Hairpin, 1, p - 1)
        {
            return 0.0;
        }
        self.bf.hairpin(u, pt)
            * self.scaling.scale(u)
            * self.sc_unpaired(q + 1, n - q)
            * self.sc_unpaired(1, p - 1)
    }

    /// Circular: the exterior loop is an interior loop formed by
    /// (p,q) and (k,l), p < q < k < l, closed across the seam by (l,k).
    pub fn seam_interior(&self, p: usize, q: usize, k: usize, l: usize) -> f64 {
        let n = self.n;
        if !(q < k && l <= n) {
            return 0.0;
        }
        let (u1, u2) = ((p - 1) + (n - l), k - q - 1);
        if u1 + u2 > MAXLOOP
            || !self.hc.pair(p, q).contains(Context::INT_ENC)
            || !self.hc.pair(k, l).contains(Context::INT)
            || !self.hc.stretch_ok(LoopKind::Interior, 1, p - 1)
            || !self.hc.stretch_ok(LoopKind::Interior, l + 1, n - l)
            || !self.hc.stretch_ok(LoopKind::Interior, q + 1, u2)
        {
            return 0.0;
        }
        let (Some(outer), Some(inner)) = (self.ctx.pair_type(l, k), self.ctx.pair_type(q, p)) else {
            return 0.0;
        };
        self.bf.interior(u1, u2, outer, inner)
            * self.scaling.scale(u1 + u2)
            * self.sc_unpaired(1, p - 1)
            * self.sc_unpaired(l + 1, n - l)
            * self.sc_unpaired(q + 1, u2)
    }

    /// Circular: the exterior loop as a multi-branch loop (no closing pair).
    pub fn seam_multi(&self) -> f64 {
        self.bf.ml_closing()
    }

    /// Circular: all nucleotides unpaired.
    pub fn open_chain(&self) -> f64 {
        self.ext_unpaired(1, self.n)
    }
}
