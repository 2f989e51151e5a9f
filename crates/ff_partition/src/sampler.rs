//! Stochastic backtracking through the forward matrices.
//!
//! Every decision picks one decomposition of the current region with
//! probability proportional to its contribution to the region's
//! partition function. The accumulated contributions are compared to
//! `r * total` with `r` uniform in [0,1). The decompositions and their
//! factors are those of the forward recursion, so the candidates of a
//! region add up to its matrix entry. A threshold left uncovered by more
//! than rounding is reported as [`PfError::BacktrackFailed`].

use std::fmt;
use std::ops::ControlFlow;

use rand::Rng;
use ff_energy::TURN;
use ff_structure::DotBracketVec;
use ff_structure::Pair;
use ff_structure::PairSet;
use ff_structure::NAIDX;

use crate::circular::for_each_seam_partner;
use crate::Decomposition;
use crate::FoldingContext;
use crate::LoopTerms;
use crate::PfError;
use crate::PfMatrices;

/// A quadruplex drawn by the sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quadruplex {
    pub i: usize,
    pub j: usize,
    /// The G positions, empty if the model does not provide a layout.
    pub positions: Vec<usize>,
}

/// One structure drawn from the Boltzmann ensemble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledStructure {
    pairs: PairSet,
    quadruplexes: Vec<Quadruplex>,
}

impl SampledStructure {
    pub fn len(&self) -> usize {
        self.pairs.length()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.length() == 0
    }

    pub fn pairs(&self) -> &PairSet {
        &self.pairs
    }

    pub fn quadruplexes(&self) -> &[Quadruplex] {
        &self.quadruplexes
    }

    /// Dot-bracket string with `+` at quadruplex positions. Without a
    /// layout the whole span of the quadruplex is marked.
    pub fn to_dot_bracket(&self) -> DotBracketVec {
        let mut dbv = DotBracketVec::from(&self.pairs);
        for g in &self.quadruplexes {
            if g.positions.is_empty() {
                dbv.mark_quadruplex(g.i..=g.j);
            } else {
                dbv.mark_quadruplex(g.positions.iter().copied());
            }
        }
        dbv
    }
}

impl fmt::Display for SampledStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dot_bracket())
    }
}

/// Relative slack between a threshold and the accumulated weight of
/// all candidates that is still attributed to rounding.
const TOLERANCE: f64 = 1e-9;

/// Candidate weights accumulated against a threshold `r` drawn
/// uniformly from [0, total).
struct Scan<T> {
    r: f64,
    total: f64,
    acc: f64,
    last: Option<T>,
}

impl<T> Scan<T> {
    fn new(r: f64, total: f64) -> Self {
        Scan { r, total, acc: 0.0, last: None }
    }

    /// Adds a candidate, true once the threshold is reached.
    fn push(&mut self, w: f64, candidate: T) -> bool {
        if w > 0.0 {
            self.acc += w;
            self.last = Some(candidate);
        }
        self.r < self.acc
    }

    /// The selected candidate. If the candidates fall short of the
    /// threshold by more than rounding, the matrices and the
    /// decompositions disagree.
    fn finish(self, region: &'static str, i: usize, j: usize) -> Result<T, PfError> {
        match self.last {
            Some(c) if self.r - self.acc <= TOLERANCE * self.total => Ok(c),
            _ => Err(PfError::BacktrackFailed { region, i, j }),
        }
    }
}

fn stop(hit: bool) -> ControlFlow<()> {
    if hit { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
}

/// `tail[l]`: weight of l+1..=j unpaired behind an element ending at l,
/// `extend(l)` being the factor for appending l.
fn tails(i: usize, j: usize, extend: impl Fn(usize) -> f64) -> Vec<f64> {
    let mut tail = vec![0.0; j + 2];
    tail[j] = 1.0;
    for l in (i + 1..=j).rev() {
        tail[l - 1] = tail[l] * extend(l);
    }
    tail
}

enum Choice {
    Hairpin,
    Interior(usize, usize),
    Quadruplex(usize, usize),
    Multi(usize),
}

enum Seam {
    Open,
    Hairpin(usize, usize),
    Interior(usize, usize, usize, usize),
    Multi(usize),
}

pub(crate) struct Sampler<'a, R: Rng + ?Sized> {
    ctx: &'a FoldingContext,
    terms: LoopTerms<'a>,
    m: &'a PfMatrices,
    rng: &'a mut R,
    pairs: PairSet,
    quadruplexes: Vec<Quadruplex>,
}

impl<'a, R: Rng + ?Sized> Sampler<'a, R> {
    pub(crate) fn new(ctx: &'a FoldingContext, m: &'a PfMatrices, rng: &'a mut R) -> Self {
        Sampler {
            ctx,
            terms: ctx.terms(),
            m,
            rng,
            pairs: PairSet::new(ctx.len()),
            quadruplexes: Vec::new(),
        }
    }

    /// A structure of the whole sequence.
    pub(crate) fn sample(mut self) -> Result<SampledStructure, PfError> {
        if !(self.m.total() > 0.0) {
            return Err(PfError::EmptyEnsemble);
        }
        if self.ctx.is_circular() {
            self.circular()?;
        } else {
            self.exterior(self.ctx.len())?;
        }
        Ok(self.finish())
    }

    /// A structure of the prefix 1..=length, the rest stays unpaired.
    pub(crate) fn sample_prefix(mut self, length: usize) -> Result<SampledStructure, PfError> {
        if self.ctx.is_circular() {
            return Err(PfError::Unsupported("prefix sampling of circular sequences"));
        }
        if length == 0 || length > self.ctx.len() {
            return Err(PfError::PrefixOutOfRange { length, max: self.ctx.len() });
        }
        if !(self.m.q(1, length) > 0.0) {
            return Err(PfError::EmptyEnsemble);
        }
        self.exterior(length)?;
        Ok(self.finish())
    }

    fn finish(self) -> SampledStructure {
        SampledStructure { pairs: self.pairs, quadruplexes: self.quadruplexes }
    }

    fn scan<T>(&mut self, total: f64) -> Scan<T> {
        Scan::new(self.rng.random::<f64>() * total, total)
    }

    fn add_pair(&mut self, i: usize, j: usize) {
        self.pairs.insert(Pair::new(i as NAIDX, j as NAIDX));
    }

    fn quadruplex(&mut self, i: usize, j: usize) {
        let r = self.rng.random::<f64>();
        let positions = self
            .ctx
            .quadruplex_model()
            .and_then(|model| model.layout(self.ctx.boltzmann_factors(), i, j, r))
            .unwrap_or_default();
        self.quadruplexes.push(Quadruplex { i, j, positions });
    }

    /// Adds the stem (i,l) and samples its interior, or adds a quadruplex.
    fn place(&mut self, i: usize, l: usize, is_gquad: bool) -> Result<(), PfError> {
        if is_gquad {
            self.quadruplex(i, l);
            Ok(())
        } else {
            self.add_pair(i, l);
            self.pair(i, l)
        }
    }

    /// Exterior loop of the segment 1..=length, from the 3' end: the
    /// last stem starts at p and 1..p-1 is the remaining segment.
    fn exterior(&mut self, length: usize) -> Result<(), PfError> {
        let m = self.m;
        let terms = self.terms;
        let mut j = length;
        while j > 0 {
            let mut scan = self.scan(m.q(1, j));
            if !scan.push(m.qq(1, j), Some(1)) {
                let up = terms.ext_unpaired(1, j);
                let done = up > 0.0
                    && scan.push(up * terms.weight(1, j, 1, j, Decomposition::ExteriorExtend), None);
                if !done {
                    for k in 1..j {
                        let stem = m.qq(k + 1, j);
                        if stem == 0.0 {
                            continue;
                        }
                        let w = m.q(1, k) * stem * terms.weight(1, j, k, k + 1, Decomposition::ExteriorConcat);
                        if scan.push(w, Some(k + 1)) {
                            break;
                        }
                    }
                }
            }
            match scan.finish("exterior loop", 1, j)? {
                None => return Ok(()),
                Some(p) => {
                    self.exterior_stem(p, j)?;
                    j = p - 1;
                }
            }
        }
        Ok(())
    }

    /// A stem (or quadruplex) starting at i, unpaired up to j.
    fn exterior_stem(&mut self, i: usize, j: usize) -> Result<(), PfError> {
        let m = self.m;
        let terms = self.terms;
        let tail = tails(i, j, |l| {
            terms.ext_unpaired(l, 1) * terms.weight(i, l, l - 1, l, Decomposition::ExteriorExtend)
        });
        let mut scan = self.scan(m.qq(i, j));
        for l in i..=j {
            if tail[l] == 0.0 {
                continue;
            }
            if scan.push(m.qb(i, l) * terms.ext_stem(i, l) * tail[l], (l, false))
                || scan.push(m.g(i, l) * tail[l], (l, true))
            {
                break;
            }
        }
        let (l, is_gquad) = scan.finish("exterior stem", i, j)?;
        self.place(i, l, is_gquad)
    }

    /// The loop closed by (i,j), which is already part of the structure.
    fn pair(&mut self, mut i: usize, mut j: usize) -> Result<(), PfError> {
        let m = self.m;
        let terms = self.terms;
        loop {
            let mut scan = self.scan(m.qb(i, j));
            let mut done = scan.push(terms.hairpin(i, j), Choice::Hairpin);
            if !done {
                done = terms
                    .visit_interior(i, j, |k, l, w| stop(scan.push(m.qb(k, l) * w, Choice::Interior(k, l))))
                    .is_break();
            }
            if !done && m.has_gquad() {
                done = terms
                    .visit_gquad_interior(i, j, |k, l, w| stop(scan.push(m.g(k, l) * w, Choice::Quadruplex(k, l))))
                    .is_break();
            }
            if !done {
                let closing = terms.multi_closing(i, j);
                if closing > 0.0 {
                    for k in i + TURN + 3..(j - 1).saturating_sub(TURN) {
                        if scan.push(closing * m.qm(i + 1, k - 1) * m.qm1(k, j - 1), Choice::Multi(k)) {
                            break;
                        }
                    }
                }
            }

            match scan.finish("pair", i, j)? {
                Choice::Hairpin => return Ok(()),
                Choice::Quadruplex(k, l) => {
                    self.quadruplex(k, l);
                    return Ok(());
                }
                Choice::Multi(k) => {
                    self.branch(k, j - 1)?;
                    return self.multi(i + 1, k - 1);
                }
                Choice::Interior(k, l) => {
                    self.add_pair(k, l);
                    i = k;
                    j = l;
                }
            }
        }
    }

    /// Segment i..=j of a multi-branch loop with at least one branch.
    fn multi(&mut self, i: usize, mut j: usize) -> Result<(), PfError> {
        let m = self.m;
        let terms = self.terms;
        loop {
            // (k, more): a branch starts at k, more branches in i..k-1.
            let mut scan = self.scan(m.qm(i, j));
            if !scan.push(m.qm1(i, j), (i, false)) {
                for k in i + 1..=j {
                    let right = m.qm1(k, j);
                    if right == 0.0 {
                        continue;
                    }
                    if scan.push(m.qm(i, k - 1) * right, (k, true)) {
                        break;
                    }
                    let up = terms.ml_unpaired(i, k - i);
                    if up > 0.0
                        && scan.push(up * right * terms.weight(i, j, k, j, Decomposition::MultiExtend5), (k, false))
                    {
                        break;
                    }
                }
            }
            let (k, more) = scan.finish("multi-loop segment", i, j)?;
            self.branch(k, j)?;
            if !more {
                return Ok(());
            }
            j = k - 1;
        }
    }

    /// Exactly one branch starting at i, unpaired up to j.
    fn branch(&mut self, i: usize, j: usize) -> Result<(), PfError> {
        let m = self.m;
        let terms = self.terms;
        let tail = tails(i, j, |l| {
            terms.ml_unpaired(l, 1) * terms.weight(i, l, l - 1, l, Decomposition::MultiExtend3)
        });
        let mut scan = self.scan(m.qm1(i, j));
        for l in i + TURN + 1..=j {
            if tail[l] == 0.0 {
                continue;
            }
            if scan.push(m.qb(i, l) * terms.ml_stem(i, l) * tail[l], (l, false))
                || scan.push(m.g(i, l) * terms.ml_quadruplex() * tail[l], (l, true))
            {
                break;
            }
        }
        let (l, is_gquad) = scan.finish("multi-loop branch", i, j)?;
        self.place(i, l, is_gquad)
    }

    /// Two branches on k..=n, closing a multi-branch loop across the seam.
    fn two_branches(&mut self, k: usize) -> Result<(), PfError> {
        let m = self.m;
        let n = m.len();
        let mut scan = self.scan(m.qm2(k));
        for u in k + TURN + 1..n.saturating_sub(TURN + 1) {
            if scan.push(m.qm1(k, u) * m.qm1(u + 1, n), u) {
                break;
            }
        }
        let u = scan.finish("circular multi-loop", k, n)?;
        self.branch(k, u)?;
        self.branch(u + 1, n)
    }

    fn circular(&mut self) -> Result<(), PfError> {
        let m = self.m;
        let terms = self.terms;
        let n = m.len();
        let mut scan = self.scan(m.total());
        let mut done = scan.push(terms.open_chain(), Seam::Open);

        'hairpin: for p in 1..=n {
            for q in p + TURN + 1..=n {
                if done {
                    break 'hairpin;
                }
                let qb = m.qb(p, q);
                if qb > 0.0 {
                    done = scan.push(qb * terms.seam_hairpin(p, q), Seam::Hairpin(p, q));
                }
            }
        }
        'interior: for p in 1..=n {
            for q in p + TURN + 1..=n {
                if done {
                    break 'interior;
                }
                let qb = m.qb(p, q);
                if qb == 0.0 {
                    continue;
                }
                for_each_seam_partner(n, p, q, |k, l| {
                    if !done {
                        let w = qb * m.qb(k, l) * terms.seam_interior(p, q, k, l);
                        done = scan.push(w, Seam::Interior(p, q, k, l));
                    }
                });
            }
        }
        if !done {
            let closing = terms.seam_multi();
            for k in TURN + 2..n.saturating_sub(2 * TURN + 3) {
                if scan.push(m.qm(1, k) * m.qm2(k + 1) * closing, Seam::Multi(k)) {
                    break;
                }
            }
        }

        match scan.finish("circular exterior loop", 1, n)? {
            Seam::Open => Ok(()),
            Seam::Hairpin(p, q) => {
                self.add_pair(p, q);
                self.pair(p, q)
            }
            Seam::Interior(p, q, k, l) => {
                self.add_pair(p, q);
                self.pair(p, q)?;
                self.add_pair(k, l);
                self.pair(k, l)
            }
            Seam::Multi(k) => {
                self.multi(1, k)?;
                self.two_branches(k + 1)
            }
        }
    }
}
