//! Hard constraints: which decompositions may be used at all.
//!
//! Every pair (i,j) carries a [`Context`] mask naming the loop types it
//! may close or be enclosed by. Every position carries a mask of loop
//! types it may be unpaired in. From the latter we derive maximal
//! unpaired run lengths, `up_*[i]` is the number of consecutive
//! positions starting at i that may be unpaired in that loop type.

use std::ops::BitAnd;
use std::ops::BitOr;

use ndarray::Array2;
use ff_energy::NucleotideVec;
use ff_energy::TURN;

use crate::PfError;

/// Loop context bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Context(u8);

impl Context {
    pub const NONE: Context = Context(0);
    /// Exterior loop.
    pub const EXT: Context = Context(1);
    /// Closing a hairpin.
    pub const HP: Context = Context(2);
    /// Closing an interior loop.
    pub const INT: Context = Context(4);
    /// Enclosed by an interior loop.
    pub const INT_ENC: Context = Context(8);
    /// Closing a multi-branch loop.
    pub const ML: Context = Context(16);
    /// Enclosed by a multi-branch loop.
    pub const ML_ENC: Context = Context(32);
    pub const ALL: Context = Context(63);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Context) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Context {
    type Output = Context;
    fn bitor(self, rhs: Context) -> Context {
        Context(self.0 | rhs.0)
    }
}

impl BitAnd for Context {
    type Output = Context;
    fn bitand(self, rhs: Context) -> Context {
        Context(self.0 & rhs.0)
    }
}

/// Loop types a nucleotide can be unpaired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Exterior,
    Hairpin,
    Interior,
    Multi,
}

impl LoopKind {
    const ALL: [LoopKind; 4] = [LoopKind::Exterior, LoopKind::Hairpin, LoopKind::Interior, LoopKind::Multi];

    fn context(self) -> Context {
        match self {
            LoopKind::Exterior => Context::EXT,
            LoopKind::Hairpin => Context::HP,
            LoopKind::Interior => Context::INT,
            LoopKind::Multi => Context::ML,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HardConstraints {
    n: usize,
    pairs: Array2<u8>,
    unpaired: Vec<Context>,
    up: [Vec<usize>; 4],
}

impl HardConstraints {
    /// Canonical base pairs enclosing at least [`TURN`] nucleotides are
    /// allowed in every context, every nucleotide may be unpaired.
    pub fn canonical(seq: &NucleotideVec) -> Self {
        let n = seq.len();
        let mut pairs = Array2::zeros((n + 2, n + 2));
        for i in 1..=n {
            for j in i + TURN + 1..=n {
                if seq.pair_type(i, j).is_some() {
                    pairs[(i, j)] = Context::ALL.bits();
                }
            }
        }
        let mut hc = HardConstraints {
            n,
            pairs,
            unpaired: vec![Context::ALL; n + 2],
            up: Default::default(),
        };
        hc.unpaired[0] = Context::NONE;
        hc.unpaired[n + 1] = Context::NONE;
        hc.update_runs();
        hc
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    fn check(&self, i: usize) -> Result<(), PfError> {
        if i == 0 || i > self.n {
            return Err(PfError::PositionOutOfRange { position: i, length: self.n });
        }
        Ok(())
    }

    fn update_runs(&mut self) {
        let n = self.n;
        for (slot, kind) in LoopKind::ALL.iter().enumerate() {
            let ctx = kind.context();
            let mut run = vec![0; n + 2];
            for i in (1..=n).rev() {
                run[i] = if self.unpaired[i].contains(ctx) { run[i + 1] + 1 } else { 0 };
            }
            self.up[slot] = run;
        }
    }

    /// The context mask of pair (i,j), i < j.
    #[inline]
    pub fn pair(&self, i: usize, j: usize) -> Context {
        Context(self.pairs[(i, j)])
    }

    #[inline]
    pub fn up(&self, kind: LoopKind, i: usize) -> usize {
        self.up[kind as usize][i]
    }

    #[inline]
    pub fn up_ext(&self, i: usize) -> usize {
        self.up[LoopKind::Exterior as usize][i]
    }

    #[inline]
    pub fn up_hp(&self, i: usize) -> usize {
        self.up[LoopKind::Hairpin as usize][i]
    }

    #[inline]
    pub fn up_int(&self, i: usize) -> usize {
        self.up[LoopKind::Interior as usize][i]
    }

    #[inline]
    pub fn up_ml(&self, i: usize) -> usize {
        self.up[LoopKind::Multi as usize][i]
    }

    /// Whether positions `i..i+u` may all be unpaired in `kind`.
    #[inline]
    pub fn stretch_ok(&self, kind: LoopKind, i: usize, u: usize) -> bool {
        u == 0 || self.up(kind, i) >= u
    }

    /// Forbids pair (i,j) in every context.
    pub fn forbid_pair(&mut self, i: usize, j: usize) -> Result<(), PfError> {
        self.restrict_pair(i, j, Context::NONE)
    }

    /// Keeps only the loop contexts in `ctx` for pair (i,j).
    pub fn restrict_pair(&mut self, i: usize, j: usize, ctx: Context) -> Result<(), PfError> {
        let (i, j) = (i.min(j), i.max(j));
        self.check(i)?;
        self.check(j)?;
        self.pairs[(i, j)] &= ctx.bits();
        Ok(())
    }

    /// Position i never pairs.
    pub fn force_unpaired(&mut self, i: usize) -> Result<(), PfError> {
        self.check(i)?;
        for k in 1..=self.n {
            self.pairs[(k.min(i), k.max(i))] = 0;
        }
        Ok(())
    }

    /// Position i may not be unpaired in the given loop types.
    pub fn forbid_unpaired(&mut self, i: usize, kinds: &[LoopKind]) -> Result<(), PfError> {
        self.check(i)?;
        for kind in kinds {
            self.unpaired[i] = Context(self.unpaired[i].bits() & !kind.context().bits());
        }
        self.update_runs();
        Ok(())
    }

    /// Every structure must contain pair (i,j): conflicting and crossing
    /// pairs are removed and neither i nor j may be unpaired.
    pub fn enforce_pair(&mut self, i: usize, j: usize) -> Result<(), PfError> {
        let (i, j) = (i.min(j), i.max(j));
        self.check(i)?;
        self.check(j)?;
        let keep = self.pairs[(i, j)];
        for k in 1..=self.n {
            for l in k + 1..=self.n {
                let touches = k == i || k == j || l == i || l == j;
                let crosses = (k < i && i < l && l < j) || (i < k && k < j && j < l);
                if touches || crosses {
                    self.pairs[(k, l)] = 0;
                }
            }
        }
        self.pairs[(i, j)] = keep;
        self.unpaired[i] = Context::NONE;
        self.unpaired[j] = Context::NONE;
        self.update_runs();
        Ok(())
    }
}
