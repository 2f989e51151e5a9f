//! The Boltzmann ensemble of one folding context.
//!
//! An [`Ensemble`] owns the matrices of one computation. `fold()` runs
//! the forward recursion (plus the circular step) and, if the options
//! ask for it, the backward recursion. Sampling only reads the forward
//! matrices, so any number of threads may sample from one ensemble as
//! long as each brings its own random number generator.

use log::info;
use log::warn;
use rand::Rng;

use crate::backward::backward;
use crate::backward::stack_probabilities;
use crate::circular::circular;
use crate::forward::forward;
use crate::sampler::Sampler;
use crate::FoldingContext;
use crate::PairProbabilities;
use crate::PfError;
use crate::PfMatrices;
use crate::SampledStructure;

#[derive(Debug)]
pub struct Ensemble<'a> {
    ctx: &'a FoldingContext,
    matrices: Option<PfMatrices>,
    probabilities: Option<PairProbabilities>,
}

impl<'a> Ensemble<'a> {
    pub fn new(ctx: &'a FoldingContext) -> Self {
        Ensemble { ctx, matrices: None, probabilities: None }
    }

    pub fn context(&self) -> &'a FoldingContext {
        self.ctx
    }

    /// Fills the forward matrices and, if requested, the pair probabilities.
    pub fn fold(&mut self) -> Result<(), PfError> {
        self.probabilities = None;
        self.matrices = None;
        let mut m = forward(self.ctx)?;
        if self.ctx.is_circular() {
            circular(self.ctx, &mut m)?;
        }
        self.matrices = Some(m);
        info!("Ensemble free energy: {:.4} kcal/mol.", self.ensemble_energy()?);

        if self.ctx.options().compute_probabilities {
            self.compute_probabilities()?;
        }
        Ok(())
    }

    pub fn matrices(&self) -> Result<&PfMatrices, PfError> {
        self.matrices.as_ref().ok_or(PfError::ForwardMissing)
    }

    pub fn is_folded(&self) -> bool {
        self.matrices.is_some()
    }

    /// The scaled partition function of the whole sequence, i.e. the
    /// true partition function times `pf_scale^-n`.
    pub fn partition_function(&self) -> Result<f64, PfError> {
        Ok(self.matrices()?.total())
    }

    /// Ensemble free energy in kcal/mol.
    pub fn ensemble_energy(&self) -> Result<f64, PfError> {
        let q = self.partition_function()?;
        Ok(self.free_energy(q, self.ctx.len()))
    }

    /// Free energy (kcal/mol) of the segment i..=j folded on its own
    /// as a linear molecule.
    pub fn subsequence_energy(&self, i: usize, j: usize) -> Result<f64, PfError> {
        let m = self.matrices()?;
        let n = self.ctx.len();
        for position in [i, j] {
            if position == 0 || position > n {
                return Err(PfError::PositionOutOfRange { position, length: n });
            }
        }
        if j < i {
            return Err(PfError::PositionOutOfRange { position: j, length: n });
        }
        Ok(self.free_energy(m.q(i, j), j - i + 1))
    }

    fn free_energy(&self, q: f64, len: usize) -> f64 {
        if q <= f64::MIN_POSITIVE {
            warn!("Partition function {q:e} is too small for a meaningful free energy.");
        }
        let kt = self.ctx.boltzmann_factors().kt();
        let pf_scale = self.ctx.scaling().pf_scale();
        (-q.ln() - len as f64 * pf_scale.ln()) * kt / 1000.0
    }

    /// Runs the backward recursion (once) and returns the pair probabilities.
    pub fn compute_probabilities(&mut self) -> Result<&PairProbabilities, PfError> {
        if self.probabilities.is_none() {
            let probs = backward(self.ctx, self.matrices()?)?;
            if probs.is_degraded() {
                warn!("{} pair probabilities overflowed and were clamped.", probs.overflows());
            }
            self.probabilities = Some(probs);
        }
        self.probabilities()
    }

    pub fn probabilities(&self) -> Result<&PairProbabilities, PfError> {
        self.matrices()?;
        self.probabilities.as_ref().ok_or(PfError::ProbabilitiesMissing)
    }

    /// Pairs (i,j) for which both (i,j) and (i+1,j-1) are formed with a
    /// probability above `cutoff`.
    pub fn stack_probabilities(&self, cutoff: f64) -> Result<Vec<(usize, usize, f64)>, PfError> {
        let probs = self.probabilities()?;
        Ok(stack_probabilities(self.ctx, self.matrices()?, probs, cutoff))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SampledStructure, PfError> {
        Sampler::new(self.ctx, self.matrices()?, rng).sample()
    }

    /// Samples the structure of 1..=length, leaving the rest unpaired.
    pub fn sample_prefix<R: Rng + ?Sized>(
        &self,
        length: usize,
        rng: &mut R,
    ) -> Result<SampledStructure, PfError> {
        Sampler::new(self.ctx, self.matrices()?, rng).sample_prefix(length)
    }

    pub fn sample_many<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<SampledStructure>, PfError> {
        let m = self.matrices()?;
        (0..count)
            .map(|_| Sampler::new(self.ctx, m, &mut *rng).sample())
            .collect()
    }
}
