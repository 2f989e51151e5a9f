//! Rescaling of Boltzmann weights.
//!
//! Every nucleotide contributes one factor `1/pf_scale` to the weight
//! of a structure, so that partition functions of long sequences stay
//! close to unity. The real partition function of a span of length k
//! is `Q * pf_scale^k`.

use ff_energy::BoltzmannFactors;
use ff_energy::GASCONST;
use ff_energy::K0;

/// Per-nucleotide estimate of the partition function growth.
pub fn estimate_pf_scale(temperature: f64) -> f64 {
    let kt = (temperature + K0) * GASCONST;
    (-(-185.0 + 7.27 * (temperature - 37.0)) / kt).exp()
}

#[derive(Debug, Clone)]
pub struct Scaling {
    pf_scale: f64,
    scale: Vec<f64>,
    exp_ml_base: Vec<f64>,
}

impl Scaling {
    pub fn new(n: usize, pf_scale: f64, bf: &BoltzmannFactors) -> Self {
        let mut scale = vec![1.0; n + 2];
        let mut exp_ml_base = vec![1.0; n + 2];
        for k in 1..n + 2 {
            scale[k] = scale[k - 1] / pf_scale;
            exp_ml_base[k] = exp_ml_base[k - 1] * bf.ml_base() / pf_scale;
        }
        Scaling { pf_scale, scale, exp_ml_base }
    }

    pub fn pf_scale(&self) -> f64 {
        self.pf_scale
    }

    /// `(1/pf_scale)^k`.
    #[inline]
    pub fn scale(&self, k: usize) -> f64 {
        self.scale[k]
    }

    /// `k` unpaired nucleotides in a multi-branch loop, scaled.
    #[inline]
    pub fn ml_base(&self, k: usize) -> f64 {
        self.exp_ml_base[k]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scale
    }
}
