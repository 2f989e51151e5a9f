//! G-quadruplex contributions.
//!
//! A quadruplex spanning i..=j consists of four runs of L consecutive
//! G's (the quartet layers) separated by three linkers:
//!
//! ```text
//!  GGG.GGG..GGG.GGG
//!  ^               ^
//!  i               j    (L = 3, linkers 1, 2, 1)
//! ```

use ff_energy::BoltzmannFactors;
use ff_energy::Base;
use ff_energy::NucleotideVec;

pub const GQUAD_MIN_LAYERS: usize = 2;
pub const GQUAD_MAX_LAYERS: usize = 7;
pub const GQUAD_MIN_LINKER: usize = 1;
pub const GQUAD_MAX_LINKER: usize = 15;
pub const GQUAD_MIN_SPAN: usize = 4 * GQUAD_MIN_LAYERS + 3 * GQUAD_MIN_LINKER;
pub const GQUAD_MAX_SPAN: usize = 4 * GQUAD_MAX_LAYERS + 3 * GQUAD_MAX_LINKER;

/// Supplies the (unscaled) Boltzmann weight of all quadruplexes that
/// span exactly i..=j. The engines treat it as an opaque additive term.
pub trait QuadruplexModel: Send + Sync {
    fn weight(&self, bf: &BoltzmannFactors, i: usize, j: usize) -> f64;

    /// The G positions of one quadruplex spanning i..=j, chosen with
    /// probability proportional to its weight given `r` uniform in [0,1).
    fn layout(&self, _bf: &BoltzmannFactors, _i: usize, _j: usize, _r: f64) -> Option<Vec<usize>> {
        None
    }
}

/// Quadruplexes with 2..=7 layers and linkers of 1..=15 nucleotides,
/// scored `alpha (L - 1) + beta ln(linkers - 2)`.
#[derive(Debug, Clone)]
pub struct GQuadModel {
    /// Length of the G run starting at each position, 1-based.
    runs: Vec<usize>,
}

impl GQuadModel {
    pub fn new(seq: &NucleotideVec) -> Self {
        let n = seq.len();
        let mut runs = vec![0; n + 2];
        for i in (1..=n).rev() {
            if seq.base(i) == Base::G {
                runs[i] = runs[i + 1] + 1;
            }
        }
        GQuadModel { runs }
    }

    fn run(&self, i: usize) -> usize {
        self.runs.get(i).copied().unwrap_or(0)
    }

    /// Calls `f(layers, [l1, l2, l3])` for every quadruplex spanning
    /// exactly i..=j.
    fn for_each(&self, i: usize, j: usize, mut f: impl FnMut(usize, [usize; 3])) {
        if j < i {
            return;
        }
        let span = j - i + 1;
        if !(GQUAD_MIN_SPAN..=GQUAD_MAX_SPAN).contains(&span) {
            return;
        }
        let max_layers = self.run(i).min(GQUAD_MAX_LAYERS);
        for layers in GQUAD_MIN_LAYERS..=max_layers {
            if 4 * layers + 3 * GQUAD_MIN_LINKER > span {
                break;
            }
            let last = j + 1 - layers;
            if self.run(last) < layers {
                continue;
            }
            for l1 in GQUAD_MIN_LINKER..=GQUAD_MAX_LINKER {
                let second = i + layers + l1;
                if second + 2 * layers + 2 * GQUAD_MIN_LINKER > last {
                    break;
                }
                if self.run(second) < layers {
                    continue;
                }
                for l2 in GQUAD_MIN_LINKER..=GQUAD_MAX_LINKER {
                    let third = second + layers + l2;
                    if third + layers + GQUAD_MIN_LINKER > last {
                        break;
                    }
                    let l3 = last - third - layers;
                    if l3 > GQUAD_MAX_LINKER || self.run(third) < layers {
                        continue;
                    }
                    f(layers, [l1, l2, l3]);
                }
            }
        }
    }
}

impl QuadruplexModel for GQuadModel {
    fn weight(&self, bf: &BoltzmannFactors, i: usize, j: usize) -> f64 {
        let mut total = 0.0;
        self.for_each(i, j, |layers, linkers| {
            total += bf.gquad(layers, linkers.iter().sum());
        });
        total
    }

    fn layout(&self, bf: &BoltzmannFactors, i: usize, j: usize, r: f64) -> Option<Vec<usize>> {
        let threshold = r * self.weight(bf, i, j);
        let mut acc = 0.0;
        let mut chosen = None;
        self.for_each(i, j, |layers, linkers| {
            let w = bf.gquad(layers, linkers.iter().sum());
            if w > 0.0 && (chosen.is_none() || acc <= threshold) {
                chosen = Some((layers, linkers));
            }
            acc += w;
        });
        let (layers, [l1, l2, _]) = chosen?;
        let starts = [i, i + layers + l1, i + 2 * layers + l1 + l2, j + 1 - layers];
        Some(starts.iter().flat_map(|&s| s..s + layers).collect())
    }
}
