//! The folding context: everything a partition function computation
//! reads but never modifies.

use std::sync::Arc;

use log::info;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;
use ff_energy::BoltzmannFactors;
use ff_energy::EnergyTables;
use ff_energy::NucleotideVec;
use ff_energy::PairType;

use crate::estimate_pf_scale;
use crate::ExpSoftConstraints;
use crate::GQuadModel;
use crate::HardConstraints;
use crate::LoopTerms;
use crate::PfError;
use crate::QuadruplexModel;
use crate::Scaling;
use crate::SoftConstraints;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldOptions {
    /// Temperature in °C.
    pub temperature: f64,
    /// Per-nucleotide rescaling factor, estimated from the temperature if unset.
    pub pf_scale: Option<f64>,
    pub circular: bool,
    pub compute_probabilities: bool,
    pub gquad: bool,
    pub no_gu_closure: bool,
}

impl Default for FoldOptions {
    fn default() -> Self {
        FoldOptions {
            temperature: 37.0,
            pf_scale: None,
            circular: false,
            compute_probabilities: true,
            gquad: false,
            no_gu_closure: false,
        }
    }
}

pub struct FoldingContext {
    sequence: NucleotideVec,
    options: FoldOptions,
    bf: BoltzmannFactors,
    scaling: Scaling,
    ptype: Array2<Option<PairType>>,
    hc: HardConstraints,
    sc: Option<ExpSoftConstraints>,
    gquad: Option<Arc<dyn QuadruplexModel>>,
}

impl std::fmt::Debug for FoldingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FoldingContext")
            .field("sequence", &self.sequence.to_string())
            .field("options", &self.options)
            .field("pf_scale", &self.scaling.pf_scale())
            .field("soft_constraints", &self.sc)
            .field("gquad", &self.gquad.is_some())
            .finish()
    }
}

impl FoldingContext {
    pub fn new(sequence: &str, tables: &EnergyTables, options: FoldOptions) -> Result<Self, PfError> {
        if sequence.trim().is_empty() {
            return Err(PfError::EmptySequence);
        }
        let seq = NucleotideVec::try_from(sequence)?;
        Self::from_encoded(seq, tables, options)
    }

    pub fn from_encoded(
        sequence: NucleotideVec,
        tables: &EnergyTables,
        options: FoldOptions,
    ) -> Result<Self, PfError> {
        let n = sequence.len();
        if n == 0 {
            return Err(PfError::EmptySequence);
        }
        if options.gquad && options.circular {
            return Err(PfError::Unsupported("G-quadruplexes in circular sequences"));
        }

        let bf = BoltzmannFactors::new(tables, options.temperature, options.no_gu_closure);
        let pf_scale = options.pf_scale.unwrap_or_else(|| estimate_pf_scale(options.temperature));
        let scaling = Scaling::new(n, pf_scale, &bf);

        let mut ptype = Array2::from_elem((n + 2, n + 2), None);
        for i in 1..=n {
            for j in i + 1..=n {
                ptype[(i, j)] = sequence.pair_type(i, j);
                ptype[(j, i)] = sequence.pair_type(j, i);
            }
        }
        let hc = HardConstraints::canonical(&sequence);
        let gquad: Option<Arc<dyn QuadruplexModel>> = if options.gquad {
            Some(Arc::new(GQuadModel::new(&sequence)))
        } else {
            None
        };

        info!(
            "Folding context: n = {n}, T = {} °C, pf_scale = {pf_scale:.4}, {}.",
            options.temperature,
            if options.circular { "circular" } else { "linear" }
        );

        Ok(FoldingContext {
            sequence,
            options,
            bf,
            scaling,
            ptype,
            hc,
            sc: None,
            gquad,
        })
    }

    pub fn with_hard_constraints(mut self, hc: HardConstraints) -> Result<Self, PfError> {
        if hc.len() != self.len() {
            return Err(PfError::ConstraintLength { expected: self.len(), found: hc.len() });
        }
        self.hc = hc;
        Ok(self)
    }

    pub fn with_soft_constraints(mut self, sc: &SoftConstraints) -> Result<Self, PfError> {
        if sc.len() != self.len() {
            return Err(PfError::ConstraintLength { expected: self.len(), found: sc.len() });
        }
        self.sc = Some(sc.exponentiate(self.bf.kt()));
        Ok(self)
    }

    /// Replaces the quadruplex model (and enables quadruplexes).
    pub fn with_quadruplex_model(mut self, model: Arc<dyn QuadruplexModel>) -> Result<Self, PfError> {
        if self.options.circular {
            return Err(PfError::Unsupported("G-quadruplexes in circular sequences"));
        }
        self.options.gquad = true;
        self.gquad = Some(model);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn sequence(&self) -> &NucleotideVec {
        &self.sequence
    }

    pub fn options(&self) -> &FoldOptions {
        &self.options
    }

    pub fn is_circular(&self) -> bool {
        self.options.circular
    }

    pub fn boltzmann_factors(&self) -> &BoltzmannFactors {
        &self.bf
    }

    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }

    pub fn hard_constraints(&self) -> &HardConstraints {
        &self.hc
    }

    pub fn soft_constraints(&self) -> Option<&ExpSoftConstraints> {
        self.sc.as_ref()
    }

    pub fn quadruplex_model(&self) -> Option<&dyn QuadruplexModel> {
        self.gquad.as_deref()
    }

    /// Pair type of (i,j) read from i to j.
    #[inline]
    pub fn pair_type(&self, i: usize, j: usize) -> Option<PairType> {
        self.ptype[(i, j)]
    }

    pub fn terms(&self) -> LoopTerms<'_> {
        LoopTerms::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json() {
        let o: FoldOptions = serde_json::from_str(r#"{"circular": true, "pf_scale": 1.5}"#).unwrap();
        assert!(o.circular);
        assert_eq!(o.pf_scale, Some(1.5));
        assert_eq!(o.temperature, 37.0);
        assert!(o.compute_probabilities);
    }

    #[test]
    fn test_context_errors() {
        let t = EnergyTables::default();
        assert!(matches!(
            FoldingContext::new("  ", &t, FoldOptions::default()),
            Err(PfError::EmptySequence)
        ));
        assert!(matches!(
            FoldingContext::new("GGXAC", &t, FoldOptions::default()),
            Err(PfError::Energy(_))
        ));
        let o = FoldOptions { circular: true, gquad: true, ..Default::default() };
        assert!(matches!(FoldingContext::new("GGGAGGGAGGGAGGG", &t, o), Err(PfError::Unsupported(_))));

        let ctx = FoldingContext::new("GGGAAACCC", &t, FoldOptions::default()).unwrap();
        let sc = SoftConstraints::new(4);
        assert!(matches!(
            ctx.with_soft_constraints(&sc),
            Err(PfError::ConstraintLength { expected: 9, found: 4 })
        ));
    }

    #[test]
    fn test_pair_types() {
        let t = EnergyTables::default();
        let ctx = FoldingContext::new("GAAAC", &t, FoldOptions::default()).unwrap();
        assert_eq!(ctx.pair_type(1, 5), Some(PairType::GC));
        assert_eq!(ctx.pair_type(5, 1), Some(PairType::CG));
        assert_eq!(ctx.pair_type(1, 2), None);
        assert_eq!(ctx.len(), 5);
    }
}
