//! Soft constraints: pseudo-energies added to the energy model.
//!
//! [`SoftConstraints`] collects pseudo-energies in kcal/mol, the
//! folding context converts them into Boltzmann factors
//! ([`ExpSoftConstraints`]) once the temperature is known.

use std::fmt;
use std::sync::Arc;

use ndarray::Array2;

use crate::PfError;

/// The decomposition a generalized weight is queried for.
///
/// Coordinates passed along with each kind:
///  - `Hairpin`: (i, j, i, j), the closing pair.
///  - `InteriorPair`: (i, j, k, l), closing and enclosed pair.
///  - `MultiClose`: (i, j, i+1, j-1), the closing pair.
///  - `MultiExtend5`: (i, j, k, j), i..k-1 unpaired before the branch at k.
///  - `MultiExtend3`: (i, j, j-1, j), j unpaired after a branch in i..j-1.
///  - `ExteriorExtend`: (i, j, j-1, j) for a trailing unpaired j,
///    (i, j, i, j) for a completely unpaired segment.
///  - `ExteriorConcat`: (i, j, k, k+1), segment i..k followed by a
///    stem starting at k+1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decomposition {
    Hairpin,
    InteriorPair,
    MultiClose,
    MultiExtend5,
    MultiExtend3,
    ExteriorExtend,
    ExteriorConcat,
}

/// A caller supplied multiplicative weight for individual decompositions.
pub trait DecompositionWeight: Send + Sync {
    fn weight(&self, i: usize, j: usize, k: usize, l: usize, kind: Decomposition) -> f64;
}

impl<F> DecompositionWeight for F
where
    F: Fn(usize, usize, usize, usize, Decomposition) -> f64 + Send + Sync,
{
    fn weight(&self, i: usize, j: usize, k: usize, l: usize, kind: Decomposition) -> f64 {
        self(i, j, k, l, kind)
    }
}

/// Pseudo-energies in kcal/mol.
#[derive(Clone)]
pub struct SoftConstraints {
    n: usize,
    unpaired: Option<Vec<f64>>,
    pairs: Option<Array2<f64>>,
    stack: Option<Vec<f64>>,
    weight: Option<Arc<dyn DecompositionWeight>>,
}

impl fmt::Debug for SoftConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftConstraints")
            .field("n", &self.n)
            .field("unpaired", &self.unpaired.is_some())
            .field("pairs", &self.pairs.is_some())
            .field("stack", &self.stack.is_some())
            .field("weight", &self.weight.is_some())
            .finish()
    }
}

impl SoftConstraints {
    pub fn new(n: usize) -> Self {
        SoftConstraints {
            n,
            unpaired: None,
            pairs: None,
            stack: None,
            weight: None,
        }
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

    fn check_len(&self, found: usize) -> Result<(), PfError> {
        if found != self.n {
            return Err(PfError::ConstraintLength { expected: self.n, found });
        }
        Ok(())
    }

    /// Pseudo-energy for position i being unpaired (added per nucleotide).
    pub fn add_unpaired(&mut self, i: usize, energy: f64) -> Result<(), PfError> {
        self.check(i)?;
        let n = self.n;
        self.unpaired.get_or_insert_with(|| vec![0.0; n + 1])[i] += energy;
        Ok(())
    }

    /// Unpaired pseudo-energies for positions 1..=n.
    pub fn set_unpaired(&mut self, energies: &[f64]) -> Result<(), PfError> {
        self.check_len(energies.len())?;
        let mut v = vec![0.0; self.n + 1];
        v[1..].copy_from_slice(energies);
        self.unpaired = Some(v);
        Ok(())
    }

    /// Pseudo-energy for pair (i,j), applied to the loop it closes.
    pub fn add_pair(&mut self, i: usize, j: usize, energy: f64) -> Result<(), PfError> {
        self.check(i)?;
        self.check(j)?;
        let n = self.n;
        let (i, j) = (i.min(j), i.max(j));
        self.pairs.get_or_insert_with(|| Array2::zeros((n + 1, n + 1)))[(i, j)] += energy;
        Ok(())
    }

    /// Per-nucleotide pseudo-energies of stacked pairs. A stack of
    /// (i,j) on (i+1,j-1) receives the sum over all four positions.
    pub fn set_stack(&mut self, energies: &[f64]) -> Result<(), PfError> {
        self.check_len(energies.len())?;
        let mut v = vec![0.0; self.n + 1];
        v[1..].copy_from_slice(energies);
        self.stack = Some(v);
        Ok(())
    }

    pub fn set_weight(&mut self, weight: Arc<dyn DecompositionWeight>) {
        self.weight = Some(weight);
    }

    pub fn with_weight<W: DecompositionWeight + 'static>(mut self, weight: W) -> Self {
        self.weight = Some(Arc::new(weight));
        self
    }

    /// Boltzmann factors at the given kT (cal/mol).
    pub fn exponentiate(&self, kt: f64) -> ExpSoftConstraints {
        let n = self.n;
        let bz = |e: f64| (-e * 1000.0 / kt).exp();

        let up = self.unpaired.as_ref().map(|energies| {
            let mut up = Array2::from_elem((n + 2, n + 2), 1.0);
            for i in 1..=n {
                for u in 1..=n + 1 - i {
                    up[(i, u)] = up[(i, u - 1)] * bz(energies[i + u - 1]);
                }
            }
            up
        });
        let pairs = self.pairs.as_ref().map(|p| p.mapv(bz));
        let stack = self.stack.as_ref().map(|s| s.iter().map(|&e| bz(e)).collect());

        ExpSoftConstraints {
            up,
            pairs,
            stack,
            weight: self.weight.clone(),
        }
    }
}

/// Soft constraints as multiplicative Boltzmann factors.
#[derive(Clone)]
pub struct ExpSoftConstraints {
    /// `up[(i, u)]`: stretch of u unpaired nucleotides starting at i.
    up: Option<Array2<f64>>,
    pairs: Option<Array2<f64>>,
    stack: Option<Vec<f64>>,
    weight: Option<Arc<dyn DecompositionWeight>>,
}

impl fmt::Debug for ExpSoftConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpSoftConstraints")
            .field("up", &self.up.is_some())
            .field("pairs", &self.pairs.is_some())
            .field("stack", &self.stack.is_some())
            .field("weight", &self.weight.is_some())
            .finish()
    }
}

impl ExpSoftConstraints {
    #[inline]
    pub fn unpaired(&self, i: usize, u: usize) -> f64 {
        match &self.up {
            Some(up) if u > 0 => up[(i, u)],
            _ => 1.0,
        }
    }

    #[inline]
    pub fn pair(&self, i: usize, j: usize) -> f64 {
        self.pairs.as_ref().map_or(1.0, |p| p[(i, j)])
    }

    /// Stacking bonus of (i,j) on (k,l); only for k = i+1, l = j-1.
    #[inline]
    pub fn stack(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        match &self.stack {
            Some(s) if k == i + 1 && l + 1 == j => s[i] * s[k] * s[l] * s[j],
            _ => 1.0,
        }
    }

    #[inline]
    pub fn weight(&self, i: usize, j: usize, k: usize, l: usize, kind: Decomposition) -> f64 {
        self.weight.as_ref().map_or(1.0, |w| w.weight(i, j, k, l, kind))
    }

    pub fn has_weight(&self) -> bool {
        self.weight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const KT: f64 = 310.15 * 1.98717;

    #[test]
    fn test_unpaired_stretches() {
        let mut sc = SoftConstraints::new(5);
        sc.set_unpaired(&[0.5, 0.0, -0.3, 1.0, 0.2]).unwrap();
        let exp = sc.exponentiate(KT);
        let f = |e: f64| (-e * 1000.0 / KT).exp();
        assert_relative_eq!(exp.unpaired(1, 0), 1.0);
        assert_relative_eq!(exp.unpaired(1, 1), f(0.5));
        assert_relative_eq!(exp.unpaired(2, 3), f(0.0) * f(-0.3) * f(1.0), max_relative = 1e-12);
        assert_relative_eq!(exp.unpaired(1, 5), f(1.4), max_relative = 1e-12);
    }

    #[test]
    fn test_pairs_and_stacks() {
        let mut sc = SoftConstraints::new(8);
        sc.add_pair(7, 2, -1.0).unwrap();
        sc.set_stack(&[0.1; 8]).unwrap();
        let exp = sc.exponentiate(KT);
        assert_relative_eq!(exp.pair(2, 7), (1000.0 / KT).exp());
        assert_relative_eq!(exp.pair(1, 7), 1.0);
        assert_relative_eq!(exp.stack(1, 8, 2, 7), (-400.0 / KT).exp(), max_relative = 1e-12);
        assert_relative_eq!(exp.stack(1, 8, 3, 7), 1.0);
        assert!(sc.set_stack(&[0.0; 3]).is_err());
        assert!(sc.add_unpaired(9, 1.0).is_err());
    }

    #[test]
    fn test_weight_callback() {
        let sc = SoftConstraints::new(4).with_weight(|i: usize, _j: usize, _k: usize, _l: usize, kind: Decomposition| {
            if kind == Decomposition::Hairpin { i as f64 } else { 1.0 }
        });
        let exp = sc.exponentiate(KT);
        assert!(exp.has_weight());
        assert_eq!(exp.weight(3, 9, 3, 9, Decomposition::Hairpin), 3.0);
        assert_eq!(exp.weight(3, 9, 4, 8, Decomposition::InteriorPair), 1.0);
    }
}
