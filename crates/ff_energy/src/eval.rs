//! Loop decomposition and evaluation of a given secondary structure.
//!
//! For circular molecules the exterior loop is closed across the seam
//! between position n and 1. It then becomes a hairpin (one exterior
//! pair), an interior loop (two exterior pairs) or a multi-branch loop
//! without closing pair (three or more exterior pairs).

use ff_structure::PairSet;

use crate::BoltzmannFactors;
use crate::EnergyError;
use crate::EnergyTables;
use crate::NucleotideVec;
use crate::INF;

type P = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loop {
    Exterior { stems: Vec<P>, unpaired: usize },
    Hairpin { closing: P },
    Interior { closing: P, inner: P },
    Multi { closing: P, stems: Vec<P>, unpaired: usize },
    SeamHairpin { pair: P, unpaired: usize },
    /// `first` is the exterior pair closer to the 5'-end.
    SeamInterior { first: P, second: P },
    SeamMulti { stems: Vec<P>, unpaired: usize },
}

#[derive(Debug, Clone)]
pub struct LoopDecomposition {
    length: usize,
    loops: Vec<Loop>,
}

impl LoopDecomposition {
    pub fn new(pairs: &PairSet, circular: bool) -> Self {
        let n = pairs.length();
        let table = pairs.partner_table();
        let enclosed = |i: usize, j: usize| -> (Vec<P>, usize) {
            let mut stems = Vec::new();
            let mut unpaired = 0;
            let mut k = i;
            while k <= j {
                match table[k] {
                    Some(l) if l > k => {
                        stems.push((k, l));
                        k = l + 1;
                    }
                    _ => {
                        unpaired += 1;
                        k += 1;
                    }
                }
            }
            (stems, unpaired)
        };

        let mut loops = Vec::new();
        let (stems, unpaired) = enclosed(1, n);
        let exterior = if !circular || stems.is_empty() {
            Loop::Exterior { stems, unpaired }
        } else {
            match stems.as_slice() {
                [pair] => Loop::SeamHairpin { pair: *pair, unpaired },
                [first, second] => Loop::SeamInterior { first: *first, second: *second },
                _ => Loop::SeamMulti { stems, unpaired },
            }
        };
        loops.push(exterior);

        for p in pairs.to_vec() {
            let (i, j) = (p.i() as usize, p.j() as usize);
            let (stems, unpaired) = enclosed(i + 1, j - 1);
            let l = match stems.as_slice() {
                [] => Loop::Hairpin { closing: (i, j) },
                [inner] => Loop::Interior { closing: (i, j), inner: *inner },
                _ => Loop::Multi { closing: (i, j), stems, unpaired },
            };
            loops.push(l);
        }
        LoopDecomposition { length: n, loops }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Total free energy in dcal/mol, saturating at [`INF`].
    pub fn energy(&self, seq: &NucleotideVec, tables: &EnergyTables) -> Result<i32, EnergyError> {
        let n = self.length;
        let pt = |i: usize, j: usize| {
            seq.pair_type(i, j).ok_or(EnergyError::NonCanonicalPair { i: i.min(j), j: i.max(j) })
        };
        let mut total: i64 = 0;
        for l in &self.loops {
            let e = match l {
                Loop::Exterior { stems, .. } => {
                    let mut e = 0;
                    for &(i, j) in stems {
                        e += tables.ext_stem_energy(pt(i, j)?);
                    }
                    e
                }
                Loop::Hairpin { closing: (i, j) } => tables.hairpin_energy(j - i - 1, pt(*i, *j)?),
                Loop::Interior { closing: (i, j), inner: (k, l) } => {
                    tables.interior_energy(k - i - 1, j - l - 1, pt(*i, *j)?, pt(*l, *k)?)
                }
                Loop::Multi { closing: (i, j), stems, unpaired } => {
                    let mut e = tables.ml_closing + tables.ml_stem_energy(pt(*j, *i)?);
                    for &(k, l) in stems {
                        e += tables.ml_stem_energy(pt(k, l)?);
                    }
                    e + tables.ml_base * *unpaired as i32
                }
                Loop::SeamHairpin { pair: (p, q), unpaired } => {
                    tables.hairpin_energy(*unpaired, pt(*q, *p)?)
                }
                Loop::SeamInterior { first: (p, q), second: (k, l) } => {
                    tables.interior_energy((p - 1) + (n - l), k - q - 1, pt(*l, *k)?, pt(*q, *p)?)
                }
                Loop::SeamMulti { stems, unpaired } => {
                    let mut e = tables.ml_closing;
                    for &(k, l) in stems {
                        e += tables.ml_stem_energy(pt(k, l)?);
                    }
                    e + tables.ml_base * *unpaired as i32
                }
            };
            if e >= INF {
                return Ok(INF);
            }
            total += e as i64;
        }
        Ok(total.min(INF as i64) as i32)
    }

    /// Boltzmann weight of the structure, the product of its loop factors.
    pub fn weight(&self, seq: &NucleotideVec, bf: &BoltzmannFactors) -> Result<f64, EnergyError> {
        let n = self.length;
        let pt = |i: usize, j: usize| {
            seq.pair_type(i, j).ok_or(EnergyError::NonCanonicalPair { i: i.min(j), j: i.max(j) })
        };
        let ml_base = |u: usize| bf.ml_base().powi(u as i32);
        let mut w = 1.0;
        for l in &self.loops {
            w *= match l {
                Loop::Exterior { stems, .. } => {
                    let mut f = 1.0;
                    for &(i, j) in stems {
                        f *= bf.ext_stem(pt(i, j)?);
                    }
                    f
                }
                Loop::Hairpin { closing: (i, j) } => bf.hairpin(j - i - 1, pt(*i, *j)?),
                Loop::Interior { closing: (i, j), inner: (k, l) } => {
                    bf.interior(k - i - 1, j - l - 1, pt(*i, *j)?, pt(*l, *k)?)
                }
                Loop::Multi { closing: (i, j), stems, unpaired } => {
                    let closing = pt(*j, *i)?;
                    if !bf.can_close(closing) {
                        0.0
                    } else {
                        let mut f = bf.ml_closing() * bf.ml_stem(closing);
                        for &(k, l) in stems {
                            f *= bf.ml_stem(pt(k, l)?);
                        }
                        f * ml_base(*unpaired)
                    }
                }
                Loop::SeamHairpin { pair: (p, q), unpaired } => bf.hairpin(*unpaired, pt(*q, *p)?),
                Loop::SeamInterior { first: (p, q), second: (k, l) } => {
                    bf.interior((p - 1) + (n - l), k - q - 1, pt(*l, *k)?, pt(*q, *p)?)
                }
                Loop::SeamMulti { stems, unpaired } => {
                    let mut f = bf.ml_closing();
                    for &(k, l) in stems {
                        f *= bf.ml_stem(pt(k, l)?);
                    }
                    f * ml_base(*unpaired)
                }
            };
        }
        Ok(w)
    }
}

fn check_length(seq: &NucleotideVec, pairs: &PairSet) -> Result<(), EnergyError> {
    if seq.len() != pairs.length() {
        return Err(EnergyError::LengthMismatch {
            sequence: seq.len(),
            structure: pairs.length(),
        });
    }
    Ok(())
}

impl EnergyTables {
    /// Free energy of a structure in kcal/mol. Forbidden structures
    /// evaluate to `f64::INFINITY`.
    pub fn structure_energy(
        &self,
        seq: &NucleotideVec,
        pairs: &PairSet,
        circular: bool,
    ) -> Result<f64, EnergyError> {
        check_length(seq, pairs)?;
        let e = LoopDecomposition::new(pairs, circular).energy(seq, self)?;
        if e >= INF {
            return Ok(f64::INFINITY);
        }
        Ok(e as f64 / 100.)
    }
}

impl BoltzmannFactors {
    /// Unscaled Boltzmann weight of a structure.
    pub fn structure_weight(
        &self,
        seq: &NucleotideVec,
        pairs: &PairSet,
        circular: bool,
    ) -> Result<f64, EnergyError> {
        check_length(seq, pairs)?;
        LoopDecomposition::new(pairs, circular).weight(seq, self)
    }
}
