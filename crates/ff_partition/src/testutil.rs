//! Exhaustive enumeration of short sequences, used to check the
//! engines against explicit Boltzmann sums.

use ff_energy::BoltzmannFactors;
use ff_energy::EnergyTables;
use ff_energy::NucleotideVec;
use ff_energy::TURN;
use ff_structure::Pair;
use ff_structure::PairSet;
use ff_structure::NAIDX;

/// All secondary structures of i..=j (canonical pairs, hairpins of at
/// least TURN nucleotides).
fn segment(seq: &NucleotideVec, i: usize, j: usize) -> Vec<Vec<(usize, usize)>> {
    if i > j {
        return vec![vec![]];
    }
    let mut out = segment(seq, i + 1, j);
    for k in i + TURN + 1..=j {
        if seq.pair_type(i, k).is_none() {
            continue;
        }
        let inside = segment(seq, i + 1, k - 1);
        let outside = segment(seq, k + 1, j);
        for a in &inside {
            for b in &outside {
                let mut s = Vec::with_capacity(a.len() + b.len() + 1);
                s.push((i, k));
                s.extend_from_slice(a);
                s.extend_from_slice(b);
                out.push(s);
            }
        }
    }
    out
}

pub(crate) fn all_structures(seq: &NucleotideVec) -> Vec<PairSet> {
    segment(seq, 1, seq.len())
        .into_iter()
        .map(|s| {
            let mut pairs = PairSet::new(seq.len());
            for (i, j) in s {
                pairs.insert(Pair::new(i as NAIDX, j as NAIDX));
            }
            pairs
        })
        .collect()
}

/// Every structure with its (unscaled) Boltzmann weight at 37 °C.
pub(crate) fn boltzmann_ensemble(sequence: &str, circular: bool) -> Vec<(PairSet, f64)> {
    let seq = NucleotideVec::try_from(sequence).unwrap();
    let bf = BoltzmannFactors::new(&EnergyTables::default(), 37.0, false);
    all_structures(&seq)
        .into_iter()
        .map(|s| {
            let w = bf.structure_weight(&seq, &s, circular).unwrap();
            (s, w)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use ahash::AHashMap;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use ff_energy::Loop;
    use ff_energy::LoopDecomposition;
    use ff_structure::DotBracketVec;

    use crate::Decomposition;
    use crate::Ensemble;
    use crate::FoldOptions;
    use crate::FoldingContext;
    use crate::LoopKind;
    use crate::SoftConstraints;

    const LINEAR: [&str; 3] = ["GGGAAACCGGAAACCC", "ACGUACGUACGUACGU", "GGGAAAUCCAGGAAACCU"];
    const CIRCULAR: [&str; 2] = ["GGAAACCGGAAACCGGAAACC", "GGGAAAUCCAGGAAACCU"];

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn context(seq: &str, circular: bool) -> FoldingContext {
        let o = FoldOptions { circular, pf_scale: Some(1.0), ..Default::default() };
        FoldingContext::new(seq, &EnergyTables::default(), o).unwrap()
    }

    fn check_probabilities(e: &Ensemble<'_>, ensemble: &[(PairSet, f64)]) {
        let n = e.context().len();
        let z: f64 = ensemble.iter().map(|(_, w)| w).sum();
        let probs = e.probabilities().unwrap();
        for i in 1..=n {
            for j in i + 1..=n {
                let pair = Pair::new(i as NAIDX, j as NAIDX);
                let p: f64 = ensemble
                    .iter()
                    .filter(|(s, _)| s.contains(&pair))
                    .map(|(_, w)| w)
                    .sum::<f64>()
                    / z;
                assert_relative_eq!(probs.get(i, j), p, epsilon = 1e-9, max_relative = 1e-8);
            }
        }
    }

    #[test]
    fn test_enumeration() {
        let seq = NucleotideVec::try_from("GGGAAACCC").unwrap();
        let all = all_structures(&seq);
        // open chain, 9 single pairs, 9 nested pairs of pairs, 1 full stem
        assert_eq!(all.len(), 20);
        assert!(all.iter().all(|s| s.is_secondary_structure()));
    }

    #[test]
    fn test_linear_partition_function() {
        init();
        for seq in LINEAR {
            let ensemble = boltzmann_ensemble(seq, false);
            let z: f64 = ensemble.iter().map(|(_, w)| w).sum();
            let c = context(seq, false);
            let mut e = Ensemble::new(&c);
            e.fold().unwrap();
            assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
            check_probabilities(&e, &ensemble);
        }
    }

    #[test]
    fn test_rescaling_is_transparent() {
        let seq = LINEAR[0];
        let z: f64 = boltzmann_ensemble(seq, false).iter().map(|(_, w)| w).sum();
        let c = FoldingContext::new(seq, &EnergyTables::default(), FoldOptions::default()).unwrap();
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        let q = e.partition_function().unwrap() * c.scaling().pf_scale().powi(seq.len() as i32);
        assert_relative_eq!(q, z, max_relative = 1e-10);
        let kt = c.boltzmann_factors().kt();
        assert_relative_eq!(e.ensemble_energy().unwrap(), -z.ln() * kt / 1000.0, max_relative = 1e-10);
    }

    #[test]
    fn test_circular_partition_function() {
        init();
        for seq in CIRCULAR {
            let ensemble = boltzmann_ensemble(seq, true);
            let z: f64 = ensemble.iter().map(|(_, w)| w).sum();
            let c = context(seq, true);
            let mut e = Ensemble::new(&c);
            e.fold().unwrap();
            assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
            check_probabilities(&e, &ensemble);
        }
    }

    #[test]
    fn test_soft_constraints() {
        for (seq, circular) in [(LINEAR[0], false), (LINEAR[2], false), (CIRCULAR[1], true)] {
            let n = seq.len();
            let mut sc = SoftConstraints::new(n);
            sc.add_unpaired(3, 0.7).unwrap();
            sc.add_unpaired(5, -0.4).unwrap();
            sc.add_unpaired(n, 0.3).unwrap();
            sc.add_pair(1, n - 1, -1.2).unwrap();
            sc.add_pair(2, 7, 0.8).unwrap();

            let c = context(seq, circular).with_soft_constraints(&sc).unwrap();
            let kt = c.boltzmann_factors().kt();
            let bz = |e: f64| (-e * 1000.0 / kt).exp();
            let ensemble: Vec<(PairSet, f64)> = boltzmann_ensemble(seq, circular)
                .into_iter()
                .map(|(s, w)| {
                    let table = s.partner_table();
                    let mut f = 1.0;
                    for (k, e) in [(3, 0.7), (5, -0.4), (n, 0.3)] {
                        if table[k].is_none() {
                            f *= bz(e);
                        }
                    }
                    if table[1] == Some(n - 1) {
                        f *= bz(-1.2);
                    }
                    if table[2] == Some(7) {
                        f *= bz(0.8);
                    }
                    (s, w * f)
                })
                .collect();
            let z: f64 = ensemble.iter().map(|(_, w)| w).sum();

            let mut e = Ensemble::new(&c);
            e.fold().unwrap();
            assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
            check_probabilities(&e, &ensemble);
        }
    }

    #[test]
    fn test_stacking_pseudo_energies() {
        let seq = LINEAR[0];
        let n = seq.len();
        let stack: Vec<f64> = (1..=n).map(|i| 0.1 * (i % 4) as f64 - 0.15).collect();
        let mut sc = SoftConstraints::new(n);
        sc.set_stack(&stack).unwrap();

        let c = context(seq, false).with_soft_constraints(&sc).unwrap();
        let kt = c.boltzmann_factors().kt();
        let ensemble: Vec<(PairSet, f64)> = boltzmann_ensemble(seq, false)
            .into_iter()
            .map(|(s, w)| {
                let mut e = 0.0;
                for p in s.iter() {
                    let (i, j) = (p.i() as usize, p.j() as usize);
                    if s.contains(&Pair::new(p.i() + 1, p.j() - 1)) {
                        e += stack[i - 1] + stack[i] + stack[j - 2] + stack[j - 1];
                    }
                }
                (s, w * (-e * 1000.0 / kt).exp())
            })
            .collect();
        let z: f64 = ensemble.iter().map(|(_, w)| w).sum();

        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
        check_probabilities(&e, &ensemble);
    }

    #[test]
    fn test_decomposition_weight() {
        let seq = LINEAR[0];
        let sc = SoftConstraints::new(seq.len()).with_weight(
            |_: usize, _: usize, _: usize, _: usize, kind: Decomposition| match kind {
                Decomposition::Hairpin => 2.0,
                Decomposition::InteriorPair => 0.5,
                _ => 1.0,
            },
        );
        let c = context(seq, false).with_soft_constraints(&sc).unwrap();
        let ensemble: Vec<(PairSet, f64)> = boltzmann_ensemble(seq, false)
            .into_iter()
            .map(|(s, w)| {
                let mut f = 1.0;
                for l in LoopDecomposition::new(&s, false).loops() {
                    match l {
                        Loop::Hairpin { .. } => f *= 2.0,
                        Loop::Interior { .. } => f *= 0.5,
                        _ => (),
                    }
                }
                (s, w * f)
            })
            .collect();
        let z: f64 = ensemble.iter().map(|(_, w)| w).sum();

        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
        check_probabilities(&e, &ensemble);
    }

    fn check_sampling(e: &Ensemble<'_>, ensemble: &[(PairSet, f64)], seed: u64) {
        let z: f64 = ensemble.iter().map(|(_, w)| w).sum();
        let count = 20_000;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut histogram: AHashMap<String, usize> = AHashMap::default();
        for s in e.sample_many(count, &mut rng).unwrap() {
            *histogram.entry(s.to_string()).or_default() += 1;
        }
        let expected: AHashMap<String, f64> = ensemble
            .iter()
            .map(|(s, w)| (DotBracketVec::from(s).to_string(), w / z))
            .collect();
        for (db, &k) in &histogram {
            assert!(expected.contains_key(db), "sampled an impossible structure {db}");
            let p = expected[db];
            let f = k as f64 / count as f64;
            assert!((f - p).abs() < 0.015 + 0.1 * p, "{db}: frequency {f} vs probability {p}");
        }
        for (db, &p) in &expected {
            if p > 0.02 {
                let f = histogram.get(db).copied().unwrap_or(0) as f64 / count as f64;
                assert!((f - p).abs() < 0.015, "{db}: frequency {f} vs probability {p}");
            }
        }
    }

    fn check_plain_sampling(seq: &str, circular: bool, seed: u64) {
        let c = context(seq, circular);
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        check_sampling(&e, &boltzmann_ensemble(seq, circular), seed);
    }

    #[test]
    fn test_linear_sampling_frequencies() {
        check_plain_sampling(LINEAR[0], false, 1);
        check_plain_sampling(LINEAR[2], false, 2);
    }

    #[test]
    fn test_circular_sampling_frequencies() {
        check_plain_sampling(CIRCULAR[0], true, 3);
        check_plain_sampling(CIRCULAR[1], true, 4);
    }

    #[test]
    fn test_prefix_sampling_frequencies() {
        let seq = LINEAR[2];
        let prefix = 12;
        let ensemble = boltzmann_ensemble(&seq[..prefix], false);
        let z: f64 = ensemble.iter().map(|(_, w)| w).sum();
        let c = context(seq, false);
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();

        let count = 10_000;
        let mut rng = StdRng::seed_from_u64(9);
        let mut histogram: AHashMap<String, usize> = AHashMap::default();
        for _ in 0..count {
            let s = e.sample_prefix(prefix, &mut rng).unwrap().to_string();
            *histogram.entry(s[..prefix].to_string()).or_default() += 1;
        }
        for (s, w) in &ensemble {
            let p = w / z;
            let db = DotBracketVec::from(s).to_string();
            let f = histogram.get(&db).copied().unwrap_or(0) as f64 / count as f64;
            assert!((f - p).abs() < 0.02, "{db}: frequency {f} vs probability {p}");
        }
    }

    type Weight = fn(usize, usize, usize, usize, Decomposition) -> f64;

    /// A position dependent weight for every kind of decomposition.
    fn uneven(i: usize, j: usize, k: usize, l: usize, kind: Decomposition) -> f64 {
        let base = match kind {
            Decomposition::Hairpin => 1.3,
            Decomposition::InteriorPair => 0.8,
            Decomposition::MultiClose => 1.7,
            Decomposition::MultiExtend5 => 0.9,
            Decomposition::MultiExtend3 => 1.2,
            Decomposition::ExteriorExtend => 0.7,
            Decomposition::ExteriorConcat => 1.4,
        };
        base * (1.0 + 0.1 * ((3 * i + 5 * j + 7 * k + l) % 4) as f64)
    }

    /// The outermost pairs within a..=b.
    fn stems(table: &[Option<usize>], a: usize, b: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut k = a;
        while k <= b {
            match table[k] {
                Some(q) if q > k => {
                    out.push((k, q));
                    k = q + 1;
                }
                _ => k += 1,
            }
        }
        out
    }

    /// Appending q+1..=b one by one behind an element starting at i.
    fn extension(w: Weight, i: usize, q: usize, b: usize, kind: Decomposition) -> f64 {
        (q + 1..=b).map(|l| w(i, l, l - 1, l, kind)).product()
    }

    /// Exterior segment 1..=b: its last stem, and the segment before it.
    fn exterior_factor(w: Weight, stems: &[(usize, usize)], b: usize) -> f64 {
        match stems.split_last() {
            None => w(1, b, 1, b, Decomposition::ExteriorExtend),
            Some((&(p, q), rest)) => {
                let stem = extension(w, p, q, b, Decomposition::ExteriorExtend);
                if p == 1 {
                    stem
                } else {
                    exterior_factor(w, rest, p - 1) * stem * w(1, b, p - 1, p, Decomposition::ExteriorConcat)
                }
            }
        }
    }

    /// Multi-loop segment a..=b with at least one branch.
    fn multi_factor(w: Weight, stems: &[(usize, usize)], a: usize, b: usize) -> f64 {
        let Some((&(p, q), rest)) = stems.split_last() else {
            return 0.0;
        };
        let branch = extension(w, p, q, b, Decomposition::MultiExtend3);
        if !rest.is_empty() {
            multi_factor(w, rest, a, p - 1) * branch
        } else if p == a {
            branch
        } else {
            branch * w(a, b, p, b, Decomposition::MultiExtend5)
        }
    }

    /// Product of the decomposition weights of one structure.
    fn decomposition_factor(w: Weight, s: &PairSet, circular: bool) -> f64 {
        let n = s.length();
        let table = s.partner_table();
        let outer = stems(&table, 1, n);
        let mut f = match (circular, outer.len()) {
            (false, _) => exterior_factor(w, &outer, n),
            (true, 0..=2) => 1.0,
            (true, _) => multi_factor(w, &outer, 1, n),
        };
        for p in s.iter() {
            let (i, j) = (p.i() as usize, p.j() as usize);
            let inner = stems(&table, i + 1, j - 1);
            f *= match inner.as_slice() {
                [] => w(i, j, i, j, Decomposition::Hairpin),
                [(k, l)] => w(i, j, *k, *l, Decomposition::InteriorPair),
                _ => w(i, j, i + 1, j - 1, Decomposition::MultiClose) * multi_factor(w, &inner, i + 1, j - 1),
            };
        }
        f
    }

    #[test]
    fn test_decomposition_weights_of_every_kind() {
        init();
        for (seq, circular, seed) in [(LINEAR[0], false, 21), (LINEAR[2], false, 22), (CIRCULAR[0], true, 23)] {
            let sc = SoftConstraints::new(seq.len()).with_weight(uneven);
            let c = context(seq, circular).with_soft_constraints(&sc).unwrap();
            let ensemble: Vec<(PairSet, f64)> = boltzmann_ensemble(seq, circular)
                .into_iter()
                .map(|(s, w)| {
                    let f = decomposition_factor(uneven, &s, circular);
                    (s, w * f)
                })
                .collect();
            let z: f64 = ensemble.iter().map(|(_, w)| w).sum();

            let mut e = Ensemble::new(&c);
            e.fold().unwrap();
            assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
            check_probabilities(&e, &ensemble);
            assert!(!e.probabilities().unwrap().is_degraded());
            check_sampling(&e, &ensemble, seed);
        }
    }

    #[test]
    fn test_weighted_prefix_sampling() {
        let seq = LINEAR[2];
        let prefix = 12;
        let sc = SoftConstraints::new(seq.len()).with_weight(uneven);
        let c = context(seq, false).with_soft_constraints(&sc).unwrap();
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        let ensemble: Vec<(String, f64)> = boltzmann_ensemble(&seq[..prefix], false)
            .into_iter()
            .map(|(s, w)| {
                let f = decomposition_factor(uneven, &s, false);
                (DotBracketVec::from(&s).to_string(), w * f)
            })
            .collect();
        let z: f64 = ensemble.iter().map(|(_, w)| w).sum();

        let count = 10_000;
        let mut rng = StdRng::seed_from_u64(24);
        let mut histogram: AHashMap<String, usize> = AHashMap::default();
        for _ in 0..count {
            let s = e.sample_prefix(prefix, &mut rng).unwrap().to_string();
            *histogram.entry(s[..prefix].to_string()).or_default() += 1;
        }
        for (db, w) in &ensemble {
            let p = w / z;
            let f = histogram.get(db).copied().unwrap_or(0) as f64 / count as f64;
            assert!((f - p).abs() < 0.02, "{db}: frequency {f} vs probability {p}");
        }
    }

    #[test]
    fn test_exterior_weights_shape_the_ensemble() {
        let seq = "AGGGGAAAACCCC";
        let sc = SoftConstraints::new(seq.len()).with_weight(
            |_: usize, _: usize, _: usize, _: usize, kind: Decomposition| {
                if kind == Decomposition::ExteriorConcat { 0.0 } else { 1.0 }
            },
        );
        let c = context(seq, false).with_soft_constraints(&sc).unwrap();
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        // A1 cannot pair, so only the open chain is left.
        assert_relative_eq!(e.partition_function().unwrap(), 1.0, max_relative = 1e-12);
        let probs = e.probabilities().unwrap();
        assert!(!probs.is_degraded());
        assert!(probs.pairs_above(0.0).is_empty());
        let mut rng = StdRng::seed_from_u64(8);
        for s in e.sample_many(200, &mut rng).unwrap() {
            assert!(s.pairs().is_empty());
        }
    }

    #[test]
    fn test_hard_constraints() {
        init();
        let everywhere = [LoopKind::Exterior, LoopKind::Hairpin, LoopKind::Interior, LoopKind::Multi];
        let cases = [
            (LINEAR[0], false, (2, 15), (9, 14), 3, 31),
            (LINEAR[2], false, (11, 17), (1, 9), 2, 32),
            (CIRCULAR[1], true, (11, 17), (1, 9), 2, 33),
        ];
        for (seq, circular, enforced, forbidden, paired, seed) in cases {
            let c = context(seq, circular);
            let mut hc = c.hard_constraints().clone();
            hc.enforce_pair(enforced.0, enforced.1).unwrap();
            hc.forbid_pair(forbidden.0, forbidden.1).unwrap();
            hc.forbid_unpaired(paired, &everywhere).unwrap();
            let c = c.with_hard_constraints(hc).unwrap();

            let ensemble: Vec<(PairSet, f64)> = boltzmann_ensemble(seq, circular)
                .into_iter()
                .filter(|(s, _)| {
                    let table = s.partner_table();
                    table[enforced.0] == Some(enforced.1)
                        && table[forbidden.0] != Some(forbidden.1)
                        && table[paired].is_some()
                })
                .collect();
            assert!(ensemble.len() > 1);
            let z: f64 = ensemble.iter().map(|(_, w)| w).sum();

            let mut e = Ensemble::new(&c);
            e.fold().unwrap();
            assert_relative_eq!(e.partition_function().unwrap(), z, max_relative = 1e-10);
            check_probabilities(&e, &ensemble);
            let probs = e.probabilities().unwrap();
            assert_relative_eq!(probs.get(enforced.0, enforced.1), 1.0, max_relative = 1e-9);
            assert_eq!(probs.get(forbidden.0, forbidden.1), 0.0);
            assert_relative_eq!(probs.unpaired(paired), 0.0, epsilon = 1e-9);
            check_sampling(&e, &ensemble, seed);
        }
    }

    #[test]
    fn test_concurrent_sampling() {
        init();
        let seq = "GGGAAAUCCAGGAAACCUGGGAAAUCCAGGAAACCU";
        let c = FoldingContext::new(seq, &EnergyTables::default(), FoldOptions::default()).unwrap();
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        let e = &e;
        let results: Vec<Vec<String>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    scope.spawn(move || {
                        let mut rng = StdRng::seed_from_u64(100 + t);
                        e.sample_many(50, &mut rng)
                            .unwrap()
                            .iter()
                            .map(|s| s.to_string())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.len(), 4);
        for (t, samples) in results.iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(100 + t as u64);
            let again: Vec<String> =
                e.sample_many(50, &mut rng).unwrap().iter().map(|s| s.to_string()).collect();
            assert_eq!(samples, &again);
        }
    }

    #[test]
    fn test_quadruplex_ensemble() {
        init();
        let seq = "AAAAGGGAGGGAGGGAGGGAAAA";
        let o = FoldOptions { gquad: true, ..Default::default() };
        let c = FoldingContext::new(seq, &EnergyTables::default(), o).unwrap();
        let mut e = Ensemble::new(&c);
        e.fold().unwrap();
        assert!(e.ensemble_energy().unwrap() < -30.0);
        let probs = e.probabilities().unwrap();
        assert!(probs.gquad(5, 19) > 0.99);
        assert_eq!(probs.pairs_above(0.0).len(), 0);

        let mut rng = StdRng::seed_from_u64(17);
        let samples = e.sample_many(100, &mut rng).unwrap();
        let hits = samples
            .iter()
            .filter(|s| s.to_string() == "....+++.+++.+++.+++....")
            .count();
        assert!(hits > 95);

        let plain = FoldingContext::new(seq, &EnergyTables::default(), FoldOptions::default()).unwrap();
        let mut e = Ensemble::new(&plain);
        e.fold().unwrap();
        assert_relative_eq!(e.ensemble_energy().unwrap(), 0.0, epsilon = 1e-9);
    }
}
