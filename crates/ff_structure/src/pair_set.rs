//! Base pairs of one sampled or enumerated secondary structure.
//!
//! The sampler records every pair it closes in a `PairSet`, the energy
//! evaluation and the brute-force checks read them back through
//! `partner_table()`. Each `Pair` packs its two `NAIDX` positions into
//! one `P1KEY`, so the set is a plain integer hash set.
//!
//! Positions are **1-based** like the partition function matrices:
//! 1 is the 5'-end and `length` the 3'-end of the sequence.

use std::fmt;
use nohash_hasher::IntSet;

use crate::NAIDX;
use crate::P1KEY;
use crate::StructureError;


/// A base pair (i, j) with i < j.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    i: NAIDX,
    j: NAIDX,
}

impl Pair {
    /// Create a new pair (i, j). Panics in debug if i >= j.
    pub fn new(i: NAIDX, j: NAIDX) -> Self {
        debug_assert!(i < j);
        debug_assert!(j < NAIDX::MAX);
        Pair { i, j }
    }

    /// Return the 5'-side index.
    pub fn i(&self) -> NAIDX {
        self.i
    }

    /// Return the 3'-side index.
    pub fn j(&self) -> NAIDX {
        self.j
    }

    /// Compact 32-bit key encoding both indices.
    pub fn key(&self) -> P1KEY {
        ((self.i as P1KEY) << 16) | (self.j as P1KEY)
    }

    /// Decode a key back into a `Pair`.
    pub fn from_key(key: P1KEY) -> Self {
        let i = (key >> 16) as NAIDX;
        let j = (key & 0xFFFF) as NAIDX;
        debug_assert!(i < j);
        Pair { i, j }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.i, self.j)
    }
}

/// A collection of base pairs represented as compact integer keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSet {
    length: usize,
    pairs: IntSet<P1KEY>,
}

impl PairSet {
    /// Create an empty pair set for a given sequence length.
    pub fn new(length: usize) -> Self {
        Self {
            length,
            pairs: IntSet::default(),
        }
    }

    /// Number of pairs contained in the set.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Insert a new pair; returns true if it was newly inserted.
    pub fn insert(&mut self, pair: Pair) -> bool {
        debug_assert!(pair.i() >= 1);
        debug_assert!((pair.j() as usize) <= self.length);
        self.pairs.insert(pair.key())
    }

    /// Check if a pair exists in the set.
    pub fn contains(&self, pair: &Pair) -> bool {
        self.pairs.contains(&pair.key())
    }

    /// Iterator over all pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = Pair> + '_ {
        self.pairs.iter().map(|&k| Pair::from_key(k))
    }

    /// Return all pairs as a Vec (for deterministic inspection).
    pub fn to_vec(&self) -> Vec<Pair> {
        let mut v: Vec<_> = self.iter().collect();
        v.sort_unstable();
        v
    }

    /// Underlying sequence length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Partner table: `table[i] = Some(j)` if i is paired with j.
    /// Index 0 is unused so that positions can be used directly.
    pub fn partner_table(&self) -> Vec<Option<usize>> {
        let mut table = vec![None; self.length + 1];
        for p in self.iter() {
            table[p.i() as usize] = Some(p.j() as usize);
            table[p.j() as usize] = Some(p.i() as usize);
        }
        table
    }

    /// Checks that no position is paired twice and no two pairs cross.
    pub fn is_secondary_structure(&self) -> bool {
        let mut stack: Vec<usize> = Vec::new();
        let mut seen = vec![false; self.length + 1];
        for p in self.to_vec() {
            let (i, j) = (p.i() as usize, p.j() as usize);
            if seen[i] || seen[j] {
                return false;
            }
            seen[i] = true;
            seen[j] = true;
        }
        let table = self.partner_table();
        for (pos, partner) in table.iter().enumerate().skip(1) {
            match partner {
                Some(q) if *q > pos => stack.push(*q),
                Some(q) => {
                    if stack.pop() != Some(pos) {
                        return false;
                    }
                    debug_assert!(*q < pos);
                }
                None => (),
            }
        }
        stack.is_empty()
    }
}

impl TryFrom<(&[(usize, usize)], usize)> for PairSet {
    type Error = StructureError;

    fn try_from((pairs, length): (&[(usize, usize)], usize)) -> Result<Self, Self::Error> {
        let mut set = PairSet::new(length);
        let mut used = vec![false; length + 1];
        for &(a, b) in pairs {
            let (i, j) = if a < b { (a, b) } else { (b, a) };
            if i == 0 || j > length || i == j {
                return Err(StructureError::OutOfBounds { i, j, length });
            }
            for pos in [i, j] {
                if used[pos] {
                    return Err(StructureError::Conflict(pos));
                }
                used[pos] = true;
            }
            set.insert(Pair::new(i as NAIDX, j as NAIDX));
        }
        Ok(set)
    }
}

impl fmt::Display for PairSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for pair in self.to_vec() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", pair)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_keeps_positions() {
        let p = Pair::new(3, 300);
        assert_eq!(p.key(), (3 << 16) | 300);
        let q = Pair::from_key(p.key());
        assert_eq!((q.i(), q.j()), (3, 300));
        assert!(Pair::new(2, 9) < Pair::new(3, 4));
    }

    #[test]
    fn test_pair_set_from_list() {
        let pl = PairSet::try_from((&[(1, 6), (5, 2)][..], 6)).unwrap();
        let expected = vec![Pair::new(1, 6), Pair::new(2, 5)];
        assert_eq!(pl.length(), 6);
        assert_eq!(pl.to_vec(), expected);
        for p in &expected {
            assert!(pl.contains(p));
        }
        assert!(!pl.contains(&Pair::new(1, 5)));
        assert!(pl.is_secondary_structure());
    }

    #[test]
    fn test_pair_set_rejects_conflicts() {
        let err = PairSet::try_from((&[(1, 6), (1, 4)][..], 6)).unwrap_err();
        assert_eq!(err, StructureError::Conflict(1));
        let err = PairSet::try_from((&[(1, 7)][..], 6)).unwrap_err();
        assert!(matches!(err, StructureError::OutOfBounds { .. }));
    }

    #[test]
    fn test_crossing_pairs() {
        let pl = PairSet::try_from((&[(1, 5), (3, 8)][..], 8)).unwrap();
        assert!(!pl.is_secondary_structure());
    }

    #[test]
    fn test_partner_table_and_display() {
        let pl = PairSet::try_from((&[(8, 12), (1, 6), (2, 5)][..], 12)).unwrap();
        let table = pl.partner_table();
        assert_eq!(table.len(), 13);
        assert_eq!(table[5], Some(2));
        assert_eq!(table[12], Some(8));
        assert_eq!(table[7], None);
        assert_eq!(pl.to_string(), "(1,6),(2,5),(8,12)");
    }
}
