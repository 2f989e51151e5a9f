//! Dot-bracket notation.
//!
//! `DotBracketVec` is a plain vector of symbols, one per nucleotide.
//! Position `k` of a 1-based `PairSet` lives at index `k - 1`.
//! Besides `(`, `)` and `.` we render G-quadruplex positions as `+`;
//! those carry no pair information and are ignored when converting
//! back into a `PairSet`.

use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;

use crate::NAIDX;
use crate::Pair;
use crate::PairSet;
use crate::StructureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DotBracket {
    Unpaired,
    Open,
    Close,
    Quadruplex,
}

impl TryFrom<char> for DotBracket {
    type Error = StructureError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '.' => Ok(DotBracket::Unpaired),
            '(' => Ok(DotBracket::Open),
            ')' => Ok(DotBracket::Close),
            '+' => Ok(DotBracket::Quadruplex),
            _ => Err(StructureError::InvalidToken(c)),
        }
    }
}

impl From<DotBracket> for char {
    fn from(db: DotBracket) -> Self {
        match db {
            DotBracket::Unpaired => '.',
            DotBracket::Open => '(',
            DotBracket::Close => ')',
            DotBracket::Quadruplex => '+',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DotBracketVec(pub Vec<DotBracket>);

impl Deref for DotBracketVec {
    type Target = Vec<DotBracket>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DotBracketVec {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl DotBracketVec {
    /// All positions unpaired.
    pub fn unpaired(length: usize) -> Self {
        DotBracketVec(vec![DotBracket::Unpaired; length])
    }

    /// Marks the 1-based positions as part of a quadruplex.
    pub fn mark_quadruplex(&mut self, positions: impl IntoIterator<Item = usize>) {
        for p in positions {
            debug_assert!(p >= 1 && p <= self.len());
            self.0[p - 1] = DotBracket::Quadruplex;
        }
    }
}

impl TryFrom<&str> for DotBracketVec {
    type Error = StructureError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let symbols = s
            .chars()
            .map(DotBracket::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let dbv = DotBracketVec(symbols);
        // Balance check only, the pairs are recomputed on demand.
        PairSet::try_from(&dbv)?;
        Ok(dbv)
    }
}

impl From<&PairSet> for DotBracketVec {
    fn from(pairs: &PairSet) -> Self {
        let mut dbv = DotBracketVec::unpaired(pairs.length());
        for p in pairs.iter() {
            dbv.0[p.i() as usize - 1] = DotBracket::Open;
            dbv.0[p.j() as usize - 1] = DotBracket::Close;
        }
        dbv
    }
}

impl TryFrom<&DotBracketVec> for PairSet {
    type Error = StructureError;

    fn try_from(dbv: &DotBracketVec) -> Result<Self, Self::Error> {
        let mut pairs = PairSet::new(dbv.len());
        let mut stack: Vec<usize> = Vec::new();
        for (idx, db) in dbv.iter().enumerate() {
            let pos = idx + 1;
            match db {
                DotBracket::Open => stack.push(pos),
                DotBracket::Close => {
                    let i = stack.pop().ok_or(StructureError::UnmatchedClose(pos))?;
                    pairs.insert(Pair::new(i as NAIDX, pos as NAIDX));
                }
                DotBracket::Unpaired | DotBracket::Quadruplex => (),
            }
        }
        if let Some(i) = stack.pop() {
            return Err(StructureError::UnmatchedOpen(i));
        }
        Ok(pairs)
    }
}

impl fmt::Display for DotBracketVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self.iter().map(|&db| char::from(db)).collect();
        write!(f, "{}", s)
    }
}
