//! Nearest-neighbor parameter tables.
//!
//! All energies are stored in dcal/mol at 37 °C. The default set is a
//! subset of the Turner 2004 parameters without dangling ends or
//! sequence dependent loop mismatches. Tables can be replaced as a
//! whole or partially through serde, missing fields fall back to the
//! defaults.

use serde::Deserialize;
use serde::Serialize;

use crate::PairType;
use crate::INF;
use crate::MAXLOOP;
use crate::TURN;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyTables {
    /// `stack[type(i,j)][type(l,k)]` for a pair (i,j) stacked on (k,l).
    pub stack: [[i32; 6]; 6],
    /// Hairpin initiation by loop size (0..=MAXLOOP).
    pub hairpin: [i32; MAXLOOP + 1],
    /// Bulge initiation by loop size (0..=MAXLOOP).
    pub bulge: [i32; MAXLOOP + 1],
    /// Interior loop initiation by total loop size (0..=MAXLOOP).
    pub interior: [i32; MAXLOOP + 1],
    /// Asymmetry penalty per unpaired nucleotide difference.
    pub ninio: i32,
    pub max_ninio: i32,
    /// AU/GU helix end penalty in exterior and multi-branch loops.
    pub terminal_au: i32,
    /// AU/GU closure penalty of generic interior loops.
    pub interior_au: i32,
    pub ml_closing: i32,
    pub ml_intern: i32,
    pub ml_base: i32,
    /// Extrapolation constant for loops larger than MAXLOOP.
    pub lxc: f64,
    pub gquad_alpha: i32,
    pub gquad_beta: i32,
}

impl Default for EnergyTables {
    fn default() -> Self {
        EnergyTables {
            stack: [
                //  CG    GC    GU    UG    AU    UA
                [-240, -330, -210, -140, -210, -210], // CG
                [-330, -340, -250, -150, -220, -240], // GC
                [-210, -250,  130,  -50, -140, -130], // GU
                [-140, -150,  -50,   30,  -60, -100], // UG
                [-210, -220, -140,  -60, -110,  -90], // AU
                [-210, -240, -130, -100,  -90, -130], // UA
            ],
            hairpin: [
                INF, INF, INF, 540, 560, 570, 540, 600, 550, 640,
                650, 660, 670, 678, 686, 694, 701, 707, 713, 719,
                725, 730, 735, 740, 744, 749, 753, 757, 761, 765,
                769,
            ],
            bulge: [
                INF, 380, 280, 320, 360, 400, 440, 459, 470, 480,
                490, 500, 510, 519, 527, 534, 541, 548, 554, 560,
                565, 571, 576, 580, 585, 589, 594, 598, 602, 605,
                609,
            ],
            interior: [
                INF, INF, 50, 160, 110, 200, 200, 210, 230, 240,
                250, 260, 270, 280, 290, 290, 300, 310, 310, 320,
                330, 330, 340, 340, 350, 350, 350, 360, 360, 370,
                370,
            ],
            ninio: 60,
            max_ninio: 300,
            terminal_au: 50,
            interior_au: 70,
            ml_closing: 930,
            ml_intern: -90,
            ml_base: 0,
            lxc: 107.856,
            gquad_alpha: -1800,
            gquad_beta: 1200,
        }
    }
}

impl EnergyTables {
    fn initiation(&self, table: &[i32; MAXLOOP + 1], u: usize) -> i32 {
        if u <= MAXLOOP {
            table[u]
        } else {
            table[MAXLOOP] + (self.lxc * (u as f64 / MAXLOOP as f64).ln()) as i32
        }
    }

    fn terminal(&self, pt: PairType) -> i32 {
        if pt.has_terminal_penalty() { self.terminal_au } else { 0 }
    }

    /// Hairpin of `u` unpaired nucleotides closed by a pair of type `pt`.
    pub fn hairpin_energy(&self, u: usize, pt: PairType) -> i32 {
        if u < TURN {
            return INF;
        }
        let e = self.initiation(&self.hairpin, u);
        if u == TURN { e + self.terminal(pt) } else { e }
    }

    /// Interior loop closed by (i,j) of type `pt` enclosing (k,l),
    /// where `pt_inner` is the type of the reversed inner pair (l,k)
    /// and `u1 = k-i-1`, `u2 = j-l-1`.
    pub fn interior_energy(&self, u1: usize, u2: usize, pt: PairType, pt_inner: PairType) -> i32 {
        let (small, large) = if u1 < u2 { (u1, u2) } else { (u2, u1) };
        if large == 0 {
            self.stack[pt.index()][pt_inner.index()]
        } else if small == 0 {
            let e = self.initiation(&self.bulge, large);
            if large == 1 {
                e + self.stack[pt.index()][pt_inner.index()]
            } else {
                e + self.terminal(pt) + self.terminal(pt_inner)
            }
        } else {
            let mut e = self.initiation(&self.interior, u1 + u2);
            e += self.max_ninio.min(self.ninio * (large - small) as i32);
            for p in [pt, pt_inner] {
                if p.has_terminal_penalty() {
                    e += self.interior_au;
                }
            }
            e
        }
    }

    /// Contribution of one stem inside a multi-branch loop.
    pub fn ml_stem_energy(&self, pt: PairType) -> i32 {
        self.ml_intern + self.terminal(pt)
    }

    /// Contribution of one stem in the exterior loop.
    pub fn ext_stem_energy(&self, pt: PairType) -> i32 {
        self.terminal(pt)
    }

    /// A G-quadruplex with `layers` stacked G-quartets and three linkers
    /// of `linkers` nucleotides in total.
    pub fn gquad_energy(&self, layers: usize, linkers: usize) -> i32 {
        debug_assert!(layers >= 2 && linkers >= 3);
        self.gquad_alpha * (layers as i32 - 1)
            + (self.gquad_beta as f64 * ((linkers - 2) as f64).ln()) as i32
    }

    /// A G-quadruplex enclosed as the single inner element of a loop
    /// closed by a pair of type `pt` with `u` unpaired nucleotides.
    pub fn gquad_interior_energy(&self, u: usize, pt: PairType) -> i32 {
        self.initiation(&self.interior, u) + self.terminal(pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hairpin_energy() {
        let t = EnergyTables::default();
        assert_eq!(t.hairpin_energy(2, PairType::GC), INF);
        assert_eq!(t.hairpin_energy(3, PairType::GC), 540);
        assert_eq!(t.hairpin_energy(3, PairType::AU), 590);
        assert_eq!(t.hairpin_energy(4, PairType::AU), 560);
        // Extrapolated beyond the table.
        assert_eq!(t.hairpin_energy(60, PairType::CG), 769 + (107.856 * 2f64.ln()) as i32);
    }

    #[test]
    fn test_interior_energy() {
        let t = EnergyTables::default();
        assert_eq!(t.interior_energy(0, 0, PairType::GC, PairType::GC), -340);
        assert_eq!(t.interior_energy(1, 0, PairType::GC, PairType::GC), 380 - 340);
        assert_eq!(t.interior_energy(0, 3, PairType::AU, PairType::GC), 320 + 50);
        // 1x1 loop with one AU closure.
        assert_eq!(t.interior_energy(1, 1, PairType::AU, PairType::CG), 50 + 70);
        // 1x4 asymmetric loop.
        assert_eq!(t.interior_energy(1, 4, PairType::CG, PairType::CG), 200 + 180);
        // Asymmetry saturates.
        assert_eq!(t.interior_energy(1, 15, PairType::CG, PairType::CG), 300 + 300);
    }

    #[test]
    fn test_stem_energies() {
        let t = EnergyTables::default();
        assert_eq!(t.ml_stem_energy(PairType::CG), -90);
        assert_eq!(t.ml_stem_energy(PairType::UA), -40);
        assert_eq!(t.ext_stem_energy(PairType::GU), 50);
        assert_eq!(t.ext_stem_energy(PairType::GC), 0);
        assert_eq!(t.gquad_energy(2, 3), -1800);
        assert_eq!(t.gquad_energy(3, 3), -3600);
    }

    #[test]
    fn test_partial_deserialization() {
        let t: EnergyTables = serde_json::from_str(r#"{"ml_closing": 340, "ml_base": 40}"#).unwrap();
        assert_eq!(t.ml_closing, 340);
        assert_eq!(t.ml_base, 40);
        assert_eq!(t.stack, EnergyTables::default().stack);
    }
}
