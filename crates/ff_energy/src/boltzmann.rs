//! Temperature dependent Boltzmann factors of the loop energies.
//!
//! The parameter tables only carry free energies at 37 °C, changing the
//! temperature therefore changes kT but not the loop energies.

use log::debug;

use crate::EnergyTables;
use crate::PairType;
use crate::GASCONST;
use crate::INF;
use crate::K0;
use crate::MAXLOOP;
use crate::TURN;

#[derive(Debug, Clone)]
pub struct BoltzmannFactors {
    tables: EnergyTables,
    temperature: f64,
    kt: f64,
    no_gu_closure: bool,
    exp_stack: [[f64; 6]; 6],
    exp_hairpin: [f64; MAXLOOP + 1],
    exp_bulge: [f64; MAXLOOP + 1],
    exp_interior: [f64; MAXLOOP + 1],
    exp_ninio: [f64; MAXLOOP + 1],
    exp_terminal_au: f64,
    exp_interior_au: f64,
    exp_ml_closing: f64,
    exp_ml_intern: f64,
    exp_ml_base: f64,
}

impl BoltzmannFactors {
    pub fn new(tables: &EnergyTables, temperature: f64, no_gu_closure: bool) -> Self {
        let kt = (temperature + K0) * GASCONST;
        let bz = |e: i32| boltzmann(e, kt);

        let mut exp_stack = [[0.0; 6]; 6];
        for a in PairType::ALL {
            for b in PairType::ALL {
                exp_stack[a.index()][b.index()] = bz(tables.stack[a.index()][b.index()]);
            }
        }
        let exp_hairpin = tables.hairpin.map(bz);
        let exp_bulge = tables.bulge.map(bz);
        let exp_interior = tables.interior.map(bz);
        let mut exp_ninio = [0.0; MAXLOOP + 1];
        for (d, f) in exp_ninio.iter_mut().enumerate() {
            *f = bz(tables.max_ninio.min(tables.ninio * d as i32));
        }
        debug!("Boltzmann factors at {temperature} °C (kT = {kt:.3} cal/mol).");

        BoltzmannFactors {
            tables: tables.clone(),
            temperature,
            kt,
            no_gu_closure,
            exp_stack,
            exp_hairpin,
            exp_bulge,
            exp_interior,
            exp_ninio,
            exp_terminal_au: bz(tables.terminal_au),
            exp_interior_au: bz(tables.interior_au),
            exp_ml_closing: bz(tables.ml_closing),
            exp_ml_intern: bz(tables.ml_intern),
            exp_ml_base: bz(tables.ml_base),
        }
    }

    pub fn tables(&self) -> &EnergyTables {
        &self.tables
    }

    /// Temperature in °C.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// kT in cal/mol.
    pub fn kt(&self) -> f64 {
        self.kt
    }

    pub fn no_gu_closure(&self) -> bool {
        self.no_gu_closure
    }

    /// Boltzmann factor of an energy given in dcal/mol.
    pub fn boltzmann(&self, e: i32) -> f64 {
        boltzmann(e, self.kt)
    }

    /// Whether a pair of this type may close a hairpin, a non-stacking
    /// interior loop or a multi-branch loop.
    pub fn can_close(&self, pt: PairType) -> bool {
        !(self.no_gu_closure && pt.is_gu())
    }

    fn terminal(&self, pt: PairType) -> f64 {
        if pt.has_terminal_penalty() { self.exp_terminal_au } else { 1.0 }
    }

    fn initiation(&self, table: &[f64; MAXLOOP + 1], energies: &[i32; MAXLOOP + 1], u: usize) -> f64 {
        if u <= MAXLOOP {
            table[u]
        } else {
            let e = energies[MAXLOOP] + (self.tables.lxc * (u as f64 / MAXLOOP as f64).ln()) as i32;
            self.boltzmann(e)
        }
    }

    pub fn hairpin(&self, u: usize, pt: PairType) -> f64 {
        if u < TURN || !self.can_close(pt) {
            return 0.0;
        }
        let f = self.initiation(&self.exp_hairpin, &self.tables.hairpin, u);
        if u == TURN { f * self.terminal(pt) } else { f }
    }

    /// See [`EnergyTables::interior_energy`] for the argument convention.
    pub fn interior(&self, u1: usize, u2: usize, pt: PairType, pt_inner: PairType) -> f64 {
        let (small, large) = if u1 < u2 { (u1, u2) } else { (u2, u1) };
        if large == 0 {
            return self.exp_stack[pt.index()][pt_inner.index()];
        }
        if !self.can_close(pt) || !self.can_close(pt_inner) {
            return 0.0;
        }
        if small == 0 {
            let f = self.initiation(&self.exp_bulge, &self.tables.bulge, large);
            if large == 1 {
                f * self.exp_stack[pt.index()][pt_inner.index()]
            } else {
                f * self.terminal(pt) * self.terminal(pt_inner)
            }
        } else {
            let mut f = self.initiation(&self.exp_interior, &self.tables.interior, u1 + u2);
            let d = large - small;
            f *= if d <= MAXLOOP {
                self.exp_ninio[d]
            } else {
                self.boltzmann(self.tables.max_ninio)
            };
            for p in [pt, pt_inner] {
                if p.has_terminal_penalty() {
                    f *= self.exp_interior_au;
                }
            }
            f
        }
    }

    pub fn ml_closing(&self) -> f64 {
        self.exp_ml_closing
    }

    pub fn ml_stem(&self, pt: PairType) -> f64 {
        self.exp_ml_intern * self.terminal(pt)
    }

    /// Branch factor of a stem without terminal penalty, e.g. a quadruplex.
    pub fn ml_intern(&self) -> f64 {
        self.exp_ml_intern
    }

    /// Per unpaired nucleotide in a multi-branch loop.
    pub fn ml_base(&self) -> f64 {
        self.exp_ml_base
    }

    pub fn ext_stem(&self, pt: PairType) -> f64 {
        self.terminal(pt)
    }

    pub fn gquad(&self, layers: usize, linkers: usize) -> f64 {
        self.boltzmann(self.tables.gquad_energy(layers, linkers))
    }

    pub fn gquad_interior(&self, u: usize, pt: PairType) -> f64 {
        if !self.can_close(pt) {
            return 0.0;
        }
        self.initiation(&self.exp_interior, &self.tables.interior, u) * self.terminal(pt)
    }
}

fn boltzmann(e: i32, kt: f64) -> f64 {
    if e >= INF {
        0.0
    } else {
        (-(e as f64) * 10.0 / kt).exp()
    }
}
