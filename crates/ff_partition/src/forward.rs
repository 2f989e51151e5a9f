//! The forward (inside) recursion.
//!
//! The matrices are filled column by column (increasing j), each column
//! from the diagonal upwards (decreasing i). A cell (i,j) therefore sees
//! every cell (k,l) with i <= k <= l <= j, (k,l) != (i,j), which are all
//! the cells of shorter spans it depends on.

use std::ops::ControlFlow;

use log::debug;
use log::warn;
use ff_energy::TURN;

use crate::Decomposition;
use crate::FoldingContext;
use crate::PfError;
use crate::PfMatrices;

fn check(v: f64, i: usize, j: usize, warned: &mut bool) -> Result<(), PfError> {
    if !v.is_finite() || v >= f64::MAX {
        return Err(PfError::ForwardOverflow { i, j });
    }
    if v > f64::MAX / 10.0 && !*warned {
        warn!("Q[{i},{j}] = {v:e} is close to overflow, consider a larger pf_scale.");
        *warned = true;
    }
    Ok(())
}

pub(crate) fn forward(ctx: &FoldingContext) -> Result<PfMatrices, PfError> {
    let n = ctx.len();
    let terms = ctx.terms();
    let mut m = PfMatrices::new(n, ctx.quadruplex_model().is_some());

    if let (Some(model), Some(g)) = (ctx.quadruplex_model(), m.g.as_mut()) {
        let bf = ctx.boltzmann_factors();
        for i in 1..=n {
            for j in i..=n {
                let w = model.weight(bf, i, j);
                if w > 0.0 {
                    g[(i, j)] = w * ctx.scaling().scale(j - i + 1);
                }
            }
        }
    }

    let mut warned = false;
    for j in 1..=n {
        for i in (1..=j).rev() {
            let gij = m.g(i, j);

            if j - i > TURN {
                // Closed by (i,j).
                let mut qbt = terms.hairpin(i, j);
                let _ = terms.visit_interior(i, j, |k, l, w| {
                    qbt += m.qb[(k, l)] * w;
                    ControlFlow::<()>::Continue(())
                });
                if m.g.is_some() {
                    let _ = terms.visit_gquad_interior(i, j, |k, l, w| {
                        qbt += m.g(k, l) * w;
                        ControlFlow::<()>::Continue(())
                    });
                }
                let closing = terms.multi_closing(i, j);
                if closing > 0.0 {
                    let mut branches = 0.0;
                    for k in i + TURN + 3..(j - 1).saturating_sub(TURN) {
                        branches += m.qm[(i + 1, k - 1)] * m.qm1[(k, j - 1)];
                    }
                    qbt += branches * closing;
                }
                m.qb[(i, j)] = qbt;

                // One branch starting at i.
                let mut qm1t = qbt * terms.ml_stem(i, j) + gij * terms.ml_quadruplex();
                let prev = m.qm1[(i, j - 1)];
                if prev > 0.0 {
                    qm1t += prev
                        * terms.ml_unpaired(j, 1)
                        * terms.weight(i, j, j - 1, j, Decomposition::MultiExtend3);
                }
                m.qm1[(i, j)] = qm1t;

                // At least one branch.
                let mut qmt = qm1t;
                for k in i + 1..=j {
                    let right = m.qm1.get(k, j);
                    if right == 0.0 {
                        continue;
                    }
                    qmt += m.qm.get(i, k - 1) * right;
                    let up = terms.ml_unpaired(i, k - i);
                    if up > 0.0 {
                        qmt += up * right * terms.weight(i, j, k, j, Decomposition::MultiExtend5);
                    }
                }
                m.qm[(i, j)] = qmt;

                check(qbt, i, j, &mut warned)?;
                check(qm1t, i, j, &mut warned)?;
                check(qmt, i, j, &mut warned)?;
            }

            // Exterior segments whose first nucleotide i is paired.
            let mut qqt = m.qb[(i, j)] * terms.ext_stem(i, j) + gij;
            let prev = m.qq.get(i, j - 1);
            if prev > 0.0 {
                qqt += prev
                    * terms.ext_unpaired(j, 1)
                    * terms.weight(i, j, j - 1, j, Decomposition::ExteriorExtend);
            }
            m.qq[(i, j)] = qqt;

            let mut qt = qqt;
            let up = terms.ext_unpaired(i, j - i + 1);
            if up > 0.0 {
                qt += up * terms.weight(i, j, i, j, Decomposition::ExteriorExtend);
            }
            for k in i..j {
                let stem = m.qq[(k + 1, j)];
                if stem > 0.0 {
                    qt += m.q[(i, k)] * stem * terms.weight(i, j, k, k + 1, Decomposition::ExteriorConcat);
                }
            }
            m.q[(i, j)] = qt;
            check(qt, i, j, &mut warned)?;
        }
    }

    debug!("Forward recursion done: Q[1,{n}] = {:e}.", m.q(1, n));
    Ok(m)
}
