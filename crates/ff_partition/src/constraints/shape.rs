//! Soft constraints from SHAPE reactivity data.
//!
//! Reactivities are given for positions 1..=n, negative values mark
//! missing data.

use std::str::FromStr;

use crate::PfError;
use super::SoftConstraints;

/// Conversion of SHAPE reactivities into probabilities of being unpaired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeConversion {
    /// Reactivities already are probabilities.
    Skip,
    /// Piecewise linear map onto [0, 1].
    Map,
    /// 0 below the cutoff, 1 otherwise.
    Cutoff(f64),
    /// `(v - intercept) / slope`, clamped to [0, 1].
    Linear { slope: f64, intercept: f64 },
    /// `(ln v - intercept) / slope`, clamped to [0, 1].
    Logarithmic { slope: f64, intercept: f64 },
}

impl Default for ShapeConversion {
    fn default() -> Self {
        ShapeConversion::Logarithmic { slope: 1.6, intercept: -2.29 }
    }
}

impl ShapeConversion {
    /// Converts reactivities in place. Missing data (negative values)
    /// is replaced by `default_value`.
    pub fn apply(&self, values: &mut [f64], default_value: f64) {
        let mut measured = Vec::with_capacity(values.len());
        for (idx, v) in values.iter_mut().enumerate() {
            if *v < 0.0 {
                *v = default_value;
            } else {
                measured.push(idx);
            }
        }

        match *self {
            ShapeConversion::Skip => {}
            ShapeConversion::Map => {
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let knots = [(0.25, 0.35), (0.30, 0.55), (0.70, 0.85), (max, 1.0)];
                for &idx in &measured {
                    let v = values[idx];
                    if v == 0.0 {
                        continue;
                    }
                    let (mut lo_s, mut lo_t) = (0.0, 0.0);
                    for &(s, t) in &knots {
                        if v > lo_s && v <= s {
                            values[idx] = (v - lo_s) / (s - lo_s) * (t - lo_t) + lo_t;
                            break;
                        }
                        (lo_s, lo_t) = (s, t);
                    }
                }
            }
            ShapeConversion::Cutoff(cutoff) => {
                for &idx in &measured {
                    values[idx] = if values[idx] < cutoff { 0.0 } else { 1.0 };
                }
            }
            ShapeConversion::Linear { slope, intercept } => {
                for &idx in &measured {
                    values[idx] = ((values[idx] - intercept) / slope).clamp(0.0, 1.0);
                }
            }
            ShapeConversion::Logarithmic { slope, intercept } => {
                for &idx in &measured {
                    values[idx] = ((values[idx].ln() - intercept) / slope).clamp(0.0, 1.0);
                }
            }
        }
    }
}

fn parse_param(s: &str, key: char) -> Option<f64> {
    let start = s.find(key)? + 1;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == 'e'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Parses the compact notation `S`, `M`, `C[cutoff]`,
/// `L[s<slope>][i<intercept>]` and `O[s<slope>][i<intercept>]`.
impl FromStr for ShapeConversion {
    type Err = PfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let Some(head) = chars.next() else {
            return Err(PfError::InvalidShapeConversion(s.to_string()));
        };
        let rest = chars.as_str();
        match head {
            'S' => Ok(ShapeConversion::Skip),
            'M' => Ok(ShapeConversion::Map),
            'C' => {
                let cutoff = if rest.is_empty() {
                    0.25
                } else {
                    rest.parse().map_err(|_| PfError::InvalidShapeConversion(s.to_string()))?
                };
                Ok(ShapeConversion::Cutoff(cutoff))
            }
            'L' => Ok(ShapeConversion::Linear {
                slope: parse_param(rest, 's').unwrap_or(0.68),
                intercept: parse_param(rest, 'i').unwrap_or(0.2),
            }),
            'O' => Ok(ShapeConversion::Logarithmic {
                slope: parse_param(rest, 's').unwrap_or(1.6),
                intercept: parse_param(rest, 'i').unwrap_or(-2.29),
            }),
            _ => Err(PfError::InvalidShapeConversion(s.to_string())),
        }
    }
}

impl SoftConstraints {
    /// Deigan et al. (2009): stacking pseudo-energies
    /// `m ln(r + 1) + b` per nucleotide (0 for missing data).
    pub fn from_shape_deigan(reactivities: &[f64], m: f64, b: f64) -> Result<Self, PfError> {
        let mut sc = SoftConstraints::new(reactivities.len());
        let energies: Vec<f64> = reactivities
            .iter()
            .map(|&r| if r < 0.0 { 0.0 } else { m * (r + 1.0).ln() + b })
            .collect();
        sc.set_stack(&energies)?;
        Ok(sc)
    }

    /// Zarringhalam et al. (2012): reactivities are converted into
    /// probabilities p of being unpaired, then unpaired nucleotides get
    /// `b |p - 1|` and pairs (i,j) get `b (p_i + p_j)`.
    pub fn from_shape_zarringhalam(
        reactivities: &[f64],
        b: f64,
        default_value: f64,
        conversion: ShapeConversion,
    ) -> Result<Self, PfError> {
        let n = reactivities.len();
        let mut pr = reactivities.to_vec();
        conversion.apply(&mut pr, default_value);

        let mut sc = SoftConstraints::new(n);
        let up: Vec<f64> = pr.iter().map(|p| b * (p - 1.0).abs()).collect();
        sc.set_unpaired(&up)?;
        for i in 1..=n {
            for j in i + 1..=n {
                sc.add_pair(i, j, b * (pr[i - 1] + pr[j - 1]))?;
            }
        }
        Ok(sc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_conversion() {
        assert_eq!("S".parse::<ShapeConversion>().unwrap(), ShapeConversion::Skip);
        assert_eq!("C".parse::<ShapeConversion>().unwrap(), ShapeConversion::Cutoff(0.25));
        assert_eq!("C0.4".parse::<ShapeConversion>().unwrap(), ShapeConversion::Cutoff(0.4));
        assert_eq!(
            "Ls0.5i0.1".parse::<ShapeConversion>().unwrap(),
            ShapeConversion::Linear { slope: 0.5, intercept: 0.1 }
        );
        assert_eq!(
            "O".parse::<ShapeConversion>().unwrap(),
            ShapeConversion::Logarithmic { slope: 1.6, intercept: -2.29 }
        );
        assert_eq!(ShapeConversion::default(), "O".parse().unwrap());
        assert!("X".parse::<ShapeConversion>().is_err());
        assert!("".parse::<ShapeConversion>().is_err());
    }

    #[test]
    fn test_apply_conversions() {
        let mut v = vec![0.1, -1.0, 0.5, 2.0];
        ShapeConversion::Cutoff(0.25).apply(&mut v, 0.5);
        assert_eq!(v, vec![0.0, 0.5, 1.0, 1.0]);

        let mut v = vec![0.2, 0.88, 2.0];
        ShapeConversion::Linear { slope: 0.68, intercept: 0.2 }.apply(&mut v, 0.5);
        assert_relative_eq!(v[0], 0.0);
        assert_relative_eq!(v[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[2], 1.0);

        let mut v = vec![0.0, 0.25, 0.5, 1.0];
        ShapeConversion::Map.apply(&mut v, 0.5);
        assert_relative_eq!(v[0], 0.0);
        assert_relative_eq!(v[1], 0.35, epsilon = 1e-12);
        assert_relative_eq!(v[2], 0.55 + 0.2 / 0.4 * 0.3, epsilon = 1e-12);
        assert_relative_eq!(v[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deigan() {
        let sc = SoftConstraints::from_shape_deigan(&[0.0, -999.0, 1.0], 1.8, -0.6).unwrap();
        let exp = sc.exponentiate(1000.0);
        let f = |e: f64| (-e).exp();
        assert_relative_eq!(
            exp.stack(1, 3, 2, 2),
            f(-0.6) * f(0.0) * f(0.0) * f(1.8 * 2f64.ln() - 0.6),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_zarringhalam() {
        let sc = SoftConstraints::from_shape_zarringhalam(&[0.0, 1.0], 0.89, 0.5, ShapeConversion::Skip).unwrap();
        let exp = sc.exponentiate(1000.0);
        assert_relative_eq!(exp.unpaired(1, 1), (-0.89f64).exp(), max_relative = 1e-12);
        assert_relative_eq!(exp.unpaired(2, 1), 1.0);
        assert_relative_eq!(exp.pair(1, 2), (-0.89f64).exp(), max_relative = 1e-12);
    }
}
