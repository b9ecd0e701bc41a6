//! Argument domains
//!
//! Collective variables such as torsions live on a circle. Differences between
//! two values of such an argument must be wrapped into the domain before a
//! metric can use them.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use serde::{Deserialize, Serialize};

/// Domain of a single scalar argument
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Periodicity {
    /// Values live on the real line
    #[default]
    NonPeriodic,

    /// Values live on `[min, max)` with `min` identified with `max`
    Periodic { min: f64, max: f64 },
}

impl Periodicity {
    pub fn is_periodic(&self) -> bool {
        matches!(self, Periodicity::Periodic { .. })
    }

    /// Domain bounds, `None` for non-periodic arguments
    pub fn domain(&self) -> Option<(f64, f64)> {
        match *self {
            Periodicity::NonPeriodic => None,
            Periodicity::Periodic { min, max } => Some((min, max)),
        }
    }

    /// Signed difference `to - from`, wrapped to the nearest image for
    /// periodic arguments
    #[inline]
    pub fn difference(&self, from: f64, to: f64) -> f64 {
        let delta = to - from;
        match *self {
            Periodicity::NonPeriodic => delta,
            Periodicity::Periodic { min, max } => {
                let period = max - min;
                delta - period * (delta / period).round()
            }
        }
    }
}

/// Name and domain of one argument tracked by an accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,

    #[serde(default)]
    pub periodicity: Periodicity,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            periodicity: Periodicity::NonPeriodic,
        }
    }

    pub fn periodic(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            periodicity: Periodicity::Periodic { min, max },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_non_periodic_difference_is_plain_subtraction() {
        let p = Periodicity::NonPeriodic;
        assert_eq!(p.difference(1.0, 4.5), 3.5);
        assert!(!p.is_periodic());
        assert!(p.domain().is_none());
    }

    #[test]
    fn test_periodic_difference_wraps_to_nearest_image() {
        let p = Periodicity::Periodic { min: -PI, max: PI };
        assert_abs_diff_eq!(p.difference(PI - 0.1, -PI + 0.1), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(p.difference(-PI + 0.1, PI - 0.1), -0.2, epsilon = 1e-12);
        assert_eq!(p.domain(), Some((-PI, PI)));
    }

    #[test]
    fn test_argument_spec_deserializes_with_default_domain() {
        let spec: ArgumentSpec = serde_json::from_str(r#"{"name":"d1"}"#).unwrap();
        assert_eq!(spec, ArgumentSpec::new("d1"));

        let spec: ArgumentSpec = serde_json::from_str(
            r#"{"name":"phi","periodicity":{"kind":"periodic","min":-3.0,"max":3.0}}"#,
        )
        .unwrap();
        assert_eq!(spec, ArgumentSpec::periodic("phi", -3.0, 3.0));
    }
}
