//! printf-style numeric formats for analysis output
//!
//! Analysis output files are configured with C-style conversion strings such
//! as `%f`, `%8.4f` or `%12.6e`. This module parses them once at setup and
//! renders values accordingly.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::fmt;
use std::str::FromStr;

use crate::temporal::checkpoint::CheckpointError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatStyle {
    Fixed,
    Exponent,
    General,
}

/// Parsed numeric conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    width: usize,
    precision: Option<usize>,
    left_align: bool,
    style: FormatStyle,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            width: 0,
            precision: None,
            left_align: false,
            style: FormatStyle::Fixed,
        }
    }
}

impl NumberFormat {
    pub fn format(&self, value: f64) -> String {
        let body = match (self.style, self.precision) {
            (FormatStyle::Fixed, p) => format!("{:.*}", p.unwrap_or(6), value),
            (FormatStyle::Exponent, p) => format!("{:.*e}", p.unwrap_or(6), value),
            (FormatStyle::General, Some(p)) => {
                let magnitude = value.abs();
                if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
                    format!("{:.*e}", p.saturating_sub(1), value)
                } else {
                    format!("{}", value)
                }
            }
            (FormatStyle::General, None) => format!("{}", value),
        };

        if self.left_align {
            format!("{:<width$}", body, width = self.width)
        } else {
            format!("{:>width$}", body, width = self.width)
        }
    }
}

impl FromStr for NumberFormat {
    type Err = CheckpointError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || CheckpointError::InvalidFormat(spec.to_owned());

        let body = spec.trim().strip_prefix('%').ok_or_else(invalid)?;
        let (body, left_align) = match body.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (body, false),
        };

        let conversion = body.chars().last().ok_or_else(invalid)?;
        let style = match conversion {
            'f' | 'F' => FormatStyle::Fixed,
            'e' | 'E' => FormatStyle::Exponent,
            'g' | 'G' => FormatStyle::General,
            _ => return Err(invalid()),
        };

        let numbers = &body[..body.len() - conversion.len_utf8()];
        let (width, precision) = match numbers.split_once('.') {
            Some((w, p)) => (w, Some(p)),
            None => (numbers, None),
        };
        let width = if width.is_empty() {
            0
        } else {
            width.parse().map_err(|_| invalid())?
        };
        let precision = match precision {
            Some(p) => Some(p.parse().map_err(|_| invalid())?),
            None => None,
        };

        Ok(Self {
            width,
            precision,
            left_align,
            style,
        })
    }
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%")?;
        if self.left_align {
            write!(f, "-")?;
        }
        if self.width > 0 {
            write!(f, "{}", self.width)?;
        }
        if let Some(p) = self.precision {
            write!(f, ".{}", p)?;
        }
        let c = match self.style {
            FormatStyle::Fixed => 'f',
            FormatStyle::Exponent => 'e',
            FormatStyle::General => 'g',
        };
        write!(f, "{}", c)
    }
}
