//! Numerical optimization
//! Unconstrained derivative-based minimization used by the out-of-sample projector
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod conjugate_gradient;
pub mod line_search;

pub use self::conjugate_gradient::{ConjugateGradient, Minimum, Objective};
pub use self::line_search::{bracket_minimum, brent, Bracket};
