//! Conjugate-gradient minimization
//!
//! Polak–Ribière nonlinear conjugate gradients with an exact-ish line
//! minimization (bracketing + Brent) along each search direction. The
//! objective supplies its value and gradient at arbitrary points.
//!
//! The minimizer never fails: if neither the gradient norm nor the change in
//! function value falls below the tolerance within the iteration budget, the
//! best point reached is returned with `converged == false`.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use log::{trace, warn};
use nalgebra::DVector;

use crate::optimization::line_search::{bracket_minimum, brent};

const EPS: f64 = 1.0e-10;

/// Differentiable scalar objective
pub trait Objective {
    /// Value at `point`; the gradient is written into `gradient`
    fn evaluate(&self, point: &DVector<f64>, gradient: &mut DVector<f64>) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&DVector<f64>, &mut DVector<f64>) -> f64,
{
    fn evaluate(&self, point: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
        self(point, gradient)
    }
}

/// Result of a minimization
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Conjugate-gradient minimizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConjugateGradient {
    /// Stop when the gradient norm, or the relative change of the function
    /// between iterations, drops below this value
    pub tolerance: f64,

    pub max_iterations: usize,

    /// Fractional precision of each line minimization
    pub line_tolerance: f64,

    pub max_line_iterations: usize,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-6,
            max_iterations: 200,
            line_tolerance: 1.0e-6,
            max_line_iterations: 100,
        }
    }
}

impl ConjugateGradient {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }

    pub fn minimise<O>(&self, objective: &O, start: DVector<f64>) -> Minimum
    where
        O: Objective + ?Sized,
    {
        let n = start.len();
        let mut point = start;
        let mut gradient = DVector::zeros(n);
        let mut fp = objective.evaluate(&point, &mut gradient);

        if gradient.norm() <= self.tolerance {
            return Minimum {
                point,
                value: fp,
                iterations: 0,
                converged: true,
            };
        }

        let mut g = -&gradient;
        let mut h = g.clone();
        let mut direction = g.clone();

        for iteration in 1..=self.max_iterations {
            let fret = self.line_minimise(objective, &mut point, &mut direction);
            trace!("CG iteration {}: f = {:e}", iteration, fret);

            if 2.0 * (fret - fp).abs() <= self.tolerance * (fret.abs() + fp.abs() + EPS) {
                return Minimum {
                    point,
                    value: fret,
                    iterations: iteration,
                    converged: true,
                };
            }

            fp = objective.evaluate(&point, &mut gradient);
            if gradient.norm() <= self.tolerance {
                return Minimum {
                    point,
                    value: fp,
                    iterations: iteration,
                    converged: true,
                };
            }

            let gg = g.dot(&g);
            if gg == 0.0 {
                return Minimum {
                    point,
                    value: fp,
                    iterations: iteration,
                    converged: true,
                };
            }
            // Polak-Ribiere
            let dgg = (&gradient + &g).dot(&gradient);
            let gamma = dgg / gg;

            g = -&gradient;
            h = &g + h * gamma;
            direction.copy_from(&h);
        }

        warn!(
            "Conjugate gradient did not converge in {} iterations",
            self.max_iterations
        );
        let value = objective.evaluate(&point, &mut gradient);
        Minimum {
            point,
            value,
            iterations: self.max_iterations,
            converged: false,
        }
    }

    /// Move `point` to the minimum along `direction` and rescale `direction`
    /// to the step actually taken. Returns the function value at the new point.
    fn line_minimise<O>(
        &self,
        objective: &O,
        point: &mut DVector<f64>,
        direction: &mut DVector<f64>,
    ) -> f64
    where
        O: Objective + ?Sized,
    {
        let origin = point.clone();
        let search: &DVector<f64> = direction;
        let mut scratch_point = origin.clone();
        let mut scratch_gradient = DVector::zeros(origin.len());
        let mut along = |alpha: f64| {
            scratch_point.copy_from(&origin);
            scratch_point.axpy(alpha, search, 1.0);
            objective.evaluate(&scratch_point, &mut scratch_gradient)
        };

        let bracket = bracket_minimum(&mut along, 0.0, 1.0, self.max_line_iterations);
        let (alpha, value) = brent(&mut along, &bracket, self.line_tolerance, self.max_line_iterations);

        *direction *= alpha;
        *point += &*direction;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn quadratic(p: &DVector<f64>, g: &mut DVector<f64>) -> f64 {
        // f = (x-1)^2 + 10 (y+2)^2 + (x-1)(y+2)
        let (x, y) = (p[0] - 1.0, p[1] + 2.0);
        g[0] = 2.0 * x + y;
        g[1] = 20.0 * y + x;
        x * x + 10.0 * y * y + x * y
    }

    fn rosenbrock(p: &DVector<f64>, g: &mut DVector<f64>) -> f64 {
        let (x, y) = (p[0], p[1]);
        g[0] = -2.0 * (1.0 - x) - 400.0 * x * (y - x * x);
        g[1] = 200.0 * (y - x * x);
        (1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2)
    }

    #[test]
    fn test_quadratic_minimum() {
        let cg = ConjugateGradient::new(1e-10);
        let result = cg.minimise(&quadratic, DVector::from_vec(vec![5.0, 5.0]));
        assert!(result.converged);
        assert_abs_diff_eq!(result.point[0], 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(result.point[1], -2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rosenbrock_minimum() {
        let cg = ConjugateGradient::new(1e-12);
        let result = cg.minimise(&rosenbrock, DVector::from_vec(vec![-1.2, 1.0]));
        assert_abs_diff_eq!(result.point[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.point[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_start_at_minimum_returns_immediately() {
        let cg = ConjugateGradient::default();
        let result = cg.minimise(&quadratic, DVector::from_vec(vec![1.0, -2.0]));
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_iteration_budget_returns_best_point() {
        let cg = ConjugateGradient {
            tolerance: 1e-14,
            max_iterations: 2,
            ..ConjugateGradient::default()
        };
        let start = DVector::from_vec(vec![-1.2, 1.0]);
        let mut scratch = DVector::zeros(2);
        let f0 = rosenbrock(&start, &mut scratch);

        let result = cg.minimise(&rosenbrock, start);
        assert!(!result.converged);
        assert_eq!(result.iterations, 2);
        assert!(result.value < f0);
    }
}
