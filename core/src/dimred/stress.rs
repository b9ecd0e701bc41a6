//! Stress of a point placed in a landmark embedding
//!
//! ```text
//! stress(p) = Σ_i (|p - L_i| - t_i)^2
//! ```
//!
//! where `L_i` are the projected landmarks and `t_i` the measured
//! dissimilarities of the point being placed. Terms with `|p - L_i| = 0`
//! contribute no gradient.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use nalgebra::{DMatrix, DVector};

use crate::optimization::Objective;

pub struct StressFunction<'a> {
    /// One landmark projection per row
    landmarks: &'a DMatrix<f64>,
    targets: &'a [f64],
}

impl<'a> StressFunction<'a> {
    pub fn new(landmarks: &'a DMatrix<f64>, targets: &'a [f64]) -> Self {
        debug_assert_eq!(landmarks.nrows(), targets.len());
        Self { landmarks, targets }
    }
}

impl Objective for StressFunction<'_> {
    fn evaluate(&self, point: &DVector<f64>, gradient: &mut DVector<f64>) -> f64 {
        gradient.fill(0.0);
        let mut stress = 0.0;
        let mut delta = DVector::zeros(point.len());

        for (i, &target) in self.targets.iter().enumerate() {
            for k in 0..point.len() {
                delta[k] = point[k] - self.landmarks[(i, k)];
            }
            let distance = delta.norm();
            let mismatch = distance - target;
            stress += mismatch * mismatch;

            if distance > 0.0 {
                gradient.axpy(2.0 * mismatch / distance, &delta, 1.0);
            }
        }
        stress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn test_zero_stress_at_exact_placement() {
        let landmarks = triangle();
        let p = DVector::from_vec(vec![0.25, 0.5]);
        let targets: Vec<f64> = (0..3)
            .map(|i| ((p[0] - landmarks[(i, 0)]).powi(2) + (p[1] - landmarks[(i, 1)]).powi(2)).sqrt())
            .collect();
        let stress = StressFunction::new(&landmarks, &targets);
        let mut gradient = DVector::zeros(2);
        assert_relative_eq!(stress.evaluate(&p, &mut gradient), 0.0, epsilon = 1e-14);
        assert_relative_eq!(gradient.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let landmarks = triangle();
        let targets = [0.7, 1.1, 0.4];
        let stress = StressFunction::new(&landmarks, &targets);

        let p = DVector::from_vec(vec![0.3, -0.2]);
        let mut gradient = DVector::zeros(2);
        stress.evaluate(&p, &mut gradient);

        let h = 1e-6;
        let mut scratch = DVector::zeros(2);
        for k in 0..2 {
            let mut forward = p.clone();
            let mut backward = p.clone();
            forward[k] += h;
            backward[k] -= h;
            let numeric = (stress.evaluate(&forward, &mut scratch)
                - stress.evaluate(&backward, &mut scratch))
                / (2.0 * h);
            assert_relative_eq!(gradient[k], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_point_on_landmark_has_finite_gradient() {
        let landmarks = triangle();
        let targets = [0.5, 0.5, 0.5];
        let stress = StressFunction::new(&landmarks, &targets);
        let mut gradient = DVector::zeros(2);
        let value = stress.evaluate(&DVector::from_vec(vec![0.0, 0.0]), &mut gradient);
        assert!(value.is_finite());
        assert!(gradient.iter().all(|g| g.is_finite()));
    }
}
