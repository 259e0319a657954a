//! Limited-memory BFGS for smooth convex objectives.

use std::collections::VecDeque;

use log::debug;
use ndarray::Array1;

const ARMIJO_C1: f64 = 1e-4;
const BACKTRACK_FACTOR: f64 = 0.5;
const MAX_BACKTRACKS: usize = 60;
const CURVATURE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub(crate) struct LbfgsSettings {
    pub memory: usize,
    pub max_iter: usize,
    /// Stop once every gradient component is below this in magnitude
    pub tolerance: f64,
}

impl Default for LbfgsSettings {
    fn default() -> Self {
        Self {
            memory: 10,
            max_iter: 2000,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Minimum {
    pub x: Array1<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

struct Correction {
    s: Array1<f64>,
    y: Array1<f64>,
    rho: f64,
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}

/// Two-loop recursion: approximates `-H⁻¹ g` from the stored corrections.
fn search_direction(gradient: &Array1<f64>, history: &VecDeque<Correction>) -> Array1<f64> {
    let mut q = gradient.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * c.s.dot(&q);
        q.scaled_add(-alpha, &c.y);
        alphas.push(alpha);
    }
    if let Some(last) = history.back() {
        let gamma = last.s.dot(&last.y) / last.y.dot(&last.y);
        q *= gamma;
    }
    for (c, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = c.rho * c.y.dot(&q);
        q.scaled_add(alpha - beta, &c.s);
    }
    -q
}

/// Minimizes `objective`, which returns the value and gradient at a point.
///
/// Never fails: when the iteration budget runs out or the line search
/// stalls, the best point so far is returned with `converged == false`.
pub(crate) fn minimize<F>(objective: F, x0: Array1<f64>, settings: LbfgsSettings) -> Minimum
where
    F: Fn(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut x = x0;
    let (mut value, mut gradient) = objective(&x);
    let mut history: VecDeque<Correction> = VecDeque::with_capacity(settings.memory);

    if max_abs(&gradient) < settings.tolerance {
        return Minimum { x, value, iterations: 0, converged: true };
    }

    for iteration in 1..=settings.max_iter {
        let mut direction = search_direction(&gradient, &history);
        let mut slope = direction.dot(&gradient);
        if !(slope < 0.0) {
            debug!("Resetting L-BFGS memory at iteration {}", iteration);
            history.clear();
            direction = -&gradient;
            slope = direction.dot(&gradient);
        }

        let mut step = if history.is_empty() {
            1.0 / gradient.dot(&gradient).sqrt().max(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let candidate = &x + &(&direction * step);
            let (candidate_value, candidate_gradient) = objective(&candidate);
            if candidate_value.is_finite() && candidate_value <= value + ARMIJO_C1 * step * slope {
                accepted = Some((candidate, candidate_value, candidate_gradient));
                break;
            }
            step *= BACKTRACK_FACTOR;
        }

        let Some((next, next_value, next_gradient)) = accepted else {
            debug!("Line search stalled at iteration {}", iteration);
            return Minimum { x, value, iterations: iteration, converged: false };
        };

        let s = &next - &x;
        let y = &next_gradient - &gradient;
        let sy = s.dot(&y);
        if sy > CURVATURE_EPS {
            if history.len() == settings.memory {
                history.pop_front();
            }
            history.push_back(Correction { s, y, rho: 1.0 / sy });
        }

        let improvement = value - next_value;
        x = next;
        value = next_value;
        gradient = next_gradient;

        if max_abs(&gradient) < settings.tolerance {
            return Minimum { x, value, iterations: iteration, converged: true };
        }
        if improvement.abs() <= f64::EPSILON * value.abs().max(1.0) {
            debug!("Objective stopped decreasing at iteration {}", iteration);
            return Minimum { x, value, iterations: iteration, converged: true };
        }
    }

    Minimum { x, value, iterations: settings.max_iter, converged: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_quadratic() {
        // f(x) = (x0 - 3)^2 + 10 (x1 + 1)^2
        let objective = |x: &Array1<f64>| {
            let value = (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2);
            let gradient = array![2.0 * (x[0] - 3.0), 20.0 * (x[1] + 1.0)];
            (value, gradient)
        };
        let result = minimize(objective, array![0.0, 0.0], LbfgsSettings::default());
        assert!(result.converged);
        assert!((result.x[0] - 3.0).abs() < 1e-4);
        assert!((result.x[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_rosenbrock() {
        let objective = |x: &Array1<f64>| {
            let (a, b) = (x[0], x[1]);
            let value = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
            let gradient = array![
                -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
                200.0 * (b - a * a)
            ];
            (value, gradient)
        };
        let settings = LbfgsSettings { tolerance: 1e-8, ..LbfgsSettings::default() };
        let result = minimize(objective, array![-1.2, 1.0], settings);
        assert!((result.x[0] - 1.0).abs() < 1e-3);
        assert!((result.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let objective = |x: &Array1<f64>| {
            let value = (x[0] - 3.0).powi(2);
            (value, array![2.0 * (x[0] - 3.0)])
        };
        let settings = LbfgsSettings { max_iter: 1, tolerance: 1e-12, ..LbfgsSettings::default() };
        let result = minimize(objective, array![100.0], settings);
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
    }
}
