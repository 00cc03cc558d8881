// src/forecast/optimize.rs

//! Derivative-free minimisation (Nelder-Mead simplex).
//!
//! The likelihood surfaces we minimise are cheap to evaluate but have no
//! convenient gradient, and can run off towards a boundary, so the search is
//! capped by iterations and restarted from its best vertex until it stops
//! improving.

/// Result of a minimisation run.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct NelderMead {
    pub max_iter: usize,
    pub f_tol: f64,
    pub x_tol: f64,
    pub initial_step: f64,
    pub restarts: usize,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iter: 2_000,
            f_tol: 1e-10,
            x_tol: 1e-8,
            initial_step: 0.5,
            restarts: 4,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl NelderMead {
    /// Minimise `f` from `start`, restarting from the best vertex until a
    /// restart no longer improves the value. NaN evaluations count as +inf.
    pub fn minimize<F>(&self, f: F, start: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let eval = |x: &[f64]| {
            let v = f(x);
            if v.is_nan() {
                f64::INFINITY
            } else {
                v
            }
        };

        let mut best = self.run(&eval, start);
        for _ in 0..self.restarts {
            let next = self.run(&eval, &best.x);
            let improved = next.value < best.value - self.f_tol * (1.0 + best.value.abs());
            let iterations = best.iterations + next.iterations;
            if next.value <= best.value {
                best = Minimum { iterations, ..next };
            } else {
                best.iterations = iterations;
            }
            if !improved {
                break;
            }
        }
        best
    }

    fn run<F>(&self, eval: &F, start: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = start.len();
        if n == 0 {
            return Minimum {
                x: Vec::new(),
                value: eval(start),
                iterations: 0,
                converged: true,
            };
        }

        // 1) initial simplex: start plus one step along each axis
        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((start.to_vec(), eval(start)));
        for i in 0..n {
            let mut x = start.to_vec();
            let step = if start[i].abs() > 1e-8 {
                self.initial_step * start[i].abs().max(1.0)
            } else {
                self.initial_step
            };
            x[i] += step;
            let v = eval(&x);
            simplex.push((x, v));
        }

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iter {
            iterations += 1;
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

            // 2) convergence: values and vertices both collapsed onto the best
            let f_best = simplex[0].1;
            let f_worst = simplex[n].1;
            let spread = (f_worst - f_best).abs();
            let size = simplex[1..]
                .iter()
                .flat_map(|(x, _)| x.iter().zip(&simplex[0].0).map(|(a, b)| (a - b).abs()))
                .fold(0.0, f64::max);
            if f_best.is_finite()
                && spread <= self.f_tol * (1.0 + f_best.abs())
                && size <= self.x_tol
            {
                converged = true;
                break;
            }

            // 3) centroid of every vertex but the worst
            let mut centroid = vec![0.0; n];
            for (x, _) in &simplex[..n] {
                for (c, xi) in centroid.iter_mut().zip(x) {
                    *c += xi / n as f64;
                }
            }
            let towards = |coef: f64, from: &[f64]| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(from)
                    .map(|(c, x)| c + coef * (x - c))
                    .collect()
            };

            let worst = simplex[n].0.clone();
            let reflected = towards(-REFLECT, &worst);
            let f_reflected = eval(&reflected);

            if f_reflected < f_best {
                let expanded = towards(-REFLECT * EXPAND, &worst);
                let f_expanded = eval(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }
            if f_reflected < simplex[n - 1].1 {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            // 4) contraction, outside or inside depending on the reflection
            let (contracted, f_contracted, accept) = if f_reflected < f_worst {
                let x = towards(-REFLECT * CONTRACT, &worst);
                let v = eval(&x);
                (x, v, v <= f_reflected)
            } else {
                let x = towards(CONTRACT, &worst);
                let v = eval(&x);
                (x, v, v < f_worst)
            };
            if accept {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            // 5) shrink every vertex towards the best
            let anchor = simplex[0].0.clone();
            for (x, v) in simplex.iter_mut().skip(1) {
                for (xi, bi) in x.iter_mut().zip(&anchor) {
                    *xi = bi + SHRINK * (*xi - bi);
                }
                *v = eval(x.as_slice());
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (x, value) = simplex.swap_remove(0);
        Minimum {
            x,
            value,
            iterations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let nm = NelderMead::default();
        let min = nm.minimize(
            |x| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
        );
        assert!(min.converged);
        assert!((min.x[0] - 3.0).abs() < 1e-4);
        assert!((min.x[1] + 1.0).abs() < 1e-4);
        assert!(min.value < 1e-8);
    }

    #[test]
    fn test_rosenbrock() {
        let nm = NelderMead {
            max_iter: 10_000,
            ..NelderMead::default()
        };
        let min = nm.minimize(
            |x| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2),
            &[-1.2, 1.0],
        );
        assert!((min.x[0] - 1.0).abs() < 1e-3, "x = {:?}", min.x);
        assert!((min.x[1] - 1.0).abs() < 1e-3, "x = {:?}", min.x);
    }

    #[test]
    fn test_nan_region_is_avoided() {
        let nm = NelderMead::default();
        let min = nm.minimize(
            |x| {
                if x[0] < 0.0 {
                    f64::NAN
                } else {
                    (x[0] - 0.5).powi(2)
                }
            },
            &[2.0],
        );
        assert!((min.x[0] - 0.5).abs() < 1e-4);
    }
}
