// src/forecast/arima.rs

//! ARIMA(p, d, q) fitted by exact Gaussian maximum likelihood.
//!
//! The differenced series is treated as a zero-mean ARMA(p, q) process in
//! state-space form with state dimension `r = max(p, q + 1)`:
//!
//! ```text
//! w_t       = Z a_t                    Z = [1 0 .. 0]
//! a_{t+1}   = T a_t + R e_{t+1}        T = [phi | I ; 0], R = [1 theta_1 .. theta_q 0 ..]'
//! ```
//!
//! The Kalman filter gives the prediction-error decomposition of the
//! likelihood with the innovation variance concentrated out. Coefficients are
//! searched in an unconstrained space mapped through partial
//! autocorrelations, so every candidate is stationary (AR) and invertible (MA).

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::{ForecastError, Result};
use crate::forecast::optimize::NelderMead;

/// Smallest innovation variance we take the log of.
const MIN_SIGMA2: f64 = 1e-300;

/// Partial autocorrelations stay strictly inside the unit interval so the
/// stationary covariance solve never sees an exact unit root.
const MAX_PARTIAL: f64 = 1.0 - 1e-6;

#[derive(Debug, Clone)]
pub struct Arima {
    p: usize,
    d: usize,
    q: usize,
    ar_coeffs: Vec<f64>,
    ma_coeffs: Vec<f64>,
    log_likelihood: f64,
    /// Last value of each differencing level `0..d`, for integrating forecasts back.
    level_tails: Vec<f64>,
    /// One-step-ahead predicted state after the last observation.
    next_state: DVector<f64>,
    fitted: bool,
}

impl Arima {
    /// Create an unfitted model. `p` and `q` are capped at 10, `d` at 2.
    pub fn new(p: usize, d: usize, q: usize) -> Result<Self> {
        if p > 10 {
            return Err(ForecastError::Model("AR order must be <= 10".to_string()));
        }
        if d > 2 {
            return Err(ForecastError::Model(
                "differencing order must be <= 2".to_string(),
            ));
        }
        if q > 10 {
            return Err(ForecastError::Model("MA order must be <= 10".to_string()));
        }

        Ok(Self {
            p,
            d,
            q,
            ar_coeffs: vec![0.0; p],
            ma_coeffs: vec![0.0; q],
            log_likelihood: f64::NAN,
            level_tails: Vec::new(),
            next_state: DVector::zeros(state_dim(p, q)),
            fitted: false,
        })
    }

    pub fn min_observations(&self) -> usize {
        self.p + self.d + self.q + 1
    }

    pub fn fit(&mut self, data: &[f64]) -> Result<()> {
        let required = self.min_observations();
        if data.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ForecastError::Model(
                "series contains NaN or infinite values".to_string(),
            ));
        }

        let (diffed, tails) = difference(data, self.d);
        let (p, q) = (self.p, self.q);

        let objective = |x: &[f64]| {
            let (phi, theta) = constrain(x, p);
            match kalman_filter(&diffed, &phi, &theta) {
                Some(out) => -out.log_likelihood,
                None => f64::INFINITY,
            }
        };

        // zero coefficients, plus a persistent-AR start when there is an AR part
        let mut starts = vec![vec![0.0; p + q]];
        if p > 0 {
            let mut persistent = vec![0.0; p + q];
            persistent[0] = 1.0;
            starts.push(persistent);
        }

        let optimizer = NelderMead::default();
        let best = starts
            .iter()
            .map(|s| optimizer.minimize(&objective, s))
            .min_by(|a, b| a.value.total_cmp(&b.value))
            .ok_or_else(|| ForecastError::Model("no starting point".to_string()))?;

        if !best.value.is_finite() {
            return Err(ForecastError::Model(
                "maximum likelihood estimation did not converge".to_string(),
            ));
        }
        if !best.converged {
            warn!(
                iterations = best.iterations,
                "likelihood search hit its iteration cap; using best point found"
            );
        }

        let (phi, theta) = constrain(&best.x, p);
        let out = kalman_filter(&diffed, &phi, &theta).ok_or_else(|| {
            ForecastError::Model("maximum likelihood estimation did not converge".to_string())
        })?;

        debug!(
            ar = ?phi,
            ma = ?theta,
            sigma2 = out.sigma2,
            log_likelihood = out.log_likelihood,
            iterations = best.iterations,
            "fitted ARIMA({},{},{})",
            self.p,
            self.d,
            self.q
        );

        self.ar_coeffs = phi;
        self.ma_coeffs = theta;
        self.log_likelihood = out.log_likelihood;
        self.level_tails = tails;
        self.next_state = out.next_state;
        self.fitted = true;
        Ok(())
    }

    /// Point forecasts for the next `steps` periods, on the original scale.
    pub fn predict(&self, steps: usize) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(ForecastError::Model("model has not been fitted".to_string()));
        }
        if steps == 0 {
            return Ok(Vec::new());
        }

        let (transition, _) = system_matrices(&self.ar_coeffs, &self.ma_coeffs);
        let mut state = self.next_state.clone();
        let mut forecasts = Vec::with_capacity(steps);
        for _ in 0..steps {
            forecasts.push(state[0]);
            state = &transition * state;
        }

        Ok(integrate(&forecasts, &self.level_tails))
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Akaike information criterion, counting the innovation variance.
    pub fn aic(&self) -> f64 {
        let k = (self.p + self.q + 1) as f64;
        -2.0 * self.log_likelihood + 2.0 * k
    }
}

fn state_dim(p: usize, q: usize) -> usize {
    p.max(q + 1)
}

/// Difference `data` `order` times. Also returns the last value of every
/// level before it was differenced, outermost first.
pub fn difference(data: &[f64], order: usize) -> (Vec<f64>, Vec<f64>) {
    let mut result = data.to_vec();
    let mut tails = Vec::with_capacity(order);
    for _ in 0..order {
        tails.push(result.last().copied().unwrap_or(0.0));
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    (result, tails)
}

/// Undo [`difference`] for values that continue the differenced series.
pub fn integrate(forecasts: &[f64], tails: &[f64]) -> Vec<f64> {
    let mut result = forecasts.to_vec();
    for &last in tails.iter().rev() {
        let mut level = last;
        for v in result.iter_mut() {
            level += *v;
            *v = level;
        }
    }
    result
}

/// Map partial autocorrelations in (-1, 1) to the coefficients of a
/// stationary AR polynomial (Durbin-Levinson recursion).
fn pacf_to_ar(partials: &[f64]) -> Vec<f64> {
    let mut phi: Vec<f64> = Vec::with_capacity(partials.len());
    for (k, &rk) in partials.iter().enumerate() {
        let prev = phi.clone();
        for j in 0..k {
            phi[j] = prev[j] - rk * prev[k - 1 - j];
        }
        phi.push(rk);
    }
    phi
}

/// Unconstrained search vector → (stationary AR, invertible MA) coefficients.
fn constrain(x: &[f64], p: usize) -> (Vec<f64>, Vec<f64>) {
    let squash = |v: &f64| (v / (1.0 + v * v).sqrt()).clamp(-MAX_PARTIAL, MAX_PARTIAL);
    let ar_partials: Vec<f64> = x[..p].iter().map(squash).collect();
    let ma_partials: Vec<f64> = x[p..].iter().map(squash).collect();
    let phi = pacf_to_ar(&ar_partials);
    let theta = pacf_to_ar(&ma_partials).into_iter().map(|c| -c).collect();
    (phi, theta)
}

fn system_matrices(phi: &[f64], theta: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
    let r = state_dim(phi.len(), theta.len());
    let mut transition = DMatrix::zeros(r, r);
    for (i, &c) in phi.iter().enumerate() {
        transition[(i, 0)] = c;
    }
    for i in 0..r - 1 {
        transition[(i, i + 1)] = 1.0;
    }

    let mut selection = DVector::zeros(r);
    selection[0] = 1.0;
    for (i, &c) in theta.iter().enumerate() {
        selection[i + 1] = c;
    }
    (transition, selection)
}

/// Unconditional state covariance (unit innovation variance):
/// solves `P = T P T' + R R'` through `vec(P) = (I - T⊗T)^-1 vec(R R')`.
fn stationary_covariance(transition: &DMatrix<f64>, rr: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let r = transition.nrows();
    let system = DMatrix::<f64>::identity(r * r, r * r) - transition.kronecker(transition);
    let rhs = DVector::from_column_slice(rr.as_slice());
    let solution = system.lu().solve(&rhs)?;
    if solution.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(DMatrix::from_column_slice(r, r, solution.as_slice()))
}

#[derive(Debug)]
struct FilterOutput {
    log_likelihood: f64,
    sigma2: f64,
    next_state: DVector<f64>,
}

/// Concentrated exact log-likelihood of zero-mean ARMA data.
fn kalman_filter(data: &[f64], phi: &[f64], theta: &[f64]) -> Option<FilterOutput> {
    let n = data.len();
    let (transition, selection) = system_matrices(phi, theta);
    let rr = &selection * selection.transpose();
    let r = transition.nrows();

    let mut state = DVector::<f64>::zeros(r);
    let mut cov = stationary_covariance(&transition, &rr)?;

    let mut weighted_sq = 0.0;
    let mut log_det = 0.0;
    for &obs in data {
        let f = cov[(0, 0)];
        if !f.is_finite() || f <= 0.0 {
            return None;
        }
        let v = obs - state[0];
        weighted_sq += v * v / f;
        log_det += f.ln();

        let pz = cov.column(0).clone_owned();
        let filtered_state = &state + &pz * (v / f);
        let filtered_cov = &cov - &pz * pz.transpose() / f;

        state = &transition * filtered_state;
        cov = &transition * filtered_cov * transition.transpose() + &rr;
    }

    let sigma2 = weighted_sq / n as f64;
    let log_likelihood = -0.5 * n as f64 * ((2.0 * std::f64::consts::PI).ln() + 1.0)
        - 0.5 * n as f64 * sigma2.max(MIN_SIGMA2).ln()
        - 0.5 * log_det;

    if !log_likelihood.is_finite() {
        return None;
    }

    Some(FilterOutput {
        log_likelihood,
        sigma2,
        next_state: state,
    })
}
