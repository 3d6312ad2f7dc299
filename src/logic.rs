// src/logic.rs
// Trajectory integration. TrajectorySolver advances the state adaptively and lands exactly on
// every point of the uniform output grid, so the caller never sees the internal steps.
// Two steppers share one error controller: the explicit Dormand–Prince 5(4) pair for the
// usual, non-stiff motion, and an L-stable Rosenbrock 2(3) pair (Shampine's modified
// Rosenbrock formula) for stiff stretches such as heavy damping on light bodies. The solver
// watches the explicit pair's stability estimate and switches method and order on its own,
// and returns to the explicit pair once the Jacobian shows it would be stable again.
// deriv computes dy/dt = [q̇, q''] with q'' from the derived equations of motion.
// Every call to `simulate` builds a fresh solver; nothing survives between runs.

use crate::equations::{Dimension, EquationsOfMotion}; // Derived model seam
use crate::error::{ModelError, SimError};
use crate::params::SystemParameters;
use nalgebra::{DMatrix, DVector}; // Rosenbrock linear algebra
use serde::Serialize;
use std::f64::consts::SQRT_2;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Spacing of the output time grid.
pub const GRID_STEP: f64 = 0.01;

/// Internal steps allowed per grid interval before giving up.
pub const DEFAULT_MAX_STEPS: usize = 50_000;

/// Largest number of grid samples a single call may produce.
pub const MAX_SAMPLES: usize = 1_000_000;

/// Smallest step, relative to max(1, |t|), before the solver reports failure.
const MIN_STEP_FACTOR: f64 = 1e-12;

const SAFETY: f64 = 0.9;
const MIN_SCALE: f64 = 0.2;
const MAX_SCALE: f64 = 5.0;

// Stiffness detection on the explicit pair (h·|λ| estimated from the last two stages).
const STIFF_BOUNDARY: f64 = 3.25; // Just inside the DOPRI5 real-axis stability limit
const STIFF_HITS: usize = 15; // Accepted steps past the boundary before switching
const NONSTIFF_RESET: usize = 6; // Clean steps that clear the hit count
const EXPLICIT_BUDGET: usize = 1_000; // Explicit steps in one grid interval before switching anyway

// Return to the explicit pair once its stability limit clears the implicit step repeatedly.
const EXPLICIT_STABILITY: f64 = 3.3;
const EXPLICIT_RETURN: usize = 20;

// Relative perturbation for the finite-difference Jacobian.
const JACOBIAN_STEP: f64 = 1.5e-8;

// Rosenbrock 2(3) coefficients.
const ROS_D: f64 = 1.0 / (2.0 + SQRT_2);
const ROS_E32: f64 = 6.0 + SQRT_2;

// Dormand–Prince 5(4) tableau. Row 6 holds the fifth-order weights.
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[f64; 6]; 7] = [
    [0.0; 6],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0, 0.0],
    [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0, 0.0],
    [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
];
// Fifth-order minus embedded fourth-order weights.
const ERR: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Knobs for one integration call. The defaults reproduce the standard grid and the
/// per-dimension tolerance of the equations object.
#[derive(Debug, Clone)]
pub struct IntegrationOptions {
    pub step: f64,
    /// Overrides both absolute and relative tolerance.
    pub tolerance: Option<f64>,
    pub max_steps: usize,
    pub cancel: Option<Arc<AtomicBool>>,
    pub deadline: Option<Instant>,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            step: GRID_STEP,
            tolerance: None,
            max_steps: DEFAULT_MAX_STEPS,
            cancel: None,
            deadline: None,
        }
    }
}

/// Generalized-coordinate history on the uniform grid plus Cartesian body positions.
///
/// `states[i]` follows the dimension's state layout; `positions[i]` is
/// `[x1, y1, x2, y2]` in the plane or `[x1, y1, z1, x2, y2, z2]` in space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub dimension: Dimension,
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub positions: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Total mechanical energy at every sample.
    pub fn energies<E: EquationsOfMotion + ?Sized>(
        &self,
        equations: &E,
        params: &SystemParameters,
    ) -> Vec<f64> {
        self.states.iter().map(|s| equations.energy(params, s)).collect()
    }
}

/// Number of grid samples for `duration`, the initial sample included. Durations that
/// would need more than [`MAX_SAMPLES`] samples are refused.
pub fn sample_count(duration: f64, step: f64) -> Result<usize, SimError> {
    let intervals = (duration / step).round(); // Whole grid intervals
    if !(intervals.is_finite() && intervals >= 0.0) || intervals >= MAX_SAMPLES as f64 {
        return Err(SimError::MalformedInput(format!(
            "duration {duration} at step {step} needs more than {MAX_SAMPLES} samples"
        )));
    }
    Ok(intervals as usize + 1)
}

/// Uniform grid from 0 to `duration` inclusive with `sample_count` points.
pub fn time_grid(duration: f64, step: f64) -> Result<Vec<f64>, SimError> {
    let n = sample_count(duration, step)?;
    if n == 1 {
        return Ok(vec![0.0]);
    }
    let last = (n - 1) as f64;
    Ok((0..n).map(|k| duration * k as f64 / last).collect()) // Linspace, exact endpoint
}

/// Integrates with default options.
pub fn simulate<E: EquationsOfMotion + ?Sized>(
    params: &SystemParameters,
    initial: &[f64],
    duration: f64,
    equations: &E,
) -> Result<Trajectory, SimError> {
    simulate_with(params, initial, duration, equations, &IntegrationOptions::default())
}

/// Validates the request, integrates on the uniform grid and maps every row to positions.
pub fn simulate_with<E: EquationsOfMotion + ?Sized>(
    params: &SystemParameters,
    initial: &[f64],
    duration: f64,
    equations: &E,
    options: &IntegrationOptions,
) -> Result<Trajectory, SimError> {
    params.validate()?;
    if initial.len() != equations.state_len() {
        return Err(SimError::StateLength {
            expected: equations.state_len(),
            actual: initial.len(),
        });
    }
    if let Some(i) = initial.iter().position(|v| !v.is_finite()) {
        return Err(SimError::MalformedInput(format!(
            "initial condition {i} is not finite"
        )));
    }
    if !duration.is_finite() || duration < 0.0 {
        return Err(SimError::MalformedInput(format!(
            "duration must be finite and non-negative, got {duration}"
        )));
    }
    if !(options.step.is_finite() && options.step > 0.0) {
        return Err(SimError::MalformedInput(format!(
            "grid step must be positive, got {}",
            options.step
        )));
    }
    let tolerance = options.tolerance.unwrap_or_else(|| equations.tolerance());
    if !(tolerance.is_finite() && tolerance > 0.0) {
        return Err(SimError::MalformedInput(format!(
            "tolerance must be positive, got {tolerance}"
        )));
    }

    let times = time_grid(duration, options.step)?; // Bounded before anything is allocated
    let mut solver = TrajectorySolver::new(equations, *params, tolerance, tolerance);
    let states = solver.solve(initial, &times, options)?;
    let positions = equations.positions(params, &states)?;
    debug!(
        dimension = %equations.dimension(),
        samples = times.len(),
        accepted = solver.accepted,
        rejected = solver.rejected,
        stiff_steps = solver.stiff_steps,
        switches = solver.switches,
        "trajectory integrated"
    );
    Ok(Trajectory {
        dimension: equations.dimension(),
        times,
        states,
        positions,
    })
}

/// Which stepper the solver is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Dormand–Prince 5(4), explicit.
    Explicit,
    /// Rosenbrock 2(3), linearly implicit and L-stable.
    Rosenbrock,
}

impl Method {
    /// Exponent of the error-to-step relation for the controller.
    fn error_exponent(self) -> f64 {
        match self {
            Method::Explicit => 0.2,
            Method::Rosenbrock => 1.0 / 3.0,
        }
    }
}

/// Adaptive, method-switching integrator bound to one parameter set.
pub struct TrajectorySolver<'a, E: EquationsOfMotion + ?Sized> {
    equations: &'a E,
    params: SystemParameters,
    atol: f64,
    rtol: f64,
    k: [Vec<f64>; 7],     // Stage derivatives; k[0] = f(t, y) between steps
    stage: Vec<f64>,      // Scratch stage point
    y_new: Vec<f64>,      // Proposed state of the current trial step
    y_stiff: Vec<f64>,    // Stage point of k[5], for the stiffness estimate
    err: Vec<f64>,        // Local error estimate of the current trial step
    jacobian: Option<DMatrix<f64>>, // Reused across rejected Rosenbrock trials
    spectral_bound: f64,  // Row-sum norm of the last Jacobian
    method: Method,
    stiff_hits: usize,
    nonstiff_hits: usize,
    explicit_ok: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub stiff_steps: usize,
    pub switches: usize,
}

impl<'a, E: EquationsOfMotion + ?Sized> TrajectorySolver<'a, E> {
    pub fn new(equations: &'a E, params: SystemParameters, atol: f64, rtol: f64) -> Self {
        let n = equations.state_len();
        Self {
            equations,
            params,
            atol,
            rtol,
            k: std::array::from_fn(|_| vec![0.0; n]),
            stage: vec![0.0; n],
            y_new: vec![0.0; n],
            y_stiff: vec![0.0; n],
            err: vec![0.0; n],
            jacobian: None,
            spectral_bound: 0.0,
            method: Method::Explicit,
            stiff_hits: 0,
            nonstiff_hits: 0,
            explicit_ok: 0,
            accepted: 0,
            rejected: 0,
            stiff_steps: 0,
            switches: 0,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// dy/dt at (t, y).
    pub fn deriv(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), ModelError> {
        self.equations.state_derivative(t, &self.params, y, out)
    }

    /// Root-mean-square of `v` scaled by the mixed tolerance of `y`.
    fn scaled_norm(&self, v: &[f64], y: &[f64], y_other: &[f64]) -> f64 {
        let sum: f64 = v
            .iter()
            .zip(y.iter().zip(y_other))
            .map(|(&vi, (&a, &b))| {
                let sc = self.atol + self.rtol * a.abs().max(b.abs()); // Mixed abs/rel scale
                (vi / sc) * (vi / sc)
            })
            .sum();
        (sum / v.len() as f64).sqrt()
    }

    fn initial_step(&self, y: &[f64], max_step: f64) -> f64 {
        let d0 = self.scaled_norm(y, y, y);
        let d1 = self.scaled_norm(&self.k[0], y, y);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        h0.min(max_step)
    }

    /// One Dormand–Prince step from (t, y) with size h, expecting `k[0] = f(t, y)`.
    /// Leaves the proposal in `y_new` and `f(t + h, y_new)` in `k[6]`; returns the scaled
    /// error estimate.
    fn dopri_step(&mut self, t: f64, y: &[f64], h: f64) -> Result<f64, ModelError> {
        for s in 1..7 {
            for i in 0..y.len() {
                let mut acc = 0.0;
                for j in 0..s {
                    acc += A[s][j] * self.k[j][i];
                }
                self.stage[i] = y[i] + h * acc;
            }
            if s == 5 {
                self.y_stiff.copy_from_slice(&self.stage);
            }
            self.equations
                .state_derivative(t + C[s] * h, &self.params, &self.stage, &mut self.k[s])?;
        }
        self.y_new.copy_from_slice(&self.stage); // Last stage is the 5th-order solution

        for i in 0..y.len() {
            self.err[i] = h * (0..7).map(|j| ERR[j] * self.k[j][i]).sum::<f64>();
        }
        Ok(self.scaled_norm(&self.err, y, &self.y_new))
    }

    /// Estimate of h·|λ| for the dominant eigenvalue, from the last two explicit stages.
    fn stiffness_ratio(&self, h: f64) -> f64 {
        let num: f64 = self.k[6].iter().zip(&self.k[5]).map(|(a, b)| (a - b) * (a - b)).sum();
        let den: f64 = self
            .y_new
            .iter()
            .zip(&self.y_stiff)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if den > 0.0 {
            h * (num / den).sqrt()
        } else {
            0.0
        }
    }

    /// Forward-difference Jacobian of the state derivative at (t, y), using `k[0] = f(t, y)`.
    fn jacobian_at(&mut self, t: f64, y: &[f64]) -> Result<DMatrix<f64>, ModelError> {
        let n = y.len();
        let mut jac = DMatrix::zeros(n, n);
        self.stage.copy_from_slice(y);
        for j in 0..n {
            let delta = JACOBIAN_STEP * y[j].abs().max(1.0);
            self.stage[j] = y[j] + delta;
            self.equations
                .state_derivative(t, &self.params, &self.stage, &mut self.k[1])?;
            self.stage[j] = y[j];
            for i in 0..n {
                jac[(i, j)] = (self.k[1][i] - self.k[0][i]) / delta;
            }
        }
        Ok(jac)
    }

    /// One Rosenbrock 2(3) step with the same contract as [`Self::dopri_step`]. The equations
    /// of motion are autonomous, so the time-derivative terms of the formula vanish.
    fn rosenbrock_step(&mut self, t: f64, y: &[f64], h: f64) -> Result<f64, ModelError> {
        let n = y.len();
        let jac = match self.jacobian.take() {
            Some(jac) => jac,
            None => {
                let jac = self.jacobian_at(t, y)?;
                self.spectral_bound = jac
                    .row_iter()
                    .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
                    .fold(0.0, f64::max);
                jac
            }
        };
        let w = DMatrix::identity(n, n) - (h * ROS_D) * &jac; // Iteration matrix I − hdJ
        let lu = w.lu();
        let solve = |rhs: DVector<f64>| lu.solve(&rhs).ok_or(ModelError::SingularIteration);

        let f0 = DVector::from_column_slice(&self.k[0]);
        let k1 = solve(f0.clone())?;
        for i in 0..n {
            self.stage[i] = y[i] + 0.5 * h * k1[i];
        }
        self.equations
            .state_derivative(t + 0.5 * h, &self.params, &self.stage, &mut self.k[1])?;
        let f1 = DVector::from_column_slice(&self.k[1]);
        let k2 = solve(&f1 - &k1)? + &k1;
        for i in 0..n {
            self.y_new[i] = y[i] + h * k2[i];
        }
        self.equations
            .state_derivative(t + h, &self.params, &self.y_new, &mut self.k[6])?;
        let f2 = DVector::from_column_slice(&self.k[6]);
        let k3 = solve(&f2 - ROS_E32 * (&k2 - &f1) - 2.0 * (&k1 - &f0))?;
        for i in 0..n {
            self.err[i] = h / 6.0 * (k1[i] - 2.0 * k2[i] + k3[i]); // Third-order comparison
        }
        self.jacobian = Some(jac);
        Ok(self.scaled_norm(&self.err, y, &self.y_new))
    }

    fn switch_to(&mut self, method: Method, t: f64, h: f64) {
        debug!(?method, t, h, "integration method switched");
        self.method = method;
        self.switches += 1;
        self.stiff_hits = 0;
        self.nonstiff_hits = 0;
        self.explicit_ok = 0;
    }

    /// Bookkeeping after an accepted step of size `h` with `h_next` proposed next.
    fn review_method(&mut self, t: f64, h: f64, h_next: f64) {
        match self.method {
            Method::Explicit => {
                if self.stiffness_ratio(h) > STIFF_BOUNDARY {
                    self.nonstiff_hits = 0;
                    self.stiff_hits += 1;
                    if self.stiff_hits >= STIFF_HITS {
                        self.switch_to(Method::Rosenbrock, t, h_next);
                    }
                } else {
                    self.nonstiff_hits += 1;
                    if self.nonstiff_hits >= NONSTIFF_RESET {
                        self.stiff_hits = 0;
                    }
                }
            }
            Method::Rosenbrock => {
                self.stiff_steps += 1;
                let bound = self.spectral_bound.max(f64::MIN_POSITIVE);
                let stable_explicit = EXPLICIT_STABILITY / bound; // Largest stable explicit step
                if stable_explicit > h_next {
                    self.explicit_ok += 1;
                    if self.explicit_ok >= EXPLICIT_RETURN {
                        self.switch_to(Method::Explicit, t, h_next);
                    }
                } else {
                    self.explicit_ok = 0;
                }
            }
        }
    }

    /// Integrates from `initial` at `times[0]` through every grid time. Returns one state
    /// row per grid point.
    pub fn solve(
        &mut self,
        initial: &[f64],
        times: &[f64],
        options: &IntegrationOptions,
    ) -> Result<Vec<Vec<f64>>, SimError> {
        let mut y = initial.to_vec();
        let mut t = times.first().copied().unwrap_or(0.0);
        let mut sol = Vec::with_capacity(times.len());
        sol.push(y.clone());

        let initial_deriv = {
            let mut f0 = vec![0.0; y.len()];
            let result = self.deriv(t, &y, &mut f0);
            self.k[0] = f0;
            result
        };
        if let Err(err) = initial_deriv {
            return Err(fail(0, t, format!("initial state rejected by model: {err}")));
        }
        let mut h = self.initial_step(&y, options.step);

        for (index, &target) in times.iter().enumerate().skip(1) {
            let done = index - 1; // Last grid index already produced
            if let Some(flag) = &options.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(SimError::Cancelled { index: done });
                }
            }
            if let Some(deadline) = options.deadline {
                if Instant::now() >= deadline {
                    return Err(SimError::TimedOut { index: done });
                }
            }

            let mut steps = 0;
            while t < target {
                steps += 1;
                if steps > options.max_steps {
                    return Err(fail(
                        done,
                        t,
                        format!("more than {} steps in one grid interval", options.max_steps),
                    ));
                }
                if steps == EXPLICIT_BUDGET && self.method == Method::Explicit {
                    // The explicit pair is crawling: treat the stretch as stiff.
                    self.switch_to(Method::Rosenbrock, t, h);
                }
                let remaining = target - t;
                let clipped = h >= remaining;
                let h_try = if clipped { remaining } else { h };

                let method = self.method;
                let outcome = match method {
                    Method::Explicit => self.dopri_step(t, &y, h_try),
                    Method::Rosenbrock => self.rosenbrock_step(t, &y, h_try),
                };
                let exponent = method.error_exponent();
                let (accepted, factor) = match outcome {
                    Ok(err_norm) if err_norm <= 1.0 => {
                        let factor = if err_norm == 0.0 {
                            MAX_SCALE
                        } else {
                            (SAFETY * err_norm.powf(-exponent)).clamp(MIN_SCALE, MAX_SCALE)
                        };
                        (true, factor)
                    }
                    Ok(err_norm) if err_norm.is_finite() => {
                        (false, (SAFETY * err_norm.powf(-exponent)).clamp(MIN_SCALE, 1.0))
                    }
                    // Non-finite error or a stage the model refused: shrink hard and retry.
                    _ => (false, MIN_SCALE),
                };

                if accepted {
                    self.accepted += 1;
                    // Clipped steps keep the proposal for the next interval.
                    let h_next = if clipped { h } else { h_try * factor };
                    self.review_method(t, h_try, h_next);
                    y.copy_from_slice(&self.y_new);
                    self.k.swap(0, 6); // FSAL: f(t + h, y_new) becomes the next k[0]
                    self.jacobian = None;
                    t = if clipped { target } else { t + h_try };
                    h = h_next;
                } else {
                    self.rejected += 1;
                    h = h_try * factor;
                    let floor = MIN_STEP_FACTOR * t.abs().max(1.0);
                    if h < floor {
                        return Err(fail(
                            done,
                            t,
                            format!("step size {h:e} fell below {floor:e}"),
                        ));
                    }
                }
            }
            sol.push(y.clone());
        }
        Ok(sol)
    }
}

fn fail(index: usize, time: f64, reason: String) -> SimError {
    warn!(index, time, %reason, "integration failed");
    SimError::IntegrationFailed {
        index,
        time,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::{derive_equations_2d, derive_equations_3d};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use std::time::Duration;

    #[test]
    fn grid_matches_requested_duration() {
        assert_eq!(sample_count(10.0, GRID_STEP), Ok(1001));
        assert_eq!(sample_count(0.0, GRID_STEP), Ok(1));
        assert_eq!(sample_count(0.004, GRID_STEP), Ok(1));
        let grid = time_grid(1.0, GRID_STEP).unwrap();
        assert_eq!(grid.len(), 101);
        assert_eq!(grid[0], 0.0);
        assert_eq!(*grid.last().unwrap(), 1.0);
        assert_relative_eq!(grid[37], 0.37, epsilon = 1e-12);
    }

    #[test]
    fn oversized_grid_is_refused() {
        for duration in [1e300, 1e9, f64::MAX] {
            assert!(sample_count(duration, GRID_STEP).unwrap_err().is_malformed_input());
        }
        let last_allowed = (MAX_SAMPLES - 1) as f64 * GRID_STEP;
        assert_eq!(sample_count(last_allowed, GRID_STEP), Ok(MAX_SAMPLES));
    }

    #[test]
    fn astronomically_long_run_is_rejected_not_attempted() {
        let eq = derive_equations_2d().unwrap();
        let err = simulate(&SystemParameters::default(), &[0.1, 0.0, 0.0, 0.0], 1e300, eq)
            .unwrap_err();
        assert!(err.is_malformed_input(), "{err:?}");
    }

    #[test]
    fn zero_duration_returns_initial_sample() {
        let eq = derive_equations_2d().unwrap();
        let traj = simulate(&SystemParameters::default(), &[0.3, 0.2, 0.0, 0.0], 0.0, eq).unwrap();
        assert_eq!(traj.len(), 1);
        assert_eq!(traj.states[0], vec![0.3, 0.2, 0.0, 0.0]);
        assert_eq!(traj.positions[0].len(), 4);
    }

    #[test]
    fn resting_pendulum_stays_put() {
        let eq = derive_equations_3d().unwrap();
        let traj = simulate(&SystemParameters::default(), &[0.0; 8], 0.5, eq).unwrap();
        assert_eq!(traj.len(), 51);
        assert!(traj.states.iter().all(|s| s.iter().all(|v| *v == 0.0)));
        assert_relative_eq!(traj.positions[50][5], -2.0);
    }

    #[test]
    fn matches_simple_pendulum_in_the_light_outer_mass_limit() {
        // Small swing of the inner link with an almost massless outer bob: θ1 ≈ θ0 cos(√(g/L) t).
        let eq = derive_equations_2d().unwrap();
        let params = SystemParameters::new(9.81, 1.0, 1e-10, 1.0, 1.0, 0.0);
        let traj = simulate(&params, &[1e-3, 1e-3, 0.0, 0.0], 2.0, eq).unwrap();
        let w = 9.81_f64.sqrt();
        for (t, s) in traj.times.iter().zip(&traj.states).step_by(20) {
            assert_relative_eq!(s[0], 1e-3 * (w * t).cos(), epsilon = 5e-8);
        }
    }

    #[test]
    fn free_swing_stays_on_the_explicit_pair() {
        let eq = derive_equations_2d().unwrap();
        let times = time_grid(2.0, GRID_STEP).unwrap();
        let mut solver = TrajectorySolver::new(eq, SystemParameters::default(), 1e-9, 1e-9);
        let states = solver
            .solve(&[FRAC_PI_2, FRAC_PI_2, 0.0, 0.0], &times, &IntegrationOptions::default())
            .unwrap();
        assert_eq!(states.len(), 201);
        assert_eq!(solver.switches, 0);
        assert_eq!(solver.stiff_steps, 0);
        assert_eq!(solver.method(), Method::Explicit);
    }

    #[test]
    fn heavy_damping_on_light_bodies_switches_to_rosenbrock() {
        // Damping time scale m/b = 1e-8: far too stiff for the explicit pair alone.
        let eq = derive_equations_2d().unwrap();
        let params = SystemParameters::new(9.81, 1e-4, 1e-4, 1.0, 1.0, 1e4);
        let times = time_grid(1.0, GRID_STEP).unwrap();
        let mut solver = TrajectorySolver::new(eq, params, 1e-9, 1e-9);
        let states = solver
            .solve(&[0.5, 0.3, 0.0, 0.0], &times, &IntegrationOptions::default())
            .unwrap();
        assert_eq!(states.len(), 101);
        assert!(solver.switches >= 1);
        assert!(solver.stiff_steps > 0);
        assert_eq!(solver.method(), Method::Rosenbrock);

        // Overdamped creep: the links barely move in one time unit.
        let last = &states[100];
        assert!(last.iter().all(|v| v.is_finite()));
        assert!((last[0] - 0.5).abs() < 1e-3, "θ1 = {}", last[0]);
        assert!((last[1] - 0.3).abs() < 1e-3, "θ2 = {}", last[1]);
        assert!(last[0] <= 0.5 && last[1] <= 0.3 + 1e-6);
    }

    #[test]
    fn stiff_run_through_simulate_dissipates_energy() {
        let eq = derive_equations_3d().unwrap();
        let params = SystemParameters::new(9.81, 1e-3, 1e-3, 1.0, 1.0, 50.0);
        let traj = simulate(&params, &[0.6, 0.4, 0.0, 0.5, 0.0, 0.0, 1.0, 0.0], 1.0, eq).unwrap();
        let energy = traj.energies(eq, &params);
        assert!(energy[100] < energy[0]);
        let slack = 1e-8 * params.energy_scale();
        for pair in energy.windows(2) {
            assert!(pair[1] <= pair[0] + slack);
        }
    }

    #[test]
    fn wrong_state_length_is_rejected() {
        let eq = derive_equations_3d().unwrap();
        let err = simulate(&SystemParameters::default(), &[0.0; 4], 1.0, eq).unwrap_err();
        assert_eq!(err, SimError::StateLength { expected: 8, actual: 4 });
    }

    #[test]
    fn bad_duration_and_initial_values_are_rejected() {
        let eq = derive_equations_2d().unwrap();
        let p = SystemParameters::default();
        assert!(simulate(&p, &[0.0; 4], -1.0, eq).unwrap_err().is_malformed_input());
        assert!(simulate(&p, &[0.0; 4], f64::INFINITY, eq).unwrap_err().is_malformed_input());
        assert!(simulate(&p, &[f64::NAN, 0.0, 0.0, 0.0], 1.0, eq)
            .unwrap_err()
            .is_malformed_input());
    }

    #[test]
    fn raised_cancel_flag_stops_before_first_interval() {
        let eq = derive_equations_2d().unwrap();
        let options = IntegrationOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..Default::default()
        };
        let initial = [1.0, 0.5, 0.0, 0.0];
        let err = simulate_with(&SystemParameters::default(), &initial, 5.0, eq, &options)
            .unwrap_err();
        assert_eq!(err, SimError::Cancelled { index: 0 });
    }

    #[test]
    fn passed_deadline_times_out() {
        let eq = derive_equations_2d().unwrap();
        let options = IntegrationOptions {
            deadline: Instant::now().checked_sub(Duration::from_millis(1)),
            ..Default::default()
        };
        let initial = [1.0, 0.5, 0.0, 0.0];
        let result = simulate_with(&SystemParameters::default(), &initial, 5.0, eq, &options);
        if options.deadline.is_some() {
            assert_eq!(result.unwrap_err(), SimError::TimedOut { index: 0 });
        }
    }

    #[test]
    fn step_budget_exhaustion_reports_failed_index() {
        let eq = derive_equations_2d().unwrap();
        let options = IntegrationOptions {
            max_steps: 1,
            tolerance: Some(1e-14),
            ..Default::default()
        };
        let initial = [2.5, -2.0, 3.0, -4.0];
        let err = simulate_with(&SystemParameters::default(), &initial, 2.0, eq, &options)
            .unwrap_err();
        match err {
            SimError::IntegrationFailed { index, time, .. } => {
                assert!(time >= 0.0);
                assert!(index < 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
