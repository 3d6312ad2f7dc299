// src/equations.rs
// The seam between the pendulum models and the integrator, and the once-only derivation
// cache. Each dimensionality is built and verified the first time it is requested; after
// that every caller shares the same immutable equations object.

use crate::error::{DerivationError, ModelError, SimError};
use crate::math::Vec3;
use crate::model2d::Planar;
use crate::model3d::Spherical;
use crate::params::SystemParameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::{error, info};

/// Largest relative power-balance residual a derived model may show at a check state.
pub const POWER_BALANCE_TOLERANCE: f64 = 1e-9;

/// Spatial dimensionality of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[serde(rename = "2D", alias = "2d")]
    Planar,
    #[serde(rename = "3D", alias = "3d")]
    Spherical,
}

impl Dimension {
    /// Number of generalized coordinates.
    pub fn coordinates(self) -> usize {
        match self {
            Dimension::Planar => 2,
            Dimension::Spherical => 4,
        }
    }

    /// Length of the state vector: coordinates followed by their rates.
    pub fn state_len(self) -> usize {
        2 * self.coordinates()
    }

    /// Absolute and relative integration tolerance. The spherical model accumulates more
    /// error per step and runs tighter.
    pub fn tolerance(self) -> f64 {
        match self {
            Dimension::Planar => 1e-9,
            Dimension::Spherical => 1e-10,
        }
    }

    /// Index of the Cartesian axis pointing up.
    pub fn vertical_axis(self) -> usize {
        match self {
            Dimension::Planar => 1,
            Dimension::Spherical => 2,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Planar => write!(f, "2D"),
            Dimension::Spherical => write!(f, "3D"),
        }
    }
}

/// A derived, closed-form model of the damped double pendulum.
///
/// Implementations are pure: no interior state, safe to share across threads and to call
/// with any parameter set.
pub trait EquationsOfMotion: Send + Sync {
    fn dimension(&self) -> Dimension;

    /// Second time derivatives of the coordinates, written to `out[..coordinates]`.
    fn accelerations(
        &self,
        t: f64,
        params: &SystemParameters,
        state: &[f64],
        out: &mut [f64],
    ) -> Result<(), ModelError>;

    /// Cartesian positions of both bodies for every state row.
    fn positions(
        &self,
        params: &SystemParameters,
        states: &[Vec<f64>],
    ) -> Result<Vec<Vec<f64>>, SimError>;

    /// Total mechanical energy (kinetic plus potential).
    fn energy(&self, params: &SystemParameters, state: &[f64]) -> f64;

    /// Cartesian `(velocity, acceleration)` of each body, planar vectors padded with z = 0.
    fn cartesian_motion(
        &self,
        params: &SystemParameters,
        state: &[f64],
        accel: &[f64],
    ) -> [(Vec3, Vec3); 2];

    fn coordinates(&self) -> usize {
        self.dimension().coordinates()
    }

    fn state_len(&self) -> usize {
        self.dimension().state_len()
    }

    fn tolerance(&self) -> f64 {
        self.dimension().tolerance()
    }

    /// Full state derivative: rates copied from the state, then accelerations.
    fn state_derivative(
        &self,
        t: f64,
        params: &SystemParameters,
        state: &[f64],
        out: &mut [f64],
    ) -> Result<(), ModelError> {
        let n = self.coordinates();
        out[..n].copy_from_slice(&state[n..2 * n]);
        self.accelerations(t, params, state, &mut out[n..2 * n])
    }
}

static PLANAR: OnceLock<Result<Planar, DerivationError>> = OnceLock::new();
static SPHERICAL: OnceLock<Result<Spherical, DerivationError>> = OnceLock::new();

/// Planar equations, derived and verified on first use.
pub fn derive_equations_2d() -> Result<&'static Planar, DerivationError> {
    PLANAR
        .get_or_init(|| verified("planar", Planar::derive()))
        .as_ref()
        .map_err(Clone::clone)
}

/// Spherical equations, derived and verified on first use.
pub fn derive_equations_3d() -> Result<&'static Spherical, DerivationError> {
    SPHERICAL
        .get_or_init(|| verified("spherical", Spherical::derive()))
        .as_ref()
        .map_err(Clone::clone)
}

/// Dimension-dispatched access to the cache.
pub fn derive_equations(
    dimension: Dimension,
) -> Result<&'static dyn EquationsOfMotion, DerivationError> {
    match dimension {
        Dimension::Planar => Ok(derive_equations_2d()? as &'static dyn EquationsOfMotion),
        Dimension::Spherical => Ok(derive_equations_3d()? as &'static dyn EquationsOfMotion),
    }
}

fn verified<E: EquationsOfMotion>(model: &'static str, equations: E) -> Result<E, DerivationError> {
    match check_power_balance(model, &equations) {
        Ok(worst) => {
            info!(model, worst_residual = worst, "equations of motion derived");
            Ok(equations)
        }
        Err(err) => {
            error!(model, %err, "equations of motion rejected");
            Err(err)
        }
    }
}

fn check_parameters() -> [SystemParameters; 3] {
    [
        SystemParameters::new(9.81, 1.3, 0.7, 1.1, 0.6, 0.25),
        SystemParameters::new(3.7, 2.0, 5.0, 0.4, 1.9, 0.0),
        SystemParameters::new(24.8, 0.2, 0.05, 2.5, 0.3, 1.5),
    ]
}

/// Deterministic state with every angle in [0.35, 2.75], well away from the coordinate
/// poles of the spherical model.
fn check_state(dimension: Dimension, k: usize) -> Vec<f64> {
    let n = dimension.coordinates();
    let mut state = vec![0.0; 2 * n];
    for i in 0..n {
        let wave = ((k * 7 + i * 3 + 1) as f64 * 0.61).sin();
        state[i] = 0.35 + 1.2 * (1.0 + wave);
        state[n + i] = 1.5 * ((k * 5 + i * 11 + 2) as f64 * 0.37).cos();
    }
    state
}

/// Checks the work–energy identity `dE/dt = −b Σ |v_k|²` at fixed check states, using
/// Cartesian kinematics independent of how the accelerations were solved. Returns the
/// worst relative residual.
pub fn check_power_balance<E: EquationsOfMotion + ?Sized>(
    model: &'static str,
    equations: &E,
) -> Result<f64, DerivationError> {
    let dimension = equations.dimension();
    let axis = dimension.vertical_axis();
    let mut worst = 0.0_f64;
    let mut accel = vec![0.0; dimension.coordinates()];

    for params in check_parameters() {
        let masses = [params.mass1, params.mass2];
        for k in 0..8 {
            let state = check_state(dimension, k);
            equations
                .accelerations(0.0, &params, &state, &mut accel)
                .map_err(|err| DerivationError {
                    model,
                    detail: format!("no unique solution at check state {k}: {err}"),
                })?;

            let motion = equations.cartesian_motion(&params, &state, &accel);
            let mut power = 0.0;
            let mut magnitude = f64::MIN_POSITIVE;
            for (m, (v, a)) in masses.iter().zip(motion.iter()) {
                let speed_sq = v.norm_squared();
                power += m * v.dot(a) + m * params.gravity * v[axis] + params.damping * speed_sq;
                magnitude += m * speed_sq.sqrt() * (a.norm() + params.gravity.abs())
                    + params.damping * speed_sq;
            }
            let residual = power.abs() / magnitude;
            if residual.is_nan() || residual > POWER_BALANCE_TOLERANCE {
                return Err(DerivationError {
                    model,
                    detail: format!("power balance residual {residual:e} at check state {k}"),
                });
            }
            worst = worst.max(residual);
        }
    }
    Ok(worst)
}
