// src/model2d.rs
// Planar damped double pendulum. The Lagrangian
//   T = ½ (m1+m2) L1² ω1² + ½ m2 L2² ω2² + m2 L1 L2 ω1 ω2 cos(θ1−θ2)
//   V = −(m1+m2) g L1 cos θ1 − m2 g L2 cos θ2
//   F = ½ b (|v1|² + |v2|²)
// gives two Euler–Lagrange equations that are linear in (θ1'', θ2''). The 2×2 system is
// solved by Cramer's rule below; its determinant m2 L1² L2² (m1 + m2 sin²(θ1−θ2)) only
// vanishes for zero masses or lengths.

use crate::equations::{Dimension, EquationsOfMotion};
use crate::error::{ModelError, SimError};
use crate::kinematics::{map_planar, planar_accelerations, planar_position, planar_velocities};
use crate::math::{Vec2, Vec3};
use crate::params::SystemParameters;

/// Closed-form angular accelerations `(θ1'', θ2'')`.
///
/// `t` is accepted for parity with the generic state-derivative signature; the system is
/// autonomous.
#[allow(clippy::too_many_arguments)]
pub fn angular_accelerations(
    _t: f64,
    g: f64,
    m1: f64,
    m2: f64,
    l1: f64,
    l2: f64,
    b: f64,
    theta1: f64,
    theta2: f64,
    omega1: f64,
    omega2: f64,
) -> (f64, f64) {
    let (s1, s2) = (theta1.sin(), theta2.sin());
    let (sd, cd) = (theta1 - theta2).sin_cos();

    // Mass matrix.
    let a11 = (m1 + m2) * l1 * l1;
    let a12 = m2 * l1 * l2 * cd;
    let a22 = m2 * l2 * l2;

    // Centripetal, gravity and dissipation terms moved to the right-hand side.
    let r1 = -m2 * l1 * l2 * sd * omega2 * omega2
        - (m1 + m2) * g * l1 * s1
        - b * (2.0 * l1 * l1 * omega1 + l1 * l2 * omega2 * cd);
    let r2 = m2 * l1 * l2 * sd * omega1 * omega1
        - m2 * g * l2 * s2
        - b * (l2 * l2 * omega2 + l1 * l2 * omega1 * cd);

    let det = a11 * a22 - a12 * a12;
    ((r1 * a22 - a12 * r2) / det, (a11 * r2 - a12 * r1) / det)
}

/// Equations of motion for the planar model, state `[θ1, θ2, ω1, ω2]`.
#[derive(Debug)]
pub struct Planar;

impl Planar {
    /// Builds the model. Only the derivation cache calls this; everything else goes
    /// through [`crate::equations::derive_equations_2d`].
    pub(crate) fn derive() -> Self {
        Planar
    }

    /// Scalar convenience wrapper around [`angular_accelerations`].
    pub fn accel(
        &self,
        t: f64,
        params: &SystemParameters,
        theta1: f64,
        theta2: f64,
        omega1: f64,
        omega2: f64,
    ) -> Result<(f64, f64), ModelError> {
        let (dd1, dd2) = angular_accelerations(
            t,
            params.gravity,
            params.mass1,
            params.mass2,
            params.length1,
            params.length2,
            params.damping,
            theta1,
            theta2,
            omega1,
            omega2,
        );
        if dd1.is_finite() && dd2.is_finite() {
            Ok((dd1, dd2))
        } else {
            Err(ModelError::NonFinite)
        }
    }
}

impl EquationsOfMotion for Planar {
    fn dimension(&self) -> Dimension {
        Dimension::Planar
    }

    fn accelerations(
        &self,
        t: f64,
        params: &SystemParameters,
        state: &[f64],
        out: &mut [f64],
    ) -> Result<(), ModelError> {
        let (dd1, dd2) = self.accel(t, params, state[0], state[1], state[2], state[3])?;
        out[0] = dd1;
        out[1] = dd2;
        Ok(())
    }

    fn positions(
        &self,
        params: &SystemParameters,
        states: &[Vec<f64>],
    ) -> Result<Vec<Vec<f64>>, SimError> {
        let theta1: Vec<f64> = states.iter().map(|s| s[0]).collect();
        let theta2: Vec<f64> = states.iter().map(|s| s[1]).collect();
        Ok(map_planar(&theta1, &theta2, params.length1, params.length2)?.rows())
    }

    fn energy(&self, params: &SystemParameters, state: &[f64]) -> f64 {
        let [_, y1, _, y2] = planar_position(state[0], state[1], params.length1, params.length2);
        let [v1, v2] = planar_velocities(state, params.length1, params.length2);
        let kinetic =
            0.5 * (params.mass1 * v1.norm_squared() + params.mass2 * v2.norm_squared());
        let potential = params.gravity * (params.mass1 * y1 + params.mass2 * y2);
        kinetic + potential
    }

    fn cartesian_motion(
        &self,
        params: &SystemParameters,
        state: &[f64],
        accel: &[f64],
    ) -> [(Vec3, Vec3); 2] {
        let vel = planar_velocities(state, params.length1, params.length2);
        let acc = planar_accelerations(state, accel, params.length1, params.length2);
        let lift = |v: Vec2| Vec3::new(v.x, v.y, 0.0);
        [(lift(vel[0]), lift(acc[0])), (lift(vel[1]), lift(acc[1]))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn params() -> SystemParameters {
        SystemParameters::new(9.81, 1.0, 1.0, 1.0, 1.0, 0.0)
    }

    #[test]
    fn rest_at_bottom_is_equilibrium() {
        let (dd1, dd2) = Planar::derive().accel(0.0, &params(), 0.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!((dd1, dd2), (0.0, 0.0));
    }

    #[test]
    fn both_links_horizontal_from_rest() {
        // Starting straight out, the top link takes the whole weight: θ1'' = −g/L1, θ2'' = 0.
        let (dd1, dd2) =
            Planar::derive().accel(0.0, &params(), FRAC_PI_2, FRAC_PI_2, 0.0, 0.0).unwrap();
        assert_relative_eq!(dd1, -9.81, epsilon = 1e-12);
        assert_relative_eq!(dd2, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn light_outer_mass_reduces_to_simple_pendulum() {
        let p = SystemParameters::new(9.81, 1.0, 1e-9, 2.0, 1.0, 0.0);
        let (dd1, _) = Planar::derive().accel(0.0, &p, 0.4, 0.1, 0.0, 0.0).unwrap();
        assert_relative_eq!(dd1, -9.81 / 2.0 * 0.4_f64.sin(), epsilon = 1e-7);
    }

    #[test]
    fn damping_opposes_motion() {
        let p = SystemParameters {
            damping: 0.5,
            ..params()
        };
        let eq = Planar::derive();
        let (free, _) = eq.accel(0.0, &params(), 0.0, 0.0, 1.0, 1.0).unwrap();
        let (damped, _) = eq.accel(0.0, &p, 0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(damped < free);
    }

    #[test]
    fn time_argument_is_ignored() {
        let a = angular_accelerations(0.0, 9.81, 1.0, 2.0, 1.0, 0.5, 0.1, 0.3, -0.2, 0.4, 1.0);
        let b = angular_accelerations(7.5, 9.81, 1.0, 2.0, 1.0, 0.5, 0.1, 0.3, -0.2, 0.4, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_mass_surfaces_as_model_error() {
        let p = SystemParameters::new(9.81, 0.0, 0.0, 1.0, 1.0, 0.0);
        assert_eq!(
            Planar::derive().accel(0.0, &p, 0.2, 0.1, 0.0, 0.0),
            Err(ModelError::NonFinite)
        );
    }

    #[test]
    fn energy_at_rest_is_potential_only() {
        let e = Planar::derive().energy(&params(), &[0.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(e, -9.81 * (1.0 + 2.0));
    }
}
