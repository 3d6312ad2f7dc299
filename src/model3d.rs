// src/model3d.rs
// Spherical damped double pendulum with coordinates q = (α1, α2, φ1, φ2): polar angle from
// the downward vertical and azimuth about it, per link.
//
// With body Jacobians J1, J2 (columns ∂r_k/∂q_i) and velocity-product accelerations κ1, κ2,
// the damped Euler–Lagrange equations read
//   M q'' = −Σ m_k J_kᵀ κ_k − g Σ m_k J_kᵀ ẑ − b Σ J_kᵀ v_k,   M = Σ m_k J_kᵀ J_k.
// The gradient of F = ½ b (|v1|² + |v2|²) with respect to q' is b Σ J_kᵀ v_k. The 4×4 system
// is solved as assembled, by elimination with partial pivoting.

use crate::equations::{Dimension, EquationsOfMotion};
use crate::error::{ModelError, SimError};
use crate::kinematics::{
    map_spherical, spherical_accelerations, spherical_position, spherical_velocities,
    SphericalLink,
};
use crate::math::{solve_linear_system, Vec3};
use nalgebra::{Matrix4, Vector4};
use crate::params::SystemParameters;

/// Below this |sin α| a link sits on the vertical axis and its azimuth is undefined.
pub const POLE_TOLERANCE: f64 = 1e-9;

/// Angular accelerations `[α1'', α2'', φ1'', φ2'']` for state
/// `[α1, α2, φ1, φ2, α̇1, α̇2, φ̇1, φ̇2]`.
///
/// A link at a pole contributes no azimuthal row or column to the mass matrix; its
/// azimuthal acceleration is reported as zero and the remaining unknowns come from the
/// reduced system.
pub fn angular_accelerations(
    _t: f64,
    params: &SystemParameters,
    state: &[f64],
) -> Result<[f64; 4], ModelError> {
    let (l1, l2) = (params.length1, params.length2);
    let (m1, m2) = (params.mass1, params.mass2);
    let (alpha_dot1, alpha_dot2, phi_dot1, phi_dot2) = (state[4], state[5], state[6], state[7]);

    let link1 = SphericalLink::new(state[0], state[2]);
    let link2 = SphericalLink::new(state[1], state[3]);

    // Jacobian columns in coordinate order (α1, α2, φ1, φ2).
    let j1 = [l1 * link1.a, Vec3::zeros(), l1 * link1.p, Vec3::zeros()];
    let j2 = [j1[0], l2 * link2.a, j1[2], l2 * link2.p];

    let v1 = link1.velocity(l1, alpha_dot1, phi_dot1);
    let v2 = v1 + link2.velocity(l2, alpha_dot2, phi_dot2);
    let kappa1 = link1.bias(l1, alpha_dot1, phi_dot1);
    let kappa2 = kappa1 + link2.bias(l2, alpha_dot2, phi_dot2);

    let mut mass = Matrix4::from_fn(|i, j| m1 * j1[i].dot(&j1[j]) + m2 * j2[i].dot(&j2[j]));
    let mut rhs = Vector4::from_fn(|i, _| {
        let inertial = m1 * j1[i].dot(&kappa1) + m2 * j2[i].dot(&kappa2);
        let gravity = params.gravity * (m1 * j1[i].z + m2 * j2[i].z);
        let dissipation = params.damping * (j1[i].dot(&v1) + j2[i].dot(&v2));
        -inertial - gravity - dissipation
    });

    for (k, link) in [link1, link2].iter().enumerate() {
        if link.sin_alpha.abs() < POLE_TOLERANCE {
            let col = 2 + k;
            mass.row_mut(col).fill(0.0);
            mass.column_mut(col).fill(0.0);
            mass[(col, col)] = 1.0;
            rhs[col] = 0.0;
        }
    }

    let x = solve_linear_system(mass, rhs)?;
    Ok([x[0], x[1], x[2], x[3]])
}

/// Equations of motion for the spherical model.
#[derive(Debug)]
pub struct Spherical;

impl Spherical {
    /// Builds the model. Only the derivation cache calls this; everything else goes
    /// through [`crate::equations::derive_equations_3d`].
    pub(crate) fn derive() -> Self {
        Spherical
    }
}

impl EquationsOfMotion for Spherical {
    fn dimension(&self) -> Dimension {
        Dimension::Spherical
    }

    fn accelerations(
        &self,
        t: f64,
        params: &SystemParameters,
        state: &[f64],
        out: &mut [f64],
    ) -> Result<(), ModelError> {
        out[..4].copy_from_slice(&angular_accelerations(t, params, state)?);
        Ok(())
    }

    fn positions(
        &self,
        params: &SystemParameters,
        states: &[Vec<f64>],
    ) -> Result<Vec<Vec<f64>>, SimError> {
        let column = |i: usize| states.iter().map(|s| s[i]).collect::<Vec<f64>>();
        let path = map_spherical(
            &column(0),
            &column(1),
            &column(2),
            &column(3),
            params.length1,
            params.length2,
        )?;
        Ok(path.rows())
    }

    fn energy(&self, params: &SystemParameters, state: &[f64]) -> f64 {
        let r = spherical_position(
            state[0],
            state[1],
            state[2],
            state[3],
            params.length1,
            params.length2,
        );
        let [v1, v2] = spherical_velocities(state, params.length1, params.length2);
        let kinetic =
            0.5 * (params.mass1 * v1.norm_squared() + params.mass2 * v2.norm_squared());
        let potential = params.gravity * (params.mass1 * r[2] + params.mass2 * r[5]);
        kinetic + potential
    }

    fn cartesian_motion(
        &self,
        params: &SystemParameters,
        state: &[f64],
        accel: &[f64],
    ) -> [(Vec3, Vec3); 2] {
        let [v1, v2] = spherical_velocities(state, params.length1, params.length2);
        let [a1, a2] = spherical_accelerations(state, accel, params.length1, params.length2);
        [(v1, a1), (v2, a2)]
    }
}
