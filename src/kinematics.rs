// src/kinematics.rs
// Maps generalized coordinates to Cartesian positions of both bodies. The pivot sits at the
// origin, the first body hangs from it on a rod of length L1, the second hangs from the first
// on a rod of length L2. "Down" is -y in the plane and -z in space.
// Everything here is a pure transform: no state, no side effects.

use crate::error::SimError;
use crate::math::{Vec2, Vec3};

/// Cartesian positions `[x1, y1, x2, y2]` for one planar configuration.
pub fn planar_position(theta1: f64, theta2: f64, length1: f64, length2: f64) -> [f64; 4] {
    let x1 = length1 * theta1.sin();
    let y1 = -length1 * theta1.cos();
    let x2 = x1 + length2 * theta2.sin();
    let y2 = y1 - length2 * theta2.cos();
    [x1, y1, x2, y2]
}

/// Cartesian positions `[x1, y1, z1, x2, y2, z2]` for one spherical configuration.
pub fn spherical_position(
    alpha1: f64,
    alpha2: f64,
    phi1: f64,
    phi2: f64,
    length1: f64,
    length2: f64,
) -> [f64; 6] {
    let r1 = length1 * SphericalLink::new(alpha1, phi1).e;
    let r2 = r1 + length2 * SphericalLink::new(alpha2, phi2).e;
    [r1.x, r1.y, r1.z, r2.x, r2.y, r2.z]
}

/// Column-wise planar positions, one entry per input sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanarPath {
    pub x1: Vec<f64>,
    pub y1: Vec<f64>,
    pub x2: Vec<f64>,
    pub y2: Vec<f64>,
}

impl PlanarPath {
    /// Row-major view `[x1, y1, x2, y2]` per sample.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.x1.len())
            .map(|i| vec![self.x1[i], self.y1[i], self.x2[i], self.y2[i]])
            .collect()
    }
}

/// Column-wise spherical positions, one entry per input sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SphericalPath {
    pub x1: Vec<f64>,
    pub y1: Vec<f64>,
    pub z1: Vec<f64>,
    pub x2: Vec<f64>,
    pub y2: Vec<f64>,
    pub z2: Vec<f64>,
}

impl SphericalPath {
    /// Row-major view `[x1, y1, z1, x2, y2, z2]` per sample.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.x1.len())
            .map(|i| {
                vec![
                    self.x1[i], self.y1[i], self.z1[i], self.x2[i], self.y2[i], self.z2[i],
                ]
            })
            .collect()
    }
}

fn check_lengths(lens: &[usize]) -> Result<usize, SimError> {
    let n = lens.first().copied().unwrap_or(0);
    if lens.iter().any(|&l| l != n) {
        return Err(SimError::MalformedInput(format!(
            "coordinate sequences differ in length: {lens:?}"
        )));
    }
    Ok(n)
}

/// Vectorized [`planar_position`] over equal-length angle sequences.
pub fn map_planar(
    theta1: &[f64],
    theta2: &[f64],
    length1: f64,
    length2: f64,
) -> Result<PlanarPath, SimError> {
    let n = check_lengths(&[theta1.len(), theta2.len()])?;
    let mut path = PlanarPath {
        x1: Vec::with_capacity(n),
        y1: Vec::with_capacity(n),
        x2: Vec::with_capacity(n),
        y2: Vec::with_capacity(n),
    };
    for (&t1, &t2) in theta1.iter().zip(theta2) {
        let [x1, y1, x2, y2] = planar_position(t1, t2, length1, length2);
        path.x1.push(x1);
        path.y1.push(y1);
        path.x2.push(x2);
        path.y2.push(y2);
    }
    Ok(path)
}

/// Vectorized [`spherical_position`] over equal-length angle sequences.
pub fn map_spherical(
    alpha1: &[f64],
    alpha2: &[f64],
    phi1: &[f64],
    phi2: &[f64],
    length1: f64,
    length2: f64,
) -> Result<SphericalPath, SimError> {
    let n = check_lengths(&[alpha1.len(), alpha2.len(), phi1.len(), phi2.len()])?;
    let mut path = SphericalPath::default();
    for v in [
        &mut path.x1,
        &mut path.y1,
        &mut path.z1,
        &mut path.x2,
        &mut path.y2,
        &mut path.z2,
    ] {
        v.reserve(n);
    }
    for i in 0..n {
        let [x1, y1, z1, x2, y2, z2] =
            spherical_position(alpha1[i], alpha2[i], phi1[i], phi2[i], length1, length2);
        path.x1.push(x1);
        path.y1.push(y1);
        path.z1.push(z1);
        path.x2.push(x2);
        path.y2.push(y2);
        path.z2.push(z2);
    }
    Ok(path)
}

/// Direction vectors of one spherical link and their angle derivatives.
///
/// A link tip sits at `L e(α, φ)` relative to its pivot, with
/// `e = (sinα cosφ, −sinα sinφ, −cosα)`. The tip velocity is `L (a α̇ + p φ̇)` and the
/// velocity-product part of its acceleration is `L (−e α̇² + 2 c α̇ φ̇ + s φ̇²)`.
#[derive(Debug, Clone, Copy)]
pub struct SphericalLink {
    /// Unit rod direction.
    pub e: Vec3,
    /// `∂e/∂α`.
    pub a: Vec3,
    /// `∂e/∂φ`, vanishes at the poles.
    pub p: Vec3,
    /// `∂a/∂φ = ∂p/∂α`.
    pub c: Vec3,
    /// `∂p/∂φ`.
    pub s: Vec3,
    pub sin_alpha: f64,
}

impl SphericalLink {
    pub fn new(alpha: f64, phi: f64) -> Self {
        let (sa, ca) = alpha.sin_cos();
        let (sp, cp) = phi.sin_cos();
        Self {
            e: Vec3::new(sa * cp, -sa * sp, -ca),
            a: Vec3::new(ca * cp, -ca * sp, sa),
            p: Vec3::new(-sa * sp, -sa * cp, 0.0),
            c: Vec3::new(-ca * sp, -ca * cp, 0.0),
            s: Vec3::new(-sa * cp, sa * sp, 0.0),
            sin_alpha: sa,
        }
    }

    /// Tip velocity relative to the pivot.
    pub fn velocity(&self, length: f64, alpha_dot: f64, phi_dot: f64) -> Vec3 {
        length * (alpha_dot * self.a + phi_dot * self.p)
    }

    /// Tip acceleration relative to the pivot at zero angular accelerations.
    pub fn bias(&self, length: f64, alpha_dot: f64, phi_dot: f64) -> Vec3 {
        let radial = -alpha_dot * alpha_dot * self.e;
        let mixed = 2.0 * alpha_dot * phi_dot * self.c;
        let azimuthal = phi_dot * phi_dot * self.s;
        length * (radial + mixed + azimuthal)
    }

    /// Tip acceleration relative to the pivot.
    pub fn acceleration(
        &self,
        length: f64,
        alpha_dot: f64,
        phi_dot: f64,
        alpha_ddot: f64,
        phi_ddot: f64,
    ) -> Vec3 {
        self.bias(length, alpha_dot, phi_dot) + self.velocity(length, alpha_ddot, phi_ddot)
    }
}

/// Body velocities for planar state `[θ1, θ2, ω1, ω2]`.
pub fn planar_velocities(state: &[f64], length1: f64, length2: f64) -> [Vec2; 2] {
    let (theta1, theta2, omega1, omega2) = (state[0], state[1], state[2], state[3]);
    let v1 = length1 * omega1 * Vec2::new(theta1.cos(), theta1.sin());
    let v2 = v1 + length2 * omega2 * Vec2::new(theta2.cos(), theta2.sin());
    [v1, v2]
}

/// Body accelerations for a planar state and angular accelerations `[θ1'', θ2'']`.
pub fn planar_accelerations(
    state: &[f64],
    accel: &[f64],
    length1: f64,
    length2: f64,
) -> [Vec2; 2] {
    // Tangential plus centripetal part of one rod tip.
    let link = |length: f64, theta: f64, omega: f64, theta_ddot: f64| {
        let (s, c) = theta.sin_cos();
        length * (theta_ddot * Vec2::new(c, s) + omega * omega * Vec2::new(-s, c))
    };
    let a1 = link(length1, state[0], state[2], accel[0]);
    [a1, a1 + link(length2, state[1], state[3], accel[1])]
}

/// Body velocities for spherical state `[α1, α2, φ1, φ2, α̇1, α̇2, φ̇1, φ̇2]`.
pub fn spherical_velocities(state: &[f64], length1: f64, length2: f64) -> [Vec3; 2] {
    let link1 = SphericalLink::new(state[0], state[2]);
    let link2 = SphericalLink::new(state[1], state[3]);
    let v1 = link1.velocity(length1, state[4], state[6]);
    let v2 = v1 + link2.velocity(length2, state[5], state[7]);
    [v1, v2]
}

/// Body accelerations for a spherical state and `[α1'', α2'', φ1'', φ2'']`.
pub fn spherical_accelerations(
    state: &[f64],
    accel: &[f64],
    length1: f64,
    length2: f64,
) -> [Vec3; 2] {
    let link1 = SphericalLink::new(state[0], state[2]);
    let link2 = SphericalLink::new(state[1], state[3]);
    let a1 = link1.acceleration(length1, state[4], state[6], accel[0], accel[2]);
    let a2 = a1 + link2.acceleration(length2, state[5], state[7], accel[1], accel[3]);
    [a1, a2]
}
