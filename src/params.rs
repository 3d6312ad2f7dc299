// src/params.rs
// Physical parameters of one simulation run. Supplied once, never mutated during integration.

use crate::error::SimError;
use serde::{Deserialize, Serialize};

/// Parameters shared by the planar and spherical models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemParameters {
    pub gravity: f64,
    pub mass1: f64,
    pub mass2: f64,
    pub length1: f64,
    pub length2: f64,
    /// Coefficient of the dissipation function `½ b (|v1|² + |v2|²)`.
    #[serde(default)]
    pub damping: f64,
}

impl Default for SystemParameters {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            mass1: 1.0,
            mass2: 1.0,
            length1: 1.0,
            length2: 1.0,
            damping: 0.0,
        }
    }
}

impl SystemParameters {
    pub fn new(
        gravity: f64,
        mass1: f64,
        mass2: f64,
        length1: f64,
        length2: f64,
        damping: f64,
    ) -> Self {
        Self {
            gravity,
            mass1,
            mass2,
            length1,
            length2,
            damping,
        }
    }

    /// Rejects non-finite values, non-positive masses or lengths and negative damping.
    pub fn validate(&self) -> Result<(), SimError> {
        let checks = [
            ("gravity", self.gravity, false),
            ("mass1", self.mass1, true),
            ("mass2", self.mass2, true),
            ("length1", self.length1, true),
            ("length2", self.length2, true),
        ];
        for (name, value, positive) in checks {
            if !value.is_finite() {
                return Err(SimError::InvalidParameter {
                    name,
                    value,
                    reason: "must be finite",
                });
            }
            if positive && value <= 0.0 {
                return Err(SimError::InvalidParameter {
                    name,
                    value,
                    reason: "must be positive",
                });
            }
        }
        if !self.damping.is_finite() || self.damping < 0.0 {
            return Err(SimError::InvalidParameter {
                name: "damping",
                value: self.damping,
                reason: "must be finite and non-negative",
            });
        }
        Ok(())
    }

    /// Total rod length, the reach of the outer body.
    pub fn reach(&self) -> f64 {
        self.length1 + self.length2
    }

    /// Magnitude of potential energy between hanging straight down and straight up,
    /// used to put energy drift on a relative scale when the energy itself is near zero.
    pub fn energy_scale(&self) -> f64 {
        ((self.mass1 + self.mass2) * self.length1 + self.mass2 * self.length2) * self.gravity.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_valid() {
        assert!(SystemParameters::default().validate().is_ok());
    }

    #[test]
    fn zero_mass_is_rejected() {
        let params = SystemParameters {
            mass2: 0.0,
            ..Default::default()
        };
        let err = params.validate().unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { name: "mass2", .. }));
        assert!(err.is_malformed_input());
    }

    #[test]
    fn negative_length_and_nan_gravity_are_rejected() {
        let params = SystemParameters {
            length1: -1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = SystemParameters {
            gravity: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(SimError::InvalidParameter { name: "gravity", .. })
        ));
    }

    #[test]
    fn zero_damping_is_allowed_negative_is_not() {
        let mut params = SystemParameters::default();
        params.damping = 0.0;
        assert!(params.validate().is_ok());
        params.damping = -0.1;
        assert!(params.validate().is_err());
    }
}
