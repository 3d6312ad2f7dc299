//! Damped double pendulum in the plane and in space.
//!
//! The equations of motion come from the Lagrangian with a Rayleigh dissipation term and are
//! checked into [`model2d`] and [`model3d`] in closed form. [`equations`] owns the
//! once-only derivation cache, [`logic`] integrates a trajectory on a uniform time grid and
//! [`kinematics`] turns angles into body positions. [`ui`] exposes the whole pipeline over
//! HTTP.

pub mod config;
pub mod equations;
pub mod error;
pub mod expr;
pub mod kinematics;
pub mod logic;
pub mod math;
pub mod model2d;
pub mod model3d;
pub mod params;
pub mod ui;

pub use config::{ScenarioConfig, ServerConfig};
pub use equations::{
    derive_equations, derive_equations_2d, derive_equations_3d, Dimension, EquationsOfMotion,
};
pub use error::{DerivationError, ModelError, SimError};
pub use expr::{parse_initial_conditions, InitialConditions};
pub use logic::{
    simulate, simulate_with, IntegrationOptions, Method, Trajectory, GRID_STEP, MAX_SAMPLES,
};
pub use model2d::Planar;
pub use model3d::Spherical;
pub use params::SystemParameters;
