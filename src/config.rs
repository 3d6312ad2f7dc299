//! Configuration types loaded from YAML.
//!
//! Two documents are understood:
//!
//! - [`ServerConfig`]   – where the HTTP service listens and how long a request may run
//! - [`ScenarioConfig`] – one headless simulation run
//!
//! # YAML format
//! A server file (every key optional):
//!
//! ```yaml
//! bind: "127.0.0.1"
//! port: 8080
//! static_dir: "static"      # optional front-end mount
//! max_duration: 120.0       # longest simulated time accepted per request
//! request_timeout_secs: 30  # wall-clock budget per integration
//! ```
//!
//! A scenario file:
//!
//! ```yaml
//! dimension: "2D"           # or "3D"
//! parameters:
//!   gravity: 9.81
//!   mass1: 1.0
//!   mass2: 1.0
//!   length1: 1.0
//!   length2: 1.0
//!   damping: 0.0
//! initial_conditions: "pi/2, pi/2, 0, 0"   # or a list of numbers
//! duration: 10.0
//! ```

use crate::equations::Dimension;
use crate::expr::InitialConditions;
use crate::params::SystemParameters;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// HTTP service settings.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory served under `/` for the presentation layer, if any.
    pub static_dir: Option<PathBuf>,
    /// Requests asking for more simulated time than this are refused.
    pub max_duration: f64,
    /// Wall-clock limit for one integration; `None` runs to completion.
    pub request_timeout_secs: Option<f64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: None,
            max_duration: 120.0,
            request_timeout_secs: Some(30.0),
        }
    }
}

/// One headless run.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub dimension: Dimension,
    #[serde(default)]
    pub parameters: SystemParameters,
    pub initial_conditions: InitialConditions,
    pub duration: f64,
    /// Overrides the dimension's default integration tolerance.
    #[serde(default)]
    pub tolerance: Option<f64>,
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_yaml(path)
    }
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_yaml(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server_document_uses_defaults() {
        let cfg: ServerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn partial_server_document() {
        let cfg: ServerConfig = serde_yaml::from_str("port: 9000\nstatic_dir: web\n").unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.static_dir, Some(PathBuf::from("web")));
        assert_eq!(cfg.bind, "127.0.0.1");
    }

    #[test]
    fn scenario_with_expression_initial_conditions() {
        let yaml = r#"
dimension: "3D"
parameters:
  gravity: 9.81
  mass1: 1.0
  mass2: 2.0
  length1: 1.0
  length2: 0.5
  damping: 0.1
initial_conditions: "pi/3, pi/4, 0, pi/2, 0, 0, 1, 0"
duration: 5.0
"#;
        let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.dimension, Dimension::Spherical);
        assert_eq!(cfg.parameters.mass2, 2.0);
        assert_eq!(cfg.initial_conditions.resolve().unwrap().len(), 8);
        assert_eq!(cfg.tolerance, None);
    }

    #[test]
    fn scenario_with_numeric_list_and_default_parameters() {
        let yaml = "dimension: 2D\ninitial_conditions: [0.1, 0.2, 0.0, 0.0]\nduration: 1.0\n";
        let cfg: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.parameters, SystemParameters::default());
        assert_eq!(
            cfg.initial_conditions,
            InitialConditions::Values(vec![0.1, 0.2, 0.0, 0.0])
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ServerConfig::load(Path::new("/nonexistent/server.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
