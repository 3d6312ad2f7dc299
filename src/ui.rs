// src/ui.rs
use crate::config::ServerConfig; // Server limits (max duration, request timeout)
use crate::equations::{derive_equations, Dimension}; // Cached equations of motion per dimensionality
use crate::error::{DerivationError, SimError}; // Core error taxonomy
use crate::expr::InitialConditions; // Text or numeric initial conditions
use crate::logic::{simulate_with, IntegrationOptions, Trajectory}; // Trajectory integrator
use crate::params::SystemParameters; // Physical parameters of one run
use actix_web::http::StatusCode; // Status codes for error mapping
use actix_web::{web, HttpResponse, ResponseError}; // Actix-web request/response types
use serde::{Deserialize, Serialize}; // Serde traits for JSON (de)serialization
use std::sync::atomic::{AtomicBool, Ordering}; // Cancellation flag shared with the worker
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Shared, read-only state handed to every request.
pub struct AppState {
    pub config: ServerConfig,
}

#[derive(Deserialize)]
pub struct SimParams {
    dimension: Dimension,                    // "2D" or "3D"
    #[serde(flatten)]
    parameters: SystemParameters,            // gravity, masses, lengths, damping
    duration: f64,                           // Total simulated time
    initial_conditions: InitialConditions,   // "pi/2, pi/2, 0, 0" or [1.57, 1.57, 0, 0]
}

#[derive(Serialize)]
struct SimResponse {
    success: bool,          // Always true here; failures use ErrorResponse
    trajectory: Trajectory, // Times, generalized states and Cartesian positions
    energy: Vec<f64>,       // Total mechanical energy per sample
    limit: f64,             // Plot half-extent for consistent scaling
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Everything the simulate endpoint can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error("simulation worker failed: {0}")]
    Worker(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Sim(err) if err.is_malformed_input() => StatusCode::BAD_REQUEST,
            ApiError::Sim(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Derivation(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: self.to_string(),
        })
    }
}

/// Raises the cancellation flag when dropped, so an abandoned request stops its worker.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Half-width of a square view that keeps both bodies in frame.
pub fn plot_limit(dimension: Dimension, parameters: &SystemParameters) -> f64 {
    match dimension {
        Dimension::Planar => parameters.reach() + 1.0,
        Dimension::Spherical => parameters.reach().max(4.5) + 1.0,
    }
}

pub async fn simulate_handler(
    state: web::Data<AppState>,
    params: web::Json<SimParams>,
) -> Result<HttpResponse, ApiError> {
    let request = params.into_inner();
    let config = &state.config;

    // Reject bad requests before anything expensive happens
    let initial = request.initial_conditions.resolve()?;
    if request.duration > config.max_duration {
        return Err(SimError::MalformedInput(format!(
            "duration {} exceeds the limit of {}",
            request.duration, config.max_duration
        ))
        .into());
    }

    let equations = derive_equations(request.dimension)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(cancel.clone());
    let options = IntegrationOptions {
        cancel: Some(cancel),
        deadline: config
            .request_timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs)),
        ..Default::default()
    };

    // Integration is CPU-bound: run it off the async workers
    let parameters = request.parameters;
    let duration = request.duration;
    let started = Instant::now();
    let trajectory = tokio::task::spawn_blocking(move || {
        simulate_with(&parameters, &initial, duration, equations, &options)
    })
    .await
    .map_err(|err| ApiError::Worker(err.to_string()))?
    .map_err(|err| {
        warn!(dimension = %request.dimension, %err, "simulation rejected");
        err
    })?;

    let energy = trajectory.energies(equations, &parameters);
    info!(
        dimension = %request.dimension,
        samples = trajectory.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "simulation finished"
    );

    Ok(HttpResponse::Ok().json(SimResponse {
        success: true,
        limit: plot_limit(request.dimension, &parameters),
        trajectory,
        energy,
    }))
}

pub async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

/// Registers the API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/simulate", web::post().to(simulate_handler))
        .route("/health", web::get().to(health_handler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{
        call_and_read_body, call_service, init_service, read_body_json, TestRequest,
    };
    use actix_web::App;
    use serde_json::{json, Value};

    fn app_state() -> web::Data<AppState> {
        web::Data::new(AppState {
            config: ServerConfig::default(),
        })
    }

    #[actix_web::test]
    async fn planar_request_returns_trajectory() {
        let app = init_service(App::new().app_data(app_state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/simulate")
            .set_json(json!({
                "dimension": "2D",
                "gravity": 9.81,
                "mass1": 1.0,
                "mass2": 1.0,
                "length1": 1.0,
                "length2": 1.0,
                "damping": 0.0,
                "duration": 0.5,
                "initial_conditions": "pi/4, 0, 0, 0"
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["trajectory"]["dimension"], "2D");
        assert_eq!(body["trajectory"]["times"].as_array().unwrap().len(), 51);
        assert_eq!(body["trajectory"]["positions"][0].as_array().unwrap().len(), 4);
        assert_eq!(body["energy"].as_array().unwrap().len(), 51);
        assert_eq!(body["limit"], 3.0);
    }

    #[actix_web::test]
    async fn spherical_request_with_numeric_initial_conditions() {
        let app = init_service(App::new().app_data(app_state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/simulate")
            .set_json(json!({
                "dimension": "3D",
                "gravity": 9.81,
                "mass1": 1.0,
                "mass2": 1.0,
                "length1": 1.0,
                "length2": 1.0,
                "damping": 0.2,
                "duration": 0.2,
                "initial_conditions": [0.5, 1.0, 0.0, 0.3, 0.0, 0.0, 0.5, 0.0]
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["trajectory"]["positions"][0].as_array().unwrap().len(), 6);
        assert_eq!(body["limit"], 5.5);
    }

    #[actix_web::test]
    async fn wrong_initial_condition_count_is_bad_request() {
        let app = init_service(App::new().app_data(app_state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/simulate")
            .set_json(json!({
                "dimension": "2D",
                "gravity": 9.81,
                "mass1": 1.0,
                "mass2": 1.0,
                "length1": 1.0,
                "length2": 1.0,
                "duration": 1.0,
                "initial_conditions": "0.1, 0.2, 0.3"
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("need 4 values, got 3"));
    }

    #[actix_web::test]
    async fn overlong_duration_is_refused() {
        let app = init_service(App::new().app_data(app_state()).configure(configure)).await;
        let req = TestRequest::post()
            .uri("/simulate")
            .set_json(json!({
                "dimension": "2D",
                "gravity": 9.81,
                "mass1": 1.0,
                "mass2": 1.0,
                "length1": 1.0,
                "length2": 1.0,
                "duration": 1e6,
                "initial_conditions": "0, 0, 0, 0"
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn health_check() {
        let app = init_service(App::new().configure(configure)).await;
        let req = TestRequest::get().uri("/health").to_request();
        let body = call_and_read_body(&app, req).await;
        assert_eq!(body, "ok");
    }

    #[test]
    fn error_status_mapping() {
        let malformed = ApiError::from(SimError::StateLength { expected: 4, actual: 3 });
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
        let failed = ApiError::from(SimError::IntegrationFailed {
            index: 10,
            time: 0.1,
            reason: "step size".into(),
        });
        assert_eq!(failed.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let timed_out = ApiError::from(SimError::TimedOut { index: 3 });
        assert_eq!(timed_out.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
