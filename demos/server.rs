use argh::FromArgs;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use digit_infernum::{
    CenteringMode, DEFAULT_MODEL_KEY, DebugImageWriter, DigitPipeline, ErrorRecord,
    PipelineConfig, PredictRequest, RegistryCell, RegistryConfig,
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};

mod messages;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MODELS_DIR: &str = "models";

// loaded once, before the first request is served
static REGISTRY: RegistryCell = RegistryCell::new();

#[derive(FromArgs)]
/// Serves handwritten digit recognition over HTTP.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// directory holding the model artifacts
    #[argh(option, short = 'm', default = "PathBuf::from(DEFAULT_MODELS_DIR)")]
    models_dir: PathBuf,

    /// model used when a request names none
    #[argh(option, default = "DEFAULT_MODEL_KEY.to_string()")]
    default_model: String,

    /// centering mode: "mass" or "geometric"
    #[argh(option, default = "CenteringMode::CenterOfMass")]
    centering: CenteringMode,

    /// write intermediate images to this directory
    #[argh(option)]
    debug_dir: Option<PathBuf>,
}

async fn post_predict(
    State(pipeline): State<Arc<DigitPipeline>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> impl IntoResponse {
    log::debug!("/api/predict called");

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            log::debug!("Rejected request body: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid or missing JSON" })),
            );
        }
    };

    // decoding and inference are CPU bound
    let outcome = tokio::task::spawn_blocking(move || pipeline.predict(&request)).await;

    match outcome {
        Ok(Ok(result)) => {
            log::info!(
                "Predicted {} with '{}'",
                result.predicted_digit,
                result.model_used
            );
            (StatusCode::OK, Json(json!(result)))
        }
        Ok(Err(e)) => {
            let status = if e.is_client_error() {
                log::info!("Rejected prediction request ({}): {}", e.kind(), e);
                StatusCode::BAD_REQUEST
            } else {
                log::error!("Prediction failed ({}): {}", e.kind(), e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(json!(ErrorRecord::from(&e))))
        }
        Err(e) => {
            log::error!("Prediction task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Prediction task failed" })),
            )
        }
    }
}

async fn get_models(State(pipeline): State<Arc<DigitPipeline>>) -> impl IntoResponse {
    let models = messages::ModelInfo::list(pipeline.registry());
    Json(json!({
        "default_model": pipeline.config().default_model,
        "models": models,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let registry = REGISTRY.get_or_load(&RegistryConfig::standard(&args.models_dir));
    if registry.ready_keys().is_empty() {
        log::warn!("No model loaded from {:?}; every prediction will fail", args.models_dir);
    }

    let config = PipelineConfig::default()
        .with_centering(args.centering)
        .with_default_model(args.default_model);
    log::info!("Centering mode: {}", config.centering.as_str());

    let mut pipeline = DigitPipeline::new(registry, config);
    if let Some(dir) = args.debug_dir {
        log::info!("Writing debug images to {:?}", dir);
        pipeline = pipeline.with_observer(Arc::new(DebugImageWriter::new(dir)));
    }

    let app = Router::new()
        .route("/", get(|| async { "Server Status: Running" }))
        .route("/api/models", get(get_models))
        .route("/api/predict", post(post_predict))
        .with_state(Arc::new(pipeline));

    log::info!("Starting the server");
    log::info!("Listening on: {}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
