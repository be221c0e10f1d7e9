use argh::FromArgs;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use digit_infernum::{PredictRequest, PredictionResult};
use std::path::PathBuf;

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5000;

#[derive(FromArgs)]
/// Digit recognition client for sending drawings and listing models
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "predict" or "models"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Predict(PredictCommand),
    Models(ModelsCommand),
}

#[derive(FromArgs)]
/// Recognize the digit drawn in an image file
#[argh(subcommand, name = "predict")]
struct PredictCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// the model to use; the server default when omitted
    #[argh(option, short = 'm')]
    model: Option<String>,
}

#[derive(FromArgs)]
/// List the models known to the server
#[argh(subcommand, name = "models")]
struct ModelsCommand {}

fn mime_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    match args.command {
        ClientCommands::Predict(predict_command) => {
            let bytes = std::fs::read(&predict_command.image_path)?;
            let image = format!(
                "data:{};base64,{}",
                mime_for(&predict_command.image_path),
                STANDARD.encode(bytes)
            );

            let response = client
                .post(format!("http://{}/api/predict", addr))
                .json(&PredictRequest {
                    image: Some(image),
                    model: predict_command.model,
                })
                .send()
                .await?;

            if response.status().is_success() {
                let result = response.json::<PredictionResult>().await?;
                println!(
                    "Predicted digit: {} (confidence {:.3}, model {})",
                    result.predicted_digit, result.confidence, result.model_used
                );
                for p in &result.probabilities {
                    println!("  {}: {:.4}", p.digit, p.prob);
                }
            } else {
                let status = response.status();
                let result = response.json::<serde_json::Value>().await?;
                println!("Error {}: {}", status, serde_json::to_string_pretty(&result)?);
            }
        }
        ClientCommands::Models(_) => {
            let response = client
                .get(format!("http://{}/api/models", addr))
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            let models: Vec<messages::ModelInfo> =
                serde_json::from_value(result["models"].clone())?;
            println!("Default model: {}", result["default_model"]);
            for model in models {
                match (model.family, model.reason) {
                    (Some(family), _) => println!("  {} [{}] {}", model.key, model.status, family),
                    (None, Some(reason)) => {
                        println!("  {} [{}] {}", model.key, model.status, reason)
                    }
                    (None, None) => println!("  {} [{}]", model.key, model.status),
                }
            }
        }
    }

    Ok(())
}
