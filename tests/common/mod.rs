#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use digit_infernum::{
    DigitPipeline, ModelRegistry, NormalizedTensor, PipelineConfig, RegistryConfig,
};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

pub fn png_data_url(image: GrayImage) -> String {
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

fn fill(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Luma([255]));
        }
    }
}

/// White "7" on a black 200x200 canvas: a top bar and a slanted stem.
pub fn seven() -> GrayImage {
    let mut img = GrayImage::new(200, 200);
    fill(&mut img, 50, 40, 150, 54);
    for step in 0..120u32 {
        let y = 54 + step;
        let x = 150 - step / 2;
        fill(&mut img, x - 12, y, x, y + 1);
    }
    img
}

/// White "1" on a black 200x200 canvas: a single vertical bar.
pub fn one() -> GrayImage {
    let mut img = GrayImage::new(200, 200);
    fill(&mut img, 94, 30, 108, 172);
    img
}

/// Normalized tensor of a drawing, as the default pipeline produces it.
pub fn tensor_of(image: GrayImage) -> NormalizedTensor {
    let registry = Arc::new(ModelRegistry::builder().build());
    DigitPipeline::new(registry, PipelineConfig::default())
        .prepare(&png_data_url(image))
        .expect("prepare drawing")
}

/// Unit-length copy of a tensor, used as a template-matching weight row.
pub fn unit(tensor: &NormalizedTensor) -> Vec<f32> {
    let norm = tensor.as_slice().iter().map(|v| v * v).sum::<f32>().sqrt();
    tensor.as_slice().iter().map(|v| 10.0 * v / norm).collect()
}

/// Writes a logistic regression that matches the "7" and "1" templates.
pub fn write_template_logistic(dir: &Path) {
    let mut coef = vec![vec![0.0f32; 784]; 10];
    coef[7] = unit(&tensor_of(seven()));
    coef[1] = unit(&tensor_of(one()));
    let artifact = serde_json::json!({ "coef": coef, "intercept": vec![0.0f32; 10] });
    std::fs::write(dir.join("LogisticRegression.json"), artifact.to_string())
        .expect("write logistic regression");
}

/// Writes a one-layer softmax network over a 28x28 input with the same templates.
pub fn write_template_network(dir: &Path) {
    let seven = unit(&tensor_of(seven()));
    let one = unit(&tensor_of(one()));
    let weights: Vec<Vec<f32>> = (0..784)
        .map(|i| {
            let mut row = vec![0.0f32; 10];
            row[7] = seven[i];
            row[1] = one[i];
            row
        })
        .collect();
    let artifact = serde_json::json!({
        "input_shape": [28, 28],
        "layers": [{ "weights": weights, "bias": vec![0.0f32; 10], "activation": "softmax" }],
    });
    std::fs::write(dir.join("NeuralNetwork.json"), artifact.to_string())
        .expect("write network");
}

/// Writes a single-stump forest splitting on a pixel lit in "7" but dark in "1".
pub fn write_template_forest(dir: &Path) {
    let seven = tensor_of(seven());
    let one = tensor_of(one());
    let feature = seven
        .as_slice()
        .iter()
        .zip(one.as_slice())
        .position(|(s, o)| *s > 0.5 && *o == 0.0)
        .expect("a pixel separating the templates");

    let mut dark = vec![0.0f32; 10];
    dark[1] = 3.0;
    let mut lit = vec![0.0f32; 10];
    lit[7] = 3.0;
    let artifact = serde_json::json!({
        "n_classes": 10,
        "trees": [{
            "children_left": [1, -1, -1],
            "children_right": [2, -1, -1],
            "feature": [feature, -2, -2],
            "threshold": [0.5, -2.0, -2.0],
            "value": [vec![1.0f32; 10], dark, lit],
        }],
    });
    std::fs::write(dir.join("RandomForest.json"), artifact.to_string())
        .expect("write forest");
}

pub fn pipeline_for(dir: &Path, config: PipelineConfig) -> DigitPipeline {
    let registry = ModelRegistry::load(&RegistryConfig::standard(dir));
    DigitPipeline::new(Arc::new(registry), config)
}
