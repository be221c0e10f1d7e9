//! Concrete model families and their on-disk JSON artifacts.
//!
//! Artifacts are exported by the (external) training side. Every constructor
//! validates dimensions up front so inference never has to.

use crate::error::{InfernumError, ModelLoadError};
use crate::model::{ClassicalClassifier, NUM_CLASSES, NeuralClassifier};
use crate::tensor::TENSOR_LEN;
use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

fn matrix_from_rows(rows: Vec<Vec<f32>>, what: &str) -> Result<Array2<f32>, ModelLoadError> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if nrows == 0 || ncols == 0 {
        return Err(ModelLoadError::Invalid(format!("{what} is empty")));
    }
    if rows.iter().any(|row| row.len() != ncols) {
        return Err(ModelLoadError::Invalid(format!("{what} rows differ in length")));
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| ModelLoadError::Invalid(format!("{what}: {e}")))
}

fn check_features(features: &ArrayView2<'_, f32>, expected: usize) -> Result<(), InfernumError> {
    if features.ncols() != expected {
        return Err(InfernumError::Shape {
            expected: vec![features.nrows(), expected],
            actual: features.shape().to_vec(),
        });
    }
    Ok(())
}

/// Row-wise numerically stable softmax.
fn softmax_rows(mut scores: Array2<f32>) -> Array2<f32> {
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    scores
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegressionArtifact {
    /// One row of feature weights per class.
    pub coef: Vec<Vec<f32>>,
    pub intercept: Vec<f32>,
}

/// Multinomial logistic regression: softmax of `X · coefᵀ + intercept`.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    coef: Array2<f32>,
    intercept: Array1<f32>,
}

impl LogisticRegression {
    pub fn new(coef: Array2<f32>, intercept: Array1<f32>) -> Result<Self, ModelLoadError> {
        if coef.dim() != (NUM_CLASSES, TENSOR_LEN) {
            return Err(ModelLoadError::Invalid(format!(
                "logistic regression coef must be {NUM_CLASSES}x{TENSOR_LEN}, got {:?}",
                coef.dim()
            )));
        }
        if intercept.len() != NUM_CLASSES {
            return Err(ModelLoadError::Invalid(format!(
                "logistic regression intercept must have {NUM_CLASSES} entries, got {}",
                intercept.len()
            )));
        }
        Ok(Self { coef, intercept })
    }

    pub fn from_artifact(artifact: LogisticRegressionArtifact) -> Result<Self, ModelLoadError> {
        let coef = matrix_from_rows(artifact.coef, "coef")?;
        Self::new(coef, Array1::from(artifact.intercept))
    }
}

impl ClassicalClassifier for LogisticRegression {
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, InfernumError> {
        check_features(&features, self.coef.ncols())?;
        let logits = features.dot(&self.coef.t()) + &self.intercept;
        Ok(softmax_rows(logits))
    }
}

/// One decision tree in flat-array layout.
///
/// Node `i` is a leaf when `children_left[i] == -1`; otherwise samples with
/// `x[feature[i]] <= threshold[i]` go left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f32>,
    /// Per-node class counts or fractions.
    pub value: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestArtifact {
    pub n_classes: usize,
    pub trees: Vec<TreeArtifact>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: usize,
    },
}

#[derive(Debug, Clone)]
struct DecisionTree {
    nodes: Vec<Node>,
    /// Normalized class distribution of each leaf, indexed by `Node::Leaf`.
    leaves: Array2<f32>,
}

impl DecisionTree {
    fn from_artifact(tree: TreeArtifact, index: usize) -> Result<Self, ModelLoadError> {
        let invalid = |msg: String| ModelLoadError::Invalid(format!("tree {index}: {msg}"));
        let n = tree.children_left.len();
        if n == 0 {
            return Err(invalid("has no nodes".to_string()));
        }
        if [
            tree.children_right.len(),
            tree.feature.len(),
            tree.threshold.len(),
            tree.value.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(invalid("node arrays differ in length".to_string()));
        }

        let mut nodes = Vec::with_capacity(n);
        let mut leaves = Vec::new();
        for i in 0..n {
            let (left, right) = (tree.children_left[i], tree.children_right[i]);
            if left == -1 {
                let counts = &tree.value[i];
                if counts.len() != NUM_CLASSES {
                    return Err(invalid(format!(
                        "leaf {i} has {} classes, expected {NUM_CLASSES}",
                        counts.len()
                    )));
                }
                let total: f32 = counts.iter().sum();
                if total <= 0.0 || counts.iter().any(|&c| c < 0.0) {
                    return Err(invalid(format!("leaf {i} has no samples")));
                }
                nodes.push(Node::Leaf {
                    distribution: leaves.len(),
                });
                leaves.push(counts.iter().map(|c| c / total).collect::<Vec<_>>());
                continue;
            }

            // Children always follow their parent, which also rules out cycles.
            let in_range = |child: i64| child > i as i64 && (child as usize) < n;
            if !in_range(left) || !in_range(right) {
                return Err(invalid(format!("node {i} has out-of-range children")));
            }
            let feature = tree.feature[i];
            if feature < 0 || feature as usize >= TENSOR_LEN {
                return Err(invalid(format!("node {i} splits on feature {feature}")));
            }
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: tree.threshold[i],
                left: left as usize,
                right: right as usize,
            });
        }

        Ok(Self {
            nodes,
            leaves: matrix_from_rows(leaves, "leaf distributions")?,
        })
    }

    fn leaf_for(&self, row: &[f32]) -> usize {
        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => node = if row[feature] <= threshold { left } else { right },
            }
        }
    }
}

/// Ensemble of decision trees; probabilities are the mean leaf distribution.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn from_artifact(artifact: RandomForestArtifact) -> Result<Self, ModelLoadError> {
        if artifact.n_classes != NUM_CLASSES {
            return Err(ModelLoadError::Invalid(format!(
                "random forest has {} classes, expected {NUM_CLASSES}",
                artifact.n_classes
            )));
        }
        if artifact.trees.is_empty() {
            return Err(ModelLoadError::Invalid("random forest has no trees".to_string()));
        }
        let trees = artifact
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| DecisionTree::from_artifact(tree, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { trees })
    }
}

impl ClassicalClassifier for RandomForest {
    fn predict_proba(&self, features: ArrayView2<'_, f32>) -> Result<Array2<f32>, InfernumError> {
        check_features(&features, TENSOR_LEN)?;
        let mut out = Array2::zeros((features.nrows(), NUM_CLASSES));
        for (row, mut probs) in features.outer_iter().zip(out.outer_iter_mut()) {
            let row = row.to_vec();
            for tree in &self.trees {
                probs += &tree.leaves.row(tree.leaf_for(&row));
            }
            probs /= self.trees.len() as f32;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Softmax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseArtifact {
    /// `inputs x outputs` weight matrix.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpArtifact {
    /// Per-sample input shape the network was trained on.
    pub input_shape: Vec<usize>,
    pub layers: Vec<DenseArtifact>,
}

#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl Dense {
    fn forward(&self, x: Array2<f32>) -> Array2<f32> {
        let z = x.dot(&self.weights) + &self.bias;
        match self.activation {
            Activation::Linear => z,
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Softmax => softmax_rows(z),
        }
    }
}

/// Fully connected network: a flatten step followed by dense layers.
#[derive(Debug, Clone)]
pub struct Mlp {
    input_shape: Vec<usize>,
    layers: Vec<Dense>,
}

impl Mlp {
    pub fn from_artifact(artifact: MlpArtifact) -> Result<Self, ModelLoadError> {
        let features: usize = artifact.input_shape.iter().product();
        if artifact.input_shape.is_empty() || features != TENSOR_LEN {
            return Err(ModelLoadError::Invalid(format!(
                "network input shape {:?} does not hold {TENSOR_LEN} values",
                artifact.input_shape
            )));
        }
        if artifact.layers.is_empty() {
            return Err(ModelLoadError::Invalid("network has no layers".to_string()));
        }

        let mut width = features;
        let mut layers = Vec::with_capacity(artifact.layers.len());
        for (i, layer) in artifact.layers.into_iter().enumerate() {
            let weights = matrix_from_rows(layer.weights, &format!("layer {i} weights"))?;
            if weights.nrows() != width {
                return Err(ModelLoadError::Invalid(format!(
                    "layer {i} expects {} inputs, previous layer yields {width}",
                    weights.nrows()
                )));
            }
            if layer.bias.len() != weights.ncols() {
                return Err(ModelLoadError::Invalid(format!(
                    "layer {i} bias has {} entries for {} outputs",
                    layer.bias.len(),
                    weights.ncols()
                )));
            }
            width = weights.ncols();
            layers.push(Dense {
                weights,
                bias: Array1::from(layer.bias),
                activation: layer.activation,
            });
        }
        if width != NUM_CLASSES {
            return Err(ModelLoadError::Invalid(format!(
                "network yields {width} outputs, expected {NUM_CLASSES}"
            )));
        }
        // Only a softmax head yields a probability distribution.
        match layers.last().map(|layer| layer.activation) {
            Some(Activation::Softmax) | None => {}
            Some(head) => {
                return Err(ModelLoadError::Invalid(format!(
                    "network head uses {head:?} activation, expected softmax"
                )));
            }
        }

        Ok(Self {
            input_shape: artifact.input_shape,
            layers,
        })
    }
}

impl NeuralClassifier for Mlp {
    fn input_shape(&self) -> Vec<usize> {
        self.input_shape.clone()
    }

    fn predict(&self, input: ArrayViewD<'_, f32>) -> Result<Array2<f32>, InfernumError> {
        let shape = input.shape();
        if shape.len() != self.input_shape.len() + 1 || shape[1..] != self.input_shape[..] {
            let mut expected = vec![shape.first().copied().unwrap_or(1)];
            expected.extend(&self.input_shape);
            return Err(InfernumError::Shape {
                expected,
                actual: shape.to_vec(),
            });
        }

        let batch = shape[0];
        let flat: Vec<f32> = input.iter().copied().collect();
        let x = Array2::from_shape_vec((batch, TENSOR_LEN), flat)
            .map_err(|e| InfernumError::Inference(e.to_string()))?;
        Ok(self.layers.iter().fold(x, |x, layer| layer.forward(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn lr_artifact() -> LogisticRegressionArtifact {
        LogisticRegressionArtifact {
            coef: vec![vec![0.0; TENSOR_LEN]; NUM_CLASSES],
            intercept: vec![0.0; NUM_CLASSES],
        }
    }

    fn stump(feature: i64, low_class: usize, high_class: usize) -> TreeArtifact {
        let mut low = vec![0.0; NUM_CLASSES];
        low[low_class] = 4.0;
        let mut high = vec![0.0; NUM_CLASSES];
        high[high_class] = 2.0;
        TreeArtifact {
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            feature: vec![feature, -2, -2],
            threshold: vec![0.5, -2.0, -2.0],
            value: vec![vec![1.0; NUM_CLASSES], low, high],
        }
    }

    #[test]
    fn logistic_regression_is_softmax_of_logits() {
        let mut artifact = lr_artifact();
        artifact.coef[7][0] = 2.0;
        artifact.intercept[1] = 1.0;
        let model = LogisticRegression::from_artifact(artifact).unwrap();

        let mut x = Array2::zeros((2, TENSOR_LEN));
        x[[0, 0]] = 1.0;
        let probs = model.predict_proba(x.view()).unwrap();

        for row in probs.outer_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        // Row 0: logits 2 (class 7), 1 (class 1), 0 elsewhere.
        let denom = 2f32.exp() + 1f32.exp() + 8.0;
        assert!((probs[[0, 7]] - 2f32.exp() / denom).abs() < 1e-5);
        assert!((probs[[0, 1]] - 1f32.exp() / denom).abs() < 1e-5);
        // Row 1: only the intercept matters.
        assert!(probs[[1, 1]] > probs[[1, 7]]);
    }

    #[test]
    fn logistic_regression_rejects_bad_dimensions() {
        let mut artifact = lr_artifact();
        artifact.intercept.pop();
        assert!(LogisticRegression::from_artifact(artifact).is_err());

        let mut artifact = lr_artifact();
        artifact.coef[3].push(0.0);
        assert!(LogisticRegression::from_artifact(artifact).is_err());
    }

    #[test]
    fn random_forest_averages_leaf_distributions() {
        let forest = RandomForest::from_artifact(RandomForestArtifact {
            n_classes: NUM_CLASSES,
            trees: vec![stump(0, 1, 7), stump(1, 1, 4)],
        })
        .unwrap();

        let mut x = Array2::zeros((1, TENSOR_LEN));
        x[[0, 0]] = 1.0;
        let probs = forest.predict_proba(x.view()).unwrap();

        // First tree goes right (class 7), second goes left (class 1).
        assert!((probs[[0, 7]] - 0.5).abs() < 1e-6);
        assert!((probs[[0, 1]] - 0.5).abs() < 1e-6);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn random_forest_rejects_cyclic_trees() {
        let mut tree = stump(0, 1, 7);
        tree.children_left[0] = 0;
        let result = RandomForest::from_artifact(RandomForestArtifact {
            n_classes: NUM_CLASSES,
            trees: vec![tree],
        });
        assert!(matches!(result, Err(ModelLoadError::Invalid(_))));
    }

    #[test]
    fn random_forest_rejects_out_of_range_features() {
        let result = RandomForest::from_artifact(RandomForestArtifact {
            n_classes: NUM_CLASSES,
            trees: vec![stump(TENSOR_LEN as i64, 1, 7)],
        });
        assert!(result.is_err());
    }

    fn mlp_artifact(input_shape: Vec<usize>) -> MlpArtifact {
        let mut hidden = vec![vec![0.0; 2]; TENSOR_LEN];
        hidden[0][0] = 1.0;
        hidden[1][1] = 1.0;
        let mut head = vec![vec![0.0; NUM_CLASSES]; 2];
        head[0][5] = 4.0;
        head[1][2] = 4.0;
        MlpArtifact {
            input_shape,
            layers: vec![
                DenseArtifact {
                    weights: hidden,
                    bias: vec![0.0, 0.0],
                    activation: Activation::Relu,
                },
                DenseArtifact {
                    weights: head,
                    bias: vec![0.0; NUM_CLASSES],
                    activation: Activation::Softmax,
                },
            ],
        }
    }

    #[test]
    fn mlp_flattens_grid_input() {
        let mlp = Mlp::from_artifact(mlp_artifact(vec![28, 28])).unwrap();
        assert_eq!(mlp.input_shape(), vec![28, 28]);

        let mut input = ArrayD::zeros(IxDyn(&[1, 28, 28]));
        input[&[0, 0, 1][..]] = 1.0;
        let probs = mlp.predict(input.view()).unwrap();

        assert_eq!(probs.dim(), (1, NUM_CLASSES));
        assert!((probs.sum() - 1.0).abs() < 1e-5);
        let best = probs
            .row(0)
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |b, (i, &p)| if p > b.1 { (i, p) } else { b });
        assert_eq!(best.0, 2);
    }

    #[test]
    fn mlp_rejects_mismatched_input() {
        let mlp = Mlp::from_artifact(mlp_artifact(vec![784])).unwrap();
        let input = ArrayD::zeros(IxDyn(&[1, 28, 28]));
        assert!(matches!(
            mlp.predict(input.view()),
            Err(InfernumError::Shape { .. })
        ));
    }

    #[test]
    fn mlp_validates_layer_chain() {
        assert!(Mlp::from_artifact(mlp_artifact(vec![27, 28])).is_err());

        let mut artifact = mlp_artifact(vec![784]);
        artifact.layers[1].weights.push(vec![0.0; NUM_CLASSES]);
        assert!(Mlp::from_artifact(artifact).is_err());

        let mut artifact = mlp_artifact(vec![784]);
        artifact.layers[1].bias.pop();
        assert!(Mlp::from_artifact(artifact).is_err());

        for head in [Activation::Linear, Activation::Relu, Activation::Sigmoid] {
            let mut artifact = mlp_artifact(vec![784]);
            artifact.layers[1].activation = head;
            assert!(matches!(
                Mlp::from_artifact(artifact),
                Err(ModelLoadError::Invalid(ref msg)) if msg.contains("softmax")
            ));
        }
    }

    #[test]
    fn parses_artifact_json() {
        let json = r#"{
            "input_shape": [784],
            "layers": [{ "weights": [[1.0]], "bias": [0.0], "activation": "relu" }]
        }"#;
        let artifact: MlpArtifact = serde_json::from_str(json).unwrap();
        assert_eq!(artifact.layers[0].activation, Activation::Relu);
        // A 1x1 first layer cannot consume 784 features.
        assert!(Mlp::from_artifact(artifact).is_err());
    }
}
