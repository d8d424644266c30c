use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::assembler::FeatureInput;
use crate::error::{AnticipationError, Result};
use crate::prediction::{rank_indices, ActionPrediction, ModelInfo, ModelSummary, PredictionResult, TOP_K};

/// 模型描述文件（JSON）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelDescriptor {
    /// 类别名称，下标即动作编号
    pub class_names: Vec<String>,
    /// 模型期望的输入形状
    pub input_shape: Vec<usize>,
    pub num_classes: usize,
    /// 训练时记录的准确率
    #[serde(default)]
    pub accuracy: f64,
}

impl ModelDescriptor {
    /// 从 JSON 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AnticipationError::FileNotFound(path.to_path_buf()),
            _ => AnticipationError::Io(e),
        })?;
        Self::from_json(&content, path)
    }

    fn from_json(content: &str, path: &Path) -> Result<Self> {
        let malformed = |reason: String| AnticipationError::MalformedDescriptor {
            path: path.to_path_buf(),
            reason,
        };

        let descriptor: Self = serde_json::from_str(content).map_err(|e| malformed(e.to_string()))?;

        if descriptor.input_shape.is_empty() || descriptor.input_shape.contains(&0) {
            return Err(malformed(format!("input_shape 无效: {:?}", descriptor.input_shape)));
        }
        if descriptor.num_classes == 0 {
            return Err(malformed("num_classes 必须大于 0".to_string()));
        }
        if descriptor.class_names.len() != descriptor.num_classes {
            return Err(malformed(format!(
                "class_names 数量 ({}) 与 num_classes ({}) 不一致",
                descriptor.class_names.len(),
                descriptor.num_classes
            )));
        }

        Ok(descriptor)
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            accuracy: self.accuracy,
            input_shape: self.input_shape.clone(),
            num_classes: self.num_classes,
        }
    }
}

/// 训练好的分类器：输入一个张量，返回第一个样本的置信度向量
///
/// 实现必须可以跨线程共享；运行时本身不可重入时，由实现内部加锁串行化，
/// 锁的范围仅限于该分类器。
pub trait Classifier: Send + Sync {
    fn classify(&self, input: &FeatureInput) -> Result<Vec<f32>>;
}

/// 推理引擎：一个已加载的分类器及其描述信息
pub struct InferenceEngine {
    descriptor: ModelDescriptor,
    classifier: Box<dyn Classifier>,
    model_path: PathBuf,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("descriptor", &self.descriptor)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

impl InferenceEngine {
    pub fn new(descriptor: ModelDescriptor, classifier: Box<dyn Classifier>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            classifier,
            model_path: model_path.into(),
        }
    }

    /// 从模型文件和描述文件加载 ONNX 模型
    #[cfg(feature = "onnx")]
    pub fn load(model_path: impl AsRef<Path>, info_path: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let descriptor = ModelDescriptor::from_file(info_path.as_ref())?;
        let classifier = crate::onnx::OnnxClassifier::load(model_path)?;

        tracing::info!("✅ [模型加载] 模型加载成功: {}", model_path.display());
        tracing::info!("  • 类别数: {}", descriptor.num_classes);
        tracing::info!("  • 输入形状: {:?}", descriptor.input_shape);
        tracing::info!("  • 准确率: {}%", descriptor.accuracy);

        Ok(Self::new(descriptor, Box::new(classifier), model_path))
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn accuracy(&self) -> f64 {
        self.descriptor.accuracy
    }

    pub fn class_names(&self) -> &[String] {
        &self.descriptor.class_names
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            class_names: self.descriptor.class_names.clone(),
            input_shape: self.descriptor.input_shape.clone(),
            num_classes: self.descriptor.num_classes,
            accuracy: self.descriptor.accuracy,
            model_path: self.model_path.to_string_lossy().to_string(),
        }
    }

    /// 把输入对齐到模型期望的形状
    ///
    /// 形状相同直接使用；只差一个大小为 1 的批次维度时自动补上或去掉；
    /// 其余情况返回 `ShapeMismatch`。
    fn conform(&self, input: &FeatureInput) -> Result<FeatureInput> {
        let expected = &self.descriptor.input_shape;
        let actual = input.shape();

        if actual == expected.as_slice() {
            return Ok(input.clone());
        }
        if expected.len() == actual.len() + 1 && expected[0] == 1 && &expected[1..] == actual {
            return Ok(input.reshaped(expected));
        }
        if actual.len() == expected.len() + 1 && actual[0] == 1 && &actual[1..] == expected.as_slice() {
            return Ok(input.reshaped(expected));
        }

        Err(AnticipationError::ShapeMismatch {
            expected: expected.clone(),
            actual: actual.to_vec(),
        })
    }

    /// 执行一次推理并排序
    pub fn predict(&self, input: &FeatureInput) -> Result<PredictionResult> {
        let input = self.conform(input)?;
        let scores = self.classifier.classify(&input)?;

        if scores.len() != self.descriptor.num_classes {
            return Err(AnticipationError::InferenceFailure(format!(
                "模型输出 {} 个置信度，期望 {} 个",
                scores.len(),
                self.descriptor.num_classes
            )));
        }

        let ranked = rank_indices(&scores);
        let top5_predictions: Vec<ActionPrediction> = ranked
            .iter()
            .take(TOP_K)
            .map(|&idx| ActionPrediction {
                action_id: idx,
                action_name: self.descriptor.class_names[idx].clone(),
                confidence: scores[idx],
            })
            .collect();

        let top_prediction = top5_predictions
            .first()
            .cloned()
            .ok_or_else(|| AnticipationError::InferenceFailure("模型没有输出任何类别".to_string()))?;
        debug!(
            "预测结果: {} ({:.4})",
            top_prediction.action_name, top_prediction.confidence
        );

        Ok(PredictionResult {
            top_prediction,
            top5_predictions,
            all_predictions: scores,
            model_info: self.descriptor.summary(),
        })
    }

    /// 依次预测多组输入，遇到第一个错误即返回
    pub fn predict_batch(&self, inputs: &[FeatureInput]) -> Result<Vec<PredictionResult>> {
        inputs.iter().map(|input| self.predict(input)).collect()
    }

    /// 用期望形状的全零输入跑一次推理，只验证模型可调用
    pub fn health_check(&self) -> bool {
        let input = FeatureInput::zeros(&self.descriptor.input_shape);
        match self.predict(&input) {
            Ok(_) => true,
            Err(e) => {
                warn!("⚠️  [健康检查] 模型 {} 健康检查失败: {}", self.model_path.display(), e);
                false
            }
        }
    }
}
