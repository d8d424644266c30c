//! ONNX Runtime 分类器后端

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::assembler::FeatureInput;
use crate::error::{AnticipationError, Result};
use crate::model::Classifier;

/// 基于 ONNX Runtime 的分类器
///
/// `Session::run` 需要可变借用，每个分类器持有自己的会话锁，
/// 不同模型之间互不阻塞。
pub struct OnnxClassifier {
    session: Mutex<Session>,
    output_name: String,
    path: PathBuf,
}

impl OnnxClassifier {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(AnticipationError::FileNotFound(path));
        }

        let load_failed = |reason: String| AnticipationError::ModelLoadFailed {
            path: path.clone(),
            reason,
        };

        let session = Session::builder()
            .map_err(|e| load_failed(format!("创建会话构建器失败: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_failed(format!("设置优化级别失败: {}", e)))?
            .commit_from_file(&path)
            .map_err(|e| load_failed(format!("加载 ONNX 模型失败: {}", e)))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| load_failed("模型没有输出".to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, input: &FeatureInput) -> Result<Vec<f32>> {
        let array = ArrayD::from_shape_vec(IxDyn(input.shape()), input.data().to_vec())
            .map_err(|e| AnticipationError::InferenceFailure(format!("构建输入张量失败: {}", e)))?;
        let tensor = ort::value::Tensor::from_array(array)
            .map_err(|e| AnticipationError::InferenceFailure(format!("构建输入张量失败: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AnticipationError::InferenceFailure("获取会话锁失败".to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| AnticipationError::InferenceFailure(e.to_string()))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| AnticipationError::InferenceFailure(format!("未找到输出 '{}'", self.output_name)))?;

        let scores = output
            .try_extract_array::<f32>()
            .map_err(|e| AnticipationError::InferenceFailure(format!("读取输出张量失败: {}", e)))?;

        first_row(scores.view())
    }
}

/// 只取第一个样本的输出；批次维度为空时报错
fn first_row(scores: ArrayViewD<'_, f32>) -> Result<Vec<f32>> {
    if scores.ndim() < 2 {
        return Ok(scores.iter().copied().collect());
    }
    if scores.len_of(Axis(0)) == 0 {
        return Err(AnticipationError::InferenceFailure("模型输出为空".to_string()));
    }
    Ok(scores.index_axis(Axis(0), 0).iter().copied().collect())
}
