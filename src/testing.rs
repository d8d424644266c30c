//! 单元测试共用的假模型和内存帧来源

use image::DynamicImage;

use crate::assembler::FeatureInput;
use crate::error::{AnticipationError, Result};
use crate::model::{Classifier, InferenceEngine, ModelDescriptor};
use crate::video_processor::{FrameSource, VideoInfo};

/// 不论输入是什么都返回同一组置信度
pub(crate) struct FixedClassifier {
    scores: Vec<f32>,
}

impl FixedClassifier {
    pub(crate) fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _input: &FeatureInput) -> Result<Vec<f32>> {
        Ok(self.scores.clone())
    }
}

/// 每次调用都失败
pub(crate) struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn classify(&self, _input: &FeatureInput) -> Result<Vec<f32>> {
        Err(AnticipationError::InferenceFailure("runtime exploded".to_string()))
    }
}

pub(crate) fn descriptor(num_classes: usize, shape: &[usize]) -> ModelDescriptor {
    ModelDescriptor {
        class_names: (0..num_classes).map(|i| format!("action_{}", i)).collect(),
        input_shape: shape.to_vec(),
        num_classes,
        accuracy: 0.0,
    }
}

pub(crate) fn engine(scores: Vec<f32>, shape: &[usize]) -> InferenceEngine {
    InferenceEngine::new(
        descriptor(scores.len(), shape),
        Box::new(FixedClassifier::new(scores)),
        "fixed.onnx",
    )
}

pub(crate) fn engine_with_accuracy(accuracy: f64) -> InferenceEngine {
    let mut descriptor = descriptor(3, &[1, 10, 2048]);
    descriptor.accuracy = accuracy;
    InferenceEngine::new(
        descriptor,
        Box::new(FixedClassifier::new(vec![0.2, 0.5, 0.3])),
        "fixed.onnx",
    )
}

/// 内存中的帧来源，`None` 表示该帧解码失败
pub(crate) struct MemoryFrameSource {
    frames: Vec<Option<DynamicImage>>,
    fps: f64,
    pub(crate) reads: Vec<usize>,
}

impl MemoryFrameSource {
    pub(crate) fn new(frames: Vec<Option<DynamicImage>>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            reads: Vec::new(),
        }
    }

    /// `count` 帧纯色画面，灰度值依次递增
    pub(crate) fn solid(count: usize, fps: f64) -> Self {
        let frames = (0..count)
            .map(|i| Some(solid_frame((i % 256) as u8)))
            .collect();
        Self::new(frames, fps)
    }
}

impl FrameSource for MemoryFrameSource {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            frame_count: self.frames.len(),
            fps: self.fps,
            width: 32,
            height: 24,
        }
    }

    fn read_frame(&mut self, index: usize) -> Option<DynamicImage> {
        self.reads.push(index);
        self.frames.get(index).cloned().flatten()
    }
}

pub(crate) fn solid_frame(value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(image::RgbImage::from_pixel(32, 24, image::Rgb([value, value, value])))
}
