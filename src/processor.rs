use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::assembler::{FeatureMatrix, TemporalAssembler};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::FeatureSynthesizer;
use crate::model::InferenceEngine;
use crate::prediction::PredictionResult;
use crate::preprocess::FramePreprocessor;
use crate::sampler::TemporalSampler;
use crate::video_processor::{FfmpegFrameSource, FrameSource};

/// 视频特征提取器：采样 → 预处理 → 合成特征 → 组装矩阵
#[derive(Debug, Clone, Copy)]
pub struct VideoFeatureExtractor {
    sampler: TemporalSampler,
    preprocessor: FramePreprocessor,
    synthesizer: FeatureSynthesizer,
    assembler: TemporalAssembler,
}

impl Default for VideoFeatureExtractor {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

impl VideoFeatureExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sampler: TemporalSampler::new(config.target_frames),
            preprocessor: FramePreprocessor::default(),
            synthesizer: FeatureSynthesizer::new(config.feature_dim),
            assembler: TemporalAssembler::new(config.target_frames, config.feature_dim),
        }
    }

    /// 在整段视频上均匀采样
    pub fn extract_from_source<S: FrameSource + ?Sized>(&self, source: &mut S) -> FeatureMatrix {
        let frame_count = source.info().frame_count;
        self.extract_range(source, 0, frame_count)
    }

    /// 在 `[start, start + duration)` 秒的时间窗口内采样
    ///
    /// 结束帧号不超过视频总帧数。
    pub fn extract_segment<S: FrameSource + ?Sized>(&self, source: &mut S, start: f64, duration: f64) -> FeatureMatrix {
        let info = source.info();
        let start_frame = (start * info.fps).floor().max(0.0) as usize;
        let end_frame = (((start + duration) * info.fps).floor().max(0.0) as usize).min(info.frame_count);
        self.extract_range(source, start_frame, end_frame)
    }

    fn extract_range<S: FrameSource + ?Sized>(&self, source: &mut S, start_frame: usize, end_frame: usize) -> FeatureMatrix {
        let indices = self.sampler.sample(start_frame, end_frame);

        let mut vectors = Vec::with_capacity(indices.len());
        for &index in &indices {
            match source.read_frame(index) {
                Some(image) => {
                    let frame = self.preprocessor.process(&image);
                    vectors.push(self.synthesizer.synthesize(&frame));
                }
                None => debug!("读取帧 {} 失败，跳过", index),
            }
        }

        debug!(
            "帧区间 [{}, {}): 采样 {} 帧，成功 {} 帧",
            start_frame,
            end_frame,
            indices.len(),
            vectors.len()
        );

        self.assembler.assemble(vectors)
    }

    /// 打开视频文件并在整段视频上提取特征，视频句柄在返回前释放
    pub fn extract_from_video(&self, path: impl AsRef<Path>) -> Result<FeatureMatrix> {
        let path = path.as_ref();
        let start = Instant::now();
        info!("⏳ [特征提取] 开始提取: {}", path.display());

        let mut source = FfmpegFrameSource::open(path)?;
        let matrix = self.extract_from_source(&mut source);

        info!(
            "✅ [特征提取] 提取完成，耗时: {:.2}秒",
            start.elapsed().as_secs_f64()
        );
        Ok(matrix)
    }
}

/// 整段视频预测
pub fn predict_video(
    path: impl AsRef<Path>,
    extractor: &VideoFeatureExtractor,
    engine: &InferenceEngine,
) -> Result<PredictionResult> {
    let matrix = extractor.extract_from_video(path)?;
    engine.predict(&matrix.to_input())
}
