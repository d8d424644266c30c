use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use crate::error::Result;
use crate::model::InferenceEngine;
use crate::prediction::{ScanReport, SegmentPrediction};
use crate::processor::VideoFeatureExtractor;
use crate::video_processor::{FfmpegFrameSource, FrameSource};

/// 默认窗口长度（秒）
pub const DEFAULT_WINDOW_SECONDS: f64 = 10.0;

/// 分段调度器：按固定时间窗口扫描整段视频
///
/// 窗口从 0 开始，依次为 `[0, w)`、`[w, 2w)`……，只保留完整的窗口，
/// 末尾不足一个窗口的部分丢弃。
#[derive(Debug, Clone, Copy)]
pub struct SegmentScheduler {
    window_seconds: f64,
}

impl Default for SegmentScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}

impl SegmentScheduler {
    pub fn new(window_seconds: f64) -> Self {
        Self { window_seconds }
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    /// 给定时长内所有完整窗口的起始时间
    pub fn windows(&self, duration: f64) -> Vec<f64> {
        let w = self.window_seconds;
        if !(w > 0.0) || !duration.is_finite() {
            return Vec::new();
        }

        // 容忍浮点误差，0.3 秒按 0.1 秒切分应得到 3 个窗口
        let count = (duration / w + 1e-9).floor();
        if !(count >= 1.0) {
            return Vec::new();
        }
        (0..count as usize).map(|k| k as f64 * w).collect()
    }

    /// 逐个窗口提取特征并预测，任何一个窗口失败都会中止整次扫描
    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        extractor: &VideoFeatureExtractor,
        engine: &InferenceEngine,
    ) -> Result<ScanReport> {
        let duration = source.info().duration();
        let windows = self.windows(duration);
        info!(
            "⏳ [分段预测] 视频时长 {:.2}秒，共 {} 个窗口（每个 {}秒）",
            duration,
            windows.len(),
            self.window_seconds
        );

        let mut predictions = Vec::with_capacity(windows.len());
        for (i, &start) in windows.iter().enumerate() {
            let matrix = extractor.extract_segment(source, start, self.window_seconds);
            let prediction = engine.predict(&matrix.to_input()).map_err(|e| {
                error!("❌ [分段预测] 第 {} 个窗口预测失败: {}", i + 1, e);
                e
            })?;

            info!(
                "  • [{}/{}] {}s: {} ({:.4})",
                i + 1,
                windows.len(),
                start,
                prediction.top_prediction.action_name,
                prediction.top_prediction.confidence
            );

            predictions.push(SegmentPrediction {
                prediction,
                timestamp: start,
                segment: format!("{}s - {}s", start, start + self.window_seconds),
            });
        }

        Ok(ScanReport {
            video_duration: duration,
            num_predictions: predictions.len(),
            predictions,
        })
    }
}

/// 打开视频文件并分段扫描，视频句柄在所有路径上都会释放
pub fn scan_video(
    path: impl AsRef<Path>,
    scheduler: &SegmentScheduler,
    extractor: &VideoFeatureExtractor,
    engine: &InferenceEngine,
) -> Result<ScanReport> {
    let path = path.as_ref();
    let start = Instant::now();
    info!("🎬 [分段预测] 开始扫描视频: {}", path.display());

    let mut source = FfmpegFrameSource::open(path)?;
    let report = scheduler.run(&mut source, extractor, engine)?;

    info!(
        "✅ [分段预测] 扫描完成，{} 个窗口，耗时: {:.2}秒",
        report.num_predictions,
        start.elapsed().as_secs_f64()
    );
    Ok(report)
}
