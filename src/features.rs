use rand::Rng;
use rand_distr::StandardNormal;

use crate::preprocess::Frame;

/// 默认特征维度
pub const DEFAULT_FEATURE_DIM: usize = 2048;

/// 填充噪声的幅度
const PADDING_SCALE: f32 = 0.1;

/// 单帧特征向量，长度恒为 `feature_dim`
pub type FeatureVector = Vec<f32>;

/// 特征合成器：把一帧压缩成固定长度的统计特征
///
/// 这是占位用的统计特征，并非学习得到的 I3D 特征：每个通道取均值、标准差、
/// 最大值、最小值，按 [均值, 标准差, 最大值, 最小值] 分组拼接。长度不足
/// `feature_dim` 时用随机噪声补齐，因此输出不是确定性的。
#[derive(Debug, Clone, Copy)]
pub struct FeatureSynthesizer {
    feature_dim: usize,
}

impl Default for FeatureSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_DIM)
    }
}

impl FeatureSynthesizer {
    pub fn new(feature_dim: usize) -> Self {
        Self { feature_dim }
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn synthesize(&self, frame: &Frame) -> FeatureVector {
        self.synthesize_with_rng(frame, &mut rand::thread_rng())
    }

    /// 使用指定的随机数发生器生成填充噪声
    pub fn synthesize_with_rng<R: Rng>(&self, frame: &Frame, rng: &mut R) -> FeatureVector {
        let mut features = channel_statistics(frame);

        if features.len() < self.feature_dim {
            let missing = self.feature_dim - features.len();
            features.extend((0..missing).map(|_| {
                let noise: f32 = rng.sample(StandardNormal);
                noise * PADDING_SCALE
            }));
        } else {
            features.truncate(self.feature_dim);
        }

        features
    }
}

/// 计算每个通道的均值、总体标准差、最大值、最小值，按统计量分组拼接
fn channel_statistics(frame: &Frame) -> Vec<f32> {
    let channels = frame.channels();
    let mut sum = vec![0.0f64; channels];
    let mut max = vec![f32::NEG_INFINITY; channels];
    let mut min = vec![f32::INFINITY; channels];
    let mut count = 0usize;

    for pixel in frame.pixels() {
        for (c, &v) in pixel.iter().enumerate() {
            sum[c] += v as f64;
            max[c] = max[c].max(v);
            min[c] = min[c].min(v);
        }
        count += 1;
    }

    if count == 0 {
        return vec![0.0; channels * 4];
    }

    let mean: Vec<f64> = sum.iter().map(|s| s / count as f64).collect();

    let mut sq_diff = vec![0.0f64; channels];
    for pixel in frame.pixels() {
        for (c, &v) in pixel.iter().enumerate() {
            let d = v as f64 - mean[c];
            sq_diff[c] += d * d;
        }
    }
    let std = sq_diff.iter().map(|s| (s / count as f64).sqrt());

    let mut stats = Vec::with_capacity(channels * 4);
    stats.extend(mean.iter().map(|&m| m as f32));
    stats.extend(std.map(|s| s as f32));
    stats.extend_from_slice(&max);
    stats.extend_from_slice(&min);
    stats
}
