use serde::Deserialize;

use crate::error::{AnticipationError, Result};
use crate::features::FeatureVector;

/// 默认时间步数
pub const DEFAULT_TARGET_FRAMES: usize = 10;

/// 一段视频的特征矩阵，固定 `target_frames` 行、每行 `feature_dim` 列
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<FeatureVector>,
    feature_dim: usize,
}

impl FeatureMatrix {
    /// 全零矩阵
    pub fn zeros(target_frames: usize, feature_dim: usize) -> Self {
        Self {
            rows: vec![vec![0.0; feature_dim]; target_frames],
            feature_dim,
        }
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows.len(), self.feature_dim]
    }

    /// 转换为未加批次维度的输入张量
    pub fn to_input(&self) -> FeatureInput {
        FeatureInput {
            shape: self.shape().to_vec(),
            data: self.rows.iter().flatten().copied().collect(),
        }
    }
}

/// 时间组装器：把逐帧特征拼成固定形状的特征矩阵
///
/// 无论上游读帧失败多少，下游模型总能拿到固定形状的输入。
#[derive(Debug, Clone, Copy)]
pub struct TemporalAssembler {
    target_frames: usize,
    feature_dim: usize,
}

impl TemporalAssembler {
    pub fn new(target_frames: usize, feature_dim: usize) -> Self {
        Self {
            target_frames,
            feature_dim,
        }
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames
    }

    /// - 没有任何帧：返回全零矩阵
    /// - 帧数不足：重复最后一帧补齐
    /// - 帧数过多：只保留前 `target_frames` 帧
    pub fn assemble(&self, mut vectors: Vec<FeatureVector>) -> FeatureMatrix {
        let Some(last) = vectors.last().cloned() else {
            return FeatureMatrix::zeros(self.target_frames, self.feature_dim);
        };

        vectors.truncate(self.target_frames);
        vectors.resize(self.target_frames, last);

        FeatureMatrix {
            rows: vectors,
            feature_dim: self.feature_dim,
        }
    }
}

/// 调用方直接提供的特征张量（跳过视频抽帧）
///
/// 数据按行优先展平，`shape` 为 `(target_frames, feature_dim)` 或
/// `(1, target_frames, feature_dim)`。
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInput {
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// JSON 中的嵌套数组形式
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NestedFeatures {
    Batched(Vec<Vec<Vec<f32>>>),
    Unbatched(Vec<Vec<f32>>),
}

impl FeatureInput {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(AnticipationError::InvalidInput(format!(
                "形状 {:?} 需要 {} 个数值，实际 {} 个",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// 全零张量
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// 从嵌套数组构造，拒绝不规则（各行长度不一）的数组
    pub fn from_nested(nested: NestedFeatures) -> Result<Self> {
        match nested {
            NestedFeatures::Unbatched(rows) => {
                let (shape, data) = flatten_rows(&rows)?;
                Self::new(shape.to_vec(), data)
            }
            NestedFeatures::Batched(batches) => {
                let mut data = Vec::new();
                let mut inner: Option<[usize; 2]> = None;
                for batch in &batches {
                    let (shape, values) = flatten_rows(batch)?;
                    if inner.is_some_and(|s| s != shape) {
                        return Err(AnticipationError::InvalidInput(
                            "批次之间的特征形状不一致".to_string(),
                        ));
                    }
                    inner = Some(shape);
                    data.extend(values);
                }
                let [rows, cols] = inner.unwrap_or([0, 0]);
                Self::new(vec![batches.len(), rows, cols], data)
            }
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// 以相同数据换一个形状（元素总数不变）
    pub(crate) fn reshaped(&self, shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: self.data.clone(),
        }
    }
}

fn flatten_rows(rows: &[Vec<f32>]) -> Result<([usize; 2], Vec<f32>)> {
    let cols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != cols) {
        return Err(AnticipationError::InvalidInput(
            "特征数组每一行的长度必须一致".to_string(),
        ));
    }
    Ok(([rows.len(), cols], rows.iter().flatten().copied().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(value: f32, dim: usize) -> FeatureVector {
        vec![value; dim]
    }

    #[test]
    fn test_assemble_shape_invariant() {
        let assembler = TemporalAssembler::new(10, 8);
        for n in 0..25 {
            let vectors = (0..n).map(|i| vector(i as f32, 8)).collect();
            let matrix = assembler.assemble(vectors);
            assert_eq!(matrix.shape(), [10, 8]);
        }
    }

    #[test]
    fn test_assemble_empty_gives_zeros() {
        let matrix = TemporalAssembler::new(10, 4).assemble(Vec::new());
        assert_eq!(matrix, FeatureMatrix::zeros(10, 4));
        assert!(matrix.rows().iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn test_assemble_repeats_last_vector() {
        let matrix = TemporalAssembler::new(5, 2).assemble(vec![vector(1.0, 2), vector(2.0, 2)]);
        let firsts: Vec<f32> = matrix.rows().iter().map(|r| r[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_assemble_keeps_leading_vectors() {
        let vectors = (0..15).map(|i| vector(i as f32, 3)).collect();
        let matrix = TemporalAssembler::new(10, 3).assemble(vectors);
        let firsts: Vec<f32> = matrix.rows().iter().map(|r| r[0]).collect();
        assert_eq!(firsts, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_to_input_flattens_row_major() {
        let matrix = TemporalAssembler::new(2, 2).assemble(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let input = matrix.to_input();
        assert_eq!(input.shape(), &[2, 2]);
        assert_eq!(input.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_nested_features_from_json() {
        let unbatched: NestedFeatures = serde_json::from_str("[[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]").unwrap();
        let input = FeatureInput::from_nested(unbatched).unwrap();
        assert_eq!(input.shape(), &[3, 2]);

        let batched: NestedFeatures = serde_json::from_str("[[[0.1, 0.2], [0.3, 0.4]]]").unwrap();
        let input = FeatureInput::from_nested(batched).unwrap();
        assert_eq!(input.shape(), &[1, 2, 2]);
    }

    #[test]
    fn test_ragged_features_rejected() {
        let ragged: NestedFeatures = serde_json::from_str("[[0.1, 0.2], [0.3]]").unwrap();
        assert!(matches!(
            FeatureInput::from_nested(ragged),
            Err(AnticipationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_feature_input_checks_length() {
        assert!(FeatureInput::new(vec![2, 3], vec![0.0; 6]).is_ok());
        assert!(FeatureInput::new(vec![2, 3], vec![0.0; 5]).is_err());
    }
}
