use serde::{Deserialize, Serialize};

/// 返回前几名预测
pub const TOP_K: usize = 5;

/// 单个动作的预测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPrediction {
    /// 动作编号（类别下标）
    pub action_id: usize,
    /// 动作名称
    pub action_name: String,
    /// 置信度
    pub confidence: f32,
}

/// 预测结果中附带的模型摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub accuracy: f64,
    pub input_shape: Vec<usize>,
    pub num_classes: usize,
}

/// 一次推理的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 置信度最高的动作
    pub top_prediction: ActionPrediction,
    /// 前 5 名，按置信度降序，置信度相同时按编号升序
    pub top5_predictions: Vec<ActionPrediction>,
    /// 全部类别的置信度
    pub all_predictions: Vec<f32>,
    pub model_info: ModelSummary,
}

/// 按置信度降序排列类别下标，置信度相同时下标小的在前
pub fn rank_indices(scores: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    indices
}

/// 某个时间窗口的预测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPrediction {
    #[serde(flatten)]
    pub prediction: PredictionResult,
    /// 窗口起始时间（秒）
    pub timestamp: f64,
    /// 窗口标签，如 `0s - 10s`
    pub segment: String,
}

/// 分段扫描整段视频的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// 视频总时长（秒）
    pub video_duration: f64,
    /// 处理的窗口数
    pub num_predictions: usize,
    /// 按起始时间排列的窗口预测
    pub predictions: Vec<SegmentPrediction>,
}

/// 模型详细信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub class_names: Vec<String>,
    pub input_shape: Vec<usize>,
    pub num_classes: usize,
    pub accuracy: f64,
    pub model_path: String,
}

/// 单个模型在对比视图中的条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparisonEntry {
    pub name: String,
    pub accuracy: f64,
    pub description: String,
}

/// 已注册模型的准确率对比
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    /// 按注册顺序排列
    pub models: Vec<ModelComparisonEntry>,
    /// 准确率最高的模型，并列时取先注册的
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<String>,
    /// 第一名与第二名的准确率差
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_descending_with_ties_by_index() {
        let scores = [0.1, 0.4, 0.4, 0.05, 0.9, 0.4];
        assert_eq!(rank_indices(&scores), vec![4, 1, 2, 5, 0, 3]);
    }

    #[test]
    fn test_segment_prediction_flattens_result() {
        let prediction = PredictionResult {
            top_prediction: ActionPrediction {
                action_id: 1,
                action_name: "pirouette".to_string(),
                confidence: 0.75,
            },
            top5_predictions: vec![ActionPrediction {
                action_id: 1,
                action_name: "pirouette".to_string(),
                confidence: 0.75,
            }],
            all_predictions: vec![0.25, 0.75],
            model_info: ModelSummary {
                accuracy: 81.5,
                input_shape: vec![1, 10, 2048],
                num_classes: 2,
            },
        };
        let segment = SegmentPrediction {
            prediction,
            timestamp: 10.0,
            segment: "10s - 20s".to_string(),
        };

        let value = serde_json::to_value(&segment).unwrap();
        assert_eq!(value["top_prediction"]["action_name"], "pirouette");
        assert_eq!(value["model_info"]["input_shape"][2], 2048);
        assert_eq!(value["segment"], "10s - 20s");
        assert_eq!(value["timestamp"], 10.0);
    }
}
