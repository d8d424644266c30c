use std::path::PathBuf;
use thiserror::Error;

/// 动作预判管线的错误类型
#[derive(Debug, Error)]
pub enum AnticipationError {
    /// 模型描述文件或模型文件不存在（加载期，致命）
    #[error("文件不存在: {}", .0.display())]
    FileNotFound(PathBuf),

    /// 模型描述文件缺少必填字段或类型错误（加载期，致命）
    #[error("模型描述文件格式错误: {}: {reason}", path.display())]
    MalformedDescriptor { path: PathBuf, reason: String },

    /// 模型文件存在但推理运行时无法加载
    #[error("加载模型失败: {}: {reason}", path.display())]
    ModelLoadFailed { path: PathBuf, reason: String },

    /// 输入张量形状与模型期望不一致
    #[error("输入形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// 视频容器无法打开
    #[error("无法打开视频文件: {}: {reason}", path.display())]
    UnreadableVideo { path: PathBuf, reason: String },

    /// 没有注册任何模型
    #[error("没有可用的模型")]
    NoModelAvailable,

    /// 模型执行失败
    #[error("模型推理失败: {0}")]
    InferenceFailure(String),

    /// 请求内容无效（不规则的特征数组、不支持的文件类型等）
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnticipationError>;
