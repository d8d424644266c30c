use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::assembler::DEFAULT_TARGET_FRAMES;
use crate::features::DEFAULT_FEATURE_DIM;
use crate::registry::ModelKind;
use crate::scheduler::DEFAULT_WINDOW_SECONDS;

/// 环境变量前缀
const ENV_PREFIX: &str = "ANTICIPATION_";

/// 配置文件名
const CONFIG_FILE_NAME: &str = "action-anticipation.ini";

/// 特征提取流水线配置
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// 每段视频采样的帧数
    pub target_frames: usize,
    /// 每帧特征维度
    pub feature_dim: usize,
    /// 分段预测的窗口长度（秒）
    pub window_seconds: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_frames: DEFAULT_TARGET_FRAMES,
            feature_dim: DEFAULT_FEATURE_DIM,
            window_seconds: DEFAULT_WINDOW_SECONDS,
        }
    }
}

/// 一个模型的文件路径
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    /// ONNX 模型文件
    pub model: PathBuf,
    /// JSON 描述文件
    pub info: PathBuf,
}

/// 模型文件配置
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub gru: ModelPaths,
    pub transformer: ModelPaths,
    /// 未指定或找不到请求的模型时使用
    pub default_model: ModelKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            gru: ModelPaths {
                model: PathBuf::from("dist/action_anticipation_model.onnx"),
                info: PathBuf::from("dist/model_info.json"),
            },
            transformer: ModelPaths {
                model: PathBuf::from("dist/transformer_model.onnx"),
                info: PathBuf::from("dist/transformer_info.json"),
            },
            default_model: ModelKind::Gru,
        }
    }
}

impl ModelConfig {
    pub fn paths(&self, kind: ModelKind) -> &ModelPaths {
        match kind {
            ModelKind::Gru => &self.gru,
            ModelKind::Transformer => &self.transformer,
        }
    }
}

/// 完整的应用配置
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub models: ModelConfig,
    /// HTTP 服务监听地址
    pub bind: String,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            models: ModelConfig::default(),
            bind: "0.0.0.0:8001".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// 命令行参数中可覆盖的配置项
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub target_frames: Option<usize>,
    pub window_seconds: Option<f64>,
    pub default_model: Option<String>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
}

/// 配置文件中读到的值，缺失的项为 `None`
#[derive(Debug, Default)]
struct FileConfig {
    target_frames: Option<usize>,
    feature_dim: Option<usize>,
    window_seconds: Option<f64>,
    gru_model: Option<PathBuf>,
    gru_info: Option<PathBuf>,
    transformer_model: Option<PathBuf>,
    transformer_info: Option<PathBuf>,
    default_model: Option<String>,
    bind: Option<String>,
    log_level: Option<String>,
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load(config_file: Option<&Path>, overrides: &CliOverrides) -> Result<AppConfig> {
        Self::load_with_env(config_file, overrides, |key| env::var(key).ok())
    }

    /// 同 [`ConfigLoader::load`]，环境变量通过 `lookup` 读取
    pub fn load_with_env<F>(config_file: Option<&Path>, overrides: &CliOverrides, lookup: F) -> Result<AppConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 显式指定的配置文件必须能读取，默认位置的文件可以不存在
        let file = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        let env_var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        let defaults = AppConfig::default();

        let pipeline = PipelineConfig {
            target_frames: overrides
                .target_frames
                .or(parse_value(env_var("TARGET_FRAMES")))
                .or(file.target_frames)
                .unwrap_or(defaults.pipeline.target_frames),
            feature_dim: parse_value(env_var("FEATURE_DIM"))
                .or(file.feature_dim)
                .unwrap_or(defaults.pipeline.feature_dim),
            window_seconds: overrides
                .window_seconds
                .or(parse_value(env_var("WINDOW_SECONDS")))
                .or(file.window_seconds)
                .unwrap_or(defaults.pipeline.window_seconds),
        };

        if pipeline.target_frames == 0 || pipeline.feature_dim == 0 {
            anyhow::bail!("target_frames 和 feature_dim 必须大于 0");
        }
        if !(pipeline.window_seconds > 0.0) {
            anyhow::bail!("window_seconds 必须大于 0: {}", pipeline.window_seconds);
        }

        let default_model = match overrides
            .default_model
            .clone()
            .or(env_var("DEFAULT_MODEL"))
            .or(file.default_model)
        {
            Some(name) => ModelKind::parse(&name).with_context(|| format!("未知的模型类型: {}", name))?,
            None => defaults.models.default_model,
        };

        let path_of = |name: &str, from_file: Option<PathBuf>, default: PathBuf| {
            env_var(name).map(PathBuf::from).or(from_file).unwrap_or(default)
        };

        let models = ModelConfig {
            gru: ModelPaths {
                model: path_of("GRU_MODEL", file.gru_model, defaults.models.gru.model),
                info: path_of("GRU_INFO", file.gru_info, defaults.models.gru.info),
            },
            transformer: ModelPaths {
                model: path_of("TRANSFORMER_MODEL", file.transformer_model, defaults.models.transformer.model),
                info: path_of("TRANSFORMER_INFO", file.transformer_info, defaults.models.transformer.info),
            },
            default_model,
        };

        Ok(AppConfig {
            pipeline,
            models,
            bind: overrides
                .bind
                .clone()
                .or(env_var("BIND"))
                .or(file.bind)
                .unwrap_or(defaults.bind),
            log_level: overrides
                .log_level
                .clone()
                .or(env_var("LOG_LEVEL"))
                .or(file.log_level)
                .unwrap_or(defaults.log_level),
        })
    }

    /// 从INI配置文件加载配置
    fn load_from_file(config_path: &Path) -> Result<FileConfig> {
        if !config_path.exists() {
            anyhow::bail!("配置文件不存在: {}", config_path.display());
        }

        let mut parser = configparser::ini::Ini::new();
        parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        let get = |section: &str, key: &str| parser.get(section, key).filter(|v| !v.is_empty());

        Ok(FileConfig {
            target_frames: parse_value(get("pipeline", "target_frames")),
            feature_dim: parse_value(get("pipeline", "feature_dim")),
            window_seconds: parse_value(get("pipeline", "window_seconds")),
            gru_model: get("models", "gru_model").map(PathBuf::from),
            gru_info: get("models", "gru_info").map(PathBuf::from),
            transformer_model: get("models", "transformer_model").map(PathBuf::from),
            transformer_info: get("models", "transformer_info").map(PathBuf::from),
            default_model: get("models", "default_model"),
            bind: get("server", "bind"),
            log_level: get("logging", "level"),
        })
    }

    /// 从默认位置加载配置文件
    fn load_from_default_locations() -> Result<FileConfig> {
        let mut candidates = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from(format!(".{}", CONFIG_FILE_NAME)),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(format!(".{}", CONFIG_FILE_NAME)));
        }
        candidates.push(PathBuf::from("/etc").join(CONFIG_FILE_NAME));

        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_from_file(path),
            None => anyhow::bail!("未找到配置文件"),
        }
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let defaults = AppConfig::default();
        let path_str = |p: &Path| Some(p.to_string_lossy().to_string());

        let mut parser = configparser::ini::Ini::new();
        parser.set("pipeline", "target_frames", Some(defaults.pipeline.target_frames.to_string()));
        parser.set("pipeline", "feature_dim", Some(defaults.pipeline.feature_dim.to_string()));
        parser.set("pipeline", "window_seconds", Some(defaults.pipeline.window_seconds.to_string()));
        parser.set("models", "gru_model", path_str(&defaults.models.gru.model));
        parser.set("models", "gru_info", path_str(&defaults.models.gru.info));
        parser.set("models", "transformer_model", path_str(&defaults.models.transformer.model));
        parser.set("models", "transformer_info", path_str(&defaults.models.transformer.info));
        parser.set("models", "default_model", Some(defaults.models.default_model.name().to_string()));
        parser.set("server", "bind", Some(defaults.bind));
        parser.set("logging", "level", Some(defaults.log_level));

        parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

/// 解析失败的值按未设置处理
fn parse_value<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}
