use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AnticipationError, Result};
use crate::model::InferenceEngine;
use crate::prediction::{ModelComparison, ModelComparisonEntry};

/// 支持的模型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Gru,
    Transformer,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Gru, ModelKind::Transformer];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Gru => "gru",
            ModelKind::Transformer => "transformer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Gru => "GRU",
            ModelKind::Transformer => "Transformer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelKind::Gru => "Recurrent Neural Network with sequential processing",
            ModelKind::Transformer => "Attention-based architecture with parallel processing",
        }
    }

    /// 按名称查找，忽略大小写
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 模型注册表：启动时构建，之后只读
///
/// 通过参数显式注入到请求处理中，不使用全局变量。
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    engines: Vec<(ModelKind, Arc<InferenceEngine>)>,
    default_kind: ModelKind,
}

impl ModelRegistry {
    pub fn new(default_kind: ModelKind) -> Self {
        Self {
            engines: Vec::new(),
            default_kind,
        }
    }

    /// 注册模型，同一种类重复注册时替换旧的，保留原注册顺序
    pub fn register(&mut self, kind: ModelKind, engine: InferenceEngine) -> &mut Self {
        let engine = Arc::new(engine);
        match self.engines.iter_mut().find(|(k, _)| *k == kind) {
            Some(entry) => entry.1 = engine,
            None => self.engines.push((kind, engine)),
        }
        self
    }

    pub fn default_kind(&self) -> ModelKind {
        self.default_kind
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn kinds(&self) -> Vec<ModelKind> {
        self.engines.iter().map(|(k, _)| *k).collect()
    }

    pub fn get(&self, kind: ModelKind) -> Option<Arc<InferenceEngine>> {
        self.engines
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, engine)| Arc::clone(engine))
    }

    /// 选择模型
    ///
    /// 名称忽略大小写；未指定、未知或未注册时回退到默认模型，默认模型也未注册时
    /// 使用最先注册的模型；没有任何模型时返回 `NoModelAvailable`。
    pub fn select(&self, requested: Option<&str>) -> Result<(ModelKind, Arc<InferenceEngine>)> {
        if let Some(kind) = requested.and_then(ModelKind::parse) {
            if let Some(engine) = self.get(kind) {
                return Ok((kind, engine));
            }
        }

        if let Some(engine) = self.get(self.default_kind) {
            return Ok((self.default_kind, engine));
        }

        self.engines
            .first()
            .map(|(kind, engine)| (*kind, Arc::clone(engine)))
            .ok_or(AnticipationError::NoModelAvailable)
    }

    /// 已注册模型的准确率对比
    pub fn comparison(&self) -> ModelComparison {
        let models: Vec<ModelComparisonEntry> = self
            .engines
            .iter()
            .map(|(kind, engine)| ModelComparisonEntry {
                name: kind.display_name().to_string(),
                accuracy: engine.accuracy(),
                description: kind.description().to_string(),
            })
            .collect();

        let mut best: Option<&ModelComparisonEntry> = None;
        for entry in &models {
            if best.map_or(true, |b| entry.accuracy > b.accuracy) {
                best = Some(entry);
            }
        }

        let difference = best.and_then(|b| {
            models
                .iter()
                .filter(|e| !std::ptr::eq(*e, b))
                .map(|e| e.accuracy)
                .reduce(f64::max)
                .map(|runner_up| b.accuracy - runner_up)
        });

        ModelComparison {
            best: best.map(|b| b.name.clone()),
            difference,
            models,
        }
    }

    /// 按配置加载全部模型
    ///
    /// GRU 是主模型，Transformer 只有在两个文件都存在时才加载。任何一个模型加载
    /// 或健康检查失败只影响它自己，不会阻止其他模型提供服务。
    #[cfg(feature = "onnx")]
    pub fn load(config: &crate::config::ModelConfig) -> Self {
        let mut registry = Self::new(config.default_model);

        for kind in ModelKind::ALL {
            let paths = config.paths(kind);

            if kind != ModelKind::Gru && !(paths.model.exists() && paths.info.exists()) {
                info!("ℹ️  [模型加载] 未找到 {} 模型（可选），跳过", kind.display_name());
                continue;
            }

            info!("⏳ [模型加载] 正在加载 {} 模型...", kind.display_name());
            info!("  • 模型: {}", paths.model.display());
            info!("  • 描述: {}", paths.info.display());

            match InferenceEngine::load(&paths.model, &paths.info) {
                Ok(engine) => registry.register_checked(kind, engine),
                Err(e) => {
                    warn!("❌ [模型加载] {} 模型加载失败: {}", kind.display_name(), e);
                }
            }
        }

        if registry.is_empty() {
            warn!("⚠️  [模型加载] 没有可用的模型，所有预测请求都将失败");
        }

        registry
    }

    /// 健康检查通过后才注册
    pub fn register_checked(&mut self, kind: ModelKind, engine: InferenceEngine) {
        if engine.health_check() {
            info!(
                "✅ [模型加载] {} 已就绪: {}% accuracy",
                kind.display_name(),
                engine.accuracy()
            );
            self.register(kind, engine);
        } else {
            warn!("❌ [模型加载] {} 健康检查未通过，不注册", kind.display_name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, engine_with_accuracy, FailingClassifier};

    fn registry_with(kinds: &[(ModelKind, f64)]) -> ModelRegistry {
        let mut registry = ModelRegistry::new(ModelKind::Gru);
        for &(kind, accuracy) in kinds {
            registry.register(kind, engine_with_accuracy(accuracy));
        }
        registry
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ModelKind::parse("GRU"), Some(ModelKind::Gru));
        assert_eq!(ModelKind::parse("Transformer"), Some(ModelKind::Transformer));
        assert_eq!(ModelKind::parse(" transformer "), Some(ModelKind::Transformer));
        assert_eq!(ModelKind::parse("lstm"), None);
    }

    #[test]
    fn test_select_falls_back_to_registered_default() {
        let registry = registry_with(&[(ModelKind::Gru, 70.0)]);
        let (kind, _) = registry.select(Some("Transformer")).unwrap();
        assert_eq!(kind, ModelKind::Gru);
    }

    #[test]
    fn test_select_requested_model() {
        let registry = registry_with(&[(ModelKind::Gru, 70.0), (ModelKind::Transformer, 75.0)]);
        assert_eq!(registry.select(Some("TRANSFORMER")).unwrap().0, ModelKind::Transformer);
        assert_eq!(registry.select(Some("gru")).unwrap().0, ModelKind::Gru);
        assert_eq!(registry.select(None).unwrap().0, ModelKind::Gru);
        assert_eq!(registry.select(Some("resnet")).unwrap().0, ModelKind::Gru);
    }

    #[test]
    fn test_select_without_default_uses_first_registered() {
        let registry = registry_with(&[(ModelKind::Transformer, 60.0)]);
        assert_eq!(registry.select(Some("gru")).unwrap().0, ModelKind::Transformer);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ModelRegistry::new(ModelKind::Gru);
        assert!(matches!(registry.select(None), Err(AnticipationError::NoModelAvailable)));
        assert!(matches!(
            registry.select(Some("transformer")),
            Err(AnticipationError::NoModelAvailable)
        ));
    }

    #[test]
    fn test_comparison_best_and_difference() {
        let registry = registry_with(&[(ModelKind::Gru, 70.0), (ModelKind::Transformer, 75.5)]);
        let comparison = registry.comparison();

        assert_eq!(comparison.models.len(), 2);
        assert_eq!(comparison.models[0].name, "GRU");
        assert_eq!(comparison.best.as_deref(), Some("Transformer"));
        assert_eq!(comparison.difference, Some(5.5));
    }

    #[test]
    fn test_comparison_tie_keeps_first_registered() {
        let registry = registry_with(&[(ModelKind::Gru, 70.0), (ModelKind::Transformer, 70.0)]);
        let comparison = registry.comparison();
        assert_eq!(comparison.best.as_deref(), Some("GRU"));
        assert_eq!(comparison.difference, Some(0.0));
    }

    #[test]
    fn test_comparison_single_model() {
        let comparison = registry_with(&[(ModelKind::Gru, 70.0)]).comparison();
        assert_eq!(comparison.best.as_deref(), Some("GRU"));
        assert_eq!(comparison.difference, None);
    }

    #[test]
    fn test_register_checked_skips_unhealthy_engine() {
        let mut registry = ModelRegistry::new(ModelKind::Gru);
        registry.register_checked(
            ModelKind::Transformer,
            InferenceEngine::new(
                crate::testing::descriptor(2, &[10, 2048]),
                Box::new(FailingClassifier),
                "broken.onnx",
            ),
        );
        registry.register_checked(ModelKind::Gru, engine(vec![0.5, 0.5], &[10, 2048]));

        assert_eq!(registry.kinds(), vec![ModelKind::Gru]);
    }
}
