use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::assembler::{FeatureInput, NestedFeatures};
use crate::config::PipelineConfig;
use crate::error::AnticipationError;
use crate::model::InferenceEngine;
use crate::prediction::{ModelComparison, ModelInfo, PredictionResult, ScanReport};
use crate::processor::{predict_video, VideoFeatureExtractor};
use crate::registry::{ModelKind, ModelRegistry};
use crate::scheduler::{scan_video, SegmentScheduler};
use crate::temp_video::{extension_of, TempVideo};

/// 上传视频的大小上限
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

type HandlerError = (StatusCode, String);

/// 请求处理共享的状态，启动时构建，之后只读
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub pipeline: PipelineConfig,
}

impl AppState {
    pub fn new(registry: ModelRegistry, pipeline: PipelineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            pipeline,
        }
    }

    fn select(&self, model_type: Option<&str>) -> Result<(ModelKind, Arc<InferenceEngine>), HandlerError> {
        self.registry.select(model_type).map_err(error_response)
    }
}

/// 构建 HTTP 路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/classes", get(classes))
        .route("/model-info", get(model_info))
        .route("/models-comparison", get(models_comparison))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .route("/predict-from-video", post(predict_from_video))
        .route("/predict-continuous", post(predict_continuous))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 把领域错误映射为 HTTP 状态码
fn error_response(e: AnticipationError) -> HandlerError {
    let status = match &e {
        AnticipationError::ShapeMismatch { .. } | AnticipationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AnticipationError::UnreadableVideo { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AnticipationError::NoModelAvailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("❌ [请求处理] {}", e);
    (status, e.to_string())
}

/// 在阻塞线程池上执行解码和推理
async fn run_blocking<T, F>(task: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("任务执行失败: {}", e)))?
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct ModelQuery {
    pub model_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServiceBanner {
    pub message: String,
    pub status: String,
    pub version: String,
    pub models: Vec<String>,
    pub default_model: String,
}

async fn root(State(state): State<AppState>) -> ResponseJson<ServiceBanner> {
    ResponseJson(ServiceBanner {
        message: "Action Anticipation API".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models: state.registry.kinds().iter().map(|k| k.name().to_string()).collect(),
        default_model: state.registry.default_kind().name().to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

/// 健康检查：主模型能否完成一次推理
async fn health_check(State(state): State<AppState>) -> Result<ResponseJson<HealthResponse>, HandlerError> {
    let models = state.registry.kinds().iter().map(|k| k.name().to_string()).collect();

    let Ok((_, engine)) = state.registry.select(None) else {
        return Ok(ResponseJson(HealthResponse {
            status: "unhealthy".to_string(),
            model_loaded: false,
            models,
            model_info: None,
        }));
    };

    let healthy = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.health_check())
            .await
            .unwrap_or(false)
    };

    Ok(ResponseJson(HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        model_loaded: true,
        models,
        // 健康检查失败时不返回模型信息
        model_info: healthy.then(|| engine.model_info()),
    }))
}

#[derive(Debug, Serialize)]
pub struct ClassesResponse {
    pub model_type: String,
    pub classes: Vec<String>,
    pub num_classes: usize,
}

async fn classes(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<ResponseJson<ClassesResponse>, HandlerError> {
    let (kind, engine) = state.select(query.model_type.as_deref())?;
    Ok(ResponseJson(ClassesResponse {
        model_type: kind.name().to_string(),
        classes: engine.class_names().to_vec(),
        num_classes: engine.class_names().len(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_type: String,
    #[serde(flatten)]
    pub info: ModelInfo,
}

async fn model_info(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<ResponseJson<ModelInfoResponse>, HandlerError> {
    let (kind, engine) = state.select(query.model_type.as_deref())?;
    Ok(ResponseJson(ModelInfoResponse {
        model_type: kind.name().to_string(),
        info: engine.model_info(),
    }))
}

async fn models_comparison(State(state): State<AppState>) -> ResponseJson<ModelComparison> {
    ResponseJson(state.registry.comparison())
}

/// 直接提供特征的预测请求
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: NestedFeatures,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub model_type: String,
    #[serde(flatten)]
    pub result: PredictionResult,
}

async fn predict(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
    Json(request): Json<PredictRequest>,
) -> Result<ResponseJson<PredictResponse>, HandlerError> {
    let (kind, engine) = state.select(query.model_type.as_deref())?;
    let input = FeatureInput::from_nested(request.features).map_err(error_response)?;

    let result = run_blocking(move || engine.predict(&input)).await?;
    Ok(ResponseJson(PredictResponse {
        model_type: kind.name().to_string(),
        result,
    }))
}

/// 批量预测：请求体是 `[{"features": ...}, ...]`，按顺序返回每组的预测结果
async fn predict_batch(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
    Json(requests): Json<Vec<PredictRequest>>,
) -> Result<ResponseJson<Vec<PredictionResult>>, HandlerError> {
    let (_, engine) = state.select(query.model_type.as_deref())?;
    let inputs = requests
        .into_iter()
        .map(|request| FeatureInput::from_nested(request.features))
        .collect::<crate::Result<Vec<_>>>()
        .map_err(error_response)?;

    let predictions = run_blocking(move || engine.predict_batch(&inputs)).await?;
    Ok(ResponseJson(predictions))
}

/// 从 multipart 表单中取出第一个带文件名的字段，写入临时文件
async fn receive_upload(mut multipart: Multipart) -> Result<TempVideo, HandlerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取上传内容失败: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let extension = extension_of(&filename).map_err(error_response)?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取上传文件失败: {}", e)))?;

        info!("📥 [上传] 收到视频: {} ({} 字节)", filename, bytes.len());
        return TempVideo::create(&bytes, &extension).map_err(error_response);
    }

    Err((StatusCode::BAD_REQUEST, "请求中没有上传视频文件".to_string()))
}

async fn predict_from_video(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
    multipart: Multipart,
) -> Result<ResponseJson<PredictResponse>, HandlerError> {
    let (kind, engine) = state.select(query.model_type.as_deref())?;
    let video = receive_upload(multipart).await?;
    let extractor = VideoFeatureExtractor::new(&state.pipeline);

    let start = Instant::now();
    // 临时文件随闭包一起在阻塞线程上释放
    let result = run_blocking(move || predict_video(video.path(), &extractor, &engine)).await?;
    info!(
        "✅ [视频预测] {} ({:.4})，耗时: {:.2}秒",
        result.top_prediction.action_name,
        result.top_prediction.confidence,
        start.elapsed().as_secs_f64()
    );

    Ok(ResponseJson(PredictResponse {
        model_type: kind.name().to_string(),
        result,
    }))
}

async fn predict_continuous(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
    multipart: Multipart,
) -> Result<ResponseJson<ScanReport>, HandlerError> {
    let (_, engine) = state.select(query.model_type.as_deref())?;
    let video = receive_upload(multipart).await?;
    let extractor = VideoFeatureExtractor::new(&state.pipeline);
    let scheduler = SegmentScheduler::new(state.pipeline.window_seconds);

    let report = run_blocking(move || scan_video(video.path(), &scheduler, &extractor, &engine)).await?;
    Ok(ResponseJson(report))
}
