use action_anticipation::{
    config::{AppConfig, CliOverrides, ConfigLoader},
    handler::{self, AppState},
    predict_video, scan_video, ModelInfo, ModelRegistry, SegmentScheduler, VideoFeatureExtractor,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 动作预判工具 - 从视频中预测即将发生的动作
#[derive(Parser, Debug)]
#[command(name = "action-anticipation")]
#[command(about = "动作预判：视频抽帧、特征提取、多模型推理", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别（trace, debug, info, warn, error）
    /// 可通过环境变量 ANTICIPATION_LOG_LEVEL 或配置文件设置
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 对整段视频做一次预测
    Predict {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 模型类型（gru / transformer），不指定时使用默认模型
        #[arg(short, long)]
        model: Option<String>,

        /// 每段视频采样的帧数
        #[arg(long)]
        target_frames: Option<usize>,
    },
    /// 按固定时间窗口分段预测
    Scan {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 模型类型（gru / transformer）
        #[arg(short, long)]
        model: Option<String>,

        /// 窗口长度（秒）
        /// 可通过环境变量 ANTICIPATION_WINDOW_SECONDS 或配置文件设置
        #[arg(short, long)]
        window: Option<f64>,
    },
    /// 列出已加载的模型及准确率对比
    Models,
    /// Web 服务模式：启动 HTTP 服务器
    Serve {
        /// 监听地址（默认 0.0.0.0:8001）
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 配置文件路径
        #[arg(short, long, default_value = "action-anticipation.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Commands::InitConfig { path } = &args.command {
        ConfigLoader::create_default_config(path)?;
        println!("已生成默认配置文件: {}", path.display());
        return Ok(());
    }

    let mut overrides = CliOverrides {
        log_level: args.log_level.clone(),
        ..CliOverrides::default()
    };
    match &args.command {
        Commands::Predict { target_frames, .. } => overrides.target_frames = *target_frames,
        Commands::Scan { window, .. } => overrides.window_seconds = *window,
        Commands::Serve { bind } => overrides.bind = bind.clone(),
        Commands::Models | Commands::InitConfig { .. } => {}
    }

    let config = ConfigLoader::load(args.config.as_deref(), &overrides).context("加载配置失败")?;
    init_logging(&config.log_level);

    match args.command {
        Commands::Predict { input, model, .. } => {
            let registry = load_registry(&config);
            let (kind, engine) = registry.select(model.as_deref())?;
            let extractor = VideoFeatureExtractor::new(&config.pipeline);

            tracing::info!("使用模型: {}", kind.display_name());
            let result = tokio::task::spawn_blocking(move || predict_video(&input, &extractor, &engine))
                .await?
                .context("预测失败")?;
            print_json(&result)?;
        }
        Commands::Scan { input, model, .. } => {
            let registry = load_registry(&config);
            let (kind, engine) = registry.select(model.as_deref())?;
            let extractor = VideoFeatureExtractor::new(&config.pipeline);
            let scheduler = SegmentScheduler::new(config.pipeline.window_seconds);

            tracing::info!("使用模型: {}", kind.display_name());
            let report = tokio::task::spawn_blocking(move || scan_video(&input, &scheduler, &extractor, &engine))
                .await?
                .context("分段预测失败")?;
            print_json(&report)?;
        }
        Commands::Models => {
            let registry = load_registry(&config);
            let models: BTreeMap<&str, ModelInfo> = registry
                .kinds()
                .into_iter()
                .filter_map(|kind| registry.get(kind).map(|engine| (kind.name(), engine.model_info())))
                .collect();
            print_json(&serde_json::json!({
                "default_model": registry.default_kind().name(),
                "models": models,
                "comparison": registry.comparison(),
            }))?;
        }
        Commands::Serve { .. } => {
            let registry = load_registry(&config);
            start_web_server(registry, &config).await?;
        }
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

fn init_logging(level: &str) {
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("序列化结果失败")?);
    Ok(())
}

#[cfg(feature = "onnx")]
fn load_registry(config: &AppConfig) -> ModelRegistry {
    ModelRegistry::load(&config.models)
}

#[cfg(not(feature = "onnx"))]
fn load_registry(config: &AppConfig) -> ModelRegistry {
    tracing::warn!("⚠️  未启用 onnx 特性，无法加载模型");
    ModelRegistry::new(config.models.default_model)
}

async fn start_web_server(registry: ModelRegistry, config: &AppConfig) -> Result<()> {
    let bind = config.bind.as_str();
    let app = handler::router(AppState::new(registry, config.pipeline.clone()));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 类别列表: GET  http://{}/classes", bind);
    tracing::info!("  • 模型信息: GET  http://{}/model-info", bind);
    tracing::info!("  • 模型对比: GET  http://{}/models-comparison", bind);
    tracing::info!("  • 特征预测: POST http://{}/predict?model_type=<gru|transformer>", bind);
    tracing::info!("  • 批量预测: POST http://{}/predict-batch", bind);
    tracing::info!("  • 视频预测: POST http://{}/predict-from-video", bind);
    tracing::info!("  • 分段预测: POST http://{}/predict-continuous", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app).await.context("启动服务器失败")?;

    Ok(())
}
