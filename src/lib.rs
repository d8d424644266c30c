pub mod error;
pub mod sampler;
pub mod preprocess;
pub mod features;
pub mod assembler;
pub mod video_processor;
pub mod prediction;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod registry;
pub mod processor;
pub mod scheduler;
pub mod temp_video;
pub mod handler;
pub mod config;

#[cfg(test)]
mod testing;

pub use error::{AnticipationError, Result};
pub use sampler::TemporalSampler;
pub use preprocess::{Frame, FramePreprocessor};
pub use features::{FeatureSynthesizer, FeatureVector};
pub use assembler::{FeatureInput, FeatureMatrix, NestedFeatures, TemporalAssembler};
pub use video_processor::{FfmpegFrameSource, FrameSource, VideoInfo};
pub use prediction::{ActionPrediction, ModelComparison, ModelInfo, PredictionResult, ScanReport, SegmentPrediction};
pub use model::{Classifier, InferenceEngine, ModelDescriptor};
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
pub use registry::{ModelKind, ModelRegistry};
pub use processor::{predict_video, VideoFeatureExtractor};
pub use scheduler::{scan_video, SegmentScheduler};
pub use temp_video::TempVideo;
pub use config::{AppConfig, CliOverrides, ConfigLoader, PipelineConfig};
