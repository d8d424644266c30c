use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AnticipationError, Result};

/// 支持上传的视频扩展名
pub const SUPPORTED_EXTENSIONS: [&str; 5] = [".mp4", ".avi", ".mov", ".mkv", ".webm"];

/// 取出文件名的扩展名（小写，带点），不支持的格式返回 `InvalidInput`
pub fn extension_of(filename: &str) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(AnticipationError::InvalidInput(format!(
            "不支持的视频格式: '{}'，支持: {}",
            filename,
            SUPPORTED_EXTENSIONS.join(", ")
        )))
    }
}

/// 上传视频的临时文件，离开作用域时删除
#[derive(Debug)]
pub struct TempVideo {
    path: PathBuf,
}

impl TempVideo {
    /// 写入系统临时目录下唯一命名的文件
    pub fn create(bytes: &[u8], extension: &str) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AnticipationError::InvalidInput("上传的视频为空".to_string()));
        }

        let dir = std::env::temp_dir().join("action-anticipation");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}{}", Uuid::new_v4(), extension));
        std::fs::write(&path, bytes)?;
        debug!("写入临时视频: {} ({} 字节)", path.display(), bytes.len());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempVideo {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("⚠️  删除临时文件失败 {}: {}", self.path.display(), e);
        }
    }
}
