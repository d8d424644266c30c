use ffmpeg_next as ffmpeg;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::debug;

use crate::error::{AnticipationError, Result};

/// 单帧查找时最多读取的数据包数量，避免损坏文件导致无限读取
const MAX_PACKETS_PER_FRAME: usize = 600;

/// 无法从容器中读到帧率时使用的默认值
const DEFAULT_FPS: f64 = 30.0;

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// 总帧数
    pub frame_count: usize,
    /// 帧率
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    /// 视频时长（秒），帧率无效时为 0
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// 帧来源：报告帧数和帧率，并按帧号读取原始图像
///
/// 实现者独占打开的视频资源，在 drop 时释放。
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    /// 读取指定帧；单帧解码失败返回 `None`，由调用方跳过
    fn read_frame(&mut self, index: usize) -> Option<DynamicImage>;
}

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() -> std::result::Result<(), ffmpeg::Error> {
    ffmpeg::init()?;
    // 只输出 ERROR 及以上级别的 FFmpeg 日志
    FFMPEG_INIT.call_once(|| unsafe {
        ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
    });
    Ok(())
}

/// 基于 FFmpeg 的帧来源
pub struct FfmpegFrameSource {
    path: PathBuf,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    /// 视频流第一帧的时间（秒），帧号从这里开始计
    start_offset: f64,
    info: VideoInfo,
}

impl FfmpegFrameSource {
    /// 打开视频文件，容器或视频流不可用时返回 `UnreadableVideo`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unreadable = |reason: String| AnticipationError::UnreadableVideo {
            path: path.clone(),
            reason,
        };

        init_ffmpeg().map_err(|e| unreadable(format!("初始化 FFmpeg 失败: {}", e)))?;

        let ictx = ffmpeg::format::input(&path).map_err(|e| unreadable(format!("无法打开视频文件: {}", e)))?;

        let video_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| unreadable("未找到视频流".to_string()))?;
        let stream_index = video_stream.index();
        let time_base = video_stream.time_base();
        let start_offset = match video_stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0.0,
            start => to_seconds(start, time_base).max(0.0),
        };

        let rate = video_stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            DEFAULT_FPS
        };

        let frame_count = if video_stream.frames() > 0 {
            video_stream.frames() as usize
        } else {
            // 容器没有记录帧数时，按时长估算
            let duration = ictx.duration().max(0) as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
            (duration * fps).round() as usize
        };

        let decoder_context = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
            .map_err(|e| unreadable(format!("无法创建解码器上下文: {}", e)))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|e| unreadable(format!("无法创建视频解码器: {}", e)))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| unreadable(format!("无法创建缩放器: {}", e)))?;

        let info = VideoInfo {
            frame_count,
            fps,
            width: decoder.width(),
            height: decoder.height(),
        };
        debug!(
            "打开视频: {} ({} 帧, {:.2} fps, {}x{})",
            path.display(),
            info.frame_count,
            info.fps,
            info.width,
            info.height
        );

        Ok(Self {
            path,
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_offset,
            info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 正在查找的目标帧
struct FrameTarget {
    index: usize,
    time_base: ffmpeg::Rational,
    start_offset: f64,
    fps: f64,
}

impl FrameTarget {
    /// 解码帧的时间戳换算为帧号
    fn frame_number(&self, frame: &ffmpeg::frame::Video) -> Option<usize> {
        let pts = frame.timestamp()?;
        let seconds = to_seconds(pts, self.time_base) - self.start_offset;
        Some((seconds * self.fps).round().max(0.0) as usize)
    }

    /// 解码帧尚未到达目标帧号时返回 `None`，否则返回转换结果
    fn take(
        &self,
        decoded: &ffmpeg::frame::Video,
        scaler: &mut ffmpeg::software::scaling::Context,
    ) -> Option<Option<DynamicImage>> {
        if matches!(self.frame_number(decoded), Some(number) if number < self.index) {
            return None;
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if scaler.run(decoded, &mut rgb_frame).is_err() {
            return Some(None);
        }
        Some(Some(frame_to_image(&rgb_frame)))
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    /// 先 seek 到目标时间之前最近的关键帧，再向后解码直到目标帧号
    ///
    /// seek 使用容器的绝对时间，需要加上视频流的起始时间。
    fn read_frame(&mut self, index: usize) -> Option<DynamicImage> {
        let target_time = self.start_offset + index as f64 / self.info.fps;
        let timestamp = (target_time * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;

        if self.ictx.seek(timestamp, ..timestamp).is_err() {
            debug!("seek 失败，跳过帧 {}", index);
            return None;
        }
        self.decoder.flush();

        let Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_offset,
            info,
            ..
        } = self;
        let target = FrameTarget {
            index,
            time_base: *time_base,
            start_offset: *start_offset,
            fps: info.fps,
        };

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut packets_read = 0;

        for (stream, packet) in ictx.packets() {
            if stream.index() != *stream_index {
                continue;
            }
            packets_read += 1;
            if packets_read > MAX_PACKETS_PER_FRAME {
                break;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            while decoder.receive_frame(&mut decoded).is_ok() {
                if let Some(result) = target.take(&decoded, scaler) {
                    return result;
                }
            }
        }

        // 到达文件末尾，冲刷解码器中缓存的帧
        if decoder.send_eof().is_ok() {
            while decoder.receive_frame(&mut decoded).is_ok() {
                if let Some(result) = target.take(&decoded, scaler) {
                    return result;
                }
            }
        }

        None
    }
}

/// 以 `time_base` 为单位的时间戳换算为秒
fn to_seconds(timestamp: i64, time_base: ffmpeg::Rational) -> f64 {
    timestamp as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// 将 RGB24 的 FFmpeg 帧转换为 DynamicImage
fn frame_to_image(frame: &ffmpeg::frame::Video) -> DynamicImage {
    let width = frame.width();
    let height = frame.height();
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut img_buf = image::RgbImage::new(width, height);
    for y in 0..height {
        let row = y as usize * stride;
        for x in 0..width {
            let idx = row + x as usize * 3;
            if idx + 2 < data.len() {
                img_buf.put_pixel(x, y, image::Rgb([data[idx], data[idx + 1], data[idx + 2]]));
            }
        }
    }

    DynamicImage::ImageRgb8(img_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_duration_from_frame_count() {
        let info = VideoInfo {
            frame_count: 750,
            fps: 30.0,
            width: 640,
            height: 480,
        };
        assert_eq!(info.duration(), 25.0);

        let info = VideoInfo { fps: 0.0, ..info };
        assert_eq!(info.duration(), 0.0);
    }

    #[test]
    fn test_open_missing_file() {
        let result = FfmpegFrameSource::open("/nonexistent/clip.mp4");
        assert!(matches!(result, Err(AnticipationError::UnreadableVideo { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"definitely not a video container").unwrap();
        file.flush().unwrap();

        let result = FfmpegFrameSource::open(file.path());
        assert!(matches!(result, Err(AnticipationError::UnreadableVideo { .. })));
    }

    const CLIP_WIDTH: u32 = 64;
    const CLIP_HEIGHT: u32 = 48;

    /// 第 i 帧是灰度值为 i * 20 的纯色画面
    fn gray_level(index: usize) -> u8 {
        (index * 20) as u8
    }

    /// 用 MPEG-4 编码一段纯色测试视频，`pts_offset` 为第一帧的 pts（以帧为单位）
    fn write_clip(path: &Path, frames: usize, fps: i32, pts_offset: i64) {
        use ffmpeg::format::Pixel;

        init_ffmpeg().unwrap();
        let mut octx = ffmpeg::format::output(&path).unwrap();
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);

        let encoder_time_base = ffmpeg::Rational::new(1, fps);
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder.set_width(CLIP_WIDTH);
        encoder.set_height(CLIP_HEIGHT);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        encoder.set_gop(5);
        encoder.set_bit_rate(400_000);
        if global_header {
            encoder.set_flags(ffmpeg::codec::flag::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder.open_as(codec).unwrap();

        {
            let mut ost = octx.add_stream(codec).unwrap();
            ost.set_parameters(&encoder);
            ost.set_time_base(encoder_time_base);
            ost.set_avg_frame_rate(ffmpeg::Rational::new(fps, 1));
        }
        octx.write_header().unwrap();
        let stream_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg::software::scaling::Context::get(
            Pixel::RGB24,
            CLIP_WIDTH,
            CLIP_HEIGHT,
            Pixel::YUV420P,
            CLIP_WIDTH,
            CLIP_HEIGHT,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        let drain = |encoder: &mut ffmpeg::encoder::video::Encoder, octx: &mut ffmpeg::format::context::Output| {
            let mut packet = ffmpeg::Packet::empty();
            while encoder.receive_packet(&mut packet).is_ok() {
                packet.set_stream(0);
                packet.rescale_ts(encoder_time_base, stream_time_base);
                packet.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..frames {
            let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, CLIP_WIDTH, CLIP_HEIGHT);
            rgb.data_mut(0).fill(gray_level(i));
            let mut yuv = ffmpeg::frame::Video::empty();
            scaler.run(&rgb, &mut yuv).unwrap();
            yuv.set_pts(Some(pts_offset + i as i64));
            encoder.send_frame(&yuv).unwrap();
            drain(&mut encoder, &mut octx);
        }
        encoder.send_eof().unwrap();
        drain(&mut encoder, &mut octx);
        octx.write_trailer().unwrap();
    }

    fn assert_gray(image: Option<DynamicImage>, index: usize) {
        let image = image.unwrap_or_else(|| panic!("帧 {} 应当可读", index));
        let rgb = image.to_rgb8();
        assert_eq!(rgb.dimensions(), (CLIP_WIDTH, CLIP_HEIGHT));
        let actual = rgb.get_pixel(CLIP_WIDTH / 2, CLIP_HEIGHT / 2).0[0] as i32;
        let expected = gray_level(index) as i32;
        assert!(
            (actual - expected).abs() <= 8,
            "帧 {}: 灰度 {} 与预期 {} 相差过大",
            index,
            actual,
            expected
        );
    }

    #[test]
    fn test_decode_encoded_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_clip(&path, 12, 25, 0);

        let mut source = FfmpegFrameSource::open(&path).unwrap();
        let info = source.info();
        assert_eq!(info.frame_count, 12);
        assert!((info.fps - 25.0).abs() < 1e-6);
        assert_eq!((info.width, info.height), (CLIP_WIDTH, CLIP_HEIGHT));

        // 乱序读取也要落在正确的帧上
        for index in [0, 5, 11, 3, 7] {
            assert_gray(source.read_frame(index), index);
        }
        assert!(source.read_frame(info.frame_count + 5).is_none());
    }

    #[test]
    fn test_decode_clip_with_nonzero_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset.mkv");
        write_clip(&path, 10, 25, 3);

        let mut source = FfmpegFrameSource::open(&path).unwrap();
        assert!(source.start_offset > 0.1);

        // 帧号从视频流的第一帧开始计
        for index in [0, 5, 2] {
            assert_gray(source.read_frame(index), index);
        }
    }
}
