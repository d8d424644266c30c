use image::imageops::{self, FilterType};
use image::DynamicImage;

/// 预处理后帧的边长
pub const FRAME_SIZE: u32 = 224;

/// 预处理后的帧：HWC 排列的 RGB 浮点张量，取值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<f32>,
}

impl Frame {
    /// 由 HWC 排列的原始数据构造帧
    ///
    /// 数据长度必须等于 `width * height * channels`。
    pub fn from_raw(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Option<Self> {
        if channels == 0 || data.len() != width as usize * height as usize * channels {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// 按像素迭代，每项是该像素的全部通道值
    pub fn pixels(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.channels)
    }
}

/// 帧预处理器：缩放到 224×224 并归一化到 [0, 1]
#[derive(Debug, Clone, Copy)]
pub struct FramePreprocessor {
    size: u32,
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self { size: FRAME_SIZE }
    }
}

impl FramePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预处理一帧已解码的图像，解码成功的帧总能预处理成功
    pub fn process(&self, image: &DynamicImage) -> Frame {
        let rgb = image.to_rgb8();
        let resized = imageops::resize(&rgb, self.size, self.size, FilterType::Triangle);

        let data = resized
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect();

        Frame {
            width: self.size,
            height: self.size,
            channels: 3,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn test_resize_and_normalize() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(640, 360, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        }));

        let frame = FramePreprocessor::new().process(&img);

        assert_eq!(frame.width(), 224);
        assert_eq!(frame.height(), 224);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 224 * 224 * 3);
        assert!(frame.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_constant_white_frame() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(50, 80, Rgb([255u8, 255, 255])));
        let frame = FramePreprocessor::new().process(&img);
        assert!(frame.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_grayscale_input_expands_to_three_channels() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(32, 32, image::Luma([51u8])));
        let frame = FramePreprocessor::new().process(&img);
        assert_eq!(frame.channels(), 3);
        assert!(frame.data().iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(Frame::from_raw(2, 2, 3, vec![0.0; 12]).is_some());
        assert!(Frame::from_raw(2, 2, 3, vec![0.0; 11]).is_none());
    }

    #[test]
    fn test_from_raw_rejects_zero_channels() {
        assert!(Frame::from_raw(2, 2, 0, vec![]).is_none());
        assert!(Frame::from_raw(0, 0, 0, vec![]).is_none());
    }
}
