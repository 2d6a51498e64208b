use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use image::imageops::FilterType;

/// 特征提取器的统一接口：一张图片 => 固定长度的特征向量
pub trait FeatureProvider {
    /// 模型标识，同时用作检查点文件名的前缀
    fn id(&self) -> &'static str;
    /// 特征向量的固定长度
    fn dim(&self) -> usize;
    fn extract(&self, image: &Path) -> Result<Vec<f32>>;
}

/// 内置的特征提取模型，通过启动参数选择
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// 64 级灰度直方图
    #[value(name = "hist")]
    Hist,
    /// RGB 三通道各 32 级直方图
    #[value(name = "rgbhist")]
    RgbHist,
    /// 8x8 分块的梯度方向直方图
    #[value(name = "gradient")]
    Gradient,
    /// 16x16 降采样的灰度块均值
    #[value(name = "blocks")]
    Blocks,
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(FeatureProvider::id(self))
    }
}

impl FeatureProvider for Model {
    fn id(&self) -> &'static str {
        match self {
            Model::Hist => "hist",
            Model::RgbHist => "rgbhist",
            Model::Gradient => "gradient",
            Model::Blocks => "blocks",
        }
    }

    // 所有维度均为 16 的倍数，kmeans 的 SIMD 实现对此有要求
    fn dim(&self) -> usize {
        match self {
            Model::Hist => 64,
            Model::RgbHist => 96,
            Model::Gradient => 576,
            Model::Blocks => 256,
        }
    }

    fn extract(&self, image: &Path) -> Result<Vec<f32>> {
        let img = image::open(image)
            .with_context(|| format!("无法读取图片: {}", image.display()))?;
        let features = match self {
            Model::Hist => gray_hist(&img),
            Model::RgbHist => rgb_hist(&img),
            Model::Gradient => gradient_hist(&img),
            Model::Blocks => block_mean(&img),
        };
        debug_assert_eq!(features.len(), self.dim());
        Ok(features)
    }
}

fn gray_hist(img: &image::DynamicImage) -> Vec<f32> {
    let gray = img.to_luma8();
    let mut hist = vec![0.0; 64];
    for pixel in gray.pixels() {
        hist[(pixel.0[0] / 4) as usize] += 1.0;
    }
    normalize(&mut hist);
    hist
}

fn rgb_hist(img: &image::DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let mut hist = vec![0.0; 96];
    for pixel in rgb.pixels() {
        for ch in 0..3 {
            hist[ch * 32 + (pixel.0[ch] / 8) as usize] += 1.0;
        }
    }
    normalize(&mut hist);
    hist
}

/// HOG 风格的梯度方向直方图：128x128 灰度图分成 8x8 个单元格，
/// 每个单元格统计 9 个方向的梯度幅值
fn gradient_hist(img: &image::DynamicImage) -> Vec<f32> {
    const SIZE: u32 = 128;
    const CELL: u32 = 16;
    const BINS: usize = 9;

    let gray = image::imageops::resize(&img.to_luma8(), SIZE, SIZE, FilterType::Triangle);
    let mut hist = vec![0.0; (SIZE / CELL * SIZE / CELL) as usize * BINS];

    for y in 1..SIZE - 1 {
        for x in 1..SIZE - 1 {
            let dx = gray.get_pixel(x + 1, y).0[0] as f32 - gray.get_pixel(x - 1, y).0[0] as f32;
            let dy = gray.get_pixel(x, y + 1).0[0] as f32 - gray.get_pixel(x, y - 1).0[0] as f32;
            let magnitude = (dx * dx + dy * dy).sqrt();
            let angle = dy.atan2(dx) + std::f32::consts::PI;
            let bin = ((angle / (2.0 * std::f32::consts::PI) * BINS as f32) as usize).min(BINS - 1);
            let cell = (y / CELL) * (SIZE / CELL) + x / CELL;
            hist[cell as usize * BINS + bin] += magnitude;
        }
    }
    normalize(&mut hist);
    hist
}

fn block_mean(img: &image::DynamicImage) -> Vec<f32> {
    let small = image::imageops::resize(&img.to_luma8(), 16, 16, FilterType::Triangle);
    small.pixels().map(|p| p.0[0] as f32 / 255.0).collect()
}

fn normalize(v: &mut [f32]) {
    let sum: f32 = v.iter().sum();
    if sum > 0.0 {
        v.iter_mut().for_each(|x| *x /= sum);
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Rgb, RgbImage};

    use super::*;

    fn save_gray(dir: &Path, name: &str, luma: u8) -> std::path::PathBuf {
        let path = dir.join(name);
        GrayImage::from_pixel(32, 32, image::Luma([luma])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_dims() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = save_gray(dir.path(), "a.png", 128);
        for model in [Model::Hist, Model::RgbHist, Model::Gradient, Model::Blocks] {
            let features = model.extract(&path).unwrap();
            assert_eq!(features.len(), model.dim(), "{}", model.id());
        }
    }

    #[test]
    fn test_hist_normalized() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = save_gray(dir.path(), "a.png", 200);
        let features = Model::Hist.extract(&path).unwrap();
        let sum: f32 = features.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        // 所有像素都落在同一个 bin 中
        assert!((features[50] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_rgb_hist_separates_channels() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(16, 16, Rgb([255, 0, 0])).save(&path).unwrap();
        let features = Model::RgbHist.extract(&path).unwrap();
        assert!(features[31] > 0.0); // R 通道最高 bin
        assert!(features[32] > 0.0); // G 通道最低 bin
        assert!(features[64] > 0.0); // B 通道最低 bin
    }

    #[test]
    fn test_missing_image() {
        assert!(Model::Hist.extract(Path::new("/no/such/image.png")).is_err());
    }
}
