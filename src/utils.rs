use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use indicatif::ProgressStyle;
use walkdir::WalkDir;

/// 支持的图片扩展名
const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg} {wide_bar} {pos}/{len} [{elapsed_precise}<{eta_precise}]",
    )
    .expect("failed to build progress style")
}

/// 扫描目录下的所有图片，按路径排序以保证处理顺序稳定
///
/// 目录不存在或者没有任何可用图片时直接报错，避免空跑整条流水线。
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("图片目录不存在: {}", dir.display());
    }

    let mut images = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| IMAGE_EXTS.contains(&&*ext.to_string_lossy().to_lowercase()))
                == Some(true)
        })
        .collect::<Vec<_>>();

    if images.is_empty() {
        bail!("目录中没有可用的图片: {}", dir.display());
    }

    images.sort();
    Ok(images)
}
