use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use image::GrayImage;
use predicates::prelude::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 生成两组亮度差异明显的灰度图片
fn make_images(dir: &Path) -> Result<()> {
    for (i, luma) in [10u8, 14, 18, 22, 230, 234, 238, 242].iter().enumerate() {
        let img = GrayImage::from_fn(32, 32, |x, y| image::Luma([luma + ((x + y) % 4) as u8]));
        img.save(dir.join(format!("img_{i}.png")))?;
    }
    Ok(())
}

#[test]
fn run_generates_reports() -> Result<()> {
    let ckpt = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let out = assert_fs::TempDir::new()?;
    make_images(images.path())?;

    cargo_run!(
        "imcluster",
        "-c",
        ckpt.path(),
        "run",
        "-d",
        images.path(),
        "-o",
        out.path(),
        "--models",
        "blocks",
        "--methods",
        "kmeans",
        "-k",
        "2"
    )
    .success();

    let csv = fs::read_to_string(out.path().join("model_comparison.csv"))?;
    assert!(csv.starts_with("Model,Clustering Method,Silhouette Score"));
    assert!(csv.contains("blocks,kmeans"));

    assert!(out.path().join("blocks_kmeans_clustering.html").exists());
    assert!(out.path().join("performance_statistics.csv").exists());
    assert!(out.path().join("best_models.csv").exists());
    assert!(out.path().join("evaluation_report.html").exists());
    Ok(())
}

#[test]
fn second_run_resumes_from_checkpoint() -> Result<()> {
    let ckpt = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let out = assert_fs::TempDir::new()?;
    make_images(images.path())?;

    for _ in 0..2 {
        cargo_run!(
            "imcluster",
            "-c",
            ckpt.path(),
            "run",
            "-d",
            images.path(),
            "-o",
            out.path(),
            "--models",
            "blocks",
            "--methods",
            "kmeans",
            "-k",
            "2"
        )
        .success();
    }

    let progress = fs::read_to_string(ckpt.path().join("progress.json"))?;
    assert!(progress.contains("\"blocks\""));
    assert!(ckpt.path().join("blocks_features.bin").exists());
    assert!(ckpt.path().join("blocks_clustering.bin").exists());
    Ok(())
}

/// DBSCAN 参数过严导致全部是噪声点时，该组合不产生对比行，命令也不报错
#[test]
fn degenerate_clustering_is_excluded() -> Result<()> {
    let ckpt = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let out = assert_fs::TempDir::new()?;
    make_images(images.path())?;

    cargo_run!(
        "imcluster",
        "-c",
        ckpt.path(),
        "run",
        "-d",
        images.path(),
        "-o",
        out.path(),
        "--models",
        "blocks",
        "--methods",
        "dbscan",
        "--eps",
        "0.000001",
        "--min-samples",
        "5"
    )
    .success();

    let csv = fs::read_to_string(out.path().join("model_comparison.csv"))?;
    assert!(!csv.contains("dbscan"));
    Ok(())
}

#[test]
fn missing_image_dir_fails_fast() -> Result<()> {
    let ckpt = assert_fs::TempDir::new()?;

    cargo_run!("imcluster", "-c", ckpt.path(), "run", "-d", "/no/such/dir")
        .failure()
        .stderr(predicate::str::contains("图片目录不存在"));
    Ok(())
}

#[test]
fn clean_removes_checkpoints() -> Result<()> {
    let ckpt = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let out = assert_fs::TempDir::new()?;
    make_images(images.path())?;

    cargo_run!(
        "imcluster",
        "-c",
        ckpt.path(),
        "run",
        "-d",
        images.path(),
        "-o",
        out.path(),
        "--models",
        "blocks",
        "--methods",
        "kmeans",
        "-k",
        "2"
    )
    .success();
    assert!(ckpt.path().join("blocks_features.bin").exists());

    cargo_run!("imcluster", "-c", ckpt.path(), "clean").success();
    assert!(!ckpt.path().join("blocks_features.bin").exists());
    assert!(!ckpt.path().join("blocks_clustering.bin").exists());
    Ok(())
}

#[test]
fn report_regenerates_summaries() -> Result<()> {
    let ckpt = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let out = assert_fs::TempDir::new()?;
    make_images(images.path())?;

    cargo_run!(
        "imcluster",
        "-c",
        ckpt.path(),
        "run",
        "-d",
        images.path(),
        "-o",
        out.path(),
        "--models",
        "blocks",
        "--methods",
        "kmeans",
        "-k",
        "2"
    )
    .success();

    fs::remove_file(out.path().join("best_models.csv"))?;
    cargo_run!("imcluster", "report", "-o", out.path()).success();
    assert!(out.path().join("best_models.csv").exists());
    Ok(())
}
