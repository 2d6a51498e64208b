use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;
use ndarray::prelude::*;

use crate::pipeline::ComparisonRow;

const METRICS: &[&str] = &["Silhouette Score", "Calinski-Harabasz Score", "Davies-Bouldin Score"];

/// 散点图的调色板，噪声点 (-1) 固定使用灰色
const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// 把对比结果写成 model_comparison.csv
pub fn write_comparison_csv(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut out = String::from(
        "Model,Clustering Method,Silhouette Score,Calinski-Harabasz Score,Davies-Bouldin Score,Number of Features\n",
    );
    for row in rows {
        writeln!(
            out,
            "{},{},{:.6},{:.6},{:.6},{}",
            row.model,
            row.method,
            row.silhouette,
            row.calinski_harabasz,
            row.davies_bouldin,
            row.n_features
        )?;
    }
    fs::write(path, out).with_context(|| format!("无法写入对比文件: {}", path.display()))?;
    info!("对比结果已写入 {}", path.display());
    Ok(())
}

/// 读回 model_comparison.csv，供 report 子命令重新生成汇总
pub fn read_comparison_csv(path: &Path) -> Result<Vec<ComparisonRow>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("无法读取对比文件: {}", path.display()))?;

    let mut rows = vec![];
    for line in data.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 6 {
            bail!("对比文件格式错误: {line}");
        }
        rows.push(ComparisonRow {
            model: fields[0].to_string(),
            method: fields[1].to_string(),
            silhouette: fields[2].parse()?,
            calinski_harabasz: fields[3].parse()?,
            davies_bouldin: fields[4].parse()?,
            n_features: fields[5].parse()?,
        });
    }
    Ok(rows)
}

/// 为一个 (模型, 方法) 组合生成交互式散点图页面
///
/// reduced 是特征的二维 PCA 投影，每个点按簇标签着色。
pub fn write_cluster_plot(
    out_dir: &Path,
    model: &str,
    method: &str,
    reduced: ArrayView2<f32>,
    labels: &[i32],
) -> Result<PathBuf> {
    let path = out_dir.join(format!("{model}_{method}_clustering.html"));
    let svg = scatter_svg(reduced, labels);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Clustering Results: {model} - {method}</title>
<style>body {{ font-family: Arial, sans-serif; margin: 40px; }} h1 {{ color: #2c3e50; }}</style>
</head>
<body>
<h1>Clustering Results: {model} - {method}</h1>
{svg}
</body>
</html>
"#
    );
    fs::write(&path, html).with_context(|| format!("无法写入散点图: {}", path.display()))?;
    Ok(path)
}

fn scatter_svg(reduced: ArrayView2<f32>, labels: &[i32]) -> String {
    const W: f32 = 640.0;
    const H: f32 = 480.0;
    const MARGIN: f32 = 40.0;

    let range = |col: ArrayView1<f32>| {
        let min = col.iter().copied().fold(f32::INFINITY, f32::min);
        let max = col.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if (max - min).abs() < f32::EPSILON { (min - 1.0, max + 1.0) } else { (min, max) }
    };
    let (x_min, x_max) = range(reduced.column(0));
    let (y_min, y_max) = range(reduced.column(1));

    let mut svg = format!(
        r##"<svg width="{W}" height="{H}" xmlns="http://www.w3.org/2000/svg">
<rect width="{W}" height="{H}" fill="white" stroke="#ddd"/>"##
    );
    for (point, &label) in reduced.rows().into_iter().zip(labels) {
        let cx = MARGIN + (point[0] - x_min) / (x_max - x_min) * (W - 2.0 * MARGIN);
        // SVG 的 y 轴向下，翻转一次
        let cy = H - MARGIN - (point[1] - y_min) / (y_max - y_min) * (H - 2.0 * MARGIN);
        let color = match label {
            l if l < 0 => "#999999",
            l => PALETTE[l as usize % PALETTE.len()],
        };
        let _ = write!(
            svg,
            r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="4" fill="{color}"><title>cluster {label}</title></circle>"#
        );
    }
    svg.push_str("</svg>");
    svg
}

/// 写出每个模型的汇总统计和按指标的最优组合
pub fn write_summary(out_dir: &Path, rows: &[ComparisonRow]) -> Result<()> {
    write_statistics_csv(&out_dir.join("performance_statistics.csv"), rows)?;
    write_best_models_csv(&out_dir.join("best_models.csv"), rows)?;
    Ok(())
}

fn metric_of(row: &ComparisonRow, metric: &str) -> f64 {
    match metric {
        "Silhouette Score" => row.silhouette,
        "Calinski-Harabasz Score" => row.calinski_harabasz,
        "Davies-Bouldin Score" => row.davies_bouldin,
        _ => unreachable!(),
    }
}

/// Davies-Bouldin 越小越好，其余指标越大越好
fn is_better(metric: &str, a: f64, b: f64) -> bool {
    if metric == "Davies-Bouldin Score" { a < b } else { a > b }
}

fn write_statistics_csv(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut models: Vec<&str> = rows.iter().map(|r| r.model.as_str()).collect();
    models.dedup();

    let mut out = String::from("Model,Metric,Mean,Std,Min,Max\n");
    for model in models {
        for metric in METRICS {
            let values: Vec<f64> = rows
                .iter()
                .filter(|r| r.model == model)
                .map(|r| metric_of(r, metric))
                .collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / values.len() as f64)
                .sqrt();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            writeln!(out, "{model},{metric},{mean:.6},{std:.6},{min:.6},{max:.6}")?;
        }
    }
    fs::write(path, out).with_context(|| format!("无法写入统计文件: {}", path.display()))
}

fn write_best_models_csv(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut out = String::from("Metric,Best Model,Best Method,Score\n");
    for metric in METRICS {
        let Some(best) = rows.iter().reduce(|best, row| {
            if is_better(metric, metric_of(row, metric), metric_of(best, metric)) { row } else { best }
        }) else {
            continue;
        };
        writeln!(out, "{metric},{},{},{:.6}", best.model, best.method, metric_of(best, metric))?;
    }
    fs::write(path, out).with_context(|| format!("无法写入最优模型文件: {}", path.display()))
}

/// 生成汇总所有产物的评估报告页面
pub fn write_report_html(out_dir: &Path, rows: &[ComparisonRow]) -> Result<()> {
    let mut table = String::from(
        "<table><tr><th>Model</th><th>Clustering Method</th><th>Silhouette</th>\
         <th>Calinski-Harabasz</th><th>Davies-Bouldin</th><th>Features</th></tr>\n",
    );
    for row in rows {
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{:.4}</td><td>{:.4}</td><td>{:.4}</td><td>{}</td></tr>",
            row.model,
            row.method,
            row.silhouette,
            row.calinski_harabasz,
            row.davies_bouldin,
            row.n_features
        );
    }
    table.push_str("</table>");

    let mut plots = String::new();
    for row in rows {
        let name = format!("{}_{}_clustering.html", row.model, row.method);
        let _ = writeln!(plots, r#"<li><a href="{name}">{} / {}</a></li>"#, row.model, row.method);
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Model Evaluation Report</title>
<style>
body {{ font-family: Arial, sans-serif; margin: 40px; }}
.section {{ margin-bottom: 30px; }}
h1 {{ color: #2c3e50; }}
h2 {{ color: #34495e; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
th {{ background-color: #f5f5f5; }}
</style>
</head>
<body>
<h1>Model Evaluation Report</h1>

<div class="section">
<h2>Model Performance Comparison</h2>
{table}
</div>

<div class="section">
<h2>Clustering Visualizations</h2>
<ul>
{plots}
</ul>
</div>

<div class="section">
<h2>Downloads</h2>
<ul>
<li><a href="model_comparison.csv">model_comparison.csv</a></li>
<li><a href="performance_statistics.csv">performance_statistics.csv</a></li>
<li><a href="best_models.csv">best_models.csv</a></li>
</ul>
</div>
</body>
</html>
"#
    );
    let path = out_dir.join("evaluation_report.html");
    fs::write(&path, html).with_context(|| format!("无法写入评估报告: {}", path.display()))?;
    info!("评估报告已写入 {}", path.display());
    Ok(())
}
