use std::collections::BTreeMap;

use anyhow::{Result, bail};
use ndarray::prelude::*;

use crate::matrix::{euclidean, pairwise_euclidean};

/// 一组聚类质量评分
///
/// silhouette 和 calinski_harabasz 越大越好，davies_bouldin 越小越好。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterScores {
    pub silhouette: f64,
    pub calinski_harabasz: f64,
    pub davies_bouldin: f64,
}

/// 对一组聚类标签计算全部质量评分
///
/// 调用方必须保证标签中至少有两个不同的簇，单簇下这些评分没有定义。
pub fn evaluate(features: ArrayView2<f32>, labels: &[i32]) -> Result<ClusterScores> {
    let n = features.nrows();
    if labels.len() != n {
        bail!("标签数量 {} 与样本数量 {} 不一致", labels.len(), n);
    }
    let clusters = group_by_label(labels);
    if clusters.len() < 2 {
        bail!("至少需要两个簇才能计算聚类评分");
    }

    Ok(ClusterScores {
        silhouette: silhouette(features, labels, &clusters),
        calinski_harabasz: calinski_harabasz(features, &clusters),
        davies_bouldin: davies_bouldin(features, &clusters),
    })
}

/// 统计标签中不同簇的数量
pub fn distinct_labels(labels: &[i32]) -> usize {
    let mut sorted = labels.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

fn group_by_label(labels: &[i32]) -> BTreeMap<i32, Vec<usize>> {
    let mut clusters: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        clusters.entry(label).or_default().push(i);
    }
    clusters
}

/// 轮廓系数：每个样本 (b - a) / max(a, b) 的均值
///
/// a 为到同簇其它样本的平均距离，b 为到最近的其它簇的平均距离，
/// 单元素簇的样本按惯例记 0。
fn silhouette(features: ArrayView2<f32>, labels: &[i32], clusters: &BTreeMap<i32, Vec<usize>>) -> f64 {
    let n = features.nrows();
    let dist = pairwise_euclidean(features);

    let mut total = 0.0;
    for i in 0..n {
        let own = &clusters[&labels[i]];
        if own.len() == 1 {
            continue;
        }

        let a = own.iter().filter(|&&j| j != i).map(|&j| dist[[i, j]] as f64).sum::<f64>()
            / (own.len() - 1) as f64;
        let b = clusters
            .iter()
            .filter(|&(&label, _)| label != labels[i])
            .map(|(_, members)| {
                members.iter().map(|&j| dist[[i, j]] as f64).sum::<f64>() / members.len() as f64
            })
            .fold(f64::INFINITY, f64::min);

        total += (b - a) / a.max(b);
    }
    total / n as f64
}

/// Calinski-Harabasz 指数：簇间散度与簇内散度的比值
fn calinski_harabasz(features: ArrayView2<f32>, clusters: &BTreeMap<i32, Vec<usize>>) -> f64 {
    let (n, _) = features.dim();
    let k = clusters.len();
    let overall = features.mean_axis(Axis(0)).expect("n >= 2");

    let mut between = 0.0;
    let mut within = 0.0;
    for members in clusters.values() {
        let centroid = centroid(features, members);
        between += members.len() as f64 * sq_dist(centroid.view(), overall.view());
        within += members
            .iter()
            .map(|&i| sq_dist(features.row(i), centroid.view()))
            .sum::<f64>();
    }

    // 簇内散度为零（包括每个样本自成一簇）时比值没有定义，约定为 1.0
    if within == 0.0 {
        return 1.0;
    }
    (between / (k - 1) as f64) / (within / (n - k) as f64)
}

/// Davies-Bouldin 指数：每个簇与其"最相似"簇的相似度的均值
fn davies_bouldin(features: ArrayView2<f32>, clusters: &BTreeMap<i32, Vec<usize>>) -> f64 {
    let centroids: Vec<Array1<f32>> =
        clusters.values().map(|members| centroid(features, members)).collect();
    let scatter: Vec<f64> = clusters
        .values()
        .zip(&centroids)
        .map(|(members, c)| {
            members.iter().map(|&i| euclidean(features.row(i), c.view()) as f64).sum::<f64>()
                / members.len() as f64
        })
        .collect();

    let k = centroids.len();
    let mut total = 0.0;
    for i in 0..k {
        let mut worst: f64 = 0.0;
        for j in 0..k {
            if i == j {
                continue;
            }
            let separation = euclidean(centroids[i].view(), centroids[j].view()) as f64;
            // 两个簇的质心重合时记 0，避免除零
            if separation > 0.0 {
                worst = worst.max((scatter[i] + scatter[j]) / separation);
            }
        }
        total += worst;
    }
    total / k as f64
}

fn centroid(features: ArrayView2<f32>, members: &[usize]) -> Array1<f32> {
    let mut sum = Array1::zeros(features.ncols());
    for &i in members {
        sum = sum + features.row(i);
    }
    sum / members.len() as f32
}

fn sq_dist(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| ((x - y) as f64).powi(2)).sum()
}
