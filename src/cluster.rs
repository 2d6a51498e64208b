use anyhow::{Result, bail};
use clap::ValueEnum;
use kmeans::{EuclideanDistance, KMeans, KMeansConfig};
use ndarray::prelude::*;

use crate::matrix::pairwise_euclidean;

/// DBSCAN 噪声点的标签
pub const NOISE: i32 = -1;

/// 聚类算法的统一接口：特征矩阵 => 每行一个整数簇标签
pub trait ClusterProvider {
    fn id(&self) -> &'static str;
    fn fit_predict(&self, features: ArrayView2<f32>) -> Result<Vec<i32>>;
}

/// 内置的聚类方法，通过启动参数选择
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    #[value(name = "kmeans")]
    KMeans,
    #[value(name = "dbscan")]
    Dbscan,
    #[value(name = "hierarchical")]
    Hierarchical,
}

impl Method {
    pub fn id(&self) -> &'static str {
        match self {
            Method::KMeans => "kmeans",
            Method::Dbscan => "dbscan",
            Method::Hierarchical => "hierarchical",
        }
    }

    pub fn provider(self, params: ClusterParams) -> MethodProvider {
        MethodProvider { method: self, params }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// 聚类方法的超参数，所有方法共享一份
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub n_clusters: usize,
    pub eps: f32,
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { n_clusters: 5, eps: 0.5, min_samples: 5 }
    }
}

pub struct MethodProvider {
    method: Method,
    params: ClusterParams,
}

impl ClusterProvider for MethodProvider {
    fn id(&self) -> &'static str {
        self.method.id()
    }

    fn fit_predict(&self, features: ArrayView2<f32>) -> Result<Vec<i32>> {
        match self.method {
            Method::KMeans => kmeans_labels(features, self.params.n_clusters),
            Method::Dbscan => Ok(dbscan_labels(features, self.params.eps, self.params.min_samples)),
            Method::Hierarchical => hierarchical_labels(features, self.params.n_clusters),
        }
    }
}

/// 使用 kmeans (lloyd) 聚类，返回每个样本的簇标签
///
/// 特征维度必须是 16 的倍数，内置模型的输出都满足这个条件。
fn kmeans_labels(features: ArrayView2<f32>, k: usize) -> Result<Vec<i32>> {
    let (n, d) = features.dim();
    if n < k {
        bail!("样本数量 {n} 少于簇数量 {k}，无法进行 kmeans 聚类");
    }

    let x = features.iter().copied().collect::<Vec<_>>();
    let km: KMeans<_, 16, _> = KMeans::new(&x, n, d, EuclideanDistance);
    let result = km.kmeans_lloyd(k, 100, KMeans::init_random_partition, &KMeansConfig::default());
    Ok(result.assignments.iter().map(|&a| a as i32).collect())
}

/// 经典 DBSCAN，噪声点标记为 -1
fn dbscan_labels(features: ArrayView2<f32>, eps: f32, min_samples: usize) -> Vec<i32> {
    const UNVISITED: i32 = -2;

    let n = features.nrows();
    let dist = pairwise_euclidean(features);
    let neighbors = |i: usize| -> Vec<usize> {
        (0..n).filter(|&j| dist[[i, j]] <= eps).collect()
    };

    let mut labels = vec![UNVISITED; n];
    let mut cluster = 0;
    for i in 0..n {
        if labels[i] != UNVISITED {
            continue;
        }
        let seeds = neighbors(i);
        if seeds.len() < min_samples {
            labels[i] = NOISE;
            continue;
        }

        labels[i] = cluster;
        let mut queue = seeds;
        while let Some(j) = queue.pop() {
            if labels[j] == NOISE {
                labels[j] = cluster;
            }
            if labels[j] != UNVISITED {
                continue;
            }
            labels[j] = cluster;
            let next = neighbors(j);
            if next.len() >= min_samples {
                queue.extend(next);
            }
        }
        cluster += 1;
    }
    labels
}

/// 平均链接的凝聚层次聚类，合并到剩余 k 个簇为止
fn hierarchical_labels(features: ArrayView2<f32>, k: usize) -> Result<Vec<i32>> {
    let n = features.nrows();
    if n < k {
        bail!("样本数量 {n} 少于簇数量 {k}，无法进行层次聚类");
    }

    let dist = pairwise_euclidean(features);
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > k {
        let mut best = (0, 1, f32::INFINITY);
        for a in 0..clusters.len() {
            for b in a + 1..clusters.len() {
                let linkage = average_linkage(&dist, &clusters[a], &clusters[b]);
                if linkage < best.2 {
                    best = (a, b, linkage);
                }
            }
        }
        let merged = clusters.swap_remove(best.1);
        clusters[best.0].extend(merged);
    }

    let mut labels = vec![0; n];
    for (c, members) in clusters.iter().enumerate() {
        for &i in members {
            labels[i] = c as i32;
        }
    }
    Ok(labels)
}

fn average_linkage(dist: &Array2<f32>, a: &[usize], b: &[usize]) -> f32 {
    let sum: f32 = a.iter().flat_map(|&i| b.iter().map(move |&j| dist[[i, j]])).sum();
    sum / (a.len() * b.len()) as f32
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// 两个相距很远的 16 维点团
    fn two_blobs() -> Array2<f32> {
        let mut x = Array2::zeros((12, 16));
        for i in 0..12 {
            let base = if i < 6 { 0.0 } else { 100.0 };
            for j in 0..16 {
                x[[i, j]] = base + (i * 7 % 3) as f32 * 0.1 + j as f32 * 0.01;
            }
        }
        x
    }

    fn assert_partition(labels: &[i32]) {
        assert_eq!(labels.len(), 12);
        assert!(labels[..6].iter().all(|&l| l == labels[0]));
        assert!(labels[6..].iter().all(|&l| l == labels[6]));
        assert_ne!(labels[0], labels[6]);
    }

    #[rstest]
    #[case::kmeans(Method::KMeans)]
    #[case::dbscan(Method::Dbscan)]
    #[case::hierarchical(Method::Hierarchical)]
    fn test_two_blobs_partition(#[case] method: Method) {
        let params = ClusterParams { n_clusters: 2, eps: 5.0, min_samples: 3 };
        let x = two_blobs();
        let labels = method.provider(params).fit_predict(x.view()).unwrap();
        assert_partition(&labels);
    }

    #[rstest]
    #[case::kmeans(Method::KMeans)]
    #[case::hierarchical(Method::Hierarchical)]
    fn test_too_few_samples(#[case] method: Method) {
        let x = Array2::zeros((3, 16));
        let params = ClusterParams { n_clusters: 5, ..Default::default() };
        assert!(method.provider(params).fit_predict(x.view()).is_err());
    }

    #[test]
    fn test_dbscan_all_noise() {
        let x = two_blobs();
        let labels = dbscan_labels(x.view(), 1e-6, 3);
        assert!(labels.iter().all(|&l| l == NOISE));
    }
}
