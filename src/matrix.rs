use ndarray::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;

/// 计算所有行向量两两之间的欧氏距离
pub fn pairwise_euclidean(x: ArrayView2<f32>) -> Array2<f32> {
    let n = x.nrows();
    let mut dist = Array2::zeros((n, n));
    for i in 0..n {
        for j in i + 1..n {
            let d = euclidean(x.row(i), x.row(j));
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }
    dist
}

pub fn euclidean(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// 把特征矩阵投影到前两个主成分上，用于绘制散点图
///
/// 通过幂迭代求协方差矩阵的前两个特征向量，样本数不足时返回零矩阵。
pub fn pca_2d(x: ArrayView2<f32>) -> Array2<f32> {
    let (n, d) = x.dim();
    if n < 2 || d < 2 {
        return Array2::zeros((n, 2));
    }

    let mean = x.mean_axis(Axis(0)).expect("n >= 2");
    let centered = &x - &mean.broadcast((n, d)).expect("broadcast mean");
    let mut cov = centered.t().dot(&centered) / (n as f32 - 1.0);

    let mut rng = StdRng::seed_from_u64(42);
    let mut reduced = Array2::zeros((n, 2));
    for k in 0..2 {
        let axis = power_iteration(cov.view(), &mut rng);
        let proj = centered.dot(&axis);
        reduced.column_mut(k).assign(&proj);

        // 从协方差矩阵中扣除已求出的主成分
        let lambda = axis.dot(&cov.dot(&axis));
        let outer = axis
            .view()
            .insert_axis(Axis(1))
            .dot(&axis.view().insert_axis(Axis(0)));
        cov = cov - lambda * &outer;
    }
    reduced
}

fn power_iteration(a: ArrayView2<f32>, rng: &mut StdRng) -> Array1<f32> {
    let d = a.nrows();
    let mut v = Array1::from_iter((0..d).map(|_| rng.random::<f32>() - 0.5));
    for _ in 0..100 {
        let next = a.dot(&v);
        let norm = next.dot(&next).sqrt();
        if norm < f32::EPSILON {
            break;
        }
        v = next / norm;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairwise_euclidean() {
        let x = array![[0.0, 0.0], [3.0, 4.0]];
        let dist = pairwise_euclidean(x.view());
        assert_eq!(dist[[0, 0]], 0.0);
        assert_eq!(dist[[0, 1]], 5.0);
        assert_eq!(dist[[1, 0]], 5.0);
    }

    #[test]
    fn test_pca_keeps_main_axis() {
        // 数据沿 (1, 1, 0, ...) 方向分布，第一主成分应该捕获绝大部分方差
        let mut x = Array2::zeros((20, 4));
        for i in 0..20 {
            let t = i as f32;
            x[[i, 0]] = t;
            x[[i, 1]] = t + 0.01 * (i % 3) as f32;
        }
        let reduced = pca_2d(x.view());
        assert_eq!(reduced.dim(), (20, 2));

        let var = |col: ArrayView1<f32>| {
            let mean = col.sum() / col.len() as f32;
            col.iter().map(|v| (v - mean).powi(2)).sum::<f32>()
        };
        assert!(var(reduced.column(0)) > var(reduced.column(1)) * 10.0);
    }

    #[test]
    fn test_pca_degenerate() {
        let x = array![[1.0, 2.0, 3.0]];
        let reduced = pca_2d(x.view());
        assert_eq!(reduced, array![[0.0, 0.0]]);
    }
}
