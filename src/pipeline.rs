use std::path::PathBuf;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{info, warn};

use crate::checkpoint::{CheckpointStore, ClusteringSet, FeatureSet};
use crate::cluster::ClusterProvider;
use crate::features::FeatureProvider;
use crate::metrics::{self, distinct_labels};
use crate::utils::pb_style;

/// 一条 (模型, 聚类方法) 组合的评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub model: String,
    pub method: String,
    pub silhouette: f64,
    pub calinski_harabasz: f64,
    pub davies_bouldin: f64,
    pub n_features: usize,
}

/// 流水线驱动器：按配置顺序遍历模型和聚类方法，
/// 借助检查点存储跳过已完成的工作
///
/// 单个 (模型, 方法) 单元的失败只记录日志并跳过，不影响其余单元，
/// 也不会在进度中留下完成标记，下次运行会重试。
pub struct Pipeline<'a> {
    store: &'a mut CheckpointStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a mut CheckpointStore) -> Self {
        Self { store }
    }

    /// 运行全部 (模型 x 方法) 组合，返回可以算出评分的对比行
    pub fn run(
        &mut self,
        images: &[PathBuf],
        models: &[Box<dyn FeatureProvider>],
        methods: &[Box<dyn ClusterProvider>],
    ) -> Result<Vec<ComparisonRow>> {
        let mut rows = vec![];
        for model in models {
            self.store.set_current_model(Some(model.id()))?;
            match self.process_model(images, model.as_ref(), methods) {
                Ok(mut model_rows) => rows.append(&mut model_rows),
                Err(e) => warn!("模型 {} 处理失败，跳过: {e:#}", model.id()),
            }
            self.store.set_current_model(None)?;
        }
        Ok(rows)
    }

    fn process_model(
        &mut self,
        images: &[PathBuf],
        model: &dyn FeatureProvider,
        methods: &[Box<dyn ClusterProvider>],
    ) -> Result<Vec<ComparisonRow>> {
        let features = self.ensure_features(images, model)?;
        let matrix = features.matrix()?;
        let results = self.ensure_clustering(model.id(), &features, methods)?;

        // 按配置顺序评分，保证重复运行产出的行顺序一致
        let mut rows = vec![];
        for method in methods {
            let Some(labels) = results.get(method.id()) else {
                continue;
            };
            // 单簇时评分没有定义，静默排除该组合
            if distinct_labels(labels) < 2 {
                info!("{}/{} 只有一个簇，跳过评分", model.id(), method.id());
                continue;
            }
            match metrics::evaluate(matrix, labels) {
                Ok(scores) => rows.push(ComparisonRow {
                    model: model.id().to_string(),
                    method: method.id().to_string(),
                    silhouette: scores.silhouette,
                    calinski_harabasz: scores.calinski_harabasz,
                    davies_bouldin: scores.davies_bouldin,
                    n_features: features.dim,
                }),
                Err(e) => warn!("{}/{} 评分失败，跳过: {e:#}", model.id(), method.id()),
            }
        }
        Ok(rows)
    }

    /// 确保模型的特征存在：优先读取检查点，缺失时重新提取并保存
    fn ensure_features(
        &mut self,
        images: &[PathBuf],
        model: &dyn FeatureProvider,
    ) -> Result<FeatureSet> {
        if self.store.features_extracted(model.id()) {
            if let Some(set) = self.store.load_features(model.id())? {
                info!("模型 {} 的特征已存在，跳过提取", model.id());
                return Ok(set);
            }
            // 进度声称已提取但文件缺失，按未提取处理
            warn!("模型 {} 的特征文件缺失，重新提取", model.id());
        }

        info!("模型 {} 开始提取 {} 张图片的特征", model.id(), images.len());
        let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
        pb.set_message(model.id().to_string());

        let mut set = FeatureSet::new(model.dim());
        for image in images {
            let features = model
                .extract(image)
                .with_context(|| format!("提取特征失败: {}", image.display()))?;
            set.push(image.to_string_lossy().into_owned(), features);
            pb.inc(1);
        }
        pb.finish_and_clear();

        self.store.save_features(model.id(), &set)?;
        Ok(set)
    }

    /// 确保模型的聚类结果存在：从检查点续算缺失的方法
    ///
    /// 只有当全部配置的方法都有结果时才把模型标记为已完成，
    /// 失败的方法留到下次运行重试。
    fn ensure_clustering(
        &mut self,
        model: &str,
        features: &FeatureSet,
        methods: &[Box<dyn ClusterProvider>],
    ) -> Result<ClusteringSet> {
        let mut results = self.store.load_clustering(model)?.unwrap_or_default();
        let matrix = features.matrix()?;

        let mut failed = 0;
        let mut computed = 0;
        for method in methods {
            if results.contains_key(method.id()) {
                continue;
            }
            info!("{model}/{} 开始聚类", method.id());
            match method.fit_predict(matrix) {
                Ok(labels) => {
                    debug_assert_eq!(labels.len(), features.len());
                    results.insert(method.id().to_string(), labels);
                    computed += 1;
                }
                Err(e) => {
                    warn!("{model}/{} 聚类失败，跳过: {e:#}", method.id());
                    failed += 1;
                }
            }
        }

        let complete = failed == 0 && methods.iter().all(|m| results.contains_key(m.id()));
        if computed > 0 || (complete && !self.store.is_completed(model)) {
            self.store.save_clustering(model, &results, complete)?;
        }
        Ok(results)
    }
}
