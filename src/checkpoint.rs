use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::CheckpointDir;

/// 一个模型提取出的完整特征集：按行展开的特征矩阵和对应的图片路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub dim: usize,
    pub features: Vec<f32>,
    pub image_paths: Vec<String>,
}

impl FeatureSet {
    pub fn new(dim: usize) -> Self {
        Self { dim, features: vec![], image_paths: vec![] }
    }

    pub fn push(&mut self, path: String, features: Vec<f32>) {
        debug_assert_eq!(features.len(), self.dim);
        self.features.extend(features);
        self.image_paths.push(path);
    }

    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    /// 以二维矩阵视图访问特征，每行对应一张图片
    pub fn matrix(&self) -> Result<ArrayView2<f32>> {
        ArrayView2::from_shape((self.len(), self.dim), &self.features)
            .context("特征数据与维度不一致，检查点文件可能已损坏")
    }
}

/// 每个模型的聚类结果：方法名 => 簇标签，标签顺序与 image_paths 一一对应
pub type ClusteringSet = BTreeMap<String, Vec<i32>>;

/// 流水线进度，"哪些工作已经完成"的唯一权威来源
///
/// completed_models 中的模型所有聚类方法都已产出结果；
/// features_extracted 为 true 的模型所有图片都已提取特征。
/// 文件是否存在只作为派生信息，不参与完成判定。
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub completed_models: BTreeSet<String>,
    pub current_model: Option<String>,
    pub features_extracted: BTreeMap<String, bool>,
}

/// 检查点存储：进度文件加每个模型的特征、聚类产物
///
/// 所有修改操作在返回前都会把进度落盘，进程随时被杀最多丢失
/// 正在进行中的那一个工作单元。持久化失败直接向上传播，
/// 没有持久化保证的检查点毫无意义。
pub struct CheckpointStore {
    dir: CheckpointDir,
    progress: ProgressState,
}

impl CheckpointStore {
    /// 打开或创建检查点目录，加载已有进度。重复调用结果一致
    pub fn open(dir: CheckpointDir) -> Result<Self> {
        fs::create_dir_all(dir.path())
            .with_context(|| format!("无法创建检查点目录: {}", dir.path().display()))?;

        let progress_file = dir.progress();
        let mut store = Self { dir, progress: ProgressState::default() };
        if progress_file.exists() {
            let data = fs::read_to_string(&progress_file)
                .with_context(|| format!("无法读取进度文件: {}", progress_file.display()))?;
            store.progress = serde_json::from_str(&data)
                .with_context(|| format!("进度文件格式错误: {}", progress_file.display()))?;
        } else {
            store.persist()?;
        }
        Ok(store)
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn features_extracted(&self, model: &str) -> bool {
        self.progress.features_extracted.get(model).copied().unwrap_or(false)
    }

    pub fn is_completed(&self, model: &str) -> bool {
        self.progress.completed_models.contains(model)
    }

    pub fn set_current_model(&mut self, model: Option<&str>) -> Result<()> {
        self.progress.current_model = model.map(str::to_string);
        self.persist()
    }

    /// 保存一个模型的特征集并标记特征提取完成，重复保存直接覆盖
    pub fn save_features(&mut self, model: &str, set: &FeatureSet) -> Result<()> {
        write_bincode(&self.dir.features(model), set)?;
        self.progress.features_extracted.insert(model.to_string(), true);
        self.persist()
    }

    /// 读取已保存的特征集，从未保存过时返回 None，调用方应重新提取
    pub fn load_features(&self, model: &str) -> Result<Option<FeatureSet>> {
        read_bincode(&self.dir.features(model))
    }

    /// 保存一个模型的聚类结果，complete 为真时把模型标记为已完成
    ///
    /// completed_models 是集合，重复保存不会产生重复项。
    pub fn save_clustering(
        &mut self,
        model: &str,
        results: &ClusteringSet,
        complete: bool,
    ) -> Result<()> {
        write_bincode(&self.dir.clustering(model), results)?;
        if complete {
            self.progress.completed_models.insert(model.to_string());
        }
        self.persist()
    }

    pub fn load_clustering(&self, model: &str) -> Result<Option<ClusteringSet>> {
        read_bincode(&self.dir.clustering(model))
    }

    /// 删除指定模型（或全部）的产物并重置对应进度
    pub fn clear(&mut self, model: Option<&str>) -> Result<()> {
        let models: Vec<String> = match model {
            Some(m) => vec![m.to_string()],
            None => self
                .progress
                .features_extracted
                .keys()
                .chain(self.progress.completed_models.iter())
                .cloned()
                .collect(),
        };

        for m in &models {
            remove_if_exists(&self.dir.features(m))?;
            remove_if_exists(&self.dir.clustering(m))?;
            self.progress.completed_models.remove(m);
            self.progress.features_extracted.remove(m);
        }
        if self.progress.current_model.as_deref().is_some_and(|c| model.is_none() || model == Some(c)) {
            self.progress.current_model = None;
        }
        self.persist()
    }

    /// 把进度写入 progress.json，先写临时文件再原子重命名
    fn persist(&self) -> Result<()> {
        let path = self.dir.progress();
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(&self.progress)?;
        fs::write(&tmp, data)
            .with_context(|| format!("无法写入进度文件: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("无法更新进度文件: {}", path.display()))?;
        Ok(())
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = bincode::serialize(value)?;
    fs::write(path, data).with_context(|| format!("无法写入检查点文件: {}", path.display()))
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data =
        fs::read(path).with_context(|| format!("无法读取检查点文件: {}", path.display()))?;
    let value = bincode::deserialize(&data)
        .with_context(|| format!("检查点文件已损坏: {}", path.display()))?;
    Ok(Some(value))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("无法删除检查点文件: {}", path.display()))?;
    }
    Ok(())
}
