use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::Parser;
use directories::ProjectDirs;

use crate::cli::*;
use crate::cluster::Method;
use crate::features::Model;

static CHECKPOINT_DIR: LazyLock<CheckpointDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "imcluster").expect("failed to get project dir");
    CheckpointDir { path: proj_dirs.data_dir().join("checkpoints") }
});

fn default_checkpoint_dir() -> &'static str {
    CHECKPOINT_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imcluster", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 检查点目录，保存特征、聚类结果和进度文件
    #[arg(short = 'c', long, default_value = default_checkpoint_dir())]
    pub checkpoint_dir: CheckpointDir,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 运行完整的评估流水线：特征提取、聚类、评分、报告
    Run(RunCommand),
    /// 下载远程文件（数据集或模型权重），支持断点续传
    Download(DownloadCommand),
    /// 根据已有的 model_comparison.csv 重新生成汇总报告
    Report(ReportCommand),
    /// 清理检查点目录中的进度和中间产物
    Clean(CleanCommand),
}

/// 流水线评估的通用选项
#[derive(Parser, Debug, Clone)]
pub struct EvalOptions {
    /// 参与对比的特征提取模型，按给定顺序处理
    #[arg(short = 'm', long, value_enum, value_delimiter = ',',
          default_values_t = [Model::Hist, Model::RgbHist, Model::Gradient, Model::Blocks])]
    pub models: Vec<Model>,
    /// 参与对比的聚类方法，按给定顺序处理
    #[arg(short = 'M', long, value_enum, value_delimiter = ',',
          default_values_t = [Method::KMeans, Method::Dbscan, Method::Hierarchical])]
    pub methods: Vec<Method>,
    /// kmeans 与层次聚类的目标簇数量
    #[arg(short = 'k', long, value_name = "N", default_value_t = 5)]
    pub n_clusters: usize,
    /// DBSCAN 的邻域半径
    #[arg(long, value_name = "EPS", default_value_t = 0.5)]
    pub eps: f32,
    /// DBSCAN 的核心点最小邻居数量
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub min_samples: usize,
}

#[derive(Debug, Clone)]
pub struct CheckpointDir {
    path: PathBuf,
}

impl CheckpointDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回进度文件的路径
    pub fn progress(&self) -> PathBuf {
        self.path.join("progress.json")
    }

    /// 返回指定模型的特征文件路径
    pub fn features(&self, model: &str) -> PathBuf {
        self.path.join(format!("{model}_features.bin"))
    }

    /// 返回指定模型的聚类结果文件路径
    pub fn clustering(&self, model: &str) -> PathBuf {
        self.path.join(format!("{model}_clustering.bin"))
    }

    /// 返回下载文件的默认存放目录
    pub fn downloads(&self) -> PathBuf {
        self.path.join("downloads")
    }
}

impl FromStr for CheckpointDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
