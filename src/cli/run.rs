use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::checkpoint::CheckpointStore;
use crate::cli::SubCommandExtend;
use crate::cluster::{ClusterParams, ClusterProvider};
use crate::config::{EvalOptions, Opts};
use crate::features::FeatureProvider;
use crate::pipeline::Pipeline;
use crate::{matrix, report, utils};

#[derive(Parser, Debug, Clone)]
pub struct RunCommand {
    /// 待聚类的图片目录
    #[arg(short = 'd', long, value_name = "DIR")]
    pub image_dir: PathBuf,
    /// 报告和图表的输出目录
    #[arg(short = 'o', long, value_name = "DIR", default_value = "results")]
    pub output_dir: PathBuf,
    #[command(flatten)]
    pub eval: EvalOptions,
}

impl SubCommandExtend for RunCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let images = utils::scan_images(&self.image_dir)?;
        info!("共找到 {} 张图片", images.len());

        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("无法创建输出目录: {}", self.output_dir.display()))?;
        let mut store = CheckpointStore::open(opts.checkpoint_dir.clone())?;

        let params = ClusterParams {
            n_clusters: self.eval.n_clusters,
            eps: self.eval.eps,
            min_samples: self.eval.min_samples,
        };
        let models: Vec<Box<dyn FeatureProvider>> =
            self.eval.models.iter().map(|&m| Box::new(m) as _).collect();
        let methods: Vec<Box<dyn ClusterProvider>> =
            self.eval.methods.iter().map(|&m| Box::new(m.provider(params)) as _).collect();

        let rows = Pipeline::new(&mut store).run(&images, &models, &methods)?;

        report::write_comparison_csv(&self.output_dir.join("model_comparison.csv"), &rows)?;
        self.write_plots(&store)?;
        report::write_summary(&self.output_dir, &rows)?;
        report::write_report_html(&self.output_dir, &rows)?;

        info!("评估完成，共 {} 条对比结果", rows.len());
        Ok(())
    }
}

impl RunCommand {
    /// 为所有已有聚类结果的组合绘制散点图
    fn write_plots(&self, store: &CheckpointStore) -> Result<()> {
        for model in &self.eval.models {
            let Some(set) = store.load_features(model.id())? else {
                continue;
            };
            let Some(results) = store.load_clustering(model.id())? else {
                continue;
            };

            let reduced = matrix::pca_2d(set.matrix()?);
            for method in &self.eval.methods {
                if let Some(labels) = results.get(method.id()) {
                    report::write_cluster_plot(
                        &self.output_dir,
                        model.id(),
                        method.id(),
                        reduced.view(),
                        labels,
                    )?;
                }
            }
        }
        Ok(())
    }
}
