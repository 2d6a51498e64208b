use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::report;

#[derive(Parser, Debug, Clone)]
pub struct ReportCommand {
    /// 包含 model_comparison.csv 的结果目录
    #[arg(short = 'o', long, value_name = "DIR", default_value = "results")]
    pub output_dir: PathBuf,
}

impl SubCommandExtend for ReportCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let rows = report::read_comparison_csv(&self.output_dir.join("model_comparison.csv"))?;
        report::write_summary(&self.output_dir, &rows)?;
        report::write_report_html(&self.output_dir, &rows)?;
        info!("已根据 {} 条对比结果重新生成报告", rows.len());
        Ok(())
    }
}
