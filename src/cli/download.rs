use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use reqwest::blocking::Client;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::download::{download_with_resume, file_name_of};

#[derive(Parser, Debug, Clone)]
pub struct DownloadCommand {
    /// 要下载的文件 URL
    pub url: String,
    /// 保存路径，默认按 URL 中的文件名存入检查点目录的 downloads 子目录
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl SubCommandExtend for DownloadCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let dest = match &self.output {
            Some(path) => path.clone(),
            None => opts.checkpoint_dir.downloads().join(file_name_of(&self.url)?),
        };
        download_with_resume(&Client::new(), &self.url, &dest)
    }
}
