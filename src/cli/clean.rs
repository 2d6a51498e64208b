use anyhow::Result;
use clap::Parser;
use log::info;

use crate::checkpoint::CheckpointStore;
use crate::cli::SubCommandExtend;
use crate::config::Opts;

#[derive(Parser, Debug, Clone)]
pub struct CleanCommand {
    /// 只清理指定模型的产物，不指定时清理全部
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,
}

impl SubCommandExtend for CleanCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let mut store = CheckpointStore::open(opts.checkpoint_dir.clone())?;
        store.clear(self.model.as_deref())?;
        info!("清理完成");
        Ok(())
    }
}
