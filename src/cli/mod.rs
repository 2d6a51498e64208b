mod clean;
mod download;
mod report;
mod run;

pub use clean::*;
pub use download::*;
pub use report::*;
pub use run::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}
