use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use imcluster::cli::SubCommandExtend;
use imcluster::config::{Opts, SubCommand};

fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", "info"));

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Run(config) => config.run(&opts),
        SubCommand::Download(config) => config.run(&opts),
        SubCommand::Report(config) => config.run(&opts),
        SubCommand::Clean(config) => config.run(&opts),
    }
}
