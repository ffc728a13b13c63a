//! `imagefs`: read images through loader chains, inspect disk caches and
//! browse VFS mounts from the command line.

mod args;
mod commands;
mod config;

use std::process::ExitCode;

use clap::Parser;

use crate::args::Args;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let result = config::resolve(&args).and_then(|config| commands::run(args.command, config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
