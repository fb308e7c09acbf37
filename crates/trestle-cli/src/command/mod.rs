use clap::{Parser, Subcommand};

use self::{inspect::InspectArg, sample::SampleArg, train::TrainArg};

mod inspect;
mod sample;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train bridge-building policies with population-based training
    Train(#[clap(flatten)] TrainArg),
    /// Show the rows of a checkpoint file
    Inspect(#[clap(flatten)] InspectArg),
    /// Build one bridge with an exported policy model
    Sample(#[clap(flatten)] SampleArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Inspect(arg) => inspect::run(&arg)?,
        Mode::Sample(arg) => sample::run(&arg)?,
    }
    Ok(())
}
