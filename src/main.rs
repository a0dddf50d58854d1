use anyhow::Result;
use clap::Parser;

use spectra_clean::cli::{plan_files, Args};
use spectra_clean::pipeline::run;
use spectra_clean::WpcaBasis;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let files = plan_files(&args.inputs)?;
    let opts = args.pipeline_options();

    run(&files, &opts, &WpcaBasis::default())
}
