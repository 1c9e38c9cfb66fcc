use clap::Parser;
use k_export::export::export_config::ExportConfig;
use k_export::export::result_error::error::Error;
use k_export::export::result_error::result::{convert_error_vec, Result};
use k_export::export::result_error::AddMsg;
use rayon::ThreadPoolBuilder;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Dump Postgres databases with pg_dump and report the produced artifacts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,

    /// Number of exports running at the same time (defaults to the number of CPUs)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn run(args: &Args) -> Result<()> {
    let config = File::open(&args.config)
        .map_err(Error::from)
        .and_then(ExportConfig::from_reader)
        .add_msg(format!("Loading config failed: {:?}", &args.config))?;

    let thread_pool = ThreadPoolBuilder::new()
        .num_threads(args.threads.unwrap_or(0))
        .build()?;

    let errors = config
        .run_all(&thread_pool)
        .into_iter()
        .filter_map(|result| {
            let stdout = result.stdout().clone();
            match config.finalize(result) {
                Ok(path) => {
                    info!("Created export artifact: {:?}", path);
                    if !stdout.is_empty() {
                        info!("pg_dump output:\n{}", stdout);
                    }
                    None
                }
                Err(e) => Some(e),
            }
        })
        .collect();

    convert_error_vec(errors)
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{e}");
        exit(1);
    }
}
