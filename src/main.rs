// src/main.rs

use std::process::ExitCode;

use sequencer::{cli, logging, run};

// Returning (rather than calling `process::exit`) lets the runtime shut down
// first, which drops in-flight pipelines and kills their programs.
#[tokio::main]
async fn main() -> ExitCode {
    match run_main().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("sequencer error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.effective_log_level())?;
    run(args).await
}
