// tailpack entry point

use anyhow::Context;
use tailpack::cli::{CliHandler, Outcome};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<Outcome> {
    CliHandler::new().run().await.context("tailpack failed")
}
