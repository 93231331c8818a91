use anyhow::Result;
use threatlens_core::{cli, instrumentation};

#[tokio::main]
async fn main() -> Result<()> {
    instrumentation::tracing::init_tracing();
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to the CLI layer.
    // The CLI parses user commands and then calls into the appropriate logic.
    cli::run().await
}
