use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use completion_bootstrap::{
    initialize_all,
    processing::{GenerationQueue, DEFAULT_QUEUE_CAPACITY},
    utils::{setup_logging, LogConfig},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    setup_logging(LogConfig {
        level: tracing::Level::INFO,
        ..Default::default()
    })
    .map_err(|e| anyhow!(e))?;

    // MODEL_ROOT and COMPUTE_DEVICE override the defaults
    info!("Initializing pipeline...");
    let bundle = tokio::task::spawn_blocking(initialize_all).await??;
    let queue = GenerationQueue::new(Arc::clone(bundle.engine()), DEFAULT_QUEUE_CAPACITY);

    info!(backend = %bundle.backend(), "Pipeline ready. Starting interaction loop...");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        match queue.submit(input).await {
            Ok(completion) => {
                println!("{}", completion.text);
                info!(
                    tokens = completion.generated_tokens,
                    time_ms = completion.elapsed.as_millis() as u64,
                    "Processing complete"
                );
            }
            Err(e) => println!("Generation failed: {}", e),
        }
    }

    info!("Shutting down...");
    queue.shutdown().await;

    let metrics = bundle.engine().metrics();
    info!(
        requests = metrics.total_requests,
        failed = metrics.failed_requests,
        tokens_per_second = metrics.tokens_per_second,
        "Session summary"
    );
    Ok(())
}
