//! Flowrun server entry point
//!
//! Loads configuration from the environment and serves:
//! - Workflow execution at POST /api/workflow/execute
//! - Cron triggers at /api/triggers
//! - Health check at /healthz

use flowrun::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    start_server(config).await?;

    Ok(())
}
