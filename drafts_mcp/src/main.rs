use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drafts_core::{
    CallbackServer, DraftsClient, DraftsStore, JsonRpcHandler, McpServer, StdioTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Stdout carries the JSON-RPC stream; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Drafts MCP server");

    let callbacks = Arc::new(CallbackServer::new());
    let port = callbacks.start().await?;
    info!(port, "Callback listener ready");

    let client = Arc::new(DraftsClient::new(Arc::clone(&callbacks)));
    let store = Arc::new(DraftsStore::open_default()?);

    let server = McpServer::new(client, store);
    let handler = JsonRpcHandler::new(server);
    let transport = StdioTransport::new(handler);

    info!("MCP server ready, listening on stdio");

    let result = transport.run().await;

    // Reject any in-flight invocations before exiting.
    callbacks.stop().await;

    if let Err(e) = result {
        error!("Transport error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
