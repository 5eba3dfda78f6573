//cargo run --package filter_pipeline --bin pipeline_mcp_server
use filter_pipeline::mcp::PipelineMcpServer;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // Log to stderr; stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish()
        .init();

    let server = match std::env::var_os("FILTER_PIPELINE_SESSIONS") {
        Some(root) => PipelineMcpServer::new(filter_pipeline::FilterRegistry::with_core_filters(), root),
        None => PipelineMcpServer::with_core_filters(),
    };
    tracing::info!(
        filters = server.registry().len(),
        sessions = %server.sessions_root().display(),
        "Starting filter pipeline MCP server"
    );

    let service = match server.serve(stdio()).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to start MCP server: {:?}", e);
            return Err(e.into());
        }
    };

    tracing::info!("MCP server started, listening on stdio");

    tokio::select! {
        result = service.waiting() => {
            match result {
                Ok(_) => tracing::info!("MCP server completed successfully"),
                Err(e) => {
                    tracing::error!("MCP server error: {:?}", e);
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
    }

    tracing::info!("MCP server shut down");
    Ok(())
}
