pub mod mcp_client;

pub use mcp_client::{
    ClientOptions, ConnectionState, ErrorCollector, ErrorRecord, McpClient, McpConfig, McpError,
    McpHub, PersistenceMode, ServerConfig, ServerKind,
};

/// Initialize the tracing subscriber, writing structured logs to stderr.
///
/// `RUST_LOG` overrides the default filter. With `json` set, each event is one
/// JSON object per line. Calling this twice is harmless; the second call is
/// ignored.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_link=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_ok() {
        tracing::debug!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            "=== mcp-link starting ==="
        );
    }
}
