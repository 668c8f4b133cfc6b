use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mcp_link::mcp_client::config::{default_config_path, load_mcp_config};
use mcp_link::mcp_client::{InMemoryErrorCollector, McpHub};

#[derive(Parser)]
#[command(name = "mcp-link")]
#[command(about = "Connect to MCP servers and call their tools", long_about = None)]
struct Cli {
    /// Config file (YAML or JSON). Defaults to the user config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Conversation id sent to HTTP servers alongside the API key
    #[arg(long, global = true)]
    conversation_id: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to every server and list its tools
    Tools,

    /// Call one tool and print the result as JSON
    Call {
        /// Tool name
        #[arg(short, long)]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    mcp_link::init_tracing(cli.json_logs);

    let path = match cli.config {
        Some(path) => path,
        None => default_config_path().context("could not determine the config directory")?,
    };
    let config = load_mcp_config(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if config.is_empty() {
        bail!("no MCP servers configured in {}", path.display());
    }

    let collector = Arc::new(InMemoryErrorCollector::new());
    let (hub, failures) =
        McpHub::connect_all(&config, collector.clone(), cli.conversation_id.as_deref()).await?;

    for record in collector.errors() {
        eprintln!(
            "[{}] {}: {}",
            record.server_type, record.server_name, record.error_message
        );
    }

    let outcome = match cli.command {
        Commands::Tools => {
            for (server, tools) in hub.tools_by_server().await {
                println!("{server}");
                for tool in tools {
                    println!("  {tool}");
                }
            }
            if hub.client_count() == 0 && !failures.is_empty() {
                Err(anyhow::anyhow!("no server could be connected"))
            } else {
                Ok(())
            }
        }
        Commands::Call { tool, args } => call(&hub, &tool, &args).await,
    };

    hub.disconnect_all().await;
    outcome
}

async fn call(hub: &McpHub, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).context("--args must be valid JSON")?;
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }

    let result = hub
        .call_tool(tool, arguments)
        .await
        .with_context(|| format!("calling tool '{tool}'"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_error {
        bail!("tool '{tool}' reported an error");
    }
    Ok(())
}
