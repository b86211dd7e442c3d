use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use terraform_mcp_server::mcp::handler::McpServer;
use terraform_mcp_server::{config, serve_http, serve_stdio, version, ServerConfig};

#[derive(Parser)]
#[command(
    name = "terraform-mcp-server",
    about = "A Terraform MCP server that handles various tools and resources.",
    disable_version_flag(true)
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, global = true, value_name = "PATH", help = "Path to log file")]
    log_file: Option<String>,

    #[arg(long, short = 'v', help = "Print version information")]
    version: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "stdio",
        about = "Start a server that communicates via standard input/output streams"
    )]
    Stdio,

    #[command(
        name = "streamable-http",
        about = "Start a StreamableHTTP server on the configured host and port"
    )]
    StreamableHttp {
        #[arg(long, default_value = "127.0.0.1", help = "Host to bind to")]
        transport_host: String,

        #[arg(long, short = 'p', default_value_t = 8080, help = "Port to listen on")]
        transport_port: u16,

        #[arg(long, default_value = "/mcp", help = "Path for streamable HTTP endpoint")]
        mcp_endpoint: String,
    },

    #[command(
        name = "http",
        hide = true,
        about = "Deprecated alias for 'streamable-http'"
    )]
    Http {
        #[arg(long, default_value = "127.0.0.1")]
        transport_host: String,

        #[arg(long, short = 'p', default_value_t = 8080)]
        transport_port: u16,

        #[arg(long, default_value = "/mcp")]
        mcp_endpoint: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", version::human_version());
        return;
    }

    let _log_guard = match init_logging(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logger: {e}");
            std::process::exit(1);
        }
    };

    // Environment variables override command-line transport selection:
    // setting any TRANSPORT_* / MCP_ENDPOINT variable means HTTP mode.
    if config::streamable_http_forced() {
        let server_config = ServerConfig::from_env();
        run_http(server_config).await;
        return;
    }

    match cli.command {
        None | Some(Commands::Stdio) => {
            let server_config = ServerConfig::from_env();
            let server = McpServer::new(&server_config);
            if let Err(e) = serve_stdio(server).await {
                tracing::error!(error = %e, "failed to run stdio server");
                std::process::exit(1);
            }
        }
        Some(Commands::StreamableHttp {
            transport_host,
            transport_port,
            mcp_endpoint,
        }) => {
            run_http(http_config(transport_host, transport_port, &mcp_endpoint)).await;
        }
        Some(Commands::Http {
            transport_host,
            transport_port,
            mcp_endpoint,
        }) => {
            tracing::warn!("'http' is deprecated, use 'streamable-http' instead");
            run_http(http_config(transport_host, transport_port, &mcp_endpoint)).await;
        }
    }
}

fn http_config(host: String, port: u16, endpoint_flag: &str) -> ServerConfig {
    let mut server_config = ServerConfig::from_env();
    server_config.host = host;
    server_config.port = port;
    server_config.endpoint = config::endpoint_path(Some(endpoint_flag));
    server_config
}

async fn run_http(server_config: ServerConfig) {
    let server = McpServer::new(&server_config);
    if let Err(e) = serve_http(server, &server_config).await {
        tracing::error!(error = %e, "failed to run StreamableHTTP server");
        std::process::exit(1);
    }
}

/// Initializes tracing. Diagnostics go to stderr (stdout belongs to the
/// protocol in stdio mode) or, with `--log-file`, to an appended file.
fn init_logging(
    log_file: Option<&str>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "terraform_mcp_server=info,reqwest=warn,hyper=warn".into());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
