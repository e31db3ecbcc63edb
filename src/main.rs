use clap::Parser;
use ora_query_studio::config::ServerConfig;
use ora_query_studio::db::OracleDriver;
use ora_query_studio::{logging, server, AppState};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "ora-query-studio",
    version,
    about = "Query an Oracle database from the browser",
    disable_help_subcommand = true
)]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1", value_name = "HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Default log level (RUST_LOG overrides it)
    #[arg(long, env = "ORA_STUDIO_LOG", default_value = "info", value_name = "LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(&cli.log_level) {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    let config = ServerConfig::new(cli.host, cli.port);
    let state = AppState::new(Arc::new(OracleDriver::new()));

    if let Err(e) = server::run(&config, state).await {
        tracing::error!("Server error on {}: {}", config.addr(), e);
        std::process::exit(1);
    }
}
