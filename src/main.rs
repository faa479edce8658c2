mod config;
mod dispatch;
mod error;
mod llm;
mod operations;
mod sandbox;
mod server;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::dispatch::Dispatcher;

fn print_help() {
    println!(
        "\
taskgate v{}

Runs plain-language tasks: known operations by keyword, anything else
through an LLM-synthesized command. File access is confined to one
directory tree.

USAGE:
    taskgate [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {}]
                   Built-in defaults are used when the default file is missing.

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENDPOINTS:
    POST /run?task=<text>     Run a task
    GET  /read?path=<path>    Read a file under the sandbox root
    GET  /health              Liveness and fallback status
    GET  /operations          Keyword operations in routing order

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG         Log level filter for tracing
                     (e.g. debug, taskgate=debug,warn)
    AIPROXY_TOKEN    LLM API token, used when [llm] api_key is empty.
                     Without a token only keyword operations run.

EXAMPLES:
    taskgate                               # uses {}
    taskgate /etc/taskgate/taskgate.toml   # custom config path
    RUST_LOG=debug taskgate                # with debug logging",
        env!("CARGO_PKG_VERSION"),
        DEFAULT_CONFIG_PATH,
        DEFAULT_CONFIG_PATH,
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("taskgate v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskgate=info")),
        )
        .init();

    println!(
        r#"
  _            _                     _
 | |_ __ _ ___| | ____ _  __ _ | |_ ___
 | __/ _` / __| |/ / _` |/ _` || __/ _ \
 | || (_| \__ \   < (_| | (_| || ||  __/
  \__\__,_|___/_|\_\__, |\__,_| \__\___|
                   |___/   v{}
"#,
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load_or_default(&config_path)?;

    info!(
        "Sandbox root: {} ({:?} containment)",
        config.sandbox.root, config.sandbox.containment
    );
    info!("Forbidden path tokens: {}", config.sandbox.forbidden.join(", "));
    if config.routing.case_insensitive {
        info!("Keyword routing: case-insensitive");
    }

    let dispatcher = Dispatcher::from_config(&config)?;

    info!(
        "Operations: {} registered ({})",
        dispatcher.registry().len(),
        dispatcher
            .registry()
            .descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if dispatcher.synthesizer().is_available() {
        info!("LLM fallback: {}", dispatcher.synthesizer().describe());
        if config.executor.allow_raw_shell && config.executor.allowed_programs.is_empty() {
            warn!("Synthesized commands run unrestricted; set [executor] allowed_programs to limit them");
        }
    } else {
        warn!("LLM fallback disabled: set AIPROXY_TOKEN or [llm] api_key to enable it");
    }

    server::serve(&config.server, Arc::new(dispatcher)).await
}
