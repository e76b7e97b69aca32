/// SketchVM CLI
///
/// Runs a parsed Arduino sketch tree and prints its command log as JSON lines.
use sketchvm_core::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
