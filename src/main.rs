use clap::Parser;
use tracing::info;
use payportal::{cli::{App, Cli}, config::Config, types::AppError, utils::init_logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let log_guard = init_logger(&config.logging);
    info!(api = %config.api.base_url, "Configuration loaded");

    let app = App::new(config)?;

    if let Err(e) = app.run(cli.command).await {
        match e.downcast_ref::<AppError>() {
            Some(app_err) => eprintln!("error: {}", app_err.user_message()),
            None => eprintln!("error: {:#}", e),
        }
        drop(log_guard);
        std::process::exit(1);
    }

    Ok(())
}
