use clap::Parser;
use nfmap::app::{handle_fatal_error, init_logging, AppConfig};
use nfmap::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app = AppConfig::new(cli.verbose, cli.config.clone());

    init_logging(&app);

    if let Err(e) = execute_command(cli.command, &app).await {
        handle_fatal_error(e, app.verbose);
    }
}
