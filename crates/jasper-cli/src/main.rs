// Jasper CLI entry point

use jasper_cli::router::CommandRouter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = CommandRouter::route().await {
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}
