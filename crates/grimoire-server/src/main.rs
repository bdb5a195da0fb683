use grimoire_server::{Result, config::ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = ServerConfig::load()?;
    grimoire_server::run(args).await
}
