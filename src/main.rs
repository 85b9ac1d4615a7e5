use std::sync::Arc;
use userhub::{config::ServerConfig, install_container, services, App, Container};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    let config = ServerConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut registry = Container::new(config);
    if let Err(e) = registry.init_container() {
        eprintln!("Failed to initialise services: {}", e);
        std::process::exit(1);
    }
    let container = install_container(registry).map_err(to_io)?;
    let app: Arc<App> = container.get(services::APP).map_err(to_io)?;

    let report = app.start().await.map_err(to_io)?;
    if let Err(e) = &report.database {
        log::warn!("Serving without a database: {}", e);
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown signal received");

    let report = app.stop().await.map_err(to_io)?;
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn to_io(error: impl std::error::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, error.to_string())
}
