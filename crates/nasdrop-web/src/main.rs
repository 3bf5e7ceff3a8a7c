use nasdrop_core::{init_tracing, Config};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing("nasdrop-web");

    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (database, storage, routes)
    let (_state, router) = nasdrop_web::setup::initialize_app(&config).await?;

    // Start the server
    nasdrop_web::setup::server::start_server(&config, router).await?;

    Ok(())
}
