use anyhow::Context;
use nasdrop_bot::{
    setup_routes, BotState, CommandFront, DiscordClient, InteractionVerifier,
    NotificationDispatcher,
};
use nasdrop_core::{init_tracing, shutdown_signal, Config};
use nasdrop_db::{NotificationRepository, TokenRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing("nasdrop-bot");

    let config = Config::from_env()?;
    config.validate()?;
    config.validate_bot()?;
    let config = Arc::new(config);

    let pool = nasdrop_db::connect(&config).await?;
    let tokens = TokenRepository::new(
        pool.clone(),
        chrono::Duration::seconds(config.base.token_expiry_seconds),
    );

    let bot_token = config
        .chat
        .bot_token
        .clone()
        .context("DISCORD_BOT_TOKEN must be set")?;
    let public_key = config
        .chat
        .public_key
        .clone()
        .context("DISCORD_PUBLIC_KEY must be set")?;

    let discord = Arc::new(DiscordClient::new(
        config.chat.api_base.clone(),
        bot_token,
        Duration::from_secs(config.chat.send_timeout_seconds),
    )?);

    match config.chat.application_id.as_deref() {
        Some(application_id) => {
            // Registration failure leaves previously registered commands in place
            if let Err(e) = discord.register_commands(application_id).await {
                tracing::warn!(error = %e, "Could not register slash commands");
            }
        }
        None => tracing::info!("DISCORD_APPLICATION_ID not set, skipping command registration"),
    }

    let dispatcher = NotificationDispatcher::new(
        NotificationRepository::new(pool.clone()),
        discord,
        config.base.app_base_url.clone(),
        Duration::from_secs(config.chat.send_timeout_seconds),
        Duration::from_secs(config.chat.notification_interval_seconds),
    );
    let (dispatch_shutdown_tx, dispatch_shutdown_rx) = mpsc::channel(1);
    let dispatch_handle = tokio::spawn(dispatcher.run(dispatch_shutdown_rx));

    let state = Arc::new(BotState {
        verifier: InteractionVerifier::from_hex(&public_key)?,
        commands: CommandFront::new(tokens.clone(), config.clone()),
        tokens,
    });

    let addr = format!("0.0.0.0:{}", config.chat.bot_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Command front listening for interactions");

    axum::serve(listener, setup_routes(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = dispatch_shutdown_tx.send(()).await;
    if let Err(e) = dispatch_handle.await {
        tracing::error!(error = %e, "Notification dispatcher task failed");
    }

    tracing::info!("Command front stopped");
    Ok(())
}
