use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "nasdrop=debug,tower_http=info,sqlx=warn";

/// Initialize console tracing for a nasdrop process.
///
/// `RUST_LOG` overrides the default filter. Calling it twice is harmless; the
/// second registration is ignored.
pub fn init_tracing(service: &'static str) {
    let console_fmt = tracing_subscriber::fmt::layer().event_format(
        Format::default()
            .compact()
            .with_target(false)
            .without_time(),
    );
    let registered = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(console_fmt)
        .try_init();

    if registered.is_ok() {
        tracing::info!(service, "Tracing initialized");
    }
}
