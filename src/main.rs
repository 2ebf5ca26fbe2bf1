use family_records::{
    config::{LogFormat, LoggingConfig, ServerConfig},
    context::AppContext,
    error::AppResult,
    server,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    init_tracing(&config.logging);

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| "family_records=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn print_banner() {
    println!(
        r#"
    ______                _ __         ____                        __
   / ____/___ _____ ___  (_) /_  __   / __ \___  _________  _________/ /____
  / /_  / __ `/ __ `__ \/ / / / / /  / /_/ / _ \/ ___/ __ \/ ___/ __  / ___/
 / __/ / /_/ / / / / / / / / /_/ /  / _, _/  __/ /__/ /_/ / /  / /_/ (__  )
/_/    \__,_/_/ /_/ /_/_/_/\__, /  /_/ |_|\___/\___/\____/_/   \__,_/____/
                          /____/

        Family health records backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
