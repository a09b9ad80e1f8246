use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use academy_gate::{
    config::Config,
    db::connection::create_pool,
    handlers::proxy::Upstream,
    identity::GoTrueClient,
    repositories::profile::PgProfileStore,
    routes::build_router,
    state::GateState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "academy_gate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        database_url = %mask_database_url(&config.database_url),
        upstream_url = %config.upstream_url,
        identity_url = %config.identity.url,
        identity_anon_key = %mask_secret(&config.identity.anon_key),
        refresh_leeway_secs = config.identity.refresh_leeway_secs,
        admin_denied_redirect = %config.policy.admin_denied_redirect,
        "Loaded configuration from environment/.env"
    );

    let pool = create_pool(&config.database_url).await?;
    let identity = GoTrueClient::new(&config.identity, config.session_cookies.clone())?;
    let gate = GateState::from_config(
        &config,
        Arc::new(identity),
        Arc::new(PgProfileStore::new(pool)),
    );
    let upstream = Upstream::new(config.upstream_url.clone())?;

    let app = build_router(gate, upstream);

    tracing::info!("Gate listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
