use mock_icd_server::{AppState, MockConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8382".to_string());
    let require_auth = std::env::var("MOCK_REQUIRE_AUTH").is_ok_and(|v| v == "1" || v == "true");
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "starting mock ICD API (token endpoint at /connect/token)");

    let config = MockConfig {
        require_auth,
        ..MockConfig::default()
    };
    mock_icd_server::run_with_state(listener, AppState::new(config)).await
}
