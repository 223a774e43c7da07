//! Session lifecycle demo
//!
//! Signs in (or resumes a persisted session), fetches a resource, and
//! signs out when `DASHBOARD_LOGOUT` is set.
//!
//! Run with:
//! DASHBOARD_EMAIL=admin@example.com DASHBOARD_PASSWORD=secret cargo run --example session_demo

use dashboard_client::{ApiClient, ClientConfig, Credentials, FileStorage};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dashboard_client=debug,info")),
        )
        .init();

    println!("Dashboard Session Demo");
    println!("======================\n");

    let config = ClientConfig::from_env();
    println!("Backend: {}", config.api_url);

    let storage = Arc::new(FileStorage::new(".dashboard-session"));
    let client = ApiClient::with_storage(config, storage)?;

    let mut auth_events = client.subscribe_auth_events();
    tokio::spawn(async move {
        while let Ok(event) = auth_events.recv().await {
            println!("! auth event: {:?}, sign in again", event);
        }
    });

    if client.session().is_authenticated() {
        let user = client.session().user();
        println!(
            "Resumed session for {}",
            user.map(|u| u.display_name()).unwrap_or_default()
        );
    } else {
        let email = std::env::var("DASHBOARD_EMAIL")?;
        let password = std::env::var("DASHBOARD_PASSWORD")?;
        let data = client.login(Credentials::new(email, password)).await?;
        println!("Signed in as {} (token expires in {}s)", data.user.display_name(), data.expires_in);
    }

    let stats: serde_json::Value = client.get("/dashboard/stats").await?;
    println!("\nStats:\n{}", serde_json::to_string_pretty(&stats)?);

    if std::env::var_os("DASHBOARD_LOGOUT").is_some() {
        client.logout(false).await;
        println!("\nSigned out");
    }

    Ok(())
}
