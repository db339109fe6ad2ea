/// Civic Desk server binary
///
/// `civic-desk` runs the server; `civic-desk hash-password` reads a password
/// from stdin and prints the Argon2 PHC string to put in `ADMIN_HASH`.
use anyhow::Context;
use civic_desk::{auth, config::ServerConfig, server, AppContext};
use std::io::BufRead;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().nth(1).as_deref() == Some("hash-password") {
        return hash_password();
    }

    init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            for name in &e.missing {
                error!("Missing setting: {}", name);
            }
            for problem in &e.invalid {
                error!("Invalid setting: {}", problem);
            }
            return Err(e).context("configuration rejected");
        }
    };
    info!("Configuration loaded");

    let ctx = AppContext::new(config)
        .await
        .context("failed to initialise collaborators")?;

    server::serve(ctx).await.context("server stopped")?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "civic_desk=debug,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn hash_password() -> anyhow::Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    anyhow::ensure!(!password.is_empty(), "password must not be empty");

    let hash = auth::hash_secret(password).context("failed to hash password")?;
    println!("{}", hash);
    Ok(())
}
