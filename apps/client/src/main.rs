mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ArgMatches;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use client::auth::{AuthClient, PasswordResetFlow};
use client::config::Config;
use client::cover_letter::{CoverLetterClient, CoverLetterRequest};
use client::session::SessionManager;
use client::storage::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::new().get_matches();

    let mut config = Config::from_env()?;
    if let Some(api) = matches.get_one::<String>("api") {
        config = config.with_base_url(api);
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("client v{} using {}", env!("CARGO_PKG_VERSION"), config.api_base_url);

    let store = FileStore::open(&config.session_file)
        .await
        .with_context(|| format!("opening session file {}", config.session_file.display()))?;
    debug!("Session file: {}", store.path().display());
    let session = Arc::new(
        SessionManager::new(&config, Arc::new(store)).context("building session manager")?,
    );
    let auth = AuthClient::new(session.clone());

    match matches.subcommand() {
        Some(("login", sub)) => {
            let outcome = auth.login(arg(sub, "email"), arg(sub, "password")).await?;
            match outcome.profile {
                Some(profile) => {
                    println!("{}", profile.greeting());
                    println!("Signed in as {} <{}>", profile.name, profile.email);
                }
                None => println!("Signed in"),
            }
        }
        Some(("register", sub)) => {
            let outcome = auth
                .register(
                    arg(sub, "username"),
                    arg(sub, "full-name"),
                    arg(sub, "email"),
                    arg(sub, "password"),
                )
                .await?;
            if let Some(message) = outcome.message {
                println!("{message}");
            }
            if outcome.signed_in {
                println!("Account created and signed in");
            } else {
                println!("Account created. Sign in to continue.");
            }
        }
        Some(("logout", _)) => {
            auth.logout().await?;
            println!("Signed out");
        }
        Some(("whoami", sub)) => {
            if sub.get_flag("refresh") {
                let profile = auth.current_user().await?;
                println!("{}", profile.greeting());
                println!("{} <{}> [{}]", profile.name, profile.email, profile.initials());
            } else {
                let identity = session.resolve_active_identity().await?;
                if !identity.is_signed_in() {
                    println!("Not signed in");
                } else {
                    let method = identity
                        .method()
                        .map(|m| m.to_string())
                        .unwrap_or_default();
                    match identity.profile() {
                        Some(p) => println!("{} <{}> via {method}", p.name, p.email),
                        None => println!("Signed in via {method} (profile not loaded)"),
                    }
                }
            }
        }
        Some(("check-email", sub)) => {
            let email = arg(sub, "email");
            if auth.check_email(email).await? {
                println!("{email} is registered");
            } else {
                println!("{email} is not registered");
            }
        }
        Some(("forgot-password", sub)) => {
            let mut flow = PasswordResetFlow::new(auth.clone());
            println!("{}", flow.request_code(arg(sub, "email")).await?);
            println!("The code expires in {} minutes", flow.seconds_remaining() / 60);
        }
        Some(("verify-code", sub)) => {
            println!(
                "{}",
                auth.verify_reset_code(arg(sub, "email"), arg(sub, "code"))
                    .await?
            );
        }
        Some(("reset-password", sub)) => {
            println!(
                "{}",
                auth.reset_password(
                    arg(sub, "email"),
                    arg(sub, "code"),
                    arg(sub, "new-password")
                )
                .await?
            );
        }
        Some(("cover-letter", sub)) => run_cover_letter(session, sub).await?,
        _ => unreachable!("clap enforces a subcommand"),
    }

    Ok(())
}

async fn run_cover_letter(session: Arc<SessionManager>, matches: &ArgMatches) -> Result<()> {
    let letters = CoverLetterClient::new(session);

    match matches.subcommand() {
        Some(("generate", sub)) => {
            println!("{}", letters.generate(&letter_form(sub)).await?);
        }
        Some(("save", sub)) => {
            let path = arg(sub, "letter-file");
            let letter = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading letter from {path}"))?;
            match letters.save(&letter_form(sub), &letter).await? {
                Some(record) => println!("Saved cover letter {}", record.id.as_deref().unwrap_or("-")),
                None => println!("Saved cover letter"),
            }
        }
        Some(("list", _)) => {
            let records = letters.list().await?;
            if records.is_empty() {
                println!("No cover letters yet");
            }
            for record in records {
                println!(
                    "{}  {} at {}  {}",
                    record.id.as_deref().unwrap_or("-"),
                    record.job_title.as_deref().unwrap_or("(untitled)"),
                    record.company_name.as_deref().unwrap_or("(unknown)"),
                    record
                        .created_at
                        .map(|t| t.format("%Y-%m-%d").to_string())
                        .unwrap_or_default()
                );
            }
        }
        _ => unreachable!("clap enforces a subcommand"),
    }
    Ok(())
}

fn letter_form(matches: &ArgMatches) -> CoverLetterRequest {
    CoverLetterRequest {
        full_name: arg(matches, "full-name").to_string(),
        job_title: arg(matches, "job-title").to_string(),
        company_name: arg(matches, "company").to_string(),
        key_qualifications: arg(matches, "qualifications").to_string(),
        job_description_url: matches.get_one::<String>("job-description-url").cloned(),
    }
}

/// Required string argument; clap has already rejected the command if it is missing.
fn arg<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}
