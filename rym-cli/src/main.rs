mod callback_server;
mod render;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rym_core::auth::AuthError;
use rym_core::charts::available_years;
use rym_core::{
    AuthState, BrowserNavigator, ClientError, ClientSettings, LoadOutcome, Resolution, Session,
};
use thiserror::Error;
use tracing::{error, info};

use callback_server::{CallbackError, CallbackServer};

/// rym: rate albums and browse yearly charts from the terminal.
#[derive(Parser)]
#[command(name = "rym")]
struct Args {
    /// Where to fetch the runtime configuration JSON.
    #[arg(long, env = "RYM_CONFIG_URL")]
    config_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in through the browser.
    Login,
    /// Finish signing in from a return URL pasted from the browser.
    Callback { url: String },
    /// Sign out and end the provider session.
    Logout,
    /// Show whether you are signed in.
    Status,
    /// Show an album by id, slug or title.
    Album { query: String },
    /// Rate an album from 1 to 5.
    Rate {
        query: String,
        rating: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Like a user's review of an album.
    Like { query: String, user_id: String },
    /// Add an album to your favorites.
    Favorite { query: String },
    /// Show the chart for a year (defaults to the last one viewed).
    Charts { year: Option<i32> },
    /// List the years that have charts.
    Years,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error("{0}")]
    Failed(String),
}

impl CliError {
    fn user_message(&self) -> String {
        match self {
            CliError::Client(e) | CliError::Auth(AuthError::Client(e)) => e.user_message(),
            other => other.to_string(),
        }
    }
}

fn configure_logging() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_target(false)
        .with_file(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    configure_logging();
    let args = Args::parse();

    let mut settings = ClientSettings::load().unwrap_or_else(|e| {
        error!("Invalid settings: {e}");
        std::process::exit(1);
    });
    if let Some(url) = args.config_url {
        settings.config_url = url;
    }

    let session = Session::from_settings(&settings, Arc::new(BrowserNavigator)).unwrap_or_else(|e| {
        error!("Failed to create HTTP client: {e}");
        std::process::exit(1);
    });

    if let Err(e) = run(&session, args.command).await {
        error!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(session: &Session, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login => login(session).await,
        Command::Callback { url } => finish_login(session, &url).await,
        Command::Logout => {
            session.auth.begin_logout().await?;
            println!("Signed out.");
            Ok(())
        }
        Command::Status => {
            if session.credentials.is_signed_in() {
                println!("Signed in.");
            } else {
                println!("Not signed in.");
            }
            println!("Configuration: {}", session.api.config().config_url());
            Ok(())
        }
        Command::Album { query } => {
            let Some(album_id) = resolve(session, &query).await? else {
                return Ok(());
            };
            if let LoadOutcome::Applied(view) = session.albums.load(&album_id).await? {
                render::album(&view);
            }
            Ok(())
        }
        Command::Rate {
            query,
            rating,
            comment,
        } => {
            let Some(album_id) = resolve(session, &query).await? else {
                return Ok(());
            };
            session.albums.load(&album_id).await?;
            let outcome = session
                .mutations
                .rate(&session.albums, &album_id, rating, comment.as_deref())
                .await?;
            println!("Rating saved.");
            if let LoadOutcome::Applied(view) = outcome {
                render::album(&view);
            }
            Ok(())
        }
        Command::Like { query, user_id } => {
            let Some(album_id) = resolve(session, &query).await? else {
                return Ok(());
            };
            session.albums.load(&album_id).await?;
            match session
                .mutations
                .like(&session.albums, &album_id, &user_id)
                .await
            {
                Ok(_) => {
                    let likes = session.albums.snapshot().and_then(|v| {
                        v.aggregate.review_by(&user_id).map(|r| r.like_count)
                    });
                    match likes {
                        Some(n) => println!("Liked. The review now has {n} likes."),
                        None => println!("Liked."),
                    }
                    Ok(())
                }
                Err(e) if e.is_conflict() => {
                    println!("You already liked this review.");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Favorite { query } => {
            let Some(album_id) = resolve(session, &query).await? else {
                return Ok(());
            };
            session.mutations.add_favorite(&album_id).await?;
            println!("Added to favorites.");
            Ok(())
        }
        Command::Charts { year } => {
            let year = year.unwrap_or_else(|| session.charts.preferred_year());
            if let LoadOutcome::Applied(entries) = session.charts.load(year).await? {
                render::chart(year, &entries);
            }
            Ok(())
        }
        Command::Years => {
            let years: Vec<String> = available_years(chrono::Utc::now())
                .iter()
                .map(i32::to_string)
                .collect();
            println!("{}", years.join(" "));
            Ok(())
        }
    }
}

/// Canonical id for `query`, or `None` after telling the user why not.
async fn resolve(session: &Session, query: &str) -> Result<Option<String>, CliError> {
    match session.resolver.resolve(query).await? {
        Resolution::Resolved(identity) => Ok(Some(identity.album_id)),
        Resolution::Ambiguous(candidates) => {
            render::candidates(query, &candidates);
            Ok(None)
        }
        Resolution::NotFound => {
            println!("No album matches {query:?}.");
            Ok(None)
        }
    }
}

async fn login(session: &Session) -> Result<(), CliError> {
    let config = session.api.config().get().await?;
    let server = CallbackServer::bind(&config.redirect_uri).await?;

    match session.auth.begin_login().await {
        Ok(_) => println!("Continue signing in in your browser."),
        Err(AuthError::Navigation { url, reason }) => {
            info!("Could not open browser: {reason}");
            println!("Open this URL to sign in:\n{url}");
        }
        Err(e) => return Err(e.into()),
    }

    let return_url = server.wait().await?;
    finish_login(session, &return_url).await
}

async fn finish_login(session: &Session, return_url: &str) -> Result<(), CliError> {
    match session.auth.handle_redirect(return_url).await {
        AuthState::Authenticated => {
            println!("Signed in.");
            Ok(())
        }
        AuthState::Failed(reason) => Err(CliError::Failed(format!("Sign-in failed: {reason}"))),
        _ if !callback_server::query_params(return_url).contains_key("code") => Err(
            CliError::Failed("The return URL has no authorization code.".to_string()),
        ),
        state => Err(CliError::Failed(format!("Sign-in incomplete ({state:?})."))),
    }
}
