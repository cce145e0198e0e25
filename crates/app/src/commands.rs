//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, bail};
use sessionkit_application::{KeyValueStore, SessionManager};
use sessionkit_domain::{ApiRequest, AuthStatus, HttpMethod, decode_claims};
use sessionkit_infrastructure::{FileKeyValueStore, ReqwestHttpClient, SettingsLoader, SystemClock};
use tokio::sync::Notify;

use crate::cli::{Cli, Command};

/// Build the session manager from settings, the session file and real adapters.
pub fn build_session(cli: &Cli) -> anyhow::Result<Arc<SessionManager>> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = cli.config.clone().or_else(SettingsLoader::default_file) {
        loader = loader.with_file(path);
    }
    let mut settings = loader.load().context("failed to load settings")?;
    if let Some(base_url) = &cli.base_url {
        settings.base_url.clone_from(base_url);
    }

    let store = match &cli.session_file {
        Some(path) => FileKeyValueStore::open(path),
        None => FileKeyValueStore::open_default(),
    }
    .context("failed to open session file")?;
    tracing::debug!(path = %store.path().display(), "session file opened");
    let storage: Arc<dyn KeyValueStore> = Arc::new(store);
    let http = Arc::new(ReqwestHttpClient::new()?);

    let session = SessionManager::new(settings, storage, http, Arc::new(SystemClock::new()))?;
    Ok(session)
}

/// Run one subcommand to completion.
pub async fn run(session: &SessionManager, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { access, refresh } => login(session, &access, refresh.as_deref()),
        Command::Status => {
            status(session);
            Ok(())
        }
        Command::Refresh => refresh(session).await,
        Command::Me => me(session).await,
        Command::Fetch { method, path, body } => fetch(session, &method, path, body).await,
        Command::Logout => {
            session.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Watch => watch(session).await,
    }
}

fn login(session: &SessionManager, access: &str, refresh: Option<&str>) -> anyhow::Result<()> {
    session.set_tokens(access, refresh)?;
    session.shutdown();
    println!("session stored");
    describe_access_token(session, access);
    Ok(())
}

fn status(session: &SessionManager) {
    let Some(access) = session.get_token() else {
        if session.get_refresh_token().is_some() {
            println!("not authenticated (refresh token available)");
        } else {
            println!("not authenticated");
        }
        return;
    };

    println!("authenticated");
    if let Ok(claims) = decode_claims(&access)
        && let Some(subject) = claims.subject()
    {
        println!("user: {subject}");
    }
    describe_access_token(session, &access);
    println!(
        "refresh token: {}",
        if session.get_refresh_token().is_some() {
            "present"
        } else {
            "absent"
        }
    );
}

fn describe_access_token(session: &SessionManager, access: &str) {
    match session.token_expires_at(access) {
        Some(at) if session.is_token_expired(access) => println!("access token expired at {at}"),
        Some(at) => println!("access token valid until {at}"),
        None => println!("access token expiry unknown (treated as expired)"),
    }
}

async fn refresh(session: &SessionManager) -> anyhow::Result<()> {
    let pair = session.refresh().await?;
    println!("token refreshed");
    describe_access_token(session, &pair.access_token);
    if !pair.can_refresh() {
        println!("no refresh token issued; the session cannot be renewed again");
    }
    Ok(())
}

async fn me(session: &SessionManager) -> anyhow::Result<()> {
    match session.check_auth().await {
        AuthStatus::Authenticated { profile } => {
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(())
        }
        AuthStatus::Unauthenticated => bail!("not authenticated"),
    }
}

async fn fetch(
    session: &SessionManager,
    method: &str,
    path: String,
    body: Option<String>,
) -> anyhow::Result<()> {
    let method: HttpMethod = method.parse()?;
    let mut request = ApiRequest::new(method, path);
    if let Some(body) = body {
        let value: serde_json::Value =
            serde_json::from_str(&body).context("--body must be valid JSON")?;
        request = request.with_json(&value)?;
    }

    let response = session.fetch_with_auth(request).await?;
    println!("{} ({} ms)", response.status, response.duration.as_millis());
    match response.json::<serde_json::Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.text()),
    }
    if !response.is_success() {
        bail!("request failed with status {}", response.status);
    }
    Ok(())
}

async fn watch(session: &SessionManager) -> anyhow::Result<()> {
    if !session.resume() {
        bail!("no session to keep alive; run `sessionkit login` first");
    }
    println!(
        "keeping session alive, renewing every {} s (Ctrl-C to stop)",
        session.settings().auto_renew_interval_secs
    );

    let ended = Arc::new(Notify::new());
    let on_end = Arc::clone(&ended);
    let _subscription = session.subscribe_auth_changes(move |change| {
        if !change.is_authenticated {
            on_end.notify_one();
        }
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            session.shutdown();
            println!("stopped");
            Ok(())
        }
        () = ended.notified() => {
            session.shutdown();
            bail!("session ended");
        }
    }
}
