//! Wiring for the command-line client.
//!
//! [`App`] owns one [`AuthSession`] and hands it to the API client and the
//! router, so every command shares the same credentials, store and events.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use matchmate_core::api::ApiError;
use matchmate_core::models::{LoginForm, PhotoUpload, RegisterForm, UserSummary};
use matchmate_core::router::{Location, Navigation, Resolution, LOGIN_PATH, REDIRECT_PARAM};
use matchmate_core::{ApiClient, AuthEvent, AuthSession, Config, EventBus, GlobalStore, Router};

/// Environment variables read by `login` when no arguments are given.
pub const USERNAME_ENV: &str = "MATCHMATE_USERNAME";
pub const PASSWORD_ENV: &str = "MATCHMATE_PASSWORD";

pub struct App {
    pub config: Config,
    pub session: Arc<AuthSession>,
    pub api: ApiClient,
    pub router: Router,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(api_url = %config.api_url, storage = ?config.storage, "Config loaded");
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let transport = Arc::new(config.transport()?);
        let credentials = config.credential_store()?;
        let session = Arc::new(AuthSession::new(
            transport,
            credentials,
            GlobalStore::new(),
            EventBus::new(),
        ));
        spawn_event_log(&session);

        Ok(Self {
            api: ApiClient::new(session.clone()),
            router: Router::new(session.clone()),
            config,
            session,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub fn current_user(&self) -> Option<UserSummary> {
        self.session.current_user()
    }

    /// Prompt for whatever is missing, then sign in.
    pub async fn login_interactive(&mut self, username: Option<String>) -> Result<UserSummary> {
        let username = match username.or_else(|| std::env::var(USERNAME_ENV).ok()) {
            Some(u) => u,
            None => self.prompt_username()?,
        };
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => rpassword::prompt_password("Password: ")?,
        };

        self.attempt_login(&username, &password).await
    }

    fn prompt_username(&self) -> Result<String> {
        match self.config.last_username {
            Some(ref last_user) => print!("Username [{}]: ", last_user),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        match (input.is_empty(), &self.config.last_username) {
            (true, Some(last_user)) => Ok(last_user.clone()),
            _ => Ok(input.to_string()),
        }
    }

    pub async fn attempt_login(&mut self, username: &str, password: &str) -> Result<UserSummary> {
        let form = LoginForm::new(username, password);
        match self.session.login(&form).await {
            Ok(envelope) => {
                self.config.last_username = Some(username.to_string());
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                info!(username, "Login successful");
                if let Some(message) = envelope.message {
                    debug!(%message, "Login response");
                }
                self.session
                    .current_user()
                    .context("Server accepted the login but sent no user")
            }
            Err(e) => Err(anyhow::anyhow!(login_failure_message(&e))),
        }
    }

    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        name: &str,
        photo: Option<&Path>,
    ) -> Result<UserSummary> {
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => {
                let first = rpassword::prompt_password("Password: ")?;
                let second = rpassword::prompt_password("Confirm password: ")?;
                if first != second {
                    anyhow::bail!("Passwords do not match");
                }
                first
            }
        };

        let photo = match photo {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read photo {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "photo".to_string());
                Some(PhotoUpload::new(file_name, bytes))
            }
            None => None,
        };

        let form = RegisterForm {
            username: username.to_string(),
            password,
            email: email.to_string(),
            name: name.to_string(),
            photo,
        };
        self.session.register(&form).await?;

        self.config.last_username = Some(username.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        self.session
            .current_user()
            .context("Server accepted the registration but sent no user")
    }

    /// Sign out. Local credentials are gone even when the server call fails.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.session.logout().await {
            warn!(error = %e, "Server logout failed; local session cleared");
        }
        Ok(())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Navigate to `path` and fail with a readable message when the guard
    /// sends us elsewhere.
    pub fn open(&self, path: &str) -> Result<Resolution> {
        match self.router.navigate(path) {
            Navigation::Resolved(resolution) => {
                // Only guard bounces carry a redirect target; logout does not
                if resolution.location.path == LOGIN_PATH && resolution.redirected_from.is_some() {
                    if let Some(target) = resolution.location.query_value(REDIRECT_PARAM) {
                        anyhow::bail!(
                            "You need to log in to open {}. \
                             Run `matchmate login --redirect {}` first.",
                            target,
                            target
                        );
                    }
                }
                Ok(resolution)
            }
            Navigation::NotFound(location) => anyhow::bail!("No page at {}", location),
            Navigation::RedirectLoop(location) => {
                anyhow::bail!("Too many redirects while opening {}", location)
            }
        }
    }

    /// Where the user lands after logging in from `login`.
    pub fn post_login_target(login: &Location) -> String {
        Router::post_login_target(login)
    }

    /// The login page, remembering `redirect` for afterwards.
    pub fn login_location(redirect: Option<&str>) -> Location {
        match redirect {
            Some(target) => Location::new(LOGIN_PATH).with_query(REDIRECT_PARAM, target),
            None => Location::new(LOGIN_PATH),
        }
    }
}

/// Log session changes as they happen.
fn spawn_event_log(session: &AuthSession) {
    let mut events = session.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AuthEvent::LoggedIn => debug!("auth:update (logged in)"),
                AuthEvent::LoggedOut => debug!("auth:update (logged out)"),
                AuthEvent::SessionExpired => warn!("Session expired; please log in again"),
            }
        }
    });
}

/// User-facing text for a failed login.
fn login_failure_message(err: &ApiError) -> String {
    match err {
        ApiError::Validation(errors) => errors.to_string(),
        ApiError::Network(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        e if e.is_unauthorized() => "Invalid username or password".to_string(),
        e => format!("Login failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchmate_core::api::transport::TransportError;
    use matchmate_core::api::FieldErrors;
    use matchmate_core::config::StorageBackend;

    fn memory_app() -> App {
        let config = Config {
            storage: StorageBackend::Memory,
            api_url: "http://127.0.0.1:9/api".to_string(),
            ..Config::default()
        };
        App::with_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_app_is_signed_out() {
        let app = memory_app();
        assert!(!app.session.is_authenticated());
        assert!(app.current_user().is_none());
    }

    #[tokio::test]
    async fn test_open_protected_page_asks_for_login() {
        let app = memory_app();
        let err = app.open("/profiles/favourites").unwrap_err();
        assert_eq!(
            err.to_string(),
            "You need to log in to open /profiles/favourites. \
             Run `matchmate login --redirect /profiles/favourites` first."
        );
    }

    #[tokio::test]
    async fn test_open_public_pages() {
        let app = memory_app();
        assert!(app.open("/").is_ok());
        assert!(app.open("/login").is_ok());
        assert!(app.open("/nowhere").is_err());
    }

    #[test]
    fn test_post_login_target() {
        let login = App::login_location(Some("/profiles/3"));
        assert_eq!(login.full_path(), "/login?redirect=%2Fprofiles%2F3");
        assert_eq!(App::post_login_target(&login), "/profiles/3");
        assert_eq!(App::post_login_target(&App::login_location(None)), "/");
    }

    #[tokio::test]
    async fn test_login_page_keeps_redirect_for_guests() {
        let app = memory_app();
        let login = App::login_location(Some("/profiles/3"));
        let resolution = app.open(&login.full_path()).unwrap();
        assert_eq!(resolution.location.query_value(REDIRECT_PARAM), Some("/profiles/3"));
        assert_eq!(App::post_login_target(&resolution.location), "/profiles/3");
    }

    #[test]
    fn test_login_failure_messages() {
        let mut errors = FieldErrors::new();
        errors.add("password", "Password is required");
        assert_eq!(
            login_failure_message(&ApiError::Validation(errors)),
            "password: Password is required"
        );
        assert_eq!(
            login_failure_message(&ApiError::Network(TransportError::Timeout(
                "timed out".to_string()
            ))),
            "Unable to connect to server. Check your internet connection."
        );
    }
}
