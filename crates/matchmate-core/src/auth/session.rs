//! The signed-in session: credentials, account calls, and the request
//! pipeline that keeps the access token fresh.
//!
//! Every request goes through [`AuthSession::send`]:
//!
//! 1. **Outbound**: the `Authorization` header is set from the stored access
//!    token right before the request leaves.
//! 2. **Inbound**: a 401 naming an expired token parks the request while one
//!    refresh runs (see [`RefreshCoordinator`]), then reissues it once with
//!    the new token. Any other response is returned as-is.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::transport::{Credentials, HttpTransport, Request, Response};
use crate::api::{ApiError, Envelope};
use crate::events::{AuthEvent, EventBus};
use crate::models::user::RefreshPayload;
use crate::models::{AuthPayload, LoginForm, RegisterForm, UserSummary};
use crate::store::{GlobalStore, SessionState};

use super::credentials::{
    CredentialStore, CREDENTIAL_KEYS, REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY,
};
use super::refresh::{RefreshCoordinator, Ticket};

// ============================================================================
// Endpoints
// ============================================================================

pub const REGISTER_PATH: &str = "/register";
pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

pub struct AuthSession {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    refresh: RefreshCoordinator,
    store: GlobalStore,
    events: EventBus,
}

impl AuthSession {
    /// Create a session and bring `store` in line with whatever credential
    /// survived the last run.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
        store: GlobalStore,
        events: EventBus,
    ) -> Self {
        let session = Self {
            transport,
            credentials,
            refresh: RefreshCoordinator::new(),
            store,
            events,
        };
        session.sync_store();
        session
    }

    /// Rebuild the global store from the credential store.
    pub fn sync_store(&self) {
        self.store.replace(SessionState {
            logged_in: self.is_authenticated(),
            user: self.current_user(),
        });
    }

    pub fn store(&self) -> &GlobalStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    // ===== Credential reads =====

    pub fn access_token(&self) -> Option<String> {
        self.credentials.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.credentials.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// The stored user, or `None` when absent or unreadable.
    pub fn current_user(&self) -> Option<UserSummary> {
        let raw = self.credentials.get(USER_KEY)?;
        let user = UserSummary::from_stored(&raw);
        if user.is_none() {
            warn!("Stored user record is malformed, ignoring it");
        }
        user
    }

    /// True iff an access token is stored. Never touches the network.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    // ===== Account operations =====

    /// Create an account. The photo, if any, goes up as a multipart file part.
    pub async fn register(&self, form: &RegisterForm) -> Result<Envelope<AuthPayload>, ApiError> {
        form.validate().into_result()?;
        if form.photo.is_some() {
            debug!("Adding photo to registration form");
        }
        let request = Request::post(REGISTER_PATH).multipart(form.to_parts());
        self.authenticate(request).await
    }

    pub async fn login(&self, form: &LoginForm) -> Result<Envelope<AuthPayload>, ApiError> {
        form.validate().into_result()?;
        let request = Request::post(LOGIN_PATH).json(json!({
            "username": form.username,
            "password": form.password,
        }));
        self.authenticate(request).await
    }

    /// Tell the server we're leaving, then clear the local session whatever
    /// the server said. A failed call is still reported after clearing.
    pub async fn logout(&self) -> Result<Envelope<serde_json::Value>, ApiError> {
        let mut request = Request::post(LOGOUT_PATH);
        if let Some(token) = self.access_token() {
            request = request.bearer(token);
        }

        let result = match self.send(request).await {
            Ok(response) => Envelope::from_response(response),
            Err(err) => Err(err),
        };

        self.end_session(AuthEvent::LoggedOut);
        match result {
            Ok(ref _envelope) => info!("Signed out"),
            Err(ref err) => {
                warn!(error = %err, "Logout request failed, local session cleared anyway")
            }
        }
        result
    }

    /// Trade the refresh token for a new access token. Any failure is a hard
    /// logout: the whole credential is cleared and listeners are told.
    pub async fn refresh_access_token(&self) -> Result<String, ApiError> {
        match self.request_new_access_token().await {
            Ok(token) => {
                debug!("Access token refreshed");
                Ok(token)
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed, clearing session");
                self.end_session(AuthEvent::SessionExpired);
                Err(match err {
                    ApiError::RefreshFailed(_) => err,
                    other => ApiError::RefreshFailed(other.to_string()),
                })
            }
        }
    }

    /// Clear every stored credential, reset the store, and publish `event`.
    /// Storage failures are logged; every key is still attempted.
    pub fn end_session(&self, event: AuthEvent) {
        self.clear_credentials();
        self.store.logout();
        self.events.publish(event);
    }

    fn clear_credentials(&self) {
        for key in CREDENTIAL_KEYS {
            if let Err(e) = self.credentials.remove(key) {
                warn!(key, error = %e, "Failed to clear stored credential");
            }
        }
    }

    async fn authenticate(&self, request: Request) -> Result<Envelope<AuthPayload>, ApiError> {
        let response = self.send(request).await?;
        let envelope: Envelope<AuthPayload> = Envelope::from_response(response)?;

        if let Some(ref payload) = envelope.data {
            if let Some(ref token) = payload.access_token {
                self.persist(token, payload.refresh_token.as_deref(), payload.user.as_ref())?;
                match payload.user {
                    Some(ref user) => {
                        info!(username = %user.username, "Signed in");
                        self.store.login(user.clone());
                    }
                    None => self.store.replace(SessionState {
                        logged_in: true,
                        user: None,
                    }),
                }
                self.events.publish(AuthEvent::LoggedIn);
            }
        }
        Ok(envelope)
    }

    /// Write the whole credential. If any part fails to store, nothing is
    /// left behind and the session ends, whatever was signed in before.
    fn persist(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&UserSummary>,
    ) -> Result<(), ApiError> {
        let written = (|| -> anyhow::Result<()> {
            self.credentials.set(TOKEN_KEY, access_token)?;
            match refresh_token {
                Some(token) => self.credentials.set(REFRESH_TOKEN_KEY, token)?,
                None => self.credentials.remove(REFRESH_TOKEN_KEY)?,
            }
            match user {
                Some(user) => self.credentials.set(USER_KEY, &serde_json::to_string(user)?)?,
                None => self.credentials.remove(USER_KEY)?,
            }
            Ok(())
        })();

        if let Err(err) = written {
            warn!(error = %err, "Failed to store credential, rolling back");
            self.end_session(AuthEvent::LoggedOut);
            return Err(err.into());
        }
        Ok(())
    }

    async fn request_new_access_token(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .refresh_token()
            .ok_or_else(|| ApiError::RefreshFailed("No refresh token available".to_string()))?;

        // Straight to the transport: a rejected refresh must not itself be
        // intercepted and refreshed.
        let request = Request::post(REFRESH_PATH).bearer(refresh_token);
        let response = self.dispatch(request).await?;
        let envelope: Envelope<RefreshPayload> = Envelope::from_response(response)?;

        let payload = envelope
            .data
            .ok_or_else(|| ApiError::RefreshFailed("Failed to refresh token".to_string()))?;
        let token = payload
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::RefreshFailed("Failed to refresh token".to_string()))?;

        self.credentials.set(TOKEN_KEY, &token)?;
        if let Some(rotated) = payload.refresh_token {
            self.credentials.set(REFRESH_TOKEN_KEY, &rotated)?;
        }
        Ok(token)
    }

    // ===== Request pipeline =====

    fn bearer_for(&self, request: &Request) -> Option<String> {
        match request.credentials {
            Credentials::Bearer(ref token) => Some(token.clone()),
            Credentials::Session => self.access_token(),
        }
    }

    /// Outbound interceptor: attach the bearer token the request should carry.
    fn authorize(&self, mut request: Request) -> (Request, Option<String>) {
        let token = self.bearer_for(&request);
        if let Some(ref token) = token {
            request.set_header("Authorization", format!("Bearer {}", token));
        }
        (request, token)
    }

    async fn dispatch(&self, request: Request) -> Result<Response, ApiError> {
        self.dispatch_with_token(request).await.map(|(response, _)| response)
    }

    /// Send as-is and report which bearer token went out with it.
    async fn dispatch_with_token(
        &self,
        request: Request,
    ) -> Result<(Response, Option<String>), ApiError> {
        let (request, token) = self.authorize(request);
        Ok((self.transport.send(request).await?, token))
    }

    /// Send a request through the full pipeline. Non-2xx responses come back
    /// as `Ok`; only transport failures and failed refreshes are `Err`.
    pub async fn send(&self, request: Request) -> Result<Response, ApiError> {
        let (response, sent_token) = self.dispatch_with_token(request.clone()).await?;
        if !response.is_expired_token() {
            return Ok(response);
        }
        debug!(path = %request.path, "Access token expired");

        // A refresh already landed while this request was out: reuse its token
        if request.credentials == Credentials::Session {
            if let Some(current) = self.access_token() {
                if sent_token.as_deref() != Some(current.as_str()) {
                    debug!(path = %request.path, "Retrying with the already refreshed token");
                    return self.dispatch(request.bearer(current)).await;
                }
            }
        }

        let token = match self.refresh.join() {
            Ticket::Leader(lease) => match self.refresh_access_token().await {
                Ok(token) => {
                    lease.resolve(&token);
                    token
                }
                Err(err) => {
                    lease.reject(&err.to_string());
                    // The caller sees the response that started all this
                    return Ok(response);
                }
            },
            Ticket::Waiter(waiter) => waiter.wait().await?,
        };

        debug!(path = %request.path, "Retrying request with refreshed token");
        self.dispatch(request.bearer(token)).await
    }
}
