//! API client for the profile, search, favourite and match endpoints.
//!
//! All calls go through [`AuthSession::send`], so the bearer token is attached
//! and refreshed the same way for every endpoint.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::auth::AuthSession;
use crate::models::{
    Favourite, NewProfileForm, Profile, ProfileSearchParams, ProfileWithUser, TopFavourite, User,
};

use super::envelope::{Envelope, FieldErrors};
use super::transport::Request;
use super::ApiError;

/// Smallest and largest `n` accepted by the most-favoured report.
const MIN_TOP_FAVOURITES: u32 = 1;
const MAX_TOP_FAVOURITES: u32 = 100;

/// Default size of the most-favoured report.
pub const DEFAULT_TOP_FAVOURITES: u32 = 20;

/// Clone is cheap - the session is shared.
#[derive(Clone)]
pub struct ApiClient {
    session: Arc<AuthSession>,
}

impl ApiClient {
    pub fn new(session: Arc<AuthSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    async fn fetch<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.session.send(request).await?;
        let envelope: Envelope<T> = Envelope::from_response(response)?;
        if let Some(ref message) = envelope.message {
            debug!(path = %path, message = %message, "API message");
        }
        envelope.data.ok_or_else(|| {
            ApiError::InvalidResponse(format!("Missing data in response from {}", path))
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(Request::get(path)).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        self.fetch(Request::post(path).json(body)).await
    }

    // ===== Users =====

    /// Public details of a user
    pub async fn get_user(&self, user_id: i64) -> Result<User, ApiError> {
        self.get(&format!("/users/{}", user_id)).await
    }

    /// Users the signed-in user has favourited
    pub async fn get_favourites(&self) -> Result<Vec<Favourite>, ApiError> {
        self.get("/users/favourites").await
    }

    /// The `count` most favoured users
    pub async fn get_top_favourites(&self, count: u32) -> Result<Vec<TopFavourite>, ApiError> {
        if !(MIN_TOP_FAVOURITES..=MAX_TOP_FAVOURITES).contains(&count) {
            let mut errors = FieldErrors::new();
            errors.add(
                "count",
                format!(
                    "N must be between {} and {}",
                    MIN_TOP_FAVOURITES, MAX_TOP_FAVOURITES
                ),
            );
            return Err(ApiError::Validation(errors));
        }
        self.get(&format!("/users/favourites/{}", count)).await
    }

    // ===== Profiles =====

    /// The signed-in user's own profiles
    pub async fn get_profiles(&self) -> Result<Vec<Profile>, ApiError> {
        self.get("/profiles").await
    }

    pub async fn get_profile(&self, profile_id: i64) -> Result<Profile, ApiError> {
        self.get(&format!("/profiles/{}", profile_id)).await
    }

    pub async fn create_profile(&self, form: &NewProfileForm) -> Result<Profile, ApiError> {
        form.validate().into_result()?;
        let body = serde_json::to_value(form)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode profile: {}", e)))?;
        self.post("/profiles", body).await
    }

    pub async fn add_favourite(&self, user_id: i64) -> Result<Favourite, ApiError> {
        self.post("/profiles/favourite", json!({ "userId": user_id })).await
    }

    /// Profiles matching one of the signed-in user's own profiles
    pub async fn get_matches(&self, profile_id: i64) -> Result<Vec<ProfileWithUser>, ApiError> {
        self.get(&format!("/profiles/matches/{}", profile_id)).await
    }

    // ===== Search =====

    pub async fn search(&self, params: &ProfileSearchParams) -> Result<Vec<Profile>, ApiError> {
        self.fetch(Request::get("/search").query(params.to_query())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::mock::{expired, json, MockTransport};
    use crate::api::transport::Body;
    use crate::auth::credentials::{CredentialStore, REFRESH_TOKEN_KEY, TOKEN_KEY};
    use crate::auth::MemoryCredentialStore;
    use crate::events::EventBus;
    use crate::store::GlobalStore;

    fn profile_json(id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": 2,
            "description": "Loves hiking",
            "parish": "St. Andrew",
            "biography": "Outdoorsy",
            "sex": "Female",
            "race": "Mixed",
            "birth_year": 1995,
            "height": 165.0,
            "fav_cuisine": "Thai",
            "fav_colour": "Blue",
            "fav_school_subject": "Biology",
            "political": false,
            "religious": true,
            "family_oriented": true
        })
    }

    fn client_with(transport: MockTransport) -> (ApiClient, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let credentials = Arc::new(MemoryCredentialStore::new());
        credentials.set(TOKEN_KEY, "T1").unwrap();
        credentials.set(REFRESH_TOKEN_KEY, "R1").unwrap();
        let session = AuthSession::new(
            transport.clone(),
            credentials,
            GlobalStore::new(),
            EventBus::new(),
        );
        (ApiClient::new(Arc::new(session)), transport)
    }

    #[tokio::test]
    async fn test_get_profile_sends_token() {
        let (client, transport) = client_with(MockTransport::new(|_| async {
            json(200, json!({"success": true, "data": profile_json(7)}))
        }));

        let profile = client.get_profile(7).await.unwrap();
        assert_eq!(profile.id, 7);

        let sent = transport.requests();
        assert_eq!(sent[0].path, "/profiles/7");
        assert_eq!(sent[0].header("Authorization"), Some("Bearer T1"));
    }

    #[tokio::test]
    async fn test_not_found_becomes_server_error() {
        let (client, _) = client_with(MockTransport::new(|_| async {
            json(404, json!({"success": false, "errors": {"error": "Profile not found"}}))
        }));

        let err = client.get_profile(99).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Server rejected request (404): error: Profile not found");
    }

    #[tokio::test]
    async fn test_matches_refresh_transparently() {
        let (client, transport) = client_with(MockTransport::new(|request: Request| async move {
            match request.path.as_str() {
                "/auth/refresh" => json(200, json!({"success": true, "data": {"token": "T2"}})),
                _ if request.header("Authorization") == Some("Bearer T2") => {
                    let mut matched = profile_json(8);
                    matched["user"] = json!({"id": 3, "name": "Dana", "photo": null});
                    json(200, json!({"data": [matched]}))
                }
                _ => expired(),
            }
        }));

        let matches = client.get_matches(7).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user.name, "Dana");
        assert_eq!(transport.count("/auth/refresh"), 1);
        assert_eq!(client.session().access_token().as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_search_sends_only_set_filters() {
        let (client, transport) = client_with(MockTransport::new(|_| async {
            json(200, json!({"success": true, "message": "Found 0 matching profiles", "data": []}))
        }));

        let params = ProfileSearchParams {
            sex: Some("Male".to_string()),
            ..Default::default()
        };
        assert!(client.search(&params).await.unwrap().is_empty());
        assert_eq!(
            transport.requests()[0].query,
            vec![("sex".to_string(), "Male".to_string())]
        );
    }

    #[tokio::test]
    async fn test_add_favourite_body() {
        let (client, transport) = client_with(MockTransport::new(|_| async {
            json(
                201,
                json!({
                    "success": true,
                    "data": {
                        "id": 1,
                        "user_id": 1,
                        "fav_user_id": 5,
                        "created_at": "2026-01-01T00:00:00"
                    }
                }),
            )
        }));

        let favourite = client.add_favourite(5).await.unwrap();
        assert_eq!(favourite.fav_user_id, 5);
        assert_eq!(transport.requests()[0].body, Body::Json(json!({"userId": 5})));
    }

    #[tokio::test]
    async fn test_top_favourites_bounds_checked_locally() {
        let (client, transport) = client_with(MockTransport::new(|_| async {
            json(200, json!({"success": true, "data": []}))
        }));

        assert!(matches!(client.get_top_favourites(0).await, Err(ApiError::Validation(_))));
        assert!(matches!(client.get_top_favourites(101).await, Err(ApiError::Validation(_))));
        assert!(transport.requests().is_empty());

        client.get_top_favourites(DEFAULT_TOP_FAVOURITES).await.unwrap();
        assert_eq!(transport.requests()[0].path, "/users/favourites/20");
    }

    #[tokio::test]
    async fn test_missing_data_is_invalid_response() {
        let (client, _) = client_with(MockTransport::new(|_| async {
            json(200, json!({"success": true}))
        }));
        assert!(matches!(client.get_profiles().await, Err(ApiError::InvalidResponse(_))));
    }
}
