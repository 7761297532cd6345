//! Authenticated writes: ratings, likes, favorites.
//!
//! Nothing here is retried. A write is attempted at most once and the
//! local view is only touched after the backend has accepted it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregate::{AggregateSync, AlbumView};
use crate::api::ApiClient;
use crate::credentials::CredentialStore;
use crate::error::ClientError;
use crate::request_tracker::LoadOutcome;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub fn validate_rating(rating: u8) -> Result<(), ClientError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(ClientError::InvalidInput(format!(
            "Pick a rating from {MIN_RATING} to {MAX_RATING}."
        )))
    }
}

pub struct MutationGateway {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
}

impl MutationGateway {
    pub fn new(api: ApiClient, credentials: Arc<CredentialStore>) -> Self {
        Self { api, credentials }
    }

    fn bearer(&self) -> Result<String, ClientError> {
        self.credentials.bearer().ok_or(ClientError::Unauthenticated)
    }

    /// A rejected credential is useless; drop it so every listener sees
    /// the signed-out state.
    fn on_rejected<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::SessionExpired) = &result {
            warn!("Credential rejected by backend, signing out");
            if let Err(e) = self.credentials.clear() {
                warn!("Failed to clear rejected credential: {}", e);
            }
        }
        result
    }

    /// `POST /ratings/{albumId}`. The aggregate is not touched; follow up
    /// with `AggregateSync::refresh`, or use `rate`.
    pub async fn submit_rating(
        &self,
        album_id: &str,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<(), ClientError> {
        validate_rating(rating)?;
        let bearer = self.bearer()?;
        let result = self
            .api
            .submit_rating(album_id, rating, comment, bearer)
            .await;
        self.on_rejected(result)?;
        info!("Rated {} with {}", album_id, rating);
        Ok(())
    }

    /// `POST /ratings/{albumId}/{userId}/like`.
    ///
    /// `ClientError::Conflict` means this caller already liked the review.
    pub async fn like_review(&self, album_id: &str, user_id: &str) -> Result<(), ClientError> {
        let bearer = self.bearer()?;
        let result = self.api.like_review(album_id, user_id, bearer).await;
        self.on_rejected(result)?;
        info!("Liked review by {} on {}", user_id, album_id);
        Ok(())
    }

    /// `POST /users/favorites/{albumId}`. No local state changes.
    pub async fn add_favorite(&self, album_id: &str) -> Result<(), ClientError> {
        let bearer = self.bearer()?;
        let result = self.api.add_favorite(album_id, bearer).await;
        self.on_rejected(result)?;
        info!("Added {} to favorites", album_id);
        Ok(())
    }

    /// Submit a rating, then re-fetch the visible aggregate.
    pub async fn rate(
        &self,
        view: &AggregateSync,
        album_id: &str,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<LoadOutcome<AlbumView>, ClientError> {
        self.submit_rating(album_id, rating, comment).await?;
        view.refresh().await
    }

    /// Like a review, then bump its like count in the visible view.
    /// Returns whether the view was updated.
    pub async fn like(
        &self,
        view: &AggregateSync,
        album_id: &str,
        user_id: &str,
    ) -> Result<bool, ClientError> {
        self.like_review(album_id, user_id).await?;
        Ok(view.apply_like(album_id, user_id))
    }
}
