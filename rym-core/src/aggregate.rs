//! The album page's view model: metadata plus the rating aggregate.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::api::models::{Album, RatingAggregate};
use crate::api::ApiClient;
use crate::credentials::CredentialStore;
use crate::error::ClientError;
use crate::request_tracker::{LoadOutcome, RequestTracker};

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumView {
    pub album: Album,
    pub aggregate: RatingAggregate,
}

/// `GET /ratings/{albumId}`, with a missing aggregate read as empty.
///
/// Albums nobody has rated have no aggregate record; anything other than
/// a 404 is a real failure.
pub async fn fetch_aggregate(
    api: &ApiClient,
    album_id: &str,
    bearer: Option<String>,
) -> Result<RatingAggregate, ClientError> {
    match api.rating_aggregate(album_id, bearer).await {
        Ok(aggregate) => Ok(aggregate),
        Err(e) if e.is_not_found() => {
            debug!("No aggregate for {}, using empty one", album_id);
            Ok(RatingAggregate::default())
        }
        Err(e) => Err(e),
    }
}

/// Loads albums into a single visible view, last request wins.
pub struct AggregateSync {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
    loads: RequestTracker,
    refreshes: RequestTracker,
    view: Mutex<Option<AlbumView>>,
}

impl AggregateSync {
    pub fn new(api: ApiClient, credentials: Arc<CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            loads: RequestTracker::new(),
            refreshes: RequestTracker::new(),
            view: Mutex::new(None),
        }
    }

    /// Currently visible view, if any load has completed.
    pub fn snapshot(&self) -> Option<AlbumView> {
        self.view.lock().unwrap().clone()
    }

    pub fn current_album_id(&self) -> Option<String> {
        self.view
            .lock()
            .unwrap()
            .as_ref()
            .map(|v| v.album.album_id.clone())
    }

    /// Fetch album metadata, then its aggregate, and make them visible.
    ///
    /// If another load is issued before this one finishes, its result
    /// (success or failure) is dropped and `Superseded` is returned.
    pub async fn load(&self, album_id: &str) -> Result<LoadOutcome<AlbumView>, ClientError> {
        let token = self.loads.issue();
        let result = self.fetch_view(album_id).await;

        if !self.loads.is_latest(token) {
            debug!("Discarding stale load of {}", album_id);
            return Ok(LoadOutcome::Superseded);
        }

        let view = result?;
        *self.view.lock().unwrap() = Some(view.clone());
        info!("Loaded album {}", album_id);
        Ok(LoadOutcome::Applied(view))
    }

    async fn fetch_view(&self, album_id: &str) -> Result<AlbumView, ClientError> {
        let mut album = self.api.album(album_id).await?;
        if !album.has_canonical_id() {
            album.album_id = album_id.to_string();
        }
        let aggregate = if album.has_canonical_id() {
            fetch_aggregate(&self.api, &album.album_id, self.credentials.bearer()).await?
        } else {
            RatingAggregate::default()
        };
        Ok(AlbumView { album, aggregate })
    }

    /// Re-fetch only the aggregate of the visible album.
    ///
    /// Dropped as `Superseded` if a load or another refresh was issued
    /// meanwhile, or the visible album changed.
    pub async fn refresh(&self) -> Result<LoadOutcome<AlbumView>, ClientError> {
        let album_id = self
            .current_album_id()
            .ok_or_else(|| ClientError::InvalidInput("no album loaded".to_string()))?;
        let load_token = self.loads.current();
        let token = self.refreshes.issue();

        let result = fetch_aggregate(&self.api, &album_id, self.credentials.bearer()).await;

        if !self.loads.is_latest(load_token) || !self.refreshes.is_latest(token) {
            debug!("Discarding stale refresh of {}", album_id);
            return Ok(LoadOutcome::Superseded);
        }
        let aggregate = result?;

        let mut view = self.view.lock().unwrap();
        match view.as_mut() {
            Some(current) if current.album.album_id == album_id => {
                current.aggregate = aggregate;
                Ok(LoadOutcome::Applied(current.clone()))
            }
            _ => Ok(LoadOutcome::Superseded),
        }
    }

    /// Count one more like on `user_id`'s review of the visible album.
    ///
    /// The only change made to the aggregate without a re-fetch. Returns
    /// false if the album is no longer visible or has no such review.
    pub fn apply_like(&self, album_id: &str, user_id: &str) -> bool {
        let mut view = self.view.lock().unwrap();
        let Some(current) = view.as_mut() else {
            return false;
        };
        if current.album.album_id != album_id {
            return false;
        }
        match current
            .aggregate
            .reviews
            .iter_mut()
            .find(|r| r.user_id == user_id)
        {
            Some(review) => {
                review.like_count += 1;
                true
            }
            None => false,
        }
    }
}
