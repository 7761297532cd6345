//! Yearly charts, each row enriched with its album's rating aggregate.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::aggregate::fetch_aggregate;
use crate::api::models::{ChartItem, RatingAggregate};
use crate::api::ApiClient;
use crate::credentials::KeyValueStorage;
use crate::error::ClientError;
use crate::request_tracker::{LoadOutcome, RequestTracker};

/// Storage key of the last chart year shown.
pub const CHARTS_YEAR_KEY: &str = "rym.charts_year";

/// Oldest year offered in the year picker.
pub const FIRST_CHART_YEAR: i32 = 1970;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartEntry {
    pub rank: u32,
    pub album_id: Option<String>,
    pub title: String,
    pub artist: String,
    /// Release date, else year, else empty.
    pub release_info: String,
    pub cover: Option<String>,
    pub average_rating: f64,
    pub ratings_count: u32,
    pub reviews_count: u32,
}

impl ChartEntry {
    fn new(position: usize, item: ChartItem, aggregate: &RatingAggregate) -> Self {
        let rank = item
            .rank
            .filter(|r| *r > 0)
            .unwrap_or(position as u32 + 1);
        let release_info = item
            .release_date
            .filter(|d| !d.trim().is_empty())
            .or(item.year.filter(|y| !y.trim().is_empty()))
            .unwrap_or_default();
        Self {
            rank,
            album_id: item.album_id,
            title: item.title,
            artist: item.artist,
            release_info,
            cover: item.cover,
            average_rating: aggregate.average_rating,
            ratings_count: aggregate.ratings_count,
            reviews_count: aggregate.review_total(),
        }
    }
}

/// Years the picker offers, newest first.
pub fn available_years(now: DateTime<Utc>) -> Vec<i32> {
    (FIRST_CHART_YEAR..=now.year()).rev().collect()
}

pub struct ChartsAggregator {
    api: ApiClient,
    storage: Arc<dyn KeyValueStorage>,
    loads: RequestTracker,
}

impl ChartsAggregator {
    pub fn new(api: ApiClient, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            api,
            storage,
            loads: RequestTracker::new(),
        }
    }

    /// Last year loaded successfully, else the current year.
    pub fn preferred_year(&self) -> i32 {
        let stored = match self.storage.get(CHARTS_YEAR_KEY) {
            Ok(value) => value.and_then(|v| v.trim().parse().ok()),
            Err(e) => {
                warn!("Failed to read saved chart year: {}", e);
                None
            }
        };
        stored.unwrap_or_else(|| Utc::now().year())
    }

    /// Ranked chart for `year`.
    ///
    /// Aggregates are fetched for all rows at once. A row whose fetch fails
    /// keeps zeroed rating fields; it never fails the chart. A year with no
    /// chart yields an empty list.
    pub async fn load(&self, year: i32) -> Result<LoadOutcome<Vec<ChartEntry>>, ClientError> {
        let token = self.loads.issue();

        let items = match self.api.chart(year).await {
            Ok(items) => Ok(items),
            Err(e) if e.is_not_found() => {
                debug!("No chart stored for {}", year);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        };
        let items = match items {
            Ok(items) => items,
            Err(_) if !self.loads.is_latest(token) => return Ok(LoadOutcome::Superseded),
            Err(e) => return Err(e),
        };

        let entries = join_all(
            items
                .into_iter()
                .enumerate()
                .map(|(position, item)| self.enrich(position, item)),
        )
        .await;

        if !self.loads.is_latest(token) {
            debug!("Discarding stale chart for {}", year);
            return Ok(LoadOutcome::Superseded);
        }

        if let Err(e) = self.storage.set(CHARTS_YEAR_KEY, &year.to_string()) {
            warn!("Failed to save chart year: {}", e);
        }
        info!("Loaded chart for {} ({} entries)", year, entries.len());
        Ok(LoadOutcome::Applied(entries))
    }

    async fn enrich(&self, position: usize, item: ChartItem) -> ChartEntry {
        let album_id = item
            .album_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from);

        let aggregate = match album_id {
            Some(id) => match fetch_aggregate(&self.api, &id, None).await {
                Ok(aggregate) => aggregate,
                Err(e) => {
                    warn!("Could not fetch ratings for chart entry {}: {}", id, e);
                    RatingAggregate::default()
                }
            },
            None => RatingAggregate::default(),
        };
        ChartEntry::new(position, item, &aggregate)
    }
}
