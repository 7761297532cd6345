//! Backend payloads.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::de;

/// Album metadata, a read-only snapshot of the backend's record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Album {
    #[serde(default, alias = "id")]
    pub album_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, deserialize_with = "de::opt_i32")]
    pub year: Option<i32>,
    #[serde(default, alias = "cover_url", alias = "coverRef")]
    pub cover: Option<String>,
    #[serde(default, alias = "genres", deserialize_with = "de::string_list")]
    pub genre: Vec<String>,
    #[serde(default, alias = "tracks", deserialize_with = "de::string_list")]
    pub track_list: Vec<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Album {
    pub fn has_canonical_id(&self) -> bool {
        !self.album_id.trim().is_empty()
    }

    /// One-line label used in candidate lists: `Title – Artist (1997)`.
    pub fn display_label(&self) -> String {
        match self.year {
            Some(year) => format!("{} – {} ({})", self.title, self.artist, year),
            None => format!("{} – {}", self.title, self.artist),
        }
    }
}

/// One user's rating of an album. The backend keys reviews by
/// (album, user), so a resubmission replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub user_id: String,
    #[serde(default, deserialize_with = "de::u32_or_zero")]
    pub rating: u32,
    #[serde(default, alias = "review_text")]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, alias = "likes", deserialize_with = "de::u32_or_zero")]
    pub like_count: u32,
}

impl Review {
    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YearRank {
    #[serde(default, deserialize_with = "de::opt_i32")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "de::u32_or_zero")]
    pub rank: u32,
}

/// Backend-computed rating summary for an album.
///
/// Never recomputed locally: it changes only by re-fetching, apart from
/// the single-step like increment applied after a successful like.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RatingAggregate {
    #[serde(default, deserialize_with = "de::f64_or_zero")]
    pub average_rating: f64,
    #[serde(default, deserialize_with = "de::u32_or_zero")]
    pub ratings_count: u32,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub ranks: Vec<YearRank>,
    /// Count reported by endpoints that omit the review bodies.
    #[serde(default, deserialize_with = "de::opt_u32")]
    pub reviews_count: Option<u32>,
}

impl RatingAggregate {
    /// Clamp the average into [0, 5] and keep one review per user.
    ///
    /// When the same user appears twice the most recent review wins; the
    /// position of the first occurrence is kept.
    pub fn normalized(mut self) -> Self {
        self.average_rating = self.average_rating.clamp(0.0, 5.0);

        let mut index_by_user: HashMap<String, usize> = HashMap::new();
        let mut reviews: Vec<Review> = Vec::with_capacity(self.reviews.len());
        for review in self.reviews {
            match index_by_user.get(&review.user_id) {
                Some(&i) => {
                    if review.timestamp.unwrap_or(i64::MIN) >= reviews[i].timestamp.unwrap_or(i64::MIN)
                    {
                        reviews[i] = review;
                    }
                }
                None => {
                    index_by_user.insert(review.user_id.clone(), reviews.len());
                    reviews.push(review);
                }
            }
        }
        self.reviews = reviews;
        self
    }

    /// Number of reviews, preferring the bodies when they were returned.
    pub fn review_total(&self) -> u32 {
        if !self.reviews.is_empty() {
            self.reviews.len() as u32
        } else {
            self.reviews_count.unwrap_or(0)
        }
    }

    pub fn review_by(&self, user_id: &str) -> Option<&Review> {
        self.reviews.iter().find(|r| r.user_id == user_id)
    }
}

/// Chart row as returned by `GET /charts/{year}`, before enrichment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChartItem {
    #[serde(default, deserialize_with = "de::opt_u32")]
    pub rank: Option<u32>,
    #[serde(default)]
    pub album_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, deserialize_with = "de::opt_text")]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "de::opt_text")]
    pub year: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartResponse {
    #[serde(default)]
    pub items: Vec<ChartItem>,
}

/// Body of `GET /auth/callback`: the identity provider's token response,
/// relayed by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}
