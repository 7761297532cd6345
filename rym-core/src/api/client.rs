use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::models::{Album, ChartItem, ChartResponse, RatingAggregate, TokenResponse};
use super::{ApiRequest, ApiResponse, Transport};
use crate::config::ConfigProvider;
use crate::error::ClientError;

/// Typed access to the album-rating backend.
///
/// The base URL comes from the memoized runtime configuration, so the
/// first call on a fresh process also triggers the config fetch.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    config: Arc<ConfigProvider>,
}

/// List endpoints answer with either a single object or an array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Album>),
    One(Album),
}

impl From<OneOrMany> for Vec<Album> {
    fn from(v: OneOrMany) -> Self {
        match v {
            OneOrMany::Many(albums) => albums,
            OneOrMany::One(album) => vec![album],
        }
    }
}

/// Join a base URL and a path, tolerating a trailing slash on the base.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<ConfigProvider>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &Arc<ConfigProvider> {
        &self.config
    }

    async fn url(&self, path: &str) -> Result<String, ClientError> {
        let config = self.config.get().await?;
        Ok(join_url(&config.api_base_url, path))
    }

    /// Send a request and turn any non-2xx status into a `ClientError`.
    async fn execute(&self, request: ApiRequest, resource: &str) -> Result<ApiResponse, ClientError> {
        let resp = self.transport.send(request).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            debug!("{} answered HTTP {}", resource, resp.status);
            Err(ClientError::from_status(resp.status, resource, &resp.body))
        }
    }

    /// `GET /albums/{id}`
    pub async fn album(&self, album_id: &str) -> Result<Album, ClientError> {
        let path = format!("albums/{}", segment(album_id));
        let url = self.url(&path).await?;
        self.execute(ApiRequest::get(url), &path).await?.json()
    }

    /// `GET /albums/by-slug/{slug}`
    pub async fn albums_by_slug(&self, slug: &str) -> Result<Vec<Album>, ClientError> {
        let path = format!("albums/by-slug/{}", segment(slug));
        let url = self.url(&path).await?;
        let found: OneOrMany = self.execute(ApiRequest::get(url), &path).await?.json()?;
        Ok(found.into())
    }

    /// `GET /albums/by-title/{title}`
    pub async fn albums_by_title(&self, title: &str) -> Result<Vec<Album>, ClientError> {
        let path = format!("albums/by-title/{}", segment(title));
        let url = self.url(&path).await?;
        let found: OneOrMany = self.execute(ApiRequest::get(url), &path).await?.json()?;
        Ok(found.into())
    }

    /// `GET /albums`, the full catalog.
    pub async fn all_albums(&self) -> Result<Vec<Album>, ClientError> {
        let url = self.url("albums").await?;
        let found: OneOrMany = self.execute(ApiRequest::get(url), "albums").await?.json()?;
        Ok(found.into())
    }

    /// `GET /ratings/{albumId}`. The bearer is optional for reads.
    pub async fn rating_aggregate(
        &self,
        album_id: &str,
        bearer: Option<String>,
    ) -> Result<RatingAggregate, ClientError> {
        let path = format!("ratings/{}", segment(album_id));
        let url = self.url(&path).await?;
        let request = ApiRequest::get(url).with_bearer(bearer);
        let aggregate: RatingAggregate = self.execute(request, &path).await?.json()?;
        Ok(aggregate.normalized())
    }

    /// `POST /ratings/{albumId}` with `{rating, comment}`.
    pub async fn submit_rating(
        &self,
        album_id: &str,
        rating: u8,
        comment: Option<&str>,
        bearer: String,
    ) -> Result<(), ClientError> {
        let path = format!("ratings/{}", segment(album_id));
        let url = self.url(&path).await?;
        let body = serde_json::json!({
            "rating": rating,
            "comment": comment.unwrap_or_default(),
        });
        let request = ApiRequest::post(url).with_bearer(Some(bearer)).with_json(body);
        self.execute(request, &path).await?;
        Ok(())
    }

    /// `POST /ratings/{albumId}/{userId}/like`. A duplicate like is 409.
    pub async fn like_review(
        &self,
        album_id: &str,
        user_id: &str,
        bearer: String,
    ) -> Result<(), ClientError> {
        let path = format!("ratings/{}/{}/like", segment(album_id), segment(user_id));
        let url = self.url(&path).await?;
        let request = ApiRequest::post(url).with_bearer(Some(bearer));
        self.execute(request, &path).await?;
        Ok(())
    }

    /// `POST /users/favorites/{albumId}`
    pub async fn add_favorite(&self, album_id: &str, bearer: String) -> Result<(), ClientError> {
        let path = format!("users/favorites/{}", segment(album_id));
        let url = self.url(&path).await?;
        let request = ApiRequest::post(url).with_bearer(Some(bearer));
        self.execute(request, &path).await?;
        Ok(())
    }

    /// `GET /charts/{year}`
    pub async fn chart(&self, year: i32) -> Result<Vec<ChartItem>, ClientError> {
        let path = format!("charts/{year}");
        let url = self.url(&path).await?;
        let chart: ChartResponse = self.execute(ApiRequest::get(url), &path).await?.json()?;
        Ok(chart.items)
    }

    /// `GET /auth/callback?code=...`: the backend exchanges the code with
    /// the identity provider and relays its token response.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ClientError> {
        let query = serde_urlencoded::to_string([("code", code)])
            .map_err(|e| ClientError::InvalidInput(format!("failed to encode code: {e}")))?;
        let url = format!("{}?{}", self.url("auth/callback").await?, query);
        self.execute(ApiRequest::get(url), "auth/callback")
            .await?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_tolerates_slashes() {
        assert_eq!(
            join_url("https://api.example/prod/", "charts/1997"),
            "https://api.example/prod/charts/1997"
        );
        assert_eq!(
            join_url("https://api.example/prod", "/albums"),
            "https://api.example/prod/albums"
        );
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(segment("ok computer/1"), "ok%20computer%2F1");
    }

    #[test]
    fn one_or_many_accepts_both_shapes() {
        let one: OneOrMany = serde_json::from_str(r#"{"album_id": "a001"}"#).unwrap();
        let many: OneOrMany =
            serde_json::from_str(r#"[{"album_id": "a001"}, {"album_id": "a002"}]"#).unwrap();
        assert_eq!(Vec::<Album>::from(one).len(), 1);
        assert_eq!(Vec::<Album>::from(many).len(), 2);
    }
}
