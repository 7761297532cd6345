//! Map what the user typed to a canonical album id.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::api::models::Album;
use crate::api::ApiClient;
use crate::error::ClientError;

/// A resolved album. `title`/`slug` are the human-entered side and are
/// not unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumIdentity {
    pub album_id: String,
    pub title: Option<String>,
    pub slug: Option<String>,
}

impl From<&Album> for AlbumIdentity {
    fn from(album: &Album) -> Self {
        Self {
            album_id: album.album_id.clone(),
            title: Some(album.title.clone()).filter(|t| !t.is_empty()),
            slug: album.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(AlbumIdentity),
    /// More than one album matched; candidates in display order.
    Ambiguous(Vec<Album>),
    NotFound,
}

impl Resolution {
    fn from_matches(matches: Vec<Album>) -> Self {
        let mut matches: Vec<Album> = matches
            .into_iter()
            .filter(Album::has_canonical_id)
            .collect();
        match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Resolved(AlbumIdentity::from(&matches.remove(0))),
            _ => Resolution::Ambiguous(matches),
        }
    }

    pub fn album_id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(identity) => Some(&identity.album_id),
            _ => None,
        }
    }
}

fn canonical_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{1,2}[0-9]{3,6}$").unwrap())
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)+$").unwrap())
}

/// `a001`, `ab123456`: ids the backend assigns.
pub fn is_canonical_id(query: &str) -> bool {
    canonical_id_pattern().is_match(query)
}

/// Hyphenated lowercase words, as used by internal album links.
pub fn is_slug(query: &str) -> bool {
    slug_pattern().is_match(query)
}

/// Trim, lowercase and collapse whitespace runs to one space. Accents are
/// kept: the title index compares lowercased titles exactly.
pub fn index_key(query: &str) -> String {
    let lowered = query.trim().nfc().collect::<String>().to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Like `index_key`, with diacritics stripped as well. Used for the
/// catalog scan, where both sides are folded.
pub fn normalize_query(query: &str) -> String {
    let folded: String = query
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Catalog scan: title-or-artist substring matches, exact titles first.
/// Backend order is kept within each group.
fn scan_catalog(catalog: Vec<Album>, needle: &str) -> Vec<Album> {
    let (exact, partial): (Vec<Album>, Vec<Album>) = catalog
        .into_iter()
        .filter(|album| {
            normalize_query(&album.title).contains(needle)
                || normalize_query(&album.artist).contains(needle)
        })
        .partition(|album| normalize_query(&album.title) == needle);
    exact.into_iter().chain(partial).collect()
}

/// An empty index answers 404; treat that as zero matches.
fn none_if_missing(result: Result<Vec<Album>, ClientError>) -> Result<Vec<Album>, ClientError> {
    match result {
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        other => other,
    }
}

pub struct AlbumResolver {
    api: ApiClient,
}

impl AlbumResolver {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Deterministic for a given query and backend state.
    pub async fn resolve(&self, query: &str) -> Result<Resolution, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Resolution::NotFound);
        }

        if is_canonical_id(query) {
            return Ok(Resolution::Resolved(AlbumIdentity {
                album_id: query.to_string(),
                title: None,
                slug: None,
            }));
        }

        if is_slug(query) {
            let matches = none_if_missing(self.api.albums_by_slug(query).await)?;
            if !matches.is_empty() {
                debug!("Slug {} matched {} album(s)", query, matches.len());
                return Ok(Resolution::from_matches(matches));
            }
        }

        let key = index_key(query);
        let matches = none_if_missing(self.api.albums_by_title(&key).await)?;
        if !matches.is_empty() {
            debug!("Title index matched {} album(s) for {:?}", matches.len(), key);
            return Ok(Resolution::from_matches(matches));
        }

        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(Resolution::NotFound);
        }
        debug!("No title index match for {:?}, scanning catalog", key);
        let catalog = self.api.all_albums().await?;
        Ok(Resolution::from_matches(scan_catalog(catalog, &normalized)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: &str, title: &str, artist: &str) -> Album {
        serde_json::from_value(serde_json::json!({
            "album_id": id,
            "title": title,
            "artist": artist,
        }))
        .unwrap()
    }

    #[test]
    fn canonical_id_shape() {
        assert!(is_canonical_id("a001"));
        assert!(is_canonical_id("ab123456"));
        assert!(!is_canonical_id("A001"));
        assert!(!is_canonical_id("ok computer"));
        assert!(!is_canonical_id("a01"));
        assert!(!is_canonical_id("abc001"));
    }

    #[test]
    fn slug_shape() {
        assert!(is_slug("ok-computer"));
        assert!(is_slug("in-rainbows-2007"));
        assert!(!is_slug("okcomputer"));
        assert!(!is_slug("ok computer"));
        assert!(!is_slug("-ok"));
    }

    #[test]
    fn normalize_folds_case_accents_and_spaces() {
        assert_eq!(normalize_query("  Homogénic \t by   BJÖRK "), "homogenic by bjork");
        assert_eq!(normalize_query("Café"), "cafe");
        assert_eq!(normalize_query("   "), "");
    }

    #[test]
    fn index_key_keeps_accents() {
        assert_eq!(index_key("  Homogénic \t by   BJÖRK "), "homogénic by björk");
        assert_eq!(index_key("Cafe\u{301}"), "café");
        assert_eq!(index_key("Kid A"), "kid a");
    }

    #[test]
    fn scan_lists_exact_titles_first() {
        let catalog = vec![
            album("a001", "Kid A Mnesia", "Radiohead"),
            album("a002", "Blue", "Joni Mitchell"),
            album("a003", "Kid A", "Radiohead"),
            album("a004", "Amnesiac", "Radiohead"),
        ];
        let found = scan_catalog(catalog, "kid a");
        let ids: Vec<&str> = found.iter().map(|a| a.album_id.as_str()).collect();
        assert_eq!(ids, vec!["a003", "a001"]);
    }

    #[test]
    fn scan_matches_artist() {
        let catalog = vec![
            album("a001", "Blue", "Joni Mitchell"),
            album("a002", "Court and Spark", "Joni Mitchell"),
            album("a003", "Kid A", "Radiohead"),
        ];
        assert_eq!(scan_catalog(catalog, "joni").len(), 2);
    }

    #[test]
    fn classification_by_match_count() {
        assert_eq!(Resolution::from_matches(vec![]), Resolution::NotFound);

        let single = Resolution::from_matches(vec![album("a001", "Blue", "Joni Mitchell")]);
        assert_eq!(single.album_id(), Some("a001"));

        let many = Resolution::from_matches(vec![
            album("a001", "Blue", "Joni Mitchell"),
            album("a002", "Blue", "Weezer"),
        ]);
        assert!(matches!(many, Resolution::Ambiguous(ref c) if c.len() == 2));
    }

    #[test]
    fn matches_without_id_are_dropped() {
        let r = Resolution::from_matches(vec![
            album("", "Blue", "Joni Mitchell"),
            album("a002", "Blue", "Weezer"),
        ]);
        assert_eq!(r.album_id(), Some("a002"));
    }
}
