use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;
use crate::model::{Comment, Item, Post};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const USER_AGENT: &str = concat!("reddit-archive/", env!("CARGO_PKG_VERSION"));
const PAGE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("reddit authentication failed: {0}")]
    Auth(String),
    #[error("reddit api request failed")]
    Http(#[from] reqwest::Error),
}

/// Blocking Reddit API client. One instance lives for the whole run; its
/// token is fetched once at construction.
pub struct RedditClient {
    http: reqwest::blocking::Client,
    token: String,
    username: String,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<serde_json::Value>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

impl RedditClient {
    /// Authenticate with the password grant and return a ready client.
    pub fn connect(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        let token: TokenResponse = http
            .post(TOKEN_URL)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        let token = token.access_token.ok_or_else(|| {
            ClientError::Auth(
                token
                    .error
                    .unwrap_or_else(|| "no access token in response".to_string()),
            )
        })?;
        Ok(Self {
            http,
            token,
            username: config.username.clone(),
        })
    }

    /// Everything the authenticated user has saved, posts and comments mixed.
    pub fn saved_items(&self) -> Result<Vec<Item>, ClientError> {
        self.listing(&format!("/user/{}/saved", self.username))
    }

    pub fn upvoted_posts(&self) -> Result<Vec<Post>, ClientError> {
        let items = self.listing(&format!("/user/{}/upvoted", self.username))?;
        Ok(items.into_iter().filter_map(Item::into_post).collect())
    }

    pub fn user_posts(&self, username: &str) -> Result<Vec<Post>, ClientError> {
        let items = self.listing(&format!("/user/{username}/submitted?sort=new"))?;
        Ok(items.into_iter().filter_map(Item::into_post).collect())
    }

    pub fn user_comments(&self, username: &str) -> Result<Vec<Comment>, ClientError> {
        let items = self.listing(&format!("/user/{username}/comments?sort=new"))?;
        Ok(items.into_iter().filter_map(Item::into_comment).collect())
    }

    /// Top-level comments of one post, in the API's ranked order.
    pub fn top_level_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError> {
        let url =
            format!("{API_BASE}/comments/{post_id}?depth=1&limit={PAGE_LIMIT}&raw_json=1");
        let listings: Vec<Listing> = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()?
            .error_for_status()?
            .json()?;
        // The endpoint returns a pair of listings: the post, then its comments.
        let Some(comments) = listings.into_iter().nth(1) else {
            return Ok(Vec::new());
        };
        Ok(decode_children(comments.data.children)
            .into_iter()
            .filter_map(Item::into_comment)
            .collect())
    }

    /// Walk a listing to exhaustion with `after` cursors.
    fn listing(&self, path: &str) -> Result<Vec<Item>, ClientError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut url = format!("{API_BASE}{path}{separator}limit={PAGE_LIMIT}&raw_json=1");
            if let Some(cursor) = &after {
                url.push_str("&after=");
                url.push_str(cursor);
            }
            let listing: Listing = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()?
                .error_for_status()?
                .json()?;
            items.extend(decode_children(listing.data.children));
            match listing.data.after {
                Some(cursor) if !cursor.is_empty() => after = Some(cursor),
                _ => break,
            }
        }
        Ok(items)
    }
}

/// Decode listing children, skipping kinds we do not archive ("more"
/// stubs and the like) rather than failing the whole listing.
fn decode_children(children: Vec<serde_json::Value>) -> Vec<Item> {
    children
        .into_iter()
        .filter_map(|child| match serde_json::from_value::<Item>(child) {
            Ok(item) => Some(item),
            Err(e) => {
                log::debug!("skipping listing child: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_abc123",
            "children": [
                {"kind": "t3", "data": {
                    "id": "abc123", "title": "A title", "author": "someone",
                    "subreddit": "pics", "score": 42, "created_utc": 1619866272.0,
                    "permalink": "/r/pics/comments/abc123/a_title/",
                    "url": "https://i.imgur.com/xyz.jpg", "selftext": ""
                }},
                {"kind": "more", "data": {"children": ["def456"]}},
                {"kind": "t1", "data": {
                    "id": "def456", "author": "other", "body": "hi", "score": 1,
                    "created_utc": 1619866272.0,
                    "permalink": "/r/pics/comments/abc123/a_title/def456/"
                }}
            ]
        }
    }"#;

    #[test]
    fn listing_decodes_and_skips_unknown_kinds() {
        let listing: Listing = serde_json::from_str(LISTING).unwrap();
        assert_eq!(listing.data.after.as_deref(), Some("t3_abc123"));
        let items = decode_children(listing.data.children);
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Item::Post(_)));
        assert!(matches!(items[1], Item::Comment(_)));
    }

    #[test]
    fn empty_listing_terminates_pagination() {
        let listing: Listing =
            serde_json::from_str(r#"{"kind": "Listing", "data": {"children": []}}"#).unwrap();
        assert!(listing.data.after.is_none());
        assert!(listing.data.children.is_empty());
    }
}
