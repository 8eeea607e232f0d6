use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// One record from an upstream listing. The `kind` tag in the listing JSON
/// decides the variant once, at ingestion.
#[derive(Deserialize, Debug)]
#[serde(tag = "kind", content = "data")]
pub enum Item {
    #[serde(rename = "t3")]
    Post(Post),
    #[serde(rename = "t1")]
    Comment(Comment),
}

impl Item {
    pub fn into_post(self) -> Option<Post> {
        match self {
            Item::Post(post) => Some(post),
            Item::Comment(_) => None,
        }
    }

    pub fn into_comment(self) -> Option<Comment> {
        match self {
            Item::Post(_) => None,
            Item::Comment(comment) => Some(comment),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "author")]
    pub author: Option<String>,
    pub subreddit: String,
    pub score: i64,
    #[serde(rename = "created_utc", deserialize_with = "epoch_seconds")]
    pub created: DateTime<Utc>,
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub selftext: String,
    /// Top-level comments, fetched separately for new posts only.
    #[serde(skip)]
    pub comments: Vec<Comment>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Comment {
    pub id: String,
    #[serde(default, deserialize_with = "author")]
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    #[serde(rename = "created_utc", deserialize_with = "epoch_seconds")]
    pub created: DateTime<Utc>,
    pub permalink: String,
}

/// The two independent content streams of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Post,
    Comment,
}

/// The rendered text of one item. Immutable once produced; parsed historical
/// blocks recover `id` from their ID metadata line (empty when missing).
#[derive(Debug, Clone)]
pub struct RenderedBlock {
    pub id: String,
    pub channel: Channel,
    pub text: String,
}

/// A resolved piece of post media: a file under the attachments directory,
/// or a direct external URL worth linking to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    File(String),
    Link(String),
}

/// Deleted and removed accounts come back as the literal "[deleted]".
fn author<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.filter(|n| n != "[deleted]"))
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = f64::deserialize(deserializer)?;
    Utc.timestamp_opt(seconds as i64, 0)
        .single()
        .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_child_decodes_by_kind() {
        let post: Item = serde_json::from_str(
            r#"{"kind": "t3", "data": {
                "id": "abc123",
                "title": "A title",
                "author": "someone",
                "subreddit": "pics",
                "score": 42,
                "created_utc": 1619866272.0,
                "permalink": "/r/pics/comments/abc123/a_title/",
                "url": "https://i.imgur.com/xyz.jpg",
                "selftext": ""
            }}"#,
        )
        .unwrap();
        let post = post.into_post().unwrap();
        assert_eq!(post.id, "abc123");
        assert_eq!(post.author.as_deref(), Some("someone"));
        assert_eq!(post.created.timestamp(), 1_619_866_272);

        let comment: Item = serde_json::from_str(
            r#"{"kind": "t1", "data": {
                "id": "def456",
                "author": "[deleted]",
                "body": "hello",
                "score": 1,
                "created_utc": 1619866272.5,
                "permalink": "/r/pics/comments/abc123/a_title/def456/"
            }}"#,
        )
        .unwrap();
        let comment = comment.into_comment().unwrap();
        assert_eq!(comment.id, "def456");
        assert_eq!(comment.author, None);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let result: Result<Item, _> =
            serde_json::from_str(r#"{"kind": "more", "data": {"children": []}}"#);
        assert!(result.is_err());
    }
}
