use std::cmp::Reverse;

use serde::Serialize;

use crate::media::{ImageExt, VIDEO_EXTENSIONS};
use crate::model::{Channel, Comment, Media, Post, RenderedBlock};
use crate::utils::{ext_of, ATTACHMENTS_DIR};

/// Every archived post carries the same tag set.
const TAGS: &[&str] = &["reddit", "post"];
/// How many ranked comments a post's own page keeps.
const TOP_COMMENTS: usize = 10;
const COMMENT_DATE_FORMAT: &str = "%H:%M - %d %B, %Y";

/// Front matter keys, in the order they serialize.
#[derive(Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    author: String,
    subreddit: String,
    score: i64,
    date: String,
    link: String,
    id: &'a str,
    tags: &'static [&'static str],
}

impl<'a> FrontMatter<'a> {
    fn new(post: &'a Post) -> Self {
        Self {
            title: &post.title,
            author: display_author(post.author.as_deref()),
            subreddit: format!("/r/{}", post.subreddit),
            score: post.score,
            date: post.created.to_rfc3339(),
            link: format!("https://reddit.com{}", post.permalink),
            id: &post.id,
            tags: TAGS,
        }
    }

    /// Hand-written equivalent of the serde form: same keys, same order,
    /// every string scalar double-quoted.
    fn to_manual_yaml(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("title: {}\n", yaml_quote(self.title)));
        out.push_str(&format!("author: {}\n", yaml_quote(&self.author)));
        out.push_str(&format!("subreddit: {}\n", yaml_quote(&self.subreddit)));
        out.push_str(&format!("score: {}\n", self.score));
        out.push_str(&format!("date: {}\n", self.date));
        out.push_str(&format!("link: {}\n", yaml_quote(&self.link)));
        out.push_str(&format!("id: {}\n", yaml_quote(self.id)));
        out.push_str("tags:\n");
        for tag in self.tags {
            out.push_str(&format!("- {tag}\n"));
        }
        out
    }
}

fn yaml_quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

fn display_author(author: Option<&str>) -> String {
    match author {
        Some(name) => format!("/u/{name}"),
        None => "[deleted]".to_string(),
    }
}

/// Render one post into its archive block. Never fails: a serializer error
/// falls back to the manual front matter writer instead of dropping the post.
pub fn render_post(post: &Post) -> RenderedBlock {
    let front_matter = FrontMatter::new(post);
    let header = match serde_yaml::to_string(&front_matter) {
        Ok(yaml) => yaml,
        Err(e) => {
            log::warn!("front matter for {} fell back to manual form: {e}", post.id);
            front_matter.to_manual_yaml()
        }
    };
    let mut text = format!("## Post\n\n---\n{header}---");
    if !post.selftext.is_empty() {
        text.push_str("\n\n");
        text.push_str(post.selftext.trim_end());
    }
    RenderedBlock {
        id: post.id.clone(),
        channel: Channel::Post,
        text,
    }
}

/// Render one comment into its archive block.
pub fn render_comment(comment: &Comment) -> RenderedBlock {
    let text = format!(
        "### Comment\n\n\
         **Author:** {author}\n\n\
         **Body:**\n\n\
         {body}\n\n\
         **Score:** {score}\n\n\
         **Link:** [Comment](https://reddit.com{permalink})\n\n\
         **ID:** {id}\n\n\
         **Date:** {date}",
        author = display_author(comment.author.as_deref()),
        body = comment.body.trim_end(),
        score = comment.score,
        permalink = comment.permalink,
        id = comment.id,
        date = comment.created.format(COMMENT_DATE_FORMAT),
    );
    RenderedBlock {
        id: comment.id.clone(),
        channel: Channel::Comment,
        text,
    }
}

/// Append a preview line for resolved media. URLs and files whose extension
/// is neither image nor video add nothing.
pub fn append_media_preview(text: String, media: &Media) -> String {
    let (target, ext) = match media {
        Media::File(name) => (format!("{ATTACHMENTS_DIR}/{name}"), ext_of(name)),
        Media::Link(url) => (url.clone(), ext_of(url)),
    };
    if ImageExt::matches(&ext) {
        format!("{text}\n\n![Preview]({target})")
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        format!("{text}\n\n[Video]({target})")
    } else {
        text
    }
}

/// The post's own page: title, the rendered block (media preview included),
/// then the ranked top-level comments.
pub fn render_post_page(post: &Post, block_text: &str) -> String {
    let mut out = format!(
        "# {}\n\n{}\n\n## Comments\n",
        post.title,
        block_text.trim_end()
    );
    let mut ranked: Vec<&Comment> = post.comments.iter().collect();
    // Stable sort: equal scores keep their fetch order.
    ranked.sort_by_key(|comment| Reverse(comment.score));
    for comment in ranked.into_iter().take(TOP_COMMENTS) {
        out.push('\n');
        out.push_str(&comment_entry(comment, post.author.as_deref()));
    }
    out
}

fn comment_entry(comment: &Comment, op: Option<&str>) -> String {
    let author = match comment.author.as_deref() {
        Some(name) if op == Some(name) => format!("/u/{name} (OP)"),
        Some(name) => format!("/u/{name}"),
        None => "[deleted]".to_string(),
    };
    // Two-space indent keeps multi-line bodies nested under the bullet.
    let body = comment.body.trim_end().replace('\n', "\n  ");
    format!(
        "- **{author}** ({date}, {score} points):\n  {body}\n",
        date = comment.created.format(COMMENT_DATE_FORMAT),
        score = comment.score,
    )
}
