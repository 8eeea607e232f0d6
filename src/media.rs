use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::Context;
use enum_iterator::{all, Sequence};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;

use crate::model::{Media, Post};
use crate::utils::{domain_of, ext_of, find_file_with_prefix, slug_from_permalink};

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];
/// Hosts the generic video downloader is trusted to handle.
const DOWNLOADER_PLATFORMS: &[&str] =
    &["redgifs.com", "gfycat.com", "imgur.com", "youtube.com"];
const GALLERY_HOST: &str = "imgur.com";
const SHORT_VIDEO_HOST: &str = "redd.it";
const REDIRECT_HOST: &str = "gfycat.com";
/// Redirect pages larger than this are not worth scanning for a video URL.
const REDIRECT_PAGE_LIMIT: usize = 50_000;

/// Image extensions recognised in URLs and probed against gallery hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Sequence)]
pub enum ImageExt {
    Gif,
    Gifv,
    Jpg,
    Jpeg,
    Png,
}

impl ImageExt {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageExt::Gif => "gif",
            ImageExt::Gifv => "gifv",
            ImageExt::Jpg => "jpg",
            ImageExt::Jpeg => "jpeg",
            ImageExt::Png => "png",
        }
    }

    pub fn matches(ext: &str) -> bool {
        all::<ImageExt>().any(|e| e.as_str() == ext)
    }
}

/// One media lookup in flight. `url` starts as the post's external URL and
/// may be rewritten mid-chain by a redirect-resolving strategy.
struct Resolve<'a> {
    post: &'a Post,
    url: String,
    slug: String,
    dest: &'a Path,
    download_videos: bool,
    http: &'a Client,
}

impl Resolve<'_> {
    fn domain(&self) -> String {
        domain_of(&self.url)
    }

    fn ext(&self) -> String {
        ext_of(&self.url)
    }

    fn filename(&self, ext: &str) -> String {
        format!("{}_{}.{}", self.slug, self.post.id, ext)
    }

    fn prefix(&self) -> String {
        format!("{}_{}", self.slug, self.post.id)
    }
}

/// Outcome of one strategy: a final answer, a rewritten working URL for the
/// strategies after it, or nothing.
enum Step {
    Resolved(Option<Media>),
    Rewrite(String),
    Pass,
}

trait Strategy {
    fn name(&self) -> &'static str;
    fn can_handle(&self, cx: &Resolve) -> bool;
    fn try_resolve(&self, cx: &Resolve) -> Step;
}

/// Resolves a post's external URL to local media or a direct link by running
/// a fixed-order strategy chain. Every network call in here is best-effort:
/// transport errors degrade to the owning step's failure behaviour and are
/// never propagated.
pub struct MediaResolver {
    http: Client,
    strategies: Vec<Box<dyn Strategy>>,
}

impl MediaResolver {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("reddit-archive/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("unable to build media http client")?;
        Ok(Self {
            http,
            strategies: vec![
                Box::new(SelfPost),
                Box::new(ImgurGallery),
                Box::new(DirectMedia),
                Box::new(RedditVideo),
                Box::new(GfycatRedirect),
                Box::new(ImgurProbe),
                Box::new(PlatformVideo),
            ],
        })
    }

    pub fn resolve(&self, post: &Post, dest: &Path, download_videos: bool) -> Option<Media> {
        let mut cx = Resolve {
            post,
            url: post.url.clone(),
            slug: slug_from_permalink(&post.permalink),
            dest,
            download_videos,
            http: &self.http,
        };
        for strategy in &self.strategies {
            if !strategy.can_handle(&cx) {
                continue;
            }
            match strategy.try_resolve(&cx) {
                Step::Resolved(media) => return media,
                Step::Rewrite(url) => {
                    log::debug!("{}: rewrote {} to {}", strategy.name(), cx.url, url);
                    cx.url = url;
                }
                Step::Pass => {}
            }
        }
        // Nothing claimed the URL: keep it as a link unless the caller asked
        // for local video capture, in which case there is nothing to keep.
        if cx.download_videos {
            None
        } else {
            Some(Media::Link(cx.url))
        }
    }
}

/// A post pointing at its own permalink has no media at all. Must decide
/// without touching the network.
struct SelfPost;

impl Strategy for SelfPost {
    fn name(&self) -> &'static str {
        "self-post"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        cx.url.ends_with(&cx.post.permalink)
    }

    fn try_resolve(&self, _cx: &Resolve) -> Step {
        Step::Resolved(None)
    }
}

/// Multi-image galleries are unsupported.
struct ImgurGallery;

impl Strategy for ImgurGallery {
    fn name(&self) -> &'static str {
        "imgur-gallery"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        cx.domain() == GALLERY_HOST && cx.url.contains("gallery")
    }

    fn try_resolve(&self, _cx: &Resolve) -> Step {
        Step::Resolved(None)
    }
}

/// The URL already names an image or video file: fetch it and keep the bytes
/// when the content type agrees.
struct DirectMedia;

impl Strategy for DirectMedia {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        let ext = cx.ext();
        ImageExt::matches(&ext)
            || (cx.download_videos && VIDEO_EXTENSIONS.contains(&ext.as_str()))
    }

    fn try_resolve(&self, cx: &Resolve) -> Step {
        let response = match cx.http.get(&cx.url).send() {
            Ok(response) => response,
            Err(e) => {
                log::warn!("fetching {} failed: {e}", cx.url);
                return Step::Resolved(None);
            }
        };
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok());
        let kind = media_type.as_ref().map(mime::Mime::type_);
        if kind == Some(mime::IMAGE) || (kind == Some(mime::VIDEO) && cx.download_videos) {
            Step::Resolved(persist(cx, response, &cx.ext()))
        } else if kind == Some(mime::VIDEO) {
            // A video we are not downloading is still worth a link.
            Step::Resolved(Some(Media::Link(cx.url.clone())))
        } else {
            Step::Pass
        }
    }
}

/// Short reddit-hosted videos go through the external downloader.
struct RedditVideo;

impl Strategy for RedditVideo {
    fn name(&self) -> &'static str {
        "reddit-video"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        cx.download_videos && cx.domain() == SHORT_VIDEO_HOST
    }

    fn try_resolve(&self, cx: &Resolve) -> Step {
        match download_video(&cx.url, cx.dest, &cx.prefix()) {
            Ok(filename) => Step::Resolved(Some(Media::File(filename))),
            Err(e) => {
                log::warn!("video download for {} failed: {e}", cx.url);
                Step::Resolved(Some(Media::Link(cx.url.clone())))
            }
        }
    }
}

/// Gfycat pages are small HTML shells around one direct video URL; fish it
/// out and let the rest of the chain work on it.
struct GfycatRedirect;

static EMBEDDED_MP4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"http[0-9A-Za-z+:/.]+\.mp4").unwrap());

impl Strategy for GfycatRedirect {
    fn name(&self) -> &'static str {
        "gfycat-redirect"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        cx.domain() == REDIRECT_HOST
    }

    fn try_resolve(&self, cx: &Resolve) -> Step {
        let body = match cx.http.get(&cx.url).send().and_then(|r| r.text()) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("fetching {} failed: {e}", cx.url);
                return Step::Pass;
            }
        };
        if body.len() < REDIRECT_PAGE_LIMIT {
            if let Some(found) = EMBEDDED_MP4.find(&body) {
                return Step::Rewrite(found.as_str().to_string());
            }
        }
        Step::Pass
    }
}

/// Imgur page URLs usually hide a direct image one extension probe away.
struct ImgurProbe;

impl Strategy for ImgurProbe {
    fn name(&self) -> &'static str {
        "imgur-probe"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        cx.domain() == GALLERY_HOST && cx.ext() != ImageExt::Gifv.as_str()
    }

    fn try_resolve(&self, cx: &Resolve) -> Step {
        for ext in all::<ImageExt>() {
            let direct = direct_imgur_url(&cx.url, ext.as_str());
            let response = match cx.http.get(&direct).send() {
                Ok(response) if response.status().is_success() => response,
                _ => continue,
            };
            if let Some(media) = persist(cx, response, ext.as_str()) {
                return Step::Resolved(Some(media));
            }
        }
        Step::Pass
    }
}

/// Anything the generic downloader's supported platforms cover, by the
/// possibly-rewritten working URL.
struct PlatformVideo;

impl Strategy for PlatformVideo {
    fn name(&self) -> &'static str {
        "platform-video"
    }

    fn can_handle(&self, cx: &Resolve) -> bool {
        cx.download_videos && DOWNLOADER_PLATFORMS.contains(&cx.domain().as_str())
    }

    fn try_resolve(&self, cx: &Resolve) -> Step {
        match download_video(&cx.url, cx.dest, &cx.prefix()) {
            Ok(filename) => Step::Resolved(Some(Media::File(filename))),
            Err(e) => {
                log::warn!("video download for {} failed: {e}", cx.url);
                Step::Resolved(Some(Media::Link(cx.url.clone())))
            }
        }
    }
}

/// Guess a direct image URL for an imgur page URL, normalising the mobile
/// and direct subdomains back to the canonical host.
fn direct_imgur_url(url: &str, ext: &str) -> String {
    let rest = url.find("//").map_or(url, |idx| &url[idx + 2..]);
    format!("https://i.{rest}.{ext}")
        .replace("i.imgur.com", "imgur.com")
        .replace("m.imgur.com", "imgur.com")
}

/// Write a successful response body under the attachments directory.
fn persist(cx: &Resolve, response: reqwest::blocking::Response, ext: &str) -> Option<Media> {
    let filename = cx.filename(ext);
    let bytes = match response.bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("reading body for {} failed: {e}", cx.url);
            return None;
        }
    };
    match fs::write(cx.dest.join(&filename), &bytes) {
        Ok(()) => Some(Media::File(filename)),
        Err(e) => {
            log::warn!("writing {filename} failed: {e}");
            None
        }
    }
}

/// Run the external downloader with a fixed output template, then locate
/// whatever file it produced.
fn download_video(url: &str, dest: &Path, prefix: &str) -> anyhow::Result<String> {
    let template = dest.join(format!("{prefix}.%(ext)s"));
    let status = Command::new("yt-dlp")
        .arg("--no-check-certificates")
        .arg("--quiet")
        .arg("--no-warnings")
        .arg("--no-progress")
        .arg("--no-playlist")
        .arg("--output")
        .arg(&template)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("unable to run yt-dlp")?;
    if !status.success() {
        anyhow::bail!("yt-dlp exited with {status}");
    }
    find_file_with_prefix(dest, prefix).context("yt-dlp produced no output file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn post(url: &str) -> Post {
        Post {
            id: "abc123".to_string(),
            title: "A title".to_string(),
            author: Some("someone".to_string()),
            subreddit: "pics".to_string(),
            score: 1,
            created: Utc.timestamp_opt(1_619_866_272, 0).unwrap(),
            permalink: "/r/pics/comments/abc123/a_title/".to_string(),
            url: url.to_string(),
            selftext: String::new(),
            comments: Vec::new(),
        }
    }

    #[test]
    fn self_post_resolves_to_absent_without_network() {
        let resolver = MediaResolver::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let post = post("https://www.reddit.com/r/pics/comments/abc123/a_title/");
        assert_eq!(resolver.resolve(&post, dir.path(), false), None);
    }

    #[test]
    fn imgur_gallery_is_unsupported() {
        let resolver = MediaResolver::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let post = post("https://imgur.com/gallery/abcdef");
        assert_eq!(resolver.resolve(&post, dir.path(), false), None);
    }

    #[test]
    fn direct_imgur_url_normalises_subdomains() {
        assert_eq!(
            direct_imgur_url("https://imgur.com/abc", "png"),
            "https://imgur.com/abc.png"
        );
        assert_eq!(
            direct_imgur_url("https://m.imgur.com/abc", "jpg"),
            "https://i.imgur.com/abc.jpg"
        );
    }

    #[test]
    fn embedded_video_url_is_found_in_redirect_pages() {
        let html = r#"<html><video src="https://giant.gfycat.com/SomeClip.mp4"></video>"#;
        assert_eq!(
            EMBEDDED_MP4.find(html).map(|m| m.as_str()),
            Some("https://giant.gfycat.com/SomeClip.mp4")
        );
    }

    #[test]
    fn image_extensions_match_case_insensitively_via_ext_of() {
        assert!(ImageExt::matches(&ext_of("https://x.com/a.PNG")));
        assert!(!ImageExt::matches(&ext_of("https://x.com/a.mp4")));
    }
}
