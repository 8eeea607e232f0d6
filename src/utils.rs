use std::path::Path;
use url::Url;

pub const ATTACHMENTS_DIR: &str = "Attachments";
pub const POSTS_DIR: &str = "Posts";

/// Last non-empty segment of a permalink, used as a readable file name stem.
pub fn slug_from_permalink(permalink: &str) -> String {
    permalink
        .split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or("post")
        .to_string()
}

/// Lower-cased extension of a URL or file name, with any query string
/// stripped first. Empty when there is none.
pub fn ext_of(url: &str) -> String {
    let stripped = url.split('?').next().unwrap_or(url);
    match stripped.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// The registrable part of a URL's host: the last two dot-separated labels,
/// so "v.redd.it" and "redd.it" both come back as "redd.it".
pub fn domain_of(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

/// Find a file in `dir` whose name starts with `prefix`. Used to locate the
/// output of external downloaders that pick their own extension.
pub fn find_file_with_prefix(dir: &Path, prefix: &str) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .find(|name| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_last_non_empty_segment() {
        assert_eq!(
            slug_from_permalink("/r/pics/comments/abc123/some_title/"),
            "some_title"
        );
        assert_eq!(slug_from_permalink("/"), "post");
    }

    #[test]
    fn ext_ignores_query_strings() {
        assert_eq!(ext_of("https://i.imgur.com/a.JPG?x=1"), "jpg");
        assert_eq!(ext_of("https://example.com/page"), "");
        assert_eq!(ext_of("https://example.com/dir.d/page"), "");
    }

    #[test]
    fn domain_keeps_last_two_labels() {
        assert_eq!(domain_of("https://v.redd.it/xyz"), "redd.it");
        assert_eq!(domain_of("https://imgur.com/abc"), "imgur.com");
        assert_eq!(domain_of("https://www.youtube.com/watch?v=1"), "youtube.com");
        assert_eq!(domain_of("not a url"), "");
    }

    #[test]
    fn prefix_scan_finds_downloader_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("some_title_abc123.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("other.txt"), b"x").unwrap();
        assert_eq!(
            find_file_with_prefix(dir.path(), "some_title_abc123"),
            Some("some_title_abc123.mp4".to_string())
        );
        assert_eq!(find_file_with_prefix(dir.path(), "missing"), None);
    }
}
