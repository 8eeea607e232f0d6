use std::collections::HashSet;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Channel, RenderedBlock};

const POST_MARKER: &str = "## Post";
const COMMENT_MARKER: &str = "### Comment";
/// Section headings double as block boundaries so the last post block of a
/// page cannot swallow the comment section that follows it.
const SECTION_HEADINGS: &[&str] = &["## Posts", "## Comments"];

/// The identity line in every shape the renderer emits: a comment's bold
/// metadata line, or a front matter `id:` entry in either quoting style.
static ID_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^(?:\*\*ID:\*\*|id:) ["']?([A-Za-z0-9_]+)["']?[ \t]*$"#).unwrap()
});

/// Everything recovered from the previous run's files. Rebuilt from disk on
/// every run and never persisted itself.
#[derive(Debug, Default)]
pub struct ArchiveState {
    pub known_ids: HashSet<String>,
    pub posts: Vec<RenderedBlock>,
    pub comments: Vec<RenderedBlock>,
}

/// All item IDs named by identity lines in `text`, in order of appearance.
pub fn extract_ids(text: &str) -> Vec<String> {
    ID_LINE
        .captures_iter(text)
        .map(|capture| capture[1].to_string())
        .collect()
}

/// Recover the previous run's state from `dir`: numbered pages ascending,
/// then the unpaginated base file, matching the order they were written.
/// Missing directories, unrelated files, and unparseable content all yield
/// less state, never an error.
pub fn load_previous(dir: &Path, base_file: &str) -> ArchiveState {
    let mut state = ArchiveState::default();
    let Ok(entries) = fs::read_dir(dir) else {
        return state;
    };
    let names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    let stem = base_file.strip_suffix(".md").unwrap_or(base_file);
    let mut pages: Vec<(u64, &String)> = names
        .iter()
        .filter_map(|name| page_index(name, stem).map(|index| (index, name)))
        .collect();
    pages.sort_by_key(|(index, _)| *index);
    let mut read_order: Vec<&String> = pages.into_iter().map(|(_, name)| name).collect();
    if let Some(base) = names.iter().find(|name| name.as_str() == base_file) {
        read_order.push(base);
    }

    // Pages and the base file repeat the same items; keep the first copy of
    // each block so history is never double-counted.
    let mut seen = HashSet::new();
    for name in read_order {
        let path = dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("unable to read {}: {e}", path.display());
                continue;
            }
        };
        for id in extract_ids(&text) {
            state.known_ids.insert(id);
        }
        let (posts, comments) = split_blocks(&text);
        for block in posts {
            push_block(&mut state, &mut seen, block, Channel::Post);
        }
        for block in comments {
            push_block(&mut state, &mut seen, block, Channel::Comment);
        }
    }
    state
}

/// Numeric page index of `name` when it looks like `<stem>.<n>.md`.
fn page_index(name: &str, stem: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(stem)?
        .strip_prefix('.')?
        .strip_suffix(".md")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Split a page's text into post and comment blocks: each block runs from
/// its marker line to the next marker, a section heading, or end of text.
fn split_blocks(text: &str) -> (Vec<String>, Vec<String>) {
    let mut posts = Vec::new();
    let mut comments = Vec::new();
    let mut current: Option<(Channel, Vec<&str>)> = None;
    for line in text.lines() {
        let marker = match line {
            POST_MARKER => Some(Channel::Post),
            COMMENT_MARKER => Some(Channel::Comment),
            _ => None,
        };
        if let Some(channel) = marker {
            flush(&mut posts, &mut comments, current.take());
            current = Some((channel, vec![line]));
        } else if SECTION_HEADINGS.contains(&line) {
            flush(&mut posts, &mut comments, current.take());
        } else if let Some((_, lines)) = &mut current {
            lines.push(line);
        }
    }
    flush(&mut posts, &mut comments, current.take());
    (posts, comments)
}

fn flush(posts: &mut Vec<String>, comments: &mut Vec<String>, current: Option<(Channel, Vec<&str>)>) {
    if let Some((channel, lines)) = current {
        let block = lines.join("\n").trim_end().to_string();
        match channel {
            Channel::Post => posts.push(block),
            Channel::Comment => comments.push(block),
        }
    }
}

fn push_block(
    state: &mut ArchiveState,
    seen: &mut HashSet<String>,
    text: String,
    channel: Channel,
) {
    let id = extract_ids(&text).into_iter().next().unwrap_or_default();
    let block = RenderedBlock { id, channel, text };
    if !block.id.is_empty() && !seen.insert(block.id.clone()) {
        return;
    }
    match block.channel {
        Channel::Post => state.posts.push(block),
        Channel::Comment => state.comments.push(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "\
# Saved Posts and Comments

## Posts

## Post

---
title: \"One\"
id: abc123
tags:
- reddit
- post
---

Body one

## Post

---
title: \"Two\"
id: 12345
---

## Comments

### Comment

**Author:** /u/other

**Body:**

hello

**ID:** def456

**Date:** 10:11 - 01 May, 2021
";

    #[test]
    fn ids_come_from_both_channels_and_both_quote_styles() {
        assert_eq!(extract_ids(PAGE), vec!["abc123", "12345", "def456"]);
        assert_eq!(extract_ids("id: 'q99'\n"), vec!["q99"]);
    }

    #[test]
    fn blocks_split_at_markers_and_section_headings() {
        let (posts, comments) = split_blocks(PAGE);
        assert_eq!(posts.len(), 2);
        assert_eq!(comments.len(), 1);
        assert!(posts[0].starts_with("## Post"));
        assert!(posts[0].ends_with("Body one"));
        // The second post stops at the comment section heading.
        assert!(!posts[1].contains("### Comment"));
        assert!(comments[0].ends_with("**Date:** 10:11 - 01 May, 2021"));
    }

    #[test]
    fn pages_read_in_order_with_base_file_last_and_blocks_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let page0 = "## Posts\n\n## Post\n\nid: aaa\n\n## Comments\n";
        let page1 = "## Posts\n\n## Post\n\nid: bbb\n\n## Comments\n";
        // The full file repeats both pages' items.
        let full = "## Posts\n\n## Post\n\nid: aaa\n\n## Post\n\nid: bbb\n\n## Comments\n";
        std::fs::write(dir.path().join("saved.0.md"), page0).unwrap();
        std::fs::write(dir.path().join("saved.1.md"), page1).unwrap();
        std::fs::write(dir.path().join("saved.md"), full).unwrap();
        std::fs::write(dir.path().join("notes.md"), "unrelated ## Post text").unwrap();

        let state = load_previous(dir.path(), "saved.md");
        assert_eq!(state.known_ids.len(), 2);
        assert!(state.known_ids.contains("aaa") && state.known_ids.contains("bbb"));
        let order: Vec<&str> = state.posts.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(order, vec!["aaa", "bbb"]);
    }

    #[test]
    fn missing_directory_and_unmatched_files_yield_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_previous(&dir.path().join("nope"), "saved.md");
        assert!(state.known_ids.is_empty());

        std::fs::write(dir.path().join("saved.x.md"), "## Post\n\nid: zzz\n").unwrap();
        std::fs::write(dir.path().join("upvoted.md"), "## Post\n\nid: yyy\n").unwrap();
        let state = load_previous(dir.path(), "saved.md");
        assert!(state.known_ids.is_empty());
        assert!(state.posts.is_empty());
    }

    #[test]
    fn malformed_content_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("saved.md"), "just some prose\n\nno markers").unwrap();
        let state = load_previous(dir.path(), "saved.md");
        assert!(state.known_ids.is_empty());
        assert!(state.posts.is_empty() && state.comments.is_empty());
    }
}
