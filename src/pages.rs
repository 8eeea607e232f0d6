use std::fs;
use std::path::Path;

use anyhow::Context;
use itertools::Itertools;

use crate::model::RenderedBlock;

/// Merge the run's new blocks with the parsed history and rewrite the page
/// chain. New items sort first in each channel; the channels are never
/// interleaved. The unpaginated base file is always rewritten and is the
/// canonical input for the next run's parser.
#[allow(clippy::too_many_arguments)]
pub fn write_archive(
    new_posts: Vec<RenderedBlock>,
    new_comments: Vec<RenderedBlock>,
    prior_posts: Vec<RenderedBlock>,
    prior_comments: Vec<RenderedBlock>,
    dir: &Path,
    base_file: &str,
    page_size: usize,
    username: &str,
) -> anyhow::Result<()> {
    let posts: Vec<RenderedBlock> = new_posts.into_iter().chain(prior_posts).collect();
    let comments: Vec<RenderedBlock> = new_comments.into_iter().chain(prior_comments).collect();

    if page_size > 0 {
        let page_count = posts.len().max(comments.len()) / page_size + 1;
        for page in 0..page_count {
            save_page(
                slice(&posts, page, page_size),
                slice(&comments, page, page_size),
                dir,
                base_file,
                Some(page),
                page + 1 < page_count,
                username,
            )?;
        }
    }
    save_page(&posts, &comments, dir, base_file, None, false, username)
}

/// Write one page. `page` of `None` means the unpaginated full file, which
/// never carries navigation links.
#[allow(clippy::too_many_arguments)]
pub fn save_page(
    posts: &[RenderedBlock],
    comments: &[RenderedBlock],
    dir: &Path,
    base_file: &str,
    page: Option<usize>,
    has_next: bool,
    username: &str,
) -> anyhow::Result<()> {
    let title = if base_file.contains("saved") {
        "Saved".to_string()
    } else if base_file.contains("upvoted") {
        "Upvoted".to_string()
    } else {
        format!("{username}'s")
    };

    let mut parts: Vec<String> = vec![format!("# {title} Posts and Comments")];
    if let Some(page) = page {
        let mut nav = Vec::new();
        if page > 0 {
            nav.push(format!("[Previous]({})", page_name(base_file, page - 1)));
        }
        if has_next {
            nav.push(format!("[Next]({})", page_name(base_file, page + 1)));
        }
        if !nav.is_empty() {
            parts.push(nav.join(" | "));
        }
    }
    parts.push("## Posts".to_string());
    parts.extend(posts.iter().map(|block| block.text.clone()));
    parts.push("## Comments".to_string());
    parts.extend(comments.iter().map(|block| block.text.clone()));

    let file_name = match page {
        Some(page) => page_name(base_file, page),
        None => base_file.to_string(),
    };
    let body = parts.iter().join("\n\n") + "\n";
    fs::write(dir.join(&file_name), body).with_context(|| format!("unable to write {file_name}"))
}

fn slice(blocks: &[RenderedBlock], page: usize, size: usize) -> &[RenderedBlock] {
    let start = (page * size).min(blocks.len());
    let end = ((page + 1) * size).min(blocks.len());
    &blocks[start..end]
}

fn page_name(base_file: &str, page: usize) -> String {
    base_file.replace(".md", &format!(".{page}.md"))
}
