mod client;
mod config;
mod history;
mod media;
mod model;
mod pages;
mod render;
mod utils;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use env_logger::Env;
use indicatif::ProgressBar;
use itertools::{Either, Itertools};

use crate::client::RedditClient;
use crate::config::Config;
use crate::media::MediaResolver;
use crate::model::{Comment, Item, Post, RenderedBlock};
use crate::utils::{ATTACHMENTS_DIR, POSTS_DIR};

/// Which listing to archive.
#[derive(Debug, Clone)]
enum Mode {
    Saved,
    Upvoted,
    User(String),
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    match value {
        "saved" => Ok(Mode::Saved),
        "upvoted" => Ok(Mode::Upvoted),
        other => match other.strip_prefix("user:") {
            Some(name) if !name.is_empty() => Ok(Mode::User(name.to_string())),
            _ => Err(format!(
                "invalid mode: {other} (expected saved, upvoted, or user:<name>)"
            )),
        },
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to archive: saved, upvoted, or user:<name>
    #[arg(value_parser = parse_mode)]
    mode: Mode,
    /// Directory to write the archive into
    location: PathBuf,
    /// Posts and comments per numbered page; 0 disables pagination
    #[arg(long, default_value_t = 0)]
    page_size: usize,
    /// Download videos instead of just linking to them
    #[arg(long)]
    download_videos: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if args.location.exists() && !args.location.is_dir() {
        bail!("{} exists but is not a directory", args.location.display());
    }
    let attachments = args.location.join(ATTACHMENTS_DIR);
    let posts_dir = args.location.join(POSTS_DIR);
    fs::create_dir_all(&attachments).context("unable to create the attachments directory")?;
    fs::create_dir_all(&posts_dir).context("unable to create the posts directory")?;

    let config = Config::from_env()?;
    let client = RedditClient::connect(&config)?;
    let resolver = MediaResolver::new()?;

    let (base_file, username) = base_file_name(&args.mode, &config);

    log::info!("Reading previously archived items...");
    let state = history::load_previous(&args.location, &base_file);
    log::info!(
        "{} previous posts, {} previous comments",
        state.posts.len(),
        state.comments.len()
    );

    let (posts, comments) = fetch_items(&client, &args.mode)?;
    let posts: Vec<Post> = posts
        .into_iter()
        .filter(|post| !state.known_ids.contains(&post.id))
        .collect();
    let comments: Vec<Comment> = comments
        .into_iter()
        .filter(|comment| !state.known_ids.contains(&comment.id))
        .collect();

    let new_post_blocks = archive_posts(
        posts,
        &client,
        &resolver,
        &posts_dir,
        &attachments,
        args.download_videos,
    );
    let new_comment_blocks = archive_comments(comments);

    log::info!("Writing archive pages...");
    pages::write_archive(
        new_post_blocks,
        new_comment_blocks,
        state.posts,
        state.comments,
        &args.location,
        &base_file,
        args.page_size,
        &username,
    )?;
    Ok(())
}

/// The base file name drives both the page family on disk and the page
/// title; the username only shows up for `user:<name>` archives.
fn base_file_name(mode: &Mode, config: &Config) -> (String, String) {
    match mode {
        Mode::Saved => ("saved.md".to_string(), config.username.clone()),
        Mode::Upvoted => ("upvoted.md".to_string(), config.username.clone()),
        Mode::User(name) => (format!("{name}.md"), name.clone()),
    }
}

fn fetch_items(client: &RedditClient, mode: &Mode) -> anyhow::Result<(Vec<Post>, Vec<Comment>)> {
    log::info!("Fetching listings...");
    Ok(match mode {
        Mode::Saved => client
            .saved_items()?
            .into_iter()
            .partition_map(|item| match item {
                Item::Post(post) => Either::Left(post),
                Item::Comment(comment) => Either::Right(comment),
            }),
        Mode::Upvoted => (client.upvoted_posts()?, Vec::new()),
        Mode::User(name) => (client.user_posts(name)?, client.user_comments(name)?),
    })
}

fn archive_posts(
    posts: Vec<Post>,
    client: &RedditClient,
    resolver: &MediaResolver,
    posts_dir: &Path,
    attachments: &Path,
    download_videos: bool,
) -> Vec<RenderedBlock> {
    if posts.is_empty() {
        log::info!("No new posts");
        return Vec::new();
    }
    log::info!("Archiving {} new posts...", posts.len());
    let bar = ProgressBar::new(posts.len() as u64);
    let mut blocks = Vec::with_capacity(posts.len());
    for mut post in posts {
        post.comments = client.top_level_comments(&post.id).unwrap_or_else(|e| {
            log::warn!("unable to fetch comments for {}: {e}", post.id);
            Vec::new()
        });
        let mut block = render::render_post(&post);
        if let Some(media) = resolver.resolve(&post, attachments, download_videos) {
            block.text = render::append_media_preview(block.text, &media);
        }
        let page = render::render_post_page(&post, &block.text);
        if let Err(e) = fs::write(posts_dir.join(format!("{}.md", post.id)), page) {
            log::warn!("unable to write post page for {}: {e}", post.id);
        }
        blocks.push(block);
        bar.inc(1);
    }
    bar.finish_and_clear();
    blocks
}

fn archive_comments(comments: Vec<Comment>) -> Vec<RenderedBlock> {
    if comments.is_empty() {
        log::info!("No new comments");
        return Vec::new();
    }
    log::info!("Archiving {} new comments...", comments.len());
    comments.iter().map(render::render_comment).collect()
}
