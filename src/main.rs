mod buffer;
mod config;
mod error;
mod fetch;
mod pipeline;
mod progress;
mod session;
mod storage;
mod utils;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::fetch::HttpFetcher;
use crate::pipeline::Pipeline;
use crate::storage::DropboxStorage;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream remote URLs straight into Dropbox, overlapping download and upload", long_about = None)]
struct Args {
    /// URLs to transfer, processed one at a time in order
    urls: Vec<String>,

    /// Path to a file containing URLs (one per line); used when no URLs
    /// are given on the command line
    #[arg(short = 't', long = "tasks-file")]
    tasks_file: Option<PathBuf>,

    /// Upload chunk size in MiB
    #[arg(short = 'c', long = "chunk-mib", default_value_t = 32)]
    chunk_mib: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Credentials problems are fatal before any job is attempted.
    let config = config::load()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let urls = collect_urls(&args).await?;
        if urls.is_empty() {
            bail!("no URLs to transfer (pass URLs or --tasks-file)");
        }

        let fetcher = Arc::new(HttpFetcher::new());
        let storage = Arc::new(DropboxStorage::new(config.access_token));
        let pipeline =
            Pipeline::new(fetcher, storage).chunk_size(args.chunk_mib.max(1) * 1024 * 1024);

        let failures = pipeline.run(urls).await;
        if failures > 0 {
            bail!("{failures} transfer(s) failed");
        }
        Ok(())
    })
}

async fn collect_urls(args: &Args) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args.urls.clone());
    }
    let Some(tasks_file) = &args.tasks_file else {
        return Ok(Vec::new());
    };

    let file = tokio::fs::File::open(tasks_file)
        .await
        .with_context(|| format!("failed to open tasks file: {}", tasks_file.display()))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut urls = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let url = line.trim();
        if url.is_empty() || url.starts_with('#') {
            continue;
        }
        urls.push(url.to_string());
    }
    Ok(urls)
}
