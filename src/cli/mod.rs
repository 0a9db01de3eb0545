pub mod commands;

use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;

use crate::app::Result;
use crate::config::Protocol;

#[derive(Parser, Debug)]
#[command(name = "tweetfeed")]
#[command(about = "Dump and watch public Twitter timelines", long_about = None)]
pub struct Cli {
    /// File with one handle per line ("//" starts a comment). Reads stdin when omitted
    pub users: Option<PathBuf>,

    /// Log progress at info level
    #[arg(short, long)]
    pub verbose: bool,

    /// Maximum number of posts to retrieve per user
    #[arg(short = 'c', long, default_value_t = 10, value_parser = positive_int)]
    pub max_count: u64,

    /// Skip posts older than this UNIX timestamp (pinned posts excepted)
    #[arg(short = 'e', long, value_parser = positive_int)]
    pub max_epoch: Option<u64>,

    /// Keep polling for new posts after the initial dump
    #[arg(short, long)]
    pub watch: bool,

    /// Watch and send a notification for every user with new posts
    #[arg(short, long)]
    pub notify: bool,

    /// Upstream protocol (overrides the config file)
    #[arg(long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Poll interval, e.g. "60s", "5m" (overrides the config file)
    #[arg(long)]
    pub interval: Option<String>,

    /// Request timeout in seconds (overrides the config file)
    #[arg(long, value_parser = positive_int)]
    pub timeout: Option<u64>,

    /// Print bodies as markdown instead of plain text
    #[arg(long)]
    pub raw: bool,
}

fn positive_int(value: &str) -> std::result::Result<u64, String> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{} is not a valid positive integer", value)),
    }
}

/// Handles listed in a users file: comments after `//` and blank lines are skipped.
pub fn read_handles(reader: impl BufRead) -> Result<Vec<String>> {
    let mut handles = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = match line.find("//") {
            Some(at) => &line[..at],
            None => line.as_str(),
        };
        let handle = line.trim();
        if !handle.is_empty() {
            handles.push(handle.to_string());
        }
    }
    Ok(handles)
}
