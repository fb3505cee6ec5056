use std::{
    fs,
    io::{self, Read, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use pdfchat::processing::{SplitterOptions, split};
use pdfchat::processing::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "pdfchat-split",
    about = "Split plain text into overlapping chunks and print them as JSON"
)]
struct Cli {
    /// Text file to split; reads stdin when omitted.
    input: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,
    /// Separator to try, coarsest first. Repeat to build the list; `\n` and `\t` are unescaped.
    #[arg(long = "separator")]
    separators: Vec<String>,
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ChunkRow<'a> {
    index: usize,
    length: usize,
    content: &'a str,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let text = read_input(cli.input.as_ref())?;

    let mut options = SplitterOptions::with_sizes(cli.chunk_size, cli.chunk_overlap);
    if !cli.separators.is_empty() {
        options.separators = cli.separators.iter().map(|sep| unescape(sep)).collect();
    }

    let chunks = split(&text, &options).context("failed to split input")?;
    let rows: Vec<ChunkRow<'_>> = chunks
        .iter()
        .enumerate()
        .map(|(index, content)| ChunkRow {
            index,
            length: content.chars().count(),
            content,
        })
        .collect();

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&rows)?
    } else {
        serde_json::to_string(&rows)?
    };
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}").context("failed to write chunks")?;
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn unescape(separator: &str) -> String {
    separator.replace("\\n", "\n").replace("\\t", "\t")
}
