use anyhow::{Context, Result};
use clap::Parser;
use jobs_annotator::{concepts_or_empty, WikifierClient, WikifierConfig};
use jobs_core::Posting;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "annotator")]
#[command(about = "Attach concepts to job postings (JSONL in, JSONL out) using the annotation service")]
struct Cli {
    /// Input JSONL file, one posting per line
    #[arg(long)]
    input: String,
    /// Output JSONL file
    #[arg(long, default_value = "./data/annotated.jsonl")]
    output: String,
    /// Concurrent annotation requests
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Language of the posting texts
    #[arg(long, default_value = "en")]
    lang: String,
    /// Annotate postings that already carry concepts
    #[arg(long)]
    reannotate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = std::path::Path::new(&args.output).parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let client = Arc::new(WikifierClient::new(WikifierConfig::from_env())?);

    let mut queue: VecDeque<Posting> = VecDeque::new();
    for (n, line) in BufReader::new(File::open(&args.input)?).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let posting: Posting = serde_json::from_str(&line).with_context(|| format!("{}:{}", args.input, n + 1))?;
        queue.push_back(posting);
    }
    tracing::info!(postings = queue.len(), concurrency = args.concurrency, output = %args.output, "annotating postings");

    let mut out = BufWriter::new(File::create(&args.output)?);
    let mut inflight: VecDeque<tokio::task::JoinHandle<(Posting, usize)>> = VecDeque::new();
    let (mut written, mut concepts_total) = (0usize, 0usize);

    while !queue.is_empty() || !inflight.is_empty() {
        // Fill workers
        while inflight.len() < args.concurrency.max(1) {
            let Some(mut posting) = queue.pop_front() else { break };
            let client_c = client.clone();
            let lang = args.lang.clone();
            let skip = !args.reannotate && !posting.concepts.is_empty();
            inflight.push_back(tokio::spawn(async move {
                if skip { return (posting, 0); }
                let text = format!("{} {}", posting.title, posting.description);
                let concepts = concepts_or_empty(client_c.as_ref(), &text, &lang).await;
                let found = concepts.len();
                posting.attach_concepts(concepts);
                (posting, found)
            }));
        }

        // Oldest first keeps output in input order
        let Some(handle) = inflight.pop_front() else { break };
        let (posting, found) = handle.await?;
        serde_json::to_writer(&mut out, &posting)?;
        out.write_all(b"\n")?;
        written += 1;
        concepts_total += found;
        if written % 100 == 0 {
            tracing::info!(written, concepts = concepts_total, "progress");
        }
    }
    out.flush()?;

    tracing::info!(written, concepts = concepts_total, output = %args.output, "annotation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotated_postings_are_skipped_unless_asked() {
        let args = Cli::try_parse_from(["annotator", "--input", "in.jsonl"]).unwrap();
        assert!(!args.reannotate);
        assert_eq!(args.output, "./data/annotated.jsonl");
        let args = Cli::try_parse_from(["annotator", "--input", "in.jsonl", "--reannotate"]).unwrap();
        assert!(args.reannotate);
    }
}
