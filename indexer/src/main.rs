use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jobs_core::persist::{save_meta, DataPaths, MetaFile};
use jobs_core::posting::parse_posting_date;
use jobs_core::{Location, Posting, PostingStore, SledStore, StoreMode};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and extend the job postings store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a clean store from scraped CSV or JSON/JSONL files
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Data directory (store, meta and pending files)
        #[arg(long, default_value = "./data")]
        data: String,
    },
    /// Append postings to an existing store
    Append {
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "./data")]
        data: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, data } => ingest(&input, &data, true),
        Commands::Append { input, data } => ingest(&input, &data, false),
    }
}

fn ingest(input: &str, data: &str, clean: bool) -> Result<()> {
    let paths = DataPaths::new(data);
    if clean && paths.database().exists() {
        tracing::info!(path = %paths.database().display(), "removing existing store");
        fs::remove_dir_all(paths.database())?;
    }
    fs::create_dir_all(&paths.root)?;

    let files = input_files(Path::new(input))?;
    let mut postings: Vec<Posting> = Vec::new();
    for file in &files {
        let before = postings.len();
        match file.extension().and_then(|s| s.to_str()) {
            Some("csv") => read_csv(file, &mut postings)?,
            Some("jsonl") => read_jsonl(file, &mut postings)?,
            _ => read_json(file, &mut postings)?,
        }
        tracing::info!(file = %file.display(), postings = postings.len() - before, "read batch file");
    }

    let mut store = SledStore::open(paths.database(), StoreMode::Write)?;
    store.append(&postings)?;
    store.reopen(StoreMode::ReadOnly)?;

    let meta = MetaFile {
        num_postings: store.len(),
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: 1,
    };
    save_meta(&paths, &meta)?;

    tracing::info!(appended = postings.len(), total = meta.num_postings, data, "ingestion complete");
    Ok(())
}

fn input_files(input_path: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "csv" | "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        bail!("input {} does not exist", input_path.display());
    }
    Ok(files)
}

fn read_jsonl(file: &Path, postings: &mut Vec<Posting>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        postings.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

fn read_json(file: &Path, postings: &mut Vec<Posting>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let batch: Vec<Posting> = serde_json::from_reader(reader)?;
    postings.extend(batch);
    Ok(())
}

/// Scraped CSV: a header line, then one posting per line with commas inside
/// the url escaped as `;;;`.
fn read_csv(file: &Path, postings: &mut Vec<Posting>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (n, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() { continue; }
        match parse_csv_line(&line) {
            Some(p) => postings.push(p),
            None => tracing::warn!(file = %file.display(), line = n + 1, "skipping malformed posting"),
        }
    }
    Ok(())
}

fn parse_csv_line(line: &str) -> Option<Posting> {
    let f: Vec<&str> = line.split(',').collect();
    if f.len() < 15 { return None; }
    let date = parse_posting_date(f[3])?;
    let coord = match (f[9].trim().parse::<f64>(), f[10].trim().parse::<f64>()) {
        (Ok(lat), Ok(long)) => Some([lat, long]),
        _ => None,
    };
    let skills = f[14]
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|uri| uri.rsplit('/').next())
        .map(str::to_string)
        .collect();
    Some(Posting {
        id: 0,
        uri: non_empty(f[0]),
        url: non_empty(&f[1].replace(";;;", ",")),
        date,
        title: f[6].to_string(),
        description: f[7].to_string(),
        location: Location {
            name: f[11].to_string(),
            coord,
            country: country_name(f[13]).to_string(),
            uri: non_empty(f[8]),
            country_uri: non_empty(f[12]),
        },
        organization: f[5].to_string(),
        source: non_empty(f[4]),
        skills,
        concepts: Vec::new(),
    })
}

/// Some scrapes carry a geonames URI instead of the country name.
fn country_name(raw: &str) -> &str {
    match raw {
        "http://sws.geonames.org/2921044" => "Germany",
        "http://sws.geonames.org/2658434" => "Switzerland",
        "http://sws.geonames.org/3175395" => "Italy",
        "http://sws.geonames.org/2635167" => "United Kingdom",
        other => other,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "http://job/1,http://jobs.example/?a=1;;;b=2,Berlin DE,2016-05-23T10:15:00+0200,indeed,ACME,Frontend developer,Build web apps,http://sws.geonames.org/2950159,52.52,13.41,Berlin,http://sws.geonames.org/2921044,http://sws.geonames.org/2921044,http://skills/css|http://skills/html";

    #[test]
    fn parses_scraped_line() {
        let p = parse_csv_line(LINE).unwrap();
        assert_eq!(p.url.as_deref(), Some("http://jobs.example/?a=1,b=2"));
        assert_eq!(p.day_string(), "2016-5-23");
        assert_eq!(p.location.country, "Germany");
        assert_eq!(p.location.coord, Some([52.52, 13.41]));
        assert_eq!(p.skills, vec!["css", "html"]);
        assert_eq!(p.organization, "ACME");
    }

    #[test]
    fn empty_skill_column_gives_no_skills() {
        let line = LINE.replace("http://skills/css|http://skills/html", "");
        assert!(parse_csv_line(&line).unwrap().skills.is_empty());
    }

    #[test]
    fn short_or_undated_lines_are_rejected() {
        assert!(parse_csv_line("a,b,c").is_none());
        assert!(parse_csv_line(&LINE.replace("2016-05-23T10:15:00+0200", "soon")).is_none());
    }
}
