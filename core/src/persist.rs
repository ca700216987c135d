use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Posting;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_postings: usize,
    pub created_at: String,
    pub version: u32,
}

/// On-disk layout of a data directory.
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn database(&self) -> PathBuf { self.root.join("database") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn pending(&self) -> PathBuf { self.root.join("pending.json") }
}

pub fn save_meta(paths: &DataPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &DataPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Postings received through the API and not yet applied to the store.
#[derive(Debug, Default)]
pub struct PendingPostings {
    path: Option<PathBuf>,
    postings: Vec<Posting>,
}

impl PendingPostings {
    /// Pending list that is never written to disk.
    pub fn in_memory() -> Self { Self::default() }

    /// Backed by `path`; loads its contents when the file exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let postings = if path.exists() { read_postings(&path)? } else { Vec::new() };
        if !postings.is_empty() {
            tracing::info!(pending = postings.len(), path = %path.display(), "loaded pending postings");
        }
        Ok(Self { path: Some(path), postings })
    }

    /// Queues postings; returns how many are now pending.
    pub fn store(&mut self, postings: Vec<Posting>) -> usize {
        self.postings.extend(postings);
        self.postings.len()
    }

    pub fn postings(&self) -> &[Posting] { &self.postings }

    pub fn len(&self) -> usize { self.postings.len() }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }

    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

    pub fn clear(&mut self) { self.postings.clear(); }

    /// Writes the pending list to its backing file, if any.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            create_dir_all(dir)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut out, &self.postings)?;
        out.flush()?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.postings = read_postings(path)?;
        Ok(())
    }
}

fn read_postings(path: &Path) -> Result<Vec<Posting>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Location;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn posting() -> Posting {
        Posting {
            id: 0,
            uri: None,
            url: Some("https://jobs.example/1".into()),
            date: datetime!(2016-06-01 9:30 UTC),
            title: "Frontend developer".into(),
            description: String::new(),
            location: Location { name: "Bath".into(), coord: None, country: "United Kingdom".into(), uri: None, country_uri: None },
            organization: "ACME".into(),
            source: None,
            skills: vec!["css".into()],
            concepts: vec![],
        }
    }

    #[test]
    fn pending_file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pending.json");
        let mut pending = PendingPostings::open(&path).unwrap();
        assert!(pending.is_empty());
        assert_eq!(pending.store(vec![posting(), posting()]), 2);
        pending.save().unwrap();

        let mut reopened = PendingPostings::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        reopened.clear();
        reopened.save().unwrap();
        assert!(PendingPostings::open(&path).unwrap().is_empty());
    }

    #[test]
    fn meta_round_trips() {
        let dir = tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        save_meta(&paths, &MetaFile { num_postings: 3, created_at: "2016-06-01T00:00:00Z".into(), version: 1 }).unwrap();
        assert_eq!(load_meta(&paths).unwrap().num_postings, 3);
    }
}
