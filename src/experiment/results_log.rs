use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// One line of the results file.
#[derive(Debug, Serialize)]
pub struct ResultEntry<'a, T: Serialize> {
    pub experiment: &'a str,
    pub timestamp_ms: u64,
    pub report: &'a T,
}

/// Append-only JSON-lines file collecting experiment reports.
#[derive(Debug, Clone)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ResultsLog { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `report` as a single JSON line, creating the file (and its
    /// directory) on first use.
    pub fn append<T: Serialize>(&self, experiment: &str, report: &T) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let entry = ResultEntry {
            experiment,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            report,
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        serde_json::to_writer(&mut file, &entry)?;
        file.write_all(b"\n")?;
        debug!(path = %self.path.display(), experiment, "appended results");
        Ok(())
    }

    /// Every entry written so far, oldest first.
    pub fn entries(&self) -> Result<Vec<serde_json::Value>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                entries.push(serde_json::from_str(&line)?);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Dummy {
        score: f64,
    }

    #[test]
    fn appends_one_line_per_report() {
        let path = std::env::temp_dir()
            .join(format!("adbn_results_{}", std::process::id()))
            .join("results.jsonl");
        let _ = fs::remove_file(&path);

        let log = ResultsLog::new(&path);
        assert!(log.entries().unwrap().is_empty());
        log.append("first", &Dummy { score: 0.5 }).unwrap();
        log.append("second", &Dummy { score: 0.25 }).unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["experiment"], "second");
        assert_eq!(entries[0]["report"]["score"], 0.5);
        let _ = fs::remove_file(&path);
    }
}
