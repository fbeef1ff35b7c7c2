//! JSON helpers shared by every serialisable configuration and report.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serializes `value` to a pretty-printed JSON file.
pub fn save_json<T: Serialize>(value: &T, path: &str) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Deserializes a value from a JSON file previously written by `save_json`.
pub fn load_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
