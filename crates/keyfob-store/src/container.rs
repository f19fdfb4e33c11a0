//! Text container files
//!
//! One durable object per file, in a flipper-format-style layout: a
//! filetype line, a version line, and a single hex data field.
//!
//! ```text
//! Filetype: Keyfob Record
//! Version: 1
//! Data: 2A00D3A1...
//! ```
//!
//! Writes go to a temp file first and land with an atomic rename, so a
//! torn write never leaves a half-written container behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const FILETYPE_PREFIX: &str = "Keyfob ";
const VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container does not exist")]
    Missing,

    #[error("container already exists")]
    Exists,

    #[error("malformed container: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A path plus the kind recorded on its filetype line.
#[derive(Debug, Clone)]
pub struct Container {
    path: PathBuf,
    kind: &'static str,
}

impl Container {
    pub fn new(path: impl Into<PathBuf>, kind: &'static str) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the container with an initial field value. Refuses to
    /// clobber an existing file.
    pub fn create(&self, data: &[u8]) -> std::result::Result<(), ContainerError> {
        if self.exists() {
            return Err(ContainerError::Exists);
        }
        self.write_atomic(data)
    }

    /// Overwrite the field of an existing container; never a first write.
    pub fn write(&self, data: &[u8]) -> std::result::Result<(), ContainerError> {
        if !self.exists() {
            return Err(ContainerError::Missing);
        }
        self.write_atomic(data)
    }

    /// Read the field back, verifying the header lines.
    pub fn read(&self) -> std::result::Result<Vec<u8>, ContainerError> {
        if !self.exists() {
            return Err(ContainerError::Missing);
        }
        let text = fs::read_to_string(&self.path)?;

        let mut filetype = None;
        let mut version = None;
        let mut data = None;
        for line in text.lines() {
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            match key {
                "Filetype" => filetype = Some(value),
                "Version" => version = Some(value),
                "Data" => data = Some(value),
                _ => {}
            }
        }

        let expected = format!("{FILETYPE_PREFIX}{}", self.kind);
        match filetype {
            Some(found) if found == expected => {}
            Some(found) => {
                return Err(ContainerError::Malformed(format!(
                    "filetype is '{found}', expected '{expected}'"
                )))
            }
            None => return Err(ContainerError::Malformed("missing filetype line".into())),
        }

        match version.map(str::parse::<u32>) {
            Some(Ok(VERSION)) => {}
            _ => return Err(ContainerError::Malformed("bad version line".into())),
        }

        let data = data.ok_or_else(|| ContainerError::Malformed("missing data field".into()))?;
        hex::decode(data).map_err(|e| ContainerError::Malformed(e.to_string()))
    }

    fn write_atomic(&self, data: &[u8]) -> std::result::Result<(), ContainerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "Filetype: {FILETYPE_PREFIX}{}", self.kind)?;
            writeln!(writer, "Version: {VERSION}")?;
            writeln!(writer, "Data: {}", hex::encode_upper(data))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn container(dir: &TempDir) -> Container {
        Container::new(dir.path().join("object.keyfob"), "Test")
    }

    #[test]
    fn create_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let c = container(&dir);

        c.create(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(c.read().unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn create_refuses_to_clobber() {
        let dir = TempDir::new().unwrap();
        let c = container(&dir);

        c.create(&[1]).unwrap();
        assert!(matches!(c.create(&[2]), Err(ContainerError::Exists)));
        assert_eq!(c.read().unwrap(), vec![1]);
    }

    #[test]
    fn write_requires_prior_create() {
        let dir = TempDir::new().unwrap();
        let c = container(&dir);

        assert!(matches!(c.write(&[1]), Err(ContainerError::Missing)));
        c.create(&[1]).unwrap();
        c.write(&[2, 3]).unwrap();
        assert_eq!(c.read().unwrap(), vec![2, 3]);
    }

    #[test]
    fn read_of_missing_container() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(container(&dir).read(), Err(ContainerError::Missing)));
    }

    #[test]
    fn wrong_filetype_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("object.keyfob");
        Container::new(&path, "Other").create(&[9]).unwrap();

        let c = Container::new(&path, "Test");
        assert!(matches!(c.read(), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn garbage_content_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("object.keyfob");
        fs::write(&path, "not a container at all\n").unwrap();

        let c = Container::new(&path, "Test");
        assert!(matches!(c.read(), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn bad_hex_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("object.keyfob");
        fs::write(&path, "Filetype: Keyfob Test\nVersion: 1\nData: XYZ\n").unwrap();

        let c = Container::new(&path, "Test");
        assert!(matches!(c.read(), Err(ContainerError::Malformed(_))));
    }
}
