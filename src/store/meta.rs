//! Per-version metadata sidecar (`.vNNNN`): keywords, key/value pairs,
//! and free-form notes. Thumbnails live in the sibling `thumbnails/`
//! directory and are handled by the thumbnails module.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

const KEYWORDS_FILE: &str = "keywords";
const KEYVALUES_FILE: &str = "keyvalues";
const NOTES_FILE: &str = "notes";

/// Handle on one `.vNNNN` sidecar directory.
#[derive(Debug, Clone)]
pub struct Sidecar {
    dir: PathBuf,
}

impl Sidecar {
    pub fn new(asset_d: &Path, version_n: &str) -> Sidecar {
        Sidecar {
            dir: asset_d.join(format!(".{}", version_n)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.dir.join("thumbnails")
    }

    /// Every operation fails fast when the sidecar directory is absent:
    /// it means the version was never properly reserved.
    fn ensure_exists(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(StoreError::MetadataMissing(self.dir.clone()));
        }
        Ok(())
    }

    /// Add keywords, uppercased and deduplicated case-insensitively.
    /// The file is rewritten sorted, one keyword per line.
    pub fn add_keywords(&self, keywords: &[String]) -> Result<()> {
        self.ensure_exists()?;
        let mut all: BTreeSet<String> = self.list_keywords()?.into_iter().collect();
        for keyword in keywords {
            all.insert(keyword.to_uppercase());
        }
        self.write_keywords(&all)
    }

    /// Remove keywords (case-insensitive).
    pub fn remove_keywords(&self, keywords: &[String]) -> Result<()> {
        self.ensure_exists()?;
        let doomed: BTreeSet<String> = keywords.iter().map(|k| k.to_uppercase()).collect();
        let kept: BTreeSet<String> = self
            .list_keywords()?
            .into_iter()
            .filter(|k| !doomed.contains(k))
            .collect();
        self.write_keywords(&kept)
    }

    /// All keywords, sorted. A version without a keywords file has none.
    pub fn list_keywords(&self) -> Result<Vec<String>> {
        self.ensure_exists()?;
        let path = self.dir.join(KEYWORDS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn write_keywords(&self, keywords: &BTreeSet<String>) -> Result<()> {
        let mut text = String::new();
        for keyword in keywords {
            text.push_str(keyword);
            text.push('\n');
        }
        fs::write(self.dir.join(KEYWORDS_FILE), text)?;
        Ok(())
    }

    /// Merge key/value pairs into the keyvalues file. Keys are
    /// uppercased; a repeated key takes the new value.
    pub fn add_keyvalues(&self, pairs: &BTreeMap<String, String>) -> Result<()> {
        self.ensure_exists()?;
        let mut all = self.keyvalues()?;
        for (key, value) in pairs {
            all.insert(key.to_uppercase(), value.clone());
        }
        self.write_keyvalues(&all)
    }

    pub fn remove_keyvalues(&self, keys: &[String]) -> Result<()> {
        self.ensure_exists()?;
        let doomed: BTreeSet<String> = keys.iter().map(|k| k.to_uppercase()).collect();
        let mut all = self.keyvalues()?;
        all.retain(|key, _| !doomed.contains(key));
        self.write_keyvalues(&all)
    }

    /// All key/value pairs. A version without a keyvalues file has none.
    pub fn keyvalues(&self) -> Result<BTreeMap<String, String>> {
        self.ensure_exists()?;
        let path = self.dir.join(KEYVALUES_FILE);
        let mut pairs = BTreeMap::new();
        if !path.exists() {
            return Ok(pairs);
        }
        let text = fs::read_to_string(path)?;
        for line in text.lines() {
            if let Some((key, value)) = line.split_once('=') {
                pairs.insert(key.to_string(), value.to_string());
            }
        }
        Ok(pairs)
    }

    fn write_keyvalues(&self, pairs: &BTreeMap<String, String>) -> Result<()> {
        let mut text = String::new();
        for (key, value) in pairs {
            text.push_str(key);
            text.push('=');
            text.push_str(value);
            text.push('\n');
        }
        fs::write(self.dir.join(KEYVALUES_FILE), text)?;
        Ok(())
    }

    /// Write free-form notes, either replacing the file or appending a
    /// line to it.
    pub fn write_notes(&self, text: &str, overwrite: bool) -> Result<()> {
        self.ensure_exists()?;
        let path = self.dir.join(NOTES_FILE);
        if overwrite {
            fs::write(path, text)?;
        } else {
            let mut f = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(f, "{}", text)?;
        }
        Ok(())
    }

    pub fn notes(&self) -> Result<String> {
        self.ensure_exists()?;
        let path = self.dir.join(NOTES_FILE);
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(path)?)
    }
}
