/// # Manifest - table level assignments
///
/// Records which table files are live and whether each belongs to L0
/// (flushes) or L1 (compaction output), so a restart restores both levels
/// exactly.
///
/// ## File format
///
/// Plain text, one table per line, newest first within each level:
///
/// ```text
/// # ResultStore table manifest
/// L0:tbl-00000000000000000042-1708600000000.sst
/// L1:tbl-00000000000000000017-1708599999000.sst
/// ```
///
/// Lines starting with `#` and blank lines are ignored.
///
/// ## Crash safety
///
/// Saved by writing `MANIFEST.tmp`, fsyncing, and renaming it over
/// `MANIFEST`. Where the rename over an existing file fails (Windows), the
/// manifest is rewritten in place instead.
use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Manifest file name inside the table directory.
pub const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    L0,
    L1,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::L0 => f.write_str("L0"),
            Level::L1 => f.write_str("L1"),
        }
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L0" => Ok(Level::L0),
            "L1" => Ok(Level::L1),
            other => bail!("unknown level '{}' (expected L0 or L1)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub filename: String,
    pub level: Level,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    pub entries: Vec<TableMeta>,
}

impl Manifest {
    /// Loads `sst_dir/MANIFEST`, or starts an empty manifest when the file
    /// does not exist.
    pub fn load_or_create(sst_dir: &Path) -> Result<Self> {
        let path = sst_dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let file = File::open(&path)
            .with_context(|| format!("failed to open manifest at {}", path.display()))?;
        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line_no = idx + 1;
            let line = line.with_context(|| format!("failed to read manifest line {}", line_no))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (level, filename) = line.split_once(':').with_context(|| {
                format!("manifest line {}: expected '<level>:<file>', got {:?}", line_no, line)
            })?;
            let level = level
                .parse::<Level>()
                .with_context(|| format!("manifest line {}", line_no))?;
            entries.push(TableMeta {
                filename: filename.to_string(),
                level,
            });
        }

        Ok(Self { path, entries })
    }

    /// Persists the manifest (temp file + fsync + rename).
    pub fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);
        self.write_to(&tmp_path)?;

        if fs::rename(&tmp_path, &self.path).is_err() {
            self.write_to(&self.path)?;
            let _ = fs::remove_file(&tmp_path);
        }
        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to write manifest {}", path.display()))?;
        writeln!(f, "# ResultStore table manifest")?;
        writeln!(f, "# Format: <level>:<filename>")?;
        for entry in &self.entries {
            writeln!(f, "{}:{}", entry.level, entry.filename)?;
        }
        f.flush()?;
        f.sync_all()?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Table names at `level`, newest first.
    pub fn filenames(&self, level: Level) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.filename.as_str())
            .collect()
    }

    /// Registers a new table as the newest of its level. Not saved.
    pub fn add(&mut self, filename: String, level: Level) {
        let pos = self
            .entries
            .iter()
            .position(|e| e.level == level)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, TableMeta { filename, level });
    }

    /// Registers a table as the oldest of its level. Used when entries are
    /// supplied newest first. Not saved.
    pub fn push(&mut self, filename: String, level: Level) {
        self.entries.push(TableMeta { filename, level });
    }

    /// Replaces every entry with the single compaction output, or with
    /// nothing when compaction produced no table. Not saved.
    pub fn replace_all(&mut self, compacted: Option<String>) {
        self.entries.clear();
        if let Some(filename) = compacted {
            self.entries.push(TableMeta {
                filename,
                level: Level::L1,
            });
        }
    }
}
