//! CSV-backed stage stores.
//!
//! The [`Storage`] struct owns the `df_storage/` directory: the key-set store
//! of known URLs plus one append-only CSV file per stage output and one for
//! the realigned merge.
//!
//! **Access rules:**
//! - Pipeline runs: read-write (sole writer) via [`Storage::open`]
//! - Inspection commands: read-only via [`Storage::open_readonly`]

mod tables;

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use linkdigest_shared::{
    ClusterAssignment, LinkDigestError, MergedRecord, ParsedText, RecordSet, Result, Summary,
    Vector,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use tables::Table;

/// Directory under the data dir that holds every store.
pub const STORE_DIR_NAME: &str = "df_storage";

#[derive(Debug, Serialize, serde::Deserialize)]
struct UrlRow {
    url: String,
}

/// Row counts per store, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCounts(pub Vec<(Table, usize)>);

impl StoreCounts {
    pub fn get(&self, table: Table) -> usize {
        self.0
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Handle on the stage stores of one data directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    readonly: bool,
}

impl Storage {
    /// Open (creating if needed) the stores under `data_dir` in read-write mode.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join(STORE_DIR_NAME);
        std::fs::create_dir_all(&root).map_err(|e| LinkDigestError::io(&root, e))?;
        tracing::debug!(root = %root.display(), "opened stage stores");

        Ok(Self {
            root,
            readonly: false,
        })
    }

    /// Open the stores under `data_dir` in read-only mode. Nothing is created;
    /// stores that do not exist yet read back as empty.
    pub fn open_readonly(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            root: data_dir.join(STORE_DIR_NAME),
            readonly: true,
        })
    }

    /// The `df_storage/` directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the CSV file backing `table`.
    pub fn path(&self, table: Table) -> PathBuf {
        self.root.join(table.file_name())
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LinkDigestError::Storage(
                "stores are opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Key-set store
    // -----------------------------------------------------------------------

    /// Every URL ever marked known.
    pub fn known_urls(&self) -> Result<HashSet<String>> {
        let rows: Vec<UrlRow> = self.read(Table::Urls)?;
        Ok(rows.into_iter().map(|r| r.url).collect())
    }

    /// Add `urls` to the key-set store. URLs already present are skipped, so
    /// the store never holds duplicates. Returns how many were added.
    pub fn mark_known(&self, urls: &HashSet<String>) -> Result<usize> {
        self.check_writable()?;
        let known = self.known_urls()?;

        let mut fresh: Vec<&String> = urls.iter().filter(|u| !known.contains(*u)).collect();
        fresh.sort();

        let rows: Vec<UrlRow> = fresh
            .into_iter()
            .map(|url| UrlRow { url: url.clone() })
            .collect();
        self.append(Table::Urls, &rows)
    }

    // -----------------------------------------------------------------------
    // Stage stores
    // -----------------------------------------------------------------------

    pub fn save_texts(&self, texts: &RecordSet<ParsedText>) -> Result<usize> {
        self.append(Table::Texts, texts.records())
    }

    pub fn load_texts(&self) -> Result<RecordSet<ParsedText>> {
        self.read(Table::Texts).map(RecordSet::new)
    }

    pub fn save_summaries(&self, summaries: &RecordSet<Summary>) -> Result<usize> {
        self.append(Table::Summaries, summaries.records())
    }

    pub fn load_summaries(&self) -> Result<RecordSet<Summary>> {
        self.read(Table::Summaries).map(RecordSet::new)
    }

    pub fn save_vectors(&self, vectors: &RecordSet<Vector>) -> Result<usize> {
        self.append(Table::Vectors, vectors.records())
    }

    pub fn load_vectors(&self) -> Result<RecordSet<Vector>> {
        self.read(Table::Vectors).map(RecordSet::new)
    }

    pub fn save_clusters(&self, clusters: &RecordSet<ClusterAssignment>) -> Result<usize> {
        self.append(Table::Clusters, clusters.records())
    }

    pub fn load_clusters(&self) -> Result<RecordSet<ClusterAssignment>> {
        self.read(Table::Clusters).map(RecordSet::new)
    }

    pub fn save_merged(&self, merged: &RecordSet<MergedRecord>) -> Result<usize> {
        self.append(Table::Merged, merged.records())
    }

    pub fn load_merged(&self) -> Result<RecordSet<MergedRecord>> {
        self.read(Table::Merged).map(RecordSet::new)
    }

    /// Merged records matching both filters. `None` matches everything.
    pub fn query_merged(&self, url: Option<&str>, label: Option<i32>) -> Result<Vec<MergedRecord>> {
        let merged = self.load_merged()?;
        Ok(merged
            .into_iter()
            .filter(|r| url.is_none_or(|u| r.url == u))
            .filter(|r| label.is_none_or(|l| r.label == l))
            .collect())
    }

    /// Row counts (excluding headers) of every store.
    pub fn counts(&self) -> Result<StoreCounts> {
        let mut counts = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            counts.push((table, self.count_rows(table)?));
        }
        Ok(StoreCounts(counts))
    }

    // -----------------------------------------------------------------------
    // CSV plumbing
    // -----------------------------------------------------------------------

    /// Append `rows` to `table`, writing the header only when the file is new.
    /// Zero rows leave the file untouched.
    fn append<T: Serialize>(&self, table: Table, rows: &[T]) -> Result<usize> {
        self.check_writable()?;
        if rows.is_empty() {
            return Ok(0);
        }

        let path = self.path(table);
        let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LinkDigestError::io(&path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| storage_error(table, "write", e))?;
        }
        writer.flush().map_err(|e| LinkDigestError::io(&path, e))?;

        let file = writer
            .into_inner()
            .map_err(|e| storage_error(table, "flush", e))?;
        file.sync_all().map_err(|e| LinkDigestError::io(&path, e))?;

        tracing::info!(
            store = %table,
            rows = rows.len(),
            file = %path.display(),
            "checkpoint written"
        );
        Ok(rows.len())
    }

    /// Read every row of `table`; a missing file reads as empty.
    fn read<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>> {
        let Some(mut reader) = self.reader(table)? else {
            return Ok(Vec::new());
        };
        reader
            .deserialize()
            .map(|row| row.map_err(|e| storage_error(table, "read", e)))
            .collect()
    }

    fn count_rows(&self, table: Table) -> Result<usize> {
        let Some(mut reader) = self.reader(table)? else {
            return Ok(0);
        };
        let mut count = 0;
        for record in reader.records() {
            record.map_err(|e| storage_error(table, "read", e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Open a store for reading. `None` when the file does not exist; an
    /// error when its header is not the table's column list.
    fn reader(&self, table: Table) -> Result<Option<csv::Reader<File>>> {
        let path = self.path(table);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader =
            csv::Reader::from_path(&path).map_err(|e| storage_error(table, "open", e))?;
        let header = reader
            .headers()
            .map_err(|e| storage_error(table, "read header of", e))?;
        if !header.is_empty() && header.iter().ne(table.columns().iter().copied()) {
            return Err(storage_error(
                table,
                "read",
                format!(
                    "unexpected header {:?}, expected {:?}",
                    header.iter().collect::<Vec<_>>(),
                    table.columns()
                ),
            ));
        }
        Ok(Some(reader))
    }
}

fn storage_error(table: Table, action: &str, err: impl std::fmt::Display) -> LinkDigestError {
    LinkDigestError::Storage(format!("{action} {} failed: {err}", table.file_name()))
}
