//! Stage store layout.
//!
//! Each store is one CSV file under `<data_dir>/df_storage/`. The header row
//! is written when a file is created and never again.

/// One durable stage store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Key-set store of every URL ever ingested.
    Urls,
    Texts,
    Summaries,
    Vectors,
    Clusters,
    /// Realigned join of all stages.
    Merged,
}

impl Table {
    /// Every store, in pipeline order.
    pub const ALL: [Table; 6] = [
        Table::Urls,
        Table::Texts,
        Table::Summaries,
        Table::Vectors,
        Table::Clusters,
        Table::Merged,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Urls => "url.csv",
            Self::Texts => "text.csv",
            Self::Summaries => "summary.csv",
            Self::Vectors => "vector.csv",
            Self::Clusters => "cluster.csv",
            Self::Merged => "all.csv",
        }
    }

    /// Column names, in file order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Urls => &["url"],
            Self::Texts => &["url", "text"],
            Self::Summaries => &["url", "summary"],
            Self::Vectors => &["url", "vector"],
            Self::Clusters => &["url", "label", "topic"],
            Self::Merged => &["url", "text", "summary", "vector", "label", "topic"],
        }
    }

    /// Short name for logs and status output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Urls => "urls",
            Self::Texts => "texts",
            Self::Summaries => "summaries",
            Self::Vectors => "vectors",
            Self::Clusters => "clusters",
            Self::Merged => "merged",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
