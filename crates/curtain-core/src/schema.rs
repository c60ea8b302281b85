//! Entity schema for a per-dataset store
//!
//! Each dataset lives in its own SQLite file. Rows are written once in bulk
//! during ingestion; mapping tables are rebuilt wholesale; a version mismatch
//! on [`ROW_SCHEMA_VERSION`] means the whole file is deleted and rebuilt.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;

/// Version of the row schema materialised by [`init_schema`].
///
/// Bumping this makes every existing store report stale data, which callers
/// answer with a destructive rebuild.
pub const ROW_SCHEMA_VERSION: i64 = 4;

/// Version of the mapping-index build algorithm in [`crate::mapping`].
pub const MAPPING_SCHEMA_VERSION: i64 = 2;

/// Comparison label used when the processed table declares none.
pub const DEFAULT_COMPARISON: &str = "1";

/// Key of the single row in `schema_version`.
pub(crate) const ROW_VERSION_KEY: &str = "rows";

/// Key of the single row in `mapping_schema_version`.
pub(crate) const MAPPING_VERSION_KEY: &str = "mappings";

/// `mapping_schema_version` row holding the UniProt entry count the last
/// mapping build resolved gene names against.
pub(crate) const MAPPING_UNIPROT_KEY: &str = "uniprot_entries";

/// One differential-expression (or PTM site) row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessedRow {
    /// One or more semicolon-joined accessions
    pub primary_id: String,
    pub gene_names: Option<String>,
    /// Already log2-transformed and/or sign-reversed per ingestion config
    pub fold_change: Option<f64>,
    /// Already -log10 transformed per ingestion config
    pub significant: Option<f64>,
    pub comparison: String,
    pub accession: Option<String>,
    /// Raw site string such as "S15"
    pub position: Option<String>,
    /// 1-based index into the peptide
    pub position_peptide: Option<i64>,
    pub peptide_sequence: Option<String>,
    pub score: Option<f64>,
}

impl ProcessedRow {
    /// A bare row with only the primary ID and the default comparison
    pub fn new(primary_id: impl Into<String>) -> Self {
        Self {
            primary_id: primary_id.into(),
            gene_names: None,
            fold_change: None,
            significant: None,
            comparison: DEFAULT_COMPARISON.to_string(),
            accession: None,
            position: None,
            position_peptide: None,
            peptide_sequence: None,
            score: None,
        }
    }

    /// True when the row carries PTM site information
    pub fn is_ptm(&self) -> bool {
        self.accession.is_some()
            || self.position.is_some()
            || self.position_peptide.is_some()
            || self.peptide_sequence.is_some()
    }

    /// p-value recovered from the stored -log10 significance
    pub fn p_value(&self) -> Option<f64> {
        self.significant.map(|s| 10f64.powf(-s))
    }

    /// `p < p_cutoff AND |foldChange| > fc_cutoff`
    pub fn passes_cutoffs(&self, p_cutoff: f64, fc_cutoff: f64) -> bool {
        match (self.p_value(), self.fold_change) {
            (Some(p), Some(fc)) => p < p_cutoff && fc.abs() > fc_cutoff,
            _ => false,
        }
    }
}

/// One sample intensity for one primary ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawRow {
    pub primary_id: String,
    pub sample_name: String,
    /// log2-transformed if the raw form asks for it
    pub sample_value: Option<f64>,
}

/// Typed projection of a UniProt record, stored once per accession
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UniProtEntry {
    pub accession: String,
    pub gene_names: Option<String>,
    pub protein_name: Option<String>,
    pub organism: Option<String>,
    pub sequence: Option<String>,
    /// The full record as received
    pub raw_json: String,
}

/// `geneNameUpper -> primaryId`
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct GeneNameMapping {
    pub gene_name_upper: String,
    pub primary_id: String,
}

/// `splitIdUpper -> primaryId`
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct PrimaryIdMapping {
    pub split_id_upper: String,
    pub primary_id: String,
}

/// Denormalised JSON blob keyed by gene name
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GenesMapEntry {
    pub gene_name: String,
    pub payload: String,
}

/// Denormalised JSON blob keyed by primary ID
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PrimaryIdsMapEntry {
    pub primary_id: String,
    pub payload: String,
}

/// Denormalised gene name to accession blob
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GeneNameToAccEntry {
    pub gene_name: String,
    pub payload: String,
}

/// Autocomplete vocabulary entry
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AllGenesEntry {
    pub gene_name: String,
}

/// Every table in a dataset store, in deletion order.
pub const ALL_TABLES: &[&str] = &[
    "processed_rows",
    "raw_rows",
    "dataset_metadata",
    "schema_version",
    "gene_name_mapping",
    "primary_id_mapping",
    "mapping_schema_version",
    "uniprot_entries",
    "genes_map",
    "primary_ids_map",
    "gene_name_to_acc",
    "all_genes",
];

const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS processed_rows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        primary_id TEXT NOT NULL,
        gene_names TEXT,
        fold_change REAL,
        significant REAL,
        comparison TEXT NOT NULL DEFAULT '1',
        accession TEXT,
        position TEXT,
        position_peptide INTEGER,
        peptide_sequence TEXT,
        score REAL,
        UNIQUE (primary_id, comparison)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raw_rows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        primary_id TEXT NOT NULL,
        sample_name TEXT NOT NULL,
        sample_value REAL,
        UNIQUE (primary_id, sample_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dataset_metadata (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        settings TEXT NOT NULL,
        raw_form TEXT NOT NULL,
        differential_form TEXT NOT NULL,
        selections TEXT,
        extra_data TEXT,
        extra TEXT,
        password TEXT NOT NULL DEFAULT '',
        fetch_uniprot INTEGER NOT NULL DEFAULT 1,
        permanent INTEGER NOT NULL DEFAULT 0,
        bypass_uniprot INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        key TEXT PRIMARY KEY,
        version INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gene_name_mapping (
        gene_name_upper TEXT NOT NULL,
        primary_id TEXT NOT NULL,
        PRIMARY KEY (gene_name_upper, primary_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS primary_id_mapping (
        split_id_upper TEXT NOT NULL,
        primary_id TEXT NOT NULL,
        PRIMARY KEY (split_id_upper, primary_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mapping_schema_version (
        key TEXT PRIMARY KEY,
        version INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS uniprot_entries (
        accession TEXT PRIMARY KEY,
        gene_names TEXT,
        protein_name TEXT,
        organism TEXT,
        sequence TEXT,
        raw_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS genes_map (
        gene_name TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS primary_ids_map (
        primary_id TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gene_name_to_acc (
        gene_name TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS all_genes (
        gene_name TEXT PRIMARY KEY COLLATE NOCASE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_processed_primary_id ON processed_rows(primary_id)",
    "CREATE INDEX IF NOT EXISTS idx_raw_primary_id ON raw_rows(primary_id)",
    "CREATE INDEX IF NOT EXISTS idx_gene_mapping_primary ON gene_name_mapping(primary_id)",
];

/// Create every table and index if missing
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_schema_creates_all_tables() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table'")
                .fetch_all(&pool)
                .await
                .unwrap();

        for table in ALL_TABLES {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();
        assert!(init_schema(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_processed_unique_on_primary_id_and_comparison() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();

        let insert = "INSERT INTO processed_rows (primary_id, comparison) VALUES (?1, ?2)";
        sqlx::query(insert).bind("P1").bind("1").execute(&pool).await.unwrap();
        sqlx::query(insert).bind("P1").bind("2").execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).bind("P1").bind("1").execute(&pool).await.is_err());
    }

    #[test]
    fn test_p_value_and_cutoffs() {
        let mut row = ProcessedRow::new("P04637");
        row.significant = Some(2.0);
        row.fold_change = Some(-1.5);

        let p = row.p_value().unwrap();
        assert!((p - 0.01).abs() < 1e-12);
        assert!(row.passes_cutoffs(0.05, 0.6));
        assert!(!row.passes_cutoffs(0.001, 0.6));
        assert!(!row.passes_cutoffs(0.05, 2.0));
    }

    #[test]
    fn test_ptm_detection() {
        let mut row = ProcessedRow::new("P04637_S15");
        assert!(!row.is_ptm());
        row.position = Some("S15".to_string());
        assert!(row.is_ptm());
    }
}
