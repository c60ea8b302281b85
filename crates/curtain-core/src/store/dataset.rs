//! Data access for one dataset's SQLite store

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::metadata::DatasetMetadata;
use crate::schema::{
    self, AllGenesEntry, GeneNameMapping, PrimaryIdMapping, ProcessedRow, RawRow, UniProtEntry,
    ALL_TABLES, MAPPING_UNIPROT_KEY, MAPPING_VERSION_KEY, ROW_VERSION_KEY,
};

/// Row counts of one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub processed: i64,
    pub raw: i64,
    pub gene_mappings: i64,
    pub split_id_mappings: i64,
    pub uniprot_entries: i64,
    pub all_genes: i64,
}

/// Handle to one dataset's store
///
/// Obtain through [`crate::store::StoreManager::get_store`]; the manager
/// guarantees one handle per dataset identifier.
#[derive(Debug)]
pub struct DatasetStore {
    dataset_id: String,
    path: PathBuf,
    pool: SqlitePool,
}

impl DatasetStore {
    /// Open (creating if needed) the store file and materialise the schema
    pub(crate) async fn open(dataset_id: &str, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::init_schema(&pool).await?;

        debug!(dataset = %dataset_id, path = %path.display(), "Opened dataset store");

        Ok(Self {
            dataset_id: dataset_id.to_string(),
            path: path.to_path_buf(),
            pool,
        })
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying pool, for callers that need a query this type lacks
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Row-schema version recorded by the last completed ingestion
    pub async fn schema_version(&self) -> Result<Option<i64>> {
        self.read_version("schema_version", ROW_VERSION_KEY).await
    }

    pub async fn set_schema_version(&self, version: i64) -> Result<()> {
        self.write_version("schema_version", ROW_VERSION_KEY, version).await
    }

    /// Mapping-index version stamped by the last successful mapping build
    pub async fn mapping_schema_version(&self) -> Result<Option<i64>> {
        self.read_version("mapping_schema_version", MAPPING_VERSION_KEY)
            .await
    }

    /// UniProt entry count the last mapping build had available
    pub async fn mapping_uniprot_entries(&self) -> Result<Option<i64>> {
        self.read_version("mapping_schema_version", MAPPING_UNIPROT_KEY)
            .await
    }

    async fn read_version(&self, table: &str, key: &str) -> Result<Option<i64>> {
        let sql = format!("SELECT version FROM {} WHERE key = ?1", table);
        Ok(sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn write_version(&self, table: &str, key: &str, version: i64) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (key, version) VALUES (?1, ?2)",
            table
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Counts
    // ------------------------------------------------------------------

    async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    pub async fn row_counts(&self) -> Result<RowCounts> {
        Ok(RowCounts {
            processed: self.count("processed_rows").await?,
            raw: self.count("raw_rows").await?,
            gene_mappings: self.count("gene_name_mapping").await?,
            split_id_mappings: self.count("primary_id_mapping").await?,
            uniprot_entries: self.count("uniprot_entries").await?,
            all_genes: self.count("all_genes").await?,
        })
    }

    /// Delete every row of every table, keeping the store open
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ALL_TABLES {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bulk writes
    // ------------------------------------------------------------------

    /// Insert processed rows; a later row with the same
    /// (primary_id, comparison) replaces an earlier one
    pub async fn insert_processed(&self, rows: &[ProcessedRow], batch_size: usize) -> Result<usize> {
        for chunk in rows.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for row in chunk {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO processed_rows
                    (primary_id, gene_names, fold_change, significant, comparison,
                     accession, position, position_peptide, peptide_sequence, score)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(&row.primary_id)
                .bind(&row.gene_names)
                .bind(row.fold_change)
                .bind(row.significant)
                .bind(&row.comparison)
                .bind(&row.accession)
                .bind(&row.position)
                .bind(row.position_peptide)
                .bind(&row.peptide_sequence)
                .bind(row.score)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(rows.len())
    }

    pub async fn insert_raw(&self, rows: &[RawRow], batch_size: usize) -> Result<usize> {
        for chunk in rows.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for row in chunk {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO raw_rows (primary_id, sample_name, sample_value)
                    VALUES (?1, ?2, ?3)
                    "#,
                )
                .bind(&row.primary_id)
                .bind(&row.sample_name)
                .bind(row.sample_value)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(rows.len())
    }

    pub async fn insert_uniprot(&self, entries: &[UniProtEntry], batch_size: usize) -> Result<usize> {
        for chunk in entries.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for entry in chunk {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO uniprot_entries
                    (accession, gene_names, protein_name, organism, sequence, raw_json)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(&entry.accession)
                .bind(&entry.gene_names)
                .bind(&entry.protein_name)
                .bind(&entry.organism)
                .bind(&entry.sequence)
                .bind(&entry.raw_json)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(entries.len())
    }

    /// Replace one `(key, payload)` auxiliary table wholesale
    pub(crate) async fn replace_keyed_blobs(
        &self,
        table: &str,
        key_column: &str,
        entries: &[(String, String)],
        batch_size: usize,
    ) -> Result<()> {
        let insert = format!(
            "INSERT OR REPLACE INTO {} ({}, payload) VALUES (?1, ?2)",
            table, key_column
        );
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        for chunk in entries.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for (key, payload) in chunk {
                sqlx::query(&insert)
                    .bind(key)
                    .bind(payload)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Replace the autocomplete vocabulary; names are case-insensitively unique
    pub async fn replace_all_genes(&self, names: &[String], batch_size: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM all_genes").execute(&mut *tx).await?;
        tx.commit().await?;

        for chunk in names.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for name in chunk {
                sqlx::query("INSERT OR IGNORE INTO all_genes (gene_name) VALUES (?1)")
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Delete and reinsert both mapping tables, then stamp the mapping version
    /// and the UniProt entry count the build used
    ///
    /// Duplicate pairs are ignored rather than failing the build.
    pub async fn replace_mappings(
        &self,
        gene_names: &[GeneNameMapping],
        split_ids: &[PrimaryIdMapping],
        version: i64,
        uniprot_entries: i64,
        batch_size: usize,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM gene_name_mapping")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM primary_id_mapping")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM mapping_schema_version")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        for chunk in gene_names.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for m in chunk {
                sqlx::query(
                    "INSERT OR IGNORE INTO gene_name_mapping (gene_name_upper, primary_id) VALUES (?1, ?2)",
                )
                .bind(&m.gene_name_upper)
                .bind(&m.primary_id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }

        for chunk in split_ids.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for m in chunk {
                sqlx::query(
                    "INSERT OR IGNORE INTO primary_id_mapping (split_id_upper, primary_id) VALUES (?1, ?2)",
                )
                .bind(&m.split_id_upper)
                .bind(&m.primary_id)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }

        self.write_version("mapping_schema_version", MAPPING_UNIPROT_KEY, uniprot_entries)
            .await?;
        self.write_version("mapping_schema_version", MAPPING_VERSION_KEY, version)
            .await
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Persist the single metadata row
    pub async fn save_metadata(&self, metadata: &DatasetMetadata) -> Result<()> {
        let settings = serde_json::to_string(&metadata.settings)?;
        let raw_form = serde_json::to_string(&metadata.raw_form)?;
        let differential_form = serde_json::to_string(&metadata.differential_form)?;
        let selections = serde_json::to_string(&metadata.selections)?;
        let extra_data = metadata
            .extra_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let extra = serde_json::to_string(&metadata.extra)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO dataset_metadata
            (id, settings, raw_form, differential_form, selections, extra_data, extra,
             password, fetch_uniprot, permanent, bypass_uniprot, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(settings)
        .bind(raw_form)
        .bind(differential_form)
        .bind(selections)
        .bind(extra_data)
        .bind(extra)
        .bind(&metadata.password)
        .bind(metadata.fetch_uniprot)
        .bind(metadata.permanent)
        .bind(metadata.bypass_uniprot)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the metadata row, if ingestion has written one
    pub async fn load_metadata(&self) -> Result<Option<DatasetMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT settings, raw_form, differential_form, selections, extra_data, extra,
                   password, fetch_uniprot, permanent, bypass_uniprot
            FROM dataset_metadata WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let selections: Option<String> = row.try_get("selections")?;
        let extra_data: Option<String> = row.try_get("extra_data")?;
        let extra: Option<String> = row.try_get("extra")?;

        Ok(Some(DatasetMetadata {
            settings: serde_json::from_str(&row.try_get::<String, _>("settings")?)?,
            raw_form: serde_json::from_str(&row.try_get::<String, _>("raw_form")?)?,
            differential_form: serde_json::from_str(
                &row.try_get::<String, _>("differential_form")?,
            )?,
            selections: selections
                .map(|s| serde_json::from_str(&s))
                .transpose()?
                .unwrap_or(Value::Null),
            extra_data: extra_data.map(|s| serde_json::from_str(&s)).transpose()?,
            extra: extra
                .map(|s| serde_json::from_str::<Map<String, Value>>(&s))
                .transpose()?
                .unwrap_or_default(),
            password: row.try_get("password")?,
            fetch_uniprot: row.try_get("fetch_uniprot")?,
            permanent: row.try_get("permanent")?,
            bypass_uniprot: row.try_get("bypass_uniprot")?,
        }))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    const PROCESSED_COLUMNS: &'static str = "primary_id, gene_names, fold_change, significant, \
        comparison, accession, position, position_peptide, peptide_sequence, score";

    /// All processed rows in insertion order
    pub async fn processed_rows(&self) -> Result<Vec<ProcessedRow>> {
        let sql = format!(
            "SELECT {} FROM processed_rows ORDER BY id",
            Self::PROCESSED_COLUMNS
        );
        Ok(sqlx::query_as::<_, ProcessedRow>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Processed rows with exactly this primary ID, in insertion order
    pub async fn processed_rows_for(&self, primary_id: &str) -> Result<Vec<ProcessedRow>> {
        let sql = format!(
            "SELECT {} FROM processed_rows WHERE primary_id = ?1 ORDER BY id",
            Self::PROCESSED_COLUMNS
        );
        Ok(sqlx::query_as::<_, ProcessedRow>(&sql)
            .bind(primary_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Primary IDs whose ID or gene-names column equals `value`, ignoring case
    pub async fn primary_ids_matching_columns(&self, value: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT primary_id FROM processed_rows
            WHERE upper(primary_id) = upper(?1) OR upper(gene_names) = upper(?1)
            GROUP BY primary_id
            ORDER BY MIN(id)
            "#,
        )
        .bind(value)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Distinct `(primary_id, gene_names)` pairs in insertion order
    pub async fn distinct_identifiers(&self) -> Result<Vec<(String, Option<String>)>> {
        let rows = sqlx::query(
            r#"
            SELECT primary_id, MAX(gene_names) AS gene_names FROM processed_rows
            GROUP BY primary_id
            ORDER BY MIN(id)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Ok((r.try_get("primary_id")?, r.try_get("gene_names")?)))
            .collect()
    }

    pub async fn raw_rows_for(&self, primary_id: &str) -> Result<Vec<RawRow>> {
        Ok(sqlx::query_as::<_, RawRow>(
            "SELECT primary_id, sample_name, sample_value FROM raw_rows WHERE primary_id = ?1 ORDER BY id",
        )
        .bind(primary_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn uniprot_entries(&self) -> Result<Vec<UniProtEntry>> {
        Ok(sqlx::query_as::<_, UniProtEntry>(
            "SELECT accession, gene_names, protein_name, organism, sequence, raw_json FROM uniprot_entries",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn uniprot_entry(&self, accession: &str) -> Result<Option<UniProtEntry>> {
        Ok(sqlx::query_as::<_, UniProtEntry>(
            r#"
            SELECT accession, gene_names, protein_name, organism, sequence, raw_json
            FROM uniprot_entries WHERE upper(accession) = upper(?1)
            "#,
        )
        .bind(accession)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Primary IDs mapped from an upper-cased gene name
    pub async fn primary_ids_for_gene_name(&self, gene_name_upper: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT primary_id FROM gene_name_mapping WHERE gene_name_upper = ?1 ORDER BY rowid",
        )
        .bind(gene_name_upper)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Primary IDs mapped from an upper-cased split ID
    pub async fn primary_ids_for_split_id(&self, split_id_upper: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT primary_id FROM primary_id_mapping WHERE split_id_upper = ?1 ORDER BY rowid",
        )
        .bind(split_id_upper)
        .fetch_all(&self.pool)
        .await?)
    }

    /// All gene-name mapping pairs
    pub async fn gene_name_mappings(&self) -> Result<Vec<GeneNameMapping>> {
        Ok(sqlx::query_as::<_, GeneNameMapping>(
            "SELECT gene_name_upper, primary_id FROM gene_name_mapping ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Gene-name string of the first processed row carrying one for `primary_id`
    pub async fn gene_names_of(&self, primary_id: &str) -> Result<Option<String>> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT gene_names FROM processed_rows
            WHERE primary_id = ?1 AND gene_names IS NOT NULL AND gene_names != ''
            ORDER BY id LIMIT 1
            "#,
        )
        .bind(primary_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Gene-name string of the first processed row whose primary ID contains `fragment`
    pub async fn gene_names_containing(&self, fragment: &str) -> Result<Option<String>> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT gene_names FROM processed_rows
            WHERE instr(upper(primary_id), upper(?1)) > 0
              AND gene_names IS NOT NULL AND gene_names != ''
            ORDER BY id LIMIT 1
            "#,
        )
        .bind(fragment)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Autocomplete: vocabulary entries starting with `prefix`, sorted
    pub async fn genes_with_prefix(&self, prefix: &str, limit: i64) -> Result<Vec<AllGenesEntry>> {
        let pattern = format!("{}%", escape_like(prefix));
        Ok(sqlx::query_as::<_, AllGenesEntry>(
            r"SELECT gene_name FROM all_genes WHERE gene_name LIKE ?1 ESCAPE '\' ORDER BY gene_name COLLATE NOCASE LIMIT ?2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Payload of a `(key, payload)` auxiliary table
    pub(crate) async fn keyed_blob(&self, table: &str, key_column: &str, key: &str) -> Result<Option<String>> {
        let sql = format!("SELECT payload FROM {} WHERE {} = ?1", table, key_column);
        Ok(sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// Escape `\`, `%` and `_` for a `LIKE ... ESCAPE '\'` pattern
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("HLA_"), r"HLA\_");
        assert_eq!(escape_like("50%"), r"50\%");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
        assert_eq!(escape_like("TP53"), "TP53");
    }
}
