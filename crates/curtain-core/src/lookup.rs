//! Gene / protein lookups over one dataset's store

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::ids::{first_gene_name, split_primary_id};
use crate::store::{DatasetStore, StoreManager};
use crate::schema::UniProtEntry;
use crate::uniprot::UniProtIndex;

/// UniProt index of a dataset: stored entries plus the `accMap` aliases
/// from its metadata
pub async fn uniprot_index_for(store: &DatasetStore) -> Result<UniProtIndex> {
    let entries = store.uniprot_entries().await?;
    let aliases = match store.load_metadata().await? {
        Some(metadata) => {
            let extra = metadata.extra_data();
            UniProtIndex::aliases_from_payload(extra.uniprot.acc_map.iter())
        },
        None => Default::default(),
    };
    Ok(UniProtIndex::new(entries, aliases))
}

/// Display gene name for a primary ID
///
/// Exact processed-row match first, then a row whose primary ID contains one
/// of the query's fragments, then UniProt.
pub async fn gene_name_for(store: &DatasetStore, primary_id: &str) -> Result<Option<String>> {
    if let Some(names) = store.gene_names_of(primary_id).await? {
        return Ok(first_gene_name(&names).map(str::to_string));
    }

    for fragment in split_primary_id(primary_id) {
        if let Some(names) = store.gene_names_containing(fragment).await? {
            debug!(primary_id, fragment, "Gene name resolved by fragment");
            return Ok(first_gene_name(&names).map(str::to_string));
        }
    }

    let index = uniprot_index_for(store).await?;
    Ok(index.resolve_gene_name(primary_id).or_else(|| {
        split_primary_id(primary_id).find_map(|fragment| index.resolve_gene_name(fragment))
    }))
}

/// Dataset-scoped query façade over the mapping index and UniProt table
#[derive(Debug, Clone)]
pub struct LookupService {
    stores: Arc<StoreManager>,
}

impl LookupService {
    pub fn new(stores: Arc<StoreManager>) -> Self {
        Self { stores }
    }

    pub async fn gene_name_for_primary_id(
        &self,
        dataset_id: &str,
        primary_id: &str,
    ) -> Result<Option<String>> {
        let store = self.stores.get_store(dataset_id).await?;
        gene_name_for(&store, primary_id).await
    }

    /// Every primary ID mapped from `gene_name`, case-insensitive
    pub async fn primary_ids_for_gene_name(
        &self,
        dataset_id: &str,
        gene_name: &str,
    ) -> Result<Vec<String>> {
        let store = self.stores.get_store(dataset_id).await?;
        store
            .primary_ids_for_gene_name(&gene_name.trim().to_uppercase())
            .await
    }

    /// Every primary ID containing `split_id` as a fragment, case-insensitive
    pub async fn primary_ids_for_split_id(
        &self,
        dataset_id: &str,
        split_id: &str,
    ) -> Result<Vec<String>> {
        let store = self.stores.get_store(dataset_id).await?;
        store
            .primary_ids_for_split_id(&split_id.trim().to_uppercase())
            .await
    }

    pub async fn uniprot_entry(
        &self,
        dataset_id: &str,
        accession: &str,
    ) -> Result<Option<UniProtEntry>> {
        let store = self.stores.get_store(dataset_id).await?;
        if let Some(entry) = store.uniprot_entry(accession).await? {
            return Ok(Some(entry));
        }
        let index = uniprot_index_for(&store).await?;
        Ok(index.entry(accession).cloned())
    }

    pub async fn uniprot_index(&self, dataset_id: &str) -> Result<UniProtIndex> {
        let store = self.stores.get_store(dataset_id).await?;
        uniprot_index_for(&store).await
    }

    async fn auxiliary(
        &self,
        dataset_id: &str,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Value>> {
        let store = self.stores.get_store(dataset_id).await?;
        store
            .keyed_blob(table, key_column, key)
            .await?
            .map(|payload| serde_json::from_str(&payload).map_err(Into::into))
            .transpose()
    }

    /// `genesMap` payload stored for a gene name
    pub async fn genes_map_entry(&self, dataset_id: &str, gene_name: &str) -> Result<Option<Value>> {
        self.auxiliary(dataset_id, "genes_map", "gene_name", gene_name)
            .await
    }

    /// `primaryIDsMap` payload stored for a primary ID
    pub async fn primary_ids_map_entry(
        &self,
        dataset_id: &str,
        primary_id: &str,
    ) -> Result<Option<Value>> {
        self.auxiliary(dataset_id, "primary_ids_map", "primary_id", primary_id)
            .await
    }

    /// Accessions UniProt associates with a gene name
    pub async fn accessions_for_gene_name(
        &self,
        dataset_id: &str,
        gene_name: &str,
    ) -> Result<Option<Value>> {
        self.auxiliary(dataset_id, "gene_name_to_acc", "gene_name", gene_name)
            .await
    }

    /// Autocomplete over the dataset's gene vocabulary
    pub async fn suggest_genes(
        &self,
        dataset_id: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix = prefix.trim();
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let store = self.stores.get_store(dataset_id).await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(store
            .genes_with_prefix(prefix, limit)
            .await?
            .into_iter()
            .map(|e| e.gene_name)
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::schema::ProcessedRow;
    use crate::uniprot::project_record;
    use serde_json::json;
    use tempfile::TempDir;

    async fn service(dir: &TempDir) -> (LookupService, Arc<DatasetStore>) {
        let stores = Arc::new(StoreManager::new(CoreConfig::new(dir.path())));
        let store = stores.get_store("ds").await.unwrap();
        (LookupService::new(stores), store)
    }

    #[tokio::test]
    async fn test_gene_name_exact_then_fragment_then_uniprot() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = service(&dir).await;

        let mut tp53 = ProcessedRow::new("P04637;P04637-2");
        tp53.gene_names = Some("TP53 P53".to_string());
        store
            .insert_processed(&[tp53, ProcessedRow::new("Q00987")], 100)
            .await
            .unwrap();
        store
            .insert_uniprot(&[project_record("Q00987", &json!({"Gene Names": "MDM2"}))], 100)
            .await
            .unwrap();

        let exact = lookup.gene_name_for_primary_id("ds", "P04637;P04637-2").await.unwrap();
        assert_eq!(exact.as_deref(), Some("TP53"));

        let fragment = lookup.gene_name_for_primary_id("ds", "P04637").await.unwrap();
        assert_eq!(fragment.as_deref(), Some("TP53"));

        let uniprot = lookup.gene_name_for_primary_id("ds", "Q00987").await.unwrap();
        assert_eq!(uniprot.as_deref(), Some("MDM2"));

        assert!(lookup.gene_name_for_primary_id("ds", "NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_suggest_genes_prefix() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = service(&dir).await;
        let names: Vec<String> = ["TP53", "tp63", "TP73", "MDM2"].iter().map(|s| s.to_string()).collect();
        store.replace_all_genes(&names, 100).await.unwrap();

        let hits = lookup.suggest_genes("ds", "tp", 2).await.unwrap();
        assert_eq!(hits, vec!["TP53", "tp63"]);
        assert!(lookup.suggest_genes("ds", " ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suggest_genes_treats_wildcards_literally() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = service(&dir).await;
        let names: Vec<String> = ["HLA_A", "HLAA1", "HLAB"].iter().map(|s| s.to_string()).collect();
        store.replace_all_genes(&names, 100).await.unwrap();

        assert_eq!(lookup.suggest_genes("ds", "HLA_", 10).await.unwrap(), vec!["HLA_A"]);
        assert!(lookup.suggest_genes("ds", "%", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auxiliary_payloads_round_trip() {
        let dir = TempDir::new().unwrap();
        let (lookup, store) = service(&dir).await;
        let entries = vec![("TP53".to_string(), r#"["P04637"]"#.to_string())];
        store
            .replace_keyed_blobs("gene_name_to_acc", "gene_name", &entries, 100)
            .await
            .unwrap();

        let accs = lookup.accessions_for_gene_name("ds", "TP53").await.unwrap();
        assert_eq!(accs, Some(json!(["P04637"])));
        assert!(lookup.genes_map_entry("ds", "TP53").await.unwrap().is_none());
    }
}
