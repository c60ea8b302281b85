//! Splitting rules for primary IDs and gene-name strings

/// Semicolon-delimited fragments of a primary ID, trimmed, empties dropped
pub fn split_primary_id(primary_id: &str) -> impl Iterator<Item = &str> {
    primary_id.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// Tokens of a gene-name string split on space, semicolon or backslash
pub fn gene_tokens(gene_names: &str) -> impl Iterator<Item = &str> {
    gene_names
        .split([' ', ';', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First gene-name token, the canonical display name
pub fn first_gene_name(gene_names: &str) -> Option<&str> {
    gene_tokens(gene_names).next()
}
