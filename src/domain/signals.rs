use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier kinds tracked per product, in the order they are compared.
pub const IDENTIFIER_KINDS: [&str; 4] = ["gtin", "mpn", "sku", "model"];

/// Everything the system knows about one product page.
///
/// Keys in `identifiers` and `attributes` are lowercase-normalized; absence
/// of an identifier means "unknown", never a wildcard. Extraction degrades
/// to empty fields on any failure, so a default record is always valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSignals {
    pub url: String,
    pub title: String,
    pub brand: Option<String>,
    pub description: String,
    pub identifiers: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
    pub schema_present: bool,
}

impl ProductSignals {
    pub fn empty(url: &str) -> Self {
        ProductSignals {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// One candidate after scoring. Created once per scoring pass, ordered
/// descending by similarity and never persisted beyond the request.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub domain: String,
    pub similarity: f64,
    pub signals: ProductSignals,
}
