//! Read-only product catalog
use super::error::ValidationError;
use super::model::Price;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "photo", alias = "image_ref")]
    pub image_ref: String,
    /// grams -> list price
    #[serde(default)]
    pub weights: BTreeMap<u32, Price>,
}

/// Product id -> product. Loaded once, never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    products: BTreeMap<String, Product>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// A missing or malformed catalog degrades to an empty one.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(catalog) => {
                info!(path = %path.display(), products = catalog.len(), "Catalog loaded");
                catalog
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Catalog unavailable, serving an empty one");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Product)> {
        self.products.iter()
    }

    /// Resolve the list price of `product_id` at `weight` grams.
    pub fn price_for(&self, product_id: &str, weight: u32) -> Result<(&Product, Price), ValidationError> {
        let product = self
            .get(product_id)
            .ok_or_else(|| ValidationError::UnknownProduct(product_id.to_string()))?;
        let price = product
            .weights
            .get(&weight)
            .copied()
            .filter(|price| price.minor() > 0)
            .ok_or_else(|| ValidationError::UnknownWeight {
                product: product_id.to_string(),
                weight,
            })?;
        Ok((product, price))
    }
}
