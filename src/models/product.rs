use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Product form payload generated by the vision model, shaped for direct
/// injection into an e-commerce admin form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<String>,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub published_scope: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub tags: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    #[serde(default)]
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<String>,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub weight: String,
}

impl ProductContent {
    /// The model sometimes drops fields; a payload without these is unusable
    /// for form injection and is treated as a failed generation.
    pub fn ensure_required(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("price", &self.price),
            ("product_type", &self.product_type),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::External(format!(
                    "Generated content missing required field: {}",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_model_payload() {
        let raw = serde_json::json!({
            "title": "Handmade Ceramic Mug",
            "description": "<p>A rustic stoneware mug.</p>",
            "price": "24.99",
            "compare_at_price": "29.99",
            "sku": "MUG-001",
            "weight": "0.4",
            "variants": [{"price": "24.99", "sku": "MUG-001", "weight": "0.4"}],
            "meta_title": "Handmade Ceramic Mug",
            "meta_description": "Rustic stoneware mug, hand thrown.",
            "status": "published",
            "published_scope": "web",
            "product_type": "Drinkware",
            "vendor": "Clayworks",
            "collections": ["kitchen", "gifts"],
            "tags": "mug,ceramic,handmade"
        });

        let product: ProductContent = serde_json::from_value(raw).unwrap();
        assert!(product.ensure_required().is_ok());
        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.collections, vec!["kitchen", "gifts"]);
    }

    #[test]
    fn rejects_payload_missing_required_fields() {
        let raw = serde_json::json!({
            "title": "Mug",
            "description": "A mug.",
            "price": ""
        });

        let product: ProductContent = serde_json::from_value(raw).unwrap();
        let err = product.ensure_required().unwrap_err();
        assert!(err.to_string().contains("price"));
    }
}
