//! Product ownership client
//!
//! The catalog owns products; the order core reads a product's owner and
//! type when it is listed and rewrites its owner after a completed sale.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::order::ProductType;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductInfo {
    pub owner: String,
    pub product_type: ProductType,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(i64),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_product(&self, product_id: i64) -> Result<ProductInfo, CatalogError>;

    /// Record the new owner and last sale price of a product
    async fn transfer_ownership(
        &self,
        product_id: i64,
        new_owner: &str,
        final_price: f64,
    ) -> Result<(), CatalogError>;
}

#[derive(Serialize)]
struct TransferBody<'a> {
    owner: &'a str,
    price: f64,
}

/// Catalog service over HTTP
///
/// - `GET {endpoint}/products/{id}` → `{"owner", "product_type"}`
/// - `PUT {endpoint}/products/{id}/owner` with `{"owner", "price"}`
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCatalogClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

fn unavailable(e: reqwest::Error) -> CatalogError {
    CatalogError::Unavailable(e.to_string())
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_product(&self, product_id: i64) -> Result<ProductInfo, CatalogError> {
        let url = format!("{}/products/{product_id}", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(unavailable)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(product_id));
        }
        response
            .error_for_status()
            .map_err(unavailable)?
            .json::<ProductInfo>()
            .await
            .map_err(unavailable)
    }

    async fn transfer_ownership(
        &self,
        product_id: i64,
        new_owner: &str,
        final_price: f64,
    ) -> Result<(), CatalogError> {
        let url = format!("{}/products/{product_id}/owner", self.endpoint);
        let response = self
            .client
            .put(&url)
            .json(&TransferBody {
                owner: new_owner,
                price: final_price,
            })
            .send()
            .await
            .map_err(unavailable)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(product_id));
        }
        response.error_for_status().map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_info_parses_catalog_json() {
        let info: ProductInfo =
            serde_json::from_str(r#"{"owner":"alice","product_type":"ONLY_SHOW","name":"x"}"#)
                .unwrap();
        assert_eq!(info.owner, "alice");
        assert!(!info.product_type.is_sellable());
    }
}
