//! Product catalog models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image: String,
    pub count_in_stock: i64,
    pub vendor_id: String,
    pub rating: f64,
    pub num_reviews: i64,
    pub created_at: String,
}

/// Product row joined with its vendor's public contact fields.
#[derive(Debug, Clone, FromRow)]
pub struct ProductWithVendor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image: String,
    pub count_in_stock: i64,
    pub vendor_id: String,
    pub rating: f64,
    pub num_reviews: i64,
    pub created_at: String,
    pub vendor_name: String,
    pub vendor_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorInfo {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image: String,
    pub count_in_stock: i64,
    pub rating: f64,
    pub num_reviews: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<VendorInfo>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price: p.price,
            category: p.category,
            image: p.image,
            count_in_stock: p.count_in_stock,
            rating: p.rating,
            num_reviews: p.num_reviews,
            created_at: p.created_at,
            vendor: None,
        }
    }
}

impl From<ProductWithVendor> for ProductResponse {
    fn from(p: ProductWithVendor) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price: p.price,
            category: p.category,
            image: p.image,
            count_in_stock: p.count_in_stock,
            rating: p.rating,
            num_reviews: p.num_reviews,
            created_at: p.created_at,
            vendor: Some(VendorInfo {
                id: p.vendor_id,
                name: p.vendor_name,
                email: p.vendor_email,
            }),
        }
    }
}
