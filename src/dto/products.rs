use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Product, Review};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub brand: String,
    pub price: i64,
    pub count_in_stock: i32,
    pub category: Uuid,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Multipart body accepted by product creation.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ProductForm {
    pub name: String,
    pub description: String,
    pub brand: String,
    pub price: i64,
    pub count_in_stock: i32,
    pub category: Uuid,
    #[schema(value_type = Vec<String>)]
    pub images: Vec<Vec<u8>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub price: Option<i64>,
    pub count_in_stock: Option<i32>,
    pub category: Option<Uuid>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FilterProductsRequest {
    #[serde(default)]
    pub checked: Vec<Uuid>,
    #[serde(default)]
    pub radio: Vec<i64>,
    #[serde(default)]
    pub brands: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub rating: i32,
    pub comment: String,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductWithCategory {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductCatalog {
    #[schema(value_type = Vec<ProductWithCategory>)]
    pub items: Vec<ProductWithCategory>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: Option<String>,
    pub reviews: Vec<Review>,
}
