//! Product catalog endpoints. Browsing is public; writes require an
//! authenticated, verified account and ownership (or admin) for mutations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::auth::MessageResponse;
use super::error::{ApiError, ValidationErrorBuilder};
use super::guard::AuthContext;
use super::validation::{
    validate_amount, validate_pagination, validate_product_description, validate_product_name,
    validate_stock,
};
use crate::db::{Product, ProductResponse, ProductWithVendor, Role};
use crate::AppState;

const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.description, p.price, p.category, p.image, \
     p.count_in_stock, p.vendor_id, p.rating, p.num_reviews, p.created_at, \
     u.name AS vendor_name, u.email AS vendor_email \
     FROM products p JOIN users u ON u.id = p.vendor_id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub pages: i64,
    pub page: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<u32>,
}

impl Pagination {
    fn build(total: i64, page: u32, limit: u32) -> Self {
        let pages = (total + i64::from(limit) - 1) / i64::from(limit);
        Self {
            total,
            pages,
            page,
            limit,
            next: (i64::from(page) < pages).then(|| page + 1),
            prev: (page > 1).then(|| page - 1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub count: usize,
    pub pagination: Pagination,
    pub products: Vec<ProductResponse>,
}

#[derive(Debug, Serialize)]
pub struct ProductBodyResponse {
    pub product: ProductResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image: Option<String>,
    pub count_in_stock: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub count_in_stock: Option<i64>,
}

/// Map a client sort expression (comma-separated fields, `-` prefix for
/// descending) onto a safe ORDER BY clause. Unknown fields are ignored.
fn order_clause(sort: Option<&str>) -> String {
    let mut terms = Vec::new();
    if let Some(sort) = sort {
        for field in sort.split(',') {
            let field = field.trim();
            let (field, direction) = match field.strip_prefix('-') {
                Some(f) => (f, "DESC"),
                None => (field, "ASC"),
            };
            let column = match field {
                "price" => "p.price",
                "name" => "p.name",
                "rating" => "p.rating",
                "createdAt" => "datetime(p.created_at)",
                _ => continue,
            };
            terms.push(format!("{column} {direction}"));
        }
    }

    if terms.is_empty() {
        "datetime(p.created_at) DESC".to_string()
    } else {
        terms.join(", ")
    }
}

async fn find_product(state: &AppState, id: &str) -> Result<Product, ApiError> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    product.ok_or_else(|| ApiError::not_found(format!("Product not found with id of {id}")))
}

/// Owner-or-admin object check for product mutations.
fn check_product_owner(product: &Product, ctx: &AuthContext, action: &str) -> Result<(), ApiError> {
    if product.vendor_id != ctx.user.id && ctx.user.role != Role::Admin {
        return Err(ApiError::forbidden(format!(
            "User {} is not authorized to {} this product",
            ctx.user.id, action
        )));
    }
    Ok(())
}

/// List products with filtering, search, sorting and pagination
///
/// GET /api/products (public)
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProductListQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);
    validate_pagination(page, limit).map_err(|e| ApiError::bad_request(e))?;

    let search_like = params
        .search
        .as_ref()
        .map(|s| format!("%{}%", s.trim()));

    let mut conditions: Vec<&str> = Vec::new();
    if search_like.is_some() {
        conditions.push("(p.name LIKE ? OR p.description LIKE ? OR p.category LIKE ?)");
    }
    if params.category.is_some() {
        conditions.push("p.category = ?");
    }
    if params.min_price.is_some() {
        conditions.push("p.price >= ?");
    }
    if params.max_price.is_some() {
        conditions.push("p.price <= ?");
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM products p{where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(s) = &search_like {
        count_query = count_query.bind(s).bind(s).bind(s);
    }
    if let Some(c) = &params.category {
        count_query = count_query.bind(c);
    }
    if let Some(min) = params.min_price {
        count_query = count_query.bind(min);
    }
    if let Some(max) = params.max_price {
        count_query = count_query.bind(max);
    }
    let total = count_query.fetch_one(&state.db).await?;

    let select_sql = format!(
        "{PRODUCT_SELECT}{where_clause} ORDER BY {} LIMIT ? OFFSET ?",
        order_clause(params.sort.as_deref())
    );
    let mut select_query = sqlx::query_as::<_, ProductWithVendor>(&select_sql);
    if let Some(s) = &search_like {
        select_query = select_query.bind(s).bind(s).bind(s);
    }
    if let Some(c) = &params.category {
        select_query = select_query.bind(c);
    }
    if let Some(min) = params.min_price {
        select_query = select_query.bind(min);
    }
    if let Some(max) = params.max_price {
        select_query = select_query.bind(max);
    }
    let products: Vec<ProductWithVendor> = select_query
        .bind(i64::from(limit))
        .bind(i64::from((page - 1) * limit))
        .fetch_all(&state.db)
        .await?;

    let products: Vec<ProductResponse> =
        products.into_iter().map(ProductResponse::from).collect();

    Ok(Json(ProductListResponse {
        count: products.len(),
        pagination: Pagination::build(total, page, limit),
        products,
    }))
}

/// Get a single product
///
/// GET /api/products/:id (public)
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProductBodyResponse>, ApiError> {
    let sql = format!("{PRODUCT_SELECT} WHERE p.id = ?");
    let product: Option<ProductWithVendor> = sqlx::query_as(&sql)
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;

    let product = product
        .ok_or_else(|| ApiError::not_found(format!("Product not found with id of {id}")))?;

    Ok(Json(ProductBodyResponse {
        product: product.into(),
    }))
}

/// Create a product owned by the caller
///
/// POST /api/products (verified vendor or customer)
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductBodyResponse>), ApiError> {
    ctx.require_verified()?;
    ctx.authorize(&[Role::Vendor, Role::Customer])?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_product_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_product_description(&req.description) {
        errors.add("description", e);
    }
    if let Err(e) = validate_amount(req.price, "Price") {
        errors.add("price", e);
    }
    if req.category.trim().is_empty() {
        errors.add("category", "Category is required");
    }
    if let Err(e) = validate_stock(req.count_in_stock) {
        errors.add("countInStock", e);
    }
    errors.finish()?;

    let id = uuid::Uuid::new_v4().to_string();
    let image = req
        .image
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| "no-image.jpg".to_string());

    sqlx::query(
        "INSERT INTO products (id, name, description, price, category, image, count_in_stock, vendor_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(req.price)
    .bind(req.category.trim())
    .bind(&image)
    .bind(req.count_in_stock)
    .bind(&ctx.user.id)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    let product = find_product(&state, &id).await?;

    info!(product_id = %id, vendor_id = %ctx.user.id, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(ProductBodyResponse {
            product: product.into(),
        }),
    ))
}

/// Update a product
///
/// PUT /api/products/:id (vendor; owner or admin)
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductBodyResponse>, ApiError> {
    ctx.authorize(&[Role::Vendor])?;

    let product = find_product(&state, &id).await?;
    check_product_owner(&product, &ctx, "update")?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        if let Err(e) = validate_product_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(description) = &req.description {
        if let Err(e) = validate_product_description(description) {
            errors.add("description", e);
        }
    }
    if let Some(price) = req.price {
        if let Err(e) = validate_amount(price, "Price") {
            errors.add("price", e);
        }
    }
    if let Some(count) = req.count_in_stock {
        if let Err(e) = validate_stock(count) {
            errors.add("countInStock", e);
        }
    }
    errors.finish()?;

    let name = req.name.as_deref().map(str::trim).unwrap_or(&product.name);
    let description = req.description.as_deref().unwrap_or(&product.description);
    let price = req.price.unwrap_or(product.price);
    let category = req.category.as_deref().unwrap_or(&product.category);
    let image = req.image.as_deref().unwrap_or(&product.image);
    let count_in_stock = req.count_in_stock.unwrap_or(product.count_in_stock);

    sqlx::query(
        "UPDATE products SET name = ?, description = ?, price = ?, category = ?, image = ?, count_in_stock = ?
         WHERE id = ?",
    )
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(category)
    .bind(image)
    .bind(count_in_stock)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let product = find_product(&state, &id).await?;
    Ok(Json(ProductBodyResponse {
        product: product.into(),
    }))
}

/// Delete a product
///
/// DELETE /api/products/:id (vendor; owner or admin)
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    ctx.authorize(&[Role::Vendor])?;

    let product = find_product(&state, &id).await?;
    check_product_owner(&product, &ctx, "delete")?;

    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    info!(product_id = %id, "Product deleted");

    Ok(Json(MessageResponse {
        message: "Product deleted successfully".to_string(),
    }))
}

/// List the caller's own products
///
/// GET /api/products/vendor (vendor)
pub async fn vendor_products(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(params): Query<PageQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    ctx.authorize(&[Role::Vendor])?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);
    validate_pagination(page, limit).map_err(|e| ApiError::bad_request(e))?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE vendor_id = ?")
        .bind(&ctx.user.id)
        .fetch_one(&state.db)
        .await?;

    let products: Vec<Product> = sqlx::query_as(
        "SELECT * FROM products WHERE vendor_id = ?
         ORDER BY datetime(created_at) DESC LIMIT ? OFFSET ?",
    )
    .bind(&ctx.user.id)
    .bind(i64::from(limit))
    .bind(i64::from((page - 1) * limit))
    .fetch_all(&state.db)
    .await?;

    let products: Vec<ProductResponse> =
        products.into_iter().map(ProductResponse::from).collect();

    Ok(Json(ProductListResponse {
        count: products.len(),
        pagination: Pagination::build(total, page, limit),
        products,
    }))
}
