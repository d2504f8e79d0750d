//! Order endpoints: checkout, payment and delivery transitions, and
//! listings for customers and admins.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::guard::AuthContext;
use super::validation::{validate_amount, validate_qty};
use crate::db::{Order, OrderItem, OrderResponse, PaymentResult, Product, Role, ShippingAddress};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product: String,
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub tax_price: f64,
    pub shipping_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Serialize)]
pub struct OrderBodyResponse {
    pub order: OrderResponse,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub count: usize,
    pub orders: Vec<OrderResponse>,
}

async fn find_order(state: &AppState, id: &str) -> Result<Order, ApiError> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    order.ok_or_else(|| ApiError::not_found(format!("Order not found with id of {id}")))
}

async fn load_items(state: &AppState, order_id: &str) -> Result<Vec<OrderItem>, ApiError> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = ?")
        .bind(order_id)
        .fetch_all(&state.db)
        .await?;
    Ok(items)
}

/// Owner-or-admin object check for order access.
fn check_order_owner(order: &Order, ctx: &AuthContext, action: &str) -> Result<(), ApiError> {
    if order.user_id != ctx.user.id && ctx.user.role != Role::Admin {
        return Err(ApiError::forbidden(format!(
            "User {} is not authorized to {} this order",
            ctx.user.id, action
        )));
    }
    Ok(())
}

fn validate_create_request(req: &CreateOrderRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    for (i, item) in req.order_items.iter().enumerate() {
        if item.product.is_empty() {
            errors.add(format!("orderItems[{i}].product"), "Product ID is required");
        }
        if let Err(e) = validate_qty(item.qty) {
            errors.add(format!("orderItems[{i}].qty"), e);
        }
    }

    if req.shipping_address.address.trim().is_empty() {
        errors.add("shippingAddress.address", "Address is required");
    }
    if req.shipping_address.city.trim().is_empty() {
        errors.add("shippingAddress.city", "City is required");
    }
    if req.shipping_address.postal_code.trim().is_empty() {
        errors.add("shippingAddress.postalCode", "Postal code is required");
    }
    if req.shipping_address.country.trim().is_empty() {
        errors.add("shippingAddress.country", "Country is required");
    }
    if req.payment_method.trim().is_empty() {
        errors.add("paymentMethod", "Payment method is required");
    }

    if let Err(e) = validate_amount(req.tax_price, "Tax price") {
        errors.add("taxPrice", e);
    }
    if let Err(e) = validate_amount(req.shipping_price, "Shipping price") {
        errors.add("shippingPrice", e);
    }
    if let Err(e) = validate_amount(req.total_price, "Total price") {
        errors.add("totalPrice", e);
    }

    errors.finish()
}

/// Place an order
///
/// POST /api/orders (verified customer)
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderBodyResponse>), ApiError> {
    ctx.require_verified()?;
    ctx.authorize(&[Role::Customer])?;

    if req.order_items.is_empty() {
        return Err(ApiError::bad_request("No order items"));
    }
    validate_create_request(&req)?;

    // Check stock and snapshot catalog fields before touching anything
    let mut resolved: Vec<(Product, i64)> = Vec::with_capacity(req.order_items.len());
    for item in &req.order_items {
        let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE id = ?")
            .bind(&item.product)
            .fetch_optional(&state.db)
            .await?;
        let product = product.ok_or_else(|| {
            ApiError::not_found(format!("Product not found with id of {}", item.product))
        })?;

        if product.count_in_stock < item.qty {
            return Err(ApiError::bad_request(format!(
                "Product {} is out of stock",
                product.name
            )));
        }

        resolved.push((product, item.qty));
    }

    let order_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let mut tx = state.db.begin().await?;

    sqlx::query(
        "INSERT INTO orders (id, user_id, shipping_address, shipping_city, shipping_postal_code,
             shipping_country, payment_method, tax_price, shipping_price, total_price, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order_id)
    .bind(&ctx.user.id)
    .bind(&req.shipping_address.address)
    .bind(&req.shipping_address.city)
    .bind(&req.shipping_address.postal_code)
    .bind(&req.shipping_address.country)
    .bind(&req.payment_method)
    .bind(req.tax_price)
    .bind(req.shipping_price)
    .bind(req.total_price)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for (product, qty) in &resolved {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, name, image, price, qty)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&order_id)
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.image)
        .bind(product.price)
        .bind(qty)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE products SET count_in_stock = count_in_stock - ? WHERE id = ?")
            .bind(qty)
            .bind(&product.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let order = find_order(&state, &order_id).await?;
    let items = load_items(&state, &order_id).await?;

    info!(order_id = %order_id, user_id = %ctx.user.id, "Order created");

    Ok((
        StatusCode::CREATED,
        Json(OrderBodyResponse {
            order: OrderResponse::from_parts(order, items),
        }),
    ))
}

/// Get an order
///
/// GET /api/orders/:id (owner or admin)
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<OrderBodyResponse>, ApiError> {
    let order = find_order(&state, &id).await?;
    check_order_owner(&order, &ctx, "view")?;

    let items = load_items(&state, &id).await?;
    Ok(Json(OrderBodyResponse {
        order: OrderResponse::from_parts(order, items),
    }))
}

/// Mark an order as paid
///
/// PUT /api/orders/:id/pay (owner or admin)
pub async fn pay_order(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
    Json(payment): Json<PaymentResult>,
) -> Result<Json<OrderBodyResponse>, ApiError> {
    let order = find_order(&state, &id).await?;
    check_order_owner(&order, &ctx, "update")?;

    if order.is_paid {
        return Err(ApiError::bad_request("Order is already paid"));
    }

    sqlx::query(
        "UPDATE orders SET is_paid = 1, paid_at = ?, payment_id = ?, payment_status = ?,
             payment_update_time = ?, payment_email = ?
         WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&payment.id)
    .bind(&payment.status)
    .bind(&payment.update_time)
    .bind(&payment.email_address)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let order = find_order(&state, &id).await?;
    let items = load_items(&state, &id).await?;
    Ok(Json(OrderBodyResponse {
        order: OrderResponse::from_parts(order, items),
    }))
}

/// Mark an order as delivered
///
/// PUT /api/orders/:id/deliver (admin)
pub async fn deliver_order(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<OrderBodyResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let order = find_order(&state, &id).await?;

    if order.is_delivered {
        return Err(ApiError::bad_request("Order is already delivered"));
    }

    sqlx::query("UPDATE orders SET is_delivered = 1, delivered_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    let order = find_order(&state, &id).await?;
    let items = load_items(&state, &id).await?;
    Ok(Json(OrderBodyResponse {
        order: OrderResponse::from_parts(order, items),
    }))
}

/// List the caller's orders
///
/// GET /api/orders/myorders
pub async fn my_orders(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY datetime(created_at) DESC",
    )
    .bind(&ctx.user.id)
    .fetch_all(&state.db)
    .await?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in orders {
        let items = load_items(&state, &order.id).await?;
        responses.push(OrderResponse::from_parts(order, items));
    }

    Ok(Json(OrderListResponse {
        count: responses.len(),
        orders: responses,
    }))
}

/// List all orders
///
/// GET /api/orders (admin)
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<OrderListResponse>, ApiError> {
    ctx.authorize(&[Role::Admin])?;

    let orders: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders ORDER BY datetime(created_at) DESC")
            .fetch_all(&state.db)
            .await?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in orders {
        let items = load_items(&state, &order.id).await?;
        responses.push(OrderResponse::from_parts(order, items));
    }

    Ok(Json(OrderListResponse {
        count: responses.len(),
        orders: responses,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::User;
    use crate::test_util::{insert_product, insert_user, test_state};
    use crate::token::{decode_user_token, issue_user_token};
    use crate::AppState;

    fn ctx_for(user: &User, state: &AppState) -> AuthContext {
        let token = issue_user_token(user, &state.config.auth.jwt_secret, 30).unwrap();
        AuthContext {
            user: user.clone(),
            claims: decode_user_token(&token, &state.config.auth.jwt_secret).unwrap(),
        }
    }

    fn order_request(product_id: &str, qty: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            order_items: vec![OrderItemRequest {
                product: product_id.to_string(),
                qty,
            }],
            shipping_address: ShippingAddress {
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
            payment_method: "PayPal".to_string(),
            tax_price: 1.0,
            shipping_price: 2.0,
            total_price: 52.0,
        }
    }

    #[tokio::test]
    async fn test_create_order_snapshots_and_decrements_stock() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 5, &vendor.id).await;

        let (status, Json(body)) = create_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Json(order_request(&product_id, 2)),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.order.order_items.len(), 1);
        // Line items snapshot name and price from the catalog
        assert_eq!(body.order.order_items[0].name, "Keyboard");
        assert_eq!(body.order.order_items[0].price, 49.0);
        assert!(!body.order.is_paid);

        let stock: i64 = sqlx::query_scalar("SELECT count_in_stock FROM products WHERE id = ?")
            .bind(&product_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stock, 3);
    }

    #[tokio::test]
    async fn test_create_order_insufficient_stock() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 1, &vendor.id).await;

        let err = create_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Json(order_request(&product_id, 2)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        // No partial order, no stock change
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
        let stock: i64 = sqlx::query_scalar("SELECT count_in_stock FROM products WHERE id = ?")
            .bind(&product_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stock, 1);
    }

    #[tokio::test]
    async fn test_create_order_unknown_product() {
        let state = test_state().await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;

        let err = create_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Json(order_request("missing-product", 1)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_order_empty_items() {
        let state = test_state().await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;

        let mut req = order_request("x", 1);
        req.order_items.clear();
        let err = create_order(State(state.clone()), ctx_for(&customer, &state), Json(req))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_order_requires_customer_role() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 5, &vendor.id).await;

        let err = create_order(
            State(state.clone()),
            ctx_for(&vendor, &state),
            Json(order_request(&product_id, 1)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_get_order_owner_and_admin_only() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;
        let other = insert_user(&state.db, "O", "o@x.com", "secret1", Role::Customer, true).await;
        let admin = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Admin, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 5, &vendor.id).await;

        let (_, Json(created)) = create_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Json(order_request(&product_id, 1)),
        )
        .await
        .unwrap();
        let order_id = created.order.id.clone();

        let err = get_order(
            State(state.clone()),
            ctx_for(&other, &state),
            Path(order_id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let ok = get_order(
            State(state.clone()),
            ctx_for(&admin, &state),
            Path(order_id.clone()),
        )
        .await;
        assert!(ok.is_ok());

        let ok = get_order(State(state.clone()), ctx_for(&customer, &state), Path(order_id)).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_pay_order_transitions_once() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 5, &vendor.id).await;

        let (_, Json(created)) = create_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Json(order_request(&product_id, 1)),
        )
        .await
        .unwrap();
        let order_id = created.order.id.clone();

        let payment = PaymentResult {
            id: "PAY-1".to_string(),
            status: "COMPLETED".to_string(),
            update_time: "2026-01-01T00:00:00Z".to_string(),
            email_address: "c@x.com".to_string(),
        };

        let Json(body) = pay_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Path(order_id.clone()),
            Json(payment.clone()),
        )
        .await
        .unwrap();
        assert!(body.order.is_paid);
        assert!(body.order.paid_at.is_some());
        assert_eq!(body.order.payment_result.as_ref().unwrap().id, "PAY-1");

        let err = pay_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Path(order_id),
            Json(payment),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deliver_order_admin_only() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let customer =
            insert_user(&state.db, "C", "c@x.com", "secret1", Role::Customer, true).await;
        let admin = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Admin, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 5, &vendor.id).await;

        let (_, Json(created)) = create_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Json(order_request(&product_id, 1)),
        )
        .await
        .unwrap();
        let order_id = created.order.id.clone();

        let err = deliver_order(
            State(state.clone()),
            ctx_for(&customer, &state),
            Path(order_id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(body) = deliver_order(
            State(state.clone()),
            ctx_for(&admin, &state),
            Path(order_id.clone()),
        )
        .await
        .unwrap();
        assert!(body.order.is_delivered);

        let err = deliver_order(State(state.clone()), ctx_for(&admin, &state), Path(order_id))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_my_orders_and_admin_listing() {
        let state = test_state().await;
        let vendor = insert_user(&state.db, "V", "v@x.com", "secret1", Role::Vendor, true).await;
        let c1 = insert_user(&state.db, "C1", "c1@x.com", "secret1", Role::Customer, true).await;
        let c2 = insert_user(&state.db, "C2", "c2@x.com", "secret1", Role::Customer, true).await;
        let admin = insert_user(&state.db, "A", "a@x.com", "secret1", Role::Admin, true).await;
        let product_id = insert_product(&state.db, "Keyboard", 49.0, "electronics", 9, &vendor.id).await;

        create_order(
            State(state.clone()),
            ctx_for(&c1, &state),
            Json(order_request(&product_id, 1)),
        )
        .await
        .unwrap();
        create_order(
            State(state.clone()),
            ctx_for(&c2, &state),
            Json(order_request(&product_id, 1)),
        )
        .await
        .unwrap();

        let Json(body) = my_orders(State(state.clone()), ctx_for(&c1, &state))
            .await
            .unwrap();
        assert_eq!(body.count, 1);

        let err = list_orders(State(state.clone()), ctx_for(&c1, &state))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(body) = list_orders(State(state.clone()), ctx_for(&admin, &state))
            .await
            .unwrap();
        assert_eq!(body.count, 2);
    }
}
