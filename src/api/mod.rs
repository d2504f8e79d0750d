pub mod auth;
pub mod error;
pub mod guard;
pub mod metrics;
mod orders;
mod products;
mod users;
mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_public = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-otp", post(auth::resend_otp))
        .route("/token", post(auth::authenticate_with_token));

    // Auth routes behind the access gate
    let auth_protected = Router::new()
        .route("/me", get(auth::me))
        .route("/refresh-token", post(auth::refresh_token))
        .route("/sessions", get(auth::sessions))
        .route("/service-token", post(auth::service_token))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_auth,
        ));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/vendors", post(users::create_vendor))
        .route("/profile", put(users::update_profile))
        .route("/password", put(users::update_password))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id", delete(users::delete_user))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_auth,
        ));

    // Catalog browsing is public; writes go through the gate
    let product_public = Router::new()
        .route("/", get(products::list_products))
        .route("/:id", get(products::get_product));

    let product_protected = Router::new()
        .route("/", post(products::create_product))
        .route("/vendor", get(products::vendor_products))
        .route("/:id", put(products::update_product))
        .route("/:id", delete(products::delete_product))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_auth,
        ));

    let order_routes = Router::new()
        .route("/", post(orders::create_order))
        .route("/", get(orders::list_orders))
        .route("/myorders", get(orders::my_orders))
        .route("/:id", get(orders::get_order))
        .route("/:id/pay", put(orders::pay_order))
        .route("/:id/deliver", put(orders::deliver_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_public.merge(auth_protected))
        .nest("/api/users", user_routes)
        .nest("/api/products", product_public.merge(product_protected))
        .nest("/api/orders", order_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
