//! Order models. Line items snapshot the product's name, image and price at
//! purchase time so later catalog edits do not rewrite order history.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub payment_update_time: Option<String>,
    pub payment_email: Option<String>,
    pub tax_price: f64,
    pub shipping_price: f64,
    pub total_price: f64,
    pub is_paid: bool,
    pub paid_at: Option<String>,
    pub is_delivered: bool,
    pub delivered_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub name: String,
    pub image: String,
    pub price: f64,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResult {
    pub id: String,
    pub status: String,
    pub update_time: String,
    pub email_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product: String,
    pub name: String,
    pub image: String,
    pub price: f64,
    pub qty: i64,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product: item.product_id,
            name: item.name,
            image: item.image,
            price: item.price,
            qty: item.qty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub user: String,
    pub order_items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_result: Option<PaymentResult>,
    pub tax_price: f64,
    pub shipping_price: f64,
    pub total_price: f64,
    pub is_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
    pub is_delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
    pub created_at: String,
}

impl OrderResponse {
    pub fn from_parts(order: Order, items: Vec<OrderItem>) -> Self {
        let payment_result = match (
            order.payment_id,
            order.payment_status,
            order.payment_update_time,
            order.payment_email,
        ) {
            (Some(id), Some(status), Some(update_time), Some(email_address)) => {
                Some(PaymentResult {
                    id,
                    status,
                    update_time,
                    email_address,
                })
            }
            _ => None,
        };

        Self {
            id: order.id,
            user: order.user_id,
            order_items: items.into_iter().map(OrderItemResponse::from).collect(),
            shipping_address: ShippingAddress {
                address: order.shipping_address,
                city: order.shipping_city,
                postal_code: order.shipping_postal_code,
                country: order.shipping_country,
            },
            payment_method: order.payment_method,
            payment_result,
            tax_price: order.tax_price,
            shipping_price: order.shipping_price,
            total_price: order.total_price,
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            created_at: order.created_at,
        }
    }
}
