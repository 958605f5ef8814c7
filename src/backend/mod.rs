//! Backend collaborator client (menu / orders / ephemeral credential).
//!
//! The order service is an external HTTP collaborator; this module only
//! mirrors its wire shapes (snake_case JSON) and exposes them behind the
//! `PizzaApi` trait so tool handlers and tests never care whether they are
//! talking to the real service or an in-memory fake.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ProntoError, Result};

/// One menu entry as served by `GET /menu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub image: String,
    pub description: String,
}

/// Item key → menu entry. BTreeMap keeps the spoken summary deterministic.
pub type Menu = BTreeMap<String, MenuItem>;

/// Lifecycle state of a placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Preparing,
    Done,
    Delivered,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "created",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Done => "done",
            OrderStatus::Delivered => "delivered",
        };
        f.write_str(s)
    }
}

/// Request body for `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    /// Menu item id.
    pub id: i64,
    pub pizza_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    pub address: String,
}

/// Response of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: i64,
}

/// A placed order as served by `GET /orders/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub pizza_type: String,
    pub size: Option<String>,
    pub quantity: u32,
    pub address: String,
    pub status: OrderStatus,
}

/// Opaque short-lived token authorizing exactly one transport handshake.
///
/// Owned transiently by `connect()`; never cached beyond the handshake.
pub struct EphemeralCredential(String);

impl EphemeralCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the token itself.
        f.write_str("EphemeralCredential(..)")
    }
}

/// The backend surface the orchestrator consumes.
#[async_trait]
pub trait PizzaApi: Send + Sync {
    /// `GET /menu`.
    async fn menu(&self) -> Result<Menu>;

    /// `POST /orders`.
    async fn create_order(&self, req: &OrderCreate) -> Result<OrderCreated>;

    /// `GET /orders/{id}`.
    async fn order(&self, order_id: i64) -> Result<Order>;

    /// `POST /realtime/ephemeral`. A response without `client_secret.value`
    /// is fatal for `connect()`.
    async fn ephemeral_credential(&self) -> Result<EphemeralCredential>;
}

/// reqwest-backed implementation of [`PizzaApi`].
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-2xx response to `BackendStatus` with the body as detail.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(ProntoError::BackendStatus {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl PizzaApi for HttpBackend {
    async fn menu(&self) -> Result<Menu> {
        let resp = self.http.get(self.url("/menu")).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn create_order(&self, req: &OrderCreate) -> Result<OrderCreated> {
        debug!(menu_id = req.id, "placing order");
        let resp = self.http.post(self.url("/orders")).json(req).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn order(&self, order_id: i64) -> Result<Order> {
        let resp = self
            .http
            .get(self.url(&format!("/orders/{order_id}")))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn ephemeral_credential(&self) -> Result<EphemeralCredential> {
        let resp = self
            .http
            .post(self.url("/realtime/ephemeral"))
            .send()
            .await?;
        let body: Value = Self::check(resp).await?.json().await?;
        let secret = body
            .pointer("/client_secret/value")
            .and_then(Value::as_str)
            .ok_or(ProntoError::MissingCredential)?;
        Ok(EphemeralCredential::new(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn menu_deserializes_backend_payload() {
        let payload = json!({
            "margherita": {
                "id": 1,
                "name": "Margherita",
                "price": 9,
                "image": "/img/margherita.png",
                "description": "Tomato, mozzarella, basil"
            }
        });
        let menu: Menu = serde_json::from_value(payload).expect("deserialize menu");
        assert_eq!(menu["margherita"].name, "Margherita");
        assert_eq!(menu["margherita"].price, 9.0);
    }

    #[test]
    fn order_round_trips_with_snake_case_and_lowercase_status() {
        let order = Order {
            order_id: 2047,
            pizza_type: "Pepperoni".into(),
            size: Some("large".into()),
            quantity: 2,
            address: "221B Baker Street".into(),
            status: OrderStatus::Preparing,
        };
        let json = serde_json::to_value(&order).expect("serialize order");
        assert_eq!(json["order_id"], 2047);
        assert_eq!(json["pizza_type"], "Pepperoni");
        assert_eq!(json["status"], "preparing");

        let back: Order = serde_json::from_value(json).expect("deserialize order");
        assert_eq!(back, order);
    }

    #[test]
    fn order_create_omits_unset_size_and_quantity() {
        let req = OrderCreate {
            id: 7,
            pizza_type: "pepperoni".into(),
            size: None,
            quantity: None,
            address: "221B Baker Street".into(),
        };
        let json = serde_json::to_value(&req).expect("serialize request");
        assert!(json.get("size").is_none());
        assert!(json.get("quantity").is_none());
    }

    #[test]
    fn credential_debug_never_prints_the_secret() {
        let cred = EphemeralCredential::new("ek_live_supersecret");
        assert_eq!(format!("{cred:?}"), "EphemeralCredential(..)");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let backend = HttpBackend::new("http://localhost:8000/");
        assert_eq!(backend.url("/menu"), "http://localhost:8000/menu");
    }
}
