//! Tool surface exposed to the conversational engine.
//!
//! Four deterministic handlers over the backend collaborator. The engine
//! decides *when* to call them; the handlers themselves never reason, they
//! fetch, default, and phrase. Errors are returned to the caller (the
//! session's tool boundary) rather than handled here, so the engine can
//! apologise and re-prompt while the session keeps running.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{OrderCreate, PizzaApi};
use crate::error::{ProntoError, Result};

/// Instructions handed to the conversational engine at session setup.
pub const AGENT_INSTRUCTIONS: &str = "\
You are a friendly, efficient pizza restaurant assistant. Use UK English spelling. \
Keep voice responses concise (one or two short sentences). \
Always use a tool when the user asks for information an API can provide; never invent data. \
After placing an order, call getOrder with the returned order_id, confirm the details, and say: \
\"Your order ID is #<id>. Please keep it handy.\" \
When asked for the menu or prices, call readMenu. \
Default size to \"regular\" and quantity to 1 if not specified; confirm defaults briefly. \
If a tool fails, briefly apologise and ask for the minimum missing detail to proceed.";

/// Name, description and JSON-schema argument shape of one exposed tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// The fixed tool configuration the session connects with.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "readMenu",
            description: "Reads the pizza menu to the user",
            parameters: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "placeOrder",
            description: "Place a pizza order",
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "number", "description": "Menu item id" },
                    "pizza_type": { "type": "string" },
                    "size": { "type": "string" },
                    "quantity": { "type": "number" },
                    "address": { "type": "string" }
                },
                "required": ["id", "pizza_type", "address"]
            }),
        },
        ToolDefinition {
            name: "checkStatus",
            description: "Check the status of a pizza order",
            parameters: json!({
                "type": "object",
                "properties": { "order_id": { "type": "number" } },
                "required": ["order_id"]
            }),
        },
        ToolDefinition {
            name: "getOrder",
            description: "Fetch a single order by ID and report its status",
            parameters: json!({
                "type": "object",
                "properties": { "order_id": { "type": "number" } },
                "required": ["order_id"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct PlaceOrderArgs {
    id: i64,
    pizza_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    quantity: Option<u32>,
    address: String,
}

#[derive(Debug, Deserialize)]
struct OrderIdArgs {
    order_id: i64,
}

/// Dispatches tool invocations to their deterministic handlers.
pub struct ToolRegistry {
    api: Arc<dyn PizzaApi>,
}

impl ToolRegistry {
    pub fn new(api: Arc<dyn PizzaApi>) -> Self {
        Self { api }
    }

    /// Execute one tool invocation.
    ///
    /// # Errors
    /// `UnknownTool` for names outside the surface, `MalformedEvent` for
    /// argument shapes that do not parse, and any backend error the handler
    /// ran into. Callers treat every error as a tool-level failure.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> Result<Value> {
        debug!(tool = name, "dispatching tool call");
        match name {
            "readMenu" => self.read_menu().await,
            "placeOrder" => self.place_order(Self::args(name, arguments)?).await,
            "checkStatus" => self.check_status(Self::args(name, arguments)?).await,
            "getOrder" => self.get_order(Self::args(name, arguments)?).await,
            other => Err(ProntoError::UnknownTool(other.to_string())),
        }
    }

    fn args<T: for<'de> Deserialize<'de>>(name: &str, arguments: &Value) -> Result<T> {
        serde_json::from_value(arguments.clone())
            .map_err(|e| ProntoError::MalformedEvent(format!("{name} arguments: {e}")))
    }

    async fn read_menu(&self) -> Result<Value> {
        let menu = self.api.menu().await?;
        let spoken = format!(
            "Here's our menu: {}",
            menu.values()
                .map(|item| format!("{} for {}", item.name, fmt_price(item.price)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(json!({ "spoken": spoken, "menu": menu }))
    }

    async fn place_order(&self, args: PlaceOrderArgs) -> Result<Value> {
        let req = OrderCreate {
            id: args.id,
            pizza_type: args.pizza_type,
            size: Some(args.size.unwrap_or_else(|| "regular".to_string())),
            quantity: Some(args.quantity.unwrap_or(1)),
            address: args.address,
        };
        let created = self.api.create_order(&req).await?;
        Ok(json!(format!(
            "Your order is confirmed! Order ID {oid}. I'll notify you as it's prepared and delivered. Remember order id {oid}.",
            oid = created.order_id
        )))
    }

    async fn check_status(&self, args: OrderIdArgs) -> Result<Value> {
        let order = self.api.order(args.order_id).await?;
        Ok(json!(format!(
            "Your order (#{}) is currently: {}.",
            args.order_id, order.status
        )))
    }

    async fn get_order(&self, args: OrderIdArgs) -> Result<Value> {
        let order = self.api.order(args.order_id).await?;
        let spoken = format!(
            "Order #{} is {}. {} {} {}.",
            order.order_id,
            order.status,
            order.quantity,
            order.size.as_deref().unwrap_or("regular"),
            order.pizza_type
        );
        Ok(json!({ "spoken": spoken, "order": order }))
    }
}

/// "$9" for whole prices, "$9.50" otherwise.
fn fmt_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("${}", price as i64)
    } else {
        format!("${price:.2}")
    }
}
