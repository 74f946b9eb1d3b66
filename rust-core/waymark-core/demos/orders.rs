//! Small orders service.
//!
//! ```text
//! cargo run --example orders
//! curl -X POST localhost:8000/orders -H 'content-type: application/json' -d '{"quantity": 2}'
//! curl localhost:8000/orders/1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use waymark_core::{
    init_tracing, route_summaries, ControllerResult, Dto, FieldError, MetadataStore,
    RouteTableBuilder, Server, ServerConfig, ValidationErrors, ValidationResult,
};
use waymark_macros::controller;

#[derive(Debug, Deserialize)]
struct CreateOrder {
    sku: String,
    quantity: i64,
}

impl Dto for CreateOrder {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        match self.sku.trim().len() {
            0 => errors.add_required("sku"),
            len if len < 3 => errors.add(FieldError::too_short("sku", 3)),
            len if len > 32 => errors.add(FieldError::too_long("sku", 32)),
            _ => {}
        }
        if self.quantity < 1 {
            errors.add(FieldError::too_small("quantity", 1));
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Serialize)]
struct Order {
    id: u64,
    sku: String,
    quantity: i64,
}

#[derive(Default)]
struct OrdersController {
    orders: Mutex<Vec<Order>>,
}

#[controller("/orders")]
impl OrdersController {
    #[get]
    async fn list(&self) -> Result<ControllerResult, serde_json::Error> {
        let orders = self.orders.lock().map(|o| o.clone()).unwrap_or_default();
        ControllerResult::json(&orders)
    }

    #[get("/:id")]
    async fn show(&self, #[params] params: HashMap<String, String>) -> ControllerResult {
        let id = params.get("id").and_then(|id| id.parse::<u64>().ok());
        let found = self
            .orders
            .lock()
            .ok()
            .and_then(|orders| orders.iter().find(|o| Some(o.id) == id).cloned());

        match found.map(|order| ControllerResult::json(&order)) {
            Some(Ok(result)) => result,
            _ => ControllerResult::status(404),
        }
    }

    #[post]
    async fn create(
        &self,
        #[body(dto)] order: CreateOrder,
    ) -> Result<ControllerResult, serde_json::Error> {
        let mut orders = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let created = Order {
            id: orders.len() as u64 + 1,
            sku: order.sku,
            quantity: order.quantity,
        };
        orders.push(created.clone());
        Ok(ControllerResult::json(&created)?.with_status(201))
    }
}

#[derive(Default)]
struct HealthController;

#[controller]
impl HealthController {
    #[get("/health")]
    fn health(&self) -> ControllerResult {
        ControllerResult::text("ok")
    }
}

#[tokio::main]
async fn main() -> waymark_core::Result<()> {
    init_tracing("waymark_core=debug");

    let mut store = MetadataStore::new();
    store.register::<OrdersController>();
    store.register::<HealthController>();

    let routes = RouteTableBuilder::new(&store).build_all()?;
    for summary in route_summaries(&routes) {
        tracing::info!(
            method = %summary.method,
            path = %summary.path,
            handler = %summary.handler,
            "route"
        );
    }

    let config = ServerConfig {
        max_body_size: 64 * 1024,
        ..ServerConfig::default()
    };
    Server::new(routes)?.with_config(config).serve().await
}
