//! Order-posting client contract (spec.md §6), grounded in the shape of
//! `vault::execution::{OrderRequest, ExecutionAdapter}` in the teacher —
//! same `async_trait` boundary, collapsed to the single
//! `{asset, side, size, price}` surface the core actually needs. No
//! partial-fill reporting is modeled at this layer.

use async_trait::async_trait;

use crate::error::BotError;
use crate::models::Side;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderPostRequest {
    pub asset_id: String,
    pub side: Side,
    pub size: f64,
    pub price: f64,
}

#[async_trait]
pub trait OrderClient: Send + Sync {
    async fn post_order(&self, request: OrderPostRequest) -> Result<(), BotError>;
}

#[cfg(test)]
pub struct RecordingOrderClient {
    posted: parking_lot::Mutex<Vec<OrderPostRequest>>,
    fail_next: parking_lot::Mutex<Option<BotError>>,
}

#[cfg(test)]
impl RecordingOrderClient {
    pub fn new() -> Self {
        Self {
            posted: parking_lot::Mutex::new(Vec::new()),
            fail_next: parking_lot::Mutex::new(None),
        }
    }

    pub fn fail_next_with(&self, error: BotError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn posted(&self) -> Vec<OrderPostRequest> {
        self.posted.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl OrderClient for RecordingOrderClient {
    async fn post_order(&self, request: OrderPostRequest) -> Result<(), BotError> {
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        self.posted.lock().push(request);
        Ok(())
    }
}
