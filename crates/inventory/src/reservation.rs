//! Keys that make stock changes idempotent.

use common::OrderId;
use serde::{Deserialize, Serialize};

/// Identifies one order line's hold on stock.
///
/// A keyed decrement is applied at most once: replays return the remaining
/// stock without touching the counter. A keyed release returns the held
/// units at most once, and releasing a key that was never reserved leaves
/// a tombstone so a late decrement with that key is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationKey {
    pub order_id: OrderId,
    pub line_no: u32,
}

impl ReservationKey {
    pub fn new(order_id: OrderId, line_no: u32) -> Self {
        Self { order_id, line_no }
    }
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.order_id, self.line_no)
    }
}
