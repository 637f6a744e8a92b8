//! Orders and order lines.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use inventory::ReservationKey;
use serde::{Deserialize, Serialize};

use crate::{OrderError, OrderStatus};

/// A requested product and quantity, as submitted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Merges repeated product ids, keeping first-occurrence order.
///
/// Rejects an empty list and zero quantities. The result is the order in
/// which stock is reserved, and compensation walks it backwards.
pub fn normalize_items(items: &[LineItem]) -> Result<Vec<LineItem>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    let mut merged: Vec<LineItem> = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
            });
        }
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(item.quantity).ok_or(
                    OrderError::InvalidQuantity {
                        product_id: item.product_id,
                    },
                )?;
            }
            None => merged.push(*item),
        }
    }
    Ok(merged)
}

/// Whether a line's stock is currently held by this order.
///
/// Persisted per line so compensation can resume after a crash. Every
/// reservation is keyed by `(order_id, line_no)` in the inventory ledger, so
/// a line left `Reserving` can be re-driven or released without knowing
/// whether its last call landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    /// No stock has been taken for this line.
    #[default]
    Unreserved,
    /// `DecreaseStock` was sent; its outcome is not yet recorded.
    Reserving,
    /// `DecreaseStock` succeeded for this line.
    Reserved,
    /// The reservation was returned with `IncreaseStock`.
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Unreserved => "unreserved",
            ReservationState::Reserving => "reserving",
            ReservationState::Reserved => "reserved",
            ReservationState::Released => "released",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationState {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreserved" => Ok(ReservationState::Unreserved),
            "reserving" => Ok(ReservationState::Reserving),
            "reserved" => Ok(ReservationState::Reserved),
            "released" => Ok(ReservationState::Released),
            other => Err(OrderError::Internal(format!(
                "unknown reservation state: {other}"
            ))),
        }
    }
}

/// One product line of an order.
///
/// Name and unit price are snapshots taken at creation; later catalog
/// edits never change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    pub reservation: ReservationState,
}

impl OrderLine {
    /// Builds an unreserved line. Fails if the subtotal overflows.
    pub fn new(
        line_no: u32,
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        let subtotal = unit_price
            .checked_mul(quantity)
            .ok_or(OrderError::InvalidQuantity { product_id })?;
        Ok(Self {
            line_no,
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
            subtotal,
            reservation: ReservationState::Unreserved,
        })
    }

    /// Key of this line's reservation in the inventory ledger.
    pub fn reservation_key(&self, order_id: OrderId) -> ReservationKey {
        ReservationKey::new(order_id, self.line_no)
    }

    /// True if the inventory ledger may hold stock for this line.
    pub fn may_hold_stock(&self) -> bool {
        matches!(
            self.reservation,
            ReservationState::Reserving | ReservationState::Reserved
        )
    }
}

/// An order as stored by the order ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Money,
    pub lines: Vec<OrderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order. The total is fixed here from the line
    /// subtotals and never recomputed; an overflowing total is rejected.
    pub fn new_pending(user_id: UserId, lines: Vec<OrderLine>) -> Result<Self, OrderError> {
        let now = Utc::now();
        let mut total = Money::zero();
        for line in &lines {
            total = total
                .checked_add(line.subtotal)
                .ok_or(OrderError::InvalidQuantity {
                    product_id: line.product_id,
                })?;
        }
        Ok(Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Pending,
            total,
            lines,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// True while a failed fulfillment is still returning stock.
    ///
    /// A pending order with a recorded failure reason must never be
    /// confirmed; recovery only finishes its compensation.
    pub fn is_compensating(&self) -> bool {
        self.status == OrderStatus::Pending && self.failure_reason.is_some()
    }

    /// Lines whose stock is or may be held, in reservation order.
    pub fn held_lines(&self) -> impl DoubleEndedIterator<Item = &OrderLine> {
        self.lines.iter().filter(|line| line.may_hold_stock())
    }

    /// Returns true if any line still holds stock.
    pub fn holds_stock(&self) -> bool {
        self.held_lines().next().is_some()
    }

    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }
}
