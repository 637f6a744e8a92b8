//! Fulfillment coordinator.
//!
//! Drives the order-creation saga: one forward step per order line
//! (`DecreaseStock`), each paired with an `IncreaseStock` compensation.
//! Both carry the line's reservation key, so the inventory ledger applies
//! each at most once however often the coordinator retries or resumes.
//! Every line's reservation state is persisted before and after its call,
//! so a restarted coordinator knows which lines may still hold stock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{OrderId, UserId};

use crate::client::{InventoryClient, InventoryClientError, RetryPolicy, with_retry};
use crate::order::normalize_items;
use crate::store::OrderStore;
use crate::{LineItem, Order, OrderError, OrderLine, OrderStatus, ReservationState, Result};

/// Reason recorded when a caller cancels a pending order.
pub const CANCELLED_BY_REQUEST: &str = "cancelled by request";

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub examined: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct Inner<S, C> {
    store: S,
    inventory: C,
    policy: RetryPolicy,
    in_flight: Arc<Mutex<HashSet<OrderId>>>,
}

/// Coordinates stock reservations for orders.
///
/// Only one saga runs per order at a time; a second attempt to create,
/// cancel, recover or update the same order while one is in flight fails
/// with [`OrderError::ConcurrencyConflict`]. Saga bodies run on their own
/// task, so a caller that stops waiting never interrupts a compensation.
pub struct FulfillmentCoordinator<S, C> {
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for FulfillmentCoordinator<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Flags the caller as gone when its future is dropped.
struct CallerLink(Arc<AtomicBool>);

impl Drop for CallerLink {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Releases an order id from the in-flight set when dropped.
pub(crate) struct InFlightGuard {
    set: Arc<Mutex<HashSet<OrderId>>>,
    id: OrderId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn is_gone(caller_gone: Option<&AtomicBool>) -> bool {
    caller_gone.is_some_and(|flag| flag.load(Ordering::Acquire))
}

impl<S, C> FulfillmentCoordinator<S, C>
where
    S: OrderStore + 'static,
    C: InventoryClient + 'static,
{
    /// Creates a new coordinator.
    pub fn new(store: S, inventory: C, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                inventory,
                policy,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    /// Returns the order store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Returns the inventory client.
    pub fn inventory(&self) -> &C {
        &self.inner.inventory
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Marks an order as having a saga in flight.
    pub(crate) fn claim(&self, id: OrderId) -> Result<InFlightGuard> {
        let mut set = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id) {
            return Err(OrderError::ConcurrencyConflict(id));
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.inner.in_flight),
            id,
        })
    }

    /// Creates an order and reserves stock for every line.
    ///
    /// Validation failures persist nothing. Once the order is persisted, it
    /// ends either `confirmed` with every line reserved, or `cancelled` with
    /// every reservation returned, in which case the error is
    /// [`OrderError::OrderCancelled`].
    ///
    /// If the caller drops this future mid-saga, the saga keeps running and
    /// treats the abandonment like a failed reservation: whatever was
    /// reserved is returned and the order is cancelled.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_order(&self, user_id: UserId, items: &[LineItem]) -> Result<Order> {
        let items = normalize_items(items)?;
        let lines = self.snapshot_lines(&items).await?;
        let order = Order::new_pending(user_id, lines)?;

        let caller_gone = Arc::new(AtomicBool::new(false));
        let _link = CallerLink(Arc::clone(&caller_gone));

        let this = self.clone();
        let saga = tokio::spawn(async move { this.run_creation(order, caller_gone).await });
        saga.await
            .map_err(|e| OrderError::Internal(format!("fulfillment task failed: {e}")))?
    }

    /// Reads every product and builds price snapshots, in submission order.
    async fn snapshot_lines(&self, items: &[LineItem]) -> Result<Vec<OrderLine>> {
        let mut lines = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let product = with_retry(&self.inner.policy, "get_product", || {
                self.inner.inventory.get_product(item.product_id)
            })
            .await?;

            if !product.is_active {
                return Err(OrderError::ProductUnavailable(product.id));
            }
            if product.stock < item.quantity {
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    requested: item.quantity,
                    available: product.stock,
                });
            }

            lines.push(OrderLine::new(
                index as u32 + 1,
                product.id,
                product.name,
                product.price,
                item.quantity,
            )?);
        }
        Ok(lines)
    }

    async fn run_creation(&self, order: Order, caller_gone: Arc<AtomicBool>) -> Result<Order> {
        let started = Instant::now();
        let _guard = self.claim(order.id)?;
        if caller_gone.load(Ordering::Acquire) {
            return Err(OrderError::Abandoned);
        }

        self.inner.store.insert(&order).await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, lines = order.lines.len(), total = %order.total, "fulfillment started");

        let result = self.drive_forward(&order, false, Some(&caller_gone)).await;
        metrics::histogram!("fulfillment_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Reserves the order's unreserved lines, then confirms it. On failure
    /// returns every reservation and cancels.
    async fn drive_forward(
        &self,
        order: &Order,
        recheck_stock: bool,
        caller_gone: Option<&AtomicBool>,
    ) -> Result<Order> {
        let reserved = match self.reserve_lines(order, recheck_stock, caller_gone).await {
            Ok(()) if is_gone(caller_gone) => Err(OrderError::Abandoned),
            other => other,
        };
        match reserved {
            Ok(()) => self.confirm(order.id).await,
            Err(cause) => {
                let reason = cause.to_string();
                match self.compensate(order.id, &reason).await {
                    Ok(_) => Err(OrderError::OrderCancelled {
                        order_id: order.id,
                        cause: Box::new(cause),
                    }),
                    Err(comp_err) => {
                        tracing::error!(
                            order_id = %order.id,
                            cause = %cause,
                            error = %comp_err,
                            "compensation incomplete, order left for recovery"
                        );
                        Err(comp_err)
                    }
                }
            }
        }
    }

    /// Reserves stock for each line not yet reserved, in line order.
    ///
    /// A line is marked `reserving` before its keyed `DecreaseStock` goes
    /// out and `reserved` once the ledger answers, so a crash or an
    /// unanswered call leaves a line that can be re-driven or released by
    /// key. Stops at the first failure.
    #[tracing::instrument(skip(self, order, caller_gone), fields(order_id = %order.id))]
    async fn reserve_lines(
        &self,
        order: &Order,
        recheck_stock: bool,
        caller_gone: Option<&AtomicBool>,
    ) -> Result<()> {
        let pending_lines = order.lines.iter().filter(|line| {
            matches!(
                line.reservation,
                ReservationState::Unreserved | ReservationState::Reserving
            )
        });

        for line in pending_lines {
            if is_gone(caller_gone) {
                return Err(OrderError::Abandoned);
            }

            if line.reservation == ReservationState::Unreserved {
                if recheck_stock {
                    let available = with_retry(&self.inner.policy, "check_stock", || {
                        self.inner.inventory.check_stock(line.product_id)
                    })
                    .await?;
                    if available < line.quantity {
                        return Err(OrderError::InsufficientStock {
                            product_id: line.product_id,
                            requested: line.quantity,
                            available,
                        });
                    }
                }
                self.inner
                    .store
                    .set_line_reservation(order.id, line.line_no, ReservationState::Reserving)
                    .await?;
            }

            let key = line.reservation_key(order.id);
            let reserved = with_retry(&self.inner.policy, "reserve_stock", || {
                self.inner
                    .inventory
                    .reserve_stock(key, line.product_id, line.quantity)
            })
            .await;

            if let Err(err) = reserved {
                // A definite refusal means the ledger holds nothing for the key.
                if !err.is_transient() {
                    let cleared = self
                        .inner
                        .store
                        .set_line_reservation(order.id, line.line_no, ReservationState::Unreserved)
                        .await;
                    if let Err(store_err) = cleared {
                        tracing::warn!(order_id = %order.id, line_no = line.line_no, error = %store_err, "could not clear reservation intent");
                    }
                }
                return Err(err.into());
            }

            self.inner
                .store
                .set_line_reservation(order.id, line.line_no, ReservationState::Reserved)
                .await?;
            tracing::debug!(order_id = %order.id, line_no = line.line_no, "line reserved");
        }
        Ok(())
    }

    async fn confirm(&self, id: OrderId) -> Result<Order> {
        let order = self
            .inner
            .store
            .transition(id, OrderStatus::Pending, OrderStatus::Confirmed)
            .await?;
        metrics::counter!("orders_confirmed_total").increment(1);
        tracing::info!(order_id = %id, "order confirmed");
        Ok(order)
    }

    async fn release_line(&self, order_id: OrderId, line: &OrderLine) -> Result<()> {
        let key = line.reservation_key(order_id);
        let released = with_retry(&self.inner.policy, "release_stock", || {
            self.inner
                .inventory
                .release_stock(key, line.product_id, line.quantity)
        })
        .await;

        match released {
            Ok(_) => Ok(()),
            // The product row is gone; there is nowhere to return stock to.
            Err(InventoryClientError::NotFound(product_id)) => {
                tracing::error!(%product_id, quantity = line.quantity, "product vanished, reservation dropped");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns every held line's stock, newest first, then cancels.
    ///
    /// The failure reason is recorded before any stock moves, which marks
    /// the order as compensating. Lines left `reserving` are released by key
    /// too: the ledger returns what the key holds, or fences it if nothing
    /// landed. If a release fails the order stays pending and compensating,
    /// and a later recovery pass resumes here; releases already applied are
    /// not repeated.
    #[tracing::instrument(skip(self))]
    async fn compensate(&self, id: OrderId, reason: &str) -> Result<Order> {
        let order = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotPending {
                status: order.status,
            });
        }
        if order.failure_reason.is_none() {
            self.inner.store.mark_failed(id, reason).await?;
        }

        metrics::counter!("fulfillment_compensations_total").increment(1);
        tracing::warn!(order_id = %id, reason, "compensating reservations");

        let mut first_failure = None;
        for line in order.held_lines().rev() {
            match self.release_line(id, line).await {
                Ok(()) => {
                    self.inner
                        .store
                        .set_line_reservation(id, line.line_no, ReservationState::Released)
                        .await?;
                }
                Err(err) => {
                    tracing::error!(order_id = %id, line_no = line.line_no, error = %err, "failed to release reservation");
                    first_failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        let cancelled = self
            .inner
            .store
            .transition(id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await?;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::warn!(order_id = %id, reason, "order cancelled");
        Ok(cancelled)
    }

    /// Cancels a pending order and returns any stock it holds.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let guard = self.claim(id)?;
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.compensate(id, CANCELLED_BY_REQUEST).await
        });
        task.await
            .map_err(|e| OrderError::Internal(format!("cancellation task failed: {e}")))?
    }

    /// Finishes whatever a pending order's saga left undone.
    ///
    /// A compensating order is driven to `cancelled`. Otherwise lines left
    /// `reserving` are replayed by key, and unreserved lines are reserved
    /// after re-checking live stock; the order is confirmed, or cancelled
    /// if that fails. Non-pending orders are returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, id: OrderId) -> Result<Order> {
        let guard = self.claim(id)?;
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.resume_claimed(id).await
        });
        task.await
            .map_err(|e| OrderError::Internal(format!("recovery task failed: {e}")))?
    }

    async fn resume_claimed(&self, id: OrderId) -> Result<Order> {
        let order = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or(OrderError::OrderNotFound(id))?;

        if order.status != OrderStatus::Pending {
            return Ok(order);
        }
        if let Some(reason) = order.failure_reason.as_deref() {
            tracing::info!(order_id = %id, "resuming compensation");
            return self.compensate(id, reason).await;
        }

        tracing::info!(order_id = %id, "resuming reservations");
        self.drive_forward(&order, true, None).await
    }

    /// Resumes every pending order older than `grace`.
    ///
    /// Orders with a saga currently in flight are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn recover_pending(&self, grace: Duration) -> Result<RecoveryReport> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| OrderError::Internal(format!("invalid grace period: {e}")))?;
        let stale = self.inner.store.list_pending(Utc::now() - grace).await?;

        let mut report = RecoveryReport {
            examined: stale.len(),
            ..RecoveryReport::default()
        };
        for id in stale {
            match self.resume(id).await {
                Ok(order) if order.status == OrderStatus::Confirmed => report.confirmed += 1,
                Ok(order) if order.status == OrderStatus::Cancelled => report.cancelled += 1,
                Ok(_) => report.skipped += 1,
                Err(OrderError::ConcurrencyConflict(_)) => report.skipped += 1,
                Err(OrderError::OrderCancelled { .. }) => report.cancelled += 1,
                Err(err) => {
                    tracing::warn!(order_id = %id, error = %err, "recovery attempt failed");
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            tracing::info!(?report, "recovery sweep finished");
        }
        Ok(report)
    }
}
