//! Payments and their status machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::SettlementError;

/// Currency recorded on every payment.
pub const DEFAULT_CURRENCY: &str = "IDR";

/// The lifecycle status of a payment.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Success ──► Refunded
///    │            │
///    ├────────────┴──► Failed
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    fn successors(&self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Pending => &[Processing, Failed, Cancelled],
            Processing => &[Success, Failed],
            Success => &[Refunded],
            Failed | Refunded | Cancelled => &[],
        }
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Returns true if `later` is reachable from this status in one or
    /// more legal moves.
    pub fn precedes(&self, later: PaymentStatus) -> bool {
        self.successors()
            .iter()
            .any(|next| *next == later || next.precedes(later))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(SettlementError::InvalidStatus(other.to_string())),
        }
    }
}

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    EWallet,
    VirtualAccount,
    Qris,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::EWallet => "e_wallet",
            PaymentMethod::VirtualAccount => "virtual_account",
            PaymentMethod::Qris => "qris",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "e_wallet" => Ok(PaymentMethod::EWallet),
            "virtual_account" => Ok(PaymentMethod::VirtualAccount),
            "qris" => Ok(PaymentMethod::Qris),
            other => Err(SettlementError::InvalidMethod(other.to_string())),
        }
    }
}

/// The idempotency key of a payment, handed to the provider at creation
/// and echoed back on every callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generates `TXN-<unix nanos>-<8 hex chars>`.
    pub fn generate() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("TXN-{}-{}", nanos, &suffix[..8]))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: TransactionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a pending payment with a fresh transaction id.
    pub fn new_pending(
        user_id: UserId,
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            method,
            status: PaymentStatus::Pending,
            transaction_id: TransactionId::generate(),
            provider_ref: None,
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
