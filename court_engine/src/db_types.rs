use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use court_common::Paise;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::court_api::errors::CourtError;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion from string: {0}")]
pub struct ConversionError(String);

/// Generates `Display` and `FromStr` for the plain, snake_case text enums that are stored in the database.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(Self::$variant => $text),+
                };
                f.write_str(s)
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("Invalid {}: {s}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------       Roles         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Vendor,
    Admin,
    System,
}

text_enum!(Role { Customer => "customer", Vendor => "vendor", Admin => "admin", System => "system" });

/// The authenticated party performing an operation. Authentication itself happens outside the engine; the engine
/// trusts the identity it is handed and only checks court membership and ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub court_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role, court_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), role, court_id: court_id.into() }
    }

    pub fn customer(user_id: impl Into<String>, court_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Customer, court_id)
    }

    /// Vendor identities use the vendor id as their user id.
    pub fn vendor(vendor_id: impl Into<String>, court_id: impl Into<String>) -> Self {
        Self::new(vendor_id, Role::Vendor, court_id)
    }

    pub fn admin(user_id: impl Into<String>, court_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin, court_id)
    }

    pub fn system(court_id: impl Into<String>) -> Self {
        Self { user_id: "system".into(), role: Role::System, court_id: court_id.into() }
    }

    /// The label recorded in status history and audit entries, e.g. `vendor:v-42`
    pub fn label(&self) -> String {
        format!("{}:{}", self.role, self.user_id)
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.label(), self.court_id)
    }
}

//--------------------------------------       Court         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CourtStatus {
    Active,
    Inactive,
    Suspended,
}

text_enum!(CourtStatus { Active => "active", Inactive => "inactive", Suspended => "suspended" });

pub const DEFAULT_PLATFORM_FEE_BPS: i64 = 250;

/// Per-court business rules. These are data, not code: every court can carry its own values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtSettings {
    pub platform_fee_bps: i64,
    pub min_order_amount: Paise,
    pub max_order_amount: Option<Paise>,
    pub cancellation_window_minutes: i64,
    pub auto_accept: bool,
}

impl Default for CourtSettings {
    fn default() -> Self {
        Self {
            platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
            min_order_amount: Paise::default(),
            max_order_amount: None,
            cancellation_window_minutes: 5,
            auto_accept: false,
        }
    }
}

impl CourtSettings {
    /// Checks a checkout total against the court's minimum and maximum order amounts.
    pub fn check_order_total(&self, total: Paise) -> Result<(), CourtError> {
        if total < self.min_order_amount {
            return Err(CourtError::validation(format!(
                "The minimum order in this court is {}. Your cart comes to {total}",
                self.min_order_amount
            )));
        }
        match self.max_order_amount {
            Some(max) if total > max => Err(CourtError::validation(format!(
                "The maximum order in this court is {max}. Your cart comes to {total}"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Court {
    pub id: String,
    pub name: String,
    pub status: CourtStatus,
    pub platform_fee_bps: i64,
    pub min_order_amount: Paise,
    pub max_order_amount: Option<Paise>,
    pub cancellation_window_minutes: i64,
    pub auto_accept: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Court {
    pub fn settings(&self) -> CourtSettings {
        CourtSettings {
            platform_fee_bps: self.platform_fee_bps,
            min_order_amount: self.min_order_amount,
            max_order_amount: self.max_order_amount,
            cancellation_window_minutes: self.cancellation_window_minutes,
            auto_accept: self.auto_accept,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CourtStatus::Active
    }
}

//--------------------------------------   Vendors & Menu    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Vendor {
    pub id: String,
    pub court_id: String,
    pub name: String,
    pub rating: f64,
    pub total_ratings: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub id: String,
    pub court_id: String,
    pub vendor_id: String,
    pub name: String,
    pub price: Paise,
    pub is_active: bool,
    pub in_stock: bool,
}

impl MenuItem {
    pub fn is_available(&self) -> bool {
        self.is_active && self.in_stock
    }
}

//--------------------------------------        Cart         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    CheckedOut,
    Abandoned,
}

text_enum!(CartStatus { Active => "active", CheckedOut => "checked_out", Abandoned => "abandoned" });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CartLine {
    pub id: i64,
    pub cart_id: i64,
    pub menu_item_id: String,
    pub vendor_id: String,
    pub name: String,
    pub unit_price: Paise,
    pub quantity: i64,
    pub subtotal: Paise,
    pub customizations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Cart {
    pub id: i64,
    pub court_id: String,
    pub customer_id: String,
    pub status: CartStatus,
    pub total: Paise,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of the line subtotals. After any successful mutation this equals `total`.
    pub fn line_total(&self) -> Paise {
        self.lines.iter().map(|l| l.subtotal).sum()
    }
}

/// The most units of one item that a single cart or order line may carry.
pub const MAX_LINE_QUANTITY: i64 = 999;
/// The highest unit price, in paise, that a line may carry (₹10,00,000).
pub const MAX_UNIT_PRICE: i64 = 100_000_000;

/// Checks a line's quantity and unit price against the line limits, and returns its subtotal.
pub fn line_subtotal(unit_price: Paise, quantity: i64) -> Result<Paise, CourtError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(CourtError::validation(format!("Quantity must be between 1 and {MAX_LINE_QUANTITY}")));
    }
    if !(1..=MAX_UNIT_PRICE).contains(&unit_price.value()) {
        return Err(CourtError::validation(format!("Unit price {unit_price} is outside the allowed range")));
    }
    unit_price.checked_mul(quantity).ok_or_else(|| CourtError::validation("Line subtotal is too large"))
}

/// A line to be written into a cart. The unit price is the snapshot taken from the menu item at the time of adding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartLine {
    pub menu_item_id: String,
    pub vendor_id: String,
    pub name: String,
    pub unit_price: Paise,
    pub quantity: i64,
    pub customizations: Option<String>,
}

impl NewCartLine {
    pub fn from_menu_item(item: &MenuItem, quantity: i64, customizations: Option<String>) -> Self {
        Self {
            menu_item_id: item.id.clone(),
            vendor_id: item.vendor_id.clone(),
            name: item.name.clone(),
            unit_price: item.price,
            quantity,
            customizations,
        }
    }
}

//--------------------------------------       Orders        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Placed, awaiting payment or vendor acceptance
    Pending,
    Confirmed,
    Preparing,
    /// Ready for pickup
    Ready,
    Completed,
    Cancelled,
    Rejected,
}

text_enum!(OrderStatusType {
    Pending => "pending",
    Confirmed => "confirmed",
    Preparing => "preparing",
    Ready => "ready",
    Completed => "completed",
    Cancelled => "cancelled",
    Rejected => "rejected",
});

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Position along the happy path. Terminal failure states have no rank.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Preparing => Some(2),
            Self::Ready => Some(3),
            Self::Completed => Some(4),
            Self::Cancelled | Self::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Refunded,
}

text_enum!(OrderPaymentStatus { Unpaid => "unpaid", Pending => "pending", Paid => "paid", Refunded => "refunded" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    CashOnDelivery,
}

text_enum!(PaymentMethod { Online => "online", CashOnDelivery => "cash_on_delivery" });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: String,
    pub name: String,
    pub unit_price: Paise,
    pub quantity: i64,
    pub subtotal: Paise,
    pub customizations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatusType,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The append-only status history of an order.
///
/// The history is never edited in place. Appending produces a new history value that replaces the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHistory(Vec<StatusHistoryEntry>);

impl StatusHistory {
    pub fn with_entry(&self, entry: StatusHistoryEntry) -> Self {
        let mut entries = self.0.clone();
        entries.push(entry);
        Self(entries)
    }

    pub fn entries(&self) -> &[StatusHistoryEntry] {
        &self.0
    }

    pub fn last(&self) -> Option<&StatusHistoryEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if timestamps never decrease along the history
    pub fn is_monotonic(&self) -> bool {
        self.0.windows(2).all(|w| w[0].created_at <= w[1].created_at)
    }
}

impl From<Vec<StatusHistoryEntry>> for StatusHistory {
    fn from(entries: Vec<StatusHistoryEntry>) -> Self {
        Self(entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub court_id: String,
    pub parent_order_id: Option<i64>,
    pub is_sub_order: bool,
    /// `None` for a parent order that spans several vendors
    pub vendor_id: Option<String>,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub subtotal: Paise,
    pub total: Paise,
    pub payment_status: OrderPaymentStatus,
    pub payment_method: PaymentMethod,
    pub cancellation_reason: Option<String>,
    pub rating: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub preparing_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub lines: Vec<OrderLine>,
    #[sqlx(skip)]
    pub history: StatusHistory,
}

impl Order {
    /// True for a multi-vendor parent order, which carries no lines of its own.
    pub fn is_parent(&self) -> bool {
        !self.is_sub_order && self.vendor_id.is_none()
    }

    /// The id of the top-level order this order belongs to. Used to name the order's notification room.
    pub fn root_id(&self) -> i64 {
        self.parent_order_id.unwrap_or(self.id)
    }

    pub fn belongs_to_vendor(&self, vendor_id: &str) -> bool {
        self.vendor_id.as_deref() == Some(vendor_id)
    }
}

/// Everything required to insert a single order row, with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: String,
    pub court_id: String,
    pub vendor_id: Option<String>,
    pub customer_id: String,
    pub is_sub_order: bool,
    pub status: OrderStatusType,
    pub subtotal: Paise,
    pub total: Paise,
    pub payment_status: OrderPaymentStatus,
    pub payment_method: PaymentMethod,
    pub lines: Vec<NewOrderLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub menu_item_id: String,
    pub name: String,
    pub unit_price: Paise,
    pub quantity: i64,
    pub customizations: Option<String>,
}

impl NewOrderLine {
    /// Lines are checked with [`line_subtotal`] before they get here, so this only saturates on bad input.
    pub fn subtotal(&self) -> Paise {
        Paise::from(self.unit_price.value().saturating_mul(self.quantity))
    }
}

impl From<&CartLine> for NewOrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            menu_item_id: line.menu_item_id.clone(),
            name: line.name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            customizations: line.customizations.clone(),
        }
    }
}

//--------------------------------------      Payments       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatusType {
    Created,
    Processing,
    Completed,
    Failed,
}

text_enum!(PaymentStatusType {
    Created => "created",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Paid,
}

text_enum!(PayoutStatus { Pending => "pending", Processing => "processing", Paid => "paid" });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    /// The root order this payment settles: the parent order for multi-vendor checkouts
    pub order_id: i64,
    pub court_id: String,
    pub amount: Paise,
    pub method: PaymentMethod,
    pub status: PaymentStatusType,
    pub vendor_payout_status: PayoutStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub court_id: String,
    pub amount: Paise,
    pub method: PaymentMethod,
}

/// The share of a completed payment that is owed to one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentAllocation {
    pub id: i64,
    pub payment_id: i64,
    pub order_id: i64,
    pub court_id: String,
    pub vendor_id: String,
    pub amount: Paise,
    pub payout_status: PayoutStatus,
    pub payout_batch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAllocation {
    pub order_id: i64,
    pub vendor_id: String,
    pub amount: Paise,
}

//--------------------------------------  Vendor accounts    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayAccountStatus {
    Created,
    Activated,
    Suspended,
}

text_enum!(GatewayAccountStatus { Created => "created", Activated => "activated", Suspended => "suspended" });

/// A vendor's linked account at the payment gateway, used as the destination of payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VendorAccount {
    pub vendor_id: String,
    pub court_id: String,
    pub gateway_account_id: String,
    pub fund_account_id: Option<String>,
    pub activation_status: GatewayAccountStatus,
    pub funds_on_hold: bool,
    pub updated_at: DateTime<Utc>,
}

impl VendorAccount {
    /// Payouts may only go to activated accounts with a fund account and no hold on funds.
    pub fn can_receive_payouts(&self) -> bool {
        self.activation_status == GatewayAccountStatus::Activated &&
            !self.funds_on_hold &&
            self.fund_account_id.as_ref().is_some_and(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorAccountUpdate {
    pub activation_status: Option<GatewayAccountStatus>,
    pub funds_on_hold: Option<bool>,
}

impl VendorAccountUpdate {
    pub fn with_status(mut self, status: GatewayAccountStatus) -> Self {
        self.activation_status = Some(status);
        self
    }

    pub fn with_funds_on_hold(mut self, on_hold: bool) -> Self {
        self.funds_on_hold = Some(on_hold);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.activation_status.is_none() && self.funds_on_hold.is_none()
    }
}

//--------------------------------------   Payout batches    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutBatchStatus {
    /// Allocations are claimed, but the transfer has not been confirmed by the gateway yet
    Initiated,
    Processing,
    Processed,
    Failed,
}

text_enum!(PayoutBatchStatus {
    Initiated => "initiated",
    Processing => "processing",
    Processed => "processed",
    Failed => "failed",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PayoutBatch {
    pub id: i64,
    pub court_id: String,
    pub vendor_id: String,
    pub gross_amount: Paise,
    pub platform_fee: Paise,
    pub vendor_amount: Paise,
    pub transfer_id: Option<String>,
    pub status: PayoutBatchStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub payment_ids: Vec<i64>,
}

//--------------------------------------     Audit log       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub court_id: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub court_id: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub detail: Option<String>,
}

impl NewAuditEntry {
    pub fn new<E: Display, A: Into<String>>(entity_type: &str, entity_id: E, action: A, actor: &str) -> Self {
        Self {
            court_id: None,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.into(),
            actor: actor.to_string(),
            detail: None,
        }
    }

    pub fn with_court<S: Into<String>>(mut self, court_id: S) -> Self {
        self.court_id = Some(court_id.into());
        self
    }

    pub fn with_detail<S: Into<String>>(mut self, detail: S) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
