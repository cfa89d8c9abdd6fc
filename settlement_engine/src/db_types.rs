use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use log::error;
use msl_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion from string: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        OrderId        ---------------------------------------------------

/// The storefront's identifier for an order. Used as the idempotent lookup key for everything
/// that hangs off an order, so it must be stable across webhook redeliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Type, PartialOrd, Ord)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new<S: Display>(id: S) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------       SubOrderId       ---------------------------------------------------

/// Identifier for a per-store slice of an order. One sub-order maps to exactly one fund release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Type, PartialOrd, Ord)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SubOrderId(pub String);

impl SubOrderId {
    pub fn new<S: Display>(id: S) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for SubOrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SubOrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for SubOrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     PaymentStatus      ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Paid => write!(f, "Paid"),
            Self::Failed => write!(f, "Failed"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.as_str().parse().unwrap_or_else(|e| {
            error!("{e}. Defaulting to Pending");
            Self::Pending
        })
    }
}

//--------------------------------------     DeliveryStatus     ---------------------------------------------------

/// Fulfilment milestones for a sub-order. Transitions only ever move forward, so each status
/// carries a rank and updates are rejected when the rank would decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DeliveryStatus {
    OrderPlaced,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
}

impl DeliveryStatus {
    pub fn rank(&self) -> u8 {
        match self {
            Self::OrderPlaced => 0,
            Self::Processing => 1,
            Self::Shipped => 2,
            Self::OutForDelivery => 3,
            Self::Delivered => 4,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderPlaced => write!(f, "OrderPlaced"),
            Self::Processing => write!(f, "Processing"),
            Self::Shipped => write!(f, "Shipped"),
            Self::OutForDelivery => write!(f, "OutForDelivery"),
            Self::Delivered => write!(f, "Delivered"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OrderPlaced" => Ok(Self::OrderPlaced),
            "Processing" => Ok(Self::Processing),
            "Shipped" => Ok(Self::Shipped),
            "OutForDelivery" => Ok(Self::OutForDelivery),
            "Delivered" => Ok(Self::Delivered),
            s => Err(ConversionError(format!("Invalid delivery status: {s}"))),
        }
    }
}

//--------------------------------------    ConfirmationKind    ---------------------------------------------------

/// How a delivery was confirmed. Manual confirmations come from the customer, auto confirmations
/// from the grace-period sweep. Whichever lands first wins and the other becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ConfirmationKind {
    Manual,
    Auto,
}

impl Display for ConfirmationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "Manual"),
            Self::Auto => write!(f, "Auto"),
        }
    }
}

impl FromStr for ConfirmationKind {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Manual" => Ok(Self::Manual),
            "Auto" => Ok(Self::Auto),
            s => Err(ConversionError(format!("Invalid confirmation kind: {s}"))),
        }
    }
}

//--------------------------------------     ReleaseStatus      ---------------------------------------------------

/// Lifecycle of a fund release.
///
/// ```text
/// Pending ──► Ready ──► Processing ──► Released ──► Reversed
///    │          │            │
///    └──────────┴────────────┴──► Failed ──► Ready (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReleaseStatus {
    Pending,
    Ready,
    Processing,
    Released,
    Failed,
    Reversed,
}

impl ReleaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reversed)
    }
}

impl Display for ReleaseStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Processing => write!(f, "Processing"),
            Self::Released => write!(f, "Released"),
            Self::Failed => write!(f, "Failed"),
            Self::Reversed => write!(f, "Reversed"),
        }
    }
}

impl FromStr for ReleaseStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Ready" => Ok(Self::Ready),
            "Processing" => Ok(Self::Processing),
            "Released" => Ok(Self::Released),
            "Failed" => Ok(Self::Failed),
            "Reversed" => Ok(Self::Reversed),
            s => Err(ConversionError(format!("Invalid release status: {s}"))),
        }
    }
}

//--------------------------------------     ReleaseTrigger     ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReleaseTrigger {
    AdminApproved,
    AdminForced,
    ScheduledSweep,
}

impl Display for ReleaseTrigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdminApproved => write!(f, "AdminApproved"),
            Self::AdminForced => write!(f, "AdminForced"),
            Self::ScheduledSweep => write!(f, "ScheduledSweep"),
        }
    }
}

impl FromStr for ReleaseTrigger {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AdminApproved" => Ok(Self::AdminApproved),
            "AdminForced" => Ok(Self::AdminForced),
            "ScheduledSweep" => Ok(Self::ScheduledSweep),
            s => Err(ConversionError(format!("Invalid release trigger: {s}"))),
        }
    }
}

//--------------------------------------       EntryType        ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum EntryType {
    Credit,
    Debit,
}

impl Display for EntryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit => write!(f, "Credit"),
            Self::Debit => write!(f, "Debit"),
        }
    }
}

impl FromStr for EntryType {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Credit" => Ok(Self::Credit),
            "Debit" => Ok(Self::Debit),
            s => Err(ConversionError(format!("Invalid entry type: {s}"))),
        }
    }
}

//--------------------------------------   TransactionSource    ---------------------------------------------------

/// Why a wallet entry exists. `Order` entries are settlement credits, `Withdrawal` entries are
/// payout debits and their compensating credits, `Refund` entries compensate returned sub-orders
/// and `Adjustment` entries are administrative corrections such as release reversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionSource {
    Order,
    Withdrawal,
    Refund,
    Adjustment,
}

impl Display for TransactionSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "Order"),
            Self::Withdrawal => write!(f, "Withdrawal"),
            Self::Refund => write!(f, "Refund"),
            Self::Adjustment => write!(f, "Adjustment"),
        }
    }
}

impl FromStr for TransactionSource {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Order" => Ok(Self::Order),
            "Withdrawal" => Ok(Self::Withdrawal),
            "Refund" => Ok(Self::Refund),
            "Adjustment" => Ok(Self::Adjustment),
            s => Err(ConversionError(format!("Invalid transaction source: {s}"))),
        }
    }
}

//--------------------------------------    RelatedDocument     ---------------------------------------------------

/// Pointer from a wallet entry back to the document that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RelatedDocumentType {
    Order,
    SubOrder,
    FundRelease,
    WithdrawalRequest,
    ReturnRequest,
    Dispute,
}

impl Display for RelatedDocumentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order => write!(f, "Order"),
            Self::SubOrder => write!(f, "SubOrder"),
            Self::FundRelease => write!(f, "FundRelease"),
            Self::WithdrawalRequest => write!(f, "WithdrawalRequest"),
            Self::ReturnRequest => write!(f, "ReturnRequest"),
            Self::Dispute => write!(f, "Dispute"),
        }
    }
}

impl FromStr for RelatedDocumentType {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Order" => Ok(Self::Order),
            "SubOrder" => Ok(Self::SubOrder),
            "FundRelease" => Ok(Self::FundRelease),
            "WithdrawalRequest" => Ok(Self::WithdrawalRequest),
            "ReturnRequest" => Ok(Self::ReturnRequest),
            "Dispute" => Ok(Self::Dispute),
            s => Err(ConversionError(format!("Invalid related document type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub doc_type: RelatedDocumentType,
    pub doc_id: String,
}

impl RelatedDocument {
    pub fn new<S: Display>(doc_type: RelatedDocumentType, doc_id: S) -> Self {
        Self { doc_type, doc_id: doc_id.to_string() }
    }

    pub fn order(id: &OrderId) -> Self {
        Self::new(RelatedDocumentType::Order, id)
    }

    pub fn sub_order(id: &SubOrderId) -> Self {
        Self::new(RelatedDocumentType::SubOrder, id)
    }

    pub fn fund_release(id: &SubOrderId) -> Self {
        Self::new(RelatedDocumentType::FundRelease, id)
    }

    pub fn withdrawal(request_ref: &str) -> Self {
        Self::new(RelatedDocumentType::WithdrawalRequest, request_ref)
    }

    pub fn return_request(id: i64) -> Self {
        Self::new(RelatedDocumentType::ReturnRequest, id)
    }
}

impl Display for RelatedDocument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.doc_type, self.doc_id)
    }
}

//--------------------------------------    WithdrawalStatus    ---------------------------------------------------

/// Lifecycle of a withdrawal request.
///
/// ```text
/// Pending ──► UnderReview ──► Approved ──► Processing ──► Completed
///    │             │              │             │
///    │             │              └─────────────┴──► Failed ──► Processing (retry)
///    └─────────────┴──► Rejected (also reachable from Approved, Processing and Failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    UnderReview,
    Approved,
    Processing,
    Completed,
    Rejected,
    Failed,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::UnderReview => write!(f, "UnderReview"),
            Self::Approved => write!(f, "Approved"),
            Self::Processing => write!(f, "Processing"),
            Self::Completed => write!(f, "Completed"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "UnderReview" => Ok(Self::UnderReview),
            "Approved" => Ok(Self::Approved),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Rejected" => Ok(Self::Rejected),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid withdrawal status: {s}"))),
        }
    }
}

//--------------------------------------      ReturnStatus      ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReturnStatus {
    Requested,
    Approved,
    Rejected,
    InTransit,
    Received,
    Refunded,
}

impl ReturnStatus {
    /// A return still blocks its sub-order's release while it is in one of these states.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Rejected | Self::Refunded)
    }
}

impl Display for ReturnStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
            Self::InTransit => write!(f, "InTransit"),
            Self::Received => write!(f, "Received"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for ReturnStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Requested" => Ok(Self::Requested),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "InTransit" => Ok(Self::InTransit),
            "Received" => Ok(Self::Received),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid return status: {s}"))),
        }
    }
}

//--------------------------------------       Disputes         ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DisputeKind {
    Dispute,
    Chargeback,
}

impl Display for DisputeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispute => write!(f, "Dispute"),
            Self::Chargeback => write!(f, "Chargeback"),
        }
    }
}

impl FromStr for DisputeKind {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Dispute" => Ok(Self::Dispute),
            "Chargeback" => Ok(Self::Chargeback),
            s => Err(ConversionError(format!("Invalid dispute kind: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DisputeStatus {
    Open,
    Resolved,
}

impl Display for DisputeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Resolved => write!(f, "Resolved"),
        }
    }
}

impl FromStr for DisputeStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Open" => Ok(Self::Open),
            "Resolved" => Ok(Self::Resolved),
            s => Err(ConversionError(format!("Invalid dispute status: {s}"))),
        }
    }
}

//--------------------------------------       StoreTier        ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum StoreTier {
    Standard,
    Silver,
    Gold,
}

impl StoreTier {
    pub const ALL: [StoreTier; 3] = [Self::Standard, Self::Silver, Self::Gold];
}

impl Display for StoreTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::Silver => write!(f, "Silver"),
            Self::Gold => write!(f, "Gold"),
        }
    }
}

impl FromStr for StoreTier {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Standard" => Ok(Self::Standard),
            "Silver" => Ok(Self::Silver),
            "Gold" => Ok(Self::Gold),
            s => Err(ConversionError(format!("Invalid store tier: {s}"))),
        }
    }
}

impl From<String> for StoreTier {
    fn from(value: String) -> Self {
        value.as_str().parse().unwrap_or_else(|e| {
            error!("{e}. Defaulting to Standard");
            Self::Standard
        })
    }
}

//--------------------------------------  VerificationStatus    ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum VerificationStatus {
    Unverified,
    Pending,
    Verified,
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unverified => write!(f, "Unverified"),
            Self::Pending => write!(f, "Pending"),
            Self::Verified => write!(f, "Verified"),
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Unverified" => Ok(Self::Unverified),
            "Pending" => Ok(Self::Pending),
            "Verified" => Ok(Self::Verified),
            s => Err(ConversionError(format!("Invalid verification status: {s}"))),
        }
    }
}

//--------------------------------------      ProductRef        ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ProductKind {
    Physical,
    Digital,
}

impl ProductKind {
    /// Digital goods skip the courier leg, so they are deliverable the moment payment clears.
    pub fn requires_shipping(&self) -> bool {
        matches!(self, Self::Physical)
    }
}

impl Display for ProductKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Physical => write!(f, "Physical"),
            Self::Digital => write!(f, "Digital"),
        }
    }
}

impl FromStr for ProductKind {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Physical" => Ok(Self::Physical),
            "Digital" => Ok(Self::Digital),
            s => Err(ConversionError(format!("Invalid product kind: {s}"))),
        }
    }
}

/// A tagged reference to a catalogue item. The tag travels with the id everywhere a line item is
/// handled so that digital and physical goods can never be confused for one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum ProductRef {
    Physical(String),
    Digital(String),
}

impl ProductRef {
    pub fn new<S: Display>(kind: ProductKind, id: S) -> Self {
        match kind {
            ProductKind::Physical => Self::Physical(id.to_string()),
            ProductKind::Digital => Self::Digital(id.to_string()),
        }
    }

    pub fn kind(&self) -> ProductKind {
        match self {
            Self::Physical(_) => ProductKind::Physical,
            Self::Digital(_) => ProductKind::Digital,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Physical(id) | Self::Digital(id) => id.as_str(),
        }
    }
}

impl Display for ProductRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

//--------------------------------------         Role           ---------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum Role {
    ReadOnly,
    Write,
    SuperAdmin,
}

pub type Roles = Vec<Role>;

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read_only"),
            Self::Write => write!(f, "write"),
            Self::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read_only" => Ok(Self::ReadOnly),
            "write" => Ok(Self::Write),
            "super_admin" => Ok(Self::SuperAdmin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------        Store           ---------------------------------------------------

/// A marketplace seller. The tier and verification status recorded here are what commission and
/// release rules get frozen from when a sub-order's settlement is created.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub store_id: String,
    pub name: String,
    pub tier: StoreTier,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Orders          ---------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub idempotency_key: String,
    pub customer_id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub shipping_address: String,
    pub memo: Option<String>,
    pub currency: String,
    pub total_amount: Money,
    pub payment_status: PaymentStatus,
    pub placed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubOrder {
    pub id: i64,
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub store_id: String,
    pub total_amount: Money,
    pub shipping_price: Money,
    pub delivery_status: DeliveryStatus,
    pub customer_confirmed: bool,
    pub confirmation_kind: Option<ConfirmationKind>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubOrder {
    /// Value that gets escrowed and eventually paid out for this sub-order, before commission.
    pub fn gross_value(&self) -> Money {
        self.total_amount + self.shipping_price
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineItem {
    pub id: i64,
    pub sub_order_id: SubOrderId,
    pub product_kind: ProductKind,
    pub product_id: String,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

impl LineItem {
    pub fn product_ref(&self) -> ProductRef {
        ProductRef::new(self.product_kind, &self.product_id)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubOrderStatusEntry {
    pub id: i64,
    pub sub_order_id: SubOrderId,
    pub status: DeliveryStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      New orders        ---------------------------------------------------

#[derive(Debug, Clone, Error)]
#[error("Invalid order: {0}")]
pub struct OrderValidationError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product: ProductRef,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubOrder {
    pub sub_order_id: SubOrderId,
    pub store_id: String,
    pub total_amount: Money,
    #[serde(default)]
    pub shipping_price: Money,
    pub items: Vec<NewLineItem>,
}

impl NewSubOrder {
    pub fn gross_value(&self) -> Money {
        self.total_amount + self.shipping_price
    }
}

/// The order aggregate as submitted by the storefront. Prices arrive as snapshots in minor
/// units and are stored verbatim, so later catalogue edits never change what was charged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub idempotency_key: String,
    pub customer_id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub shipping_address: String,
    pub memo: Option<String>,
    pub total_amount: Money,
    pub placed_at: DateTime<Utc>,
    pub sub_orders: Vec<NewSubOrder>,
}

impl NewOrder {
    /// Checks the arithmetic of the aggregate before anything touches the database. Sub-order
    /// totals plus shipping must sum to the order total, and every line must multiply out.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.idempotency_key.trim().is_empty() {
            return Err(OrderValidationError("idempotency key must not be empty".to_string()));
        }
        if self.sub_orders.is_empty() {
            return Err(OrderValidationError(format!("order {} has no sub-orders", self.order_id)));
        }
        if self.total_amount.value() <= 0 {
            return Err(OrderValidationError(format!("order {} has a non-positive total", self.order_id)));
        }
        let sum: Money = self.sub_orders.iter().map(NewSubOrder::gross_value).sum();
        if sum != self.total_amount {
            return Err(OrderValidationError(format!(
                "order {} total is {} but its sub-orders sum to {}",
                self.order_id, self.total_amount, sum
            )));
        }
        for sub in &self.sub_orders {
            if sub.items.is_empty() {
                return Err(OrderValidationError(format!("sub-order {} has no line items", sub.sub_order_id)));
            }
            if sub.shipping_price.is_negative() {
                return Err(OrderValidationError(format!(
                    "sub-order {} has a negative shipping price",
                    sub.sub_order_id
                )));
            }
            let line_sum: Money = sub.items.iter().map(|i| i.line_total).sum();
            if line_sum != sub.total_amount {
                return Err(OrderValidationError(format!(
                    "sub-order {} total is {} but its line items sum to {}",
                    sub.sub_order_id, sub.total_amount, line_sum
                )));
            }
            let all_digital = sub.items.iter().all(|i| !i.product.kind().requires_shipping());
            if all_digital && !sub.shipping_price.is_zero() {
                return Err(OrderValidationError(format!(
                    "sub-order {} contains only digital goods but charges {} shipping",
                    sub.sub_order_id, sub.shipping_price
                )));
            }
            for item in &sub.items {
                if item.quantity <= 0 {
                    return Err(OrderValidationError(format!(
                        "line item {} on {} has a non-positive quantity",
                        item.product, sub.sub_order_id
                    )));
                }
                if item.unit_price * item.quantity != item.line_total {
                    return Err(OrderValidationError(format!(
                        "line item {} on {} does not multiply out: {} x {} != {}",
                        item.product, sub.sub_order_id, item.unit_price, item.quantity, item.line_total
                    )));
                }
            }
        }
        Ok(())
    }
}

//--------------------------------------       Returns          ---------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: i64,
    pub sub_order_id: SubOrderId,
    pub reason: String,
    pub status: ReturnStatus,
    pub refund_amount: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Dispute {
    pub id: i64,
    pub sub_order_id: SubOrderId,
    pub kind: DisputeKind,
    pub reason: String,
    pub status: DisputeStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

//--------------------------------------       Wallets          ---------------------------------------------------

/// A store's money position. `balance` is spendable, `pending` is escrowed on settlements still
/// awaiting payout and `total_earned` is the running sum of released earnings. The balance is
/// never written directly from user input; it only moves through ledger entries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub store_id: String,
    pub currency: String,
    pub balance: Money,
    pub pending: Money,
    pub total_earned: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only ledger entry. `balance_after` snapshots the wallet balance as of this entry,
/// so the full history can be replayed and checked against the stored balance at any time.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub wallet_id: i64,
    pub entry_type: EntryType,
    pub amount: Money,
    pub balance_after: Money,
    pub source: TransactionSource,
    pub related_type: Option<RelatedDocumentType>,
    pub related_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// The signed effect of this entry on the wallet balance.
    pub fn signed_amount(&self) -> Money {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }

    pub fn related_document(&self) -> Option<RelatedDocument> {
        match (self.related_type, self.related_id.as_ref()) {
            (Some(t), Some(id)) => Some(RelatedDocument::new(t, id)),
            _ => None,
        }
    }
}

//--------------------------------------     Fund releases      ---------------------------------------------------

/// The financial outcome of a sub-order, frozen when payment clears. Commission is computed once
/// from the policy in force at that moment and never recomputed, even if fees change later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Settlement {
    pub amount: Money,
    pub shipping_price: Money,
    pub commission: Money,
    pub percentage_fee: i64,
    pub flat_fee: Money,
}

impl Settlement {
    /// Everything the store receives when this settlement is released.
    pub fn payout(&self) -> Money {
        self.amount + self.shipping_price
    }
}

/// Snapshot of the release policy that applied when the settlement was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReleaseRules {
    pub store_tier: StoreTier,
    pub verification_status: VerificationStatus,
    pub business_days_required: i64,
    pub delivery_required: bool,
    pub buyer_protection_days: i64,
    pub require_buyer_protection: bool,
    pub require_dispute_checks: bool,
}

/// The set-once condition flags. Each flag only ever moves from false to true; nothing resets
/// one once it has been satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReleaseConditions {
    pub payment_cleared: bool,
    pub delivery_confirmed: bool,
    pub buyer_protection_expired: bool,
    pub no_active_returns: bool,
    pub no_active_disputes: bool,
    pub no_chargebacks: bool,
    pub verification_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FundRelease {
    pub id: i64,
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub store_id: String,
    pub status: ReleaseStatus,
    #[sqlx(flatten)]
    pub settlement: Settlement,
    #[sqlx(flatten)]
    pub rules: ReleaseRules,
    #[sqlx(flatten)]
    pub conditions: ReleaseConditions,
    pub scheduled_release_time: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub trigger_kind: Option<ReleaseTrigger>,
    pub released_by: Option<String>,
    pub failure_reason: Option<String>,
    pub reversal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to create a fund release when payment clears. Settlement and rules are the
/// frozen snapshots computed by the caller; they are stored verbatim.
#[derive(Debug, Clone)]
pub struct NewFundRelease {
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub store_id: String,
    pub settlement: Settlement,
    pub rules: ReleaseRules,
    pub verification_complete: bool,
    pub scheduled_release_time: DateTime<Utc>,
}

impl FundRelease {
    /// The conditions this release must satisfy, given the rules frozen at creation.
    pub fn required_conditions(&self) -> Vec<(&'static str, bool)> {
        let c = &self.conditions;
        let mut required = vec![("payment_cleared", c.payment_cleared)];
        if self.rules.delivery_required {
            required.push(("delivery_confirmed", c.delivery_confirmed));
        }
        if self.rules.require_buyer_protection {
            required.push(("buyer_protection_expired", c.buyer_protection_expired));
        }
        if self.rules.require_dispute_checks {
            required.push(("no_active_returns", c.no_active_returns));
            required.push(("no_active_disputes", c.no_active_disputes));
            required.push(("no_chargebacks", c.no_chargebacks));
        }
        required
    }

    pub fn conditions_met(&self) -> bool {
        self.required_conditions().into_iter().all(|(_, met)| met)
    }

    /// The conditions that still stand between this release and eligibility.
    pub fn unmet_conditions(&self) -> Vec<&'static str> {
        self.required_conditions().into_iter().filter(|(_, met)| !met).map(|(name, _)| name).collect()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_release_time <= now
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ReleaseStatus::Pending | ReleaseStatus::Ready) && self.conditions_met() && self.is_due(now)
    }
}

//--------------------------------------     Withdrawals        ---------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub request_ref: String,
    pub store_id: String,
    pub requested_amount: Money,
    pub processing_fee: Money,
    pub net_amount: Money,
    #[sqlx(flatten)]
    pub bank_details: BankDetails,
    pub status: WithdrawalStatus,
    pub transaction_reference: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WithdrawalStatusEntry {
    pub id: i64,
    pub withdrawal_id: i64,
    pub status: WithdrawalStatus,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWithdrawal {
    pub store_id: String,
    pub requested_amount: Money,
    pub processing_fee: Money,
    pub net_amount: Money,
    pub bank_details: BankDetails,
}

//--------------------------------------      Admin users       ---------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub api_key_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use msl_common::Money;

    use super::*;

    fn line(product: ProductRef, unit: i64, qty: i64) -> NewLineItem {
        NewLineItem {
            product,
            product_name: "thing".to_string(),
            unit_price: Money::from(unit),
            quantity: qty,
            line_total: Money::from(unit * qty),
        }
    }

    fn order_with_subs(total: i64, subs: Vec<NewSubOrder>) -> NewOrder {
        NewOrder {
            order_id: OrderId::new("ord-1"),
            idempotency_key: "idem-1".to_string(),
            customer_id: "cust-1".to_string(),
            buyer_name: "Ada".to_string(),
            buyer_email: "ada@example.com".to_string(),
            shipping_address: "12 Marina Rd, Lagos".to_string(),
            memo: None,
            total_amount: Money::from(total),
            placed_at: Utc::now(),
            sub_orders: subs,
        }
    }

    #[test]
    fn valid_order_passes_validation() {
        let sub = NewSubOrder {
            sub_order_id: SubOrderId::new("sub-1"),
            store_id: "store-1".to_string(),
            total_amount: Money::from(5000),
            shipping_price: Money::from(500),
            items: vec![line(ProductRef::Physical("sku-9".to_string()), 2500, 2)],
        };
        let order = order_with_subs(5500, vec![sub]);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn order_total_must_match_sub_order_sum() {
        let sub = NewSubOrder {
            sub_order_id: SubOrderId::new("sub-1"),
            store_id: "store-1".to_string(),
            total_amount: Money::from(5000),
            shipping_price: Money::from(500),
            items: vec![line(ProductRef::Physical("sku-9".to_string()), 2500, 2)],
        };
        let order = order_with_subs(5000, vec![sub]);
        let err = order.validate().unwrap_err();
        assert!(err.to_string().contains("sub-orders sum"));
    }

    #[test]
    fn line_items_must_multiply_out() {
        let mut item = line(ProductRef::Digital("ebook-1".to_string()), 1000, 3);
        item.line_total = Money::from(2999);
        let sub = NewSubOrder {
            sub_order_id: SubOrderId::new("sub-1"),
            store_id: "store-1".to_string(),
            total_amount: Money::from(2999),
            shipping_price: Money::default(),
            items: vec![item],
        };
        let order = order_with_subs(2999, vec![sub]);
        let err = order.validate().unwrap_err();
        assert!(err.to_string().contains("does not multiply out"));
    }

    #[test]
    fn digital_only_sub_orders_cannot_charge_shipping() {
        let sub = NewSubOrder {
            sub_order_id: SubOrderId::new("sub-1"),
            store_id: "store-1".to_string(),
            total_amount: Money::from(3000),
            shipping_price: Money::from(200),
            items: vec![line(ProductRef::Digital("ebook-1".to_string()), 3000, 1)],
        };
        let order = order_with_subs(3200, vec![sub]);
        let err = order.validate().unwrap_err();
        assert!(err.to_string().contains("digital goods"));
    }

    #[test]
    fn order_webhooks_parse_from_json() {
        let payload = r#"{
            "order_id": "msl-1042",
            "idempotency_key": "chk-77f0",
            "customer_id": "cust-88",
            "buyer_name": "Ada Obi",
            "buyer_email": "ada@example.com",
            "shipping_address": "12 Marina Rd, Lagos",
            "total_amount": 8500,
            "placed_at": "2024-06-07T09:30:00Z",
            "sub_orders": [
                {
                    "sub_order_id": "msl-1042-1",
                    "store_id": "store-9",
                    "total_amount": 5000,
                    "shipping_price": 500,
                    "items": [
                        {
                            "product": { "kind": "Physical", "id": "sku-9" },
                            "product_name": "Walnut stool",
                            "unit_price": 2500,
                            "quantity": 2,
                            "line_total": 5000
                        }
                    ]
                },
                {
                    "sub_order_id": "msl-1042-2",
                    "store_id": "store-12",
                    "total_amount": 3000,
                    "items": [
                        {
                            "product": { "kind": "Digital", "id": "ebook-4" },
                            "product_name": "Pattern book",
                            "unit_price": 3000,
                            "quantity": 1,
                            "line_total": 3000
                        }
                    ]
                }
            ]
        }"#;
        let order: NewOrder = serde_json::from_str(payload).expect("Error parsing order webhook");
        assert_eq!(order.order_id, OrderId::new("msl-1042"));
        assert!(order.memo.is_none());
        assert_eq!(order.sub_orders.len(), 2);
        assert_eq!(order.sub_orders[0].items[0].product, ProductRef::Physical("sku-9".to_string()));
        // shipping_price is optional on the wire and defaults to zero
        assert!(order.sub_orders[1].shipping_price.is_zero());
        assert!(order.validate().is_ok());
    }

    #[test]
    fn payout_adds_shipping_to_the_settlement() {
        let settlement = Settlement {
            amount: Money::from(5000),
            shipping_price: Money::from(500),
            commission: Money::from(550),
            percentage_fee: 1000,
            flat_fee: Money::from(50),
        };
        assert_eq!(settlement.payout(), Money::from(5500));
    }

    #[test]
    fn release_conditions_follow_frozen_rules() {
        let release = FundRelease {
            id: 1,
            sub_order_id: SubOrderId::new("sub-1"),
            order_id: OrderId::new("ord-1"),
            store_id: "store-1".to_string(),
            status: ReleaseStatus::Pending,
            settlement: Settlement {
                amount: Money::from(4500),
                shipping_price: Money::from(500),
                commission: Money::from(500),
                percentage_fee: 750,
                flat_fee: Money::from(125),
            },
            rules: ReleaseRules {
                store_tier: StoreTier::Standard,
                verification_status: VerificationStatus::Verified,
                business_days_required: 3,
                delivery_required: true,
                buyer_protection_days: 7,
                require_buyer_protection: false,
                require_dispute_checks: false,
            },
            conditions: ReleaseConditions { payment_cleared: true, ..Default::default() },
            scheduled_release_time: Utc::now(),
            released_at: None,
            reversed_at: None,
            trigger_kind: None,
            released_by: None,
            failure_reason: None,
            reversal_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!release.conditions_met());
        assert_eq!(release.unmet_conditions(), vec!["delivery_confirmed"]);
        let mut confirmed = release.clone();
        confirmed.conditions.delivery_confirmed = true;
        assert!(confirmed.conditions_met());
        assert!(confirmed.is_eligible(Utc::now()));
    }

    #[test]
    fn delivery_status_ranks_are_monotonic() {
        let statuses = [
            DeliveryStatus::OrderPlaced,
            DeliveryStatus::Processing,
            DeliveryStatus::Shipped,
            DeliveryStatus::OutForDelivery,
            DeliveryStatus::Delivered,
        ];
        for pair in statuses.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn signed_amounts_reflect_entry_type() {
        let mut tx = WalletTransaction {
            id: 1,
            wallet_id: 1,
            entry_type: EntryType::Credit,
            amount: Money::from(1000),
            balance_after: Money::from(1000),
            source: TransactionSource::Order,
            related_type: Some(RelatedDocumentType::FundRelease),
            related_id: Some("sub-1".to_string()),
            note: None,
            created_at: Utc::now(),
        };
        assert_eq!(tx.signed_amount(), Money::from(1000));
        tx.entry_type = EntryType::Debit;
        assert_eq!(tx.signed_amount(), Money::from(-1000));
        let doc = tx.related_document().unwrap();
        assert_eq!(doc.to_string(), "FundRelease:sub-1");
    }
}
