//! Operator and owner notifications
use super::model::{OrderRecord, Price, UserId};
use tracing::info;

/// Summary of a freshly submitted order, addressed to the operator channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNotice {
    pub order_id: String,
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub product_name: String,
    pub weight: u32,
    pub price: Price,
    pub discount_applied: bool,
    pub discount_percent: u32,
    pub payment_proof_ref: String,
}

impl OrderNotice {
    pub fn new(order: &OrderRecord, display_name: Option<&str>, discount_percent: u32) -> Self {
        Self {
            order_id: order.id.clone(),
            user_id: order.owner_id,
            display_name: display_name.map(str::to_string),
            product_name: order.product_name.clone(),
            weight: order.weight,
            price: order.price,
            discount_applied: order.discount_applied,
            discount_percent,
            payment_proof_ref: order.payment_proof_ref.clone(),
        }
    }

    /// Human readable summary. The `(ID: <user>)` fragment is what the
    /// plain-text fallback of operator replies parses.
    pub fn summary_text(&self) -> String {
        let discount = if self.discount_applied {
            format!("{}% discount applied", self.discount_percent)
        } else {
            "No discount".to_string()
        };
        format!(
            "‼️ NEW ORDER ‼️\nFrom: @{} (ID: {})\nProduct: {} ({} g)\nAmount: {}\nStatus: {}\n\nReply to this message with /confirm or /reject.",
            self.display_name.as_deref().unwrap_or("anonymous"),
            self.user_id,
            self.product_name,
            self.weight,
            self.price,
            discount,
        )
    }
}

/// Pull the user id out of an order summary, e.g. `... (ID: 12345) ...`.
/// Fragile by nature; only used when no notification reference is linked.
pub fn parse_user_id(summary: &str) -> Option<UserId> {
    let start = summary.find("ID: ")? + "ID: ".len();
    let rest = &summary[start..];
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok().map(UserId)
}

/// Outbound side channel. Implementations may fan out to several transport
/// identities; callers only see one logical sink.
pub trait NotificationSink: Send + Sync {
    /// Deliver an order summary and its proof image to the operator. Returns
    /// the transport reference of the summary message, when there is one.
    fn notify_operator(&self, notice: &OrderNotice) -> anyhow::Result<Option<String>>;

    /// Deliver a text to an order owner.
    fn notify_user(&self, user_id: UserId, text: &str) -> anyhow::Result<()>;
}

/// Sink that only logs. Useful when no operator channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify_operator(&self, notice: &OrderNotice) -> anyhow::Result<Option<String>> {
        info!(order_id = %notice.order_id, user_id = %notice.user_id, "Operator notice (log only)");
        Ok(None)
    }

    fn notify_user(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        info!(user_id = %user_id, text, "User notice (log only)");
        Ok(())
    }
}

/// Two transport identities acting as one notifier: operator traffic goes
/// through `operator`, owner messages through `users`.
pub struct SplitSink<O, U> {
    pub operator: O,
    pub users: U,
}

impl<O: NotificationSink, U: NotificationSink> NotificationSink for SplitSink<O, U> {
    fn notify_operator(&self, notice: &OrderNotice) -> anyhow::Result<Option<String>> {
        self.operator.notify_operator(notice)
    }

    fn notify_user(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        self.users.notify_user(user_id, text)
    }
}
