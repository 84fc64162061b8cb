//! Order lifecycle: payment proof submission and operator confirmation
use super::error::{BotError, StoreError};
use super::model::{NewOrder, OrderRecord, OrderStatus, UserId};
use super::notify::{NotificationSink, OrderNotice, parse_user_id};
use super::order_store::OrderStore;
use super::session::DraftOrder;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Confirm,
    Reject,
}

impl OperatorAction {
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "confirm" => Some(OperatorAction::Confirm),
            "reject" => Some(OperatorAction::Reject),
            _ => None,
        }
    }

    fn status(self) -> OrderStatus {
        match self {
            OperatorAction::Confirm => OrderStatus::Confirmed,
            OperatorAction::Reject => OrderStatus::Rejected,
        }
    }
}

/// The message an operator command replies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepliedMessage {
    /// Transport reference of the replied-to message
    pub reference: Option<String>,
    /// Its text or caption
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCommand {
    pub from: UserId,
    pub action: OperatorAction,
    pub reply_to: Option<RepliedMessage>,
}

#[derive(Clone)]
pub struct OrderLifecycle {
    orders: OrderStore,
    sink: Arc<dyn NotificationSink>,
    support_contact: String,
    discount_percent: u32,
}

impl OrderLifecycle {
    pub fn new(
        orders: OrderStore,
        sink: Arc<dyn NotificationSink>,
        support_contact: String,
        discount_percent: u32,
    ) -> Self {
        Self {
            orders,
            sink,
            support_contact,
            discount_percent,
        }
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    /// Persist the draft as a pending order and tell the operator about it.
    ///
    /// The stored order is authoritative: a failed notification is logged and
    /// does not undo the write.
    pub fn submit(
        &self,
        owner: UserId,
        display_name: Option<&str>,
        draft: &DraftOrder,
        payment_proof_ref: &str,
    ) -> Result<OrderRecord, StoreError> {
        let order = self.orders.insert(NewOrder {
            owner_id: owner,
            product_name: draft.product_name.clone(),
            weight: draft.weight,
            price: draft.price,
            discount_applied: draft.discount_applied,
            payment_proof_ref: payment_proof_ref.to_string(),
        })?;

        let notice = OrderNotice::new(&order, display_name, self.discount_percent);
        match self.sink.notify_operator(&notice) {
            Ok(Some(reference)) => {
                if let Err(e) = self.orders.link_notification(&reference, &order.id) {
                    error!(order_id = %order.id, error = %e, "Failed to link operator notification");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(order_id = %order.id, user_id = %owner, error = %e, "Operator notification failed");
            }
        }
        Ok(order)
    }

    pub fn confirm_latest(&self, owner: UserId) -> Result<OrderRecord, BotError> {
        self.finalise_latest(owner, OperatorAction::Confirm)
    }

    pub fn reject_latest(&self, owner: UserId) -> Result<OrderRecord, BotError> {
        self.finalise_latest(owner, OperatorAction::Reject)
    }

    fn finalise_latest(&self, owner: UserId, action: OperatorAction) -> Result<OrderRecord, BotError> {
        let Some(order) = self.orders.find_latest_pending_by_owner(owner)? else {
            warn!(user_id = %owner, "No pending order to finalise");
            return Err(BotError::NoPendingOrder(owner));
        };
        self.finalise(&order.id, action)
    }

    fn finalise(&self, order_id: &str, action: OperatorAction) -> Result<OrderRecord, BotError> {
        let order = self.orders.set_status(order_id, action.status())?;
        let text = match action {
            OperatorAction::Confirm => format!(
                "🎉 Your order is confirmed!\n\nThe operator is already working on it. To receive it, contact support: {}",
                self.support_contact
            ),
            OperatorAction::Reject => format!(
                "Your order of {} ({} g) was rejected by the operator. For details, contact support: {}",
                order.product_name, order.weight, self.support_contact
            ),
        };
        if let Err(e) = self.sink.notify_user(order.owner_id, &text) {
            error!(order_id = %order.id, user_id = %order.owner_id, error = %e, "Owner notification failed");
        }
        Ok(order)
    }

    /// Resolve the order an operator command refers to and finalise it.
    ///
    /// A linked notification reference is looked up directly; otherwise the
    /// user id is parsed out of the replied-to summary text. An unlinked
    /// reference without a usable text is reported as unknown.
    pub fn handle_operator(&self, command: &OperatorCommand) -> Result<OrderRecord, BotError> {
        let replied = command.reply_to.as_ref().ok_or(BotError::MalformedReply)?;

        if let Some(reference) = replied.reference.as_deref() {
            if let Some(order_id) = self.orders.order_for_notification(reference)? {
                info!(reference, order_id = %order_id, "Operator reply resolved by reference");
                return self.finalise(&order_id, command.action);
            }
        }

        match (replied.text.as_deref().and_then(parse_user_id), &replied.reference) {
            (Some(owner), _) => self.finalise_latest(owner, command.action),
            (None, Some(reference)) => Err(BotError::UnknownNotification(reference.clone())),
            (None, None) => Err(BotError::MalformedReply),
        }
    }
}
