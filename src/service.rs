//! Service layer API: the single entry point a transport talks to
use super::catalog::Catalog;
use super::config::Config;
use super::conversation::Conversation;
use super::error::{BotError, StoreError};
use super::event::Event;
use super::lifecycle::{OperatorCommand, OrderLifecycle};
use super::model::{OrderRecord, UserId, UserRecord};
use super::notify::NotificationSink;
use super::order_store::OrderStore;
use super::referral::ReferralLedger;
use super::reply::Reply;
use super::session::{ConversationSession, ConversationState};
use super::user_store::UserStore;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct ShopService {
    instance: Arc<sled::Db>,
    conversation: Conversation,
    lifecycle: OrderLifecycle,
    ledger: ReferralLedger,
    users: UserStore,
    operator: UserId,
}

impl ShopService {
    pub fn new(
        instance: Arc<sled::Db>,
        config: &Config,
        catalog: Catalog,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, StoreError> {
        let users = UserStore::open(&instance)?;
        let ledger = ReferralLedger::new(users.clone(), config.referral.clone());
        Self::with_ledger(instance, config, catalog, sink, ledger)
    }

    /// Like [`ShopService::new`] with a caller-provided referral ledger.
    pub fn with_ledger(
        instance: Arc<sled::Db>,
        config: &Config,
        catalog: Catalog,
        sink: Arc<dyn NotificationSink>,
        ledger: ReferralLedger,
    ) -> Result<Self, StoreError> {
        let users = UserStore::open(&instance)?;
        let orders = OrderStore::open(&instance)?;
        let lifecycle = OrderLifecycle::new(
            orders,
            sink,
            config.bot.support_contact.clone(),
            config.referral.discount_percent,
        );
        let conversation = Conversation::new(
            config.bot.clone(),
            config.verification.clone(),
            catalog,
            users.clone(),
            ledger.clone(),
            lifecycle.clone(),
        );
        Ok(Self {
            instance,
            conversation,
            lifecycle,
            ledger,
            users,
            operator: UserId(config.bot.operator_chat_id),
        })
    }

    /// Open the configured database and catalog.
    pub fn open(config: &Config, sink: Arc<dyn NotificationSink>) -> anyhow::Result<Self> {
        let db = sled::open(&config.storage.data_dir)?;
        info!(path = %config.storage.data_dir.display(), "Database opened");
        let catalog = Catalog::load_or_empty(&config.catalog.path);
        Ok(Self::new(Arc::new(db), config, catalog, sink)?)
    }

    /// Process a user event. Failures never escape: the user gets a message
    /// and the session stays where it was.
    pub fn handle_event(&self, event: &Event) -> Vec<Reply> {
        match self.conversation.handle(event) {
            Ok(replies) => replies,
            Err(e) => {
                error!(user_id = %event.user_id, error = %e, "Event processing failed");
                vec![Reply::text("Something went wrong. Please try again later.")]
            }
        }
    }

    /// Process an operator command and return the answer for the operator chat.
    pub fn handle_operator_command(&self, command: &OperatorCommand) -> Vec<Reply> {
        match self.operator_command(command) {
            Ok(order) => vec![Reply::text(format!(
                "✅ Order {} from user {} is {}.",
                order.id, order.owner_id, order.status
            ))],
            Err(e) => {
                warn!(from = %command.from, error = %e, "Operator command failed");
                vec![Reply::text(operator_message(&e))]
            }
        }
    }

    fn operator_command(&self, command: &OperatorCommand) -> Result<OrderRecord, BotError> {
        if command.from != self.operator {
            return Err(BotError::Unauthorized(command.from));
        }
        self.lifecycle.handle_operator(command)
    }

    /// Confirm the most recent pending order of `owner`.
    pub fn confirm_latest(&self, owner: UserId) -> Result<OrderRecord, BotError> {
        self.lifecycle.confirm_latest(owner)
    }

    /// Reject the most recent pending order of `owner`.
    pub fn reject_latest(&self, owner: UserId) -> Result<OrderRecord, BotError> {
        self.lifecycle.reject_latest(owner)
    }

    pub fn state(&self, user_id: UserId) -> ConversationState {
        self.conversation.state(user_id)
    }

    pub fn session(&self, user_id: UserId) -> Option<ConversationSession> {
        self.conversation.session(user_id)
    }

    pub fn active_sessions(&self) -> usize {
        self.conversation.active_sessions()
    }

    pub fn user(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.users.get(user_id)
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn orders(&self) -> &OrderStore {
        self.lifecycle.orders()
    }

    pub fn ledger(&self) -> &ReferralLedger {
        &self.ledger
    }

    pub fn operator(&self) -> UserId {
        self.operator
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }
}

fn operator_message(err: &BotError) -> String {
    match err {
        BotError::NoPendingOrder(user) => format!("No pending order found for user {user}."),
        BotError::MalformedReply => {
            "Please send this command as a reply to an order summary message.".to_string()
        }
        BotError::UnknownNotification(reference) => format!("No order is linked to message {reference}."),
        BotError::Unauthorized(_) => "This command is reserved for the operator.".to_string(),
        BotError::Store(StoreError::StatusAlreadyFinal { id, status }) => {
            format!("Order {id} is already {status}.")
        }
        BotError::Store(StoreError::OrderNotFound(id)) => format!("Order {id} no longer exists."),
        _ => "Failed to process the order. Please try again.".to_string(),
    }
}
