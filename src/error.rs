use crate::model::{OrderStatus, UserId};

/// Bad input from the user; recovered by re-prompting from a safe state.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Product {0} does not exist")]
    UnknownProduct(String),
    #[error("Product {product} is not sold in {weight} g")]
    UnknownWeight { product: String, weight: u32 },
    #[error("No draft order in the session")]
    MissingDraft,
    #[error("Button payload {0:?} is not understood")]
    MalformedCallback(String),
    #[error("Region {0} is not served")]
    UnknownRegion(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Failed to decode stored record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Referral code {0} is already assigned")]
    DuplicateReferralCode(String),
    #[error("User {0} not found")]
    UserNotFound(UserId),
    #[error("Order {0} not found")]
    OrderNotFound(String),
    #[error("Order {id} is already {status}")]
    StatusAlreadyFinal { id: String, status: OrderStatus },
    #[error("No unique referral code after {0} attempts")]
    CodeSpaceExhausted(usize),
    #[error("Failed to allocate an identifier: {0}")]
    Identifier(String),
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(value: sled::transaction::TransactionError<StoreError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => StoreError::Database(err),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("User {0} has no pending order")]
    NoPendingOrder(UserId),
    #[error("No order is linked to notification {0}")]
    UnknownNotification(String),
    #[error("Reply to an order summary message that contains the user id")]
    MalformedReply,
    #[error("User {0} is not the operator")]
    Unauthorized(UserId),
}
