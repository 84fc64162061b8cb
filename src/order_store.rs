//! sled-backed order records
//!
//! Orders live in `orders` keyed by id. `orders_by_owner` indexes them by
//! `owner ++ created_at ++ id` so the latest order of a user is the last key
//! under the owner prefix. `notification_refs` maps the transport reference
//! of an operator summary message back to the order it describes.
use super::error::StoreError;
use super::model::{NewOrder, OrderRecord, OrderStatus, TimeStamp, UserId};
use super::user_store::encode;
use super::utils;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, abort};
use tracing::{debug, info};

const ORDERS_TREE: &str = "orders";
const OWNER_INDEX_TREE: &str = "orders_by_owner";
const NOTIFICATION_TREE: &str = "notification_refs";

#[derive(Clone)]
pub struct OrderStore {
    orders: sled::Tree,
    by_owner: sled::Tree,
    notifications: sled::Tree,
}

fn owner_index_key(order: &OrderRecord) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + order.id.len());
    key.extend_from_slice(&order.owner_id.to_key());
    key.extend_from_slice(&order.created_at.nanos().to_be_bytes());
    key.extend_from_slice(order.id.as_bytes());
    key
}

impl OrderStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            orders: db.open_tree(ORDERS_TREE)?,
            by_owner: db.open_tree(OWNER_INDEX_TREE)?,
            notifications: db.open_tree(NOTIFICATION_TREE)?,
        })
    }

    /// Persist a new `pending` order; the id is assigned here.
    pub fn insert(&self, order: NewOrder) -> Result<OrderRecord, StoreError> {
        let id = utils::new_order_id().map_err(|e| StoreError::Identifier(e.to_string()))?;
        let record = OrderRecord::from_new(id, order, TimeStamp::new());
        let bytes = encode(&record)?;
        let index_key = owner_index_key(&record);

        (&self.orders, &self.by_owner).transaction(|(orders, by_owner)| {
            orders.insert(record.id.as_bytes(), bytes.clone())?;
            by_owner.insert(index_key.clone(), record.id.as_bytes())?;
            Ok::<_, ConflictableTransactionError<StoreError>>(())
        })?;

        info!(
            order_id = %record.id,
            user_id = %record.owner_id,
            price = %record.price,
            discount = record.discount_applied,
            "Order stored"
        );
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<OrderRecord>, StoreError> {
        match self.orders.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Orders of `owner`, newest first.
    pub fn list_by_owner(&self, owner: UserId) -> Result<Vec<OrderRecord>, StoreError> {
        let mut out = Vec::new();
        for entry in self.by_owner.scan_prefix(owner.to_key()).rev() {
            let (_, order_id) = entry?;
            if let Some(bytes) = self.orders.get(&order_id)? {
                out.push(minicbor::decode(&bytes)?);
            }
        }
        Ok(out)
    }

    /// The most recently created order of `owner` that is still pending.
    pub fn find_latest_pending_by_owner(&self, owner: UserId) -> Result<Option<OrderRecord>, StoreError> {
        for entry in self.by_owner.scan_prefix(owner.to_key()).rev() {
            let (_, order_id) = entry?;
            let Some(bytes) = self.orders.get(&order_id)? else {
                continue;
            };
            let order: OrderRecord = minicbor::decode(&bytes)?;
            if order.status == OrderStatus::Pending {
                return Ok(Some(order));
            }
        }
        Ok(None)
    }

    /// Move a pending order to a final status. A final status is never changed.
    pub fn set_status(&self, id: &str, status: OrderStatus) -> Result<OrderRecord, StoreError> {
        let updated = self.orders.transaction(|orders| {
            let Some(bytes) = orders.get(id.as_bytes())? else {
                return abort(StoreError::OrderNotFound(id.to_string()));
            };
            let mut order: OrderRecord = minicbor::decode(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(StoreError::Decode(e)))?;
            if order.status.is_final() || !status.is_final() {
                return abort(StoreError::StatusAlreadyFinal {
                    id: order.id.clone(),
                    status: order.status,
                });
            }
            order.status = status;
            order.status_changed_at = Some(TimeStamp::new());
            let bytes = encode(&order).map_err(ConflictableTransactionError::Abort)?;
            orders.insert(id.as_bytes(), bytes)?;
            Ok(order)
        })?;

        info!(order_id = %updated.id, user_id = %updated.owner_id, status = %updated.status, "Order status changed");
        Ok(updated)
    }

    /// Remember which order an operator notification describes.
    pub fn link_notification(&self, reference: &str, order_id: &str) -> Result<(), StoreError> {
        self.notifications.insert(reference.as_bytes(), order_id.as_bytes())?;
        debug!(reference, order_id, "Notification linked");
        Ok(())
    }

    pub fn order_for_notification(&self, reference: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .notifications
            .get(reference.as_bytes())?
            .map(|id| String::from_utf8_lossy(&id).into_owned()))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
