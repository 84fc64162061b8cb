//! sled-backed user records with a unique referral code index
use super::error::StoreError;
use super::model::{UserId, UserRecord};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, abort};
use tracing::{debug, info};

const USERS_TREE: &str = "users";
const CODES_TREE: &str = "referral_codes";

/// Trees are reference counted by sled, so clones share the same storage.
#[derive(Clone)]
pub struct UserStore {
    users: sled::Tree,
    codes: sled::Tree, // referral code -> user id
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))
}

impl UserStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            users: db.open_tree(USERS_TREE)?,
            codes: db.open_tree(CODES_TREE)?,
        })
    }

    pub fn get(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        match self.users.get(id.to_key())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_referral_code(&self, code: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(owner) = self.codes.get(code.as_bytes())? else {
            return Ok(None);
        };
        match UserId::from_key(&owner) {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    pub fn code_taken(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.codes.contains_key(code.as_bytes())?)
    }

    /// Insert or merge a user record in one transaction.
    ///
    /// An existing record keeps its referral code, its `referred_by` and the
    /// larger referral count; a new code must not belong to anyone else.
    pub fn upsert(&self, record: &UserRecord) -> Result<UserRecord, StoreError> {
        let key = record.id.to_key();
        let stored = (&self.users, &self.codes).transaction(|(users, codes)| {
            let existing = match users.get(key)? {
                Some(bytes) => Some(
                    minicbor::decode::<UserRecord>(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(StoreError::Decode(e)))?,
                ),
                None => None,
            };
            let merged = merge(existing.as_ref(), record);

            let previous_code = existing.as_ref().and_then(|u| u.referral_code.clone());
            if let Some(code) = merged.referral_code.as_deref() {
                if previous_code.as_deref() != Some(code) {
                    if let Some(owner) = codes.get(code.as_bytes())? {
                        if owner.as_ref() != key.as_slice() {
                            return abort(StoreError::DuplicateReferralCode(code.to_string()));
                        }
                    }
                    codes.insert(code.as_bytes(), key.to_vec())?;
                }
            }

            let bytes = encode(&merged).map_err(ConflictableTransactionError::Abort)?;
            users.insert(key.to_vec(), bytes)?;
            Ok(merged)
        })?;

        info!(user_id = %stored.id, verified = stored.verified, "User record stored");
        Ok(stored)
    }

    /// Atomically add one to the user's referral count; returns the new count.
    pub fn increment_referral_count(&self, id: UserId) -> Result<u32, StoreError> {
        let key = id.to_key();
        let count = self.users.transaction(|users| {
            let Some(bytes) = users.get(key)? else {
                return abort(StoreError::UserNotFound(id));
            };
            let mut user: UserRecord = minicbor::decode(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(StoreError::Decode(e)))?;
            user.referral_count = user.referral_count.saturating_add(1);
            let bytes = encode(&user).map_err(ConflictableTransactionError::Abort)?;
            users.insert(key.to_vec(), bytes)?;
            Ok(user.referral_count)
        })?;

        debug!(user_id = %id, referral_count = count, "Referral count incremented");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn merge(existing: Option<&UserRecord>, incoming: &UserRecord) -> UserRecord {
    let Some(old) = existing else {
        return incoming.clone();
    };
    UserRecord {
        id: old.id,
        display_name: incoming.display_name.clone().or_else(|| old.display_name.clone()),
        region: incoming.region.clone().or_else(|| old.region.clone()),
        verified: old.verified || incoming.verified,
        referral_code: old.referral_code.clone().or_else(|| incoming.referral_code.clone()),
        referred_by: old.referred_by,
        referral_count: old.referral_count.max(incoming.referral_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("users.db")).unwrap();
        (dir, UserStore::open(&db).unwrap())
    }

    fn verified(id: i64, code: &str) -> UserRecord {
        UserRecord {
            verified: true,
            referral_code: Some(code.into()),
            region: Some("Almaty".into()),
            ..UserRecord::new(UserId(id))
        }
    }

    #[test]
    fn lookup_by_id_and_code() {
        let (_dir, store) = store();
        store.upsert(&verified(1, "AAAAAA")).unwrap();

        assert_eq!(store.get(UserId(1)).unwrap().unwrap().referral_code.as_deref(), Some("AAAAAA"));
        assert_eq!(store.get_by_referral_code("AAAAAA").unwrap().unwrap().id, UserId(1));
        assert!(store.get_by_referral_code("ZZZZZZ").unwrap().is_none());
        assert!(store.code_taken("AAAAAA").unwrap());
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let (_dir, store) = store();
        store.upsert(&verified(1, "AAAAAA")).unwrap();

        let err = store.upsert(&verified(2, "AAAAAA")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReferralCode(code) if code == "AAAAAA"));
        assert!(store.get(UserId(2)).unwrap().is_none());
    }

    #[test]
    fn upsert_never_rewrites_code_or_referrer() {
        let (_dir, store) = store();
        let mut first = verified(1, "AAAAAA");
        first.referred_by = Some(UserId(7));
        store.upsert(&first).unwrap();

        let mut second = verified(1, "BBBBBB");
        second.referred_by = Some(UserId(8));
        let merged = store.upsert(&second).unwrap();

        assert_eq!(merged.referral_code.as_deref(), Some("AAAAAA"));
        assert_eq!(merged.referred_by, Some(UserId(7)));
        assert!(!store.code_taken("BBBBBB").unwrap());
    }

    #[test]
    fn referrer_cannot_be_added_later() {
        let (_dir, store) = store();
        store.upsert(&verified(2, "AAAAAA")).unwrap();

        let mut late = verified(2, "AAAAAA");
        late.referred_by = Some(UserId(1));
        let merged = store.upsert(&late).unwrap();

        assert_eq!(merged.referred_by, None);
        assert_eq!(store.get(UserId(2)).unwrap().unwrap().referred_by, None);
    }

    #[test]
    fn increment_is_monotonic() {
        let (_dir, store) = store();
        store.upsert(&verified(1, "AAAAAA")).unwrap();

        assert_eq!(store.increment_referral_count(UserId(1)).unwrap(), 1);
        assert_eq!(store.increment_referral_count(UserId(1)).unwrap(), 2);

        // a stale record with a lower count does not roll the counter back
        let merged = store.upsert(&verified(1, "AAAAAA")).unwrap();
        assert_eq!(merged.referral_count, 2);

        assert!(matches!(
            store.increment_referral_count(UserId(99)).unwrap_err(),
            StoreError::UserNotFound(UserId(99))
        ));
    }
}
