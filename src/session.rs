//! Per-user conversation sessions
use super::model::{Price, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
    /// No contact yet, or the session was dropped.
    #[default]
    Idle,
    AwaitingVerification,
    AwaitingRegion,
    MainMenu,
    BrowsingCatalog,
    BrowsingWeights,
    AwaitingPaymentProof,
}

/// Purchase details held in the session until a payment proof arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOrder {
    pub product_id: String,
    pub product_name: String,
    pub weight: u32,
    pub price: Price,
    pub discount_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    pub user_id: UserId,
    pub state: ConversationState,
    pub pending_referral_code: Option<String>,
    pub pending_referrer_id: Option<UserId>,
    pub selected_product_id: Option<String>,
    pub draft: Option<DraftOrder>,
}

impl ConversationSession {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: ConversationState::Idle,
            pending_referral_code: None,
            pending_referrer_id: None,
            selected_product_id: None,
            draft: None,
        }
    }

    /// No transient data and nothing in flight. Such a session carries no
    /// information the store cannot rebuild.
    pub fn is_resting(&self) -> bool {
        matches!(self.state, ConversationState::Idle | ConversationState::MainMenu)
            && self.pending_referral_code.is_none()
            && self.pending_referrer_id.is_none()
            && self.selected_product_id.is_none()
            && self.draft.is_none()
    }

    /// Drop all transient data and rest in the main menu.
    pub fn reset_to_menu(&mut self) {
        *self = Self {
            state: ConversationState::MainMenu,
            ..Self::new(self.user_id)
        };
    }
}

type SharedSession = Arc<Mutex<ConversationSession>>;

/// Keyed map of sessions. The outer lock only guards the map; each session has
/// its own lock, which callers hold for the whole processing of one event.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, SharedSession>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, user_id: UserId) -> SharedSession {
        let mut sessions = lock(&self.sessions);
        sessions
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(ConversationSession::new(user_id))))
            .clone()
    }

    /// Run `f` inside the user's critical section. A session left resting is
    /// dropped from the map unless another caller is already waiting on it.
    pub fn with_session<R>(&self, user_id: UserId, f: impl FnOnce(&mut ConversationSession) -> R) -> R {
        let session = self.entry(user_id);
        let mut guard = lock(&session);
        let out = f(&mut guard);
        if guard.is_resting() {
            let mut sessions = lock(&self.sessions);
            // only the map and this call hold it
            if Arc::strong_count(&session) == 2 {
                sessions.remove(&user_id);
            }
        }
        out
    }

    pub fn snapshot(&self, user_id: UserId) -> Option<ConversationSession> {
        let session = lock(&self.sessions).get(&user_id).cloned()?;
        let guard = lock(&session);
        Some((*guard).clone())
    }

    pub fn state(&self, user_id: UserId) -> ConversationState {
        self.snapshot(user_id)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }
}
