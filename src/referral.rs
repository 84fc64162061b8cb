//! Referral ledger: code minting, attribution and discount eligibility
use super::config::ReferralConfig;
use super::error::StoreError;
use super::model::{Price, UserId, UserRecord};
use super::user_store::UserStore;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of candidate referral codes. Uniqueness is enforced by the store,
/// not by the generator.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Uppercase alphanumeric codes from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Final price of a purchase after the referral discount check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: Price,
    pub discount_applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub count: u32,
    pub threshold: u32,
}

impl Progress {
    pub fn earned(&self) -> bool {
        self.count >= self.threshold
    }
    pub fn remaining(&self) -> u32 {
        self.threshold.saturating_sub(self.count)
    }
}

#[derive(Clone)]
pub struct ReferralLedger {
    users: UserStore,
    settings: ReferralConfig,
    codes: Arc<dyn CodeGenerator>,
}

impl ReferralLedger {
    pub fn new(users: UserStore, settings: ReferralConfig) -> Self {
        Self::with_generator(users, settings, Arc::new(RandomCodes))
    }

    pub fn with_generator(users: UserStore, settings: ReferralConfig, codes: Arc<dyn CodeGenerator>) -> Self {
        Self { users, settings, codes }
    }

    pub fn settings(&self) -> &ReferralConfig {
        &self.settings
    }

    /// Pure lookup of the user owning `code`.
    pub fn resolve_referrer(&self, code: &str) -> Result<Option<UserRecord>, StoreError> {
        self.users.get_by_referral_code(code)
    }

    /// Add one successful invitee to `referrer`. Callers credit at most once
    /// per verified user; the increment itself is atomic.
    pub fn credit_referral(&self, referrer: UserId) -> Result<u32, StoreError> {
        let count = self.users.increment_referral_count(referrer)?;
        info!(referrer = %referrer, referral_count = count, "Referral credited");
        Ok(count)
    }

    /// A code no user currently holds. The final guarantee comes from the
    /// store's unique index at insert time, see [`ReferralLedger::register`].
    pub fn mint_unique_code(&self) -> Result<String, StoreError> {
        for _ in 0..self.settings.max_mint_attempts.max(1) {
            let code = self.codes.generate(self.settings.code_length);
            if !self.users.code_taken(&code)? {
                return Ok(code);
            }
            warn!(code = %code, "Referral code collision, retrying");
        }
        Err(StoreError::CodeSpaceExhausted(self.settings.max_mint_attempts))
    }

    /// Persist `user` with a freshly minted code, retrying when a concurrent
    /// registration claims the same code between minting and insert.
    pub fn register(&self, mut user: UserRecord) -> Result<UserRecord, StoreError> {
        if let Some(existing) = self.users.get(user.id)? {
            if existing.referral_code.is_some() {
                return self.users.upsert(&user);
            }
        }
        let attempts = self.settings.max_mint_attempts.max(1);
        for _ in 0..attempts {
            user.referral_code = Some(self.mint_unique_code()?);
            match self.users.upsert(&user) {
                Ok(stored) => return Ok(stored),
                Err(StoreError::DuplicateReferralCode(code)) => {
                    warn!(code = %code, user_id = %user.id, "Referral code claimed concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::CodeSpaceExhausted(attempts))
    }

    /// Apply the referral discount when `referral_count` has reached the threshold.
    pub fn quote(&self, referral_count: u32, list_price: Price) -> Quote {
        if referral_count >= self.settings.discount_threshold {
            Quote {
                price: list_price.discounted(self.settings.discount_percent),
                discount_applied: true,
            }
        } else {
            Quote {
                price: list_price,
                discount_applied: false,
            }
        }
    }

    pub fn progress(&self, referral_count: u32) -> Progress {
        Progress {
            count: referral_count,
            threshold: self.settings.discount_threshold,
        }
    }
}
