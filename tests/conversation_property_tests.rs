//! Property-based tests for the conversation state machine and referral rules
//!
//! Random event streams are replayed against a fresh database to check that
//! the bot never panics and never leaves the store in a state the
//! conversation rules forbid.

mod common;

use chat_commerce::config::ReferralConfig;
use chat_commerce::event::Event;
use chat_commerce::model::{Price, UserId, UserRecord};
use chat_commerce::referral::ReferralLedger;
use chat_commerce::reply::{MENU_CATALOG, MENU_REFERRAL, MENU_SUPPORT};
use chat_commerce::session::ConversationState;
use chat_commerce::user_store::UserStore;
use common::setup;
use proptest::prelude::*;
use std::collections::HashSet;

// PROPERTY TEST STRATEGIES

/// Any event a user could plausibly send, legal in the current state or not.
fn event_strategy(user: UserId) -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::start(user, None)),
        Just(Event::start(user, Some("ABC123"))),
        prop::sample::select(vec!["🍎", "⏰", "🍏", "🍊"])
            .prop_map(move |opt| Event::button(user, format!("captcha_{opt}"))),
        prop::sample::select(vec!["Almaty", "Astana", "Paris"])
            .prop_map(move |city| Event::button(user, format!("city_{city}"))),
        prop::sample::select(vec!["1", "2", "404"])
            .prop_map(move |id| Event::button(user, format!("product_{id}"))),
        (prop::sample::select(vec!["1", "2"]), prop::sample::select(vec![5u32, 10, 100, 7]))
            .prop_map(move |(id, w)| Event::button(user, format!("buy_{id}_{w}"))),
        Just(Event::button(user, "back_to_catalog")),
        Just(Event::button(user, "catalog_empty")),
        "[a-z_0-9]{0,12}".prop_map(move |junk| Event::button(user, junk)),
        prop::sample::select(vec![MENU_CATALOG, MENU_REFERRAL, MENU_SUPPORT, "hello"])
            .prop_map(move |text| Event::text(user, text)),
        "[a-z0-9]{1,8}".prop_map(move |file| Event::image(user, file)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Random event streams never panic, always produce a reply and keep
    /// drafts and stored records consistent with the session state.
    #[test]
    fn random_events_keep_invariants(events in prop::collection::vec(event_strategy(UserId(1)), 1..40)) {
        let h = setup().unwrap();
        let user = UserId(1);

        for event in &events {
            let replies = h.send(event.clone());
            prop_assert!(!replies.is_empty());

            let state = h.service.state(user);
            let session = h.service.session(user);
            let draft = session.as_ref().and_then(|s| s.draft.clone());
            prop_assert_eq!(draft.is_some(), state == ConversationState::AwaitingPaymentProof);

            let stored = h.service.user(user).unwrap();
            if matches!(state, ConversationState::MainMenu
                | ConversationState::BrowsingCatalog
                | ConversationState::BrowsingWeights
                | ConversationState::AwaitingPaymentProof)
            {
                let stored = stored.expect("menu states need a registered user");
                prop_assert!(stored.verified);
                prop_assert!(stored.referral_code.is_some());
            }
        }

        for order in h.service.orders().list_by_owner(user).unwrap() {
            prop_assert!(order.price.minor() > 0);
        }
    }

    /// Without the correct challenge answer no user record is ever created.
    #[test]
    fn wrong_answers_never_register(events in prop::collection::vec(
        event_strategy(UserId(2)).prop_filter("no correct answer", |e| {
            !matches!(&e.kind, chat_commerce::event::EventKind::ButtonPress(p) if p == "captcha_⏰")
        }),
        1..30,
    )) {
        let h = setup().unwrap();
        for event in events {
            h.send(event);
        }
        prop_assert!(h.service.user(UserId(2)).unwrap().is_none());
        prop_assert!(h.service.users().is_empty());
    }

    /// Every registered user holds a distinct code that resolves back to them.
    #[test]
    fn minted_codes_are_distinct(n in 1usize..40) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("codes.db")).unwrap();
        let users = UserStore::open(&db).unwrap();
        // a tiny code space forces collisions and retries
        let settings = ReferralConfig { code_length: 2, max_mint_attempts: 2000, ..ReferralConfig::default() };
        let ledger = ReferralLedger::new(users.clone(), settings);

        let mut seen = HashSet::new();
        for i in 0..n {
            let stored = ledger.register(UserRecord::new(UserId(i as i64))).unwrap();
            let code = stored.referral_code.unwrap();
            prop_assert_eq!(code.len(), 2);
            prop_assert!(seen.insert(code.clone()));
            prop_assert_eq!(ledger.resolve_referrer(&code).unwrap().map(|u| u.id), Some(UserId(i as i64)));
        }
    }

    /// The discount applies exactly from the threshold on and never raises the price.
    #[test]
    fn discount_threshold_holds(count in 0u32..20, threshold in 0u32..10, percent in 0u32..=100, minor in 1u64..10_000_000) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("quote.db")).unwrap();
        let users = UserStore::open(&db).unwrap();
        let settings = ReferralConfig {
            discount_threshold: threshold,
            discount_percent: percent,
            ..ReferralConfig::default()
        };
        let ledger = ReferralLedger::new(users, settings);
        let list = Price::from_minor(minor);

        let quote = ledger.quote(count, list);
        prop_assert_eq!(quote.discount_applied, count >= threshold);
        prop_assert!(quote.price <= list);
        if !quote.discount_applied {
            prop_assert_eq!(quote.price, list);
        }
    }
}
