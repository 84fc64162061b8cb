//! Shared fixtures for the integration tests
#![allow(dead_code)]

use chat_commerce::catalog::Catalog;
use chat_commerce::config::Config;
use chat_commerce::event::Event;
use chat_commerce::model::UserId;
use chat_commerce::notify::{NotificationSink, OrderNotice};
use chat_commerce::reply::Reply;
use chat_commerce::service::ShopService;
use chat_commerce::session::ConversationState;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{TempDir, tempdir};

pub const OPERATOR: UserId = UserId(900);

pub const CATALOG_JSON: &str = r#"{
    "1": {
        "name": "Gold",
        "description": "Fine gold",
        "photo": "photo-gold",
        "weights": { "10": 500, "5": 300 }
    },
    "2": {
        "name": "Silver",
        "description": "Sterling",
        "photo": "photo-silver",
        "weights": { "100": 1000 }
    }
}"#;

/// Sink that records everything and can be told to fail operator delivery.
#[derive(Default)]
pub struct RecordingSink {
    pub notices: Mutex<Vec<(String, OrderNotice)>>,
    pub user_messages: Mutex<Vec<(UserId, String)>>,
    pub fail_operator: AtomicBool,
    next_ref: AtomicU64,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<(String, OrderNotice)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn messages_to(&self, user: UserId) -> Vec<String> {
        self.user_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify_operator(&self, notice: &OrderNotice) -> anyhow::Result<Option<String>> {
        if self.fail_operator.load(Ordering::SeqCst) {
            anyhow::bail!("operator channel unreachable");
        }
        let reference = format!("msg-{}", self.next_ref.fetch_add(1, Ordering::SeqCst) + 1);
        self.notices
            .lock()
            .unwrap()
            .push((reference.clone(), notice.clone()));
        Ok(Some(reference))
    }

    fn notify_user(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        self.user_messages
            .lock()
            .unwrap()
            .push((user_id, text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    // keeps the database directory alive for the duration of the test
    pub _dir: TempDir,
    pub service: ShopService,
    pub sink: Arc<RecordingSink>,
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.bot.operator_chat_id = OPERATOR.0;
    config.bot.username = "TestShopBot".to_string();
    config
}

pub fn setup() -> anyhow::Result<Harness> {
    setup_with(config(), Catalog::from_json_str(CATALOG_JSON)?)
}

pub fn setup_with(config: Config, catalog: Catalog) -> anyhow::Result<Harness> {
    let dir = tempdir()?;
    let db = Arc::new(sled::open(dir.path().join("shop.db"))?);
    let sink = Arc::new(RecordingSink::default());
    let service = ShopService::new(db, &config, catalog, sink.clone())?;
    Ok(Harness {
        _dir: dir,
        service,
        sink,
    })
}

impl Harness {
    pub fn send(&self, event: Event) -> Vec<Reply> {
        self.service.handle_event(&event)
    }

    /// Walk a user through start, challenge and region selection.
    pub fn register(&self, user: UserId, referral_code: Option<&str>) -> Vec<Reply> {
        self.send(Event::start(user, referral_code));
        self.send(Event::button(user, "captcha_⏰"));
        let replies = self.send(Event::button(user, "city_Almaty"));
        assert_eq!(self.service.state(user), ConversationState::MainMenu);
        replies
    }

    pub fn code_of(&self, user: UserId) -> String {
        self.service
            .user(user)
            .unwrap()
            .and_then(|u| u.referral_code)
            .expect("registered user has a code")
    }

    /// Register a user and credit `count` referrals to them directly.
    pub fn register_with_referrals(&self, user: UserId, count: u32) {
        self.register(user, None);
        for _ in 0..count {
            self.service.ledger().credit_referral(user).unwrap();
        }
    }

    /// From the main menu, pick a product and weight.
    pub fn choose(&self, user: UserId, product_id: &str, weight: u32) -> Vec<Reply> {
        self.send(Event::text(user, chat_commerce::reply::MENU_CATALOG));
        self.send(Event::button(user, format!("product_{product_id}")));
        self.send(Event::button(user, format!("buy_{product_id}_{weight}")))
    }
}

pub fn bodies(replies: &[Reply]) -> Vec<String> {
    replies.iter().map(|r| r.body().to_string()).collect()
}

pub fn any_contains(replies: &[Reply], needle: &str) -> bool {
    replies.iter().any(|r| r.body().contains(needle))
}
