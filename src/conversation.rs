//! Conversation state machine
//!
//! Every inbound event is processed inside the sender's session lock. The
//! handlers work on a copy of the session which replaces the stored one only
//! when processing succeeds, so a failed store call leaves the session as it
//! was before the event.
use super::catalog::Catalog;
use super::config::{BotConfig, VerificationConfig};
use super::error::{BotError, StoreError, ValidationError};
use super::event::{Callback, Event, EventKind};
use super::lifecycle::OrderLifecycle;
use super::model::{UserId, UserRecord};
use super::referral::ReferralLedger;
use super::reply::{
    MENU_CATALOG, MENU_REFERRAL, MENU_SUPPORT, Markup, Reply, catalog_choices, challenge_choices,
    region_choices, weight_choices,
};
use super::session::{ConversationSession, ConversationState, DraftOrder, SessionRegistry};
use super::user_store::UserStore;
use super::session::ConversationState::*;
use tracing::{debug, info, warn};

pub struct Conversation {
    bot: BotConfig,
    verification: VerificationConfig,
    welcome: String,
    catalog: Catalog,
    users: UserStore,
    ledger: ReferralLedger,
    lifecycle: OrderLifecycle,
    sessions: SessionRegistry,
}

impl Conversation {
    pub fn new(
        bot: BotConfig,
        verification: VerificationConfig,
        catalog: Catalog,
        users: UserStore,
        ledger: ReferralLedger,
        lifecycle: OrderLifecycle,
    ) -> Self {
        let welcome = bot.load_welcome();
        Self {
            bot,
            verification,
            welcome,
            catalog,
            users,
            ledger,
            lifecycle,
            sessions: SessionRegistry::new(),
        }
    }

    /// Current state of `user_id`. Resting sessions are not kept, so a
    /// verified user without one is in the main menu.
    pub fn state(&self, user_id: UserId) -> ConversationState {
        if let Some(session) = self.sessions.snapshot(user_id) {
            return session.state;
        }
        match self.users.get(user_id) {
            Ok(Some(user)) if user.verified => MainMenu,
            Ok(_) => Idle,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User lookup failed");
                Idle
            }
        }
    }

    /// Number of sessions currently held in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, user_id: UserId) -> Option<ConversationSession> {
        self.sessions.snapshot(user_id)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Apply one inbound event and return what to show the user next.
    pub fn handle(&self, event: &Event) -> Result<Vec<Reply>, BotError> {
        self.sessions.with_session(event.user_id, |session| -> Result<Vec<Reply>, BotError> {
            let mut working = session.clone();
            let replies = self.dispatch(&mut working, event)?;
            if working.state != session.state {
                debug!(user_id = %event.user_id, from = ?session.state, to = ?working.state, "Transition");
            }
            *session = working;
            Ok(replies)
        })
    }

    fn dispatch(&self, s: &mut ConversationSession, event: &Event) -> Result<Vec<Reply>, BotError> {
        if let EventKind::Command { name, args } = &event.kind {
            if name == "start" {
                return self.on_start(s, args.first().map(String::as_str));
            }
        }

        // sessions are not durable; a registered user resumes at the menu
        if s.state == Idle {
            match self.users.get(s.user_id)? {
                Some(user) if user.verified => s.reset_to_menu(),
                _ => return Ok(vec![Reply::text("Send /start to begin.")]),
            }
        }

        match &event.kind {
            EventKind::ButtonPress(data) => self.on_button(s, event, data),
            EventKind::TextMessage(text) if matches!(s.state, MainMenu | BrowsingCatalog | BrowsingWeights) => {
                self.on_menu_text(s, text)
            }
            EventKind::ImageUpload(file_ref) if s.state == AwaitingPaymentProof => {
                self.on_payment_proof(s, event, file_ref)
            }
            _ => Ok(self.reprompt(s)),
        }
    }

    fn on_start(&self, s: &mut ConversationSession, code: Option<&str>) -> Result<Vec<Reply>, BotError> {
        let code = code.map(str::trim).filter(|c| !c.is_empty());
        info!(user_id = %s.user_id, referral_code = ?code, "Start command");

        if let Some(user) = self.users.get(s.user_id)? {
            if user.verified {
                s.reset_to_menu();
                let mut replies = vec![self.welcome()];
                if code.is_some() {
                    replies.push(Reply::text(
                        "You are already registered, so the invitation was not counted.",
                    ));
                }
                return Ok(replies);
            }
        }

        // a referral credited during an earlier verification attempt stays put
        let credited = s.pending_referrer_id;
        *s = ConversationSession::new(s.user_id);
        s.state = AwaitingVerification;
        match credited {
            Some(referrer) => s.pending_referrer_id = Some(referrer),
            None => s.pending_referral_code = code.map(str::to_string),
        }

        Ok(vec![self.challenge_prompt(format!(
            "Hi! Before we start, let's make sure you are not a bot. Find and press the {} emoji.",
            self.verification.correct_option
        ))])
    }

    fn on_button(&self, s: &mut ConversationSession, event: &Event, data: &str) -> Result<Vec<Reply>, BotError> {
        let callback = match Callback::parse(data) {
            Ok(callback) => callback,
            Err(e) => {
                debug!(user_id = %s.user_id, error = %e, "Ignoring button payload");
                return Ok(self.stale(s));
            }
        };

        match (s.state, callback) {
            (AwaitingVerification, Callback::Challenge(option)) => self.on_challenge(s, &option),
            (AwaitingRegion, Callback::Region(region)) => self.on_region(s, event, &region),
            (BrowsingCatalog | BrowsingWeights, Callback::Product(id)) => Ok(self.on_product(s, &id)),
            (BrowsingWeights, Callback::BackToCatalog) => Ok(self.show_catalog(s)),
            (BrowsingWeights, Callback::Buy { product_id, weight }) => self.on_weight(s, &product_id, weight),
            _ => Ok(self.stale(s)),
        }
    }

    fn on_challenge(&self, s: &mut ConversationSession, option: &str) -> Result<Vec<Reply>, BotError> {
        if option != self.verification.correct_option {
            debug!(user_id = %s.user_id, "Verification challenge failed");
            return Ok(vec![self.challenge_prompt("Wrong, try again.".to_string())]);
        }

        if let Some(code) = s.pending_referral_code.take() {
            if s.pending_referrer_id.is_none() {
                // codes belong to registered users only, so this is never the sender
                match self.ledger.resolve_referrer(&code)? {
                    Some(referrer) => {
                        self.ledger.credit_referral(referrer.id)?;
                        s.pending_referrer_id = Some(referrer.id);
                        info!(user_id = %s.user_id, referrer = %referrer.id, "Referral attributed");
                    }
                    None => warn!(user_id = %s.user_id, code = %code, "Referral code not found"),
                }
            }
        }

        s.state = AwaitingRegion;
        Ok(vec![Reply::with_markup(
            "Verification passed! Now choose your city:",
            region_choices(&self.verification.regions),
        )])
    }

    fn on_region(&self, s: &mut ConversationSession, event: &Event, region: &str) -> Result<Vec<Reply>, BotError> {
        if !self.verification.regions.iter().any(|r| r == region) {
            let e = ValidationError::UnknownRegion(region.to_string());
            warn!(user_id = %s.user_id, error = %e, "Region rejected");
            return Ok(vec![Reply::with_markup(
                "Please choose a city from the list.",
                region_choices(&self.verification.regions),
            )]);
        }

        let user = self.ledger.register(UserRecord {
            display_name: event.display_name.clone(),
            region: Some(region.to_string()),
            verified: true,
            referred_by: s.pending_referrer_id,
            ..UserRecord::new(s.user_id)
        })?;
        info!(
            user_id = %user.id,
            region,
            referral_code = ?user.referral_code,
            referred_by = ?user.referred_by,
            "User registered"
        );

        s.reset_to_menu();
        Ok(vec![Reply::text(format!("Your city is {region}!")), self.welcome()])
    }

    fn on_menu_text(&self, s: &mut ConversationSession, text: &str) -> Result<Vec<Reply>, BotError> {
        match text.trim() {
            MENU_CATALOG => Ok(self.show_catalog(s)),
            MENU_REFERRAL => {
                s.reset_to_menu();
                self.show_referral(s.user_id)
            }
            MENU_SUPPORT => {
                s.reset_to_menu();
                Ok(vec![Reply::text(format!(
                    "For any questions, contact the operator: {}",
                    self.bot.support_contact
                ))])
            }
            _ => Ok(self.reprompt(s)),
        }
    }

    fn show_catalog(&self, s: &mut ConversationSession) -> Vec<Reply> {
        if self.catalog.is_empty() {
            s.reset_to_menu();
            return vec![Reply::text("The catalog is temporarily empty. Please come back later.")];
        }
        s.state = BrowsingCatalog;
        s.selected_product_id = None;
        vec![Reply::with_markup("Our catalog:", catalog_choices(&self.catalog))]
    }

    fn show_referral(&self, user_id: UserId) -> Result<Vec<Reply>, BotError> {
        let user = self.users.get(user_id)?;
        let Some((code, count)) = user.and_then(|u| Some((u.referral_code?, u.referral_count))) else {
            warn!(user_id = %user_id, "Referral code missing");
            return Ok(vec![Reply::text(
                "Your referral code was not found. Please contact support.",
            )]);
        };

        let percent = self.ledger.settings().discount_percent;
        let progress = self.ledger.progress(count);
        let status = if progress.earned() {
            format!("🎉 You have earned a {percent}% discount on your next purchase!")
        } else {
            format!(
                "You have invited {}/{} people. Invite {} more to get a {percent}% discount!",
                progress.count,
                progress.threshold,
                progress.remaining()
            )
        };
        Ok(vec![Reply::text(format!(
            "Your unique referral link:\n{}\n\n{status}",
            self.bot.referral_link(&code)
        ))])
    }

    fn on_product(&self, s: &mut ConversationSession, product_id: &str) -> Vec<Reply> {
        let Some(product) = self.catalog.get(product_id) else {
            warn!(user_id = %s.user_id, product_id, "Unknown product selected");
            s.reset_to_menu();
            return vec![Reply::with_markup(
                "This product does not exist. Returning to the main menu.",
                Markup::MainMenu,
            )];
        };

        s.selected_product_id = Some(product_id.to_string());
        s.draft = None;
        s.state = BrowsingWeights;
        vec![Reply::Photo {
            image_ref: product.image_ref.clone(),
            caption: format!("{}\n\n{}\n\nChoose a weight:", product.name, product.description),
            markup: weight_choices(product_id, product),
        }]
    }

    fn on_weight(&self, s: &mut ConversationSession, product_id: &str, weight: u32) -> Result<Vec<Reply>, BotError> {
        let (product, list_price) = match self.catalog.price_for(product_id, weight) {
            Ok(found) => found,
            Err(e) => {
                warn!(user_id = %s.user_id, error = %e, "Invalid purchase selection");
                let mut replies = vec![Reply::text(format!("Error: {e}."))];
                replies.extend(self.show_catalog(s));
                return Ok(replies);
            }
        };

        let user = self
            .users
            .get(s.user_id)?
            .ok_or(StoreError::UserNotFound(s.user_id))?;
        let quote = self.ledger.quote(user.referral_count, list_price);

        s.selected_product_id = Some(product_id.to_string());
        s.draft = Some(DraftOrder {
            product_id: product_id.to_string(),
            product_name: product.name.clone(),
            weight,
            price: quote.price,
            discount_applied: quote.discount_applied,
        });
        s.state = AwaitingPaymentProof;

        let mut replies = Vec::new();
        if quote.discount_applied {
            replies.push(Reply::text(format!(
                "🎉 Congratulations! Your {}% discount is active!",
                self.ledger.settings().discount_percent
            )));
        }
        replies.push(Reply::text(format!(
            "Great! Your order of {weight} g of {} for {} is accepted.\nPlease transfer the amount to our card, then send a screenshot of the receipt to this chat.",
            product.name, quote.price
        )));
        Ok(replies)
    }

    fn on_payment_proof(&self, s: &mut ConversationSession, event: &Event, file_ref: &str) -> Result<Vec<Reply>, BotError> {
        let Some(draft) = s.draft.clone() else {
            let e = ValidationError::MissingDraft;
            warn!(user_id = %s.user_id, error = %e, "Payment proof without draft");
            s.reset_to_menu();
            return Ok(vec![Reply::with_markup(
                "Something went wrong with your order. Please start again with /start.",
                Markup::MainMenu,
            )]);
        };

        let display_name = match &event.display_name {
            Some(name) => Some(name.clone()),
            None => self.users.get(s.user_id)?.and_then(|u| u.display_name),
        };
        let order = self
            .lifecycle
            .submit(s.user_id, display_name.as_deref(), &draft, file_ref)?;

        s.reset_to_menu();
        Ok(vec![Reply::with_markup(
            format!(
                "Thank you, your screenshot has been received! Order {} is waiting for the operator. I will notify you as soon as the payment is confirmed.\n\nIf you have any questions, contact support: {}",
                order.id, self.bot.support_contact
            ),
            Markup::MainMenu,
        )])
    }

    fn welcome(&self) -> Reply {
        Reply::with_markup(self.welcome.clone(), Markup::MainMenu)
    }

    fn challenge_prompt(&self, text: String) -> Reply {
        Reply::with_markup(text, challenge_choices(&self.verification.challenge_options))
    }

    fn stale(&self, s: &ConversationSession) -> Vec<Reply> {
        if s.state == MainMenu {
            return vec![Reply::Alert(
                "This action is no longer relevant. Please choose an action from the menu.".into(),
            )];
        }
        let mut replies = vec![Reply::Alert("This button is no longer active.".into())];
        replies.extend(self.reprompt(s));
        replies
    }

    /// Neutral nudge for input that is not legal in the current state.
    fn reprompt(&self, s: &ConversationSession) -> Vec<Reply> {
        let reply = match s.state {
            Idle => Reply::text("Send /start to begin."),
            AwaitingVerification => self.challenge_prompt(format!(
                "Please press the {} emoji.",
                self.verification.correct_option
            )),
            AwaitingRegion => Reply::with_markup(
                "Please choose your city:",
                region_choices(&self.verification.regions),
            ),
            MainMenu => Reply::with_markup("Please choose an action from the menu.", Markup::MainMenu),
            BrowsingCatalog => Reply::text("Please pick a product from the list above."),
            BrowsingWeights => Reply::text("Please pick a weight or go back to the catalog."),
            AwaitingPaymentProof => Reply::text("Please send a screenshot of the payment as a photo."),
        };
        vec![reply]
    }
}
