use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::Parser;
use tracing::{info, warn};

use chat_commerce::config::Config;
use chat_commerce::event::Event;
use chat_commerce::lifecycle::{OperatorAction, OperatorCommand, RepliedMessage};
use chat_commerce::model::UserId;
use chat_commerce::notify::{NotificationSink, OrderNotice, SplitSink};
use chat_commerce::reply::{Markup, Reply, main_menu};
use chat_commerce::service::ShopService;

#[derive(Parser)]
#[command(name = "chat-commerce")]
#[command(about = "Console front end for the chat storefront")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "chat-commerce.toml")]
    config: String,

    /// Database directory (overrides config file)
    #[arg(short, long, env = "CHAT_COMMERCE_DATA_DIR")]
    data_dir: Option<String>,

    /// Operator chat id (overrides config file)
    #[arg(long, env = "CHAT_COMMERCE_OPERATOR_ID")]
    operator_id: Option<i64>,
}

/// One bot identity printing to stdout. Operator notices get sequential
/// message references.
struct ConsoleSink {
    identity: &'static str,
    next_ref: AtomicU64,
}

impl ConsoleSink {
    fn new(identity: &'static str) -> Self {
        Self {
            identity,
            next_ref: AtomicU64::new(0),
        }
    }
}

impl NotificationSink for ConsoleSink {
    fn notify_operator(&self, notice: &OrderNotice) -> anyhow::Result<Option<String>> {
        let reference = format!("notice-{}", self.next_ref.fetch_add(1, Ordering::Relaxed) + 1);
        let mut out = io::stdout().lock();
        writeln!(out, "[{} -> operator] <{reference}>\n{}", self.identity, notice.summary_text())?;
        writeln!(out, "[{} -> operator] <photo {}>", self.identity, notice.payment_proof_ref)?;
        Ok(Some(reference))
    }

    fn notify_user(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        writeln!(io::stdout().lock(), "[{} -> {user_id}] {text}", self.identity)?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_commerce=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = PathBuf::from(data_dir);
    }
    if let Some(operator_id) = cli.operator_id {
        config.bot.operator_chat_id = operator_id;
    }
    info!(operator = config.bot.operator_chat_id, data_dir = %config.storage.data_dir.display(), "Starting chat-commerce");

    // order summaries go out through the operator bot, owner updates through the shop bot
    let sink = SplitSink {
        operator: ConsoleSink::new("operator-bot"),
        users: ConsoleSink::new("shop-bot"),
    };
    let service = ShopService::open(&config, Arc::new(sink))?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((user, payload)) = line.split_once(char::is_whitespace) else {
            warn!(line, "Expected `<user id> <payload>`");
            continue;
        };
        let Ok(user) = user.parse::<i64>().map(UserId) else {
            warn!(line, "User id is not a number");
            continue;
        };

        let replies = match operator_command(&service, user, payload.trim()) {
            Some(command) => service.handle_operator_command(&command),
            None => service.handle_event(&parse_event(user, payload.trim())),
        };
        print_replies(user, &replies)?;
    }

    service.flush()?;
    info!("Input closed, database flushed");
    Ok(())
}

/// `/confirm <ref>` or `/reject <ref>` from the operator chat. The argument is
/// the reference of the replied-to notice; without it the reply is malformed.
fn operator_command(service: &ShopService, from: UserId, payload: &str) -> Option<OperatorCommand> {
    if from != service.operator() {
        return None;
    }
    let rest = payload.strip_prefix('/')?;
    let (name, reference) = match rest.split_once(char::is_whitespace) {
        Some((name, reference)) => (name, Some(reference.trim().to_string())),
        None => (rest, None),
    };
    let action = OperatorAction::from_command(name)?;
    Some(OperatorCommand {
        from,
        action,
        reply_to: reference.map(|reference| RepliedMessage {
            reference: Some(reference),
            text: None,
        }),
    })
}

fn parse_event(user: UserId, payload: &str) -> Event {
    if let Some(data) = payload.strip_prefix('#') {
        return Event::button(user, data.trim());
    }
    if let Some(file_ref) = payload.strip_prefix("!photo") {
        return Event::image(user, file_ref.trim());
    }
    Event::from_text(user, payload)
}

fn print_replies(user: UserId, replies: &[Reply]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for reply in replies {
        match reply {
            Reply::Text { text, .. } => writeln!(out, "[to {user}] {text}")?,
            Reply::Photo { image_ref, caption, .. } => {
                writeln!(out, "[to {user}] <photo {image_ref}> {caption}")?
            }
            Reply::Alert(text) => writeln!(out, "[alert {user}] {text}")?,
        }
        match reply.markup() {
            Markup::None => {}
            Markup::MainMenu => writeln!(out, "    menu: {}", main_menu().join(" | "))?,
            Markup::Choices(choices) => {
                for choice in choices {
                    writeln!(out, "    [{}] #{}", choice.label, choice.payload)?;
                }
            }
        }
    }
    Ok(())
}
