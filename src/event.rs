//! Inbound events and button payloads
use super::error::ValidationError;
use super::model::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `/name args...`
    Command { name: String, args: Vec<String> },
    /// Raw payload of a pressed inline button
    ButtonPress(String),
    TextMessage(String),
    /// Transport reference of the uploaded image
    ImageUpload(String),
}

impl Event {
    pub fn new(user_id: UserId, kind: EventKind) -> Self {
        Self {
            user_id,
            display_name: None,
            kind,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn start(user_id: UserId, referral_code: Option<&str>) -> Self {
        let args = referral_code.map(|c| vec![c.to_string()]).unwrap_or_default();
        Self::new(user_id, EventKind::Command { name: "start".into(), args })
    }

    pub fn button(user_id: UserId, payload: impl Into<String>) -> Self {
        Self::new(user_id, EventKind::ButtonPress(payload.into()))
    }

    pub fn text(user_id: UserId, text: impl Into<String>) -> Self {
        Self::new(user_id, EventKind::TextMessage(text.into()))
    }

    pub fn image(user_id: UserId, file_ref: impl Into<String>) -> Self {
        Self::new(user_id, EventKind::ImageUpload(file_ref.into()))
    }

    /// Split `/cmd a b` into a command event; any other text is a text message.
    pub fn from_text(user_id: UserId, text: &str) -> Self {
        let Some(rest) = text.trim().strip_prefix('/') else {
            return Self::text(user_id, text);
        };
        let mut parts = rest.split_whitespace();
        let name = parts
            .next()
            .unwrap_or_default()
            .split('@') // `/start@BotName`
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let args = parts.map(str::to_string).collect();
        Self::new(user_id, EventKind::Command { name, args })
    }
}

/// Typed form of the inline button payloads the bot hands out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Challenge(String),
    Region(String),
    Product(String),
    Buy { product_id: String, weight: u32 },
    BackToCatalog,
}

impl Callback {
    pub fn parse(data: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedCallback(data.to_string());
        if data == "back_to_catalog" {
            return Ok(Callback::BackToCatalog);
        }
        if let Some(option) = data.strip_prefix("captcha_") {
            return Ok(Callback::Challenge(option.to_string()));
        }
        if let Some(region) = data.strip_prefix("city_") {
            return Ok(Callback::Region(region.to_string()));
        }
        if let Some(id) = data.strip_prefix("product_") {
            return Ok(Callback::Product(id.to_string()));
        }
        if let Some(rest) = data.strip_prefix("buy_") {
            // product ids may contain '_', the weight never does
            let (product_id, weight) = rest.rsplit_once('_').ok_or_else(malformed)?;
            let weight = weight.parse().map_err(|_| malformed())?;
            if product_id.is_empty() {
                return Err(malformed());
            }
            return Ok(Callback::Buy {
                product_id: product_id.to_string(),
                weight,
            });
        }
        Err(malformed())
    }

    pub fn to_payload(&self) -> String {
        match self {
            Callback::Challenge(option) => format!("captcha_{option}"),
            Callback::Region(region) => format!("city_{region}"),
            Callback::Product(id) => format!("product_{id}"),
            Callback::Buy { product_id, weight } => format!("buy_{product_id}_{weight}"),
            Callback::BackToCatalog => "back_to_catalog".to_string(),
        }
    }
}
