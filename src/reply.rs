//! Outbound replies and the option sets shown with them
use super::catalog::{Catalog, Product};
use super::event::Callback;

pub const MENU_CATALOG: &str = "🛒 Catalog";
pub const MENU_REFERRAL: &str = "🔗 Referral link";
pub const MENU_SUPPORT: &str = "🛠 Support";

/// One selectable option: the label shown and the payload sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

impl Choice {
    fn new(label: impl Into<String>, callback: Callback) -> Self {
        Self {
            label: label.into(),
            payload: callback.to_payload(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Markup {
    #[default]
    None,
    /// The persistent reply keyboard with the three menu entries
    MainMenu,
    /// Inline options, one per row
    Choices(Vec<Choice>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text { text: String, markup: Markup },
    Photo { image_ref: String, caption: String, markup: Markup },
    /// Transient popup answering a button press
    Alert(String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text {
            text: text.into(),
            markup: Markup::None,
        }
    }

    pub fn with_markup(text: impl Into<String>, markup: Markup) -> Self {
        Reply::Text {
            text: text.into(),
            markup,
        }
    }

    /// Text of the reply, or caption for photos.
    pub fn body(&self) -> &str {
        match self {
            Reply::Text { text, .. } => text,
            Reply::Photo { caption, .. } => caption,
            Reply::Alert(text) => text,
        }
    }

    pub fn markup(&self) -> &Markup {
        match self {
            Reply::Text { markup, .. } | Reply::Photo { markup, .. } => markup,
            Reply::Alert(_) => &Markup::None,
        }
    }
}

pub fn main_menu() -> Vec<&'static str> {
    vec![MENU_CATALOG, MENU_REFERRAL, MENU_SUPPORT]
}

pub fn challenge_choices(options: &[String]) -> Markup {
    Markup::Choices(
        options
            .iter()
            .map(|opt| Choice::new(opt.as_str(), Callback::Challenge(opt.clone())))
            .collect(),
    )
}

pub fn region_choices(regions: &[String]) -> Markup {
    Markup::Choices(
        regions
            .iter()
            .map(|region| Choice::new(region.as_str(), Callback::Region(region.clone())))
            .collect(),
    )
}

pub fn catalog_choices(catalog: &Catalog) -> Markup {
    Markup::Choices(
        catalog
            .iter()
            .map(|(id, product)| Choice::new(product.name.as_str(), Callback::Product(id.clone())))
            .collect(),
    )
}

pub fn weight_choices(product_id: &str, product: &Product) -> Markup {
    let mut choices: Vec<Choice> = product
        .weights
        .iter()
        .map(|(weight, price)| {
            Choice::new(
                format!("{weight} g - {price}"),
                Callback::Buy {
                    product_id: product_id.to_string(),
                    weight: *weight,
                },
            )
        })
        .collect();
    choices.push(Choice::new("⬅️ Back", Callback::BackToCatalog));
    Markup::Choices(choices)
}
