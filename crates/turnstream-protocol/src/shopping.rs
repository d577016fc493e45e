//! Shopping list (`items`) and retailer sponsorship offers
//! (`retailer_offers`) snapshots.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cart::json_type_name;

/// One line of the internal shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListEntry {
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Name(String),
    Detailed {
        #[serde(alias = "name")]
        item: String,
        #[serde(default, alias = "amount")]
        quantity: Option<u32>,
    },
}

impl From<RawEntry> for ShoppingListEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Name(item) => Self {
                item,
                quantity: None,
            },
            RawEntry::Detailed { item, quantity } => Self { item, quantity },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShoppingList {
    #[serde(rename = "items")]
    pub entries: Vec<ShoppingListEntry>,
}

impl ShoppingList {
    /// Decode an `items` payload: entries are plain names or
    /// `{item, quantity}` objects. Blank names are dropped.
    pub fn from_json(payload: &Map<String, Value>) -> Result<Self, String> {
        let raw = match payload.get("items") {
            Some(Value::Array(raw)) => raw,
            Some(other) => {
                return Err(format!(
                    "`items` must be an array, found {}",
                    json_type_name(other)
                ));
            }
            None => return Err("`items` is missing".to_owned()),
        };

        let mut entries = Vec::with_capacity(raw.len());
        for (index, value) in raw.iter().enumerate() {
            let entry: RawEntry = serde_json::from_value(value.clone())
                .map_err(|error| format!("invalid shopping list entry #{index}: {error}"))?;
            let mut entry = ShoppingListEntry::from(entry);
            entry.item = entry.item.trim().to_owned();
            if !entry.item.is_empty() {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferPhase {
    Start,
    End,
}

/// Sponsorship answer from one retailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailerOffer {
    pub retailer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<OfferPhase>,
    /// `approved`, `rejected`, or whatever the retailer reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, alias = "discount_percent", skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<f64>,
    #[serde(default, alias = "discounted_items", deserialize_with = "null_as_empty")]
    pub discounted_items: Vec<Value>,
    #[serde(default, alias = "item_count", skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u32>,
}

impl RetailerOffer {
    pub fn is_approved(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("approved"))
    }

    /// Still waiting on the retailer (a `start` without a matching `end`).
    pub fn is_pending(&self) -> bool {
        self.phase == Some(OfferPhase::Start)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetailerOffers {
    pub offers: Vec<RetailerOffer>,
}

impl RetailerOffers {
    /// Decode an `offers` array, or a single inline offer.
    pub fn from_json(payload: &Map<String, Value>) -> Result<Self, String> {
        if let Some(raw) = payload.get("offers") {
            return serde_json::from_value::<Vec<RetailerOffer>>(raw.clone())
                .map(|offers| Self { offers })
                .map_err(|error| format!("invalid `offers`: {error}"));
        }
        if payload.contains_key("retailer") {
            let mut inline = payload.clone();
            inline.remove("type");
            return serde_json::from_value::<RetailerOffer>(Value::Object(inline))
                .map(|offer| Self {
                    offers: vec![offer],
                })
                .map_err(|error| format!("invalid inline offer: {error}"));
        }
        Err("retailer_offers carries neither `offers` nor `retailer`".to_owned())
    }

    pub fn approved(&self) -> impl Iterator<Item = &RetailerOffer> {
        self.offers.iter().filter(|offer| offer.is_approved())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}
