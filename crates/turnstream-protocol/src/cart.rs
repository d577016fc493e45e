//! Shopping-cart recommendations.
//!
//! A cart is a list of [`RecommendedItem`]s, each offering four alternative
//! fulfilments of one need. Two key conventions exist on the wire for the
//! four picks and both are accepted:
//!
//! | pick       | current                | legacy          |
//! |------------|------------------------|-----------------|
//! | main       | `recommendedItem`      | `main`          |
//! | cheapest   | `cheapestItem`         | `cheapest`      |
//! | best rated | `bestRatingItem`       | `bestReviewed`  |
//! | fastest    | `fastestDeliveryItem`  | `fastest`       |

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::error::CartItemError;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// One purchasable product offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    /// Units to buy. `None` means the producer did not say.
    #[serde(default, alias = "quantity")]
    pub amount: Option<u32>,
    #[serde(default)]
    pub retailer: String,
    #[serde(default, alias = "delivery_time_ms")]
    pub delivery_time_ms: Option<u64>,
    #[serde(default, alias = "review_rating", alias = "rating")]
    pub review_rating: Option<f64>,
    #[serde(default, alias = "reviews_count", alias = "reviewCount")]
    pub reviews_count: Option<u64>,
    #[serde(default, alias = "image_url", alias = "image")]
    pub image_url: Option<String>,
}

fn quantity_suffix_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"\s*\(\s*[xX]\s*(\d+)\s*\)\s*$").expect("quantity suffix regex must compile")
    })
}

impl CartItem {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            price,
            amount: None,
            retailer: String::new(),
            delivery_time_ms: None,
            review_rating: None,
            reviews_count: None,
            image_url: None,
        }
    }

    /// Units to buy, treating an unspecified amount as one.
    pub fn quantity(&self) -> u32 {
        self.amount.unwrap_or(1)
    }

    /// Delivery estimate rounded up to whole days.
    pub fn delivery_days(&self) -> Option<u64> {
        self.delivery_time_ms.map(|ms| ms.div_ceil(MS_PER_DAY))
    }

    /// Line total for this pick (price × quantity).
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity())
    }

    /// Strip trailing `(x<N>)` markers from the name and fold the outermost
    /// count into the amount when the amount is absent or 1. A name that is
    /// nothing but a marker is kept as is.
    ///
    /// Applying this twice is the same as applying it once.
    pub fn normalize(&mut self) {
        let mut folded = None;
        while let Some(captures) = quantity_suffix_regex().captures(&self.name) {
            let Some(count) = captures[1].parse::<u32>().ok().filter(|count| *count > 0) else {
                break;
            };
            let Some(whole) = captures.get(0) else {
                break;
            };
            folded.get_or_insert(count);
            let stripped = self.name[..whole.start()].to_owned();
            if stripped.trim().is_empty() {
                // Nothing would remain: keep the raw name, still fold the count.
                break;
            }
            self.name = stripped;
        }

        if let Some(count) = folded
            && matches!(self.amount, None | Some(1))
        {
            self.amount = Some(count);
        }
    }

    /// Owned variant of [`CartItem::normalize`].
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

/// Which of the four alternatives a key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Main,
    Cheapest,
    BestRated,
    Fastest,
}

impl Pick {
    pub const ALL: [Pick; 4] = [Pick::Main, Pick::Cheapest, Pick::BestRated, Pick::Fastest];

    /// Keys accepted for this pick, current convention first.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Self::Main => &["recommendedItem", "main", "recommended_item"],
            Self::Cheapest => &["cheapestItem", "cheapest", "cheapest_item"],
            Self::BestRated => &["bestRatingItem", "bestReviewed", "best_rating_item"],
            Self::Fastest => &["fastestDeliveryItem", "fastest", "fastest_delivery_item"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Cheapest => "cheapest",
            Self::BestRated => "best_rated",
            Self::Fastest => "fastest",
        }
    }
}

/// Four alternative ways to fulfil one shopping need.
///
/// Serializes under the current key convention. Decoding goes through
/// [`RecommendedItem::from_json`], which accepts both conventions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedItem {
    #[serde(rename = "recommendedItem")]
    pub main: CartItem,
    #[serde(rename = "cheapestItem")]
    pub cheapest: CartItem,
    #[serde(rename = "bestRatingItem")]
    pub best_rated: CartItem,
    #[serde(rename = "fastestDeliveryItem")]
    pub fastest: CartItem,
}

impl RecommendedItem {
    /// Decode one cart entry under either key convention.
    ///
    /// Every pick is normalized on the way in.
    pub fn from_json(index: usize, value: &Value) -> Result<Self, CartItemError> {
        let object = value
            .as_object()
            .ok_or(CartItemError::NotAnObject { index })?;

        Ok(Self {
            main: decode_pick(index, object, Pick::Main)?,
            cheapest: decode_pick(index, object, Pick::Cheapest)?,
            best_rated: decode_pick(index, object, Pick::BestRated)?,
            fastest: decode_pick(index, object, Pick::Fastest)?,
        })
    }

    pub fn pick(&self, pick: Pick) -> &CartItem {
        match pick {
            Pick::Main => &self.main,
            Pick::Cheapest => &self.cheapest,
            Pick::BestRated => &self.best_rated,
            Pick::Fastest => &self.fastest,
        }
    }
}

fn decode_pick(
    index: usize,
    object: &Map<String, Value>,
    pick: Pick,
) -> Result<CartItem, CartItemError> {
    let raw = pick
        .keys()
        .iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
        .ok_or(CartItemError::MissingPick {
            index,
            pick: pick.as_str(),
        })?;

    serde_json::from_value::<CartItem>(raw.clone())
        .map(CartItem::normalized)
        .map_err(|error| CartItemError::InvalidPick {
            index,
            pick: pick.as_str(),
            reason: error.to_string(),
        })
}

/// A full cart snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CartChunk {
    pub items: Vec<RecommendedItem>,
    /// Total as reported by the producer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Entries that failed to decode; the rest of the cart is still valid.
    /// Not part of the wire shape: a turn surfaces them as annotations.
    #[serde(skip)]
    pub rejected: Vec<CartItemError>,
}

impl CartChunk {
    /// Decode a cart payload.
    ///
    /// Fails only when the payload has no usable `items` array; individual
    /// entries that fail land in [`CartChunk::rejected`].
    pub fn from_json(payload: &Map<String, Value>) -> Result<Self, String> {
        let entries = match payload.get("items") {
            Some(Value::Array(entries)) => entries.as_slice(),
            None | Some(Value::Null) => &[],
            Some(other) => {
                return Err(format!(
                    "cart `items` must be an array, found {}",
                    json_type_name(other)
                ));
            }
        };

        let price = match payload.get("price") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => number.as_f64(),
            Some(other) => {
                return Err(format!(
                    "cart `price` must be a number, found {}",
                    json_type_name(other)
                ));
            }
        };

        let mut items = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match RecommendedItem::from_json(index, entry) {
                Ok(item) => items.push(item),
                Err(error) => rejected.push(error),
            }
        }

        Ok(Self {
            items,
            price,
            rejected,
        })
    }

    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty()
    }

    /// Sum of the main picks' line totals, rounded to cents.
    pub fn computed_total(&self) -> f64 {
        let total: f64 = self.items.iter().map(|item| item.main.line_total()).sum();
        (total * 100.0).round() / 100.0
    }

    /// Reported total when present, otherwise the computed one.
    pub fn total(&self) -> f64 {
        self.price.unwrap_or_else(|| self.computed_total())
    }
}

/// Human-readable JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(name: &str, price: f64, amount: Option<u32>) -> Value {
        let mut value = json!({
            "name": name,
            "price": price,
            "retailer": "Acme",
            "deliveryTimeMs": 2 * MS_PER_DAY,
        });
        if let Some(amount) = amount {
            value["amount"] = json!(amount);
        }
        value
    }

    #[test]
    fn normalize_folds_suffix_into_single_amount() {
        let mut widget = CartItem::new("Widget (x3)", 2.0);
        widget.amount = Some(1);
        widget.normalize();
        assert_eq!(widget.name, "Widget");
        assert_eq!(widget.amount, Some(3));

        let once = widget.clone();
        widget.normalize();
        assert_eq!(widget, once);
    }

    #[test]
    fn normalize_fills_absent_amount_and_keeps_explicit_one() {
        let absent = CartItem::new("Paper cups ( X 12 )", 0.1).normalized();
        assert_eq!(absent.name, "Paper cups");
        assert_eq!(absent.amount, Some(12));

        let mut explicit = CartItem::new("Chairs (x4)", 10.0);
        explicit.amount = Some(6);
        let explicit = explicit.normalized();
        assert_eq!(explicit.name, "Chairs");
        assert_eq!(explicit.amount, Some(6));
    }

    #[test]
    fn normalize_is_idempotent_with_stacked_suffixes() {
        let mut item = CartItem::new("Balloons (x10) (x2)", 1.0);
        item.normalize();
        assert_eq!(item.name, "Balloons");
        assert_eq!(item.amount, Some(2));
        let once = item.clone();
        item.normalize();
        assert_eq!(item, once);
    }

    #[test]
    fn normalize_keeps_plain_and_bare_marker_names() {
        let plain = CartItem::new("Napkins", 1.0).normalized();
        assert_eq!(plain.name, "Napkins");
        assert_eq!(plain.amount, None);

        let only_suffix = CartItem::new("(x3)", 1.0).normalized();
        assert_eq!(only_suffix.name, "(x3)");
        assert_eq!(only_suffix.amount, Some(3));
        assert_eq!(only_suffix.clone().normalized(), only_suffix);

        let stacked_bare = CartItem::new("(x2) (x5)", 1.0).normalized();
        assert_eq!(stacked_bare.name, "(x2)");
        assert_eq!(stacked_bare.amount, Some(5));
        assert_eq!(stacked_bare.clone().normalized(), stacked_bare);

        let zero = CartItem::new("Cake (x0)", 1.0).normalized();
        assert_eq!(zero.name, "Cake (x0)");
    }

    #[test]
    fn current_and_legacy_keys_decode_identically() {
        let current = json!({
            "items": [{
                "recommendedItem": item("Plates (x3)", 4.0, Some(1)),
                "cheapestItem": item("Plates", 3.0, None),
                "bestRatingItem": item("Plates", 5.0, None),
                "fastestDeliveryItem": item("Plates", 6.0, None),
            }],
            "price": 12.5,
        });
        let legacy = json!({
            "items": [{
                "main": item("Plates (x3)", 4.0, Some(1)),
                "cheapest": item("Plates", 3.0, None),
                "bestReviewed": item("Plates", 5.0, None),
                "fastest": item("Plates", 6.0, None),
            }],
            "price": 12.5,
        });

        let a = CartChunk::from_json(current.as_object().unwrap()).unwrap();
        let b = CartChunk::from_json(legacy.as_object().unwrap()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.items.len(), 1);
        assert_eq!(a.price, Some(12.5));
        assert_eq!(a.items[0].main.name, "Plates");
        assert_eq!(a.items[0].main.amount, Some(3));
        assert_eq!(a.items[0].pick(Pick::Cheapest).price, 3.0);
    }

    #[test]
    fn serialized_entry_decodes_back_through_from_json() {
        let legacy = json!({
            "main": item("Plates (x3)", 4.0, None),
            "cheapest": item("Plates", 3.0, None),
            "bestReviewed": item("Plates", 5.0, None),
            "fastest": item("Plates", 6.0, None),
        });
        let decoded = RecommendedItem::from_json(0, &legacy).unwrap();
        let serialized = serde_json::to_value(&decoded).unwrap();
        assert!(serialized.get("recommendedItem").is_some());
        assert!(serialized.get("main").is_none());
        assert_eq!(RecommendedItem::from_json(0, &serialized).unwrap(), decoded);
        assert_eq!(decoded.main.name, "Plates");
        assert_eq!(decoded.main.amount, Some(3));
    }

    #[test]
    fn missing_pick_rejects_only_that_entry() {
        let payload = json!({
            "items": [
                {
                    "recommendedItem": item("Ice", 2.0, Some(2)),
                    "cheapestItem": item("Ice", 1.5, None),
                    "bestRatingItem": item("Ice", 2.5, None),
                    "fastestDeliveryItem": item("Ice", 3.0, None),
                },
                {
                    "recommendedItem": item("Cups", 1.0, None),
                    "cheapestItem": item("Cups", 1.0, None),
                },
                "not an item",
            ],
        });
        let cart = CartChunk::from_json(payload.as_object().unwrap()).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert!(cart.is_partial());
        assert_eq!(
            cart.rejected,
            vec![
                CartItemError::MissingPick {
                    index: 1,
                    pick: "best_rated"
                },
                CartItemError::NotAnObject { index: 2 },
            ]
        );
        assert_eq!(cart.price, None);
        assert_eq!(cart.total(), 4.0);
    }

    #[test]
    fn invalid_pick_reports_reason() {
        let payload = json!({
            "items": [{
                "main": {"price": 1.0},
                "cheapest": item("x", 1.0, None),
                "bestReviewed": item("x", 1.0, None),
                "fastest": item("x", 1.0, None),
            }],
        });
        let cart = CartChunk::from_json(payload.as_object().unwrap()).unwrap();
        assert!(cart.items.is_empty());
        assert!(matches!(
            &cart.rejected[0],
            CartItemError::InvalidPick { index: 0, pick: "main", reason } if reason.contains("name")
        ));
    }

    #[test]
    fn non_array_items_fail_the_whole_cart() {
        let payload = json!({"items": {"oops": true}});
        let err = CartChunk::from_json(payload.as_object().unwrap()).unwrap_err();
        assert!(err.contains("must be an array"));
    }

    #[test]
    fn delivery_days_round_up() {
        let mut item = CartItem::new("Tent", 100.0);
        item.delivery_time_ms = Some(MS_PER_DAY + 1);
        assert_eq!(item.delivery_days(), Some(2));
        item.delivery_time_ms = Some(3 * MS_PER_DAY);
        assert_eq!(item.delivery_days(), Some(3));
    }

    #[test]
    fn snake_case_fields_are_accepted() {
        let item: CartItem = serde_json::from_value(json!({
            "name": "Lamp",
            "price": 9.5,
            "quantity": 2,
            "retailer": "Bright",
            "delivery_time_ms": 1000,
            "review_rating": 4.5,
            "reviews_count": 12,
            "image_url": "http://img/lamp.jpg",
        }))
        .unwrap();
        assert_eq!(item.amount, Some(2));
        assert_eq!(item.delivery_time_ms, Some(1000));
        assert_eq!(item.review_rating, Some(4.5));
        assert_eq!(item.reviews_count, Some(12));
        assert_eq!(item.image_url.as_deref(), Some("http://img/lamp.jpg"));
    }
}
