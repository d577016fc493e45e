//! Payload → [`Event`] decoding.
//!
//! Routing is a fixed table on the `type` discriminant. Each known type has
//! a private payload struct carrying the field defaults; a known type whose
//! fields don't fit becomes `Unknown` with `schema_violation` rather than an
//! error, so only unparseable payloads are ever dropped.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use turnstream_protocol::cart::json_type_name;
use turnstream_protocol::{
    CartChunk, Category, CategoryTree, DecodeError, DecodeResult, Event, EventType,
    RetailerOffers, ShoppingList, TextForm, TreeKind, UnknownCode, is_truthy,
};

const DEFAULT_ERROR_MESSAGE: &str = "unknown error";

/// Decode one raw payload string.
pub fn decode(raw: &str) -> DecodeResult<Event> {
    let value: Value = serde_json::from_str(raw)?;
    decode_value(value)
}

/// Decode an already-parsed payload.
pub fn decode_value(value: Value) -> DecodeResult<Event> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(DecodeError::NotAnObject {
                found: json_type_name(&other),
            });
        }
    };

    let type_name = match object.get("type") {
        Some(Value::String(type_name)) => type_name.clone(),
        _ => return Ok(unknown(None, UnknownCode::MissingType, None, object)),
    };

    let Some(kind) = EventType::parse(&type_name) else {
        return Ok(unknown(
            Some(type_name),
            UnknownCode::UnrecognizedType,
            None,
            object,
        ));
    };

    match decode_known(kind, &object) {
        Ok(event) => Ok(event),
        Err(reason) => Ok(unknown(
            Some(type_name),
            UnknownCode::SchemaViolation,
            Some(reason),
            object,
        )),
    }
}

fn unknown(
    event_type: Option<String>,
    code: UnknownCode,
    detail: Option<String>,
    object: Map<String, Value>,
) -> Event {
    Event::Unknown {
        event_type,
        code,
        detail,
        payload: Value::Object(object),
    }
}

#[derive(Deserialize)]
struct ContentPayload {
    content: String,
}

#[derive(Deserialize)]
struct ToolPayload {
    name: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Deserialize)]
struct ToolResultPayload {
    name: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    success: Option<bool>,
}

#[derive(Deserialize)]
struct AnswerPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

#[derive(Deserialize)]
struct FlatTreePayload {
    #[serde(default)]
    nodes: Option<Vec<Category>>,
}

fn fields<T: DeserializeOwned>(object: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(object.clone())).map_err(|error| error.to_string())
}

fn decode_known(kind: EventType, object: &Map<String, Value>) -> Result<Event, String> {
    let event = match kind {
        EventType::Text => Event::Text {
            content: fields::<ContentPayload>(object)?.content,
        },
        EventType::Thinking => Event::Thinking {
            content: fields::<ContentPayload>(object)?.content,
        },
        EventType::Tool => {
            let payload: ToolPayload = fields(object)?;
            Event::Tool {
                name: payload.name,
                reason: payload.reason,
                arguments: payload.arguments.filter(|arguments| !arguments.is_null()),
            }
        }
        EventType::ToolResult => {
            let payload: ToolResultPayload = fields(object)?;
            Event::ToolResult {
                name: payload.name,
                result: payload.result.map(value_to_text).unwrap_or_default(),
                success: payload.success.unwrap_or(true),
            }
        }
        EventType::Answer => {
            let payload: AnswerPayload = fields(object)?;
            Event::Answer {
                content: payload.content.unwrap_or_default(),
                metadata: payload.metadata,
            }
        }
        EventType::Error => {
            let payload: ErrorPayload = fields(object)?;
            Event::Error {
                message: payload
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned()),
                code: payload.code.map(value_to_text),
            }
        }
        EventType::TextForm => Event::TextForm(TextForm::from_json(object)?),
        EventType::PeopleTree | EventType::PlaceTree => {
            let tree_kind = kind.tree_kind().unwrap_or(TreeKind::Generic);
            let payload: FlatTreePayload = fields(object)?;
            Event::Tree(CategoryTree::from_top_level(
                tree_kind,
                payload.nodes.unwrap_or_default(),
            ))
        }
        EventType::Tree => Event::Tree(decode_nested_tree(object)?),
        EventType::Cart => Event::Cart(CartChunk::from_json(object)?),
        EventType::Items => Event::Items(ShoppingList::from_json(object)?),
        EventType::RetailerOffers => Event::RetailerOffers(RetailerOffers::from_json(object)?),
    };
    Ok(event)
}

/// `tree` payloads: `{kind?, root}` (or `tree`), `{kind?, nodes}`, or the
/// root node inline next to `type`.
fn decode_nested_tree(object: &Map<String, Value>) -> Result<CategoryTree, String> {
    let kind = match object.get("kind") {
        None | Some(Value::Null) => TreeKind::Generic,
        Some(Value::String(raw)) => {
            TreeKind::parse(raw).ok_or_else(|| format!("unknown tree kind `{raw}`"))?
        }
        Some(other) => {
            return Err(format!(
                "tree `kind` must be a string, found {}",
                json_type_name(other)
            ));
        }
    };

    if let Some(root) = object.get("root").or_else(|| object.get("tree")) {
        let root = Category::deserialize(root).map_err(|error| format!("invalid root: {error}"))?;
        // A serialized flat tree keeps its top-level nodes under a synthetic root.
        if object.get("synthetic_root").is_some_and(is_truthy) {
            return Ok(CategoryTree::from_top_level(kind, root.children));
        }
        return Ok(CategoryTree::nested(kind, root));
    }

    if let Some(nodes) = object.get("nodes") {
        let nodes = Option::<Vec<Category>>::deserialize(nodes)
            .map_err(|error| format!("invalid nodes: {error}"))?;
        return Ok(CategoryTree::from_top_level(kind, nodes.unwrap_or_default()));
    }

    if object.contains_key("label") || object.contains_key("children") {
        let mut inline = object.clone();
        inline.remove("type");
        inline.remove("kind");
        let root = Category::deserialize(Value::Object(inline))
            .map_err(|error| format!("invalid inline root: {error}"))?;
        return Ok(CategoryTree::nested(kind, root));
    }

    Err("tree carries no `root`, `nodes` or inline node".to_owned())
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
