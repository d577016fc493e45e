//! Turn state machine: reconciles decoded events into a [`Turn`].
//!
//! Events are applied one at a time, in arrival order, by a single owner.
//! Observers get [`TurnUpdate`]s over a broadcast channel and clone
//! snapshots; nothing outside the machine mutates the turn.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use turnstream_protocol::{
    Category, ConversationId, DecodeError, Event, SeqNo, ToolCall, ToolStatus, TransportError,
    TreeKind, TurnError, TurnId, UnknownCode,
};

use crate::config::TurnConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, NoopSink};
use crate::turn::{Annotation, AnnotationKind, AnswerSummary, CloseReason, Turn, TurnStatus};

/// What one applied event did to the turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TurnChange {
    TextAppended { delta: String },
    ThinkingAppended { delta: String },
    /// Acknowledged without touching state (e.g. thinking when not recorded).
    Ignored { event_type: &'static str },
    ToolStarted { name: String },
    ToolFinished { name: String, status: ToolStatus },
    Answered,
    Errored { message: String },
    FormReplaced { fields: usize },
    TreeReplaced { kind: TreeKind, nodes: usize },
    CartReplaced { items: usize, rejected: usize },
    ItemsReplaced { entries: usize },
    OffersReplaced { offers: usize },
    Annotated { kind: AnnotationKind },
    PayloadDropped,
    Closed { reason: CloseReason },
}

/// Notification published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnUpdate {
    pub turn_id: TurnId,
    pub sequence: SeqNo,
    #[serde(flatten)]
    pub change: TurnChange,
}

pub struct TurnMachine {
    turn: Turn,
    config: TurnConfig,
    sink: Arc<dyn DiagnosticSink>,
    updates: broadcast::Sender<TurnUpdate>,
    sequence: SeqNo,
}

impl TurnMachine {
    /// Open a fresh turn for `prompt` with default settings.
    pub fn open(prompt: impl Into<String>) -> Self {
        Self::with_config(prompt, TurnConfig::default())
    }

    pub fn with_config(prompt: impl Into<String>, config: TurnConfig) -> Self {
        let (updates, _) = broadcast::channel(config.notification_buffer.max(1));
        let turn = Turn::new(prompt);
        debug!(turn_id = %turn.id, "turn opened");
        Self {
            turn,
            config,
            sink: Arc::new(NoopSink),
            updates,
            sequence: 0,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn in_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.turn.conversation_id = Some(conversation_id);
        self
    }

    pub fn turn(&self) -> &Turn {
        &self.turn
    }

    pub fn snapshot(&self) -> Turn {
        self.turn.clone()
    }

    pub fn into_turn(self) -> Turn {
        self.turn
    }

    pub fn turn_id(&self) -> &TurnId {
        &self.turn.id
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Number of payloads seen so far, dropped ones included.
    pub fn sequence(&self) -> SeqNo {
        self.sequence
    }

    pub fn is_closed(&self) -> bool {
        self.turn.is_closed()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnUpdate> {
        self.updates.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<TurnUpdate> {
        BroadcastStream::new(self.updates.subscribe())
    }

    /// Apply one decoded event. Rejected only once the turn is closed.
    pub fn apply(&mut self, event: Event) -> Result<TurnChange, TurnError> {
        if self.turn.is_closed() {
            let event_type = event.event_type();
            self.sink.record(Diagnostic::RejectedAfterClose { event_type });
            return Err(TurnError::Closed {
                turn_id: self.turn.id.clone(),
                event_type,
            });
        }

        self.sequence += 1;
        let sequence = self.sequence;

        let change = match event {
            Event::Text { content } => {
                self.turn.text.push_str(&content);
                TurnChange::TextAppended { delta: content }
            }
            Event::Thinking { content } => {
                if self.config.record_thinking {
                    self.turn.thinking.push_str(&content);
                    TurnChange::ThinkingAppended { delta: content }
                } else {
                    TurnChange::Ignored {
                        event_type: "thinking",
                    }
                }
            }
            Event::Tool {
                name,
                reason,
                arguments,
            } => {
                if self
                    .turn
                    .tools
                    .get(&name)
                    .is_some_and(ToolCall::is_in_flight)
                {
                    self.sink.record(Diagnostic::ToolReinvoked {
                        sequence,
                        name: name.clone(),
                    });
                }
                self.turn.tools.insert(
                    name.clone(),
                    ToolCall::executing(name.clone(), reason, arguments),
                );
                TurnChange::ToolStarted { name }
            }
            Event::ToolResult {
                name,
                result,
                success,
            } => {
                let in_flight = self
                    .turn
                    .tools
                    .get(&name)
                    .is_some_and(ToolCall::is_in_flight);
                if in_flight {
                    if let Some(call) = self.turn.tools.get_mut(&name) {
                        call.finish(result, success);
                    }
                } else {
                    self.sink.record(Diagnostic::OrphanToolResult {
                        sequence,
                        name: name.clone(),
                    });
                    self.turn.tools.insert(
                        name.clone(),
                        ToolCall::orphan_result(name.clone(), result, success),
                    );
                }
                TurnChange::ToolFinished {
                    name,
                    status: ToolStatus::from_success(success),
                }
            }
            Event::Answer { content, metadata } => {
                self.turn.answer = Some(AnswerSummary { content, metadata });
                TurnChange::Answered
            }
            Event::Error { message, code } => {
                self.annotate(AnnotationKind::Error, message.clone(), code, sequence);
                TurnChange::Errored { message }
            }
            Event::TextForm(form) => {
                let fields = form.fields.len();
                self.turn.form = Some(form);
                TurnChange::FormReplaced { fields }
            }
            Event::Tree(tree) => {
                let levels = tree.levels();
                if levels > self.config.tree_depth_limit {
                    self.sink.record(Diagnostic::TreeTooDeep {
                        sequence,
                        kind: tree.kind,
                        levels,
                        limit: self.config.tree_depth_limit,
                    });
                }
                let kind = tree.kind;
                let nodes = tree
                    .top_level()
                    .iter()
                    .map(Category::node_count)
                    .sum::<usize>();
                self.turn.trees.replace(tree);
                TurnChange::TreeReplaced { kind, nodes }
            }
            Event::Cart(cart) => {
                // Partial-cart annotations describe the cart they came with.
                self.turn
                    .annotations
                    .retain(|annotation| annotation.kind != AnnotationKind::PartialCart);
                if cart.is_partial() {
                    self.sink.record(Diagnostic::PartialCart {
                        sequence,
                        accepted: cart.items.len(),
                        rejected: cart.rejected.len(),
                    });
                    for error in &cart.rejected {
                        self.annotate(
                            AnnotationKind::PartialCart,
                            error.to_string(),
                            None,
                            sequence,
                        );
                    }
                }
                let change = TurnChange::CartReplaced {
                    items: cart.items.len(),
                    rejected: cart.rejected.len(),
                };
                self.turn.cart = Some(cart);
                change
            }
            Event::Items(list) => {
                let entries = list.len();
                self.turn.items = Some(list);
                TurnChange::ItemsReplaced { entries }
            }
            Event::RetailerOffers(offers) => {
                let count = offers.offers.len();
                self.turn.offers = Some(offers);
                TurnChange::OffersReplaced { offers: count }
            }
            Event::Unknown {
                event_type,
                code,
                detail,
                payload: _,
            } => {
                let message = unknown_message(event_type.as_deref(), code, detail.as_deref());
                self.sink.record(Diagnostic::UnknownEvent {
                    sequence,
                    event_type,
                    code,
                    detail,
                });
                self.annotate(
                    AnnotationKind::Unknown,
                    message,
                    Some(code.as_str().to_owned()),
                    sequence,
                );
                TurnChange::Annotated {
                    kind: AnnotationKind::Unknown,
                }
            }
        };

        self.publish(change.clone());
        Ok(change)
    }

    /// Count a payload that never became an event. No annotation is raised.
    pub fn record_dropped(&mut self, payload: &str, error: &DecodeError) {
        if self.turn.is_closed() {
            return;
        }
        self.sequence += 1;
        self.turn.dropped_payloads += 1;
        self.sink.record(Diagnostic::DroppedPayload {
            sequence: self.sequence,
            error: error.to_string(),
            bytes: payload.len(),
        });
        self.publish(TurnChange::PayloadDropped);
    }

    /// Record a transport failure as the single terminal annotation and close.
    pub fn fail(&mut self, error: TransportError) -> Option<TurnChange> {
        if self.turn.is_closed() {
            return None;
        }
        warn!(turn_id = %self.turn.id, %error, "transport failed mid-turn");
        self.sink.record(Diagnostic::TransportFailed {
            sequence: self.sequence,
            error: error.clone(),
        });
        let message = error.to_string();
        self.annotate(AnnotationKind::Transport, message.clone(), None, self.sequence);
        self.close(CloseReason::TransportFailed { message })
    }

    /// Close the turn. A second close is a no-op returning `None`.
    pub fn close(&mut self, reason: CloseReason) -> Option<TurnChange> {
        if self.turn.is_closed() {
            return None;
        }
        self.turn.closed_at = Some(Utc::now());
        self.turn.status = TurnStatus::Closed {
            reason: reason.clone(),
        };
        info!(
            turn_id = %self.turn.id,
            reason = reason.as_str(),
            complete = self.turn.is_complete(),
            events = self.sequence,
            "turn closed"
        );
        let change = TurnChange::Closed { reason };
        self.publish(change.clone());
        Some(change)
    }

    fn annotate(
        &mut self,
        kind: AnnotationKind,
        message: String,
        code: Option<String>,
        sequence: SeqNo,
    ) {
        self.turn.annotations.push(Annotation {
            kind,
            message,
            code,
            sequence,
        });
    }

    fn publish(&self, change: TurnChange) {
        // No subscribers is fine.
        let _ = self.updates.send(TurnUpdate {
            turn_id: self.turn.id.clone(),
            sequence: self.sequence,
            change,
        });
    }
}

fn unknown_message(event_type: Option<&str>, code: UnknownCode, detail: Option<&str>) -> String {
    match (code, event_type) {
        (UnknownCode::MissingType, _) => "event payload has no `type`".to_owned(),
        (UnknownCode::UnrecognizedType, Some(event_type)) => {
            format!("unrecognized event type `{event_type}`")
        }
        (UnknownCode::UnrecognizedType, None) => "unrecognized event type".to_owned(),
        (UnknownCode::SchemaViolation, event_type) => format!(
            "invalid `{}` event: {}",
            event_type.unwrap_or("unknown"),
            detail.unwrap_or("schema violation")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use serde_json::json;
    use turnstream_events::decode_value;
    use turnstream_protocol::CategoryTree;

    fn event(value: serde_json::Value) -> Event {
        decode_value(value).expect("test payloads are objects")
    }

    fn recording_machine() -> (TurnMachine, RecordingSink) {
        let sink = RecordingSink::new();
        let machine = TurnMachine::open("plan a party").with_sink(Arc::new(sink.clone()));
        (machine, sink)
    }

    #[test]
    fn text_deltas_concatenate() {
        let mut machine = TurnMachine::open("hi");
        machine.apply(Event::text("a")).unwrap();
        machine.apply(Event::text("b")).unwrap();
        assert_eq!(machine.turn().text, "ab");
        assert_eq!(machine.sequence(), 2);
    }

    #[test]
    fn thinking_is_kept_apart_from_text() {
        let mut machine = TurnMachine::open("hi");
        machine
            .apply(event(json!({"type": "thinking", "content": "pondering"})))
            .unwrap();
        machine.apply(Event::text("answer")).unwrap();
        assert_eq!(machine.turn().thinking, "pondering");
        assert_eq!(machine.turn().text, "answer");

        let mut quiet = TurnMachine::with_config("hi", TurnConfig::new().record_thinking(false));
        let change = quiet
            .apply(event(json!({"type": "thinking", "content": "pondering"})))
            .unwrap();
        assert_eq!(
            change,
            TurnChange::Ignored {
                event_type: "thinking"
            }
        );
        assert!(quiet.turn().thinking.is_empty());
    }

    #[test]
    fn failed_tool_result_leaves_one_failed_entry() {
        let mut machine = TurnMachine::open("hi");
        machine
            .apply(event(json!({"type": "tool", "name": "search", "reason": "find venues"})))
            .unwrap();
        assert!(machine.turn().tools["search"].is_in_flight());
        machine
            .apply(event(json!({"type": "tool_result", "name": "search", "success": false})))
            .unwrap();

        let tools = &machine.turn().tools;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools["search"].status, ToolStatus::Failed);
        assert_eq!(tools["search"].reason.as_deref(), Some("find venues"));
    }

    #[test]
    fn tool_anomalies_are_tolerated_and_reported() {
        let (mut machine, sink) = recording_machine();
        machine
            .apply(event(json!({"type": "tool_result", "name": "vector_db", "result": "ok"})))
            .unwrap();
        assert_eq!(machine.turn().tools["vector_db"].status, ToolStatus::Completed);

        machine
            .apply(event(json!({"type": "tool", "name": "search"})))
            .unwrap();
        machine
            .apply(event(json!({"type": "tool", "name": "search", "reason": "again"})))
            .unwrap();
        let tools = &machine.turn().tools;
        assert_eq!(tools.len(), 2);
        assert_eq!(tools["search"].reason.as_deref(), Some("again"));
        assert!(tools["search"].is_in_flight());

        let entries = sink.entries();
        assert!(matches!(&entries[0], Diagnostic::OrphanToolResult { name, .. } if name == "vector_db"));
        assert!(matches!(&entries[1], Diagnostic::ToolReinvoked { name, sequence: 3 } if name == "search"));
    }

    #[test]
    fn answer_marks_completion_without_touching_text() {
        let mut machine = TurnMachine::open("hi");
        machine.apply(Event::text("streamed")).unwrap();
        machine
            .apply(event(json!({"type": "answer", "content": "full", "metadata": {"model": "m"}})))
            .unwrap();
        let turn = machine.turn();
        assert_eq!(turn.text, "streamed");
        assert!(turn.is_complete());
        assert!(!turn.is_closed());
        let answer = turn.answer.as_ref().unwrap();
        assert_eq!(answer.content, "full");
        assert_eq!(answer.metadata, Some(json!({"model": "m"})));
    }

    #[test]
    fn error_event_annotates_and_keeps_text() {
        let mut machine = TurnMachine::open("hi");
        machine.apply(Event::text("partial")).unwrap();
        machine
            .apply(event(json!({"type": "error", "message": "boom", "code": "STREAM_ERROR"})))
            .unwrap();
        let turn = machine.turn();
        assert_eq!(turn.text, "partial");
        let error = turn.terminal_error().unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.code.as_deref(), Some("STREAM_ERROR"));
        assert!(turn.is_complete());
    }

    #[test]
    fn empty_tree_replaces_prior_snapshot() {
        let mut machine = TurnMachine::open("hi");
        machine
            .apply(event(json!({"type": "people_tree", "nodes": [
                {"emoji": "🧑", "label": "Adults", "selected": true}
            ]})))
            .unwrap();
        assert_eq!(machine.turn().trees.get(TreeKind::People).unwrap().top_level().len(), 1);

        let change = machine
            .apply(event(json!({"type": "people_tree", "nodes": []})))
            .unwrap();
        assert_eq!(
            change,
            TurnChange::TreeReplaced {
                kind: TreeKind::People,
                nodes: 0
            }
        );
        let tree = machine.turn().trees.get(TreeKind::People).unwrap();
        assert!(tree.is_empty());
        assert!(!tree.root.selected);
    }

    #[test]
    fn tree_kinds_are_independent() {
        let mut machine = TurnMachine::open("hi");
        machine
            .apply(Event::Tree(CategoryTree::from_top_level(TreeKind::Place, vec![])))
            .unwrap();
        machine
            .apply(Event::Tree(CategoryTree::from_top_level(TreeKind::People, vec![])))
            .unwrap();
        assert_eq!(machine.turn().trees.len(), 2);
    }

    #[test]
    fn deep_tree_is_applied_and_reported() {
        let (mut machine, sink) = recording_machine();
        let deep = Category::new("1", "a").with_child(
            Category::new("2", "b").with_child(
                Category::new("3", "c").with_child(Category::new("4", "d")),
            ),
        );
        machine
            .apply(Event::Tree(CategoryTree::from_top_level(TreeKind::Place, vec![deep])))
            .unwrap();
        assert_eq!(machine.turn().trees.get(TreeKind::Place).unwrap().levels(), 4);
        assert!(matches!(
            sink.entries()[0],
            Diagnostic::TreeTooDeep {
                levels: 4,
                limit: 3,
                ..
            }
        ));
    }

    #[test]
    fn partial_cart_is_scoped_to_the_current_cart() {
        let (mut machine, sink) = recording_machine();
        machine
            .apply(event(json!({"type": "cart", "items": [
                {"main": {"name": "Chips", "price": 2.0},
                 "cheapest": {"name": "Chips", "price": 1.5},
                 "bestReviewed": {"name": "Chips", "price": 3.0},
                 "fastest": {"name": "Chips", "price": 2.0}},
                {"main": {"name": "Soda", "price": 1.0}}
            ]})))
            .unwrap();
        let turn = machine.turn();
        assert_eq!(turn.cart.as_ref().unwrap().items.len(), 1);
        assert_eq!(turn.annotations_of(AnnotationKind::PartialCart).count(), 1);
        assert!(matches!(
            sink.entries()[0],
            Diagnostic::PartialCart {
                accepted: 1,
                rejected: 1,
                ..
            }
        ));

        machine
            .apply(event(json!({"type": "cart", "items": []})))
            .unwrap();
        assert_eq!(
            machine
                .turn()
                .annotations_of(AnnotationKind::PartialCart)
                .count(),
            0
        );
    }

    #[test]
    fn snapshots_replace_wholesale() {
        let mut machine = TurnMachine::open("hi");
        machine
            .apply(event(json!({"type": "items", "items": ["Water", "Chips"]})))
            .unwrap();
        machine
            .apply(event(json!({"type": "items", "items": ["Cake"]})))
            .unwrap();
        machine
            .apply(event(json!({"type": "text_form", "fields": [{"label": "Date", "content": ""}]})))
            .unwrap();
        machine
            .apply(event(json!({"type": "retailer_offers", "offers": [{"retailer": "Acme"}]})))
            .unwrap();

        let turn = machine.turn();
        assert_eq!(turn.items.as_ref().unwrap().entries[0].item, "Cake");
        assert_eq!(turn.form.as_ref().unwrap().fields.len(), 1);
        assert_eq!(turn.offers.as_ref().unwrap().offers.len(), 1);
    }

    #[test]
    fn unknown_type_only_annotates() {
        let (mut machine, sink) = recording_machine();
        machine.apply(Event::text("kept")).unwrap();
        let before = machine.snapshot();

        let change = machine
            .apply(event(json!({"type": "hologram", "content": "zap"})))
            .unwrap();
        assert_eq!(
            change,
            TurnChange::Annotated {
                kind: AnnotationKind::Unknown
            }
        );

        let after = machine.turn();
        assert_eq!(after.text, before.text);
        assert_eq!(after.tools, before.tools);
        assert_eq!(after.annotations.len(), 1);
        assert_eq!(after.annotations[0].code.as_deref(), Some("unrecognized_type"));
        assert_eq!(after.annotations[0].message, "unrecognized event type `hologram`");
        assert!(matches!(sink.entries()[0], Diagnostic::UnknownEvent { .. }));
    }

    #[test]
    fn closed_turn_rejects_events() {
        let (mut machine, sink) = recording_machine();
        assert!(machine.close(CloseReason::EndOfStream).is_some());
        assert!(machine.close(CloseReason::Cancelled).is_none());
        assert_eq!(machine.turn().close_reason(), Some(&CloseReason::EndOfStream));
        assert!(machine.turn().closed_at.is_some());

        let error = machine.apply(Event::text("late")).unwrap_err();
        assert!(matches!(error, TurnError::Closed { event_type: "text", .. }));
        assert!(machine.turn().text.is_empty());
        assert!(matches!(
            sink.entries()[0],
            Diagnostic::RejectedAfterClose { event_type: "text" }
        ));
    }

    #[test]
    fn transport_failure_is_single_terminal_annotation() {
        let mut machine = TurnMachine::open("hi");
        machine.apply(Event::text("so far")).unwrap();
        assert!(machine.fail(TransportError::TimedOut).is_some());
        assert!(machine.fail(TransportError::TimedOut).is_none());

        let turn = machine.turn();
        assert_eq!(turn.text, "so far");
        assert_eq!(turn.annotations_of(AnnotationKind::Transport).count(), 1);
        assert!(matches!(
            turn.close_reason(),
            Some(CloseReason::TransportFailed { .. })
        ));
        assert!(!turn.is_complete());
    }

    #[test]
    fn dropped_payloads_are_counted_not_annotated() {
        let (mut machine, sink) = recording_machine();
        let error = turnstream_events::decode("{oops").unwrap_err();
        machine.record_dropped("{oops", &error);
        assert_eq!(machine.turn().dropped_payloads, 1);
        assert!(machine.turn().annotations.is_empty());
        assert!(matches!(sink.entries()[0], Diagnostic::DroppedPayload { bytes: 5, .. }));
    }

    #[tokio::test]
    async fn subscribers_see_updates_in_order() -> anyhow::Result<()> {
        let mut machine = TurnMachine::open("hi");
        let mut updates = machine.subscribe();
        machine.apply(Event::text("a"))?;
        machine.close(CloseReason::EndOfStream);

        let first = updates.recv().await?;
        assert_eq!(first.sequence, 1);
        assert_eq!(&first.turn_id, machine.turn_id());
        assert_eq!(first.change, TurnChange::TextAppended { delta: "a".into() });
        let second = updates.recv().await?;
        assert_eq!(
            second.change,
            TurnChange::Closed {
                reason: CloseReason::EndOfStream
            }
        );
        Ok(())
    }
}
