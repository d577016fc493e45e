use turnstream_protocol::CONTRACT_DEPTH;

/// Per-turn engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnConfig {
    /// Trees deeper than this are reported to the diagnostics sink. They are
    /// still applied.
    pub tree_depth_limit: usize,
    /// When false, `thinking` events are acknowledged but not buffered.
    pub record_thinking: bool,
    /// Capacity of the update broadcast channel.
    pub notification_buffer: usize,
}

impl TurnConfig {
    pub fn new() -> Self {
        Self {
            tree_depth_limit: CONTRACT_DEPTH,
            record_thinking: true,
            notification_buffer: 256,
        }
    }

    pub fn tree_depth_limit(mut self, limit: usize) -> Self {
        self.tree_depth_limit = limit;
        self
    }

    pub fn record_thinking(mut self, record: bool) -> Self {
        self.record_thinking = record;
        self
    }

    /// A broadcast channel needs room for at least one update.
    pub fn notification_buffer(mut self, buffer: usize) -> Self {
        self.notification_buffer = buffer.max(1);
        self
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self::new()
    }
}
