use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    ConversationOpen(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Opened(String),
    Closed,
    Navigated(String),
}

/// Tracks which chat is on screen so pushes from that peer can be suppressed.
#[derive(Debug, Default)]
pub struct ConversationTracker {
    state: ConversationState,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn apply(&mut self, event: NavigationEvent) {
        let next = match event {
            NavigationEvent::Opened(peer) => ConversationState::ConversationOpen(peer),
            NavigationEvent::Closed | NavigationEvent::Navigated(_) => ConversationState::Idle,
        };
        trace!(from = ?self.state, to = ?next, "conversation state changed");
        self.state = next;
    }

    pub fn should_notify(&self, sender_id: &str) -> bool {
        match &self.state {
            ConversationState::ConversationOpen(peer) => peer != sender_id,
            ConversationState::Idle => true,
        }
    }
}
