//! Interaction effects: like, save, reply and share.
//!
//! Every gesture is applied to local state right away and turned into an
//! outbound call. The call's result comes back later through [`settle`],
//! which either confirms the optimistic change or reverts it.
//!
//! [`settle`]: InteractionDispatcher::settle

use crate::error::{EngineError, Result};
use crate::media::ItemId;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;

/// Client-side view of one item's interactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub liked: bool,
    pub saved: bool,
    pub pending_reply_text: String,
}

/// Side-effect call issued to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCall {
    LikeItem(ItemId),
    UnlikeItem(ItemId),
    SaveItem(ItemId),
    UnsaveItem(ItemId),
    SendReply(ItemId, String),
    RecordShare(ItemId),
}

impl OutboundCall {
    pub fn item(&self) -> &ItemId {
        match self {
            OutboundCall::LikeItem(id)
            | OutboundCall::UnlikeItem(id)
            | OutboundCall::SaveItem(id)
            | OutboundCall::UnsaveItem(id)
            | OutboundCall::SendReply(id, _)
            | OutboundCall::RecordShare(id) => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutboundCall::LikeItem(_) => "likeItem",
            OutboundCall::UnlikeItem(_) => "unlikeItem",
            OutboundCall::SaveItem(_) => "saveItem",
            OutboundCall::UnsaveItem(_) => "unsaveItem",
            OutboundCall::SendReply(..) => "sendReply",
            OutboundCall::RecordShare(_) => "recordShare",
        }
    }
}

/// Backend that confirms interactions.
///
/// Calls must be safe to retry. The returned futures are spawned and never
/// awaited by the playback loop.
pub trait EffectsBackend: Send + Sync {
    fn like_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>>;
    fn unlike_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>>;
    fn save_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>>;
    fn unsave_item(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>>;
    fn send_reply(&self, item: ItemId, text: String) -> BoxFuture<'static, anyhow::Result<()>>;
    fn record_share(&self, item: ItemId) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Route a call to the matching backend method.
pub fn perform(
    backend: &dyn EffectsBackend,
    call: OutboundCall,
) -> BoxFuture<'static, anyhow::Result<()>> {
    match call {
        OutboundCall::LikeItem(id) => backend.like_item(id),
        OutboundCall::UnlikeItem(id) => backend.unlike_item(id),
        OutboundCall::SaveItem(id) => backend.save_item(id),
        OutboundCall::UnsaveItem(id) => backend.unsave_item(id),
        OutboundCall::SendReply(id, text) => backend.send_reply(id, text),
        OutboundCall::RecordShare(id) => backend.record_share(id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Liked,
    Saved,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Toggle { field: Field, from: bool, to: bool },
    Reply { text: String },
    Share,
}

impl Change {
    fn field(&self) -> Option<Field> {
        match self {
            Change::Toggle { field, .. } => Some(*field),
            Change::Reply { .. } => Some(Field::Reply),
            Change::Share => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Created,
    Applied,
    Confirmed,
    Reverted,
}

/// One optimistic change awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingAction {
    id: ActionId,
    item: ItemId,
    change: Change,
    status: PendingStatus,
}

impl PendingAction {
    fn new(id: ActionId, item: ItemId, change: Change) -> Self {
        Self {
            id,
            item,
            change,
            status: PendingStatus::Created,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn item(&self) -> &ItemId {
        &self.item
    }

    pub fn status(&self) -> PendingStatus {
        self.status
    }

    pub fn apply_optimistic(&mut self, state: &mut InteractionState) {
        match &self.change {
            Change::Toggle { field, to, .. } => set_field(state, *field, *to),
            Change::Reply { .. } => state.pending_reply_text.clear(),
            Change::Share => {}
        }
        self.status = PendingStatus::Applied;
    }

    pub fn confirm(&mut self) {
        self.status = PendingStatus::Confirmed;
    }

    /// Undo the optimistic change. A reverted reply only refills the input
    /// buffer if the user has not started typing something new.
    pub fn revert(&mut self, state: &mut InteractionState) {
        match &self.change {
            Change::Toggle { field, from, .. } => set_field(state, *field, *from),
            Change::Reply { text } => {
                if state.pending_reply_text.is_empty() {
                    state.pending_reply_text = text.clone();
                }
            }
            Change::Share => {}
        }
        self.status = PendingStatus::Reverted;
    }

    fn outbound(&self) -> OutboundCall {
        let id = self.item.clone();
        match &self.change {
            Change::Toggle {
                field: Field::Liked,
                to,
                ..
            } => {
                if *to {
                    OutboundCall::LikeItem(id)
                } else {
                    OutboundCall::UnlikeItem(id)
                }
            }
            Change::Toggle { to, .. } => {
                if *to {
                    OutboundCall::SaveItem(id)
                } else {
                    OutboundCall::UnsaveItem(id)
                }
            }
            Change::Reply { text } => OutboundCall::SendReply(id, text.clone()),
            Change::Share => OutboundCall::RecordShare(id),
        }
    }
}

fn set_field(state: &mut InteractionState, field: Field, value: bool) {
    match field {
        Field::Liked => state.liked = value,
        Field::Saved => state.saved = value,
        Field::Reply => {}
    }
}

/// Outbound call for an action that was just applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectRequest {
    pub action: ActionId,
    pub call: OutboundCall,
}

/// Result of applying a gesture.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub request: EffectRequest,
    /// New local state, or `None` when the gesture does not touch it.
    pub state: Option<InteractionState>,
}

/// Result of settling an outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub item: ItemId,
    pub failed: bool,
    /// State after a revert, if the revert changed anything.
    pub reverted_state: Option<InteractionState>,
}

#[derive(Debug, Default)]
pub struct InteractionDispatcher {
    states: HashMap<ItemId, InteractionState>,
    pending: HashMap<ActionId, PendingAction>,
    latest: HashMap<(ItemId, Field), ActionId>,
    next_action: u64,
    composing: Option<ItemId>,
}

impl InteractionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, item: &ItemId) -> InteractionState {
        self.states.get(item).cloned().unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Like or unlike. Returns `None` if the item is already in that state.
    pub fn set_liked(&mut self, item: &ItemId, liked: bool) -> Option<Dispatched> {
        let current = self.state(item).liked;
        (current != liked).then(|| self.toggle(item, Field::Liked, current))
    }

    pub fn toggle_like(&mut self, item: &ItemId) -> Dispatched {
        let current = self.state(item).liked;
        self.toggle(item, Field::Liked, current)
    }

    /// Save or unsave. Returns `None` if the item is already in that state.
    pub fn set_saved(&mut self, item: &ItemId, saved: bool) -> Option<Dispatched> {
        let current = self.state(item).saved;
        (current != saved).then(|| self.toggle(item, Field::Saved, current))
    }

    pub fn toggle_save(&mut self, item: &ItemId) -> Dispatched {
        let current = self.state(item).saved;
        self.toggle(item, Field::Saved, current)
    }

    pub fn share(&mut self, item: &ItemId) -> Dispatched {
        self.begin(item, Change::Share)
    }

    /// Replace the reply input buffer for `item`.
    pub fn edit_reply(&mut self, item: &ItemId, text: &str) -> InteractionState {
        let state = self.states.entry(item.clone()).or_default();
        state.pending_reply_text = text.to_string();
        state.clone()
    }

    pub fn submit_reply(&mut self, item: &ItemId, text: &str) -> Result<Dispatched> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::EmptyReply);
        }
        Ok(self.begin(
            item,
            Change::Reply {
                text: text.to_string(),
            },
        ))
    }

    /// Focus the reply composer on `item`. Returns true when this opened it,
    /// which is when the caller must pause playback.
    pub fn open_composer(&mut self, item: &ItemId) -> bool {
        if self.composing.is_some() {
            if self.composing.as_ref() != Some(item) {
                self.composing = Some(item.clone());
            }
            return false;
        }
        self.composing = Some(item.clone());
        true
    }

    /// Blur the composer. Returns the item it was open on; the caller must
    /// resume playback exactly when this is `Some`.
    pub fn close_composer(&mut self) -> Option<ItemId> {
        self.composing.take()
    }

    pub fn composing(&self) -> Option<&ItemId> {
        self.composing.as_ref()
    }

    /// Apply the backend's verdict on `action`. Unknown or already settled
    /// actions yield `None`.
    ///
    /// A failed toggle is only rolled back while it is still the latest
    /// action on that field; otherwise a newer gesture already decided the
    /// value.
    pub fn settle(&mut self, action: ActionId, ok: bool) -> Option<Settled> {
        let mut pending = self.pending.remove(&action)?;
        let item = pending.item.clone();

        let key = pending.change.field().map(|field| (item.clone(), field));
        let is_latest = key
            .as_ref()
            .map(|k| self.latest.get(k) == Some(&action))
            .unwrap_or(false);
        if is_latest {
            if let Some(k) = &key {
                self.latest.remove(k);
            }
        }

        if ok {
            pending.confirm();
            return Some(Settled {
                item,
                failed: false,
                reverted_state: None,
            });
        }

        let reverted_state = if is_latest {
            let state = self.states.entry(item.clone()).or_default();
            let before = state.clone();
            pending.revert(state);
            (*state != before).then(|| state.clone())
        } else {
            None
        };

        Some(Settled {
            item,
            failed: true,
            reverted_state,
        })
    }

    fn toggle(&mut self, item: &ItemId, field: Field, current: bool) -> Dispatched {
        self.begin(
            item,
            Change::Toggle {
                field,
                from: current,
                to: !current,
            },
        )
    }

    fn begin(&mut self, item: &ItemId, change: Change) -> Dispatched {
        self.next_action += 1;
        let id = ActionId(self.next_action);
        let touches_state = change.field().is_some();

        let mut action = PendingAction::new(id, item.clone(), change);
        let state = self.states.entry(item.clone()).or_default();
        action.apply_optimistic(state);
        let state = touches_state.then(|| state.clone());

        if let Some(field) = action.change.field() {
            self.latest.insert((item.clone(), field), id);
        }

        let request = EffectRequest {
            action: id,
            call: action.outbound(),
        };
        tracing::debug!("Dispatching {} {} for {}", request.call.name(), id, item);
        self.pending.insert(id, action);

        Dispatched { request, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::from(s)
    }

    #[test]
    fn double_toggle_issues_two_calls_and_restores_state() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        let first = dispatcher.toggle_like(&a);
        let second = dispatcher.toggle_like(&a);

        assert_eq!(first.request.call, OutboundCall::LikeItem(a.clone()));
        assert_eq!(second.request.call, OutboundCall::UnlikeItem(a.clone()));
        assert_ne!(first.request.action, second.request.action);
        assert!(!dispatcher.state(&a).liked);
        assert_eq!(dispatcher.pending_count(), 2);
    }

    #[test]
    fn explicit_like_is_idempotent() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        assert!(dispatcher.set_liked(&a, true).is_some());
        assert!(dispatcher.set_liked(&a, true).is_none());
        assert!(dispatcher.set_liked(&a, false).is_some());
    }

    #[test]
    fn failed_like_reverts() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        let like = dispatcher.set_liked(&a, true).unwrap();
        assert_eq!(like.state.as_ref().map(|s| s.liked), Some(true));

        let settled = dispatcher.settle(like.request.action, false).unwrap();
        assert!(settled.failed);
        assert_eq!(settled.reverted_state.map(|s| s.liked), Some(false));
        assert!(!dispatcher.state(&a).liked);
    }

    #[test]
    fn confirmed_like_sticks() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        let like = dispatcher.set_liked(&a, true).unwrap();
        let settled = dispatcher.settle(like.request.action, true).unwrap();
        assert!(!settled.failed);
        assert!(dispatcher.state(&a).liked);
        assert_eq!(dispatcher.pending_count(), 0);
        assert!(dispatcher.settle(like.request.action, false).is_none());
    }

    #[test]
    fn superseded_failure_does_not_revert() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        let like = dispatcher.toggle_like(&a);
        let unlike = dispatcher.toggle_like(&a);
        dispatcher.settle(unlike.request.action, true);

        let settled = dispatcher.settle(like.request.action, false).unwrap();
        assert!(settled.failed);
        assert_eq!(settled.reverted_state, None);
        assert!(!dispatcher.state(&a).liked);
    }

    #[test]
    fn save_is_independent_of_like() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        dispatcher.toggle_like(&a);
        let save = dispatcher.toggle_save(&a);
        assert_eq!(save.request.call, OutboundCall::SaveItem(a.clone()));

        let settled = dispatcher.settle(save.request.action, false).unwrap();
        let state = settled.reverted_state.unwrap();
        assert!(state.liked);
        assert!(!state.saved);

        let save = dispatcher.set_saved(&a, true).unwrap();
        dispatcher.settle(save.request.action, true);
        let unsave = dispatcher.toggle_save(&a);
        assert_eq!(unsave.request.call, OutboundCall::UnsaveItem(a));
    }

    #[test]
    fn reply_clears_buffer_and_restores_on_failure() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        dispatcher.edit_reply(&a, "  nice shot ");
        let reply = dispatcher.submit_reply(&a, "  nice shot ").unwrap();
        assert_eq!(
            reply.request.call,
            OutboundCall::SendReply(a.clone(), "nice shot".to_string())
        );
        assert_eq!(dispatcher.state(&a).pending_reply_text, "");

        let settled = dispatcher.settle(reply.request.action, false).unwrap();
        assert_eq!(
            settled.reverted_state.map(|s| s.pending_reply_text),
            Some("nice shot".to_string())
        );
    }

    #[test]
    fn failed_reply_keeps_newer_draft() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        let reply = dispatcher.submit_reply(&a, "first").unwrap();
        dispatcher.edit_reply(&a, "second draft");
        let settled = dispatcher.settle(reply.request.action, false).unwrap();
        assert_eq!(settled.reverted_state, None);
        assert_eq!(dispatcher.state(&a).pending_reply_text, "second draft");
    }

    #[test]
    fn empty_reply_is_rejected() {
        let mut dispatcher = InteractionDispatcher::new();
        assert!(matches!(
            dispatcher.submit_reply(&id("a"), "   \n"),
            Err(EngineError::EmptyReply)
        ));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn share_leaves_state_alone() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        let share = dispatcher.share(&a);
        assert_eq!(share.request.call, OutboundCall::RecordShare(a.clone()));
        assert!(share.state.is_none());

        let settled = dispatcher.settle(share.request.action, false).unwrap();
        assert!(settled.failed);
        assert_eq!(settled.reverted_state, None);
        assert_eq!(dispatcher.state(&a), InteractionState::default());
    }

    #[test]
    fn composer_pauses_once_and_resumes_once() {
        let mut dispatcher = InteractionDispatcher::new();
        let a = id("a");

        assert!(dispatcher.open_composer(&a));
        assert!(!dispatcher.open_composer(&a));
        assert_eq!(dispatcher.close_composer(), Some(a));
        assert_eq!(dispatcher.close_composer(), None);
    }

    #[test]
    fn pending_action_lifecycle() {
        let mut state = InteractionState::default();
        let mut action = PendingAction::new(
            ActionId(1),
            id("a"),
            Change::Toggle {
                field: Field::Saved,
                from: false,
                to: true,
            },
        );
        assert_eq!(action.status(), PendingStatus::Created);

        action.apply_optimistic(&mut state);
        assert!(state.saved);
        assert_eq!(action.status(), PendingStatus::Applied);

        action.revert(&mut state);
        assert!(!state.saved);
        assert_eq!(action.status(), PendingStatus::Reverted);

        action.confirm();
        assert_eq!(action.status(), PendingStatus::Confirmed);
    }
}
