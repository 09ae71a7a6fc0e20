//! Drag/interaction state machine.
//!
//! A drag is either idle or carries one payload. Every drop or cancel
//! returns the machine to idle, whether or not the drop was accepted.

use crate::model::Character;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragKind {
    /// A character dragged from the roster onto a cell.
    Character,
    /// A raid column header being reordered.
    RaidHeader,
    /// A party row being reordered.
    PartyRow,
    /// A character being reordered within its owner's list.
    CharacterOrder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragPayload {
    Character(Character),
    RaidHeader { raid: String, source_index: usize },
    PartyRow { party: String, source_index: usize },
    CharacterOrder {
        character: String,
        owner: String,
        source_index: usize,
    },
}

impl DragPayload {
    pub fn kind(&self) -> DragKind {
        match self {
            DragPayload::Character(_) => DragKind::Character,
            DragPayload::RaidHeader { .. } => DragKind::RaidHeader,
            DragPayload::PartyRow { .. } => DragKind::PartyRow,
            DragPayload::CharacterOrder { .. } => DragKind::CharacterOrder,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragPayload),
}

#[derive(Debug, Clone, Default)]
pub struct DragMachine {
    state: DragState,
}

impl DragMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// Starts a drag. A drag already in progress is replaced.
    pub fn start(&mut self, payload: DragPayload) {
        if let DragState::Dragging(previous) = &self.state {
            tracing::debug!(kind = ?previous.kind(), "replacing unfinished drag");
        }
        self.state = DragState::Dragging(payload);
    }

    pub fn cancel(&mut self) -> Option<DragPayload> {
        match std::mem::take(&mut self.state) {
            DragState::Idle => None,
            DragState::Dragging(payload) => Some(payload),
        }
    }

    /// Ends the drag for a drop of `kind`.
    ///
    /// The machine is idle afterwards in every case. The payload is returned
    /// only when the drop kind matches the drag; a mismatch is a cancel.
    pub fn take(&mut self, kind: DragKind) -> Option<DragPayload> {
        let payload = self.cancel()?;
        if payload.kind() == kind {
            Some(payload)
        } else {
            tracing::debug!(dragging = ?payload.kind(), dropped = ?kind, "drop kind mismatch");
            None
        }
    }
}

/// Moves `items[source]` to `target` in a new list.
///
/// Returns `None` when nothing moves: `source == target` or `source` is out of
/// range. A `target` past the end is clamped to the last position.
pub fn reorder<T: Clone>(items: &[T], source: usize, target: usize) -> Option<Vec<T>> {
    if source >= items.len() {
        return None;
    }
    let target = target.min(items.len() - 1);
    if source == target {
        return None;
    }
    let mut moved = items.to_vec();
    let item = moved.remove(source);
    moved.insert(target, item);
    Some(moved)
}
