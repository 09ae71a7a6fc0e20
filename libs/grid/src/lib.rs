//! Party x raid schedule grid.
//!
//! This crate is the pure core of raidboard. It holds no I/O and no async:
//!
//! - [`model`]: characters, raids, users, cells and user-schedule entries.
//! - [`constraint`]: the placement rules and their fixed evaluation order.
//! - [`GridState`]: the in-memory aggregate, replaced wholesale on reload.
//! - [`ChangeTracker`]: what differs from the last synced baseline.
//! - [`DragMachine`]: transient drag state.
//! - [`Board`]: all of the above behind one set of mutators.
//!
//! # Invariants
//!
//! After every completed mutation:
//!
//! - a character name appears in at most one party per raid
//! - a character is placed in at most [`MAX_RAIDS_PER_CHARACTER`] raids
//! - no two characters in one cell share a user
//! - a finished cell accepts no new characters
//! - a cell with no characters has no entry

pub mod board;
pub mod constraint;
pub mod defaults;
mod error;
pub mod grid;
pub mod interaction;
pub mod model;
pub mod tracker;
pub mod week;

pub use board::{Board, BoardChange, DropResult, PendingEdits};
pub use constraint::{evaluate, Verdict, Violation, MAX_CELL_SIZE, MAX_RAIDS_PER_CHARACTER};
pub use error::GridError;
pub use grid::{GridParts, GridState, UserScheduleMap};
pub use interaction::{reorder, DragKind, DragMachine, DragPayload, DragState};
pub use model::{
    AssignedCharacter, CellKey, Character, Raid, RaidOrder, User, UserScheduleChange,
    UserScheduleEntry, UserScheduleKey, WeekNumber,
};
pub use tracker::{ChangeTracker, DeleteDisposition};
pub use week::{day_key, WeekInfo, WeekRange, DAYS};
