//! # raidboard-id
//!
//! Typed identifiers for raidboard.
//!
//! Assignments placed on the board get a [`ScheduleId`] the moment they are
//! dropped into a cell. The backend never sees it: it is a local identity that
//! keeps two assignments of the same character apart until the next reload
//! hands out fresh ones.
//!
//! ## ID Format
//!
//! `{prefix}_{ulid}`, for example `sch_01HV4Z2WQXKJNM8GPQY6VBKC3D`.

mod error;
mod macros;
mod types;

pub use error::IdError;
#[doc(hidden)]
pub use macros::split_id;
pub use types::*;
pub use ulid::Ulid;
