//! Placement rules.
//!
//! [`evaluate`] is a pure function over a [`GridState`] snapshot. The checks
//! run in a fixed order and the first failing rule is reported, so callers
//! always see the same reason for the same board.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::GridState;
use crate::model::{CellKey, Character};

/// Maximum number of distinct raids a single character may be placed in.
pub const MAX_RAIDS_PER_CHARACTER: usize = 3;

/// Maximum number of characters one cell holds.
pub const MAX_CELL_SIZE: usize = 4;

/// Reason a placement was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Violation {
    /// Target cell is marked finished.
    CellFinished,
    /// Character already sits in the target cell.
    DuplicateInCell,
    /// Character already sits in another party for the same raid.
    DuplicateRaidOtherParty,
    /// Character already occupies the maximum number of raids.
    RaidLimitExceeded,
    /// Another character of the same user occupies the target cell.
    DuplicateUserInCell,
    /// Target cell already holds [`MAX_CELL_SIZE`] characters.
    CellFull,
}

impl Violation {
    /// Stable code for UI feedback and logs.
    pub const fn code(self) -> &'static str {
        match self {
            Violation::CellFinished => "cell-finished",
            Violation::DuplicateInCell => "duplicate-in-cell",
            Violation::DuplicateRaidOtherParty => "duplicate-raid-other-party",
            Violation::RaidLimitExceeded => "raid-limit-exceeded",
            Violation::DuplicateUserInCell => "duplicate-user-in-cell",
            Violation::CellFull => "cell-full",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Violation::CellFinished => "this cell is finished and accepts no new characters",
            Violation::DuplicateInCell => "character is already in this cell",
            Violation::DuplicateRaidOtherParty => {
                "character is already placed in another party for this raid"
            }
            Violation::RaidLimitExceeded => "character is already placed in 3 raids",
            Violation::DuplicateUserInCell => "another character of this user is already in this cell",
            Violation::CellFull => "cell already holds 4 characters",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// `Ok(())` means the placement is allowed.
pub type Verdict = Result<(), Violation>;

/// Checks whether `character` may be placed into `target`.
///
/// Order: finished, duplicate in cell, same raid in another party, raid
/// limit, same user in cell, cell capacity.
pub fn evaluate(grid: &GridState, character: &Character, target: &CellKey) -> Verdict {
    if grid.is_finished(target) {
        return Err(Violation::CellFinished);
    }

    let occupants = grid.cell(target);
    if occupants.iter().any(|c| c.name == character.name) {
        return Err(Violation::DuplicateInCell);
    }

    let in_other_party = grid.cells().iter().any(|(key, cell)| {
        key.raid == target.raid
            && key.party != target.party
            && cell.iter().any(|c| c.name == character.name)
    });
    if in_other_party {
        return Err(Violation::DuplicateRaidOtherParty);
    }

    let raids = grid.character_raids(&character.name);
    if raids.len() >= MAX_RAIDS_PER_CHARACTER && !raids.contains(target.raid.as_str()) {
        return Err(Violation::RaidLimitExceeded);
    }

    if occupants.iter().any(|c| c.user_id == character.user_id) {
        return Err(Violation::DuplicateUserInCell);
    }

    if occupants.len() >= MAX_CELL_SIZE {
        return Err(Violation::CellFull);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridParts;
    use crate::model::{AssignedCharacter, Raid, User};
    use rstest::rstest;

    fn character(user: &str, name: &str) -> Character {
        Character::new(user, name, 1)
    }

    fn grid_with(placements: &[(&str, &str, &str, &str)], finished: &[(&str, &str)]) -> GridState {
        let mut parts = GridParts {
            raids: ["R1", "R2", "R3", "R4"]
                .iter()
                .enumerate()
                .map(|(i, name)| Raid::new(*name, i as i32 + 1))
                .collect(),
            parties: vec!["P1".into(), "P2".into()],
            users: vec![User::new("U1", "#fff"), User::new("U2", "#000")],
            ..GridParts::default()
        };
        for (user, name, party, raid) in placements {
            let key = CellKey::new(*party, *raid);
            parts
                .cells
                .entry(key.clone())
                .or_default()
                .push(AssignedCharacter::new(&character(user, name), &key));
        }
        for (party, raid) in finished {
            parts.finished.insert(CellKey::new(*party, *raid), true);
        }
        GridState::from_parts(parts)
    }

    #[rstest]
    #[case::finished_cell(&[], &[("P1", "R1")], ("U1", "X"), ("P1", "R1"), Err(Violation::CellFinished))]
    #[case::same_cell(&[("U1", "X", "P1", "R1")], &[], ("U1", "X"), ("P1", "R1"), Err(Violation::DuplicateInCell))]
    #[case::other_party(&[("U1", "X", "P1", "R1")], &[], ("U1", "X"), ("P2", "R1"), Err(Violation::DuplicateRaidOtherParty))]
    #[case::fourth_raid(
        &[("U1", "X", "P1", "R1"), ("U1", "X", "P1", "R2"), ("U1", "X", "P2", "R3")],
        &[],
        ("U1", "X"),
        ("P2", "R4"),
        Err(Violation::RaidLimitExceeded)
    )]
    #[case::same_user(&[("U1", "Y", "P1", "R1")], &[], ("U1", "X"), ("P1", "R1"), Err(Violation::DuplicateUserInCell))]
    #[case::allowed(&[("U2", "Y", "P1", "R1")], &[], ("U1", "X"), ("P1", "R1"), Ok(()))]
    #[case::finished_wins_over_duplicate(&[("U1", "X", "P1", "R1")], &[("P1", "R1")], ("U1", "X"), ("P1", "R1"), Err(Violation::CellFinished))]
    fn test_evaluate(
        #[case] placements: &[(&str, &str, &str, &str)],
        #[case] finished: &[(&str, &str)],
        #[case] who: (&str, &str),
        #[case] target: (&str, &str),
        #[case] expected: Verdict,
    ) {
        let grid = grid_with(placements, finished);
        let verdict = evaluate(&grid, &character(who.0, who.1), &CellKey::new(target.0, target.1));
        assert_eq!(verdict, expected);
    }

    #[test]
    fn test_duplicate_raid_checked_before_raid_limit() {
        let grid = grid_with(
            &[
                ("U1", "X", "P1", "R1"),
                ("U1", "X", "P1", "R2"),
                ("U1", "X", "P1", "R3"),
            ],
            &[],
        );
        let verdict = evaluate(&grid, &character("U1", "X"), &CellKey::new("P2", "R1"));
        assert_eq!(verdict, Err(Violation::DuplicateRaidOtherParty));
    }

    #[test]
    fn test_cell_capacity() {
        let grid = grid_with(
            &[
                ("A", "a", "P1", "R1"),
                ("B", "b", "P1", "R1"),
                ("C", "c", "P1", "R1"),
                ("D", "d", "P1", "R1"),
            ],
            &[],
        );
        let verdict = evaluate(&grid, &character("U1", "X"), &CellKey::new("P1", "R1"));
        assert_eq!(verdict, Err(Violation::CellFull));
    }

    #[test]
    fn test_violation_codes_serialize_kebab_case() {
        let json = serde_json::to_string(&Violation::DuplicateRaidOtherParty).unwrap();
        assert_eq!(json, "\"duplicate-raid-other-party\"");
        assert_eq!(Violation::RaidLimitExceeded.to_string(), "raid-limit-exceeded");
    }
}
