//! Property tests for placement invariants.
//!
//! Random sequences of placements, removals and finish toggles are applied
//! to a small board; after every step the board must still satisfy the
//! per-raid, raid-limit and per-user rules.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use raidboard_grid::{
    Board, CellKey, Character, DropResult, GridParts, GridState, Raid, User, Violation,
    MAX_RAIDS_PER_CHARACTER,
};

const PARTIES: [&str; 3] = ["P1", "P2", "P3"];
const RAIDS: [&str; 5] = ["R1", "R2", "R3", "R4", "R5"];
const ROSTER: [(&str, &str); 4] = [("U1", "A"), ("U1", "B"), ("U2", "C"), ("U3", "D")];

#[derive(Debug, Clone)]
enum Action {
    Place { who: usize, party: usize, raid: usize },
    Remove { party: usize, raid: usize, index: usize },
    ToggleFinished { party: usize, raid: usize },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (0..ROSTER.len(), 0..PARTIES.len(), 0..RAIDS.len())
            .prop_map(|(who, party, raid)| Action::Place { who, party, raid }),
        2 => (0..PARTIES.len(), 0..RAIDS.len(), 0..4usize)
            .prop_map(|(party, raid, index)| Action::Remove { party, raid, index }),
        1 => (0..PARTIES.len(), 0..RAIDS.len())
            .prop_map(|(party, raid)| Action::ToggleFinished { party, raid }),
    ]
}

fn board() -> Board {
    let mut characters: BTreeMap<String, Vec<Character>> = BTreeMap::new();
    for (user, name) in ROSTER {
        let list = characters.entry(user.to_string()).or_default();
        let seq = list.len() as i32 + 1;
        list.push(Character::new(user, name, seq));
    }
    Board::new(GridState::from_parts(GridParts {
        raids: RAIDS
            .iter()
            .zip(1..)
            .map(|(name, seq)| Raid::new(*name, seq))
            .collect(),
        parties: PARTIES.iter().map(|p| p.to_string()).collect(),
        users: ["U1", "U2", "U3"]
            .iter()
            .map(|u| User::new(*u, "#000"))
            .collect(),
        characters,
        ..GridParts::default()
    }))
}

fn key(party: usize, raid: usize) -> CellKey {
    CellKey::new(PARTIES[party], RAIDS[raid])
}

fn assert_invariants(grid: &GridState) {
    for (_, name) in ROSTER {
        assert!(grid.character_raids(name).len() <= MAX_RAIDS_PER_CHARACTER);
        for raid in RAIDS {
            let parties = grid
                .cells()
                .iter()
                .filter(|(k, cell)| k.raid == raid && cell.iter().any(|c| c.name == name))
                .count();
            assert!(parties <= 1, "{name} in {parties} parties for {raid}");
        }
    }
    for cell in grid.cells().values() {
        assert!(!cell.is_empty());
        let users: BTreeSet<&str> = cell.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(users.len(), cell.len());
    }
}

proptest! {
    #[test]
    fn prop_invariants_hold(actions in proptest::collection::vec(action(), 0..60)) {
        let mut board = board();
        for action in actions {
            match action {
                Action::Place { who, party, raid } => {
                    let (user, name) = ROSTER[who];
                    let target = key(party, raid);
                    let was_finished = board.grid().is_finished(&target);
                    let before = board.grid().clone();
                    let result = board.place(user, name, &target).unwrap();
                    match result {
                        DropResult::Rejected(_) => prop_assert_eq!(board.grid(), &before),
                        DropResult::Applied(_) => prop_assert!(!was_finished),
                        DropResult::Ignored => prop_assert!(false, "known cell ignored"),
                    }
                }
                Action::Remove { party, raid, index } => {
                    board.double_activate(&key(party, raid), index);
                }
                Action::ToggleFinished { party, raid } => {
                    board.secondary_activate(&key(party, raid), None);
                }
            }
            assert_invariants(board.grid());
        }
    }

    #[test]
    fn prop_fourth_raid_rejected(party in 0..PARTIES.len(), raid in 3..RAIDS.len()) {
        let mut board = board();
        for r in 0..3 {
            let placed = board.place("U1", "A", &key(r % PARTIES.len(), r)).unwrap();
            prop_assert!(matches!(placed, DropResult::Applied(_)));
        }
        let result = board.place("U1", "A", &key(party, raid)).unwrap();
        prop_assert_eq!(result, DropResult::Rejected(Violation::RaidLimitExceeded));
    }

    #[test]
    fn prop_other_party_same_raid_rejected(first in 0..PARTIES.len(), second in 0..PARTIES.len(), raid in 0..RAIDS.len()) {
        prop_assume!(first != second);
        let mut board = board();
        board.place("U2", "C", &key(first, raid)).unwrap();
        let before = board.grid().clone();
        let result = board.place("U2", "C", &key(second, raid)).unwrap();
        prop_assert_eq!(result, DropResult::Rejected(Violation::DuplicateRaidOtherParty));
        prop_assert_eq!(board.grid(), &before);
    }
}
