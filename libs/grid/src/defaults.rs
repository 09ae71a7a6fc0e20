//! Built-in fallback data, used when the initial load cannot reach the backend.

use std::collections::BTreeMap;

use crate::grid::{GridParts, GridState};
use crate::model::{Character, Raid, User};

pub fn default_users() -> Vec<User> {
    vec![
        User::new("혀니", "#9d4edd"),
        User::new("샷건", "#f4d03f"),
        User::new("도당", "#85c1e9"),
    ]
}

pub fn default_raids() -> Vec<Raid> {
    ["베히모스", "하기르", "노브", "노르둠"]
        .into_iter()
        .zip(1..)
        .map(|(name, seq)| Raid::new(name, seq))
        .collect()
}

pub fn default_parties() -> Vec<String> {
    (1..=6).map(|n| format!("{n}파티")).collect()
}

pub fn default_characters() -> BTreeMap<String, Vec<Character>> {
    let roster: [(&str, &[(&str, bool)]); 3] = [
        ("혀니", &[("비내", false), ("메딕", true)]),
        ("샷건", &[("샷건", false), ("마리", false), ("붓먹", true)]),
        ("도당", &[("포우", false), ("포포", false)]),
    ];

    roster
        .into_iter()
        .map(|(user, characters)| {
            let list = characters
                .iter()
                .zip(1..)
                .map(|(&(name, supporter), seq)| Character {
                    name: name.to_string(),
                    is_supporter: supporter,
                    user_id: user.to_string(),
                    seq,
                })
                .collect();
            (user.to_string(), list)
        })
        .collect()
}

/// A grid made entirely of defaults with no assignments.
pub fn default_grid() -> GridState {
    GridState::from_parts(GridParts {
        raids: default_raids(),
        parties: default_parties(),
        users: default_users(),
        characters: default_characters(),
        ..GridParts::default()
    })
}
