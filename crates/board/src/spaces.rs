use moa_core::*;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// What kind of space a board index is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpaceKind {
    Go,
    Property,
    Railroad,
    Utility,
    Tax,
    Chance,
    CommunityChest,
    Jail,
    FreeParking,
    GoToJail,
}

impl SpaceKind {
    /// Ownable spaces can carry an owner and be auctioned.
    pub fn is_ownable(&self) -> bool {
        matches!(self, Self::Property | Self::Railroad | Self::Utility)
    }
}

/// Color group (or the railroad/utility pseudo-groups).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Group {
    Brown,
    LightBlue,
    Pink,
    Orange,
    Red,
    Yellow,
    Green,
    DarkBlue,
    Railroad,
    Utility,
}

impl Group {
    /// Only color groups accept houses and hotels.
    pub fn is_buildable(&self) -> bool {
        !matches!(self, Self::Railroad | Self::Utility)
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Brown => "BROWN",
            Self::LightBlue => "LIGHT_BLUE",
            Self::Pink => "PINK",
            Self::Orange => "ORANGE",
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
            Self::DarkBlue => "DARK_BLUE",
            Self::Railroad => "RAILROAD",
            Self::Utility => "UTILITY",
        };
        write!(f, "{}", name)
    }
}

/// Immutable description of one board space.
#[derive(Clone, Copy, Debug)]
pub struct SpaceSpec {
    pub index: SpaceIndex,
    pub kind: SpaceKind,
    pub name: &'static str,
    pub group: Option<Group>,
    pub price: Option<Cash>,
}

const fn space(
    index: SpaceIndex,
    kind: SpaceKind,
    name: &'static str,
    group: Option<Group>,
    price: Option<Cash>,
) -> SpaceSpec {
    SpaceSpec {
        index,
        kind,
        name,
        group,
        price,
    }
}

/// The classic 40-space board in play order.
#[rustfmt::skip]
pub const BOARD: [SpaceSpec; BOARD_SIZE] = [
    space( 0, SpaceKind::Go,             "Go",                    None,                   None),
    space( 1, SpaceKind::Property,       "Mediterranean Avenue",  Some(Group::Brown),     Some(60)),
    space( 2, SpaceKind::CommunityChest, "Community Chest",       None,                   None),
    space( 3, SpaceKind::Property,       "Baltic Avenue",         Some(Group::Brown),     Some(60)),
    space( 4, SpaceKind::Tax,            "Income Tax",            None,                   None),
    space( 5, SpaceKind::Railroad,       "Reading Railroad",      Some(Group::Railroad),  Some(200)),
    space( 6, SpaceKind::Property,       "Oriental Avenue",       Some(Group::LightBlue), Some(100)),
    space( 7, SpaceKind::Chance,         "Chance",                None,                   None),
    space( 8, SpaceKind::Property,       "Vermont Avenue",        Some(Group::LightBlue), Some(100)),
    space( 9, SpaceKind::Property,       "Connecticut Avenue",    Some(Group::LightBlue), Some(120)),
    space(10, SpaceKind::Jail,           "Jail",                  None,                   None),
    space(11, SpaceKind::Property,       "St. Charles Place",     Some(Group::Pink),      Some(140)),
    space(12, SpaceKind::Utility,        "Electric Company",      Some(Group::Utility),   Some(150)),
    space(13, SpaceKind::Property,       "States Avenue",         Some(Group::Pink),      Some(140)),
    space(14, SpaceKind::Property,       "Virginia Avenue",       Some(Group::Pink),      Some(160)),
    space(15, SpaceKind::Railroad,       "Pennsylvania Railroad", Some(Group::Railroad),  Some(200)),
    space(16, SpaceKind::Property,       "St. James Place",       Some(Group::Orange),    Some(180)),
    space(17, SpaceKind::CommunityChest, "Community Chest",       None,                   None),
    space(18, SpaceKind::Property,       "Tennessee Avenue",      Some(Group::Orange),    Some(180)),
    space(19, SpaceKind::Property,       "New York Avenue",       Some(Group::Orange),    Some(200)),
    space(20, SpaceKind::FreeParking,    "Free Parking",          None,                   None),
    space(21, SpaceKind::Property,       "Kentucky Avenue",       Some(Group::Red),       Some(220)),
    space(22, SpaceKind::Chance,         "Chance",                None,                   None),
    space(23, SpaceKind::Property,       "Indiana Avenue",        Some(Group::Red),       Some(220)),
    space(24, SpaceKind::Property,       "Illinois Avenue",       Some(Group::Red),       Some(240)),
    space(25, SpaceKind::Railroad,       "B. & O. Railroad",      Some(Group::Railroad),  Some(200)),
    space(26, SpaceKind::Property,       "Atlantic Avenue",       Some(Group::Yellow),    Some(260)),
    space(27, SpaceKind::Property,       "Ventnor Avenue",        Some(Group::Yellow),    Some(260)),
    space(28, SpaceKind::Utility,        "Water Works",           Some(Group::Utility),   Some(150)),
    space(29, SpaceKind::Property,       "Marvin Gardens",        Some(Group::Yellow),    Some(280)),
    space(30, SpaceKind::GoToJail,       "Go To Jail",            None,                   None),
    space(31, SpaceKind::Property,       "Pacific Avenue",        Some(Group::Green),     Some(300)),
    space(32, SpaceKind::Property,       "North Carolina Avenue", Some(Group::Green),     Some(300)),
    space(33, SpaceKind::Property,       "Pennsylvania Avenue",   Some(Group::Green),     Some(320)),
    space(34, SpaceKind::CommunityChest, "Community Chest",       None,                   None),
    space(35, SpaceKind::Railroad,       "Short Line",            Some(Group::Railroad),  Some(200)),
    space(36, SpaceKind::Chance,         "Chance",                None,                   None),
    space(37, SpaceKind::Property,       "Park Place",            Some(Group::DarkBlue),  Some(350)),
    space(38, SpaceKind::Tax,            "Luxury Tax",            None,                   None),
    space(39, SpaceKind::Property,       "Boardwalk",             Some(Group::DarkBlue),  Some(400)),
];

/// Rent tables for color properties, indexed [base, 1..4 houses, hotel].
#[rustfmt::skip]
pub const PROPERTY_RENTS: [(SpaceIndex, [Cash; 6]); 22] = [
    ( 1, [ 2,  10,  30,   90,  160,  250]),
    ( 3, [ 4,  20,  60,  180,  320,  450]),
    ( 6, [ 6,  30,  90,  270,  400,  550]),
    ( 8, [ 6,  30,  90,  270,  400,  550]),
    ( 9, [ 8,  40, 100,  300,  450,  600]),
    (11, [10,  50, 150,  450,  625,  750]),
    (13, [10,  50, 150,  450,  625,  750]),
    (14, [12,  60, 180,  500,  700,  900]),
    (16, [14,  70, 200,  550,  750,  950]),
    (18, [14,  70, 200,  550,  750,  950]),
    (19, [16,  80, 220,  600,  800, 1000]),
    (21, [18,  90, 250,  700,  875, 1050]),
    (23, [18,  90, 250,  700,  875, 1050]),
    (24, [20, 100, 300,  750,  925, 1100]),
    (26, [22, 110, 330,  800,  975, 1150]),
    (27, [22, 110, 330,  800,  975, 1150]),
    (29, [24, 120, 360,  850, 1025, 1200]),
    (31, [26, 130, 390,  900, 1100, 1275]),
    (32, [26, 130, 390,  900, 1100, 1275]),
    (33, [28, 150, 450, 1000, 1200, 1400]),
    (37, [35, 175, 500, 1100, 1300, 1500]),
    (39, [50, 200, 600, 1400, 1700, 2000]),
];

/// Railroad rents indexed by owned count minus one.
pub const RAILROAD_RENTS: [Cash; 4] = [25, 50, 100, 200];

/// Index of the jail space.
pub const JAIL_INDEX: SpaceIndex = 10;

/// Normalizes a display name into a stable external identifier:
/// uppercase, non-alphanumeric runs collapsed to single underscores.
pub fn normalize_space_key(name: &str) -> SpaceKey {
    let mut key = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    key
}

static SPACE_KEYS: LazyLock<Vec<SpaceKey>> =
    LazyLock::new(|| BOARD.iter().map(|s| normalize_space_key(s.name)).collect());

static SPACE_INDEX_BY_KEY: LazyLock<HashMap<SpaceKey, SpaceIndex>> = LazyLock::new(|| {
    SPACE_KEYS
        .iter()
        .enumerate()
        .map(|(i, k)| (k.clone(), i))
        .collect()
});

/// Stable external identifier for a board index.
pub fn space_key(index: SpaceIndex) -> SpaceKey {
    SPACE_KEYS
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("SPACE_{}", index))
}

/// Resolves a (possibly unnormalized) space key back to a board index.
pub fn space_index(key: &str) -> Option<SpaceIndex> {
    SPACE_INDEX_BY_KEY.get(&normalize_space_key(key)).copied()
}

/// Rent table for a color property, if the index has one.
pub fn rent_table(index: SpaceIndex) -> Option<&'static [Cash; 6]> {
    PROPERTY_RENTS
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, table)| table)
}

/// Utility rent multiplier by number of utilities owned.
pub fn utility_multiplier(owned: usize) -> Cash {
    match owned {
        2 => 10,
        _ => 4,
    }
}

/// Fixed tax amount and reason code for a tax space.
pub fn tax_amount(index: SpaceIndex) -> Option<(Cash, &'static str)> {
    match index {
        4 => Some((200, "TAX_INCOME")),
        38 => Some((100, "TAX_LUXURY")),
        _ => None,
    }
}

/// Per-house (and per-hotel) build cost for a color group.
pub fn house_cost(group: Group) -> Cash {
    match group {
        Group::Brown | Group::LightBlue => 50,
        Group::Pink | Group::Orange => 100,
        Group::Red | Group::Yellow => 150,
        Group::Green | Group::DarkBlue => 200,
        Group::Railroad | Group::Utility => 0,
    }
}

/// Board indices belonging to a group, in board order.
pub fn group_indices(group: Group) -> &'static [SpaceIndex] {
    match group {
        Group::Brown => &[1, 3],
        Group::LightBlue => &[6, 8, 9],
        Group::Pink => &[11, 13, 14],
        Group::Orange => &[16, 18, 19],
        Group::Red => &[21, 23, 24],
        Group::Yellow => &[26, 27, 29],
        Group::Green => &[31, 32, 33],
        Group::DarkBlue => &[37, 39],
        Group::Railroad => &[5, 15, 25, 35],
        Group::Utility => &[12, 28],
    }
}

/// All buildable color groups.
pub fn buildable_groups() -> impl Iterator<Item = Group> {
    [
        Group::Brown,
        Group::LightBlue,
        Group::Pink,
        Group::Orange,
        Group::Red,
        Group::Yellow,
        Group::Green,
        Group::DarkBlue,
    ]
    .into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_indices_are_dense() {
        for (i, spec) in BOARD.iter().enumerate() {
            assert_eq!(spec.index, i);
        }
    }

    #[test]
    fn space_keys_round_trip() {
        for spec in BOARD.iter() {
            let key = space_key(spec.index);
            assert_eq!(space_index(&key), Some(spec.index));
        }
    }

    #[test]
    fn normalization_collapses_punctuation() {
        assert_eq!(normalize_space_key("B. & O. Railroad"), "B_O_RAILROAD");
        assert_eq!(normalize_space_key("St. Charles Place"), "ST_CHARLES_PLACE");
        assert_eq!(normalize_space_key("  Boardwalk  "), "BOARDWALK");
    }

    #[test]
    fn every_property_has_a_rent_table() {
        for spec in BOARD.iter() {
            if spec.kind == SpaceKind::Property {
                assert!(rent_table(spec.index).is_some(), "{}", spec.name);
            }
        }
        assert_eq!(rent_table(14).map(|t| t[0]), Some(12));
        assert_eq!(rent_table(1).map(|t| t[5]), Some(250));
    }

    #[test]
    fn groups_partition_ownables() {
        let mut covered = 0;
        for group in buildable_groups() {
            for &index in group_indices(group) {
                assert_eq!(BOARD[index].group, Some(group));
                covered += 1;
            }
        }
        covered += group_indices(Group::Railroad).len();
        covered += group_indices(Group::Utility).len();
        let ownable = BOARD.iter().filter(|s| s.kind.is_ownable()).count();
        assert_eq!(covered, ownable);
    }

    #[test]
    fn tax_spaces_match_table() {
        assert_eq!(tax_amount(4), Some((200, "TAX_INCOME")));
        assert_eq!(tax_amount(38), Some((100, "TAX_LUXURY")));
        assert_eq!(tax_amount(0), None);
    }
}
