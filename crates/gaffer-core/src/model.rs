// Core data model: positions, players, match history rows, fixtures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PlayerId = u32;
pub type ClubId = u32;
pub type FixtureId = u32;

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// Squad positions. Declaration order is also the display order of a lineup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK", alias = "GKP")]
    Gk,
    #[serde(rename = "DEF")]
    Def,
    #[serde(rename = "MID")]
    Mid,
    #[serde(rename = "FWD")]
    Fwd,
}

impl Position {
    pub const ALL: [Position; 4] = [Position::Gk, Position::Def, Position::Mid, Position::Fwd];

    /// Parse a position string.
    ///
    /// Accepts "GK"/"GKP", "DEF", "MID", "FWD" (case-insensitive) as well as
    /// the FPL `element_type` codes "1".."4".
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GK" | "GKP" | "1" => Some(Position::Gk),
            "DEF" | "2" => Some(Position::Def),
            "MID" | "3" => Some(Position::Mid),
            "FWD" | "4" => Some(Position::Fwd),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Gk => "GK",
            Position::Def => "DEF",
            Position::Mid => "MID",
            Position::Fwd => "FWD",
        }
    }

    /// Goalkeepers and defenders score mainly through clean sheets, so their
    /// fixture signal is defensive.
    pub fn is_defensive(&self) -> bool {
        matches!(self, Position::Gk | Position::Def)
    }

    /// Index into fixed-size per-position arrays.
    pub fn index(&self) -> usize {
        match self {
            Position::Gk => 0,
            Position::Def => 1,
            Position::Mid => 2,
            Position::Fwd => 3,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Venue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn other(&self) -> Venue {
        match self {
            Venue::Home => Venue::Away,
            Venue::Away => Venue::Home,
        }
    }
}

// ---------------------------------------------------------------------------
// Players and history
// ---------------------------------------------------------------------------

/// A player as currently listed by the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    pub position: Position,
    pub club: ClubId,
    /// Current price in minor units (55 = 5.5m).
    pub price: u32,
    /// Chance of playing next round (0-100). `None` when the game has not
    /// flagged the player, which means no discount.
    #[serde(default)]
    pub chance_of_playing: Option<u8>,
}

impl PlayerRecord {
    /// Multiplier applied to projected points for flagged players.
    pub fn availability(&self) -> f64 {
        match self.chance_of_playing {
            Some(chance) => f64::from(chance.min(100)) / 100.0,
            None => 1.0,
        }
    }
}

/// One player's line for one match. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchPerformance {
    pub player_id: PlayerId,
    pub fixture_id: FixtureId,
    pub round: u32,
    #[serde(default)]
    pub season: String,
    pub minutes: f64,
    pub points: f64,
    pub saves: f64,
    pub influence: f64,
    pub creativity: f64,
    pub threat: f64,
    pub ict_index: f64,
    pub expected_goals_conceded: f64,
    /// Price at the time of the match, minor units.
    pub price: u32,
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    /// Gameweek. `None` for postponed fixtures awaiting a new date.
    pub round: Option<u32>,
    pub kickoff: Option<DateTime<Utc>>,
    pub home: ClubId,
    pub away: ClubId,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub finished: bool,
}

impl Fixture {
    pub fn involves(&self, club: ClubId) -> bool {
        self.home == club || self.away == club
    }

    /// The venue and opponent from `club`'s point of view.
    pub fn side_of(&self, club: ClubId) -> Option<(Venue, ClubId)> {
        if self.home == club {
            Some((Venue::Home, self.away))
        } else if self.away == club {
            Some((Venue::Away, self.home))
        } else {
            None
        }
    }

    /// Final score if the match is finished and both scores are recorded.
    pub fn result(&self) -> Option<(u32, u32)> {
        if !self.finished {
            return None;
        }
        Some((self.home_score?, self.away_score?))
    }
}

// ---------------------------------------------------------------------------
// Cutoff
// ---------------------------------------------------------------------------

/// The point in time a valuation is computed as of.
///
/// Only history rows with `round <= round` (and a matching season tag when
/// `season` is set) are visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cutoff {
    pub round: u32,
    #[serde(default)]
    pub season: Option<String>,
}

impl Cutoff {
    pub fn round(round: u32) -> Self {
        Cutoff { round, season: None }
    }

    pub fn in_season(round: u32, season: impl Into<String>) -> Self {
        Cutoff {
            round,
            season: Some(season.into()),
        }
    }

    /// Set `season`, or leave the cutoff unrestricted when it is `None`.
    pub fn with_season(round: u32, season: Option<&str>) -> Self {
        Cutoff {
            round,
            season: season.map(str::to_string),
        }
    }

    /// True when `row` carries this cutoff's season tag, or no season is set.
    pub fn same_season(&self, row: &MatchPerformance) -> bool {
        self.season
            .as_deref()
            .map_or(true, |season| row.season == season)
    }

    pub fn admits(&self, row: &MatchPerformance) -> bool {
        row.round <= self.round && self.same_season(row)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
