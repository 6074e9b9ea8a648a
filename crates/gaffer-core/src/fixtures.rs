// Fixture model: club scoring/conceding rates split by venue, per-fixture
// potential for a position group, and the multi-week fixture ticker.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FixtureConfig;
use crate::model::{ClubId, Fixture, Position, Venue};

// ---------------------------------------------------------------------------
// Team form
// ---------------------------------------------------------------------------

/// Goal totals for one club at one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VenueRecord {
    pub played: u32,
    pub scored: u32,
    pub conceded: u32,
}

impl VenueRecord {
    fn record(&mut self, scored: u32, conceded: u32) {
        self.played += 1;
        self.scored += scored;
        self.conceded += conceded;
    }
}

/// A club's home and away records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClubForm {
    pub home: VenueRecord,
    pub away: VenueRecord,
}

impl ClubForm {
    pub fn at(&self, venue: Venue) -> &VenueRecord {
        match venue {
            Venue::Home => &self.home,
            Venue::Away => &self.away,
        }
    }

    fn at_mut(&mut self, venue: Venue) -> &mut VenueRecord {
        match venue {
            Venue::Home => &mut self.home,
            Venue::Away => &mut self.away,
        }
    }
}

/// Historical form of every club, built from finished fixtures only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TeamForm {
    clubs: HashMap<ClubId, ClubForm>,
    default_rate: f64,
}

impl TeamForm {
    /// Accumulate form from `fixtures`.
    ///
    /// Only finished fixtures with both scores recorded count. When
    /// `up_to_round` is set, fixtures after that round (or without a round)
    /// are ignored as well.
    pub fn from_fixtures(fixtures: &[Fixture], up_to_round: Option<u32>, config: &FixtureConfig) -> Self {
        let mut clubs: HashMap<ClubId, ClubForm> = HashMap::new();
        let mut counted = 0usize;
        for fixture in fixtures {
            if let Some(limit) = up_to_round {
                match fixture.round {
                    Some(round) if round <= limit => {}
                    _ => continue,
                }
            }
            let Some((home_goals, away_goals)) = fixture.result() else {
                continue;
            };
            clubs
                .entry(fixture.home)
                .or_default()
                .at_mut(Venue::Home)
                .record(home_goals, away_goals);
            clubs
                .entry(fixture.away)
                .or_default()
                .at_mut(Venue::Away)
                .record(away_goals, home_goals);
            counted += 1;
        }
        debug!(fixtures = counted, clubs = clubs.len(), "built team form");
        TeamForm {
            clubs,
            default_rate: config.default_goal_rate,
        }
    }

    pub fn club(&self, club: ClubId) -> Option<&ClubForm> {
        self.clubs.get(&club)
    }

    /// Clubs with at least one counted fixture, in id order.
    pub fn clubs(&self) -> Vec<ClubId> {
        let mut ids: Vec<ClubId> = self.clubs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn rate(&self, club: ClubId, venue: Venue, pick: fn(&VenueRecord) -> u32) -> f64 {
        match self.clubs.get(&club).map(|form| form.at(venue)) {
            Some(record) if record.played > 0 => f64::from(pick(record)) / f64::from(record.played),
            _ => self.default_rate,
        }
    }

    /// Goals scored per match at `venue`, or the league default when the
    /// club has not played there yet.
    pub fn scored_rate(&self, club: ClubId, venue: Venue) -> f64 {
        self.rate(club, venue, |r| r.scored)
    }

    /// Goals conceded per match at `venue`, with the same fallback.
    pub fn conceded_rate(&self, club: ClubId, venue: Venue) -> f64 {
        self.rate(club, venue, |r| r.conceded)
    }

    /// Expected attacking output: own scoring rate at `venue` plus the
    /// opponent's conceding rate at the other venue. Higher is better.
    pub fn attack_score(&self, club: ClubId, opponent: ClubId, venue: Venue) -> f64 {
        self.scored_rate(club, venue) + self.conceded_rate(opponent, venue.other())
    }

    /// Expected goals against: own conceding rate at `venue` plus the
    /// opponent's scoring rate at the other venue. Lower is better.
    pub fn defense_score(&self, club: ClubId, opponent: ClubId, venue: Venue) -> f64 {
        self.conceded_rate(club, venue) + self.scored_rate(opponent, venue.other())
    }
}

// ---------------------------------------------------------------------------
// Fixture potential
// ---------------------------------------------------------------------------

/// 0-1 favorability of one fixture for a position group.
///
/// GK/DEF: `1 - defense_score / K` (fewer expected goals against is better).
/// MID/FWD: `attack_score / K`. Both clamped to [0, 1].
pub fn fixture_potential(
    form: &TeamForm,
    position: Position,
    club: ClubId,
    opponent: ClubId,
    venue: Venue,
    config: &FixtureConfig,
) -> f64 {
    let k = config.scale_k;
    let raw = if position.is_defensive() {
        1.0 - form.defense_score(club, opponent, venue) / k
    } else {
        form.attack_score(club, opponent, venue) / k
    };
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Fixture ticker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerMetric {
    Attack,
    Defense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerFixture {
    pub opponent: ClubId,
    pub venue: Venue,
    pub score: f64,
    pub difficulty: Difficulty,
}

/// One gameweek of a club's schedule. A blank week has no fixtures; a double
/// gameweek has two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerWeek {
    pub round: u32,
    pub fixtures: Vec<TickerFixture>,
}

impl TickerWeek {
    pub fn is_blank(&self) -> bool {
        self.fixtures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClubSchedule {
    pub club: ClubId,
    pub weeks: Vec<TickerWeek>,
    pub total: f64,
}

/// Classify `score` by thirds of the observed `[min, max]` range.
fn classify(score: f64, min: f64, max: f64, metric: TickerMetric) -> Difficulty {
    let third = (max - min) / 3.0;
    let low = min + third;
    let high = min + 2.0 * third;
    match metric {
        TickerMetric::Attack => {
            if score >= high {
                Difficulty::Easy
            } else if score <= low {
                Difficulty::Hard
            } else {
                Difficulty::Medium
            }
        }
        TickerMetric::Defense => {
            if score <= low {
                Difficulty::Easy
            } else if score >= high {
                Difficulty::Hard
            } else {
                Difficulty::Medium
            }
        }
    }
}

/// Build the ticker for rounds `start_round ..= start_round + weeks - 1`.
/// Rounds past `u32::MAX` are dropped.
///
/// Every club that appears in `fixtures` gets a row. Rows are sorted by total
/// score, descending for attack and ascending for defense, then by club id.
pub fn fixture_ticker(
    fixtures: &[Fixture],
    form: &TeamForm,
    start_round: u32,
    weeks: usize,
    metric: TickerMetric,
) -> Vec<ClubSchedule> {
    let rounds: Vec<u32> = (0..weeks)
        .map_while(|i| u32::try_from(i).ok().and_then(|i| start_round.checked_add(i)))
        .collect();
    let clubs: BTreeSet<ClubId> = fixtures.iter().flat_map(|f| [f.home, f.away]).collect();

    let mut schedules: Vec<ClubSchedule> = clubs
        .into_iter()
        .map(|club| {
            let club_weeks: Vec<TickerWeek> = rounds
                .iter()
                .map(|&round| {
                    let mut in_round: Vec<&Fixture> = fixtures
                        .iter()
                        .filter(|f| f.round == Some(round) && f.involves(club))
                        .collect();
                    in_round.sort_by_key(|f| (f.kickoff, f.id));
                    let entries = in_round
                        .into_iter()
                        .filter_map(|f| f.side_of(club))
                        .map(|(venue, opponent)| {
                            let score = match metric {
                                TickerMetric::Attack => form.attack_score(club, opponent, venue),
                                TickerMetric::Defense => form.defense_score(club, opponent, venue),
                            };
                            TickerFixture {
                                opponent,
                                venue,
                                score,
                                difficulty: Difficulty::Medium,
                            }
                        })
                        .collect();
                    TickerWeek {
                        round,
                        fixtures: entries,
                    }
                })
                .collect();
            let total = club_weeks.iter().flat_map(|w| &w.fixtures).map(|f| f.score).sum();
            ClubSchedule {
                club,
                weeks: club_weeks,
                total,
            }
        })
        .collect();

    let scores: Vec<f64> = schedules
        .iter()
        .flat_map(|s| &s.weeks)
        .flat_map(|w| &w.fixtures)
        .map(|f| f.score)
        .collect();
    if let (Some(min), Some(max)) = (
        scores.iter().copied().reduce(f64::min),
        scores.iter().copied().reduce(f64::max),
    ) {
        for fixture in schedules
            .iter_mut()
            .flat_map(|s| s.weeks.iter_mut())
            .flat_map(|w| w.fixtures.iter_mut())
        {
            fixture.difficulty = classify(fixture.score, min, max, metric);
        }
    }

    schedules.sort_by(|a, b| {
        let order = match metric {
            TickerMetric::Attack => b.total.total_cmp(&a.total),
            TickerMetric::Defense => a.total.total_cmp(&b.total),
        };
        order.then(a.club.cmp(&b.club))
    });
    schedules
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
