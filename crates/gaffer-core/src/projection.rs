// Expected-points projection over the gameweeks following a cutoff.
//
// Each fixture blends the player's Smart Value with the fixture potential of
// the player's position group, maps the blend onto points with the
// position's linear coefficients, and discounts by availability.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, PositionParams};
use crate::fixtures::{fixture_potential, TeamForm};
use crate::model::{ClubId, Fixture, FixtureId, PlayerId, PlayerRecord, Position, Venue};
use crate::valuation::history::finite_or_zero;
use crate::valuation::smart_value::{SmartValue, SMART_VALUE_MAX};

// ---------------------------------------------------------------------------
// Fixture schedule
// ---------------------------------------------------------------------------

/// One fixture from a club's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledFixture {
    pub fixture_id: FixtureId,
    pub opponent: ClubId,
    pub venue: Venue,
    pub kickoff: Option<DateTime<Utc>>,
}

/// Fixtures indexed by (club, round). Postponed fixtures without a round are
/// left out, so their gameweek reads as blank.
#[derive(Debug, Clone, Default)]
pub struct FixtureSchedule {
    by_club_round: HashMap<(ClubId, u32), Vec<ScheduledFixture>>,
}

impl FixtureSchedule {
    /// Index `fixtures`. Each club's fixtures in a round are ordered by
    /// kickoff (then id), and fixtures sharing a kickoff time are collapsed
    /// into one.
    pub fn build(fixtures: &[Fixture]) -> Self {
        let mut by_club_round: HashMap<(ClubId, u32), Vec<ScheduledFixture>> = HashMap::new();
        for fixture in fixtures {
            let Some(round) = fixture.round else {
                continue;
            };
            for club in [fixture.home, fixture.away] {
                if let Some((venue, opponent)) = fixture.side_of(club) {
                    by_club_round.entry((club, round)).or_default().push(ScheduledFixture {
                        fixture_id: fixture.id,
                        opponent,
                        venue,
                        kickoff: fixture.kickoff,
                    });
                }
            }
        }
        for entries in by_club_round.values_mut() {
            entries.sort_by_key(|f| (f.kickoff, f.fixture_id));
            entries.dedup_by(|later, earlier| later.kickoff.is_some() && later.kickoff == earlier.kickoff);
        }
        FixtureSchedule { by_club_round }
    }

    /// The club's fixtures in `round`; empty for a blank gameweek.
    pub fn fixtures_for(&self, club: ClubId, round: u32) -> &[ScheduledFixture] {
        self.by_club_round
            .get(&(club, round))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Rounds `cutoff_round + 1 ..= cutoff_round + horizon`.
pub fn horizon_rounds(cutoff_round: u32, horizon: usize) -> Vec<u32> {
    (1..=horizon as u32).map(|i| cutoff_round + i).collect()
}

// ---------------------------------------------------------------------------
// Projection types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedFixture {
    pub fixture_id: FixtureId,
    pub opponent: ClubId,
    pub venue: Venue,
    pub potential: f64,
    pub expected_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameweekProjection {
    pub round: u32,
    pub fixtures: Vec<ProjectedFixture>,
    /// Sum over the gameweek's fixtures; 0 for a blank week.
    pub expected_points: f64,
}

/// A player's forecast over the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub player_id: PlayerId,
    pub name: String,
    pub position: Position,
    pub club: ClubId,
    /// Acquisition cost in minor units.
    pub cost: u32,
    pub smart_value: f64,
    pub availability: f64,
    /// Exactly `horizon` entries, in round order.
    pub gameweeks: Vec<GameweekProjection>,
    pub total_forecast: f64,
}

impl Projection {
    /// Per-gameweek expected points, in round order.
    pub fn expected_points(&self) -> Vec<f64> {
        self.gameweeks.iter().map(|g| g.expected_points).collect()
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// `w * SV/100 + (1 - w) * potential`.
pub fn blend(smart_value: f64, potential: f64, weight: f64) -> f64 {
    let sv = (finite_or_zero(smart_value) / SMART_VALUE_MAX).clamp(0.0, 1.0);
    weight * sv + (1.0 - weight) * finite_or_zero(potential)
}

/// `max(0, intercept + slope * blended) * availability`.
pub fn points_from_blend(blended: f64, params: &PositionParams, availability: f64) -> f64 {
    let points = (params.points_intercept + params.points_slope * blended).max(0.0) * availability;
    finite_or_zero(points)
}

/// Shared, read-only inputs for projecting every player of one pass.
pub struct ProjectionContext<'a> {
    pub form: &'a TeamForm,
    pub schedule: &'a FixtureSchedule,
    pub config: &'a EngineConfig,
    pub rounds: Vec<u32>,
}

impl<'a> ProjectionContext<'a> {
    pub fn new(
        form: &'a TeamForm,
        schedule: &'a FixtureSchedule,
        config: &'a EngineConfig,
        cutoff_round: u32,
    ) -> Self {
        ProjectionContext {
            form,
            schedule,
            config,
            rounds: horizon_rounds(cutoff_round, config.projection.horizon),
        }
    }
}

/// Project one player over the context's horizon.
///
/// A blank gameweek contributes 0. A player with no minutes in the history
/// window projects 0 in every gameweek, though the fixtures are still listed.
pub fn project_player(player: &PlayerRecord, smart: &SmartValue, ctx: &ProjectionContext<'_>) -> Projection {
    let params = ctx.config.position(player.position);
    let availability = player.availability();
    let playing = smart.features.cumulative_minutes > 0.0;

    let gameweeks: Vec<GameweekProjection> = ctx
        .rounds
        .iter()
        .map(|&round| {
            let fixtures: Vec<ProjectedFixture> = ctx
                .schedule
                .fixtures_for(player.club, round)
                .iter()
                .map(|scheduled| {
                    let potential = fixture_potential(
                        ctx.form,
                        player.position,
                        player.club,
                        scheduled.opponent,
                        scheduled.venue,
                        &ctx.config.fixtures,
                    );
                    let expected_points = if playing {
                        let blended = blend(smart.value, potential, params.blend_smart_value);
                        points_from_blend(blended, params, availability)
                    } else {
                        0.0
                    };
                    ProjectedFixture {
                        fixture_id: scheduled.fixture_id,
                        opponent: scheduled.opponent,
                        venue: scheduled.venue,
                        potential,
                        expected_points,
                    }
                })
                .collect();
            let expected_points = fixtures.iter().map(|f| f.expected_points).sum();
            GameweekProjection {
                round,
                fixtures,
                expected_points,
            }
        })
        .collect();

    let total_forecast = gameweeks.iter().map(|g| g.expected_points).sum();
    Projection {
        player_id: player.id,
        name: player.name.clone(),
        position: player.position,
        club: player.club,
        cost: player.price,
        smart_value: smart.value,
        availability,
        gameweeks,
        total_forecast,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
