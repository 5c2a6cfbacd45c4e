//! Per-player aggregates derived from the current (never the corrected)
//! throws of a match.
//!
//! [`compute`] is pure over a slice of [`TurnSample`]s; [`recompute`] loads the
//! samples inside a unit of work and writes the results onto the leg and match
//! association rows so readers never recompute them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;

use super::error::IngestError;
use super::storage::{IngestStorageTxn, LegPlayerRow, MatchRow};
use super::types::{GameVariant, LegId, OutMode, PlayerId, ScoringKind, TurnId};

const LOG_TARGET: &str = "darts_ledger::ledger::stats";

/// Unknown measurements stay `None`; zero is only written when it was measured.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlayerStats {
    pub average: Option<f64>,
    pub average_until_170: Option<f64>,
    pub first_9_average: Option<f64>,
    pub checkout_attempts: u32,
    pub checkout_hits: u32,
    pub checkout_rate: Option<f64>,
    pub best_checkout: Option<i32>,
    pub darts_thrown: u32,
    pub count_180: u32,
    pub busts: u32,
    pub mpr: Option<f64>,
    pub first_9_mpr: Option<f64>,
}

/// One turn as the calculator sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnSample {
    pub set_number: i32,
    pub leg_number: i32,
    pub round_number: i32,
    pub turn_id: TurnId,
    pub points: i32,
    /// Remaining score after the turn.
    pub score: i32,
    pub busted: bool,
    pub darts: u32,
    pub marks: u32,
}

impl TurnSample {
    /// A bust reverts the score, so the pre-turn score is the reported one.
    pub fn score_before(&self) -> i32 {
        if self.busted {
            self.score
        } else {
            self.score + self.points
        }
    }

    fn is_checkout(&self) -> bool {
        !self.busted && self.score == 0 && self.points > 0
    }
}

/// Everything about the match that changes how turns are scored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsContext {
    pub scoring: ScoringKind,
    pub out_mode: OutMode,
}

impl StatsContext {
    pub fn for_match(row: &MatchRow) -> Self {
        Self {
            scoring: row.game_variant().scoring(),
            out_mode: row.settings.out_mode(),
        }
    }
}

/// Marks a single dart registers on a marks-scored board.
pub fn segment_marks(variant: &GameVariant, number: i32, multiplier: i32) -> u32 {
    let lowest = match variant {
        GameVariant::Tactics => 10,
        GameVariant::Cricket => 15,
        _ => return 0,
    };
    let multiplier = u32::try_from(multiplier).unwrap_or(0);
    match number {
        n if (lowest..=20).contains(&n) => multiplier,
        25 if multiplier >= 2 => 2,
        25 if multiplier == 1 => 1,
        50 => 2,
        _ => 0,
    }
}

fn scaled(numerator: f64, darts: u32, darts_per_turn: u32) -> Option<f64> {
    if darts == 0 {
        return None;
    }
    Some(numerator * f64::from(darts_per_turn) / f64::from(darts))
}

fn points_average<'a>(
    turns: impl Iterator<Item = &'a TurnSample>,
    darts_per_turn: u32,
) -> Option<f64> {
    let mut points = 0i64;
    let mut darts = 0u32;
    for turn in turns {
        darts += turn.darts;
        if !turn.busted {
            points += i64::from(turn.points);
        }
    }
    scaled(points as f64, darts, darts_per_turn)
}

fn marks_per_round<'a>(
    turns: impl Iterator<Item = &'a TurnSample>,
    darts_per_turn: u32,
) -> Option<f64> {
    let mut marks = 0u32;
    let mut darts = 0u32;
    for turn in turns {
        darts += turn.darts;
        marks += turn.marks;
    }
    scaled(f64::from(marks), darts, darts_per_turn)
}

pub fn compute(samples: &[TurnSample], ctx: StatsContext, config: &EngineConfig) -> PlayerStats {
    let mut turns: Vec<&TurnSample> = samples.iter().filter(|turn| turn.darts > 0).collect();
    turns.sort_by_key(|turn| {
        (
            turn.set_number,
            turn.leg_number,
            turn.round_number,
            turn.turn_id,
        )
    });

    let mut stats = PlayerStats {
        darts_thrown: turns.iter().map(|turn| turn.darts).sum(),
        busts: turns.iter().filter(|turn| turn.busted).count() as u32,
        ..PlayerStats::default()
    };
    let dpt = config.darts_per_turn;
    let opening = config.first_turns;

    match ctx.scoring {
        ScoringKind::Marks => {
            stats.mpr = marks_per_round(turns.iter().copied(), dpt);
            stats.first_9_mpr = marks_per_round(turns.iter().copied().take(opening), dpt);
        }
        ScoringKind::Points => {
            stats.average = points_average(turns.iter().copied(), dpt);
            stats.average_until_170 = points_average(
                turns
                    .iter()
                    .copied()
                    .filter(|turn| turn.score_before() > config.checkout_threshold),
                dpt,
            );
            stats.first_9_average = points_average(turns.iter().copied().take(opening), dpt);
            stats.count_180 = turns
                .iter()
                .filter(|turn| !turn.busted && turn.points == 180)
                .count() as u32;
            stats.best_checkout = turns
                .iter()
                .filter(|turn| turn.is_checkout())
                .map(|turn| turn.points)
                .max();

            if let Some(max) = ctx.out_mode.max_checkout() {
                let attempts: Vec<&&TurnSample> = turns
                    .iter()
                    .filter(|turn| (2..=max).contains(&turn.score_before()))
                    .collect();
                stats.checkout_attempts = attempts.len() as u32;
                stats.checkout_hits =
                    attempts.iter().filter(|turn| turn.is_checkout()).count() as u32;
                if stats.checkout_attempts > 0 {
                    stats.checkout_rate = Some(
                        f64::from(stats.checkout_hits) / f64::from(stats.checkout_attempts),
                    );
                }
            }
        }
    }

    stats
}

/// The (leg, player) pairs a unit of work touched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffectedSet {
    pub legs: BTreeSet<LegId>,
    pub players: BTreeSet<PlayerId>,
}

impl AffectedSet {
    pub fn touch(&mut self, leg_id: LegId, player_id: PlayerId) {
        self.legs.insert(leg_id);
        self.players.insert(player_id);
    }

    pub fn touch_leg(&mut self, leg_id: LegId) {
        self.legs.insert(leg_id);
    }

    pub fn merge(&mut self, other: AffectedSet) {
        self.legs.extend(other.legs);
        self.players.extend(other.players);
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty() && self.players.is_empty()
    }
}

/// Rewrites leg and match aggregates for every touched pair.
///
/// A touched leg is refreshed for all participants so its `won` flags follow
/// the leg winner; a touched player is refreshed across the whole match.
pub async fn recompute(
    txn: &mut (dyn IngestStorageTxn + Send),
    config: &EngineConfig,
    match_row: &MatchRow,
    affected: &AffectedSet,
) -> Result<(), IngestError> {
    if affected.is_empty() {
        return Ok(());
    }
    let variant = match_row.game_variant();
    let ctx = StatsContext::for_match(match_row);

    let legs = txn.load_legs(match_row.id).await?;
    let leg_index: BTreeMap<LegId, (i32, i32)> = legs
        .iter()
        .map(|leg| (leg.id, (leg.set_number, leg.leg_number)))
        .collect();

    let turns = txn.load_match_turns(match_row.id).await?;
    let turn_ids: Vec<TurnId> = turns.iter().map(|turn| turn.id).collect();
    let throws = txn.load_throws(&turn_ids, false).await?;

    let mut per_turn: BTreeMap<TurnId, (u32, u32)> = BTreeMap::new();
    for throw in &throws {
        let entry = per_turn.entry(throw.turn_id).or_default();
        entry.0 += 1;
        entry.1 += segment_marks(&variant, throw.segment_number, throw.multiplier);
    }

    let mut samples: BTreeMap<(PlayerId, LegId), Vec<TurnSample>> = BTreeMap::new();
    for turn in &turns {
        let (set_number, leg_number) = leg_index.get(&turn.leg_id).copied().unwrap_or((0, 0));
        let (darts, marks) = per_turn.get(&turn.id).copied().unwrap_or((0, 0));
        samples
            .entry((turn.player_id, turn.leg_id))
            .or_default()
            .push(TurnSample {
                set_number,
                leg_number,
                round_number: turn.round_number,
                turn_id: turn.id,
                points: turn.points,
                score: turn.score,
                busted: turn.busted,
                darts,
                marks,
            });
    }

    let participants = txn.load_match_players(match_row.id).await?;
    let mut leg_players: BTreeSet<(LegId, PlayerId)> = BTreeSet::new();
    for leg in legs.iter().filter(|leg| affected.legs.contains(&leg.id)) {
        for participant in &participants {
            leg_players.insert((leg.id, participant.player_id));
        }
    }
    for &(player_id, leg_id) in samples.keys() {
        if affected.players.contains(&player_id) {
            leg_players.insert((leg_id, player_id));
        }
    }

    for (leg_id, player_id) in leg_players {
        let Some(leg) = legs.iter().find(|leg| leg.id == leg_id) else {
            continue;
        };
        let leg_samples = samples
            .get(&(player_id, leg_id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        txn.upsert_leg_player(LegPlayerRow {
            leg_id,
            match_id: match_row.id,
            player_id,
            won: leg.winner_player_id == Some(player_id),
            stats: compute(leg_samples, ctx, config),
        })
        .await?;
    }

    for mut participant in participants {
        if !affected.players.contains(&participant.player_id) {
            continue;
        }
        let match_samples: Vec<TurnSample> = samples
            .iter()
            .filter(|((player_id, _), _)| *player_id == participant.player_id)
            .flat_map(|(_, turns)| turns.iter().cloned())
            .collect();
        let stats = compute(&match_samples, ctx, config);
        if stats != participant.stats {
            debug!(
                target: LOG_TARGET,
                match_id = %match_row.external_id,
                player_id = participant.player_id,
                darts = stats.darts_thrown,
                "match aggregates changed"
            );
            participant.stats = stats;
            txn.update_match_player(&participant).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(round: i32, points: i32, score: i32, busted: bool, darts: u32) -> TurnSample {
        TurnSample {
            set_number: 1,
            leg_number: 1,
            round_number: round,
            turn_id: i64::from(round),
            points,
            score,
            busted,
            darts,
            marks: 0,
        }
    }

    fn x01(out_mode: OutMode) -> StatsContext {
        StatsContext {
            scoring: ScoringKind::Points,
            out_mode,
        }
    }

    #[test]
    fn empty_input_reports_unknown_not_zero() {
        let stats = compute(&[], x01(OutMode::Double), &EngineConfig::default());
        assert_eq!(stats.average, None);
        assert_eq!(stats.first_9_average, None);
        assert_eq!(stats.checkout_rate, None);
        assert_eq!(stats.best_checkout, None);
        assert_eq!(stats.darts_thrown, 0);
    }

    #[test]
    fn busts_count_darts_but_not_points() {
        let turns = vec![
            sample(1, 60, 441, false, 3),
            sample(2, 100, 441, true, 3),
        ];
        let stats = compute(&turns, x01(OutMode::Straight), &EngineConfig::default());
        assert_eq!(stats.darts_thrown, 6);
        assert_eq!(stats.busts, 1);
        assert_eq!(stats.average, Some(30.0));
    }

    #[test]
    fn average_until_threshold_and_first_nine() {
        let turns = vec![
            sample(1, 180, 321, false, 3),
            sample(2, 140, 181, false, 3),
            sample(3, 60, 121, false, 3),
            sample(4, 81, 40, false, 3),
            sample(5, 40, 0, false, 2),
        ];
        let stats = compute(&turns, x01(OutMode::Double), &EngineConfig::default());
        // Turns 1..=3 start above 170.
        assert_eq!(stats.average_until_170, Some((180.0 + 140.0 + 60.0) / 3.0));
        assert_eq!(stats.first_9_average, Some((180.0 + 140.0 + 60.0) / 3.0));
        assert_eq!(stats.count_180, 1);
        assert_eq!(stats.darts_thrown, 14);
        // Turns 4 and 5 start at 121 and 40.
        assert_eq!(stats.checkout_attempts, 2);
        assert_eq!(stats.checkout_hits, 1);
        assert_eq!(stats.checkout_rate, Some(0.5));
        assert_eq!(stats.best_checkout, Some(40));
    }

    #[test]
    fn straight_out_leaves_checkout_rate_unknown() {
        let turns = vec![sample(1, 32, 0, false, 1)];
        let stats = compute(&turns, x01(OutMode::Straight), &EngineConfig::default());
        assert_eq!(stats.checkout_attempts, 0);
        assert_eq!(stats.checkout_rate, None);
        assert_eq!(stats.best_checkout, Some(32));
    }

    #[test]
    fn negative_points_lower_the_average() {
        let turns = vec![sample(1, -25, 25, false, 3), sample(2, 50, 0, false, 1)];
        let stats = compute(&turns, x01(OutMode::Straight), &EngineConfig::default());
        assert_eq!(stats.average, Some(25.0 * 3.0 / 4.0));
    }

    #[test]
    fn turns_without_current_throws_are_ignored() {
        let turns = vec![sample(1, 60, 441, false, 0), sample(2, 45, 396, false, 3)];
        let stats = compute(&turns, x01(OutMode::Double), &EngineConfig::default());
        assert_eq!(stats.darts_thrown, 3);
        assert_eq!(stats.average, Some(45.0));
    }

    #[test]
    fn cricket_uses_marks_per_round() {
        let ctx = StatsContext {
            scoring: ScoringKind::Marks,
            out_mode: OutMode::Straight,
        };
        let mut first = sample(1, 0, 0, false, 3);
        first.marks = 5;
        let mut second = sample(2, 0, 0, false, 3);
        second.marks = 1;
        let stats = compute(&[first, second], ctx, &EngineConfig::default());
        assert_eq!(stats.mpr, Some(3.0));
        assert_eq!(stats.average, None);
        assert_eq!(stats.count_180, 0);
    }

    #[test]
    fn marks_follow_the_variant_board() {
        let cricket = GameVariant::Cricket;
        assert_eq!(segment_marks(&cricket, 20, 3), 3);
        assert_eq!(segment_marks(&cricket, 14, 3), 0);
        assert_eq!(segment_marks(&cricket, 25, 1), 1);
        assert_eq!(segment_marks(&cricket, 25, 2), 2);
        assert_eq!(segment_marks(&GameVariant::Tactics, 12, 2), 2);
        assert_eq!(segment_marks(&GameVariant::X01, 20, 3), 0);
    }
}
