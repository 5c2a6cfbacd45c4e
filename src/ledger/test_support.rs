#![allow(dead_code)]

//! Payload builders for ledger tests. Every builder renders the JSON a
//! producer would send and parses it through [`WebhookEvent::from_value`], so
//! fixtures exercise the same boundary as live deliveries.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value as JsonValue};

use crate::ledger::messages::WebhookEvent;

const FIXTURE_EPOCH_SECS: i64 = 1_709_319_600;

pub fn fixture_time(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(FIXTURE_EPOCH_SECS, 0).unwrap() + Duration::seconds(offset_secs)
}

#[derive(Clone, Debug)]
pub struct FixturePlayer {
    pub handle: String,
    pub user_id: Option<String>,
    pub name: String,
}

impl FixturePlayer {
    pub fn new(handle: &str, user_id: Option<&str>, name: &str) -> Self {
        Self {
            handle: handle.into(),
            user_id: user_id.map(str::to_string),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FixtureThrow {
    pub id: String,
    pub dart: i32,
    pub number: i32,
    pub multiplier: i32,
}

impl FixtureThrow {
    pub fn new(id: &str, dart: i32, number: i32, multiplier: i32) -> Self {
        Self {
            id: id.into(),
            dart,
            number,
            multiplier,
        }
    }

    fn to_json(&self) -> JsonValue {
        let bed = if self.multiplier == 0 { "Outside" } else { "Single" };
        json!({
            "id": self.id,
            "throw": self.dart,
            "segment": {
                "number": self.number,
                "multiplier": self.multiplier,
                "name": format!("{}x{}", self.multiplier, self.number),
                "bed": bed,
            },
            "coords": { "x": 0.0, "y": 0.5 },
        })
    }
}

#[derive(Clone, Debug)]
pub struct FixtureTurn {
    pub id: String,
    pub handle: String,
    pub round: i32,
    pub points: i32,
    pub score: i32,
    pub busted: bool,
    pub throws: Vec<FixtureThrow>,
}

impl FixtureTurn {
    pub fn new(id: &str, handle: &str, round: i32, points: i32, score: i32) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            round,
            points,
            score,
            busted: false,
            throws: Vec::new(),
        }
    }

    pub fn busted(mut self) -> Self {
        self.busted = true;
        self
    }

    pub fn throw(mut self, throw: FixtureThrow) -> Self {
        self.throws.push(throw);
        self
    }
}

#[derive(Clone, Debug)]
pub struct SnapshotBuilder {
    match_id: String,
    variant: String,
    out_mode: String,
    base_score: i32,
    set: i32,
    leg: i32,
    round: i32,
    finished: bool,
    winner: Option<i32>,
    players: Vec<FixturePlayer>,
    tallies: Vec<(i32, i32)>,
    turns: Vec<FixtureTurn>,
    offset_secs: i64,
}

impl SnapshotBuilder {
    /// Two registered players, Alice (`h-0`) and Bob (`h-1`), first leg.
    pub fn new(match_id: &str) -> Self {
        Self {
            match_id: match_id.into(),
            variant: "X01".into(),
            out_mode: "Double".into(),
            base_score: 501,
            set: 1,
            leg: 1,
            round: 1,
            finished: false,
            winner: None,
            players: vec![
                FixturePlayer::new("h-0", Some("u-0"), "Alice"),
                FixturePlayer::new("h-1", Some("u-1"), "Bob"),
            ],
            tallies: Vec::new(),
            turns: Vec::new(),
            offset_secs: 0,
        }
    }

    pub fn variant(mut self, variant: &str) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn out_mode(mut self, out_mode: &str) -> Self {
        self.out_mode = out_mode.into();
        self
    }

    pub fn players(mut self, players: Vec<FixturePlayer>) -> Self {
        self.players = players;
        self
    }

    pub fn leg(mut self, set: i32, leg: i32) -> Self {
        self.set = set;
        self.leg = leg;
        self
    }

    pub fn round(mut self, round: i32) -> Self {
        self.round = round;
        self
    }

    /// Marks the match finished with `winner` as an index into the players.
    pub fn finished(mut self, winner: Option<i32>) -> Self {
        self.finished = true;
        self.winner = winner;
        self
    }

    /// `(legs, sets)` per player, in roster order.
    pub fn tallies(mut self, tallies: &[(i32, i32)]) -> Self {
        self.tallies = tallies.to_vec();
        self
    }

    pub fn turn(mut self, turn: FixtureTurn) -> Self {
        self.turns.push(turn);
        self
    }

    pub fn at(mut self, offset_secs: i64) -> Self {
        self.offset_secs = offset_secs;
        self
    }

    pub fn to_json(&self) -> JsonValue {
        let players: Vec<JsonValue> = self
            .players
            .iter()
            .map(|player| {
                json!({
                    "id": player.handle,
                    "userId": player.user_id,
                    "name": player.name,
                    "avatarUrl": null,
                    "user": { "country": "nl" },
                })
            })
            .collect();
        let scores: Vec<JsonValue> = (0..self.players.len())
            .map(|index| {
                let (legs, sets) = self.tallies.get(index).copied().unwrap_or((0, 0));
                json!({ "legs": legs, "sets": sets })
            })
            .collect();
        let turns: Vec<JsonValue> = self
            .turns
            .iter()
            .map(|turn| {
                json!({
                    "id": turn.id,
                    "playerId": turn.handle,
                    "round": turn.round,
                    "points": turn.points,
                    "score": turn.score,
                    "busted": turn.busted,
                    "throws": turn.throws.iter().map(FixtureThrow::to_json).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({
            "event": "match_state",
            "timestamp": fixture_time(self.offset_secs),
            "matchId": self.match_id,
            "variant": self.variant,
            "data": { "match": {
                "id": self.match_id,
                "type": "Online",
                "variant": self.variant,
                "createdAt": fixture_time(0),
                "finished": self.finished,
                "winner": self.winner.unwrap_or(-1),
                "settings": {
                    "baseScore": self.base_score,
                    "inMode": "Straight",
                    "outMode": self.out_mode,
                    "bullMode": "25/50",
                    "maxRounds": 20,
                    "matchModeType": "Legs",
                    "matchModeLegsCount": 3,
                },
                "players": players,
                "scores": scores,
                "leg": self.leg,
                "set": self.set,
                "round": self.round,
                "turns": turns,
            }}
        })
    }
}

pub fn snapshot(builder: SnapshotBuilder) -> WebhookEvent {
    WebhookEvent::from_value(&builder.to_json()).unwrap()
}

#[derive(Clone, Debug)]
pub struct ThrowBuilder {
    match_id: String,
    turn_id: String,
    throw: FixtureThrow,
    handle: String,
    name: String,
    set: i32,
    leg: i32,
    round: i32,
    score: i32,
    busted: Option<bool>,
    offset_secs: i64,
}

impl ThrowBuilder {
    /// Alice (`h-0`) throwing a single 20 with the first dart of leg 1.
    pub fn new(match_id: &str, turn_id: &str, throw_id: &str) -> Self {
        Self {
            match_id: match_id.into(),
            turn_id: turn_id.into(),
            throw: FixtureThrow::new(throw_id, 0, 20, 1),
            handle: "h-0".into(),
            name: "Alice".into(),
            set: 1,
            leg: 1,
            round: 1,
            score: 481,
            busted: None,
            offset_secs: 0,
        }
    }

    pub fn dart(mut self, dart: i32, number: i32, multiplier: i32) -> Self {
        self.throw.dart = dart;
        self.throw.number = number;
        self.throw.multiplier = multiplier;
        self
    }

    pub fn score(mut self, score: i32) -> Self {
        self.score = score;
        self
    }

    pub fn busted(mut self, busted: bool) -> Self {
        self.busted = Some(busted);
        self
    }

    pub fn player(mut self, handle: &str, name: &str) -> Self {
        self.handle = handle.into();
        self.name = name.into();
        self
    }

    pub fn leg(mut self, set: i32, leg: i32) -> Self {
        self.set = set;
        self.leg = leg;
        self
    }

    pub fn round(mut self, round: i32) -> Self {
        self.round = round;
        self
    }

    pub fn at(mut self, offset_secs: i64) -> Self {
        self.offset_secs = offset_secs;
        self
    }

    pub fn to_json(&self) -> JsonValue {
        let mut data = json!({
            "turnId": self.turn_id,
            "playerId": self.handle,
            "playerName": self.name,
            "leg": self.leg,
            "set": self.set,
            "round": self.round,
            "score": self.score,
            "throw": self.throw.to_json(),
        });
        if let Some(busted) = self.busted {
            data["busted"] = json!(busted);
        }
        json!({
            "event": "throw",
            "timestamp": fixture_time(self.offset_secs),
            "matchId": self.match_id,
            "data": data,
        })
    }
}

pub fn throw(builder: ThrowBuilder) -> WebhookEvent {
    WebhookEvent::from_value(&builder.to_json()).unwrap()
}
