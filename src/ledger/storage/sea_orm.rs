use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;

use crate::db::entity::{
    dart_throws, leg_players, legs, match_players, matches, players, turns,
};
use crate::ledger::error::IngestError;
use crate::ledger::stats::PlayerStats;
use crate::ledger::types::{DartNumber, LegId, MatchId, PlayerId, ThrowId, TurnId};

use super::{
    DartThrowRow, IngestStorage, IngestStorageTxn, LegPlayerRow, LegRow, MatchPlayerRow,
    MatchRow, MatchSettings, NewDartThrow, NewLeg, NewMatch, NewMatchPlayer, NewPlayer, NewTurn,
    PlayerRow, PurgeCounts, TurnRow,
};

pub struct SeaOrmIngestStorage {
    connection: DatabaseConnection,
}

impl SeaOrmIngestStorage {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

pub struct SeaOrmIngestTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl IngestStorage for SeaOrmIngestStorage {
    async fn begin(&self) -> Result<Box<dyn IngestStorageTxn + Send>, IngestError> {
        let txn = self.connection.begin().await?;
        Ok(Box::new(SeaOrmIngestTxn { txn }))
    }
}

#[async_trait]
impl IngestStorageTxn for SeaOrmIngestTxn {
    async fn load_player(&mut self, id: PlayerId) -> Result<Option<PlayerRow>, IngestError> {
        let record = players::Entity::find_by_id(id).one(&self.txn).await?;
        Ok(record.map(player_from_model))
    }

    async fn find_player_by_user_id(
        &mut self,
        user_id: &str,
    ) -> Result<Option<PlayerRow>, IngestError> {
        let record = players::Entity::find()
            .filter(players::Column::UserId.eq(user_id))
            .one(&self.txn)
            .await?;
        Ok(record.map(player_from_model))
    }

    async fn find_player_by_name(
        &mut self,
        name: &str,
        exclude: &[PlayerId],
    ) -> Result<Option<PlayerRow>, IngestError> {
        let record = players::Entity::find()
            .filter(players::Column::Name.eq(name))
            .filter(players::Column::Id.is_not_in(exclude.iter().copied()))
            .order_by_asc(players::Column::Id)
            .one(&self.txn)
            .await?;
        Ok(record.map(player_from_model))
    }

    async fn insert_player(&mut self, player: NewPlayer) -> Result<PlayerId, IngestError> {
        let model = players::ActiveModel {
            user_id: Set(player.user_id),
            name: Set(player.name),
            avatar_url: Set(player.avatar_url),
            country: Set(player.country),
            account_id: Set(None),
            ..Default::default()
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(inserted.id)
    }

    async fn update_player(&mut self, player: &PlayerRow) -> Result<(), IngestError> {
        let model = players::ActiveModel {
            id: Set(player.id),
            user_id: Set(player.user_id.clone()),
            name: Set(player.name.clone()),
            avatar_url: Set(player.avatar_url.clone()),
            country: Set(player.country.clone()),
            account_id: Set(player.account_id),
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn find_match(&mut self, external_id: &str) -> Result<Option<MatchRow>, IngestError> {
        let record = matches::Entity::find()
            .filter(matches::Column::ExternalId.eq(external_id))
            .one(&self.txn)
            .await?;
        Ok(record.map(match_from_model))
    }

    async fn lock_match(&mut self, external_id: &str) -> Result<Option<MatchRow>, IngestError> {
        let record = matches::Entity::find()
            .filter(matches::Column::ExternalId.eq(external_id))
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(record.map(match_from_model))
    }

    async fn insert_match(&mut self, row: NewMatch) -> Result<MatchId, IngestError> {
        let settings = row.settings;
        let model = matches::ActiveModel {
            external_id: Set(row.external_id),
            variant: Set(row.variant),
            match_type: Set(row.match_type),
            base_score: Set(settings.base_score),
            in_mode: Set(settings.in_mode),
            out_mode: Set(settings.out_mode),
            bull_mode: Set(settings.bull_mode),
            max_rounds: Set(settings.max_rounds),
            match_mode_type: Set(settings.match_mode_type),
            match_mode_legs: Set(settings.match_mode_legs),
            match_mode_sets: Set(settings.match_mode_sets),
            settings_extra: Set(settings.extra),
            winner_player_id: Set(None),
            current_set: Set(1),
            current_leg: Set(1),
            current_round: Set(1),
            started_at: Set(row.started_at),
            finished_at: Set(None),
            incomplete: Set(false),
            updated_at: Set(Some(row.updated_at)),
            ..Default::default()
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(inserted.id)
    }

    async fn update_match(&mut self, row: &MatchRow) -> Result<(), IngestError> {
        let settings = row.settings.clone();
        // `incomplete` belongs to the timeout sweep and is left NotSet.
        let model = matches::ActiveModel {
            id: Set(row.id),
            variant: Set(row.variant.clone()),
            match_type: Set(row.match_type.clone()),
            base_score: Set(settings.base_score),
            in_mode: Set(settings.in_mode),
            out_mode: Set(settings.out_mode),
            bull_mode: Set(settings.bull_mode),
            max_rounds: Set(settings.max_rounds),
            match_mode_type: Set(settings.match_mode_type),
            match_mode_legs: Set(settings.match_mode_legs),
            match_mode_sets: Set(settings.match_mode_sets),
            settings_extra: Set(settings.extra),
            winner_player_id: Set(row.winner_player_id),
            current_set: Set(row.current_set),
            current_leg: Set(row.current_leg),
            current_round: Set(row.current_round),
            started_at: Set(row.started_at),
            finished_at: Set(row.finished_at),
            updated_at: Set(row.updated_at),
            ..Default::default()
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn load_match_players(
        &mut self,
        match_id: MatchId,
    ) -> Result<Vec<MatchPlayerRow>, IngestError> {
        let rows = match_players::Entity::find()
            .filter(match_players::Column::MatchId.eq(match_id))
            .order_by_asc(match_players::Column::PlayerIndex)
            .order_by_asc(match_players::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(rows.into_iter().map(match_player_from_model).collect())
    }

    async fn insert_match_player(&mut self, row: NewMatchPlayer) -> Result<i64, IngestError> {
        let empty = PlayerStats::default();
        let model = match_players::ActiveModel {
            match_id: Set(row.match_id),
            player_id: Set(row.player_id),
            player_index: Set(row.player_index),
            handle: Set(row.handle),
            legs_won: Set(row.legs_won),
            sets_won: Set(row.sets_won),
            average: Set(empty.average),
            average_until_170: Set(empty.average_until_170),
            first_9_average: Set(empty.first_9_average),
            checkout_attempts: Set(to_i32(empty.checkout_attempts)?),
            checkout_hits: Set(to_i32(empty.checkout_hits)?),
            checkout_rate: Set(empty.checkout_rate),
            best_checkout: Set(empty.best_checkout),
            darts_thrown: Set(to_i32(empty.darts_thrown)?),
            count_180: Set(to_i32(empty.count_180)?),
            busts: Set(to_i32(empty.busts)?),
            mpr: Set(empty.mpr),
            first_9_mpr: Set(empty.first_9_mpr),
            ..Default::default()
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(inserted.id)
    }

    async fn update_match_player(&mut self, row: &MatchPlayerRow) -> Result<(), IngestError> {
        let stats = &row.stats;
        let model = match_players::ActiveModel {
            id: Set(row.id),
            match_id: Set(row.match_id),
            player_id: Set(row.player_id),
            player_index: Set(row.player_index),
            handle: Set(row.handle.clone()),
            legs_won: Set(row.legs_won),
            sets_won: Set(row.sets_won),
            average: Set(stats.average),
            average_until_170: Set(stats.average_until_170),
            first_9_average: Set(stats.first_9_average),
            checkout_attempts: Set(to_i32(stats.checkout_attempts)?),
            checkout_hits: Set(to_i32(stats.checkout_hits)?),
            checkout_rate: Set(stats.checkout_rate),
            best_checkout: Set(stats.best_checkout),
            darts_thrown: Set(to_i32(stats.darts_thrown)?),
            count_180: Set(to_i32(stats.count_180)?),
            busts: Set(to_i32(stats.busts)?),
            mpr: Set(stats.mpr),
            first_9_mpr: Set(stats.first_9_mpr),
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn find_leg(
        &mut self,
        match_id: MatchId,
        set_number: i32,
        leg_number: i32,
    ) -> Result<Option<LegRow>, IngestError> {
        let record = legs::Entity::find()
            .filter(legs::Column::MatchId.eq(match_id))
            .filter(legs::Column::SetNumber.eq(set_number))
            .filter(legs::Column::LegNumber.eq(leg_number))
            .one(&self.txn)
            .await?;
        Ok(record.map(leg_from_model))
    }

    async fn load_leg(&mut self, id: LegId) -> Result<Option<LegRow>, IngestError> {
        let record = legs::Entity::find_by_id(id).one(&self.txn).await?;
        Ok(record.map(leg_from_model))
    }

    async fn load_legs(&mut self, match_id: MatchId) -> Result<Vec<LegRow>, IngestError> {
        let rows = legs::Entity::find()
            .filter(legs::Column::MatchId.eq(match_id))
            .order_by_asc(legs::Column::SetNumber)
            .order_by_asc(legs::Column::LegNumber)
            .all(&self.txn)
            .await?;
        Ok(rows.into_iter().map(leg_from_model).collect())
    }

    async fn insert_leg(&mut self, row: NewLeg) -> Result<LegId, IngestError> {
        let model = legs::ActiveModel {
            match_id: Set(row.match_id),
            set_number: Set(row.set_number),
            leg_number: Set(row.leg_number),
            winner_player_id: Set(None),
            started_at: Set(row.started_at),
            finished_at: Set(None),
            ..Default::default()
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(inserted.id)
    }

    async fn update_leg(&mut self, row: &LegRow) -> Result<(), IngestError> {
        let model = legs::ActiveModel {
            id: Set(row.id),
            match_id: Set(row.match_id),
            set_number: Set(row.set_number),
            leg_number: Set(row.leg_number),
            winner_player_id: Set(row.winner_player_id),
            started_at: Set(row.started_at),
            finished_at: Set(row.finished_at),
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn load_leg_players(
        &mut self,
        leg_id: LegId,
    ) -> Result<Vec<LegPlayerRow>, IngestError> {
        let rows = leg_players::Entity::find()
            .filter(leg_players::Column::LegId.eq(leg_id))
            .order_by_asc(leg_players::Column::PlayerId)
            .all(&self.txn)
            .await?;
        Ok(rows.into_iter().map(leg_player_from_model).collect())
    }

    async fn upsert_leg_player(&mut self, row: LegPlayerRow) -> Result<(), IngestError> {
        let existing = leg_players::Entity::find()
            .filter(leg_players::Column::LegId.eq(row.leg_id))
            .filter(leg_players::Column::PlayerId.eq(row.player_id))
            .one(&self.txn)
            .await?;
        let stats = &row.stats;
        let mut model = leg_players::ActiveModel {
            leg_id: Set(row.leg_id),
            match_id: Set(row.match_id),
            player_id: Set(row.player_id),
            won: Set(row.won),
            average: Set(stats.average),
            average_until_170: Set(stats.average_until_170),
            first_9_average: Set(stats.first_9_average),
            checkout_attempts: Set(to_i32(stats.checkout_attempts)?),
            checkout_hits: Set(to_i32(stats.checkout_hits)?),
            checkout_rate: Set(stats.checkout_rate),
            best_checkout: Set(stats.best_checkout),
            darts_thrown: Set(to_i32(stats.darts_thrown)?),
            count_180: Set(to_i32(stats.count_180)?),
            busts: Set(to_i32(stats.busts)?),
            mpr: Set(stats.mpr),
            first_9_mpr: Set(stats.first_9_mpr),
            ..Default::default()
        };
        match existing {
            Some(found) => {
                model.id = Set(found.id);
                model.update(&self.txn).await?;
            }
            None => {
                model.insert(&self.txn).await?;
            }
        }
        Ok(())
    }

    async fn find_turn(&mut self, external_id: &str) -> Result<Option<TurnRow>, IngestError> {
        let record = turns::Entity::find()
            .filter(turns::Column::ExternalId.eq(external_id))
            .one(&self.txn)
            .await?;
        Ok(record.map(turn_from_model))
    }

    async fn insert_turn(&mut self, row: NewTurn) -> Result<TurnId, IngestError> {
        let model = turns::ActiveModel {
            external_id: Set(row.external_id),
            match_id: Set(row.match_id),
            leg_id: Set(row.leg_id),
            player_id: Set(row.player_id),
            round_number: Set(row.round_number),
            points: Set(row.points),
            score: Set(row.score),
            busted: Set(row.busted),
            created_at: Set(row.created_at),
            updated_at: Set(row.created_at),
            ..Default::default()
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(inserted.id)
    }

    async fn update_turn(&mut self, row: &TurnRow) -> Result<(), IngestError> {
        let model = turns::ActiveModel {
            id: Set(row.id),
            external_id: Set(row.external_id.clone()),
            match_id: Set(row.match_id),
            leg_id: Set(row.leg_id),
            player_id: Set(row.player_id),
            round_number: Set(row.round_number),
            points: Set(row.points),
            score: Set(row.score),
            busted: Set(row.busted),
            created_at: Set(row.created_at),
            updated_at: Set(row.updated_at),
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn load_match_turns(&mut self, match_id: MatchId) -> Result<Vec<TurnRow>, IngestError> {
        let rows = turns::Entity::find()
            .filter(turns::Column::MatchId.eq(match_id))
            .order_by_asc(turns::Column::LegId)
            .order_by_asc(turns::Column::RoundNumber)
            .order_by_asc(turns::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(rows.into_iter().map(turn_from_model).collect())
    }

    async fn load_slot(
        &mut self,
        turn_id: TurnId,
        dart_number: DartNumber,
    ) -> Result<Vec<DartThrowRow>, IngestError> {
        let rows = dart_throws::Entity::find()
            .filter(dart_throws::Column::TurnId.eq(turn_id))
            .filter(dart_throws::Column::DartNumber.eq(dart_number))
            .order_by_asc(dart_throws::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(rows.into_iter().map(throw_from_model).collect())
    }

    async fn insert_throw(&mut self, row: NewDartThrow) -> Result<ThrowId, IngestError> {
        let model = dart_throws::ActiveModel {
            external_id: Set(row.external_id),
            turn_id: Set(row.turn_id),
            dart_number: Set(row.dart_number),
            segment_number: Set(row.segment_number),
            multiplier: Set(row.multiplier),
            points: Set(row.points),
            segment_name: Set(row.segment_name),
            bed: Set(row.bed),
            coord_x: Set(row.coord_x),
            coord_y: Set(row.coord_y),
            thrown_at: Set(row.thrown_at),
            is_corrected: Set(false),
            corrected_at: Set(None),
            corrected_by: Set(None),
            ..Default::default()
        };
        let inserted = model.insert(&self.txn).await?;
        Ok(inserted.id)
    }

    async fn mark_corrected(
        &mut self,
        throw_id: ThrowId,
        corrected_at: DateTime<Utc>,
        corrected_by: ThrowId,
    ) -> Result<(), IngestError> {
        let model = dart_throws::ActiveModel {
            id: Set(throw_id),
            is_corrected: Set(true),
            corrected_at: Set(Some(corrected_at)),
            corrected_by: Set(Some(corrected_by)),
            ..Default::default()
        };
        model.update(&self.txn).await?;
        Ok(())
    }

    async fn load_throws(
        &mut self,
        turn_ids: &[TurnId],
        include_corrected: bool,
    ) -> Result<Vec<DartThrowRow>, IngestError> {
        if turn_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = dart_throws::Entity::find()
            .filter(dart_throws::Column::TurnId.is_in(turn_ids.iter().copied()));
        if !include_corrected {
            query = query.filter(dart_throws::Column::IsCorrected.eq(false));
        }
        let rows = query
            .order_by_asc(dart_throws::Column::TurnId)
            .order_by_asc(dart_throws::Column::DartNumber)
            .order_by_asc(dart_throws::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(rows.into_iter().map(throw_from_model).collect())
    }

    async fn purge_match_state(&mut self, match_id: MatchId) -> Result<PurgeCounts, IngestError> {
        let turn_ids: Vec<TurnId> = turns::Entity::find()
            .select_only()
            .column(turns::Column::Id)
            .filter(turns::Column::MatchId.eq(match_id))
            .into_tuple()
            .all(&self.txn)
            .await?;

        let mut counts = PurgeCounts::default();
        if !turn_ids.is_empty() {
            // Drop the self-references first so the chain never dangles mid-delete.
            dart_throws::Entity::update_many()
                .col_expr(
                    dart_throws::Column::CorrectedBy,
                    Expr::value(Option::<i64>::None),
                )
                .filter(dart_throws::Column::TurnId.is_in(turn_ids.iter().copied()))
                .exec(&self.txn)
                .await?;
            counts.throws = dart_throws::Entity::delete_many()
                .filter(dart_throws::Column::TurnId.is_in(turn_ids.iter().copied()))
                .exec(&self.txn)
                .await?
                .rows_affected;
        }
        counts.turns = turns::Entity::delete_many()
            .filter(turns::Column::MatchId.eq(match_id))
            .exec(&self.txn)
            .await?
            .rows_affected;
        counts.leg_players = leg_players::Entity::delete_many()
            .filter(leg_players::Column::MatchId.eq(match_id))
            .exec(&self.txn)
            .await?
            .rows_affected;
        counts.legs = legs::Entity::delete_many()
            .filter(legs::Column::MatchId.eq(match_id))
            .exec(&self.txn)
            .await?
            .rows_affected;
        counts.match_players = match_players::Entity::delete_many()
            .filter(match_players::Column::MatchId.eq(match_id))
            .exec(&self.txn)
            .await?
            .rows_affected;
        Ok(counts)
    }

    async fn reassign_match_player(
        &mut self,
        match_id: MatchId,
        from: PlayerId,
        to: PlayerId,
    ) -> Result<Vec<LegId>, IngestError> {
        let mut moved: BTreeSet<LegId> = turns::Entity::find()
            .select_only()
            .column(turns::Column::LegId)
            .filter(turns::Column::MatchId.eq(match_id))
            .filter(turns::Column::PlayerId.eq(from))
            .into_tuple::<LegId>()
            .all(&self.txn)
            .await?
            .into_iter()
            .collect();
        let won: Vec<LegId> = legs::Entity::find()
            .select_only()
            .column(legs::Column::Id)
            .filter(legs::Column::MatchId.eq(match_id))
            .filter(legs::Column::WinnerPlayerId.eq(from))
            .into_tuple()
            .all(&self.txn)
            .await?;
        moved.extend(won);

        turns::Entity::update_many()
            .col_expr(turns::Column::PlayerId, Expr::value(to))
            .filter(turns::Column::MatchId.eq(match_id))
            .filter(turns::Column::PlayerId.eq(from))
            .exec(&self.txn)
            .await?;
        legs::Entity::update_many()
            .col_expr(legs::Column::WinnerPlayerId, Expr::value(Some(to)))
            .filter(legs::Column::MatchId.eq(match_id))
            .filter(legs::Column::WinnerPlayerId.eq(from))
            .exec(&self.txn)
            .await?;
        leg_players::Entity::delete_many()
            .filter(leg_players::Column::MatchId.eq(match_id))
            .filter(leg_players::Column::PlayerId.eq(from))
            .exec(&self.txn)
            .await?;
        match_players::Entity::delete_many()
            .filter(match_players::Column::MatchId.eq(match_id))
            .filter(match_players::Column::PlayerId.eq(from))
            .exec(&self.txn)
            .await?;
        Ok(moved.into_iter().collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), IngestError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

fn to_i32(value: u32) -> Result<i32, IngestError> {
    i32::try_from(value).map_err(|_| IngestError::validation("counter exceeds database range"))
}

fn from_i32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn player_from_model(model: players::Model) -> PlayerRow {
    PlayerRow {
        id: model.id,
        user_id: model.user_id,
        name: model.name,
        avatar_url: model.avatar_url,
        country: model.country,
        account_id: model.account_id,
    }
}

fn match_from_model(model: matches::Model) -> MatchRow {
    MatchRow {
        id: model.id,
        external_id: model.external_id,
        variant: model.variant,
        match_type: model.match_type,
        settings: MatchSettings {
            base_score: model.base_score,
            in_mode: model.in_mode,
            out_mode: model.out_mode,
            bull_mode: model.bull_mode,
            max_rounds: model.max_rounds,
            match_mode_type: model.match_mode_type,
            match_mode_legs: model.match_mode_legs,
            match_mode_sets: model.match_mode_sets,
            extra: match model.settings_extra {
                JsonValue::Null => JsonValue::Object(Default::default()),
                other => other,
            },
        },
        winner_player_id: model.winner_player_id,
        current_set: model.current_set,
        current_leg: model.current_leg,
        current_round: model.current_round,
        started_at: model.started_at,
        finished_at: model.finished_at,
        incomplete: model.incomplete,
        updated_at: model.updated_at,
    }
}

fn stats_from_columns(
    average: Option<f64>,
    average_until_170: Option<f64>,
    first_9_average: Option<f64>,
    checkout_attempts: i32,
    checkout_hits: i32,
    checkout_rate: Option<f64>,
    best_checkout: Option<i32>,
    darts_thrown: i32,
    count_180: i32,
    busts: i32,
    mpr: Option<f64>,
    first_9_mpr: Option<f64>,
) -> PlayerStats {
    PlayerStats {
        average,
        average_until_170,
        first_9_average,
        checkout_attempts: from_i32(checkout_attempts),
        checkout_hits: from_i32(checkout_hits),
        checkout_rate,
        best_checkout,
        darts_thrown: from_i32(darts_thrown),
        count_180: from_i32(count_180),
        busts: from_i32(busts),
        mpr,
        first_9_mpr,
    }
}

fn match_player_from_model(model: match_players::Model) -> MatchPlayerRow {
    MatchPlayerRow {
        id: model.id,
        match_id: model.match_id,
        player_id: model.player_id,
        player_index: model.player_index,
        handle: model.handle,
        legs_won: model.legs_won,
        sets_won: model.sets_won,
        stats: stats_from_columns(
            model.average,
            model.average_until_170,
            model.first_9_average,
            model.checkout_attempts,
            model.checkout_hits,
            model.checkout_rate,
            model.best_checkout,
            model.darts_thrown,
            model.count_180,
            model.busts,
            model.mpr,
            model.first_9_mpr,
        ),
    }
}

fn leg_from_model(model: legs::Model) -> LegRow {
    LegRow {
        id: model.id,
        match_id: model.match_id,
        set_number: model.set_number,
        leg_number: model.leg_number,
        winner_player_id: model.winner_player_id,
        started_at: model.started_at,
        finished_at: model.finished_at,
    }
}

fn leg_player_from_model(model: leg_players::Model) -> LegPlayerRow {
    LegPlayerRow {
        leg_id: model.leg_id,
        match_id: model.match_id,
        player_id: model.player_id,
        won: model.won,
        stats: stats_from_columns(
            model.average,
            model.average_until_170,
            model.first_9_average,
            model.checkout_attempts,
            model.checkout_hits,
            model.checkout_rate,
            model.best_checkout,
            model.darts_thrown,
            model.count_180,
            model.busts,
            model.mpr,
            model.first_9_mpr,
        ),
    }
}

fn turn_from_model(model: turns::Model) -> TurnRow {
    TurnRow {
        id: model.id,
        external_id: model.external_id,
        match_id: model.match_id,
        leg_id: model.leg_id,
        player_id: model.player_id,
        round_number: model.round_number,
        points: model.points,
        score: model.score,
        busted: model.busted,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn throw_from_model(model: dart_throws::Model) -> DartThrowRow {
    DartThrowRow {
        id: model.id,
        external_id: model.external_id,
        turn_id: model.turn_id,
        dart_number: model.dart_number,
        segment_number: model.segment_number,
        multiplier: model.multiplier,
        points: model.points,
        segment_name: model.segment_name,
        bed: model.bed,
        coord_x: model.coord_x,
        coord_y: model.coord_y,
        thrown_at: model.thrown_at,
        is_corrected: model.is_corrected,
        corrected_at: model.corrected_at,
        corrected_by: model.corrected_by,
    }
}
