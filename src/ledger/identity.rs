//! Player Identity Resolver.
//!
//! Maps an external user id, or failing that a match-scoped handle or a
//! display name, to a durable player row. Resolution never fails for lack of
//! a match: an unknown participant is created on the spot.

use tracing::{debug, info, warn};

use super::error::IngestError;
use super::messages::PlayerPayload;
use super::storage::{IngestStorageTxn, NewPlayer, PlayerRow};
use super::types::{MatchId, PlayerId};

const LOG_TARGET: &str = "darts_ledger::ledger::identity";

/// Incoming description of a participant.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerDescriptor {
    pub user_id: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub country: Option<String>,
}

impl PlayerDescriptor {
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            name: name.into(),
            avatar_url: None,
            country: None,
        }
    }

    /// The external user id, with a blank one treated as absent.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn to_new_player(&self) -> NewPlayer {
        NewPlayer {
            user_id: self.user_id().map(str::to_string),
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
            country: self.country.clone(),
        }
    }

    /// Applies differing fields onto `row`. Absent profile fields never clear
    /// stored ones. Returns whether anything changed.
    fn refresh(&self, row: &mut PlayerRow) -> bool {
        let mut changed = false;
        if !self.name.is_empty() && row.name != self.name {
            row.name = self.name.clone();
            changed = true;
        }
        if self.avatar_url.is_some() && row.avatar_url != self.avatar_url {
            row.avatar_url = self.avatar_url.clone();
            changed = true;
        }
        if self.country.is_some() && row.country != self.country {
            row.country = self.country.clone();
            changed = true;
        }
        changed
    }
}

impl From<&PlayerPayload> for PlayerDescriptor {
    fn from(payload: &PlayerPayload) -> Self {
        Self {
            user_id: payload.user_id.clone(),
            name: payload.name.clone(),
            avatar_url: payload.avatar_url.clone(),
            country: payload.country().map(str::to_string),
        }
    }
}

/// Which rule produced the player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    UserId,
    Handle,
    Name,
    Created,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedPlayer {
    pub player_id: PlayerId,
    pub resolution: Resolution,
}

/// Where to look for a match-scoped handle before falling back to the name.
#[derive(Clone, Copy, Debug)]
pub struct HandleScope<'a> {
    pub match_id: MatchId,
    pub handle: &'a str,
}

/// `seated` lists players already holding another seat in the match; the
/// display-name fallback never returns one of them.
pub async fn resolve_player(
    txn: &mut (dyn IngestStorageTxn + Send),
    descriptor: &PlayerDescriptor,
    scope: Option<HandleScope<'_>>,
    seated: &[PlayerId],
) -> Result<ResolvedPlayer, IngestError> {
    if let Some(user_id) = descriptor.user_id() {
        if let Some(mut row) = txn.find_player_by_user_id(user_id).await? {
            if descriptor.refresh(&mut row) {
                debug!(target: LOG_TARGET, player_id = row.id, user_id, "refreshing player profile");
                txn.update_player(&row).await?;
            }
            return Ok(ResolvedPlayer {
                player_id: row.id,
                resolution: Resolution::UserId,
            });
        }
        let player_id = txn.insert_player(descriptor.to_new_player()).await?;
        info!(target: LOG_TARGET, player_id, user_id, "created player");
        return Ok(ResolvedPlayer {
            player_id,
            resolution: Resolution::Created,
        });
    }

    if let Some(scope) = scope {
        if let Some(player_id) = player_by_handle(txn, scope).await? {
            if let Some(mut row) = txn.load_player(player_id).await? {
                if descriptor.refresh(&mut row) {
                    txn.update_player(&row).await?;
                }
            }
            return Ok(ResolvedPlayer {
                player_id,
                resolution: Resolution::Handle,
            });
        }
    }

    if !descriptor.name.is_empty() {
        if let Some(row) = txn.find_player_by_name(&descriptor.name, seated).await? {
            warn!(
                target: LOG_TARGET,
                player_id = row.id,
                name = %descriptor.name,
                "anonymous participant matched by display name"
            );
            return Ok(ResolvedPlayer {
                player_id: row.id,
                resolution: Resolution::Name,
            });
        }
    }

    let player_id = txn.insert_player(descriptor.to_new_player()).await?;
    info!(target: LOG_TARGET, player_id, name = %descriptor.name, "created anonymous player");
    Ok(ResolvedPlayer {
        player_id,
        resolution: Resolution::Created,
    })
}

/// Player already registered under `handle` for this match, if any.
pub async fn player_by_handle(
    txn: &mut (dyn IngestStorageTxn + Send),
    scope: HandleScope<'_>,
) -> Result<Option<PlayerId>, IngestError> {
    let participants = txn.load_match_players(scope.match_id).await?;
    Ok(participants
        .into_iter()
        .find(|participant| participant.handle.as_deref() == Some(scope.handle))
        .map(|participant| participant.player_id))
}
