use std::collections::HashMap;

use tw_core::Epoch;
use tw_core::Millis;
use tw_core::PlayerId;

/// Observable effects of a session operation, queued during the mutation and
/// drained by the caller (the coordinator op, in `tw-coordinator`) to hand to
/// a `Broadcaster`. Plain data, transport-agnostic — `tw-transport` maps each
/// variant onto the wire `{type, data}` envelope and decides fan-out (public
/// broadcast vs. directed to one client).
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// Something material changed; caller should broadcast a fresh `state` snapshot.
    StateChanged,
    /// Emitted every tick while the session is running.
    Tick { times: HashMap<PlayerId, Millis> },
    /// A player's clock reached zero.
    Timeout { player_id: PlayerId },
    /// Grace period started for a zeroed-out player.
    TimeoutChoice {
        player_id: PlayerId,
        lives_loss: i32,
        drunk_gain: i32,
        deadline: Epoch,
    },
    /// A registered threshold was crossed downward this tick.
    Warning { player_id: PlayerId, threshold: Millis },
    /// Casual session reached a terminal state.
    GameComplete { winner_id: Option<PlayerId> },
    /// Campaign reached a terminal state across all rounds.
    CampaignComplete { winner_id: Option<PlayerId> },
    /// Session display name changed.
    GameRenamed { name: String },
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::StateChanged => write!(f, "state changed"),
            EngineEvent::Tick { times } => write!(f, "tick ({} players)", times.len()),
            EngineEvent::Timeout { player_id } => write!(f, "P{player_id} timed out"),
            EngineEvent::TimeoutChoice { player_id, .. } => {
                write!(f, "P{player_id} awaiting timeout choice")
            }
            EngineEvent::Warning {
                player_id,
                threshold,
            } => write!(f, "P{player_id} crossed {threshold}ms"),
            EngineEvent::GameComplete { winner_id } => write!(f, "game complete, winner {winner_id:?}"),
            EngineEvent::CampaignComplete { winner_id } => {
                write!(f, "campaign complete, winner {winner_id:?}")
            }
            EngineEvent::GameRenamed { name } => write!(f, "renamed to {name}"),
        }
    }
}
