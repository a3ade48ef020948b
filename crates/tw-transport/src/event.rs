use std::collections::HashMap;

use serde::Serialize;
use tw_core::ClientId;
use tw_core::Epoch;
use tw_core::Millis;
use tw_core::PlayerId;
use tw_core::SessionId;
use tw_engine::PublicState;

/// Outbound event envelope: `{ type, data }`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Event {
    ClientId {
        client_id: ClientId,
    },
    State(Box<PublicState>),
    Tick {
        times: HashMap<PlayerId, Millis>,
    },
    Timeout {
        player_id: PlayerId,
    },
    TimeoutChoice {
        player_id: PlayerId,
        options: TimeoutOptions,
        deadline: Epoch,
    },
    Warning {
        player_id: PlayerId,
        threshold: Millis,
    },
    Claimed {
        player_id: PlayerId,
        token: String,
        game_id: SessionId,
    },
    Reconnected {
        player_id: PlayerId,
        token: String,
        game_id: SessionId,
    },
    GameComplete {
        winner_id: Option<PlayerId>,
    },
    CampaignComplete {
        winner_id: Option<PlayerId>,
    },
    GameRenamed {
        name: String,
    },
    #[serde(rename = "shutdown_warning")]
    ShutdownWarning {
        message: String,
        timeout: Millis,
    },
    Error {
        message: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutOptions {
    pub lives_loss: i32,
    pub drunk_gain: i32,
}

impl Event {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serialize event")
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_encodes_as_type_data_envelope() {
        let event = Event::error("Game not found");
        let json = event.to_json();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""message":"Game not found""#));
    }

    #[test]
    fn shutdown_warning_keeps_snake_case_tag() {
        let event = Event::ShutdownWarning {
            message: "draining".into(),
            timeout: 30_000,
        };
        assert!(event.to_json().contains(r#""type":"shutdown_warning""#));
    }
}
