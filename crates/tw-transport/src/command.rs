use serde::Deserialize;
use tw_core::PlayerId;
use tw_core::SessionId;
use tw_engine::CampaignPreset;
use tw_engine::PlayerPatch;
use tw_engine::SettingsPatch;
use tw_engine::Settings;
use tw_engine::TimeoutChoice;

/// Inbound command envelope: `{ type, data }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Command {
    Create {
        settings: Settings,
        #[serde(default)]
        campaign_preset: Option<CampaignPreset>,
    },
    Join {
        game_id: SessionId,
    },
    Claim {
        player_id: PlayerId,
    },
    Reconnect {
        game_id: SessionId,
        player_id: PlayerId,
        token: String,
    },
    Unclaim,
    Start,
    Pause,
    Resume,
    Reset,
    EndGame,
    Switch {
        player_id: PlayerId,
    },
    Interrupt,
    PassPriority,
    RenameGame {
        name: String,
    },
    UpdatePlayer {
        player_id: PlayerId,
        #[serde(flatten)]
        patch: PlayerPatch,
    },
    UpdateSettings {
        #[serde(flatten)]
        patch: SettingsPatch,
    },
    AddPenalty {
        player_id: PlayerId,
    },
    Eliminate {
        player_id: PlayerId,
    },
    RevivePlayer {
        player_id: PlayerId,
    },
    KickPlayer {
        player_id: PlayerId,
    },
    StartTargetSelection,
    ToggleTarget {
        player_id: PlayerId,
    },
    ConfirmTargets,
    PassTargetPriority {
        player_id: PlayerId,
    },
    CancelTargeting,
    ResolveTimeoutChoice {
        player_id: PlayerId,
        choice: TimeoutChoice,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_envelope_decodes() {
        let json = r#"{"type":"create","data":{"settings":{}}}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, Command::Create { .. }));
    }

    #[test]
    fn switch_envelope_decodes_player_id() {
        let json = r#"{"type":"switch","data":{"playerId":2}}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, Command::Switch { player_id: 2 }));
    }

    #[test]
    fn bodiless_command_decodes_without_data() {
        let json = r#"{"type":"start"}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, Command::Start));
    }
}
