use tw_engine::EngineEvent;
use tw_engine::PublicState;

use crate::event::Event;
use crate::event::TimeoutOptions;

/// Converts engine-internal events to wire events. `state` must be the
/// snapshot taken atomically alongside `events` (same locked op) so that
/// `StateChanged` never races a later mutation.
pub fn encode(event: &EngineEvent, state: &PublicState) -> Event {
    match event {
        EngineEvent::StateChanged => Event::State(Box::new(state.clone())),
        EngineEvent::Tick { times } => Event::Tick {
            times: times.clone(),
        },
        EngineEvent::Timeout { player_id } => Event::Timeout {
            player_id: *player_id,
        },
        EngineEvent::TimeoutChoice {
            player_id,
            lives_loss,
            drunk_gain,
            deadline,
        } => Event::TimeoutChoice {
            player_id: *player_id,
            options: TimeoutOptions {
                lives_loss: *lives_loss,
                drunk_gain: *drunk_gain,
            },
            deadline: *deadline,
        },
        EngineEvent::Warning {
            player_id,
            threshold,
        } => Event::Warning {
            player_id: *player_id,
            threshold: *threshold,
        },
        EngineEvent::GameComplete { winner_id } => Event::GameComplete {
            winner_id: *winner_id,
        },
        EngineEvent::CampaignComplete { winner_id } => Event::CampaignComplete {
            winner_id: *winner_id,
        },
        EngineEvent::GameRenamed { name } => Event::GameRenamed { name: name.clone() },
    }
}

/// Encode a full batch, in order.
pub fn encode_all(events: &[EngineEvent], state: &PublicState) -> Vec<Event> {
    events.iter().map(|e| encode(e, state)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_engine::Session;
    use tw_engine::Settings;

    fn state() -> PublicState {
        Session::new("ABCDEF".into(), Settings::default(), None, 0, None)
            .unwrap()
            .to_public()
    }

    #[test]
    fn state_changed_carries_the_given_snapshot() {
        let event = encode(&EngineEvent::StateChanged, &state());
        assert!(matches!(event, Event::State(_)));
    }

    #[test]
    fn timeout_choice_maps_options_verbatim() {
        let event = encode(
            &EngineEvent::TimeoutChoice {
                player_id: 1,
                lives_loss: 1,
                drunk_gain: 2,
                deadline: 5_000,
            },
            &state(),
        );
        match event {
            Event::TimeoutChoice {
                player_id,
                options,
                deadline,
            } => {
                assert_eq!(player_id, 1);
                assert_eq!(options.lives_loss, 1);
                assert_eq!(options.drunk_gain, 2);
                assert_eq!(deadline, 5_000);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
