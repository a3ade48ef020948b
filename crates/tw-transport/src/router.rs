//! Validates payload shape (already done by `serde` at `Command` decode
//! time), looks up the session, and invokes the registry with an op that
//! re-checks authorization and performs the mutation — mirroring §4.7.

use std::sync::Arc;

use tw_core::ClientId;
use tw_core::PlayerId;
use tw_core::SessionId;
use tw_engine::EngineError;
use tw_engine::EngineEvent;
use tw_engine::PublicState;
use tw_engine::Session;
use tw_engine::SessionStatus;
use tw_registry::Registry;

use crate::command::Command;
use crate::error::TransportError;
use crate::error::TransportResult;
use crate::event::Event;
use crate::protocol;

/// Caller identity plus the session it's currently attached to, if any.
/// Built and owned by the transport layer (`tw-server`) per connection.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    pub client_id: ClientId,
    pub session_id: Option<SessionId>,
}

/// Result of routing one command: which session (if any) the caller should
/// now be bound to, the events to broadcast to everyone in the session, and
/// events private to the caller alone (e.g. a claim token).
#[derive(Default)]
pub struct Outcome {
    pub session_id: Option<SessionId>,
    pub broadcast: Vec<Event>,
    pub private: Vec<Event>,
}

/// What a mutating closure hands back to the router: the events it raised,
/// plus the public snapshot taken in the same locked op so a `state` payload
/// never races a later mutation.
type Mutation = (Vec<EngineEvent>, PublicState);

fn is_owner(session: &Session, client: &str) -> bool {
    session.owner.as_deref() == Some(client)
}

fn claimed_player_of(session: &Session, client: &str) -> Option<PlayerId> {
    session
        .players
        .iter()
        .find(|p| p.claimed_by.as_deref() == Some(client))
        .map(|p| p.id)
}

fn owns_player(session: &Session, client: &str, player_id: PlayerId) -> bool {
    session
        .players
        .iter()
        .any(|p| p.id == player_id && p.claimed_by.as_deref() == Some(client))
}

fn require(ok: bool) -> Result<(), EngineError> {
    if ok {
        Ok(())
    } else {
        Err(EngineError::AuthDenied)
    }
}

pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub async fn dispatch(&self, ctx: &ConnectionContext, command: Command) -> TransportResult<Outcome> {
        match command {
            Command::Create {
                settings,
                campaign_preset,
            } => {
                let id = self
                    .registry
                    .create_session(settings, Some(ctx.client_id.clone()), campaign_preset)
                    .await?;
                let state = self.registry.public_state(&id).await?;
                Ok(Outcome {
                    session_id: Some(id),
                    broadcast: vec![Event::State(Box::new(state))],
                    private: Vec::new(),
                })
            }
            Command::Join { game_id } => {
                let state = self.registry.public_state(&game_id).await?;
                Ok(Outcome {
                    session_id: Some(game_id),
                    broadcast: Vec::new(),
                    private: vec![Event::State(Box::new(state))],
                })
            }
            Command::Claim { player_id } => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let (token, state) = self
                    .registry
                    .mutate_with(&id, move |s| {
                        let token = s.claim(player_id, client)?;
                        Ok((token, s.to_public()))
                    })
                    .await?;
                Ok(Outcome {
                    session_id: Some(id.clone()),
                    broadcast: vec![Event::State(Box::new(state))],
                    private: vec![Event::Claimed {
                        player_id,
                        token: token.value,
                        game_id: id,
                    }],
                })
            }
            Command::Reconnect {
                game_id,
                player_id,
                token,
            } => {
                let client = ctx.client_id.clone();
                let now = tw_core::now_ms();
                let (rotated, state) = self
                    .registry
                    .mutate_with(&game_id, move |s| {
                        let rotated = s.reconnect(player_id, client, &token, now)?;
                        Ok((rotated, s.to_public()))
                    })
                    .await?;
                Ok(Outcome {
                    session_id: Some(game_id.clone()),
                    broadcast: vec![Event::State(Box::new(state))],
                    private: vec![Event::Reconnected {
                        player_id,
                        token: rotated.value,
                        game_id,
                    }],
                })
            }
            Command::Unclaim => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        let events = s.unclaim(&client);
                        Ok((events, s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::Start => self.owner_or_claimed(ctx, |s, now| s.start(now)).await,
            Command::Pause => self.owner_or_claimed(ctx, |s, _now| s.pause()).await,
            Command::Resume => self.owner_or_claimed(ctx, |s, now| s.resume(now)).await,
            Command::Reset => self.owner_only(ctx, |s| Ok(s.reset())).await,
            Command::EndGame => self.owner_only(ctx, |s| Ok(s.close())).await,
            Command::Switch { player_id } => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        let allowed = s.status == SessionStatus::Waiting
                            || is_owner(s, &client)
                            || s.active_player.is_some_and(|active| owns_player(s, &client, active));
                        require(allowed)?;
                        let events = s.switch_player(player_id, tw_core::now_ms())?;
                        Ok((events, s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::Interrupt => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        let player_id = claimed_player_of(s, &client).ok_or(EngineError::AuthDenied)?;
                        require(!s.players.iter().any(|p| p.id == player_id && p.is_eliminated))?;
                        s.interrupt(player_id)?;
                        Ok((vec![EngineEvent::StateChanged], s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::PassPriority => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        let player_id = claimed_player_of(s, &client).ok_or(EngineError::AuthDenied)?;
                        require(!s.players.iter().any(|p| p.id == player_id && p.is_eliminated))?;
                        s.pass_priority(player_id)?;
                        Ok((vec![EngineEvent::StateChanged], s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::RenameGame { name } => self.owner_only(ctx, move |s| Ok(s.rename(&name))).await,
            Command::UpdatePlayer { player_id, patch } => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        let allowed = is_owner(s, &client)
                            || owns_player(s, &client, player_id)
                            || (s.status == SessionStatus::Waiting
                                && s.players
                                    .iter()
                                    .any(|p| p.id == player_id && p.claimed_by.is_none()));
                        require(allowed)?;
                        let events = s.update_player(player_id, patch)?;
                        Ok((events, s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::UpdateSettings { patch } => self.owner_only(ctx, move |s| s.update_settings(patch)).await,
            Command::AddPenalty { player_id } => self.owner_only(ctx, move |s| s.add_penalty(player_id)).await,
            Command::Eliminate { player_id } => self.owner_only(ctx, move |s| s.eliminate(player_id)).await,
            Command::RevivePlayer { player_id } => {
                self.owner_only(ctx, move |s| s.revive_player(player_id)).await
            }
            Command::KickPlayer { player_id } => self.owner_only(ctx, move |s| s.kick_player(player_id)).await,
            Command::StartTargetSelection => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        require(s.active_player.is_some_and(|active| owns_player(s, &client, active)))?;
                        s.start_target_selection()?;
                        Ok((vec![EngineEvent::StateChanged], s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::ToggleTarget { player_id } => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        require(s.active_player.is_some_and(|active| owns_player(s, &client, active)))?;
                        s.toggle_target(player_id)?;
                        Ok((vec![EngineEvent::StateChanged], s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::ConfirmTargets => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        require(s.active_player.is_some_and(|active| owns_player(s, &client, active)))?;
                        s.confirm_targets()?;
                        Ok((vec![EngineEvent::StateChanged], s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::PassTargetPriority { player_id } => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        require(owns_player(s, &client, player_id))?;
                        let events = s.pass_target_priority(player_id)?;
                        Ok((events, s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::CancelTargeting => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        require(
                            is_owner(s, &client)
                                || s.active_player.is_some_and(|a| owns_player(s, &client, a)),
                        )?;
                        let events = s.cancel_targeting()?;
                        Ok((events, s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
            Command::ResolveTimeoutChoice { player_id, choice } => {
                let id = self.session_id(ctx)?;
                let client = ctx.client_id.clone();
                let mutation = self
                    .registry
                    .mutate_with(&id, move |s| {
                        require(owns_player(s, &client, player_id))?;
                        let events = s.resolve_timeout_choice(player_id, choice, tw_core::now_ms())?;
                        Ok((events, s.to_public()))
                    })
                    .await?;
                Ok(self.to_outcome(id, mutation))
            }
        }
    }

    fn session_id(&self, ctx: &ConnectionContext) -> TransportResult<SessionId> {
        ctx.session_id.clone().ok_or(TransportError::NotFound)
    }

    fn to_outcome(&self, id: SessionId, (events, state): Mutation) -> Outcome {
        Outcome {
            session_id: Some(id),
            broadcast: protocol::encode_all(&events, &state),
            private: Vec::new(),
        }
    }

    async fn owner_only<F>(&self, ctx: &ConnectionContext, op: F) -> TransportResult<Outcome>
    where
        F: FnOnce(&mut Session) -> Result<Vec<EngineEvent>, EngineError> + Send + 'static,
    {
        let id = self.session_id(ctx)?;
        let client = ctx.client_id.clone();
        let mutation = self
            .registry
            .mutate_with(&id, move |s| {
                require(is_owner(s, &client))?;
                let events = op(s)?;
                Ok((events, s.to_public()))
            })
            .await?;
        Ok(self.to_outcome(id, mutation))
    }

    async fn owner_or_claimed<F>(&self, ctx: &ConnectionContext, op: F) -> TransportResult<Outcome>
    where
        F: FnOnce(&mut Session, tw_core::Epoch) -> Result<Vec<EngineEvent>, EngineError> + Send + 'static,
    {
        let id = self.session_id(ctx)?;
        let client = ctx.client_id.clone();
        let now = tw_core::now_ms();
        let mutation = self
            .registry
            .mutate_with(&id, move |s| {
                require(is_owner(s, &client) || claimed_player_of(s, &client).is_some())?;
                let events = op(s, now)?;
                Ok((events, s.to_public()))
            })
            .await?;
        Ok(self.to_outcome(id, mutation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_coordinator::Coordinator;
    use tw_engine::Settings;
    use tw_store::Memory;

    fn router() -> (Router, ConnectionContext) {
        let memory = Memory::new();
        let registry = Registry::new(Arc::new(Coordinator::new()), memory.store, memory.pubsub, true);
        let router = Router::new(registry);
        let ctx = ConnectionContext {
            client_id: "client-1".into(),
            session_id: None,
        };
        (router, ctx)
    }

    #[tokio::test]
    async fn create_then_claim_round_trips_a_token() {
        let (router, mut ctx) = router();
        let outcome = router
            .dispatch(
                &ctx,
                Command::Create {
                    settings: Settings::default(),
                    campaign_preset: None,
                },
            )
            .await
            .unwrap();
        ctx.session_id = outcome.session_id;
        let outcome = router.dispatch(&ctx, Command::Claim { player_id: 1 }).await.unwrap();
        assert!(matches!(outcome.private.as_slice(), [Event::Claimed { player_id: 1, .. }]));
    }

    #[tokio::test]
    async fn non_owner_cannot_reset() {
        let (router, mut ctx) = router();
        let outcome = router
            .dispatch(
                &ctx,
                Command::Create {
                    settings: Settings::default(),
                    campaign_preset: None,
                },
            )
            .await
            .unwrap();
        ctx.session_id = outcome.session_id;
        ctx.client_id = "someone-else".into();
        let result = router.dispatch(&ctx, Command::Reset).await;
        assert_eq!(result.unwrap_err(), TransportError::AuthDenied);
    }

    #[tokio::test]
    async fn switch_player_is_open_to_anyone_while_waiting() {
        let (router, mut ctx) = router();
        let outcome = router
            .dispatch(
                &ctx,
                Command::Create {
                    settings: Settings::default(),
                    campaign_preset: None,
                },
            )
            .await
            .unwrap();
        ctx.session_id = outcome.session_id;
        ctx.client_id = "anyone".into();
        let result = router.dispatch(&ctx, Command::Switch { player_id: 1 }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn eliminated_player_cannot_pass_priority() {
        let (router, mut ctx) = router();
        let outcome = router
            .dispatch(
                &ctx,
                Command::Create {
                    settings: Settings::default(),
                    campaign_preset: None,
                },
            )
            .await
            .unwrap();
        ctx.session_id = outcome.session_id;
        router.dispatch(&ctx, Command::Claim { player_id: 1 }).await.unwrap();
        router.dispatch(&ctx, Command::Start).await.unwrap();
        router.dispatch(&ctx, Command::Eliminate { player_id: 1 }).await.unwrap();
        let result = router.dispatch(&ctx, Command::PassPriority).await;
        assert!(result.is_err());
    }
}
