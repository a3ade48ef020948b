use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use tw_auth::Token;
use tw_core::ClientId;
use tw_core::DEFAULT_LIFE;
use tw_core::Epoch;
use tw_core::Millis;
use tw_core::PlayerId;
use tw_core::SessionId;
use tw_core::clamp_life;

use crate::campaign::CampaignPreset;
use crate::campaign::CampaignState;
use crate::campaign::CampaignStatus;
use crate::campaign::RoundPlayerResult;
use crate::error::EngineError;
use crate::error::EngineResult;
use crate::event::EngineEvent;
use crate::player::Player;
use crate::player::PublicPlayer;
use crate::sanitize::sanitize_name;
use crate::settings::PenaltyType;
use crate::settings::Settings;
use crate::settings::validate_time;
use crate::settings::validate_warning_thresholds;
use crate::targeting::Targeting;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Running,
    Paused,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Casual,
    Campaign,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum TimeoutChoice {
    LoseLives,
    GainDrunk,
    Die,
}

#[derive(Default, Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub time: Option<Millis>,
    pub life: Option<i32>,
    pub drunk_counter: Option<i32>,
    pub generic_counter: Option<i32>,
    pub color: Option<String>,
}

#[derive(Default, Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub warning_thresholds: Option<Vec<Millis>>,
    pub bonus_time: Option<Millis>,
    pub timeout_penalty_lives: Option<i32>,
    pub timeout_penalty_drunk: Option<i32>,
    pub timeout_bonus_time: Option<Millis>,
}

/// A session: shared core state (§3) plus, when `mode == Campaign`, the
/// round-crossing extension in `campaign`. Every mutating method here runs
/// inside the coordinator's per-session exclusive section (`tw-coordinator`);
/// none of them perform I/O themselves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub mode: SessionMode,
    pub name: String,
    pub status: SessionStatus,
    pub created_at: Epoch,
    pub last_activity: Epoch,
    pub last_tick: Epoch,
    pub owner: Option<ClientId>,
    pub players: Vec<Player>,
    pub active_player: Option<PlayerId>,
    pub interrupt_stack: Vec<PlayerId>,
    pub targeting: Targeting,
    pub winner: Option<PlayerId>,
    pub settings: Settings,
    pub is_closed: bool,
    pub campaign: Option<CampaignState>,
}

impl Session {
    pub fn new(
        id: SessionId,
        mut settings: Settings,
        owner: Option<ClientId>,
        now: Epoch,
        campaign_preset: Option<CampaignPreset>,
    ) -> EngineResult<Self> {
        settings.validate()?;
        let player_ids: Vec<PlayerId> = (1..=settings.player_count).collect();
        let campaign = campaign_preset.map(|preset| CampaignState::new(preset, &player_ids));
        let (initial_time, starting_life) = match &campaign {
            Some(c) => (c.time_for_round(), c.config.starting_life),
            None => (settings.initial_time, DEFAULT_LIFE),
        };
        if let Some(c) = &campaign {
            settings.bonus_time = c.config.bonus_time;
        }
        let players = player_ids
            .iter()
            .map(|&id| Player::new(id, initial_time, starting_life))
            .collect();
        let mode = if campaign.is_some() {
            SessionMode::Campaign
        } else {
            SessionMode::Casual
        };
        Ok(Self {
            id,
            mode,
            name: String::new(),
            status: SessionStatus::Waiting,
            created_at: now,
            last_activity: now,
            last_tick: now,
            owner,
            players,
            active_player: None,
            interrupt_stack: Vec::new(),
            targeting: Targeting::default(),
            winner: None,
            settings,
            is_closed: false,
            campaign,
        })
    }

    fn player_ref(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Alive count, used for the winner-detection and switch-player invariants.
    fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| !p.is_eliminated)
            .map(|p| p.id)
            .collect()
    }

    /// "Next after by id, wrapping" successor — §9 resolves the two
    /// conflicting source behaviors in favor of this one, not "first alive".
    fn next_alive_after(&self, eliminated: PlayerId) -> Option<PlayerId> {
        let n = self.players.len() as PlayerId;
        if n == 0 {
            return None;
        }
        let mut candidate = (eliminated % n) + 1;
        for _ in 0..n {
            if let Some(p) = self.player_ref(candidate) {
                if !p.is_eliminated {
                    return Some(candidate);
                }
            }
            candidate = (candidate % n) + 1;
        }
        None
    }

    /// Interrupt top, else `originalActivePlayer` during targeting
    /// resolution, else the plain active player.
    fn acting_player(&self) -> Option<PlayerId> {
        if let Some(&top) = self.interrupt_stack.last() {
            return Some(top);
        }
        if self.targeting.is_resolving() {
            return self.targeting.original_active_player;
        }
        self.active_player
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&mut self, now: Epoch) -> EngineResult<Vec<EngineEvent>> {
        if !matches!(self.status, SessionStatus::Waiting | SessionStatus::Paused) {
            return Err(EngineError::Conflict(
                "session cannot be started from this state".into(),
            ));
        }
        self.status = SessionStatus::Running;
        self.last_tick = now;
        if self.active_player.is_none() {
            self.active_player = self.alive_ids().first().copied();
        }
        Ok(vec![EngineEvent::StateChanged])
    }

    pub fn pause(&mut self) -> EngineResult<Vec<EngineEvent>> {
        if self.status != SessionStatus::Running {
            return Err(EngineError::Conflict("session is not running".into()));
        }
        self.status = SessionStatus::Paused;
        Ok(vec![EngineEvent::StateChanged])
    }

    pub fn resume(&mut self, now: Epoch) -> EngineResult<Vec<EngineEvent>> {
        if self.status != SessionStatus::Paused {
            return Err(EngineError::Conflict("session is not paused".into()));
        }
        self.status = SessionStatus::Running;
        self.last_tick = now;
        Ok(vec![EngineEvent::StateChanged])
    }

    pub fn reset(&mut self) -> Vec<EngineEvent> {
        let initial_time = self
            .campaign
            .as_ref()
            .map(|c| c.time_for_round())
            .unwrap_or(self.settings.initial_time);
        let starting_life = self
            .campaign
            .as_ref()
            .map(|c| c.config.starting_life)
            .unwrap_or(DEFAULT_LIFE);
        for p in &mut self.players {
            let id = p.id;
            let claimed = p.claimed_by.clone();
            let token = p.reconnect_token.clone();
            let name = p.name.clone();
            *p = Player::new(id, initial_time, starting_life);
            p.claimed_by = claimed;
            p.reconnect_token = token;
            p.name = name;
        }
        self.status = SessionStatus::Waiting;
        self.active_player = None;
        self.interrupt_stack.clear();
        self.targeting = Targeting::default();
        self.winner = None;
        vec![EngineEvent::StateChanged]
    }

    pub fn close(&mut self) -> Vec<EngineEvent> {
        self.is_closed = true;
        self.status = SessionStatus::Finished;
        vec![EngineEvent::StateChanged]
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    pub fn tick(&mut self, now: Epoch) -> Vec<EngineEvent> {
        if self.status != SessionStatus::Running {
            return Vec::new();
        }
        let elapsed = (now - self.last_tick).max(0);
        self.last_tick = now;
        let mut events = Vec::new();

        let tickers: Vec<PlayerId> = if !self.interrupt_stack.is_empty() {
            vec![*self.interrupt_stack.last().unwrap()]
        } else if self.targeting.is_resolving() && !self.targeting.awaiting_priority.is_empty() {
            self.targeting.awaiting_priority.clone()
        } else if let Some(active) = self.active_player {
            vec![active]
        } else {
            Vec::new()
        };

        let thresholds = self.settings.warning_thresholds.clone();
        for id in tickers.clone() {
            let Some((before, timeout_pending)) =
                self.player_ref(id).map(|p| (p.time_remaining, p.timeout_pending))
            else {
                continue;
            };
            if timeout_pending {
                continue;
            }
            let after = before - elapsed;
            if after <= 0 {
                if let Some(p) = self.player_mut(id) {
                    p.time_remaining = 0;
                }
                events.extend(self.handle_timeout(id, now));
            } else {
                if let Some(p) = self.player_mut(id) {
                    p.set_time_remaining(after);
                }
                for &threshold in &thresholds {
                    if before > threshold && after <= threshold {
                        events.push(EngineEvent::Warning {
                            player_id: id,
                            threshold,
                        });
                    }
                }
            }
        }

        let times: HashMap<PlayerId, Millis> = tickers
            .iter()
            .filter_map(|&id| self.player_ref(id).map(|p| (id, p.time_remaining)))
            .collect();
        if !times.is_empty() {
            events.push(EngineEvent::Tick { times });
        }

        let expired: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.timeout_pending && p.timeout_choice_deadline.is_some_and(|d| now >= d))
            .map(|p| p.id)
            .collect();
        for id in expired {
            events.extend(self.resolve_timeout_choice_internal(id, TimeoutChoice::Die, now));
        }

        events
    }

    fn handle_timeout(&mut self, id: PlayerId, now: Epoch) -> Vec<EngineEvent> {
        let mut events = vec![EngineEvent::Timeout { player_id: id }];
        if self.targeting.is_resolving() && self.targeting.awaiting_priority.contains(&id) {
            if self.targeting.handle_eliminated_target(id) {
                events.push(EngineEvent::StateChanged);
            }
            return events;
        }
        let deadline = now + self.settings.timeout_grace_period;
        if let Some(p) = self.player_mut(id) {
            p.timeout_pending = true;
            p.timeout_choice_deadline = Some(deadline);
            p.penalties += 1;
        }
        events.push(EngineEvent::TimeoutChoice {
            player_id: id,
            lives_loss: self.settings.timeout_penalty_lives,
            drunk_gain: self.settings.timeout_penalty_drunk,
            deadline,
        });
        events
    }

    pub fn resolve_timeout_choice(
        &mut self,
        id: PlayerId,
        choice: TimeoutChoice,
        now: Epoch,
    ) -> EngineResult<Vec<EngineEvent>> {
        let player = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if !player.timeout_pending {
            return Err(EngineError::Conflict("no timeout choice pending".into()));
        }
        Ok(self.resolve_timeout_choice_internal(id, choice, now))
    }

    fn resolve_timeout_choice_internal(
        &mut self,
        id: PlayerId,
        choice: TimeoutChoice,
        _now: Epoch,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        match choice {
            TimeoutChoice::LoseLives => {
                let lives_loss = self.settings.timeout_penalty_lives;
                let bonus = self.settings.timeout_bonus_time;
                let Some(new_life) = self.player_mut(id).map(|p| {
                    p.timeout_pending = false;
                    p.timeout_choice_deadline = None;
                    let new_life = clamp_life(p.life - lives_loss);
                    p.life = new_life;
                    p.set_time_remaining(bonus);
                    new_life
                }) else {
                    return events;
                };
                events.push(EngineEvent::StateChanged);
                if new_life <= 0 {
                    events.extend(self.eliminate_cascade(id));
                }
            }
            TimeoutChoice::GainDrunk => {
                let drunk_gain = self.settings.timeout_penalty_drunk;
                let bonus = self.settings.timeout_bonus_time;
                if let Some(p) = self.player_mut(id) {
                    p.timeout_pending = false;
                    p.timeout_choice_deadline = None;
                    p.set_drunk_counter(p.drunk_counter + drunk_gain);
                    p.set_time_remaining(bonus);
                }
                events.push(EngineEvent::StateChanged);
            }
            TimeoutChoice::Die => {
                if let Some(p) = self.player_mut(id) {
                    p.timeout_pending = false;
                    p.timeout_choice_deadline = None;
                }
                events.extend(self.eliminate_cascade(id));
            }
        }
        events
    }

    // ------------------------------------------------------------------
    // Turn switching
    // ------------------------------------------------------------------

    pub fn switch_player(&mut self, id: PlayerId, now: Epoch) -> EngineResult<Vec<EngineEvent>> {
        let target = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if target.is_eliminated {
            return Err(EngineError::Conflict("player is eliminated".into()));
        }
        if self.alive_ids().len() < 2 {
            return Err(EngineError::Conflict(
                "at least two non-eliminated players required".into(),
            ));
        }
        self.active_player = Some(id);
        self.last_tick = now;
        let bonus = self.settings.bonus_time;
        if let Some(p) = self.player_mut(id) {
            p.set_time_remaining(p.time_remaining + bonus);
        }
        Ok(vec![EngineEvent::StateChanged])
    }

    // ------------------------------------------------------------------
    // Elimination and winner detection
    // ------------------------------------------------------------------

    pub fn eliminate(&mut self, id: PlayerId) -> EngineResult<Vec<EngineEvent>> {
        self.player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        Ok(self.eliminate_cascade(id))
    }

    fn eliminate_cascade(&mut self, id: PlayerId) -> Vec<EngineEvent> {
        if let Some(p) = self.player_mut(id) {
            p.is_eliminated = true;
        }
        let alive = self.alive_ids();
        if alive.len() == 1 {
            return self.finish_game(Some(alive[0]));
        }
        if alive.is_empty() {
            return self.finish_game(None);
        }
        let mut events = vec![EngineEvent::StateChanged];
        if self.targeting.is_resolving() {
            self.targeting.handle_eliminated_target(id);
        } else if self.active_player == Some(id) {
            self.active_player = self.next_alive_after(id);
        }
        events
    }

    fn finish_game(&mut self, winner: Option<PlayerId>) -> Vec<EngineEvent> {
        self.winner = winner;
        self.status = SessionStatus::Finished;
        self.active_player = None;
        self.interrupt_stack.clear();
        self.targeting = Targeting::default();
        let mut events = vec![EngineEvent::GameComplete { winner_id: winner }];
        if self.mode == SessionMode::Campaign {
            events.extend(self.complete_campaign_round(winner));
        }
        events.push(EngineEvent::StateChanged);
        events
    }

    fn complete_campaign_round(&mut self, winner: Option<PlayerId>) -> Vec<EngineEvent> {
        let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        let round_time = match self.campaign.as_ref() {
            Some(c) => c.time_for_round(),
            None => return Vec::new(),
        };
        let results: HashMap<PlayerId, RoundPlayerResult> = self
            .players
            .iter()
            .map(|p| {
                (
                    p.id,
                    RoundPlayerResult {
                        time_used: (round_time - p.time_remaining).max(0),
                        penalties: p.penalties,
                        is_eliminated: p.is_eliminated,
                    },
                )
            })
            .collect();
        let campaign = self.campaign.as_mut().expect("checked above");
        campaign.finalize_round_scoring(&player_ids);
        campaign.record_round(winner, results);
        campaign.advance_round();

        let mut events = Vec::new();
        if let Some(final_winner) = campaign.check_campaign_complete(&player_ids) {
            campaign.status = CampaignStatus::Completed;
            campaign.winner = final_winner;
            self.status = SessionStatus::Finished;
            self.winner = final_winner;
            events.push(EngineEvent::CampaignComplete {
                winner_id: final_winner,
            });
        } else {
            self.prepare_next_round();
        }
        events
    }

    fn prepare_next_round(&mut self) {
        let (round_time, starting_life, names, claims) = match self.campaign.as_ref() {
            Some(c) => (
                c.time_for_round(),
                c.config.starting_life,
                c.player_names.clone(),
                c.player_claims.clone(),
            ),
            None => return,
        };
        for p in &mut self.players {
            let id = p.id;
            *p = Player::new(id, round_time, starting_life);
            if let Some(name) = names.get(&id) {
                p.name = name.clone();
            }
            if let Some(client) = claims.get(&id) {
                p.claimed_by = Some(client.clone());
            }
        }
        self.status = SessionStatus::Waiting;
        self.active_player = None;
        self.winner = None;
    }

    // ------------------------------------------------------------------
    // Interrupt stack
    // ------------------------------------------------------------------

    pub fn interrupt(&mut self, id: PlayerId) -> EngineResult<()> {
        let player = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if player.is_eliminated {
            return Err(EngineError::Conflict("player is eliminated".into()));
        }
        self.interrupt_stack.push(id);
        Ok(())
    }

    pub fn pass_priority(&mut self, id: PlayerId) -> EngineResult<()> {
        match self.interrupt_stack.iter().rposition(|&p| p == id) {
            Some(pos) => {
                self.interrupt_stack.remove(pos);
                Ok(())
            }
            None => Err(EngineError::Conflict(
                "player does not hold interrupt priority".into(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Targeting
    // ------------------------------------------------------------------

    pub fn start_target_selection(&mut self) -> EngineResult<()> {
        if self.status != SessionStatus::Running {
            return Err(EngineError::Conflict("session is not running".into()));
        }
        if !self.targeting.is_none() {
            return Err(EngineError::Conflict("targeting already in progress".into()));
        }
        self.targeting.start_selection();
        Ok(())
    }

    pub fn toggle_target(&mut self, id: PlayerId) -> EngineResult<()> {
        if !self.targeting.is_selecting() {
            return Err(EngineError::Conflict("not selecting targets".into()));
        }
        if Some(id) == self.active_player {
            return Err(EngineError::Validation(
                "cannot target the active player".into(),
            ));
        }
        let player = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if player.is_eliminated {
            return Err(EngineError::Conflict("player is eliminated".into()));
        }
        self.targeting.toggle_target(id);
        Ok(())
    }

    pub fn confirm_targets(&mut self) -> EngineResult<()> {
        if !self.targeting.is_selecting() {
            return Err(EngineError::Conflict("not selecting targets".into()));
        }
        if self.targeting.targeted_players.is_empty() {
            return Err(EngineError::Validation("no targets selected".into()));
        }
        let active = self
            .active_player
            .ok_or_else(|| EngineError::Conflict("no active player".into()))?;
        self.targeting.confirm(active);
        Ok(())
    }

    pub fn pass_target_priority(&mut self, id: PlayerId) -> EngineResult<Vec<EngineEvent>> {
        if !self.targeting.is_resolving() || !self.targeting.awaiting_priority.contains(&id) {
            return Err(EngineError::Conflict(
                "player does not hold target priority".into(),
            ));
        }
        self.targeting.pass_priority(id);
        Ok(vec![EngineEvent::StateChanged])
    }

    pub fn cancel_targeting(&mut self) -> EngineResult<Vec<EngineEvent>> {
        if self.targeting.is_none() {
            return Err(EngineError::Conflict("no targeting in progress".into()));
        }
        if let Some(original) = self.targeting.cancel() {
            self.active_player = Some(original);
        }
        Ok(vec![EngineEvent::StateChanged])
    }

    // ------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------

    pub fn revive_player(&mut self, id: PlayerId) -> EngineResult<Vec<EngineEvent>> {
        let player = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if !player.is_eliminated {
            return Ok(Vec::new());
        }
        let starting_life = self
            .campaign
            .as_ref()
            .map(|c| c.config.starting_life)
            .unwrap_or(DEFAULT_LIFE);
        let initial_time = self.settings.initial_time;
        if let Some(p) = self.player_mut(id) {
            p.is_eliminated = false;
            if p.time_remaining == 0 {
                p.set_time_remaining(initial_time);
            }
            if p.life <= 0 {
                p.set_life(starting_life);
            }
            p.timeout_pending = false;
            p.timeout_choice_deadline = None;
        }
        if self.status == SessionStatus::Finished {
            self.winner = None;
            self.status = SessionStatus::Paused;
        }
        Ok(vec![EngineEvent::StateChanged])
    }

    pub fn kick_player(&mut self, id: PlayerId) -> EngineResult<Vec<EngineEvent>> {
        self.player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if let Some(p) = self.player_mut(id) {
            p.claimed_by = None;
            p.reconnect_token = None;
        }
        Ok(self.eliminate_cascade(id))
    }

    // ------------------------------------------------------------------
    // Player edits
    // ------------------------------------------------------------------

    pub fn update_player(&mut self, id: PlayerId, patch: PlayerPatch) -> EngineResult<Vec<EngineEvent>> {
        self.player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;

        let mut sanitized_name = None;
        let mut life_change = None;
        if let Some(p) = self.player_mut(id) {
            if let Some(name) = &patch.name {
                let clean = sanitize_name(name);
                p.name = clean.clone();
                sanitized_name = Some(clean);
            }
            if let Some(time) = patch.time {
                p.set_time_remaining(time);
            }
            if let Some(life) = patch.life {
                let old = p.life;
                let new = clamp_life(life);
                p.life = new;
                if new != old {
                    life_change = Some((old, new));
                }
            }
            if let Some(dc) = patch.drunk_counter {
                p.set_drunk_counter(dc);
            }
            if let Some(gc) = patch.generic_counter {
                p.set_generic_counter(gc);
            }
            if let Some(color) = &patch.color {
                p.color = Some(color.clone());
            }
        }
        if let (Some(name), Some(campaign)) = (&sanitized_name, self.campaign.as_mut()) {
            campaign.player_names.insert(id, name.clone());
        }

        let mut events = vec![EngineEvent::StateChanged];
        if let Some((old, new)) = life_change {
            let acting = self.acting_player();
            let status_running = self.status == SessionStatus::Running;
            let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
            if let Some(campaign) = self.campaign.as_mut() {
                campaign.on_player_life_changed(status_running, acting, id, old, new, &player_ids);
            }
            if new <= 0 {
                events.extend(self.eliminate_cascade(id));
            }
        }
        Ok(events)
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> EngineResult<Vec<EngineEvent>> {
        if let Some(thresholds) = &patch.warning_thresholds {
            validate_warning_thresholds(thresholds)?;
        }
        if let Some(bonus) = patch.bonus_time {
            validate_time(bonus, "bonusTime")?;
        }
        if let Some(tbt) = patch.timeout_bonus_time {
            validate_time(tbt, "timeoutBonusTime")?;
        }
        if let Some(thresholds) = patch.warning_thresholds {
            self.settings.warning_thresholds = thresholds;
        }
        if let Some(bonus) = patch.bonus_time {
            self.settings.bonus_time = bonus;
        }
        if let Some(v) = patch.timeout_penalty_lives {
            self.settings.timeout_penalty_lives = v;
        }
        if let Some(v) = patch.timeout_penalty_drunk {
            self.settings.timeout_penalty_drunk = v;
        }
        if let Some(v) = patch.timeout_bonus_time {
            self.settings.timeout_bonus_time = v;
        }
        Ok(vec![EngineEvent::StateChanged])
    }

    pub fn add_penalty(&mut self, id: PlayerId) -> EngineResult<Vec<EngineEvent>> {
        self.player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        let penalty_type = self.settings.penalty_type;
        let deduction = self.settings.penalty_time_deduction;
        if let Some(p) = self.player_mut(id) {
            p.penalties += 1;
            if penalty_type == PenaltyType::TimeDeduction {
                p.set_time_remaining(p.time_remaining - deduction);
            }
        }
        let mut events = vec![EngineEvent::StateChanged];
        if penalty_type == PenaltyType::GameLoss {
            events.extend(self.eliminate_cascade(id));
        }
        Ok(events)
    }

    pub fn rename(&mut self, name: &str) -> Vec<EngineEvent> {
        self.name = sanitize_name(name);
        vec![
            EngineEvent::GameRenamed {
                name: self.name.clone(),
            },
            EngineEvent::StateChanged,
        ]
    }

    // ------------------------------------------------------------------
    // Claim / reconnect
    // ------------------------------------------------------------------

    pub fn claim(&mut self, id: PlayerId, client: ClientId) -> EngineResult<Token> {
        let player = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        if player.is_eliminated {
            return Err(EngineError::Conflict("player is eliminated".into()));
        }
        if player.claimed_by.is_some() {
            return Err(EngineError::Conflict("player already claimed".into()));
        }
        for p in &mut self.players {
            if p.claimed_by.as_deref() == Some(client.as_str()) {
                p.claimed_by = None;
                p.reconnect_token = None;
            }
        }
        let token = tw_auth::mint();
        if let Some(p) = self.player_mut(id) {
            p.claimed_by = Some(client.clone());
            p.reconnect_token = Some(token.clone());
        }
        if self.owner.is_none() {
            self.owner = Some(client.clone());
        }
        if let Some(campaign) = self.campaign.as_mut() {
            campaign.player_claims.insert(id, client);
        }
        Ok(token)
    }

    pub fn unclaim(&mut self, client: &str) -> Vec<EngineEvent> {
        let mut changed = false;
        for p in &mut self.players {
            if p.claimed_by.as_deref() == Some(client) {
                p.claimed_by = None;
                p.reconnect_token = None;
                changed = true;
            }
        }
        if changed {
            vec![EngineEvent::StateChanged]
        } else {
            Vec::new()
        }
    }

    pub fn reconnect(
        &mut self,
        id: PlayerId,
        client: ClientId,
        presented: &str,
        now: Epoch,
    ) -> EngineResult<Token> {
        let player = self
            .player_ref(id)
            .ok_or_else(|| EngineError::NotFound(format!("player {id}")))?;
        let stored = player
            .reconnect_token
            .clone()
            .ok_or_else(|| EngineError::Conflict("no reconnect token".into()))?;
        tw_auth::verify(&stored, presented, now).map_err(|e| match e {
            tw_auth::AuthError::Expired => EngineError::TokenExpired,
            tw_auth::AuthError::Mismatch => EngineError::Conflict("token mismatch".into()),
        })?;
        let rotated = tw_auth::rotate();
        if let Some(p) = self.player_mut(id) {
            p.claimed_by = Some(client);
            p.reconnect_token = Some(rotated.clone());
        }
        Ok(rotated)
    }

    /// Best-effort cleanup when a transport connection drops.
    pub fn handle_client_disconnect(&mut self, client: &str) -> Vec<EngineEvent> {
        self.unclaim(client)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn to_public(&self) -> PublicState {
        PublicState {
            id: self.id.clone(),
            mode: self.mode,
            name: self.name.clone(),
            status: self.status,
            owner: self.owner.clone(),
            players: self.players.iter().map(Player::to_public).collect(),
            active_player: self.active_player,
            interrupt_stack: self.interrupt_stack.clone(),
            targeting: self.targeting.clone(),
            winner: self.winner,
            settings: self.settings.clone(),
            campaign: self.campaign.clone(),
        }
    }
}

/// Public `state` broadcast: no tokens/expiries, matching §6's "players
/// without tokens/expiries" requirement.
#[derive(Clone, Debug, Serialize)]
pub struct PublicState {
    pub id: SessionId,
    pub mode: SessionMode,
    pub name: String,
    pub status: SessionStatus,
    pub owner: Option<ClientId>,
    pub players: Vec<PublicPlayer>,
    pub active_player: Option<PlayerId>,
    pub interrupt_stack: Vec<PlayerId>,
    pub targeting: Targeting,
    pub winner: Option<PlayerId>,
    pub settings: Settings,
    pub campaign: Option<CampaignState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(player_count: u32, initial_time: Millis) -> Settings {
        Settings {
            player_count,
            initial_time,
            ..Settings::default()
        }
    }

    #[test]
    fn scenario_turn_clock_with_bonus() {
        let mut s = settings(2, 60_000);
        s.bonus_time = 5_000;
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        session.tick(1100);
        session.switch_player(2, 1100).unwrap();
        let p1 = session.player_ref(1).unwrap();
        let p2 = session.player_ref(2).unwrap();
        assert!((p1.time_remaining - 58900).abs() <= 200);
        assert_eq!(p2.time_remaining, 65_000);
        assert_eq!(session.active_player, Some(2));
    }

    #[test]
    fn scenario_warning_threshold_fires_once() {
        let mut s = settings(2, 31_000);
        s.warning_thresholds = vec![30_000];
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        let events = session.tick(1200);
        let warnings = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::Warning { player_id: 1, threshold: 30_000 }))
            .count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn scenario_timeout_choice_gain_drunk() {
        let mut s = settings(2, 100);
        s.timeout_grace_period = 5_000;
        s.timeout_bonus_time = 30_000;
        s.timeout_penalty_drunk = 2;
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        let events = session.tick(250);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::TimeoutChoice { player_id: 1, drunk_gain: 2, .. }
        )));
        session
            .resolve_timeout_choice(1, TimeoutChoice::GainDrunk, 260)
            .unwrap();
        let p1 = session.player_ref(1).unwrap();
        assert!(!p1.timeout_pending);
        assert_eq!(p1.time_remaining, 30_000);
        assert_eq!(p1.drunk_counter, 2);
        assert!(!p1.is_eliminated);
    }

    #[test]
    fn scenario_winner_on_last_player_standing() {
        let s = settings(2, 60_000);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        let events = session.eliminate(1).unwrap();
        assert_eq!(session.status, SessionStatus::Finished);
        assert_eq!(session.winner, Some(2));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::GameComplete { winner_id: Some(2) })));
    }

    #[test]
    fn scenario_wastelands_scoring() {
        let s = settings(2, 60_000);
        let mut session =
            Session::new("ABCDEF".into(), s, None, 0, Some(CampaignPreset::Wastelands)).unwrap();
        session.start(0).unwrap();
        session.active_player = Some(1);
        session
            .update_player(
                2,
                PlayerPatch {
                    life: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();
        let campaign = session.campaign.as_ref().unwrap();
        assert_eq!(campaign.player_points.get(&1), Some(&10));
        assert_eq!(campaign.player_levels.get(&1), Some(&2));
    }

    #[test]
    fn wastelands_campaign_grants_the_preset_turn_bonus() {
        let s = settings(2, 60_000);
        let mut session =
            Session::new("ABCDEF".into(), s, None, 0, Some(CampaignPreset::Wastelands)).unwrap();
        assert_eq!(session.settings.bonus_time, 30_000);
        session.start(0).unwrap();
        let before = session.player_ref(2).unwrap().time_remaining;
        session.switch_player(2, 0).unwrap();
        let after = session.player_ref(2).unwrap().time_remaining;
        assert_eq!(after, before + 30_000);
    }

    #[test]
    fn casual_session_keeps_the_caller_supplied_bonus_time() {
        let mut s = settings(2, 60_000);
        s.bonus_time = 5_000;
        let session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        assert_eq!(session.settings.bonus_time, 5_000);
    }

    #[test]
    fn scenario_targeting_ticks_both_targets() {
        let s = settings(4, 60_000);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        session.active_player = Some(1);
        session.start_target_selection().unwrap();
        session.toggle_target(2).unwrap();
        session.toggle_target(3).unwrap();
        session.confirm_targets().unwrap();
        assert_eq!(session.active_player, Some(1));
        session.tick(100);
        let p1 = session.player_ref(1).unwrap().time_remaining;
        let p2 = session.player_ref(2).unwrap().time_remaining;
        let p3 = session.player_ref(3).unwrap().time_remaining;
        assert_eq!(p1, 60_000);
        assert!((p2 - 59_900).abs() <= 5);
        assert!((p3 - 59_900).abs() <= 5);
    }

    #[test]
    fn revive_non_eliminated_player_is_a_no_op() {
        let s = settings(2, 60_000);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        let events = session.revive_player(1).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn interrupt_push_then_pop_restores_stack() {
        let s = settings(2, 60_000);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        let before = session.interrupt_stack.clone();
        session.interrupt(1).unwrap();
        session.pass_priority(1).unwrap();
        assert_eq!(session.interrupt_stack, before);
    }

    #[test]
    fn claim_unclaim_claim_yields_fresh_tokens() {
        let s = settings(2, 60_000);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        let first = session.claim(1, "client-a".into()).unwrap();
        session.unclaim("client-a");
        let second = session.claim(1, "client-a".into()).unwrap();
        assert_ne!(first.value, second.value);
    }

    #[test]
    fn time_remaining_floors_at_zero() {
        let s = settings(2, 50);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        session.tick(1000);
        assert_eq!(session.player_ref(1).unwrap().time_remaining, 0);
    }

    #[test]
    fn elimination_advances_to_next_after_by_id_wrapping() {
        let s = settings(4, 60_000);
        let mut session = Session::new("ABCDEF".into(), s, None, 0, None).unwrap();
        session.start(0).unwrap();
        session.active_player = Some(4);
        session.eliminate(4).unwrap();
        assert_eq!(session.active_player, Some(1));
    }
}
