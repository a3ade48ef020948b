use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use tw_core::ClientId;
use tw_core::Millis;
use tw_core::PlayerId;
use tw_core::Round;

/// Named campaign configuration. Functions (the scoring formula) are *not*
/// data on `CampaignConfig` — they are dispatched from this tag via
/// `score_player`, so there is nothing non-serializable to strip on persist
/// and nothing to re-attach on restore beyond the tag itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignPreset {
    Standard,
    Blitz,
    Endurance,
    Wastelands,
}

impl CampaignPreset {
    pub fn config(self) -> CampaignConfig {
        match self {
            CampaignPreset::Standard => CampaignConfig {
                rounds: 5,
                time_per_round: 10 * 60_000,
                time_decrease_per_round: 60_000,
                min_time: 5 * 60_000,
                starting_life: 20,
                bonus_time: 0,
                win_condition: WinCondition::BestOf,
                win_target: Some(3),
                battle_multipliers: HashMap::new(),
                player_multipliers: HashMap::new(),
                level_thresholds: Vec::new(),
            },
            CampaignPreset::Blitz => CampaignConfig {
                rounds: 7,
                time_per_round: 5 * 60_000,
                time_decrease_per_round: 30_000,
                min_time: 2 * 60_000,
                starting_life: 20,
                bonus_time: 0,
                win_condition: WinCondition::FirstTo,
                win_target: Some(4),
                battle_multipliers: HashMap::new(),
                player_multipliers: HashMap::new(),
                level_thresholds: Vec::new(),
            },
            CampaignPreset::Endurance => CampaignConfig {
                rounds: 10,
                time_per_round: 15 * 60_000,
                time_decrease_per_round: 0,
                min_time: 15 * 60_000,
                starting_life: 20,
                bonus_time: 0,
                win_condition: WinCondition::TotalTime,
                win_target: None,
                battle_multipliers: HashMap::new(),
                player_multipliers: HashMap::new(),
                level_thresholds: Vec::new(),
            },
            CampaignPreset::Wastelands => CampaignConfig {
                rounds: 3,
                time_per_round: 6 * 60_000,
                time_decrease_per_round: 0,
                min_time: 6 * 60_000,
                starting_life: 20,
                bonus_time: 30_000,
                win_condition: WinCondition::TotalPoints,
                win_target: None,
                battle_multipliers: HashMap::from([(1, 1.0), (2, 1.2), (3, 1.5)]),
                player_multipliers: HashMap::from([
                    (1, 1.0),
                    (2, 1.5),
                    (3, 2.0),
                    (4, 2.5),
                    (5, 3.0),
                ]),
                level_thresholds: vec![10, 25, 50, 100, 200],
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinCondition {
    BestOf,
    FirstTo,
    TotalTime,
    TotalPoints,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub rounds: Round,
    pub time_per_round: Millis,
    pub time_decrease_per_round: Millis,
    pub min_time: Millis,
    pub starting_life: i32,
    /// `bonusTime` per turn, added on `switchPlayer`; only wastelands sets one.
    pub bonus_time: Millis,
    pub win_condition: WinCondition,
    pub win_target: Option<u32>,
    pub battle_multipliers: HashMap<Round, f64>,
    pub player_multipliers: HashMap<u32, f64>,
    pub level_thresholds: Vec<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    InProgress,
    Completed,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub wins: u32,
    pub losses: u32,
    pub total_time_used: Millis,
    pub penalties: u32,
    pub eliminations: u32,
    pub accumulated_points: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundPlayerResult {
    pub time_used: Millis,
    pub penalties: u32,
    pub is_eliminated: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: Round,
    pub winner_id: Option<PlayerId>,
    pub player_results: HashMap<PlayerId, RoundPlayerResult>,
}

/// Cross-round campaign state composed onto a `Session` when `mode ==
/// Campaign`. Damage attribution, scoring, and round advancement live here;
/// the base session owns timers, turns, interrupts, and targeting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CampaignState {
    pub preset: CampaignPreset,
    pub config: CampaignConfig,
    pub current_round: Round,
    pub max_rounds: Round,
    pub player_stats: HashMap<PlayerId, PlayerStats>,
    pub round_history: Vec<RoundRecord>,
    pub damage_tracker: HashMap<PlayerId, HashMap<PlayerId, i64>>,
    pub player_points: HashMap<PlayerId, i64>,
    pub player_levels: HashMap<PlayerId, u32>,
    pub player_names: HashMap<PlayerId, String>,
    pub player_claims: HashMap<PlayerId, ClientId>,
    pub status: CampaignStatus,
    pub winner: Option<PlayerId>,
}

impl CampaignState {
    pub fn new(preset: CampaignPreset, player_ids: &[PlayerId]) -> Self {
        let config = preset.config();
        let max_rounds = config.rounds;
        let mut player_stats = HashMap::new();
        for &id in player_ids {
            player_stats.insert(id, PlayerStats::default());
        }
        Self {
            preset,
            config,
            current_round: 1,
            max_rounds,
            player_stats,
            round_history: Vec::new(),
            damage_tracker: HashMap::new(),
            player_points: HashMap::new(),
            player_levels: HashMap::new(),
            player_names: HashMap::new(),
            player_claims: HashMap::new(),
            status: CampaignStatus::InProgress,
            winner: None,
        }
    }

    /// `timePerRound` decreasing each round, floored at `minTime`.
    pub fn time_for_round(&self) -> Millis {
        let elapsed_rounds = self.current_round.saturating_sub(1) as Millis;
        let decreased = self.config.time_per_round
            - elapsed_rounds * self.config.time_decrease_per_round;
        decreased.max(self.config.min_time)
    }

    pub fn unique_target_count(&self, attacker: PlayerId) -> u32 {
        self.damage_tracker
            .get(&attacker)
            .map(|targets| targets.values().filter(|&&d| d > 0).count() as u32)
            .unwrap_or(0)
    }

    fn score_player(&self, p: PlayerId) -> i64 {
        let accumulated = self
            .player_stats
            .get(&p)
            .map(|s| s.accumulated_points)
            .unwrap_or(0);
        match self.preset {
            CampaignPreset::Wastelands => {
                let total_damage: i64 = self
                    .damage_tracker
                    .get(&p)
                    .map(|targets| targets.values().sum())
                    .unwrap_or(0);
                let unique = self.unique_target_count(p);
                let player_mult = self.config.player_multipliers.get(&unique).copied().unwrap_or(1.0);
                let battle_mult = self
                    .config
                    .battle_multipliers
                    .get(&self.current_round)
                    .copied()
                    .unwrap_or(1.0);
                accumulated + ((total_damage as f64) * player_mult * battle_mult).floor() as i64
            }
            _ => accumulated,
        }
    }

    /// `forall p: playerPoints[p] == scoringFormula(campaign, p)` afterward.
    pub fn recalculate_all_scores(&mut self, player_ids: &[PlayerId]) {
        for &p in player_ids {
            let points = self.score_player(p);
            self.player_points.insert(p, points);
            let level = 1 + self
                .config
                .level_thresholds
                .iter()
                .filter(|&&t| t <= points)
                .count() as u32;
            self.player_levels.insert(p, level);
        }
    }

    /// Damage hook: credits the *acting* player (interrupt top, or the
    /// original active player during targeting resolution, or else the plain
    /// active player), never the victim themselves.
    pub fn on_player_life_changed(
        &mut self,
        status_is_running: bool,
        acting: Option<PlayerId>,
        victim: PlayerId,
        old_life: i32,
        new_life: i32,
        player_ids: &[PlayerId],
    ) {
        if new_life >= old_life || !status_is_running {
            return;
        }
        let Some(acting) = acting else { return };
        if acting == victim {
            return;
        }
        let damage = (old_life - new_life) as i64;
        *self
            .damage_tracker
            .entry(acting)
            .or_default()
            .entry(victim)
            .or_insert(0) += damage;
        self.recalculate_all_scores(player_ids);
    }

    pub fn finalize_round_scoring(&mut self, player_ids: &[PlayerId]) {
        self.recalculate_all_scores(player_ids);
        for &p in player_ids {
            if let Some(points) = self.player_points.get(&p).copied() {
                self.player_stats.entry(p).or_default().accumulated_points = points;
            }
        }
        self.damage_tracker.clear();
    }

    pub fn record_round(
        &mut self,
        winner_id: Option<PlayerId>,
        results: HashMap<PlayerId, RoundPlayerResult>,
    ) {
        for (&p, result) in &results {
            let stats = self.player_stats.entry(p).or_default();
            stats.total_time_used += result.time_used;
            stats.penalties += result.penalties;
            if result.is_eliminated {
                stats.eliminations += 1;
            }
            if Some(p) == winner_id {
                stats.wins += 1;
            } else {
                stats.losses += 1;
            }
        }
        self.round_history.push(RoundRecord {
            round: self.current_round,
            winner_id,
            player_results: results,
        });
    }

    pub fn advance_round(&mut self) {
        self.current_round += 1;
    }

    /// Evaluate the configured win condition; `None` until it is decided.
    pub fn check_campaign_complete(&self, player_ids: &[PlayerId]) -> Option<Option<PlayerId>> {
        match self.config.win_condition {
            WinCondition::BestOf | WinCondition::FirstTo => {
                let target = self.config.win_target.unwrap_or(u32::MAX);
                player_ids
                    .iter()
                    .find(|&&p| self.player_stats.get(&p).map(|s| s.wins).unwrap_or(0) >= target)
                    .map(|&p| Some(Some(p)))
                    .unwrap_or(self.fallback_if_rounds_exhausted(player_ids))
            }
            WinCondition::TotalTime => {
                if self.current_round > self.max_rounds {
                    Some(
                        player_ids
                            .iter()
                            .min_by_key(|&&p| {
                                self.player_stats
                                    .get(&p)
                                    .map(|s| s.total_time_used)
                                    .unwrap_or(0)
                            })
                            .copied(),
                    )
                } else {
                    None
                }
            }
            WinCondition::TotalPoints => {
                if self.current_round > self.max_rounds {
                    Some(
                        player_ids
                            .iter()
                            .max_by_key(|&&p| self.player_points.get(&p).copied().unwrap_or(0))
                            .copied(),
                    )
                } else {
                    None
                }
            }
        }
    }

    fn fallback_if_rounds_exhausted(&self, player_ids: &[PlayerId]) -> Option<Option<PlayerId>> {
        if self.current_round > self.max_rounds {
            Some(
                player_ids
                    .iter()
                    .max_by_key(|&&p| self.player_stats.get(&p).map(|s| s.wins).unwrap_or(0))
                    .copied(),
            )
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wastelands_scoring_matches_single_target_example() {
        let mut campaign = CampaignState::new(CampaignPreset::Wastelands, &[1, 2]);
        campaign.on_player_life_changed(true, Some(1), 2, 10, 0, &[1, 2]);
        assert_eq!(campaign.player_points.get(&1), Some(&10));
        assert_eq!(campaign.player_levels.get(&1), Some(&2));
    }

    #[test]
    fn self_damage_is_not_credited() {
        let mut campaign = CampaignState::new(CampaignPreset::Wastelands, &[1, 2]);
        campaign.on_player_life_changed(true, Some(1), 1, 10, 0, &[1, 2]);
        assert!(campaign.damage_tracker.get(&1).is_none());
    }

    #[test]
    fn finalize_round_scoring_wipes_damage_tracker() {
        let mut campaign = CampaignState::new(CampaignPreset::Wastelands, &[1, 2]);
        campaign.on_player_life_changed(true, Some(1), 2, 10, 0, &[1, 2]);
        campaign.finalize_round_scoring(&[1, 2]);
        assert!(campaign.damage_tracker.is_empty());
        assert_eq!(campaign.player_stats.get(&1).unwrap().accumulated_points, 10);
    }

    #[test]
    fn total_time_condition_only_resolves_after_rounds_exhausted() {
        let mut campaign = CampaignState::new(CampaignPreset::Endurance, &[1, 2]);
        assert_eq!(campaign.check_campaign_complete(&[1, 2]), None);
        campaign.current_round = campaign.max_rounds + 1;
        campaign.player_stats.get_mut(&1).unwrap().total_time_used = 100;
        campaign.player_stats.get_mut(&2).unwrap().total_time_used = 500;
        assert_eq!(campaign.check_campaign_complete(&[1, 2]), Some(Some(1)));
    }
}
