use serde::Deserialize;
use serde::Serialize;
use tw_core::MAX_PLAYERS;
use tw_core::MAX_TIME_MS;
use tw_core::MAX_WARNING_THRESHOLDS;
use tw_core::MIN_PLAYERS;
use tw_core::Millis;

use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyType {
    Warning,
    TimeDeduction,
    GameLoss,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub player_count: u32,
    pub initial_time: Millis,
    pub warning_thresholds: Vec<Millis>,
    pub penalty_type: PenaltyType,
    pub penalty_time_deduction: Millis,
    pub bonus_time: Millis,
    pub timeout_grace_period: Millis,
    pub timeout_penalty_lives: i32,
    pub timeout_penalty_drunk: i32,
    pub timeout_bonus_time: Millis,
    pub audio_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            player_count: 2,
            initial_time: 10 * 60 * 1000,
            warning_thresholds: vec![60_000],
            penalty_type: PenaltyType::Warning,
            penalty_time_deduction: 0,
            bonus_time: 0,
            timeout_grace_period: 10_000,
            timeout_penalty_lives: 1,
            timeout_penalty_drunk: 1,
            timeout_bonus_time: 0,
            audio_enabled: true,
        }
    }
}

impl Settings {
    /// Validate the full settings object at session creation.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&self.player_count) {
            return Err(EngineError::Validation(format!(
                "playerCount must be in [{MIN_PLAYERS}, {MAX_PLAYERS}]"
            )));
        }
        if self.initial_time <= 0 || self.initial_time > MAX_TIME_MS {
            return Err(EngineError::Validation(
                "initialTime must be a positive integer <= 24h".into(),
            ));
        }
        validate_warning_thresholds(&self.warning_thresholds)?;
        validate_time(self.bonus_time, "bonusTime")?;
        validate_time(self.timeout_bonus_time, "timeoutBonusTime")?;
        Ok(())
    }
}

pub fn validate_warning_thresholds(thresholds: &[Millis]) -> Result<(), EngineError> {
    if thresholds.is_empty() {
        return Err(EngineError::Validation(
            "warningThresholds must not be empty".into(),
        ));
    }
    if thresholds.len() > MAX_WARNING_THRESHOLDS {
        return Err(EngineError::Validation(format!(
            "warningThresholds accepts at most {MAX_WARNING_THRESHOLDS} entries"
        )));
    }
    if thresholds
        .iter()
        .any(|t| !t.is_positive() || *t > MAX_TIME_MS)
    {
        return Err(EngineError::Validation(
            "warningThresholds entries must be positive and <= 24h".into(),
        ));
    }
    Ok(())
}

pub fn validate_time(value: Millis, field: &str) -> Result<(), EngineError> {
    if value < 0 || value > MAX_TIME_MS {
        return Err(EngineError::Validation(format!(
            "{field} must be finite, non-negative, and <= 24h"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn rejects_player_count_out_of_range() {
        let mut s = Settings::default();
        s.player_count = 1;
        assert!(s.validate().is_err());
        s.player_count = 9;
        assert!(s.validate().is_err());
    }

    #[test]
    fn warning_thresholds_ten_ok_eleven_rejected() {
        let ten: Vec<Millis> = (1..=10).map(|n| n * 1000).collect();
        assert!(validate_warning_thresholds(&ten).is_ok());
        let eleven: Vec<Millis> = (1..=11).map(|n| n * 1000).collect();
        assert!(validate_warning_thresholds(&eleven).is_err());
        assert!(validate_warning_thresholds(&[]).is_err());
    }
}
