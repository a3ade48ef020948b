use serde::Deserialize;
use serde::Serialize;
use tw_core::PlayerId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetingPhase {
    #[default]
    None,
    Selecting,
    Resolving,
}

/// Targeting sub-state machine: `none -> selecting -> resolving -> none`.
///
/// During `resolving`, `activePlayer` on the owning session stays pinned to
/// `original_active_player` while every id in `awaiting_priority` ticks
/// simultaneously (see `Session::tick`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Targeting {
    pub phase: TargetingPhase,
    pub targeted_players: Vec<PlayerId>,
    pub awaiting_priority: Vec<PlayerId>,
    pub original_active_player: Option<PlayerId>,
}

impl Targeting {
    pub fn is_none(&self) -> bool {
        self.phase == TargetingPhase::None
    }
    pub fn is_selecting(&self) -> bool {
        self.phase == TargetingPhase::Selecting
    }
    pub fn is_resolving(&self) -> bool {
        self.phase == TargetingPhase::Resolving
    }

    pub fn start_selection(&mut self) {
        self.phase = TargetingPhase::Selecting;
        self.targeted_players.clear();
    }

    pub fn toggle_target(&mut self, id: PlayerId) {
        if let Some(pos) = self.targeted_players.iter().position(|&p| p == id) {
            self.targeted_players.remove(pos);
        } else {
            self.targeted_players.push(id);
        }
    }

    pub fn confirm(&mut self, active_player: PlayerId) {
        self.original_active_player = Some(active_player);
        self.awaiting_priority = self.targeted_players.clone();
        self.phase = TargetingPhase::Resolving;
    }

    /// Removes `id` from `awaiting_priority`; returns true if resolution completed.
    pub fn pass_priority(&mut self, id: PlayerId) -> bool {
        self.awaiting_priority.retain(|&p| p != id);
        if self.awaiting_priority.is_empty() {
            self.complete();
            true
        } else {
            false
        }
    }

    /// Removes an eliminated target from both tracking lists; returns true if resolution completed.
    pub fn handle_eliminated_target(&mut self, id: PlayerId) -> bool {
        self.targeted_players.retain(|&p| p != id);
        if !self.is_resolving() {
            return false;
        }
        self.awaiting_priority.retain(|&p| p != id);
        if self.awaiting_priority.is_empty() {
            self.complete();
            true
        } else {
            false
        }
    }

    fn complete(&mut self) {
        self.phase = TargetingPhase::None;
        self.targeted_players.clear();
        self.awaiting_priority.clear();
        self.original_active_player = None;
    }

    /// Cancel from any non-`none` state, returning the active player to restore.
    pub fn cancel(&mut self) -> Option<PlayerId> {
        let restore = self.original_active_player;
        self.phase = TargetingPhase::None;
        self.targeted_players.clear();
        self.awaiting_priority.clear();
        self.original_active_player = None;
        restore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_twice_is_a_no_op() {
        let mut t = Targeting::default();
        t.start_selection();
        t.toggle_target(2);
        t.toggle_target(2);
        assert!(t.targeted_players.is_empty());
    }

    #[test]
    fn confirm_freezes_awaiting_priority_and_keeps_active_player_external() {
        let mut t = Targeting::default();
        t.start_selection();
        t.toggle_target(2);
        t.toggle_target(3);
        t.confirm(1);
        assert_eq!(t.original_active_player, Some(1));
        assert_eq!(t.awaiting_priority, vec![2, 3]);
        assert!(t.is_resolving());
    }

    #[test]
    fn pass_priority_completes_when_empty() {
        let mut t = Targeting::default();
        t.start_selection();
        t.toggle_target(2);
        t.confirm(1);
        assert!(t.pass_priority(2));
        assert!(t.is_none());
    }

    #[test]
    fn eliminated_target_removed_from_both_lists() {
        let mut t = Targeting::default();
        t.start_selection();
        t.toggle_target(2);
        t.toggle_target(3);
        t.confirm(1);
        assert!(!t.handle_eliminated_target(2));
        assert!(t.awaiting_priority == vec![3]);
        assert!(t.handle_eliminated_target(3));
        assert!(t.is_none());
    }
}
