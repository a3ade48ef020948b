use serde::Deserialize;
use serde::Serialize;
use tw_auth::Token;
use tw_core::ClientId;
use tw_core::Epoch;
use tw_core::Millis;
use tw_core::PlayerId;
use tw_core::clamp_counter;
use tw_core::clamp_life;
use tw_core::clamp_time;

/// A seat `1..N` within a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub time_remaining: Millis,
    pub life: i32,
    pub drunk_counter: i32,
    pub generic_counter: i32,
    pub penalties: u32,
    pub is_eliminated: bool,
    pub claimed_by: Option<ClientId>,
    pub reconnect_token: Option<Token>,
    pub timeout_pending: bool,
    pub timeout_choice_deadline: Option<Epoch>,
    pub color: Option<String>,
}

impl Player {
    pub fn new(id: PlayerId, initial_time: Millis, starting_life: i32) -> Self {
        Self {
            id,
            name: format!("Player {id}"),
            time_remaining: clamp_time(initial_time),
            life: clamp_life(starting_life),
            drunk_counter: 0,
            generic_counter: 0,
            penalties: 0,
            is_eliminated: false,
            claimed_by: None,
            reconnect_token: None,
            timeout_pending: false,
            timeout_choice_deadline: None,
            color: None,
        }
    }

    pub fn set_time_remaining(&mut self, ms: Millis) {
        self.time_remaining = clamp_time(ms);
    }

    pub fn set_life(&mut self, life: i32) {
        self.life = clamp_life(life);
    }

    pub fn set_drunk_counter(&mut self, value: i32) {
        self.drunk_counter = clamp_counter(value);
    }

    pub fn set_generic_counter(&mut self, value: i32) {
        self.generic_counter = clamp_counter(value);
    }

    /// The subset of fields safe to send to every client: no token material.
    pub fn to_public(&self) -> PublicPlayer {
        PublicPlayer {
            id: self.id,
            name: self.name.clone(),
            time_remaining: self.time_remaining,
            life: self.life,
            drunk_counter: self.drunk_counter,
            generic_counter: self.generic_counter,
            is_eliminated: self.is_eliminated,
            claimed: self.claimed_by.is_some(),
            timeout_pending: self.timeout_pending,
            timeout_choice_deadline: self.timeout_choice_deadline,
            color: self.color.clone(),
        }
    }
}

/// Player view sent in the public `state` broadcast: no tokens, no expiries,
/// no raw client id (only whether the slot is claimed).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: PlayerId,
    pub name: String,
    pub time_remaining: Millis,
    pub life: i32,
    pub drunk_counter: i32,
    pub generic_counter: i32,
    pub is_eliminated: bool,
    pub claimed: bool,
    pub timeout_pending: bool,
    pub timeout_choice_deadline: Option<Epoch>,
    pub color: Option<String>,
}
