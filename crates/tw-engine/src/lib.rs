//! The session state machine: turn clocks, interrupts, targeting, the
//! optional campaign extension, and every operation a client command maps
//! onto. No transport, no persistence, no scheduling — `tw-coordinator`
//! serializes access per session and `tw-store` persists the result of
//! whatever this crate returns.

pub mod campaign;
pub mod error;
pub mod event;
pub mod player;
pub mod sanitize;
pub mod session;
pub mod settings;
pub mod targeting;

pub use campaign::CampaignPreset;
pub use campaign::CampaignState;
pub use error::EngineError;
pub use error::EngineResult;
pub use event::EngineEvent;
pub use player::Player;
pub use player::PublicPlayer;
pub use session::PlayerPatch;
pub use session::PublicState;
pub use session::Session;
pub use session::SessionMode;
pub use session::SessionStatus;
pub use session::SettingsPatch;
pub use session::TimeoutChoice;
pub use settings::PenaltyType;
pub use settings::Settings;
pub use targeting::Targeting;
pub use targeting::TargetingPhase;
