pub mod commands;
pub mod components;
pub mod defs;
pub mod save;
pub mod scenarios;
pub mod selection;
pub mod session;
pub mod systems;
pub mod types;
pub mod world;

pub use commands::{Command, CommandError, CommandOutcome};
pub use defs::{DefsError, GameDefs};
pub use save::{SaveGame, SAVE_VERSION};
pub use scenarios::{Scenario, ScenarioLayout};
pub use session::{
    load_session, load_session_with, new_session, new_session_with, Session, SessionConfig,
    SessionError,
};
pub use types::{Hud, Lifecycle, MenuState, Point, ResourceAmount, ResourceId, RunLength, ToolKind};
pub use world::{ObjectKind, World, WorldObject};

#[cfg(test)]
mod tests;
