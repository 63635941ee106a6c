use std::fmt;
use std::str::FromStr;

use engine::{RegistryError, WorldId};
use tracing::info;

use super::commands::{Command, CommandError};
use super::session::Session;
use super::types::{ResourceAmount, ResourceId};

/// Ready-made starting layouts for headless runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Lumberjack,
    Hunter,
    Settler,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Self::Lumberjack, Self::Hunter, Self::Settler];

    pub fn name(self) -> &'static str {
        match self {
            Self::Lumberjack => "lumberjack",
            Self::Hunter => "hunter",
            Self::Settler => "settler",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == raw)
            .ok_or_else(|| {
                let known = Self::ALL.map(Scenario::name).join("|");
                format!("unknown scenario '{raw}' (expected {known})")
            })
    }
}

/// The interesting objects a scenario placed, so callers can inspect them later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioLayout {
    pub scenario: Scenario,
    pub buildings: Vec<WorldId>,
    pub units: Vec<WorldId>,
    pub settlement: Option<WorldId>,
}

pub fn setup(session: &mut Session, scenario: Scenario) -> Result<ScenarioLayout, CommandError> {
    let mut layout = ScenarioLayout {
        scenario,
        buildings: Vec::new(),
        units: Vec::new(),
        settlement: None,
    };
    match scenario {
        Scenario::Lumberjack => {
            for (x, y) in [(4, 4), (5, 4), (6, 5)] {
                layout.buildings.push(build(session, "building.tree", x, y, None)?);
            }
            layout
                .buildings
                .push(build(session, "building.lumberjack", 8, 8, None)?);
        }
        Scenario::Hunter => {
            layout
                .buildings
                .push(build(session, "building.hunter", 20, 20, None)?);
            for (x, y) in [(24, 22), (18, 25)] {
                layout.units.push(wild_animal(session, x, y)?);
            }
        }
        Scenario::Settler => {
            let settlement = Command::FoundSettlement {
                issuer: session.local_player(),
                island: session.main_island(),
                name: "Landing".to_string(),
            }
            .execute(session)?
            .spawned();
            layout.settlement = settlement;
            let main_square = build(session, "building.main_square", 30, 30, settlement)?;
            session.add_to_storage(
                main_square,
                ResourceAmount {
                    resource: ResourceId::Food,
                    amount: 40,
                },
            )?;
            layout.buildings.push(main_square);
            layout
                .buildings
                .push(build(session, "building.residential", 32, 30, settlement)?);
        }
    }
    info!(
        scenario = scenario.name(),
        buildings = layout.buildings.len(),
        units = layout.units.len(),
        "scenario_ready"
    );
    Ok(layout)
}

fn build(
    session: &mut Session,
    def: &str,
    x: i32,
    y: i32,
    settlement: Option<WorldId>,
) -> Result<WorldId, CommandError> {
    let outcome = Command::Build {
        issuer: session.local_player(),
        def: def.to_string(),
        x,
        y,
        island: session.main_island(),
        settlement,
    }
    .execute(session)?;
    spawned(outcome.spawned())
}

fn wild_animal(session: &mut Session, x: i32, y: i32) -> Result<WorldId, CommandError> {
    let outcome = Command::CreateUnit {
        issuer: None,
        island: session.main_island(),
        def: "unit.wild_animal".to_string(),
        x,
        y,
    }
    .execute(session)?;
    spawned(outcome.spawned())
}

fn spawned(id: Option<WorldId>) -> Result<WorldId, CommandError> {
    id.ok_or(CommandError::Registry(RegistryError::NotFound { id: WorldId(0) }))
}
