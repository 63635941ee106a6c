use std::collections::BTreeSet;

use engine::{ObjectClass, RegistryError, Vec2, WorldId};
use thiserror::Error;
use tracing::{debug, info};

use super::components::{Collector, ComponentSet, Producer, Walker};
use super::session::Session;
use super::systems;
use super::types::Point;
use super::world::ObjectKind;

/// Player and script orders. Every order is validated against the live world before it touches it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Build {
        issuer: WorldId,
        def: String,
        x: i32,
        y: i32,
        island: WorldId,
        settlement: Option<WorldId>,
    },
    FoundSettlement {
        issuer: WorldId,
        island: WorldId,
        name: String,
    },
    CreateUnit {
        issuer: Option<WorldId>,
        island: WorldId,
        def: String,
        x: i32,
        y: i32,
    },
    Act {
        issuer: WorldId,
        unit: WorldId,
        x: f32,
        y: f32,
    },
    ToggleActive {
        building: WorldId,
    },
    SetActive {
        building: WorldId,
        active: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Spawned(WorldId),
    Moving { unit: WorldId, destination: Point },
    ActiveChanged { building: WorldId, active: bool },
}

impl CommandOutcome {
    pub fn spawned(self) -> Option<WorldId> {
        match self {
            Self::Spawned(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("session has ended")]
    SessionEnded,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("unknown def '{def}'")]
    UnknownDef { def: String },
    #[error("def '{def}' is not a {expected:?}")]
    WrongClass { def: String, expected: ObjectClass },
    #[error("worldid {id} is not a {expected}")]
    WrongKind { id: WorldId, expected: &'static str },
    #[error("tile ({x}, {y}) is outside island {island}")]
    OutOfBounds { island: WorldId, x: i32, y: i32 },
    #[error("tile ({x}, {y}) on island {island} is occupied by {occupant}")]
    TileOccupied {
        island: WorldId,
        x: i32,
        y: i32,
        occupant: WorldId,
    },
    #[error("settlement {settlement} is not on island {island}")]
    SettlementElsewhere { settlement: WorldId, island: WorldId },
    #[error("unit {unit} is not owned by player {issuer}")]
    NotOwner { unit: WorldId, issuer: WorldId },
    #[error("unit {unit} cannot be moved")]
    NotMovable { unit: WorldId },
    #[error("target ({x}, {y}) is not a valid world location")]
    InvalidTarget { x: f32, y: f32 },
    #[error("building {building} has no production")]
    NoProducer { building: WorldId },
}

impl Command {
    pub fn execute(self, session: &mut Session) -> Result<CommandOutcome, CommandError> {
        if !session.is_running() {
            return Err(CommandError::SessionEnded);
        }
        let outcome = match self {
            Self::Build {
                issuer,
                def,
                x,
                y,
                island,
                settlement,
            } => build(session, issuer, &def, Point::new(x, y), island, settlement),
            Self::FoundSettlement {
                issuer,
                island,
                name,
            } => found_settlement(session, issuer, island, name),
            Self::CreateUnit {
                issuer,
                island,
                def,
                x,
                y,
            } => create_unit(session, issuer, island, &def, Point::new(x, y)),
            Self::Act { issuer, unit, x, y } => act(session, issuer, unit, Vec2 { x, y }),
            Self::ToggleActive { building } => {
                let active = session
                    .world()
                    .component::<Producer>(building)
                    .map(Producer::is_active);
                match active {
                    Some(active) => set_active(session, building, !active),
                    None => Err(missing_producer(session, building)),
                }
            }
            Self::SetActive { building, active } => set_active(session, building, active),
        }?;
        debug!(outcome = ?outcome, "command_executed");
        Ok(outcome)
    }
}

fn missing_producer(session: &Session, building: WorldId) -> CommandError {
    match session.world().get(building) {
        Ok(_) => CommandError::NoProducer { building },
        Err(error) => error.into(),
    }
}

fn require_player(session: &Session, id: WorldId) -> Result<(), CommandError> {
    match session.world().get(id)?.kind {
        ObjectKind::Player { .. } => Ok(()),
        _ => Err(CommandError::WrongKind {
            id,
            expected: "player",
        }),
    }
}

fn require_tile(session: &Session, island: WorldId, point: Point) -> Result<(), CommandError> {
    match session.world().get(island)?.kind {
        ObjectKind::Island { .. } => {}
        _ => {
            return Err(CommandError::WrongKind {
                id: island,
                expected: "island",
            })
        }
    }
    if !session.world().island_contains(island, point) {
        return Err(CommandError::OutOfBounds {
            island,
            x: point.x,
            y: point.y,
        });
    }
    Ok(())
}

fn build(
    session: &mut Session,
    issuer: WorldId,
    def: &str,
    position: Point,
    island: WorldId,
    settlement: Option<WorldId>,
) -> Result<CommandOutcome, CommandError> {
    require_player(session, issuer)?;
    require_tile(session, island, position)?;
    if let Some(occupant) = session.world().tile_occupant(island, position) {
        return Err(CommandError::TileOccupied {
            island,
            x: position.x,
            y: position.y,
            occupant,
        });
    }
    if let Some(settlement) = settlement {
        match session.world().get(settlement)?.kind {
            ObjectKind::Settlement {
                island: settlement_island,
                ..
            } if settlement_island == island => {}
            ObjectKind::Settlement { .. } => {
                return Err(CommandError::SettlementElsewhere { settlement, island })
            }
            _ => {
                return Err(CommandError::WrongKind {
                    id: settlement,
                    expected: "settlement",
                })
            }
        }
    }

    let (defs, mut ctx) = session.sim_parts();
    let template = defs.template(def).ok_or_else(|| CommandError::UnknownDef {
        def: def.to_string(),
    })?;
    if template.class() != ObjectClass::Building {
        return Err(CommandError::WrongClass {
            def: def.to_string(),
            expected: ObjectClass::Building,
        });
    }
    let building =
        systems::spawn_building(&mut ctx, template, Some(issuer), island, settlement, position);
    Ok(CommandOutcome::Spawned(building))
}

fn found_settlement(
    session: &mut Session,
    issuer: WorldId,
    island: WorldId,
    name: String,
) -> Result<CommandOutcome, CommandError> {
    require_player(session, issuer)?;
    if !matches!(session.world().get(island)?.kind, ObjectKind::Island { .. }) {
        return Err(CommandError::WrongKind {
            id: island,
            expected: "island",
        });
    }
    let (_, ctx) = session.sim_parts();
    let settlement = ctx.world.spawn(
        ObjectKind::Settlement {
            island,
            name,
            buildings: BTreeSet::new(),
        },
        Some(issuer),
        ComponentSet::new(),
    );
    info!(
        worldid = settlement.0,
        island = island.0,
        "settlement_founded"
    );
    Ok(CommandOutcome::Spawned(settlement))
}

fn create_unit(
    session: &mut Session,
    issuer: Option<WorldId>,
    island: WorldId,
    def: &str,
    position: Point,
) -> Result<CommandOutcome, CommandError> {
    if let Some(issuer) = issuer {
        require_player(session, issuer)?;
    }
    require_tile(session, island, position)?;
    let (defs, mut ctx) = session.sim_parts();
    let template = defs.template(def).ok_or_else(|| CommandError::UnknownDef {
        def: def.to_string(),
    })?;
    if template.class() != ObjectClass::Unit {
        return Err(CommandError::WrongClass {
            def: def.to_string(),
            expected: ObjectClass::Unit,
        });
    }
    let unit = systems::spawn_unit(&mut ctx, template, issuer, island, position);
    Ok(CommandOutcome::Spawned(unit))
}

fn act(
    session: &mut Session,
    issuer: WorldId,
    unit: WorldId,
    target: Vec2,
) -> Result<CommandOutcome, CommandError> {
    let object = session.world().get(unit)?;
    if object.owner != Some(issuer) {
        return Err(CommandError::NotOwner { unit, issuer });
    }
    let island = match object.kind {
        ObjectKind::Unit { island, .. } => island,
        _ => {
            return Err(CommandError::WrongKind {
                id: unit,
                expected: "unit",
            })
        }
    };
    if !object.has::<Walker>() || object.has::<Collector>() {
        return Err(CommandError::NotMovable { unit });
    }
    let destination = Point::from_world(target).ok_or(CommandError::InvalidTarget {
        x: target.x,
        y: target.y,
    })?;
    require_tile(session, island, destination)?;

    let (_, mut ctx) = session.sim_parts();
    systems::start_walk(&mut ctx, unit, destination)?;
    Ok(CommandOutcome::Moving { unit, destination })
}

fn set_active(
    session: &mut Session,
    building: WorldId,
    active: bool,
) -> Result<CommandOutcome, CommandError> {
    let (_, mut ctx) = session.sim_parts();
    if !systems::set_active(&mut ctx, building, active)? {
        return Err(CommandError::NoProducer { building });
    }
    Ok(CommandOutcome::ActiveChanged { building, active })
}
