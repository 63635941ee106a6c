use std::collections::{BTreeMap, BTreeSet};

use engine::{Registry, RegistryError, WorldId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::components::{ComponentKind, ComponentSet};
use super::types::Point;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    Player {
        name: String,
        is_local_player: bool,
    },
    Island {
        width: i32,
        height: i32,
        #[serde(skip)]
        tiles: BTreeMap<Point, WorldId>,
    },
    Settlement {
        island: WorldId,
        name: String,
        #[serde(skip)]
        buildings: BTreeSet<WorldId>,
    },
    Building {
        def: String,
        position: Point,
        island: WorldId,
        #[serde(default)]
        settlement: Option<WorldId>,
    },
    Unit {
        def: String,
        position: Point,
        island: WorldId,
    },
}

impl ObjectKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Player { .. } => "player",
            Self::Island { .. } => "island",
            Self::Settlement { .. } => "settlement",
            Self::Building { .. } => "building",
            Self::Unit { .. } => "unit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldObject {
    pub id: WorldId,
    #[serde(flatten)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub owner: Option<WorldId>,
    #[serde(default)]
    pub components: ComponentSet,
}

impl WorldObject {
    pub fn def_name(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Building { def, .. } | ObjectKind::Unit { def, .. } => Some(def),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<Point> {
        match self.kind {
            ObjectKind::Building { position, .. } | ObjectKind::Unit { position, .. } => {
                Some(position)
            }
            _ => None,
        }
    }

    pub fn island(&self) -> Option<WorldId> {
        match self.kind {
            ObjectKind::Building { island, .. }
            | ObjectKind::Unit { island, .. }
            | ObjectKind::Settlement { island, .. } => Some(island),
            ObjectKind::Island { .. } => Some(self.id),
            ObjectKind::Player { .. } => None,
        }
    }

    pub fn settlement(&self) -> Option<WorldId> {
        match self.kind {
            ObjectKind::Building { settlement, .. } => settlement,
            _ => None,
        }
    }

    pub fn is_building(&self) -> bool {
        matches!(self.kind, ObjectKind::Building { .. })
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.kind, ObjectKind::Unit { .. })
    }

    pub fn has<C: ComponentKind>(&self) -> bool {
        self.components.has::<C>()
    }

    pub fn get<C: ComponentKind>(&self) -> Option<&C> {
        self.components.get::<C>()
    }

    pub fn get_mut<C: ComponentKind>(&mut self) -> Option<&mut C> {
        self.components.get_mut::<C>()
    }
}

/// Every live object, keyed by worldid, plus the derived indices kept alongside them.
#[derive(Debug, Clone, Default)]
pub struct World {
    objects: Registry<WorldObject>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: WorldId) -> Result<&WorldObject, RegistryError> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: WorldId) -> Result<&mut WorldObject, RegistryError> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: WorldId) -> bool {
        self.objects.contains(id)
    }

    pub fn component<C: ComponentKind>(&self, id: WorldId) -> Option<&C> {
        self.objects.get(id).ok().and_then(|object| object.get::<C>())
    }

    pub fn component_mut<C: ComponentKind>(&mut self, id: WorldId) -> Option<&mut C> {
        self.objects
            .get_mut(id)
            .ok()
            .and_then(|object| object.get_mut::<C>())
    }

    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.iter().map(|(_, object)| object)
    }

    pub fn ids(&self) -> Vec<WorldId> {
        self.objects.ids()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn next_worldid(&self) -> u64 {
        self.objects.next_id()
    }

    pub fn position_of(&self, id: WorldId) -> Option<Point> {
        self.objects.get(id).ok().and_then(WorldObject::position)
    }

    pub fn is_local_player(&self, id: WorldId) -> bool {
        matches!(
            self.objects.get(id).map(|object| &object.kind),
            Ok(ObjectKind::Player {
                is_local_player: true,
                ..
            })
        )
    }

    pub fn is_owned_by_local_player(&self, id: WorldId) -> bool {
        self.objects
            .get(id)
            .ok()
            .and_then(|object| object.owner)
            .is_some_and(|owner| self.is_local_player(owner))
    }

    pub fn island_size(&self, island: WorldId) -> Option<(i32, i32)> {
        match self.objects.get(island).ok()?.kind {
            ObjectKind::Island { width, height, .. } => Some((width, height)),
            _ => None,
        }
    }

    pub fn island_contains(&self, island: WorldId, point: Point) -> bool {
        self.island_size(island).is_some_and(|(width, height)| {
            point.x >= 0 && point.y >= 0 && point.x < width && point.y < height
        })
    }

    pub fn tile_occupant(&self, island: WorldId, point: Point) -> Option<WorldId> {
        match &self.objects.get(island).ok()?.kind {
            ObjectKind::Island { tiles, .. } => tiles.get(&point).copied(),
            _ => None,
        }
    }

    /// Buildings of `settlement` in worldid order.
    pub fn settlement_buildings(&self, settlement: WorldId) -> Vec<WorldId> {
        match self.objects.get(settlement).map(|object| &object.kind) {
            Ok(ObjectKind::Settlement { buildings, .. }) => buildings.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn spawn(
        &mut self,
        kind: ObjectKind,
        owner: Option<WorldId>,
        components: ComponentSet,
    ) -> WorldId {
        let id = self.objects.insert_with(|id| WorldObject {
            id,
            kind,
            owner,
            components,
        });
        self.index_object(id);
        id
    }

    /// Registers an object that already carries its id, e.g. one read from a save.
    pub fn register(&mut self, object: WorldObject) -> Result<(), RegistryError> {
        let id = object.id;
        self.objects.register(id, object)?;
        Ok(())
    }

    /// Deregisters `id` and drops it from tile and settlement indices.
    pub fn despawn(&mut self, id: WorldId) -> Result<WorldObject, RegistryError> {
        let object = self.objects.remove(id)?;
        if let ObjectKind::Building {
            position,
            island,
            settlement,
            ..
        } = object.kind
        {
            if let Ok(ObjectKind::Island { tiles, .. }) =
                self.objects.get_mut(island).map(|island| &mut island.kind)
            {
                if tiles.get(&position) == Some(&id) {
                    tiles.remove(&position);
                }
            }
            if let Some(settlement) = settlement {
                if let Ok(ObjectKind::Settlement { buildings, .. }) =
                    self.objects.get_mut(settlement).map(|object| &mut object.kind)
                {
                    buildings.remove(&id);
                }
            }
        }
        Ok(object)
    }

    pub fn restore_next_worldid(&mut self, next_worldid: u64) {
        self.objects.restore_next_id(next_worldid);
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Rebuilds island tile occupancy and settlement building sets from the buildings.
    pub fn rebuild_derived_state(&mut self) {
        for (_, object) in self.objects.iter_mut() {
            match &mut object.kind {
                ObjectKind::Island { tiles, .. } => tiles.clear(),
                ObjectKind::Settlement { buildings, .. } => buildings.clear(),
                _ => {}
            }
        }
        for id in self.objects.ids() {
            self.index_object(id);
        }
    }

    fn index_object(&mut self, id: WorldId) {
        let Ok(object) = self.objects.get(id) else {
            return;
        };
        let ObjectKind::Building {
            position,
            island,
            settlement,
            ..
        } = object.kind
        else {
            return;
        };

        match self.objects.get_mut(island).map(|object| &mut object.kind) {
            Ok(ObjectKind::Island { tiles, .. }) => {
                if let Some(previous) = tiles.insert(position, id) {
                    if previous != id {
                        warn!(
                            worldid = id.0,
                            previous = previous.0,
                            x = position.x,
                            y = position.y,
                            "tile_occupancy_overwritten"
                        );
                    }
                }
            }
            _ => warn!(worldid = id.0, island = island.0, "building_island_missing"),
        }
        if let Some(settlement) = settlement {
            match self.objects.get_mut(settlement).map(|object| &mut object.kind) {
                Ok(ObjectKind::Settlement { buildings, .. }) => {
                    buildings.insert(id);
                }
                _ => warn!(
                    worldid = id.0,
                    settlement = settlement.0,
                    "building_settlement_missing"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::gameplay::components::{Selectable, Weapon};

    fn island_world() -> (World, WorldId, WorldId) {
        let mut world = World::new();
        let island = world.spawn(
            ObjectKind::Island {
                width: 8,
                height: 8,
                tiles: BTreeMap::new(),
            },
            None,
            ComponentSet::new(),
        );
        let settlement = world.spawn(
            ObjectKind::Settlement {
                island,
                name: "Harbor".to_string(),
                buildings: BTreeSet::new(),
            },
            None,
            ComponentSet::new(),
        );
        (world, island, settlement)
    }

    fn building(island: WorldId, settlement: WorldId, x: i32, y: i32) -> ObjectKind {
        ObjectKind::Building {
            def: "building.tree".to_string(),
            position: Point::new(x, y),
            island,
            settlement: Some(settlement),
        }
    }

    #[test]
    fn spawn_indexes_tiles_and_settlement() {
        let (mut world, island, settlement) = island_world();
        let tree = world.spawn(building(island, settlement, 2, 3), None, ComponentSet::new());

        assert_eq!(world.tile_occupant(island, Point::new(2, 3)), Some(tree));
        assert_eq!(world.settlement_buildings(settlement), vec![tree]);

        world.despawn(tree).expect("despawn");
        assert_eq!(world.tile_occupant(island, Point::new(2, 3)), None);
        assert!(world.settlement_buildings(settlement).is_empty());
        assert_eq!(
            world.get(tree).map(|_| ()),
            Err(RegistryError::NotFound { id: tree })
        );
    }

    #[test]
    fn rebuild_derived_state_restores_indices() {
        let (mut world, island, settlement) = island_world();
        let a = world.spawn(building(island, settlement, 1, 1), None, ComponentSet::new());
        let b = world.spawn(building(island, settlement, 4, 1), None, ComponentSet::new());
        if let ObjectKind::Island { tiles, .. } = &mut world.get_mut(island).expect("island").kind {
            tiles.clear();
        }

        world.rebuild_derived_state();
        assert_eq!(world.tile_occupant(island, Point::new(1, 1)), Some(a));
        assert_eq!(world.tile_occupant(island, Point::new(4, 1)), Some(b));
        assert_eq!(world.settlement_buildings(settlement), vec![a, b]);
    }

    #[test]
    fn local_ownership_follows_player_flag() {
        let (mut world, island, _) = island_world();
        let local = world.spawn(
            ObjectKind::Player {
                name: "me".to_string(),
                is_local_player: true,
            },
            None,
            ComponentSet::new(),
        );
        let rival = world.spawn(
            ObjectKind::Player {
                name: "rival".to_string(),
                is_local_player: false,
            },
            None,
            ComponentSet::new(),
        );
        let unit = || ObjectKind::Unit {
            def: "unit.soldier".to_string(),
            position: Point::new(0, 0),
            island,
        };
        let mine = world.spawn(
            unit(),
            Some(local),
            ComponentSet::new().with(Selectable::default()),
        );
        let theirs = world.spawn(
            unit(),
            Some(rival),
            ComponentSet::new().with(Weapon { damage: 1 }),
        );
        assert!(world.is_owned_by_local_player(mine));
        assert!(!world.is_owned_by_local_player(theirs));
        assert!(world.component::<Weapon>(theirs).is_some());
        assert!(world.component::<Weapon>(mine).is_none());
    }

    #[test]
    fn world_object_json_flattens_kind() {
        let (mut world, island, settlement) = island_world();
        let tree = world.spawn(building(island, settlement, 2, 2), None, ComponentSet::new());
        let raw = serde_json::to_string(world.get(tree).expect("tree")).expect("serialize");
        assert!(raw.contains("\"type\":\"building\""));
        let parsed: WorldObject = serde_json::from_str(&raw).expect("parse");
        assert_eq!(&parsed, world.get(tree).expect("tree"));
    }
}
