use std::collections::{BTreeMap, VecDeque};

use engine::WorldId;
use serde::{Deserialize, Serialize};

use super::types::{Point, ResourceAmount, ResourceId};

pub const COLLECTOR_SEARCH_INTERVAL_TICKS: u64 = 16;
pub const SETTLER_MAX_UNSUPPLIED: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentTag {
    Selectable,
    Storage,
    Collecting,
    Producer,
    Collector,
    Walker,
    Wildlife,
    Settler,
    Weapon,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectable {
    #[serde(skip)]
    pub selected: bool,
}

impl Selectable {
    pub fn select(&mut self) {
        self.selected = true;
    }

    pub fn deselect(&mut self) {
        self.selected = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: BTreeMap<ResourceId, u32>,
    limit_per_slot: u32,
}

impl Inventory {
    pub fn new(limit_per_slot: u32) -> Self {
        Self {
            slots: BTreeMap::new(),
            limit_per_slot,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit_per_slot
    }

    pub fn amount(&self, resource: ResourceId) -> u32 {
        self.slots.get(&resource).copied().unwrap_or(0)
    }

    pub fn free_space(&self, resource: ResourceId) -> u32 {
        self.limit_per_slot.saturating_sub(self.amount(resource))
    }

    /// Adds up to `amount`, returns what fit.
    pub fn add(&mut self, resource: ResourceId, amount: u32) -> u32 {
        let added = amount.min(self.free_space(resource));
        if added > 0 {
            *self.slots.entry(resource).or_insert(0) += added;
        }
        added
    }

    /// Removes up to `amount`, returns what was there.
    pub fn remove(&mut self, resource: ResourceId, amount: u32) -> u32 {
        let current = self.amount(resource);
        let removed = amount.min(current);
        if removed == current {
            self.slots.remove(&resource);
        } else {
            self.slots.insert(resource, current - removed);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, u32)> + '_ {
        self.slots.iter().map(|(resource, amount)| (*resource, *amount))
    }
}

/// Inventory plus amounts promised to collectors that are on their way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub inventory: Inventory,
    #[serde(default)]
    pub reservations: BTreeMap<ResourceId, u32>,
}

impl Storage {
    pub fn new(limit_per_slot: u32) -> Self {
        Self {
            inventory: Inventory::new(limit_per_slot),
            reservations: BTreeMap::new(),
        }
    }

    pub fn reserved(&self, resource: ResourceId) -> u32 {
        self.reservations.get(&resource).copied().unwrap_or(0)
    }

    pub fn available(&self, resource: ResourceId) -> u32 {
        self.inventory
            .amount(resource)
            .saturating_sub(self.reserved(resource))
    }

    pub fn reserve(&mut self, resource: ResourceId, amount: u32) -> bool {
        if self.available(resource) < amount {
            return false;
        }
        *self.reservations.entry(resource).or_insert(0) += amount;
        true
    }

    pub fn release(&mut self, resource: ResourceId, amount: u32) {
        let remaining = self.reserved(resource).saturating_sub(amount);
        if remaining == 0 {
            self.reservations.remove(&resource);
        } else {
            self.reservations.insert(resource, remaining);
        }
    }

    /// Releases a reservation and removes the reserved stock in one step.
    pub fn take_reserved(&mut self, resource: ResourceId, amount: u32) -> u32 {
        self.release(resource, amount);
        self.inventory.remove(resource, amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collecting {
    pub collectors: Vec<WorldId>,
    pub radius: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionState {
    None,
    WaitingForResources,
    InventoryFull,
    Producing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLine {
    pub duration_ticks: u32,
    pub inputs: Vec<ResourceAmount>,
    pub outputs: Vec<ResourceAmount>,
}

impl ProductionLine {
    pub fn produces(&self, resource: ResourceId) -> bool {
        self.outputs.iter().any(|output| output.resource == resource)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    pub line: ProductionLine,
    pub state: ProductionState,
    pub progress_ticks: u32,
    #[serde(default)]
    pub paused_from: Option<ProductionState>,
}

impl Production {
    pub fn new(line: ProductionLine) -> Self {
        Self {
            line,
            state: ProductionState::None,
            progress_ticks: 0,
            paused_from: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub productions: Vec<Production>,
    pub active: bool,
}

impl Producer {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn produces(&self, resource: ResourceId) -> bool {
        self.productions
            .iter()
            .any(|production| production.line.produces(resource))
    }

    pub fn input_resources(&self) -> Vec<ResourceId> {
        let mut inputs = Vec::new();
        for production in &self.productions {
            for input in &production.line.inputs {
                if !inputs.contains(&input.resource) {
                    inputs.push(input.resource);
                }
            }
        }
        inputs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    Idle,
    WaitingForAnimalToStop,
    MovingToTarget,
    Working,
    MovingHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub target: WorldId,
    pub resource: ResourceId,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collector {
    pub home: WorldId,
    pub state: CollectorState,
    #[serde(default)]
    pub job: Option<Job>,
    #[serde(default)]
    pub carried: Option<ResourceAmount>,
    pub work_ticks: u32,
}

/// Tile-by-tile movement. The route is derived from position and destination and is not saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Walker {
    pub step_ticks: u32,
    #[serde(default)]
    pub destination: Option<Point>,
    #[serde(skip)]
    pub route: VecDeque<Point>,
}

impl Walker {
    pub fn new(step_ticks: u32) -> Self {
        Self {
            step_ticks,
            destination: None,
            route: VecDeque::new(),
        }
    }

    pub fn is_moving(&self) -> bool {
        self.destination.is_some()
    }

    pub fn plan_route(&mut self, from: Point) {
        self.route.clear();
        if let Some(destination) = self.destination {
            let mut at = from;
            while at != destination {
                at = at.step_towards(destination);
                self.route.push_back(at);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wildlife {
    pub home: Point,
    pub graze_ticks: u32,
    #[serde(default)]
    pub stop_listener: Option<WorldId>,
    #[serde(default)]
    pub halted: bool,
    #[serde(default)]
    pub wander_step: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settler {
    pub interval_ticks: u32,
    pub consumes: ResourceAmount,
    pub ruin: String,
    #[serde(default)]
    pub unsupplied: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub damage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum Component {
    Selectable(Selectable),
    Storage(Storage),
    Collecting(Collecting),
    Producer(Producer),
    Collector(Collector),
    Walker(Walker),
    Wildlife(Wildlife),
    Settler(Settler),
    Weapon(Weapon),
}

impl Component {
    pub fn tag(&self) -> ComponentTag {
        match self {
            Self::Selectable(_) => ComponentTag::Selectable,
            Self::Storage(_) => ComponentTag::Storage,
            Self::Collecting(_) => ComponentTag::Collecting,
            Self::Producer(_) => ComponentTag::Producer,
            Self::Collector(_) => ComponentTag::Collector,
            Self::Walker(_) => ComponentTag::Walker,
            Self::Wildlife(_) => ComponentTag::Wildlife,
            Self::Settler(_) => ComponentTag::Settler,
            Self::Weapon(_) => ComponentTag::Weapon,
        }
    }
}

/// Typed access into a [`ComponentSet`].
pub trait ComponentKind: Sized {
    const TAG: ComponentTag;

    fn from_component(component: &Component) -> Option<&Self>;
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
    fn into_component(self) -> Component;
}

macro_rules! component_kind {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ComponentKind for $ty {
                const TAG: ComponentTag = ComponentTag::$ty;

                fn from_component(component: &Component) -> Option<&Self> {
                    match component {
                        Component::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                    match component {
                        Component::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn into_component(self) -> Component {
                    Component::$ty(self)
                }
            }
        )*
    };
}

component_kind!(
    Selectable, Storage, Collecting, Producer, Collector, Walker, Wildlife, Settler, Weapon,
);

/// Capability tag to component map; at most one component per tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Component>", try_from = "Vec<Component>")]
pub struct ComponentSet {
    components: BTreeMap<ComponentTag, Component>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<C: ComponentKind>(mut self, component: C) -> Self {
        self.insert(component);
        self
    }

    /// Inserts `component`, replacing any component with the same tag.
    pub fn insert<C: ComponentKind>(&mut self, component: C) {
        self.components.insert(C::TAG, component.into_component());
    }

    pub fn has<C: ComponentKind>(&self) -> bool {
        self.components.contains_key(&C::TAG)
    }

    pub fn get<C: ComponentKind>(&self) -> Option<&C> {
        self.components.get(&C::TAG).and_then(C::from_component)
    }

    pub fn get_mut<C: ComponentKind>(&mut self) -> Option<&mut C> {
        self.components
            .get_mut(&C::TAG)
            .and_then(C::from_component_mut)
    }

    pub fn tags(&self) -> impl Iterator<Item = ComponentTag> + '_ {
        self.components.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl From<ComponentSet> for Vec<Component> {
    fn from(set: ComponentSet) -> Self {
        set.components.into_values().collect()
    }
}

impl TryFrom<Vec<Component>> for ComponentSet {
    type Error = String;

    fn try_from(components: Vec<Component>) -> Result<Self, Self::Error> {
        let mut set = ComponentSet::new();
        for component in components {
            let tag = component.tag();
            if set.components.insert(tag, component).is_some() {
                return Err(format!("duplicate component {tag:?}"));
            }
        }
        Ok(set)
    }
}
