use std::collections::BTreeSet;
use std::fmt;

use engine::{ScreenRect, Vec2, WorldId};
use serde::{Deserialize, Serialize};

/// Integer tile coordinate on an island.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn chebyshev_distance(self, other: Point) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// One tile towards `target`, moving diagonally while both axes differ.
    pub fn step_towards(self, target: Point) -> Point {
        Point {
            x: self.x + (target.x - self.x).signum(),
            y: self.y + (target.y - self.y).signum(),
        }
    }

    pub fn to_world(self) -> Vec2 {
        Vec2 {
            x: self.x as f32,
            y: self.y as f32,
        }
    }

    pub fn from_world(world: Vec2) -> Option<Point> {
        if !world.x.is_finite() || !world.y.is_finite() {
            return None;
        }
        Some(Point {
            x: world.x.round() as i32,
            y: world.y.round() as i32,
        })
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceId {
    Trees,
    Boards,
    Deer,
    Food,
}

impl ResourceId {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "trees" => Some(Self::Trees),
            "boards" => Some(Self::Boards),
            "deer" => Some(Self::Deer),
            "food" => Some(Self::Food),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trees => "trees",
            Self::Boards => "boards",
            Self::Deer => "deer",
            Self::Food => "food",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub resource: ResourceId,
    pub amount: u32,
}

/// Active mouse tool. `Default` and `Attacking` both drive the selection tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ToolKind {
    #[default]
    Default,
    Attacking,
    Navigation,
}

impl ToolKind {
    pub fn is_selection_based(self) -> bool {
        matches!(self, Self::Default | Self::Attacking)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MenuState {
    #[default]
    Hidden,
    Single(WorldId),
    MultiSelect(BTreeSet<WorldId>),
}

/// What the HUD should show; the renderer reads this, the simulation only writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hud {
    pub menu: MenuState,
    pub selection_rect: Option<ScreenRect>,
    pub health_bars_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunLength {
    Ticks(u64),
    Seconds(f64),
}
