use std::collections::BTreeSet;

use engine::{
    Camera2D, Layer, PointerButton, PointerEvent, PointerEventKind, QueryArea, ScreenPoint,
    ScreenRect, Vec2, Viewport, WorldId,
};
use tracing::{debug, error, info};

use super::components::{Selectable, Walker, Weapon};
use super::types::{Hud, MenuState, ToolKind};
use super::world::World;

/// Squared pointer travel from the press point at which a drag becomes a rectangle.
pub const DRAG_THRESHOLD_SQUARED: i64 = 10;

/// Everything the selection tool may read or write while handling one pointer event.
pub struct ToolContext<'a> {
    pub world: &'a mut World,
    pub selection: &'a mut Option<BTreeSet<WorldId>>,
    pub hud: &'a mut Hud,
    pub camera: &'a mut Camera2D,
    pub tool: &'a mut ToolKind,
    pub viewport: &'a dyn Viewport,
    /// Move orders collected from a right click, executed by the session once the tool returns.
    pub pending_acts: &'a mut Vec<(WorldId, Vec2)>,
}

#[derive(Debug, Clone)]
pub struct SelectionTool {
    select_begin: Option<ScreenPoint>,
    old_selection: BTreeSet<WorldId>,
    nav_drag_from: Option<ScreenPoint>,
    deselect_at_end: bool,
}

impl Default for SelectionTool {
    fn default() -> Self {
        Self {
            select_begin: None,
            old_selection: BTreeSet::new(),
            nav_drag_from: None,
            deselect_at_end: true,
        }
    }
}

impl SelectionTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether leaving this tool should clear the selection. False once a military selection
    /// handed the cursor over to the attacking tool.
    pub fn deselect_at_end(&self) -> bool {
        self.deselect_at_end
    }

    pub fn handle(&mut self, ctx: &mut ToolContext<'_>, event: &PointerEvent) {
        if event.button() == PointerButton::Middle {
            self.navigate(ctx, event);
            return;
        }
        if event.consumed_by_widgets() {
            debug!(kind = ?event.kind(), "pointer_event_consumed");
            return;
        }
        match (event.kind(), event.button()) {
            (PointerEventKind::Pressed, PointerButton::Left) => self.on_press(ctx, event),
            (PointerEventKind::Dragged, PointerButton::Left) => self.on_drag(ctx, event),
            (PointerEventKind::Released, PointerButton::Left) => self.on_release(ctx),
            (PointerEventKind::Pressed, PointerButton::Right) => self.on_act(ctx, event),
            _ => {}
        }
    }

    fn navigate(&mut self, ctx: &mut ToolContext<'_>, event: &PointerEvent) {
        let position = event.position();
        match event.kind() {
            PointerEventKind::Pressed => self.nav_drag_from = Some(position),
            PointerEventKind::Dragged => {
                if let Some(from) = self.nav_drag_from {
                    ctx.camera
                        .pan_by_screen_delta((position.x - from.x, position.y - from.y));
                    self.nav_drag_from = Some(position);
                }
            }
            PointerEventKind::Released => self.nav_drag_from = None,
        }
    }

    fn on_press(&mut self, ctx: &mut ToolContext<'_>, event: &PointerEvent) {
        let Some(selection) = ctx.selection.as_ref() else {
            error!("selection_missing_on_press");
            return;
        };
        let old = if event.control_pressed() {
            selection.clone()
        } else {
            BTreeSet::new()
        };
        let hovered = resolve_hover(ctx.viewport, ctx.world, QueryArea::Point(event.position()));
        let new = filter_candidates(ctx.world, hovered, true);

        self.select_begin = Some(event.position());
        self.old_selection = old.clone();
        ctx.hud.menu = MenuState::Hidden;
        update_selection(ctx, &old, &new, false);
    }

    fn on_drag(&mut self, ctx: &mut ToolContext<'_>, event: &PointerEvent) {
        let Some(begin) = self.select_begin else {
            return;
        };
        if ctx.selection.is_none() {
            error!("selection_missing_on_drag");
            return;
        }
        let position = event.position();
        let (new, rect) = if begin.distance_squared(position) >= DRAG_THRESHOLD_SQUARED {
            let rect = ScreenRect::from_corners(begin, position);
            let hovered = resolve_hover(ctx.viewport, ctx.world, QueryArea::Rect(rect));
            (filter_candidates(ctx.world, hovered, false), Some(rect))
        } else {
            let hovered = resolve_hover(ctx.viewport, ctx.world, QueryArea::Point(position));
            (filter_candidates(ctx.world, hovered, true), None)
        };
        ctx.hud.selection_rect = rect;
        update_selection(ctx, &self.old_selection, &new, rect.is_some());
    }

    fn on_release(&mut self, ctx: &mut ToolContext<'_>) {
        if self.select_begin.take().is_none() {
            return;
        }
        ctx.hud.selection_rect = None;
        self.old_selection.clear();
        self.apply_select(ctx);
    }

    fn apply_select(&mut self, ctx: &mut ToolContext<'_>) {
        if ctx.hud.health_bars_visible {
            ctx.hud.health_bars_visible = false;
        }
        let Some(selection) = ctx.selection.as_ref() else {
            return;
        };

        let found_military = selection.iter().any(|id| {
            ctx.world.component::<Weapon>(*id).is_some() && ctx.world.is_owned_by_local_player(*id)
        });
        self.deselect_at_end = !found_military;
        let current = *ctx.tool;
        let next_tool = match (current, found_military) {
            (ToolKind::Attacking, false) => ToolKind::Default,
            (_, true) => ToolKind::Attacking,
            (tool, false) => tool,
        };
        if next_tool != current {
            info!(from = ?current, to = ?next_tool, "cursor_handover");
            *ctx.tool = next_tool;
        }

        let Some(first) = selection.first().copied() else {
            return;
        };
        ctx.hud.menu = if selection.len() == 1 {
            MenuState::Single(first)
        } else {
            MenuState::MultiSelect(selection.clone())
        };
    }

    fn on_act(&mut self, ctx: &mut ToolContext<'_>, event: &PointerEvent) {
        let Some(selection) = ctx.selection.as_ref() else {
            error!("selection_missing_on_press");
            return;
        };
        if selection.is_empty() {
            return;
        }
        let target = ctx.viewport.exact_world_location(event.position());
        for id in selection {
            if ctx.world.component::<Walker>(*id).is_some() {
                ctx.pending_acts.push((*id, target));
            }
        }
    }
}

/// Objects under `area`, front-most first. Handles without a live worldid are dropped.
pub fn resolve_hover(viewport: &dyn Viewport, world: &World, area: QueryArea) -> Vec<WorldId> {
    viewport
        .matching_instances(area, Layer::Objects)
        .into_iter()
        .filter_map(|handle| {
            if handle.instance_id.is_empty() {
                return None;
            }
            let id = match handle.instance_id.parse::<WorldId>() {
                Ok(id) => id,
                Err(_) => {
                    debug!(instance_id = handle.instance_id.as_str(), "hover_instance_unparsable");
                    return None;
                }
            };
            match world.get(id) {
                Ok(_) => Some(id),
                Err(error) => {
                    debug!(error = %error, "hover_instance_missing");
                    None
                }
            }
        })
        .collect()
}

/// Selectable candidates; a point query keeps only the front-most, and locally owned objects
/// win over everything else.
pub fn filter_candidates(
    world: &World,
    candidates: Vec<WorldId>,
    point_query: bool,
) -> BTreeSet<WorldId> {
    let mut candidates = candidates
        .into_iter()
        .filter(|id| world.component::<Selectable>(*id).is_some())
        .collect::<Vec<_>>();
    if point_query && candidates.len() > 1 {
        candidates.truncate(1);
    }
    if candidates
        .iter()
        .any(|id| world.is_owned_by_local_player(*id))
    {
        candidates.retain(|id| world.is_owned_by_local_player(*id));
    }
    candidates.into_iter().collect()
}

/// `old ∪ new` for a rectangle, `old Δ new` for a click, then narrowed to one owner.
pub fn combine_selection(
    world: &World,
    old: &BTreeSet<WorldId>,
    new: &BTreeSet<WorldId>,
    union: bool,
) -> BTreeSet<WorldId> {
    let result = if union {
        old.union(new).copied().collect::<BTreeSet<_>>()
    } else {
        old.symmetric_difference(new).copied().collect::<BTreeSet<_>>()
    };
    if result.len() <= 1 {
        return result;
    }
    let local = result
        .iter()
        .copied()
        .filter(|id| world.is_owned_by_local_player(*id))
        .collect::<BTreeSet<_>>();
    if local.is_empty() {
        result.into_iter().take(1).collect()
    } else {
        local
    }
}

fn update_selection(
    ctx: &mut ToolContext<'_>,
    old: &BTreeSet<WorldId>,
    new: &BTreeSet<WorldId>,
    union: bool,
) {
    let result = combine_selection(ctx.world, old, new, union);
    let current = ctx.selection.take().unwrap_or_default();
    for id in current.difference(&result) {
        if let Some(selectable) = ctx.world.component_mut::<Selectable>(*id) {
            selectable.deselect();
        }
    }
    for id in result.difference(&current) {
        if let Some(selectable) = ctx.world.component_mut::<Selectable>(*id) {
            selectable.select();
        }
    }
    *ctx.selection = Some(result);
}

/// Clears the selection, deselecting every member.
pub fn deselect_all(world: &mut World, selection: &mut Option<BTreeSet<WorldId>>) {
    let Some(current) = selection.as_mut() else {
        return;
    };
    for id in std::mem::take(current) {
        if let Some(selectable) = world.component_mut::<Selectable>(id) {
            selectable.deselect();
        }
    }
}
