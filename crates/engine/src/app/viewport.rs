use super::rendering::{
    screen_to_world_px, world_to_screen_px, Camera2D, ScreenPoint, ScreenRect, Vec2,
};

/// Render layers the viewport can be queried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Ground,
    Objects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryArea {
    Point(ScreenPoint),
    Rect(ScreenRect),
}

/// Opaque reference to a visual instance; `instance_id` is whatever the owner wrote on the visual,
/// possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewportHandle {
    pub instance_id: String,
}

impl ViewportHandle {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }
}

/// Screen-space query service owned by the renderer.
pub trait Viewport {
    /// Instances intersecting `area` on `layer`, front-most first.
    fn matching_instances(&self, area: QueryArea, layer: Layer) -> Vec<ViewportHandle>;

    fn exact_world_location(&self, point: ScreenPoint) -> Vec2;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub handle: ViewportHandle,
    pub layer: Layer,
    pub center_world: Vec2,
    pub half_size_px: i32,
}

/// Viewport over a flat list of sprites; later sprites are drawn on top.
#[derive(Debug, Clone, Default)]
pub struct SpriteViewport {
    camera: Camera2D,
    window_size: (u32, u32),
    sprites: Vec<Sprite>,
}

impl SpriteViewport {
    pub fn new(camera: Camera2D, window_size: (u32, u32)) -> Self {
        Self {
            camera,
            window_size,
            sprites: Vec::new(),
        }
    }

    pub fn push(&mut self, sprite: Sprite) {
        self.sprites.push(sprite);
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn screen_position_of(&self, world: Vec2) -> ScreenPoint {
        world_to_screen_px(&self.camera, self.window_size, world)
    }

    fn sprite_bounds(&self, sprite: &Sprite) -> ScreenRect {
        let center = self.screen_position_of(sprite.center_world);
        let half = sprite.half_size_px.max(0);
        ScreenRect::from_corners(
            ScreenPoint::new(center.x - half, center.y - half),
            ScreenPoint::new(center.x + half, center.y + half),
        )
    }
}

impl Viewport for SpriteViewport {
    fn matching_instances(&self, area: QueryArea, layer: Layer) -> Vec<ViewportHandle> {
        self.sprites
            .iter()
            .rev()
            .filter(|sprite| sprite.layer == layer)
            .filter(|sprite| {
                let bounds = self.sprite_bounds(sprite);
                match area {
                    QueryArea::Point(point) => bounds.contains(point),
                    QueryArea::Rect(rect) => bounds.intersects(&rect),
                }
            })
            .map(|sprite| sprite.handle.clone())
            .collect()
    }

    fn exact_world_location(&self, point: ScreenPoint) -> Vec2 {
        screen_to_world_px(&self.camera, self.window_size, point)
    }
}
