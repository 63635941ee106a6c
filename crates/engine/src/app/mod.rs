mod input;
mod rendering;
mod viewport;

pub use input::{PointerButton, PointerEvent, PointerEventKind};
pub use rendering::{
    screen_to_world_px, world_to_screen_px, Camera2D, ScreenPoint, ScreenRect, Vec2,
    PIXELS_PER_WORLD,
};
pub use viewport::{Layer, QueryArea, Sprite, SpriteViewport, Viewport, ViewportHandle};
