mod transform;

pub use transform::{
    screen_to_world_px, world_to_screen_px, Camera2D, ScreenPoint, ScreenRect, Vec2,
    PIXELS_PER_WORLD,
};
