use super::rendering::ScreenPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerEventKind {
    Pressed,
    Dragged,
    Released,
}

/// One pointer event as delivered by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    kind: PointerEventKind,
    button: PointerButton,
    position: ScreenPoint,
    control_pressed: bool,
    consumed_by_widgets: bool,
}

impl PointerEvent {
    pub fn new(kind: PointerEventKind, button: PointerButton, position: ScreenPoint) -> Self {
        Self {
            kind,
            button,
            position,
            control_pressed: false,
            consumed_by_widgets: false,
        }
    }

    pub fn pressed(button: PointerButton, position: ScreenPoint) -> Self {
        Self::new(PointerEventKind::Pressed, button, position)
    }

    pub fn dragged(button: PointerButton, position: ScreenPoint) -> Self {
        Self::new(PointerEventKind::Dragged, button, position)
    }

    pub fn released(button: PointerButton, position: ScreenPoint) -> Self {
        Self::new(PointerEventKind::Released, button, position)
    }

    pub fn with_control_pressed(mut self, control_pressed: bool) -> Self {
        self.control_pressed = control_pressed;
        self
    }

    pub fn with_consumed_by_widgets(mut self, consumed_by_widgets: bool) -> Self {
        self.consumed_by_widgets = consumed_by_widgets;
        self
    }

    pub fn kind(&self) -> PointerEventKind {
        self.kind
    }

    pub fn button(&self) -> PointerButton {
        self.button
    }

    pub fn position(&self) -> ScreenPoint {
        self.position
    }

    pub fn control_pressed(&self) -> bool {
        self.control_pressed
    }

    pub fn consumed_by_widgets(&self) -> bool {
        self.consumed_by_widgets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_default_to_no_modifiers() {
        let event = PointerEvent::pressed(PointerButton::Left, ScreenPoint::new(4, 9));
        assert_eq!(event.kind(), PointerEventKind::Pressed);
        assert_eq!(event.button(), PointerButton::Left);
        assert_eq!(event.position(), ScreenPoint::new(4, 9));
        assert!(!event.control_pressed());
        assert!(!event.consumed_by_widgets());

        let event = event
            .with_control_pressed(true)
            .with_consumed_by_widgets(true);
        assert!(event.control_pressed());
        assert!(event.consumed_by_widgets());
    }
}
