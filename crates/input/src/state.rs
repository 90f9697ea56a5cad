/// Logical keys the engine watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Space,
    Escape,
    Shift,
}

impl Key {
    /// Map a logical key name (`"ArrowUp"`, `"w"`, `" "`, ...) to a watched key.
    ///
    /// Arrows, WASD and the AZERTY aliases `z`/`q` are recognised; letters
    /// are case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name {
            "ArrowUp" => Self::Up,
            "ArrowDown" => Self::Down,
            "ArrowLeft" => Self::Left,
            "ArrowRight" => Self::Right,
            "Escape" => Self::Escape,
            "Shift" => Self::Shift,
            " " | "Space" => Self::Space,
            other => {
                let mut chars = other.chars();
                let (Some(c), None) = (chars.next(), chars.next()) else {
                    return None;
                };
                return Self::from_char(c);
            }
        };
        Some(key)
    }

    pub fn from_char(c: char) -> Option<Self> {
        Some(match c.to_ascii_lowercase() {
            'w' | 'z' => Self::Up,
            's' => Self::Down,
            'a' | 'q' => Self::Left,
            'd' => Self::Right,
            ' ' => Self::Space,
            _ => return None,
        })
    }
}

/// Everything input components read during one dispatch.
///
/// Pointer positions are normalized to the surface (0..1). Relative deltas
/// are scaled: mouse motion by 1/1000 of a pixel, touch motion by 1/100 of
/// the normalized distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub space: bool,
    pub esc: bool,
    pub shift: bool,
    pub clicked: bool,
    pub just_clicked: bool,
    pub pointer_locked: bool,
    pub ptr_x: f32,
    pub ptr_y: f32,
    pub ptr_dx: f32,
    pub ptr_dy: f32,
    click_pending: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&mut self, key: Key, pressed: bool) {
        let slot = match key {
            Key::Up => &mut self.up,
            Key::Down => &mut self.down,
            Key::Left => &mut self.left,
            Key::Right => &mut self.right,
            Key::Space => &mut self.space,
            Key::Escape => &mut self.esc,
            Key::Shift => &mut self.shift,
        };
        *slot = pressed;
    }

    /// Fold a pointer move. `x`/`y` are normalized positions, `dx`/`dy` the
    /// raw relative motion in pixels. Deltas accumulate until
    /// [`end_dispatch`](Self::end_dispatch).
    pub fn pointer_move(&mut self, x: f32, y: f32, dx: f32, dy: f32) {
        self.ptr_x = x;
        self.ptr_y = y;
        self.ptr_dx += dx / 1e3;
        self.ptr_dy += dy / 1e3;
    }

    pub fn pointer_button(&mut self, pressed: bool) {
        self.clicked = pressed;
        if pressed {
            self.click_pending = true;
        }
    }

    /// Fold a touch event: `Some` normalized position of the first touch,
    /// `None` once no touches remain.
    pub fn touch(&mut self, first: Option<(f32, f32)>) {
        self.clicked = first.is_some();
        self.click_pending = first.is_some();
        if let Some((x, y)) = first {
            self.ptr_dx = (x - self.ptr_x) / 1e2;
            self.ptr_dy = (y - self.ptr_y) / 1e2;
            self.ptr_x = x;
            self.ptr_y = y;
        }
    }

    pub fn set_pointer_locked(&mut self, locked: bool) {
        if self.pointer_locked != locked {
            tracing::debug!(locked, "pointer lock changed");
        }
        self.pointer_locked = locked;
    }

    pub fn dir_keys_pressed(&self) -> bool {
        self.left || self.right || self.up || self.down
    }

    /// Reset after all input components ran: relative deltas are zeroed and
    /// a press seen since the previous dispatch becomes `just_clicked` for
    /// the next one.
    pub fn end_dispatch(&mut self) {
        self.ptr_dx = 0.0;
        self.ptr_dy = 0.0;
        self.just_clicked = std::mem::take(&mut self.click_pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_cover_arrows_wasd_and_azerty() {
        assert_eq!(Key::from_name("ArrowUp"), Some(Key::Up));
        assert_eq!(Key::from_name("w"), Some(Key::Up));
        assert_eq!(Key::from_name("Z"), Some(Key::Up));
        assert_eq!(Key::from_name("q"), Some(Key::Left));
        assert_eq!(Key::from_name("d"), Some(Key::Right));
        assert_eq!(Key::from_name(" "), Some(Key::Space));
        assert_eq!(Key::from_name("Escape"), Some(Key::Escape));
        assert_eq!(Key::from_name("x"), None);
        assert_eq!(Key::from_name("Enter"), None);
    }

    #[test]
    fn key_press_and_release() {
        let mut input = InputState::new();
        input.key(Key::Left, true);
        assert!(input.left && input.dir_keys_pressed());
        input.key(Key::Left, false);
        assert!(!input.dir_keys_pressed());
    }

    #[test]
    fn pointer_deltas_scale_and_reset() {
        let mut input = InputState::new();
        input.pointer_move(0.5, 0.25, 10.0, -20.0);
        input.pointer_move(0.5, 0.25, 10.0, 0.0);
        assert!((input.ptr_dx - 0.02).abs() < 1e-6);
        assert!((input.ptr_dy + 0.02).abs() < 1e-6);
        input.end_dispatch();
        assert_eq!((input.ptr_dx, input.ptr_dy), (0.0, 0.0));
        assert_eq!((input.ptr_x, input.ptr_y), (0.5, 0.25));
    }

    #[test]
    fn just_clicked_lasts_one_dispatch() {
        let mut input = InputState::new();
        input.pointer_button(true);
        assert!(!input.just_clicked);
        input.end_dispatch();
        assert!(input.just_clicked);
        input.end_dispatch();
        assert!(!input.just_clicked);
        assert!(input.clicked);
    }

    #[test]
    fn touch_tracks_position_and_release() {
        let mut input = InputState::new();
        input.touch(Some((0.5, 0.5)));
        input.end_dispatch();
        input.touch(Some((0.6, 0.5)));
        assert!((input.ptr_dx - 0.001).abs() < 1e-6);
        assert!(input.clicked);
        input.touch(None);
        assert!(!input.clicked);
        input.end_dispatch();
        assert!(!input.just_clicked);
    }
}
