use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use lantern_core::components::{OrbitController, Transform};

/// Pixel deltas per scroll line for touchpads reporting `PixelDelta`.
const PIXELS_PER_LINE: f32 = 120.0;

/// Raw keyboard and mouse state, updated from window events.
#[derive(Debug, Default)]
pub struct InputState {
    keys_held: HashSet<KeyCode>,
    keys_just_pressed: HashSet<KeyCode>,
    mouse_buttons_held: HashSet<MouseButton>,
    mouse_buttons_just_pressed: HashSet<MouseButton>,
    cursor_position: Option<Vec2>,
    // Accumulated since the last end_frame
    cursor_delta: Vec2,
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call after the frame's systems have run.
    pub fn end_frame(&mut self) {
        self.keys_just_pressed.clear();
        self.mouse_buttons_just_pressed.clear();
        self.cursor_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.set_key(code, event.state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => self.set_button(*button, *state),
            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => self.cursor_position = None,
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
            }
            WindowEvent::Focused(false) => {
                self.keys_held.clear();
                self.mouse_buttons_held.clear();
            }
            _ => {}
        }
    }

    fn set_key(&mut self, code: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                // Key repeat arrives as repeated presses
                if self.keys_held.insert(code) {
                    self.keys_just_pressed.insert(code);
                }
            }
            ElementState::Released => {
                self.keys_held.remove(&code);
            }
        }
    }

    fn set_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.mouse_buttons_held.insert(button) {
                    self.mouse_buttons_just_pressed.insert(button);
                }
            }
            ElementState::Released => {
                self.mouse_buttons_held.remove(&button);
            }
        }
    }

    fn move_cursor(&mut self, position: Vec2) {
        if let Some(last) = self.cursor_position {
            self.cursor_delta += position - last;
        }
        self.cursor_position = Some(position);
    }

    pub fn key_held(&self, code: KeyCode) -> bool {
        self.keys_held.contains(&code)
    }

    pub fn just_pressed_key(&self, code: KeyCode) -> bool {
        self.keys_just_pressed.contains(&code)
    }

    pub fn mouse_held(&self, button: MouseButton) -> bool {
        self.mouse_buttons_held.contains(&button)
    }

    pub fn mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons_just_pressed.contains(&button)
    }

    pub fn cursor_delta(&self) -> Vec2 {
        self.cursor_delta
    }

    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }

    /// Digit keys 1..=9 pressed this frame, as 0-based indices.
    pub fn digits_just_pressed(&self) -> Vec<usize> {
        const DIGITS: [KeyCode; 9] = [
            KeyCode::Digit1,
            KeyCode::Digit2,
            KeyCode::Digit3,
            KeyCode::Digit4,
            KeyCode::Digit5,
            KeyCode::Digit6,
            KeyCode::Digit7,
            KeyCode::Digit8,
            KeyCode::Digit9,
        ];
        DIGITS
            .iter()
            .enumerate()
            .filter(|(_, code)| self.just_pressed_key(**code))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Left-drag rotates, right-drag pans, the wheel zooms. Returns whether the
/// controller changed.
pub fn apply_orbit_input(controller: &mut OrbitController, input: &InputState) -> bool {
    let delta = input.cursor_delta();
    let mut changed = false;
    if delta != Vec2::ZERO {
        if input.mouse_held(MouseButton::Left) {
            controller.rotate(delta.x, delta.y);
            changed = true;
        } else if input.mouse_held(MouseButton::Right) {
            controller.pan(delta.x, delta.y);
            changed = true;
        }
    }
    if input.scroll_delta() != 0.0 {
        controller.zoom(input.scroll_delta());
        changed = true;
    }
    changed
}

/// Drive every orbiting entity from `input` and write the orbit pose into
/// its transform.
pub fn orbit_camera_system(world: &mut hecs::World, input: &InputState) {
    for (_, (orbit, transform)) in world
        .query_mut::<(&mut OrbitController, &mut Transform)>()
    {
        let changed = apply_orbit_input(orbit, input);
        let (eye, rotation) = orbit.transform();
        if changed || transform.position != eye || transform.rotation != rotation {
            transform.position = eye;
            transform.rotation = rotation;
            transform.dirty = true;
        }
    }
}
