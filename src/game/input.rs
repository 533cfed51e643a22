//! Input Capture and Controller Adapter
//!
//! Raw per-frame input is a compact [`InputFrame`]. The [`InputAdapter`]
//! edge-detects button presses and releases and turns them into
//! [`Command`]s, gated by the player's match state.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::game::state::PlayerId;

/// Convert an i8 axis to [-1, 1]. `NO_INPUT` maps to 0.
#[inline]
pub fn axis_to_f32(value: i8) -> f32 {
    if value == InputFrame::NO_INPUT {
        0.0
    } else {
        value as f32 / 127.0
    }
}

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Raw input state for a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct InputFrame {
    /// Movement X (world forward): -127..=127, `NO_INPUT` when released
    pub move_x: i8,

    /// Movement Y (world right): -127..=127, `NO_INPUT` when released
    pub move_y: i8,

    /// Camera direction X, `NO_INPUT` keeps the current view
    pub look_x: i8,

    /// Camera direction Y, `NO_INPUT` keeps the current view
    pub look_y: i8,

    /// Held buttons (packed bits):
    /// - Bit 0: Jump
    /// - Bit 1: Sprint
    /// - Bit 2: Pull / aim
    /// - Bit 3: Throw
    /// - Bit 4: Use object
    /// - Bit 5: Retry (results screen)
    pub flags: u8,
}

impl Default for InputFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl InputFrame {
    /// Special value indicating no input (stick released)
    pub const NO_INPUT: i8 = -128;

    /// Jump flag bit
    pub const FLAG_JUMP: u8 = 0x01;

    /// Sprint flag bit
    pub const FLAG_SPRINT: u8 = 0x02;

    /// Pull-or-aim flag bit
    pub const FLAG_PULL_OR_AIM: u8 = 0x04;

    /// Throw flag bit
    pub const FLAG_THROW: u8 = 0x08;

    /// Use flag bit
    pub const FLAG_USE: u8 = 0x10;

    /// Retry flag bit
    pub const FLAG_RETRY: u8 = 0x20;

    /// Create a new empty input frame.
    pub const fn new() -> Self {
        Self {
            move_x: Self::NO_INPUT,
            move_y: Self::NO_INPUT,
            look_x: Self::NO_INPUT,
            look_y: Self::NO_INPUT,
            flags: 0,
        }
    }

    /// Create input with movement direction.
    pub const fn with_movement(move_x: i8, move_y: i8) -> Self {
        Self {
            move_x,
            move_y,
            look_x: Self::NO_INPUT,
            look_y: Self::NO_INPUT,
            flags: 0,
        }
    }

    /// Same frame with the camera pointed along (`look_x`, `look_y`).
    pub const fn looking(mut self, look_x: i8, look_y: i8) -> Self {
        self.look_x = look_x;
        self.look_y = look_y;
        self
    }

    /// Same frame with extra buttons held.
    pub const fn holding(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    /// Movement as a horizontal vector, length ≤ ~1.4.
    #[inline]
    pub fn move_direction(&self) -> Vec3 {
        Vec3::new(axis_to_f32(self.move_x), axis_to_f32(self.move_y), 0.0)
    }

    /// Camera direction, if the look stick is in use.
    #[inline]
    pub fn look_direction(&self) -> Option<Vec3> {
        if self.look_x == Self::NO_INPUT && self.look_y == Self::NO_INPUT {
            return None;
        }
        let dir = Vec3::new(axis_to_f32(self.look_x), axis_to_f32(self.look_y), 0.0).normalize();
        (dir != Vec3::ZERO).then_some(dir)
    }

    /// Check a flag.
    #[inline]
    pub fn is_held(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Set or clear a flag.
    #[inline]
    pub fn set_flag(&mut self, flag: u8, held: bool) {
        if held {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Check if jump is held.
    #[inline]
    pub fn jump_pressed(&self) -> bool {
        self.is_held(Self::FLAG_JUMP)
    }

    /// Check if sprint is held.
    #[inline]
    pub fn sprint_pressed(&self) -> bool {
        self.is_held(Self::FLAG_SPRINT)
    }

    /// Check if this is an idle frame (no input).
    #[inline]
    pub fn is_idle(&self) -> bool {
        *self == Self::new()
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Request produced by the controller for the owning character.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Pull-or-aim pressed with nothing held
    StartPull,
    /// Pull-or-aim released while not aiming
    StopPull,
    /// Pull-or-aim pressed while holding
    StartAim,
    /// Pull-or-aim released while aiming
    StopAim,
    /// Throw pressed while holding
    Throw,
    /// Use pressed while holding
    UseObject,
    /// Sprint pressed
    SprintStart,
    /// Sprint released
    SprintEnd,
    /// Jump pressed
    Jump,
    /// Desired movement changed
    Move {
        /// Horizontal direction, length ≤ 1
        direction: Vec3,
    },
    /// Camera turned
    Look {
        /// Unit camera direction
        direction: Vec3,
    },
    /// Retry selected on the results screen
    Retry,
}

/// What the adapter needs to know about the controlled character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerContext {
    /// Match is playing and this player is playing
    pub can_process: bool,
    /// Holding, so pull-or-aim means aim
    pub can_aim: bool,
    /// In the aim pose
    pub is_aiming: bool,
    /// Holding, so throw/use are meaningful
    pub can_throw: bool,
}

/// Turns held-button frames into press/release commands.
#[derive(Clone, Debug, Default)]
pub struct InputAdapter {
    previous: InputFrame,
    last_move: Vec3,
}

impl InputAdapter {
    /// Create an adapter with nothing held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one frame.
    ///
    /// Presses are gated by `ctx.can_process`; releases never are, so a
    /// held button always gets its matching release.
    pub fn process(&mut self, frame: InputFrame, ctx: &ControllerContext) -> Vec<Command> {
        let mut commands = Vec::new();
        let pressed = frame.flags & !self.previous.flags;
        let released = self.previous.flags & !frame.flags;
        self.previous = frame;

        if let Some(direction) = frame.look_direction() {
            commands.push(Command::Look { direction });
        }

        if released & InputFrame::FLAG_PULL_OR_AIM != 0 {
            commands.push(if ctx.is_aiming { Command::StopAim } else { Command::StopPull });
        }
        if released & InputFrame::FLAG_SPRINT != 0 {
            commands.push(Command::SprintEnd);
        }

        let direction = if ctx.can_process {
            let dir = frame.move_direction();
            if dir.length_squared() > 1.0 { dir.normalize() } else { dir }
        } else {
            Vec3::ZERO
        };
        if direction != self.last_move {
            self.last_move = direction;
            commands.push(Command::Move { direction });
        }

        if pressed & InputFrame::FLAG_RETRY != 0 {
            commands.push(Command::Retry);
        }

        if !ctx.can_process {
            return commands;
        }

        if pressed & InputFrame::FLAG_PULL_OR_AIM != 0 {
            commands.push(if ctx.can_aim { Command::StartAim } else { Command::StartPull });
        }
        if pressed & InputFrame::FLAG_THROW != 0 && ctx.can_throw {
            commands.push(Command::Throw);
        }
        if pressed & InputFrame::FLAG_USE != 0 && ctx.can_throw {
            commands.push(Command::UseObject);
        }
        if pressed & InputFrame::FLAG_SPRINT != 0 {
            commands.push(Command::SprintStart);
        }
        if pressed & InputFrame::FLAG_JUMP != 0 {
            commands.push(Command::Jump);
        }

        commands
    }
}

// =============================================================================
// INPUT RECORDING
// =============================================================================

/// Input state change at a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDelta {
    /// Tick when this input state began
    pub tick: u32,
    /// The new input state
    pub frame: InputFrame,
}

/// Delta-compressed input recording for one player, used to script and
/// replay sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerInputBuffer {
    /// Player identifier
    pub player_id: PlayerId,

    /// Only ticks where the input changed
    deltas: Vec<InputDelta>,

    #[serde(skip)]
    last_frame: InputFrame,
}

impl PlayerInputBuffer {
    /// Create an empty recording.
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            deltas: Vec::new(),
            last_frame: InputFrame::new(),
        }
    }

    /// Record the input for a tick. Stored only when it changed.
    pub fn record(&mut self, tick: u32, frame: InputFrame) {
        if frame != self.last_frame {
            self.deltas.push(InputDelta { tick, frame });
            self.last_frame = frame;
        }
    }

    /// Input in force at `tick`.
    pub fn get_input_at(&self, tick: u32) -> InputFrame {
        let idx = self.deltas.partition_point(|d| d.tick <= tick);
        if idx == 0 {
            InputFrame::new()
        } else {
            self.deltas[idx - 1].frame
        }
    }

    /// Recorded changes.
    pub fn deltas(&self) -> &[InputDelta] {
        &self.deltas
    }

    /// Last tick with a change.
    pub fn last_tick(&self) -> Option<u32> {
        self.deltas.last().map(|d| d.tick)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> ControllerContext {
        ControllerContext {
            can_process: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_axis_conversion() {
        assert_eq!(axis_to_f32(0), 0.0);
        assert_eq!(axis_to_f32(127), 1.0);
        assert_eq!(axis_to_f32(-127), -1.0);
        assert_eq!(axis_to_f32(InputFrame::NO_INPUT), 0.0);
    }

    #[test]
    fn test_input_frame_flags() {
        let mut frame = InputFrame::new();
        assert!(frame.is_idle());

        frame.set_flag(InputFrame::FLAG_JUMP, true);
        frame.set_flag(InputFrame::FLAG_SPRINT, true);
        assert!(frame.jump_pressed());
        assert!(frame.sprint_pressed());

        frame.set_flag(InputFrame::FLAG_JUMP, false);
        assert!(!frame.jump_pressed());
        assert!(frame.sprint_pressed());
    }

    #[test]
    fn test_press_and_release_are_edges() {
        let mut adapter = InputAdapter::new();
        let held = InputFrame::new().holding(InputFrame::FLAG_PULL_OR_AIM);

        assert_eq!(adapter.process(held, &playing()), vec![Command::StartPull]);
        assert!(adapter.process(held, &playing()).is_empty());
        assert_eq!(adapter.process(InputFrame::new(), &playing()), vec![Command::StopPull]);
        assert!(adapter.process(InputFrame::new(), &playing()).is_empty());
    }

    #[test]
    fn test_pull_or_aim_depends_on_hold() {
        let mut adapter = InputAdapter::new();
        let holding = ControllerContext {
            can_process: true,
            can_aim: true,
            can_throw: true,
            ..Default::default()
        };
        let held = InputFrame::new().holding(InputFrame::FLAG_PULL_OR_AIM);
        assert_eq!(adapter.process(held, &holding), vec![Command::StartAim]);

        let aiming = ControllerContext { is_aiming: true, can_aim: false, ..holding };
        assert_eq!(adapter.process(InputFrame::new(), &aiming), vec![Command::StopAim]);
    }

    #[test]
    fn test_presses_gated_releases_not() {
        let mut adapter = InputAdapter::new();
        let all = InputFrame::new().holding(
            InputFrame::FLAG_SPRINT | InputFrame::FLAG_JUMP | InputFrame::FLAG_PULL_OR_AIM,
        );
        let waiting = ControllerContext::default();

        assert!(adapter.process(all, &waiting).is_empty());
        let released = adapter.process(InputFrame::new(), &waiting);
        assert_eq!(released, vec![Command::StopPull, Command::SprintEnd]);
    }

    #[test]
    fn test_throw_requires_hold() {
        let mut adapter = InputAdapter::new();
        let throw = InputFrame::new().holding(InputFrame::FLAG_THROW | InputFrame::FLAG_USE);
        assert!(adapter.process(throw, &playing()).is_empty());

        let mut adapter = InputAdapter::new();
        let holding = ControllerContext { can_throw: true, ..playing() };
        assert_eq!(adapter.process(throw, &holding), vec![Command::Throw, Command::UseObject]);
    }

    #[test]
    fn test_move_emitted_on_change_and_zeroed_when_gated() {
        let mut adapter = InputAdapter::new();
        let forward = InputFrame::with_movement(127, 0);

        assert_eq!(
            adapter.process(forward, &playing()),
            vec![Command::Move { direction: Vec3::FORWARD }]
        );
        assert!(adapter.process(forward, &playing()).is_empty());
        assert_eq!(
            adapter.process(forward, &ControllerContext::default()),
            vec![Command::Move { direction: Vec3::ZERO }]
        );
    }

    #[test]
    fn test_retry_ungated() {
        let mut adapter = InputAdapter::new();
        let retry = InputFrame::new().holding(InputFrame::FLAG_RETRY);
        assert_eq!(adapter.process(retry, &ControllerContext::default()), vec![Command::Retry]);
    }

    #[test]
    fn test_input_buffer_delta_compression() {
        let mut buffer = PlayerInputBuffer::new(PlayerId::new([0; 16]));
        let frame = InputFrame::with_movement(100, 50);
        buffer.record(0, frame);
        buffer.record(1, frame);
        buffer.record(2, frame);
        assert_eq!(buffer.deltas().len(), 1);

        buffer.record(4, InputFrame::with_movement(-100, -50));
        assert_eq!(buffer.deltas().len(), 2);
        assert_eq!(buffer.last_tick(), Some(4));
    }

    #[test]
    fn test_input_buffer_get_at() {
        let mut buffer = PlayerInputBuffer::new(PlayerId::new([0; 16]));
        let first = InputFrame::with_movement(50, 0);
        let second = InputFrame::with_movement(-50, 0);
        buffer.record(10, first);
        buffer.record(20, second);

        assert!(buffer.get_input_at(5).is_idle());
        assert_eq!(buffer.get_input_at(10), first);
        assert_eq!(buffer.get_input_at(15), first);
        assert_eq!(buffer.get_input_at(100), second);
    }
}
