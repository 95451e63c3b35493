use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// The transform or overlay applied to every published frame.
///
/// Exactly one action is active at a time. Any action may replace any other;
/// there are no guarded transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Action {
    None = 0,
    RotateLeft = 1,
    RotateRight = 2,
    Flip180 = 3,
    Greyscale = 4,
    MotionOverlay = 5,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::None,
        Action::RotateLeft,
        Action::RotateRight,
        Action::Flip180,
        Action::Greyscale,
        Action::MotionOverlay,
    ];

    fn from_repr(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|action| *action as u8 == value)
    }

    /// Route that selects this action.
    pub fn path(self) -> &'static str {
        match self {
            Action::None => "/",
            Action::RotateLeft => "/rotate-left",
            Action::RotateRight => "/rotate-right",
            Action::Flip180 => "/flip-image",
            Action::Greyscale => "/grey-scale/",
            Action::MotionOverlay => "/motion-detection/",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::None => "Original",
            Action::RotateLeft => "Rotate left",
            Action::RotateRight => "Rotate right",
            Action::Flip180 => "Flip",
            Action::Greyscale => "Greyscale",
            Action::MotionOverlay => "Motion detection",
        }
    }
}

/// Process-wide action selection.
///
/// A single atomic byte: route handlers call [`ActionCell::set`] and the frame
/// producer takes one [`ActionCell::get`] snapshot per cycle. A selection takes
/// effect on the next cycle that reads it.
#[derive(Debug)]
pub struct ActionCell(AtomicU8);

impl ActionCell {
    pub fn new(initial: Action) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> Action {
        // Only `set` stores into the cell, so every stored byte is a valid tag.
        Action::from_repr(self.0.load(Ordering::Relaxed)).unwrap_or(Action::None)
    }

    /// Select `action`, returning the one it replaced.
    pub fn set(&self, action: Action) -> Action {
        let previous = self.0.swap(action as u8, Ordering::Relaxed);
        Action::from_repr(previous).unwrap_or(Action::None)
    }
}

impl Default for ActionCell {
    fn default() -> Self {
        Self::new(Action::None)
    }
}
