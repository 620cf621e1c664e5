use serde::{Deserialize, Serialize};

/// Type tag written in front of every 2D vector on the wire.
pub const VECTOR2_TAG: u32 = 5;

/// Encoded size of a [`Vector2`]: tag, x and y, four bytes each.
pub const VECTOR2_WIRE_SIZE: usize = 12;

/// 2D vector used for ball and paddle positions and directions.
///
/// Serializes through serde as the tagged 12-byte layout, so it can be
/// embedded directly in message payloads.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "TaggedVector2", into = "TaggedVector2")]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Deserialize)]
struct TaggedVector2 {
    tag: u32,
    x: f32,
    y: f32,
}

impl From<Vector2> for TaggedVector2 {
    fn from(vec: Vector2) -> Self {
        Self {
            tag: VECTOR2_TAG,
            x: vec.x,
            y: vec.y,
        }
    }
}

// The tag is not checked on the way in; peers only ever send vectors here.
impl From<TaggedVector2> for Vector2 {
    fn from(tagged: TaggedVector2) -> Self {
        Self {
            x: tagged.x,
            y: tagged.y,
        }
    }
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
