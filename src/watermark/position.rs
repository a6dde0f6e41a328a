//! Position mapping for watermark placement.
//!
//! Maps a symbolic position plus overlay and canvas dimensions to the
//! top-left offset at which the overlay is drawn. The mapping is pure and
//! total: any position string that is not one of the seven named positions
//! maps to the origin.
//!
//! | position      | x                 | y                 |
//! |---------------|-------------------|-------------------|
//! | top-left      | 0                 | 0                 |
//! | top-center    | (cw - ow) / 2     | 0                 |
//! | top-right     | cw - ow           | 0                 |
//! | bottom-left   | 0                 | ch - oh           |
//! | bottom-center | (cw - ow) / 2     | ch - oh           |
//! | bottom-right  | cw - ow           | ch - oh           |
//! | center        | (cw - ow) / 2     | (ch - oh) / 2     |
//! | anything else | 0                 | 0                 |

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Symbolic placement of an overlay on the canvas.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    Center,
    /// Any value that is not one of the named positions. Maps to the origin.
    #[serde(other)]
    Unrecognized,
}

impl Position {
    /// The seven named positions, in table order.
    pub const NAMED: [Position; 7] = [
        Position::TopLeft,
        Position::TopCenter,
        Position::TopRight,
        Position::BottomLeft,
        Position::BottomCenter,
        Position::BottomRight,
        Position::Center,
    ];

    /// Parse a position string. Matching is exact; anything else is
    /// `Unrecognized`.
    pub fn parse(value: &str) -> Self {
        match value {
            "top-left" => Self::TopLeft,
            "top-center" => Self::TopCenter,
            "top-right" => Self::TopRight,
            "bottom-left" => Self::BottomLeft,
            "bottom-center" => Self::BottomCenter,
            "bottom-right" => Self::BottomRight,
            "center" => Self::Center,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopCenter => "top-center",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomCenter => "bottom-center",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
            Self::Unrecognized => "unrecognized",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

impl FromStr for Position {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width and height of a canvas or overlay, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Top-left drawing offset. May be fractional (centred positions) or
/// negative (overlay larger than the canvas).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementPosition {
    pub x: f64,
    pub y: f64,
}

impl PlacementPosition {
    pub const ORIGIN: PlacementPosition = PlacementPosition { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Snap to the nearest whole pixel for drawing.
    pub fn to_pixel(&self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }
}

/// Calculate the top-left offset of an overlay placed at `position`.
pub fn calculate_position(
    position: Position,
    overlay: &Dimensions,
    canvas: &Dimensions,
) -> PlacementPosition {
    let free_x = canvas.width as f64 - overlay.width as f64;
    let free_y = canvas.height as f64 - overlay.height as f64;

    match position {
        Position::TopLeft => PlacementPosition::ORIGIN,
        Position::TopCenter => PlacementPosition::new(free_x / 2.0, 0.0),
        Position::TopRight => PlacementPosition::new(free_x, 0.0),
        Position::BottomLeft => PlacementPosition::new(0.0, free_y),
        Position::BottomCenter => PlacementPosition::new(free_x / 2.0, free_y),
        Position::BottomRight => PlacementPosition::new(free_x, free_y),
        Position::Center => PlacementPosition::new(free_x / 2.0, free_y / 2.0),
        Position::Unrecognized => PlacementPosition::ORIGIN,
    }
}

/// String-keyed variant of [`calculate_position`] for callers holding raw
/// position values.
pub fn calculate_position_str(
    position: &str,
    overlay: &Dimensions,
    canvas: &Dimensions,
) -> PlacementPosition {
    calculate_position(Position::parse(position), overlay, canvas)
}
