//! Graphics drawn on the output layer.

use serde::{Deserialize, Serialize};

use crate::geometry::Polygon;

/// An RGBA color. Alpha is in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 1.0);

    /// Create a color.
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

/// Outline style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSymbol {
    pub color: Rgba,
    /// Width in points.
    pub width: f32,
}

/// Fill style with an outline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillSymbol {
    pub color: Rgba,
    pub outline: LineSymbol,
}

impl FillSymbol {
    /// Semi-transparent orange with a thin white outline.
    pub const BUFFER: FillSymbol = FillSymbol {
        color: Rgba::new(227, 139, 79, 0.7),
        outline: LineSymbol {
            color: Rgba::WHITE,
            width: 1.0,
        },
    };

    /// Transparent fill with a thicker white outline.
    pub const HULL: FillSymbol = FillSymbol {
        color: Rgba::new(255, 255, 255, 0.0),
        outline: LineSymbol {
            color: Rgba::WHITE,
            width: 2.0,
        },
    };
}

/// What a graphic depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphicRole {
    Buffer,
    Hull,
}

/// A styled polygon on the output layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Graphic {
    pub role: GraphicRole,
    pub geometry: Polygon,
    pub symbol: FillSymbol,
}

impl Graphic {
    /// The buffer graphic, styled with [`FillSymbol::BUFFER`].
    pub fn buffer(geometry: Polygon) -> Self {
        Self {
            role: GraphicRole::Buffer,
            geometry,
            symbol: FillSymbol::BUFFER,
        }
    }

    /// The hull graphic, styled with [`FillSymbol::HULL`].
    pub fn hull(geometry: Polygon) -> Self {
        Self {
            role: GraphicRole::Hull,
            geometry,
            symbol: FillSymbol::HULL,
        }
    }
}
