//! Color handling for scene proxies.
//!
//! This module provides the [`Color`] type which wraps the `DynamicColor` type
//! from the color crate, plus the operations the layer engine needs: parsing
//! CSS strings, building colors from packed `0xRRGGBB` values and whitening a
//! color towards white for layer backgrounds.

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use color::{AlphaColor, DynamicColor, Srgb};

/// Wrapper around the `DynamicColor` type from the color crate.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Color {
    color: DynamicColor,
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_rgb_hex().hash(state);
    }
}

impl Color {
    /// Create a new `Color` from a CSS color string such as "#ff0000",
    /// "rgb(255, 0, 0)" or "red".
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_core::color::Color;
    ///
    /// let blue = Color::new("#3399ff").unwrap();
    /// assert_eq!(blue.to_rgb_hex(), 0x3399ff);
    /// assert!(Color::new("not-a-color").is_err());
    /// ```
    pub fn new(color_str: &str) -> Result<Self, String> {
        match DynamicColor::from_str(color_str) {
            Ok(color) => Ok(Self { color }),
            Err(err) => Err(format!("invalid color `{color_str}`: {err}")),
        }
    }

    /// Creates an opaque color from a packed `0xRRGGBB` value.
    pub fn from_rgb_hex(rgb: u32) -> Self {
        let [_, r, g, b] = rgb.to_be_bytes();
        Self::from_srgb([
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        ])
    }

    fn from_srgb(components: [f32; 4]) -> Self {
        Self {
            color: DynamicColor::from_alpha_color(AlphaColor::<Srgb>::new(components)),
        }
    }

    fn srgb_components(self) -> [f32; 4] {
        self.color.to_alpha_color::<Srgb>().components
    }

    /// Returns the color as a packed `0xRRGGBB` value, ignoring alpha.
    pub fn to_rgb_hex(self) -> u32 {
        let [r, g, b, _] = self.srgb_components();
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(r) << 16) | (channel(g) << 8) | channel(b)
    }

    /// Moves the color towards white by `factor` (0 keeps it, 1 is white).
    ///
    /// ```
    /// use strata_core::color::Color;
    ///
    /// let black = Color::from_rgb_hex(0x000000);
    /// assert_eq!(black.whiten(0.5).to_rgb_hex(), 0x808080);
    /// assert_eq!(black.whiten(1.0).to_rgb_hex(), 0xffffff);
    /// ```
    pub fn whiten(self, factor: f32) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let [r, g, b, a] = self.srgb_components();
        let lerp = |c: f32| c + (1.0 - c) * factor;
        Self::from_srgb([lerp(r), lerp(g), lerp(b), a])
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::from_rgb_hex(0xf5f5f5)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.to_rgb_hex())
    }
}

/// Colors assigned to nested layers, indexed by depth.
///
/// Depths past the end of the palette wrap around.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthPalette {
    colors: Vec<Color>,
}

impl DepthPalette {
    /// Creates a palette; an empty list falls back to the default palette.
    pub fn new(colors: Vec<Color>) -> Self {
        if colors.is_empty() {
            return Self::default();
        }
        Self { colors }
    }

    /// Color of the layer at `depth`.
    pub fn color(&self, depth: usize) -> Color {
        self.colors[depth % self.colors.len()]
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for DepthPalette {
    fn default() -> Self {
        Self {
            colors: [0x3399ff, 0x9933ff, 0xff9933, 0xff3399, 0x33ff99, 0x99ff33]
                .into_iter()
                .map(Color::from_rgb_hex)
                .collect(),
        }
    }
}
