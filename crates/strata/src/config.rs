//! Configuration types for the Strata scene engine.
//!
//! This module provides configuration structures that control how layers are
//! laid out, animated and styled. All types implement [`serde::Deserialize`]
//! and every section falls back to its defaults when omitted.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining the sections below.
//! - [`LayoutConfig`] - Layout engine selection and spacing.
//! - [`AnimationConfig`] - Transition durations and render-loop step.
//! - [`StyleConfig`] - Colors and opacities of scene proxies.
//!
//! # Example
//!
//! ```
//! # use strata::config::AppConfig;
//! let config = AppConfig::from_toml_str(
//!     r##"
//!     [layout]
//!     engine = "sugiyama"
//!
//!     [style]
//!     module_color = "#eeeeee"
//!     "##,
//! )
//! .expect("valid configuration");
//!
//! assert_eq!(config.layout().expansion_factor(), 1.0);
//! assert!(config.style().module_color().is_ok());
//! ```

use serde::Deserialize;

use strata_core::color::{Color, DepthPalette};

use crate::{StrataError, layout::engines::LayoutEngine};

/// Top-level configuration combining layout, animation and style settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Layout configuration section.
    #[serde(default)]
    layout: LayoutConfig,

    /// Animation configuration section.
    #[serde(default)]
    animation: AnimationConfig,

    /// Style configuration section.
    #[serde(default)]
    style: StyleConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its sections.
    pub fn new(layout: LayoutConfig, animation: AnimationConfig, style: StyleConfig) -> Self {
        Self {
            layout,
            animation,
            style,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::ConfigFormat`] for malformed TOML and
    /// [`StrataError::Config`] for values out of range or unparsable colors.
    pub fn from_toml_str(source: &str) -> Result<Self, StrataError> {
        let config: AppConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<(), StrataError> {
        self.layout.validate()?;
        self.animation.validate()?;
        self.style.resolve().map(|_| ()).map_err(StrataError::Config)
    }

    /// Returns the layout configuration.
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Returns the animation configuration.
    pub fn animation(&self) -> &AnimationConfig {
        &self.animation
    }

    /// Returns the style configuration.
    pub fn style(&self) -> &StyleConfig {
        &self.style
    }
}

/// Layout engine selection and spacing of layers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// [`LayoutEngine`] used to position the entities of a layer.
    engine: LayoutEngine,

    /// Multiplier applied to node sizes and layer spacing.
    expansion_factor: f32,

    /// Depth at which nested layers sit above their parent entity.
    child_layer_depth: f32,

    /// Upper bound on barycenter sweeps of the layered engine.
    max_sweeps: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            engine: LayoutEngine::default(),
            expansion_factor: 1.0,
            child_layer_depth: 100.0,
            max_sweeps: 24,
        }
    }
}

impl LayoutConfig {
    pub fn new(engine: LayoutEngine, expansion_factor: f32, child_layer_depth: f32) -> Self {
        Self {
            engine,
            expansion_factor,
            child_layer_depth,
            ..Self::default()
        }
    }

    pub fn engine(&self) -> LayoutEngine {
        self.engine
    }

    pub fn expansion_factor(&self) -> f32 {
        self.expansion_factor
    }

    pub fn child_layer_depth(&self) -> f32 {
        self.child_layer_depth
    }

    pub fn max_sweeps(&self) -> usize {
        self.max_sweeps
    }

    fn validate(&self) -> Result<(), StrataError> {
        if !self.expansion_factor.is_finite() || self.expansion_factor <= 0.0 {
            return Err(StrataError::Config(format!(
                "layout.expansion_factor must be positive and finite, got {}",
                self.expansion_factor
            )));
        }
        if !self.child_layer_depth.is_finite() {
            return Err(StrataError::Config(
                "layout.child_layer_depth must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durations of layer transitions, in seconds of animation time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    expand_duration: f32,
    collapse_duration: f32,
    focus_duration: f32,

    /// Animation time advanced by each render-loop tick.
    frame_step: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            expand_duration: 2.0,
            collapse_duration: 2.0,
            focus_duration: 1.0,
            frame_step: 0.1,
        }
    }
}

impl AnimationConfig {
    pub fn new(expand_duration: f32, collapse_duration: f32, focus_duration: f32, frame_step: f32) -> Self {
        Self {
            expand_duration,
            collapse_duration,
            focus_duration,
            frame_step,
        }
    }

    pub fn expand_duration(&self) -> f32 {
        self.expand_duration
    }

    pub fn collapse_duration(&self) -> f32 {
        self.collapse_duration
    }

    pub fn focus_duration(&self) -> f32 {
        self.focus_duration
    }

    pub fn frame_step(&self) -> f32 {
        self.frame_step
    }

    fn validate(&self) -> Result<(), StrataError> {
        if !self.frame_step.is_finite() || self.frame_step <= 0.0 {
            return Err(StrataError::Config(format!(
                "animation.frame_step must be positive and finite, got {}",
                self.frame_step
            )));
        }
        let durations = [
            ("expand_duration", self.expand_duration),
            ("collapse_duration", self.collapse_duration),
            ("focus_duration", self.focus_duration),
        ];
        for (name, duration) in durations {
            if !duration.is_finite() || duration < 0.0 {
                return Err(StrataError::Config(format!(
                    "animation.{name} must be finite and not negative, got {duration}"
                )));
            }
        }
        Ok(())
    }
}

/// Visual styling of scene proxies.
///
/// Colors are kept as strings and parsed on access, so that a bad value is
/// reported with its field name.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Layer colors indexed by nesting depth, as color strings.
    palette: Vec<String>,

    /// Color of plain modules, as a color string.
    module_color: String,

    /// Opacity of an entity that was expanded, and of its connections.
    dim_opacity: f32,

    /// Opacity of a layer toggled transparent.
    transparent_opacity: f32,

    /// How far layer backgrounds are moved towards white.
    background_whitening: f32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            palette: ["#3399ff", "#9933ff", "#ff9933", "#ff3399", "#33ff99", "#99ff33"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            module_color: "#f5f5f5".to_string(),
            dim_opacity: 0.2,
            transparent_opacity: 0.3,
            background_whitening: 0.5,
        }
    }
}

impl StyleConfig {
    /// Returns the parsed depth palette.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first color string that cannot be parsed.
    pub fn palette(&self) -> Result<DepthPalette, String> {
        self.palette
            .iter()
            .map(|color| Color::new(color))
            .collect::<Result<Vec<_>, _>>()
            .map(DepthPalette::new)
            .map_err(|err| format!("Invalid palette color in config: {err}"))
    }

    /// Returns the parsed module [`Color`].
    pub fn module_color(&self) -> Result<Color, String> {
        Color::new(&self.module_color).map_err(|err| format!("Invalid module color in config: {err}"))
    }

    pub fn dim_opacity(&self) -> f32 {
        self.dim_opacity
    }

    pub fn transparent_opacity(&self) -> f32 {
        self.transparent_opacity
    }

    pub fn background_whitening(&self) -> f32 {
        self.background_whitening
    }

    /// Parses colors and checks ranges, producing the values the scene uses.
    pub fn resolve(&self) -> Result<Style, String> {
        let opacities = [
            ("dim_opacity", self.dim_opacity),
            ("transparent_opacity", self.transparent_opacity),
            ("background_whitening", self.background_whitening),
        ];
        for (name, value) in opacities {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("style.{name} must be within [0, 1], got {value}"));
            }
        }
        Ok(Style {
            palette: self.palette()?,
            module_color: self.module_color()?,
            dim_opacity: self.dim_opacity,
            transparent_opacity: self.transparent_opacity,
            background_whitening: self.background_whitening,
        })
    }
}

/// Resolved [`StyleConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub palette: DepthPalette,
    pub module_color: Color,
    pub dim_opacity: f32,
    pub transparent_opacity: f32,
    pub background_whitening: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            palette: DepthPalette::default(),
            module_color: Color::default(),
            dim_opacity: 0.2,
            transparent_opacity: 0.3,
            background_whitening: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.layout().engine(), LayoutEngine::Layered);
        assert_eq!(config.layout().child_layer_depth(), 100.0);
        assert_eq!(config.animation().expand_duration(), 2.0);
        assert_eq!(config.animation().focus_duration(), 1.0);

        let style = config.style().resolve().expect("default style is valid");
        assert_eq!(style.palette.color(0).to_rgb_hex(), 0x3399ff);
        assert_eq!(style.module_color.to_rgb_hex(), 0xf5f5f5);
        assert_eq!(style.dim_opacity, 0.2);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [animation]
            frame_step = 0.5
            "#,
        )
        .expect("valid configuration");
        assert_eq!(config.animation().frame_step(), 0.5);
        assert_eq!(config.animation().collapse_duration(), 2.0);
        assert_eq!(config.layout().max_sweeps(), 24);
    }

    #[test]
    fn test_custom_palette() {
        let config = AppConfig::from_toml_str(
            r##"
            [style]
            palette = ["red", "#00ff00"]
            "##,
        )
        .expect("valid configuration");
        let palette = config.style().palette().expect("valid palette");
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.color(2).to_rgb_hex(), 0xff0000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_color = AppConfig::from_toml_str(
            r#"
            [style]
            module_color = "not-a-color"
            "#,
        );
        assert!(matches!(bad_color, Err(StrataError::Config(_))));

        let bad_step = AppConfig::from_toml_str(
            r#"
            [animation]
            frame_step = 0.0
            "#,
        );
        assert!(matches!(bad_step, Err(StrataError::Config(_))));

        let bad_opacity = AppConfig::from_toml_str(
            r#"
            [style]
            dim_opacity = 1.5
            "#,
        );
        assert!(matches!(bad_opacity, Err(StrataError::Config(_))));
    }

    #[test]
    fn test_infinite_values_are_rejected() {
        let infinite_factor = AppConfig::from_toml_str(
            r#"
            [layout]
            expansion_factor = inf
            "#,
        );
        assert!(matches!(infinite_factor, Err(StrataError::Config(_))));

        let infinite_duration = AppConfig::from_toml_str(
            r#"
            [animation]
            collapse_duration = inf
            "#,
        );
        assert!(matches!(infinite_duration, Err(StrataError::Config(_))));

        let infinite_step = AppConfig::from_toml_str(
            r#"
            [animation]
            frame_step = inf
            "#,
        );
        assert!(matches!(infinite_step, Err(StrataError::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = AppConfig::from_toml_str("[layout\nengine = 3");
        assert!(matches!(result, Err(StrataError::ConfigFormat(_))));
    }

    #[test]
    fn test_unknown_engine() {
        let result = AppConfig::from_toml_str(
            r#"
            [layout]
            engine = "radial"
            "#,
        );
        assert!(matches!(result, Err(StrataError::ConfigFormat(_))));
    }
}
