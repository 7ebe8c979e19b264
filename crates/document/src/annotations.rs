//! 3D labels and completed measurements

// standard library
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

// crate modules
use crate::options::SliceType;

// external crates
use serde::{Deserialize, Serialize};

/// Horizontal alignment of label text
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    #[default]
    Left,
    Right,
    Center,
}

/// Decoration at the end of a label line
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    #[default]
    None,
    Circle,
    Ring,
}

/// Screen anchor of a label as a set of flags
///
/// One vertical flag combined with one horizontal flag, or
/// [NONE](LabelAnchor::NONE) for a label placed in 3D.
///
/// ```rust
/// # use voltools_document::LabelAnchor;
/// let anchor = LabelAnchor::TOP | LabelAnchor::RIGHT;
/// assert_eq!(anchor, LabelAnchor::TOP_RIGHT);
/// assert!(anchor.contains(LabelAnchor::TOP));
/// assert!(!anchor.contains(LabelAnchor::LEFT));
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelAnchor(pub u8);

impl LabelAnchor {
    pub const NONE: Self = Self(0);
    pub const LEFT: Self = Self(1 << 0);
    pub const CENTER: Self = Self(1 << 1);
    pub const RIGHT: Self = Self(1 << 2);
    pub const TOP: Self = Self(1 << 3);
    pub const MIDDLE: Self = Self(1 << 4);
    pub const BOTTOM: Self = Self(1 << 5);

    pub const TOP_LEFT: Self = Self(Self::TOP.0 | Self::LEFT.0);
    pub const TOP_CENTER: Self = Self(Self::TOP.0 | Self::CENTER.0);
    pub const TOP_RIGHT: Self = Self(Self::TOP.0 | Self::RIGHT.0);
    pub const MIDDLE_LEFT: Self = Self(Self::MIDDLE.0 | Self::LEFT.0);
    pub const MIDDLE_CENTER: Self = Self(Self::MIDDLE.0 | Self::CENTER.0);
    pub const MIDDLE_RIGHT: Self = Self(Self::MIDDLE.0 | Self::RIGHT.0);
    pub const BOTTOM_LEFT: Self = Self(Self::BOTTOM.0 | Self::LEFT.0);
    pub const BOTTOM_CENTER: Self = Self(Self::BOTTOM.0 | Self::CENTER.0);
    pub const BOTTOM_RIGHT: Self = Self(Self::BOTTOM.0 | Self::RIGHT.0);

    /// True if every flag in `other` is set
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True for labels anchored to the screen rather than a 3D point
    pub fn is_screen_anchored(&self) -> bool {
        self.0 != 0
    }
}

impl BitOr for LabelAnchor {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Appearance of a label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelStyle {
    pub text_color: Vec<f64>,
    pub text_scale: f64,
    pub text_alignment: TextAlignment,
    pub line_width: f64,
    pub line_color: Vec<f64>,
    pub line_terminator: LineTerminator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bullet_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bullet_color: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Vec<f64>>,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            text_color: vec![1.0, 1.0, 1.0, 1.0],
            text_scale: 1.0,
            text_alignment: TextAlignment::Left,
            line_width: 0.0,
            line_color: vec![0.0, 0.0, 0.0],
            line_terminator: LineTerminator::None,
            bullet_scale: None,
            bullet_color: None,
            background_color: None,
        }
    }
}

/// Points a label line is drawn to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelPoints {
    /// A single point
    Single(Vec<f64>),
    /// Several points
    Many(Vec<Vec<f64>>),
}

/// Click handler attached to a label at runtime
///
/// Never serialized. Two handlers are equal only if they are the same
/// allocation.
#[derive(Clone)]
pub struct LabelCallback(pub Arc<dyn Fn(&Label) + Send + Sync>);

impl fmt::Debug for LabelCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LabelCallback")
    }
}

impl PartialEq for LabelCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A text label, optionally with lines to points in the scene
///
/// ```rust
/// # use voltools_document::{Label, LabelAnchor};
/// let mut label = Label::new("hippocampus");
/// label.anchor = LabelAnchor::BOTTOM_LEFT;
/// label.on_click(|l| println!("clicked {}", l.text));
///
/// // the handler is dropped from the portable form
/// let json = serde_json::to_value(&label).unwrap();
/// assert_eq!(json["anchor"], 33);
/// assert!(json.get("onClick").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub text: String,
    pub style: LabelStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<LabelPoints>,
    pub anchor: LabelAnchor,
    #[serde(skip)]
    pub on_click: Option<LabelCallback>,
}

impl Label {
    /// Label with the default style and no anchor
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Attach a click handler
    pub fn on_click<F: Fn(&Label) + Send + Sync + 'static>(&mut self, handler: F) {
        self.on_click = Some(LabelCallback(Arc::new(handler)));
    }

    /// Invoke the click handler, if there is one
    pub fn click(&self) {
        if let Some(LabelCallback(handler)) = &self.on_click {
            handler(self);
        }
    }
}

/// Distance measured between two points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMeasurement {
    #[serde(rename = "startMM")]
    pub start_mm: [f64; 3],
    #[serde(rename = "endMM")]
    pub end_mm: [f64; 3],
    /// Length in mm
    pub distance: f64,
    pub slice_index: i64,
    pub slice_type: SliceType,
    pub slice_position: f64,
}

impl CompletedMeasurement {
    /// Measurement between two points, with the distance filled in
    pub fn between(start_mm: [f64; 3], end_mm: [f64; 3], slice_type: SliceType) -> Self {
        let distance = (0..3)
            .map(|i| (end_mm[i] - start_mm[i]).powi(2))
            .sum::<f64>()
            .sqrt();
        Self {
            start_mm,
            end_mm,
            distance,
            slice_index: 0,
            slice_type,
            slice_position: 0.0,
        }
    }
}

/// A line segment in world mm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineMm {
    pub start: [f64; 3],
    pub end: [f64; 3],
}

/// Angle measured between two lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedAngle {
    #[serde(rename = "firstLineMM")]
    pub first_line_mm: LineMm,
    #[serde(rename = "secondLineMM")]
    pub second_line_mm: LineMm,
    /// Angle in degrees
    pub angle: f64,
    pub slice_index: i64,
    pub slice_type: SliceType,
    pub slice_position: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_take_either_shape() {
        let one: LabelPoints = serde_json::from_str("[1, 2, 3]").unwrap();
        let many: LabelPoints = serde_json::from_str("[[1, 2, 3], [4, 5, 6]]").unwrap();
        assert_eq!(one, LabelPoints::Single(vec![1.0, 2.0, 3.0]));
        assert!(matches!(many, LabelPoints::Many(p) if p.len() == 2));
    }

    #[test]
    fn style_defaults_fill_gaps() {
        let label: Label = serde_json::from_str(r#"{"text": "x", "style": {"textScale": 2}}"#).unwrap();
        assert_eq!(label.style.text_scale, 2.0);
        assert_eq!(label.style.text_color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(label.anchor, LabelAnchor::NONE);
    }

    #[test]
    fn measurement_distance() {
        let m = CompletedMeasurement::between([0.0, 0.0, 0.0], [3.0, 4.0, 0.0], SliceType::Axial);
        assert_eq!(m.distance, 5.0);
    }
}
