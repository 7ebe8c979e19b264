//! Discrete colour tables for label atlases

// crate modules
use crate::error::{Error, Result};

// voltools modules
use voltools_utils::f;

// external crates
use serde::{Deserialize, Serialize};

/// Alpha given to labels when the table has no alpha channel
const DEFAULT_LABEL_ALPHA: u8 = 64;

/// Colour table as stored in documents and label files
///
/// Channels are index aligned. `I` gives the label value for each entry and
/// defaults to `0..n` when absent.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorMap {
    /// Red channel
    #[serde(rename = "R")]
    pub r: Vec<u8>,
    /// Green channel
    #[serde(rename = "G")]
    pub g: Vec<u8>,
    /// Blue channel
    #[serde(rename = "B")]
    pub b: Vec<u8>,
    /// Optional alpha channel
    #[serde(rename = "A", default, skip_serializing_if = "Option::is_none")]
    pub a: Option<Vec<u8>>,
    /// Optional label value of each entry
    #[serde(rename = "I", default, skip_serializing_if = "Option::is_none")]
    pub i: Option<Vec<i64>>,
    /// Optional label names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Dense RGBA lookup from label value to colour
#[derive(Debug, Clone, PartialEq)]
pub struct LabelLut {
    /// Four bytes per label from `min` to `max` inclusive
    pub lut: Vec<u8>,
    /// Smallest label value
    pub min: i64,
    /// Largest label value
    pub max: i64,
    /// Names for every label in the dense range, `?` where unnamed
    pub labels: Option<Vec<String>>,
}

impl LabelLut {
    /// Build a dense table from a possibly sparse [ColorMap]
    ///
    /// Values missing from a sparse table are fully transparent black. When
    /// no alpha channel is given the first entry is transparent and the rest
    /// are partially opaque.
    ///
    /// ```rust
    /// # use voltools_volume::{ColorMap, LabelLut};
    /// let cmap = ColorMap {
    ///     r: vec![0, 255, 0],
    ///     g: vec![0, 0, 255],
    ///     b: vec![0, 0, 0],
    ///     i: Some(vec![0, 3, 4]),
    ///     labels: Some(vec!["air".into(), "left".into(), "right".into()]),
    ///     ..Default::default()
    /// };
    ///
    /// let lut = LabelLut::from_colormap(&cmap).unwrap();
    /// assert_eq!((lut.min, lut.max), (0, 4));
    /// assert_eq!(lut.rgba(3), Some([255, 0, 0, 64]));
    /// assert_eq!(lut.rgba(1), Some([0, 0, 0, 0]));
    /// assert_eq!(lut.name(4), Some("right"));
    /// assert_eq!(lut.name(2), Some("?"));
    /// ```
    pub fn from_colormap(cmap: &ColorMap) -> Result<Self> {
        let n = cmap.r.len();
        let indices = cmap.i.clone().unwrap_or_else(|| (0..n as i64).collect());
        if n == 0 || cmap.g.len() != n || cmap.b.len() != n || indices.len() != n {
            return Err(Error::InvalidColorMap(f!(
                "channel lengths R {} G {} B {} I {}",
                n,
                cmap.g.len(),
                cmap.b.len(),
                indices.len()
            )));
        }

        let alpha = match &cmap.a {
            Some(a) if a.len() == n => a.clone(),
            Some(a) => {
                return Err(Error::InvalidColorMap(f!("alpha has {} entries, expected {n}", a.len())))
            }
            None => {
                let mut a = vec![DEFAULT_LABEL_ALPHA; n];
                a[0] = 0;
                a
            }
        };

        let min = indices.iter().copied().min().unwrap_or(0);
        let max = indices.iter().copied().max().unwrap_or(0);
        let dense = (max - min + 1) as usize;

        let mut lut = vec![0; dense * 4];
        for (k, &index) in indices.iter().enumerate() {
            let at = (index - min) as usize * 4;
            lut[at..at + 4].copy_from_slice(&[cmap.r[k], cmap.g[k], cmap.b[k], alpha[k]]);
        }

        let labels = cmap.labels.as_ref().and_then(|names| {
            if names.len() == dense {
                Some(names.clone())
            } else if names.len() == n {
                let mut all = vec!["?".to_string(); dense];
                for (k, &index) in indices.iter().enumerate() {
                    all[(index - min) as usize] = names[k].clone();
                }
                Some(all)
            } else {
                None
            }
        });

        Ok(Self {
            lut,
            min,
            max,
            labels,
        })
    }

    /// Colour of a label value, if in range
    pub fn rgba(&self, value: i64) -> Option<[u8; 4]> {
        if value < self.min || value > self.max {
            return None;
        }
        let at = (value - self.min) as usize * 4;
        self.lut.get(at..at + 4).and_then(|s| s.try_into().ok())
    }

    /// Name of a label value, if named
    pub fn name(&self, value: i64) -> Option<&str> {
        if value < self.min {
            return None;
        }
        self.labels
            .as_ref()
            .and_then(|l| l.get((value - self.min) as usize))
            .map(|s| s.as_str())
    }
}
