//! Camera and view state of a document

// external crates
use serde::{Deserialize, Serialize};

/// View state saved with a document
///
/// Missing fields take the values of [SceneData::default()], which is the
/// initial scene of a new document.
///
/// ```rust
/// # use voltools_document::SceneData;
/// let scene: SceneData = serde_json::from_str(r#"{"azimuth": 45}"#).unwrap();
/// assert_eq!(scene.azimuth, 45.0);
/// assert_eq!(scene.elevation, 10.0);
/// assert_eq!(scene.crosshair_pos, [0.5, 0.5, 0.5]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneData {
    /// Display gamma
    pub gamma: f64,
    /// Camera azimuth in degrees
    pub azimuth: f64,
    /// Camera elevation in degrees
    pub elevation: f64,
    /// Crosshair location as a fraction of the volume extent
    pub crosshair_pos: [f64; 3],
    /// Clip planes as `[x, y, z, depth]`
    pub clip_planes: Vec<[f64; 4]>,
    /// Clip planes as `[depth, azimuth, elevation]`
    pub clip_plane_depth_azi_elevs: Vec<[f64; 3]>,
    /// 3D zoom
    pub vol_scale_multiplier: f64,
    /// 2D pan in mm plus zoom
    #[serde(rename = "pan2Dxyzmm")]
    pub pan_2d_xyzmm: [f64; 4],
    /// Thickness of the clip slab
    pub clip_thick: f64,
    /// Lower corner of the clip box, as fractions
    pub clip_volume_low: [f64; 3],
    /// Upper corner of the clip box, as fractions
    pub clip_volume_high: [f64; 3],
}

impl Default for SceneData {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            azimuth: 110.0,
            elevation: 10.0,
            crosshair_pos: [0.5, 0.5, 0.5],
            clip_planes: vec![[0.0, 0.0, 0.0, 0.0]],
            clip_plane_depth_azi_elevs: vec![[2.0, 0.0, 0.0]],
            vol_scale_multiplier: 1.0,
            pan_2d_xyzmm: [0.0, 0.0, 0.0, 1.0],
            clip_thick: 2.0,
            clip_volume_low: [0.0, 0.0, 0.0],
            clip_volume_high: [1.0, 1.0, 1.0],
        }
    }
}

impl SceneData {
    /// Set the camera angles, wrapping azimuth into `0..360` and clamping
    /// elevation to `-90..=90`
    ///
    /// ```rust
    /// # use voltools_document::SceneData;
    /// let mut scene = SceneData::default();
    /// scene.set_azimuth_elevation(-30.0, 120.0);
    /// assert_eq!((scene.azimuth, scene.elevation), (330.0, 90.0));
    /// ```
    pub fn set_azimuth_elevation(&mut self, azimuth: f64, elevation: f64) {
        self.azimuth = azimuth.rem_euclid(360.0);
        self.elevation = elevation.clamp(-90.0, 90.0);
    }

    /// The first clip plane, if any
    pub fn clip_plane(&self) -> Option<[f64; 4]> {
        self.clip_planes.first().copied()
    }
}
