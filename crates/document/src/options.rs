//! Document wide options and change observers
//!
//! [ConfigOptions] is a plain record with a fixed default set. Changes made
//! through [ObservedOptions] are reported to every registered observer as
//! `(name, new, old)`, with the name being the serialized field name.

// standard library
use std::fmt;

// crate modules
use crate::error::{Error, Result};

// voltools modules
use voltools_utils::f;

// external crates
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Enums stored as small integers in documents
macro_rules! numeric_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(into = "u8", try_from = "u8")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = String;

            fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(f!("{value} is not a valid {}", stringify!($name))),
                }
            }
        }
    };
}

numeric_enum! {
    /// Which 2D or 3D view is shown
    SliceType {
        Axial = 0,
        Coronal = 1,
        Sagittal = 2,
        Multiplanar = 3,
        Render = 4,
    }
}

numeric_enum! {
    /// What a mouse drag does
    DragMode {
        None = 0,
        Contrast = 1,
        Measurement = 2,
        Pan = 3,
        Slicer3D = 4,
        CallbackOnly = 5,
        RoiSelection = 6,
        Angle = 7,
        Crosshair = 8,
        Windowing = 9,
    }
}

numeric_enum! {
    /// When the 3D render tile is shown in multiplanar views
    ShowRender {
        Never = 0,
        Always = 1,
        Auto = 2,
    }
}

numeric_enum! {
    /// Arrangement of multiplanar tiles
    MultiplanarType {
        Auto = 0,
        Column = 1,
        Grid = 2,
        Row = 3,
    }
}

numeric_enum! {
    /// Shape drawn by the pen
    PenType {
        Pen = 0,
        Rectangle = 1,
        Ellipse = 2,
    }
}

/// The full options record of a document
///
/// Every field always has a value. Fields missing from an imported document
/// take their defaults, see [ConfigOptions::merged()].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOptions {
    #[serde(with = "crate::sentinel")]
    pub text_height: f64,
    #[serde(with = "crate::sentinel")]
    pub font_size_scaling: f64,
    #[serde(with = "crate::sentinel")]
    pub font_min_px: f64,
    #[serde(with = "crate::sentinel")]
    pub colorbar_height: f64,
    #[serde(with = "crate::sentinel")]
    pub colorbar_width: f64,
    pub show_colorbar_border: bool,
    #[serde(with = "crate::sentinel")]
    pub crosshair_width: f64,
    pub crosshair_width_unit: String,
    #[serde(with = "crate::sentinel")]
    pub crosshair_gap: f64,
    #[serde(with = "crate::sentinel")]
    pub ruler_width: f64,
    #[serde(rename = "show3Dcrosshair")]
    pub show_3d_crosshair: bool,
    #[serde(with = "crate::sentinel::vec")]
    pub back_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub crosshair_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub font_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub selection_box_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub clip_plane_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub paqd_uniforms: Vec<f64>,
    #[serde(with = "crate::sentinel")]
    pub clip_thick: f64,
    #[serde(with = "crate::sentinel::vec")]
    pub clip_volume_low: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub clip_volume_high: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub ruler_color: Vec<f64>,
    #[serde(with = "crate::sentinel")]
    pub colorbar_margin: f64,
    pub trust_cal_min_max: bool,
    pub clip_plane_hot_key: String,
    pub view_mode_hot_key: String,
    #[serde(with = "crate::sentinel")]
    pub double_touch_timeout: f64,
    #[serde(with = "crate::sentinel")]
    pub long_touch_timeout: f64,
    #[serde(with = "crate::sentinel")]
    pub key_debounce_time: f64,
    pub is_nearest_interpolation: bool,
    pub is_resize_canvas: bool,
    #[serde(with = "crate::sentinel")]
    pub atlas_outline: f64,
    #[serde(with = "crate::sentinel")]
    pub atlas_active_index: f64,
    pub is_ruler: bool,
    pub is_colorbar: bool,
    pub is_orient_cube: bool,
    #[serde(with = "crate::sentinel")]
    pub tile_margin: f64,
    #[serde(with = "crate::sentinel")]
    pub multiplanar_pad_pixels: f64,
    pub multiplanar_force_render: bool,
    pub multiplanar_equal_size: bool,
    pub multiplanar_show_render: ShowRender,
    pub is_radiological_convention: bool,
    /// Mesh thickness in 2D views, infinite to show whole meshes
    #[serde(rename = "meshThicknessOn2D", with = "crate::sentinel")]
    pub mesh_thickness_on_2d: f64,
    pub drag_mode: DragMode,
    pub drag_mode_primary: DragMode,
    pub mouse_event_config: Option<Value>,
    pub touch_event_config: Option<Value>,
    #[serde(rename = "yoke3Dto2DZoom")]
    pub yoke_3d_to_2d_zoom: bool,
    pub is_depth_pick_mesh: bool,
    pub is_corner_orientation_text: bool,
    pub is_orientation_text_visible: bool,
    pub show_all_orientation_markers: bool,
    #[serde(with = "crate::sentinel")]
    pub hero_image_fraction: f64,
    pub hero_slice_type: SliceType,
    pub sagittal_nose_left: bool,
    #[serde(rename = "isSliceMM")]
    pub is_slice_mm: bool,
    #[serde(rename = "isV1SliceShader")]
    pub is_v1_slice_shader: bool,
    #[serde(with = "crate::sentinel")]
    pub force_device_pixel_ratio: f64,
    pub log_level: String,
    pub loading_text: String,
    pub is_force_mouse_click_to_voxel_centers: bool,
    pub drag_and_drop_enabled: bool,
    pub drawing_enabled: bool,
    #[serde(with = "crate::sentinel")]
    pub pen_value: f64,
    pub pen_type: PenType,
    #[serde(with = "crate::sentinel")]
    pub flood_fill_neighbors: f64,
    pub is_filled_pen: bool,
    pub thumbnail: String,
    #[serde(with = "crate::sentinel")]
    pub max_draw_undo_bitmaps: f64,
    pub slice_type: SliceType,
    #[serde(with = "crate::sentinel")]
    pub mesh_x_ray: f64,
    pub is_anti_alias: Option<bool>,
    /// Frames loaded per 4D volume, NaN for all of them
    #[serde(rename = "limitFrames4D", with = "crate::sentinel")]
    pub limit_frames_4d: f64,
    pub is_additive_blend: bool,
    pub show_legend: bool,
    #[serde(with = "crate::sentinel::vec")]
    pub legend_background_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub legend_text_color: Vec<f64>,
    pub multiplanar_layout: MultiplanarType,
    #[serde(with = "crate::sentinel")]
    pub render_overlay_blend: f64,
    pub slice_mosaic_string: String,
    pub center_mosaic: bool,
    #[serde(with = "crate::sentinel")]
    pub pen_size: f64,
    pub interactive: bool,
    pub click_to_segment: bool,
    #[serde(with = "crate::sentinel")]
    pub click_to_segment_radius: f64,
    pub click_to_segment_bright: bool,
    pub click_to_segment_auto_intensity: bool,
    #[serde(with = "crate::sentinel")]
    pub click_to_segment_intensity_max: f64,
    #[serde(with = "crate::sentinel")]
    pub click_to_segment_intensity_min: f64,
    #[serde(with = "crate::sentinel")]
    pub click_to_segment_percent: f64,
    #[serde(rename = "clickToSegmentMaxDistanceMM", with = "crate::sentinel")]
    pub click_to_segment_max_distance_mm: f64,
    #[serde(rename = "clickToSegmentIs2D")]
    pub click_to_segment_is_2d: bool,
    #[serde(with = "crate::sentinel")]
    pub selection_box_line_thickness: f64,
    pub selection_box_is_outline: bool,
    pub scroll_requires_focus: bool,
    pub show_measure_units: bool,
    pub measure_text_justify: String,
    #[serde(with = "crate::sentinel::vec")]
    pub measure_text_color: Vec<f64>,
    #[serde(with = "crate::sentinel::vec")]
    pub measure_line_color: Vec<f64>,
    #[serde(with = "crate::sentinel")]
    pub measure_text_height: f64,
    pub is_alpha_clip_dark: bool,
    #[serde(with = "crate::sentinel")]
    pub gradient_order: f64,
    #[serde(with = "crate::sentinel")]
    pub gradient_opacity: f64,
    #[serde(with = "crate::sentinel")]
    pub render_silhouette: f64,
    #[serde(with = "crate::sentinel")]
    pub gradient_amount: f64,
    pub invert_scroll_direction: bool,
    #[serde(rename = "is2DSliceShader")]
    pub is_2d_slice_shader: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            text_height: -1.0,
            font_size_scaling: 0.4,
            font_min_px: 13.0,
            colorbar_height: 0.05,
            colorbar_width: -1.0,
            show_colorbar_border: true,
            crosshair_width: 1.0,
            crosshair_width_unit: "voxels".to_string(),
            crosshair_gap: 0.0,
            ruler_width: 4.0,
            show_3d_crosshair: false,
            back_color: vec![0.0, 0.0, 0.0, 1.0],
            crosshair_color: vec![1.0, 0.0, 0.0, 1.0],
            font_color: vec![0.5, 0.5, 0.5, 1.0],
            selection_box_color: vec![1.0, 1.0, 1.0, 0.5],
            clip_plane_color: vec![0.7, 0.0, 0.7, 0.5],
            paqd_uniforms: vec![0.3, 0.5, 0.5, 1.0],
            clip_thick: 2.0,
            clip_volume_low: vec![0.0, 0.0, 0.0],
            clip_volume_high: vec![1.0, 1.0, 1.0],
            ruler_color: vec![1.0, 0.0, 0.0, 0.8],
            colorbar_margin: 0.05,
            trust_cal_min_max: true,
            clip_plane_hot_key: "KeyC".to_string(),
            view_mode_hot_key: "KeyV".to_string(),
            double_touch_timeout: 500.0,
            long_touch_timeout: 1000.0,
            key_debounce_time: 50.0,
            is_nearest_interpolation: false,
            is_resize_canvas: true,
            atlas_outline: 0.0,
            atlas_active_index: 0.0,
            is_ruler: false,
            is_colorbar: false,
            is_orient_cube: false,
            tile_margin: 0.0,
            multiplanar_pad_pixels: 0.0,
            multiplanar_force_render: false,
            multiplanar_equal_size: false,
            multiplanar_show_render: ShowRender::Auto,
            is_radiological_convention: false,
            mesh_thickness_on_2d: f64::INFINITY,
            drag_mode: DragMode::Contrast,
            drag_mode_primary: DragMode::Crosshair,
            mouse_event_config: None,
            touch_event_config: None,
            yoke_3d_to_2d_zoom: false,
            is_depth_pick_mesh: false,
            is_corner_orientation_text: false,
            is_orientation_text_visible: true,
            show_all_orientation_markers: false,
            hero_image_fraction: 0.0,
            hero_slice_type: SliceType::Render,
            sagittal_nose_left: false,
            is_slice_mm: false,
            is_v1_slice_shader: false,
            force_device_pixel_ratio: 0.0,
            log_level: "info".to_string(),
            loading_text: "loading ...".to_string(),
            is_force_mouse_click_to_voxel_centers: false,
            drag_and_drop_enabled: true,
            drawing_enabled: false,
            pen_value: 1.0,
            pen_type: PenType::Pen,
            flood_fill_neighbors: 6.0,
            is_filled_pen: false,
            thumbnail: String::new(),
            max_draw_undo_bitmaps: 8.0,
            slice_type: SliceType::Multiplanar,
            mesh_x_ray: 0.0,
            is_anti_alias: None,
            limit_frames_4d: f64::NAN,
            is_additive_blend: false,
            show_legend: true,
            legend_background_color: vec![0.3, 0.3, 0.3, 0.5],
            legend_text_color: vec![1.0, 1.0, 1.0, 1.0],
            multiplanar_layout: MultiplanarType::Auto,
            render_overlay_blend: 1.0,
            slice_mosaic_string: String::new(),
            center_mosaic: false,
            pen_size: 1.0,
            interactive: true,
            click_to_segment: false,
            click_to_segment_radius: 3.0,
            click_to_segment_bright: true,
            click_to_segment_auto_intensity: false,
            click_to_segment_intensity_max: f64::NAN,
            click_to_segment_intensity_min: f64::NAN,
            click_to_segment_percent: 0.0,
            click_to_segment_max_distance_mm: f64::INFINITY,
            click_to_segment_is_2d: false,
            selection_box_line_thickness: 4.0,
            selection_box_is_outline: false,
            scroll_requires_focus: false,
            show_measure_units: true,
            measure_text_justify: "center".to_string(),
            measure_text_color: vec![1.0, 0.0, 0.0, 1.0],
            measure_line_color: vec![1.0, 0.0, 0.0, 1.0],
            measure_text_height: 0.06,
            is_alpha_clip_dark: false,
            gradient_order: 1.0,
            gradient_opacity: 0.0,
            render_silhouette: 0.0,
            gradient_amount: 0.0,
            invert_scroll_direction: false,
            is_2d_slice_shader: false,
        }
    }
}

impl ConfigOptions {
    /// Every field as a JSON object, non-finite numbers as sentinels
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Only the fields that differ from `defaults`
    ///
    /// Arrays are compared element by element and written whole if any
    /// element differs.
    ///
    /// ```rust
    /// # use voltools_document::ConfigOptions;
    /// let mut opts = ConfigOptions::default();
    /// opts.is_colorbar = true;
    /// opts.back_color[3] = 0.5;
    ///
    /// let diff = opts.diff(&ConfigOptions::default());
    /// assert_eq!(diff.len(), 2);
    /// assert_eq!(diff["backColor"], serde_json::json!([0.0, 0.0, 0.0, 0.5]));
    /// ```
    pub fn diff(&self, defaults: &ConfigOptions) -> Map<String, Value> {
        let base = defaults.to_map();
        self.to_map()
            .into_iter()
            .filter(|(key, value)| base.get(key) != Some(value))
            .collect()
    }

    /// Defaults overlaid with the fields of a possibly partial record
    ///
    /// Unknown keys are ignored. A key whose value has the wrong type keeps
    /// its default and is logged, so one bad field never loses the rest.
    ///
    /// ```rust
    /// # use voltools_document::ConfigOptions;
    /// # use serde_json::json;
    /// let partial = json!({"isColorbar": true, "meshThicknessOn2D": "infinity", "penSize": "big"});
    /// let opts = ConfigOptions::merged(partial.as_object().unwrap());
    ///
    /// assert!(opts.is_colorbar);
    /// assert_eq!(opts.mesh_thickness_on_2d, f64::INFINITY);
    /// assert_eq!(opts.pen_size, 1.0);
    /// ```
    pub fn merged(partial: &Map<String, Value>) -> Self {
        let mut base = Self::default().to_map();
        for (key, value) in partial {
            if base.contains_key(key) {
                base.insert(key.clone(), value.clone());
            } else {
                debug!("ignoring unknown option {key:?}");
            }
        }

        if let Ok(opts) = serde_json::from_value(Value::Object(base)) {
            return opts;
        }

        // retry one field at a time to find the offenders
        let mut good = Self::default().to_map();
        for (key, value) in partial {
            if !good.contains_key(key) {
                continue;
            }
            let mut trial = good.clone();
            trial.insert(key.clone(), value.clone());
            if serde_json::from_value::<Self>(Value::Object(trial.clone())).is_ok() {
                good = trial;
            } else {
                warn!("option {key:?} has an invalid value {value}, using the default");
            }
        }
        serde_json::from_value(Value::Object(good)).unwrap_or_default()
    }

    /// Value of a single field by its serialized name
    pub fn get(&self, name: &str) -> Option<Value> {
        self.to_map().remove(name)
    }
}

/// Handle returned when registering an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(usize);

type Observer = Box<dyn FnMut(&str, &Value, &Value)>;

/// [ConfigOptions] with a list of change observers
///
/// Observers are only told about fields whose value actually changed, and
/// are called in registration order.
///
/// ```rust
/// # use std::{cell::RefCell, rc::Rc};
/// # use voltools_document::ObservedOptions;
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let log = Rc::clone(&seen);
///
/// let mut opts = ObservedOptions::default();
/// opts.subscribe(move |name, new, _old| log.borrow_mut().push(format!("{name}={new}")));
///
/// opts.update(|o| {
///     o.is_ruler = true;
///     o.pen_size = 1.0; // unchanged
/// });
/// opts.set("crosshairGap", 2.into()).unwrap();
///
/// assert_eq!(*seen.borrow(), ["isRuler=true", "crosshairGap=2.0"]);
/// ```
#[derive(Default)]
pub struct ObservedOptions {
    options: ConfigOptions,
    observers: Vec<(ObserverId, Observer)>,
    next_id: usize,
}

impl ObservedOptions {
    /// Wrap an existing record with no observers
    pub fn new(options: ConfigOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// The current options
    pub fn get(&self) -> &ConfigOptions {
        &self.options
    }

    /// Register a `(name, new, old)` callback
    pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&str, &Value, &Value) + 'static,
    {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove a callback, returning false if it was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(i, _)| *i != id);
        self.observers.len() != before
    }

    /// Number of registered callbacks
    pub fn n_observers(&self) -> usize {
        self.observers.len()
    }

    /// Change any number of fields and notify observers of the differences
    ///
    /// Returns the names of the fields that changed.
    pub fn update<F: FnOnce(&mut ConfigOptions)>(&mut self, change: F) -> Vec<String> {
        let before = self.options.to_map();
        change(&mut self.options);
        let after = self.options.to_map();

        let mut changed = Vec::new();
        for (name, new) in &after {
            let old = before.get(name).unwrap_or(&Value::Null);
            if old != new {
                self.notify(name, new, old);
                changed.push(name.clone());
            }
        }
        changed
    }

    /// Change a single field by its serialized name
    ///
    /// Returns whether the value changed. Unknown names and values of the
    /// wrong type are errors and leave the options untouched.
    pub fn set(&mut self, name: &str, value: Value) -> Result<bool> {
        let mut map = self.options.to_map();
        let Some(old) = map.get(name).cloned() else {
            return Err(Error::UnknownOption(name.to_string()));
        };

        map.insert(name.to_string(), value);
        let options: ConfigOptions =
            serde_json::from_value(Value::Object(map)).map_err(|e| Error::InvalidOption {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        // compare the normalised value, so 2 and 2.0 are the same
        let new = options.get(name).unwrap_or(Value::Null);
        if new == old {
            return Ok(false);
        }
        self.options = options;
        self.notify(name, &new, &old);
        Ok(true)
    }

    /// Replace the whole record without notifying anyone
    pub fn replace(&mut self, options: ConfigOptions) {
        self.options = options;
    }

    fn notify(&mut self, name: &str, new: &Value, old: &Value) {
        for (_, observer) in self.observers.iter_mut() {
            observer(name, new, old);
        }
    }
}

impl fmt::Debug for ObservedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedOptions")
            .field("options", &self.options)
            .field("observers", &self.observers.len())
            .finish()
    }
}
