//! Triangle meshes, fiber bundles, and connectomes held by a document
//!
//! Numeric arrays are stored at fixed widths: positions as `f32`, indices as
//! `u32`, and colours as `u8`. Fields this crate does not interpret are kept
//! in `extra` and written back unchanged.

// voltools modules
use voltools_utils::f;

// external crates
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn nan() -> f64 {
    f64::NAN
}

/// Per-vertex overlay on a mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshLayer {
    pub name: String,
    pub opacity: f64,
    pub colormap: String,
    pub colormap_negative: String,
    pub use_negative_cmap: bool,
    #[serde(rename = "global_min", with = "crate::sentinel", default = "nan")]
    pub global_min: f64,
    #[serde(rename = "global_max", with = "crate::sentinel", default = "nan")]
    pub global_max: f64,
    #[serde(rename = "cal_min", with = "crate::sentinel", default = "nan")]
    pub cal_min: f64,
    #[serde(rename = "cal_max", with = "crate::sentinel", default = "nan")]
    pub cal_max: f64,
    #[serde(rename = "cal_minNeg", with = "crate::sentinel", default = "nan")]
    pub cal_min_neg: f64,
    #[serde(rename = "cal_maxNeg", with = "crate::sentinel", default = "nan")]
    pub cal_max_neg: f64,
    #[serde(rename = "frame4D")]
    pub frame_4d: usize,
    #[serde(rename = "nFrame4D")]
    pub n_frame_4d: usize,
    /// Values for every vertex of every frame
    pub values: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atlas_values: Option<Vec<f64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MeshLayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            opacity: 0.5,
            colormap: "warm".to_string(),
            colormap_negative: "winter".to_string(),
            use_negative_cmap: false,
            global_min: f64::NAN,
            global_max: f64::NAN,
            cal_min: f64::NAN,
            cal_max: f64::NAN,
            cal_min_neg: f64::NAN,
            cal_max_neg: f64::NAN,
            frame_4d: 0,
            n_frame_4d: 1,
            values: Vec::new(),
            atlas_values: None,
            extra: Map::new(),
        }
    }
}

/// A triangle mesh, or a fiber bundle when `offset_pt0` is present
///
/// ```rust
/// # use voltools_document::Mesh;
/// let mesh = Mesh {
///     name: "tetra".into(),
///     pts: vec![0., 0., 0., 1., 0., 0., 0., 1., 0., 0., 0., 1.],
///     tris: vec![0, 1, 2, 0, 1, 3, 0, 2, 3, 1, 2, 3],
///     ..Default::default()
/// };
/// assert_eq!(mesh.n_vertices(), 4);
/// assert!(mesh.validate().is_ok());
///
/// let broken = Mesh { tris: vec![0, 1, 9], ..mesh };
/// assert!(broken.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Mesh {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Vertex positions as `x, y, z` triplets
    pub pts: Vec<f32>,
    /// Triangle vertex indices
    pub tris: Vec<u32>,
    /// Base colour
    pub rgba255: Vec<u8>,
    pub opacity: f64,
    pub visible: bool,
    pub layers: Vec<MeshLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_shader_index: Option<usize>,
    /// Start vertex of each streamline, ending with the vertex count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_pt0: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_dither: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_group_colormap: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colormap: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            pts: Vec::new(),
            tris: Vec::new(),
            rgba255: vec![255, 255, 255, 255],
            opacity: 1.0,
            visible: true,
            layers: Vec::new(),
            mesh_shader_index: None,
            offset_pt0: None,
            fiber_color: None,
            fiber_dither: None,
            fiber_radius: None,
            fiber_group_colormap: None,
            colormap: None,
            extra: Map::new(),
        }
    }
}

impl Mesh {
    /// Number of vertices
    pub fn n_vertices(&self) -> usize {
        self.pts.len() / 3
    }

    /// True for streamline bundles
    pub fn is_fiber(&self) -> bool {
        self.offset_pt0.as_ref().is_some_and(|o| !o.is_empty())
    }

    /// Zero the alpha of the base colour, which marks per-fiber colouring
    pub fn mark_fiber_alpha(&mut self) {
        if self.rgba255.len() < 4 {
            self.rgba255.resize(4, 255);
        }
        self.rgba255[3] = 0;
    }

    /// Check the arrays describe a usable mesh
    pub fn validate(&self) -> core::result::Result<(), String> {
        if self.pts.len() % 3 != 0 {
            return Err(f!("{} position values is not a whole number of vertices", self.pts.len()));
        }
        let n = self.n_vertices() as u32;
        if let Some(offsets) = self.offset_pt0.as_ref().filter(|o| !o.is_empty()) {
            if offsets.windows(2).any(|w| w[0] > w[1]) {
                return Err("fiber offsets are not ascending".to_string());
            }
            if offsets.iter().any(|o| *o > n) {
                return Err(f!("fiber offset beyond the {n} vertices"));
            }
            return Ok(());
        }
        if self.tris.len() % 3 != 0 {
            return Err(f!("{} indices is not a whole number of triangles", self.tris.len()));
        }
        if let Some(bad) = self.tris.iter().find(|i| **i >= n) {
            return Err(f!("index {bad} out of range for {n} vertices"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            let frames = layer.n_frame_4d.max(1);
            if !layer.values.is_empty() && layer.values.len() != n as usize * frames {
                return Err(f!("layer {i} has {} values for {n} vertices", layer.values.len()));
            }
        }
        Ok(())
    }
}

/// A connectome node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectomeNode {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color_value: f64,
    pub size_value: f64,
}

/// A connectome edge between two node indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectomeEdge {
    pub first: usize,
    pub second: usize,
    pub color_value: f64,
}

/// Graph of nodes and weighted edges drawn as balls and sticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connectome {
    pub name: String,
    pub node_colormap: String,
    pub node_colormap_negative: String,
    pub node_min_color: f64,
    pub node_max_color: f64,
    pub node_scale: f64,
    pub edge_colormap: String,
    pub edge_colormap_negative: String,
    pub edge_min: f64,
    pub edge_max: f64,
    pub edge_scale: f64,
    pub legend_line_thickness: f64,
    pub show_legend: bool,
    pub nodes: Vec<ConnectomeNode>,
    pub edges: Vec<ConnectomeEdge>,
}

impl Default for Connectome {
    fn default() -> Self {
        Self {
            name: "untitled connectome".to_string(),
            node_colormap: "warm".to_string(),
            node_colormap_negative: "winter".to_string(),
            node_min_color: 0.0,
            node_max_color: 4.0,
            node_scale: 3.0,
            edge_colormap: "warm".to_string(),
            edge_colormap_negative: "winter".to_string(),
            edge_min: 2.0,
            edge_max: 6.0,
            edge_scale: 1.0,
            legend_line_thickness: 0.0,
            show_legend: true,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl Connectome {
    /// True for the columnar layout with a dense edge matrix
    pub fn is_legacy(value: &Value) -> bool {
        value.pointer("/nodes/names").is_some_and(Value::is_array)
    }

    /// Convert the columnar layout to node and edge lists
    ///
    /// Nodes are given as parallel `names`, `X`, `Y`, `Z`, `Color`, and
    /// `Size` arrays. `edges` is a dense `n x n` matrix of which only the
    /// upper triangle is read.
    ///
    /// ```rust
    /// # use voltools_document::Connectome;
    /// let legacy = serde_json::json!({
    ///     "name": "triad",
    ///     "nodes": {
    ///         "names": ["a", "b", "c"],
    ///         "X": [0, 1, 2], "Y": [0, 0, 0], "Z": [0, 0, 0],
    ///         "Color": [1, 1, 1], "Size": [2, 2, 2]
    ///     },
    ///     "edges": [0, 5, 6,
    ///               5, 0, 7,
    ///               6, 7, 0]
    /// });
    /// let c = Connectome::from_legacy(&legacy).unwrap();
    /// assert_eq!(c.name, "triad");
    /// assert_eq!(c.nodes.len(), 3);
    /// assert_eq!(c.edges.len(), 3);
    /// assert_eq!((c.edges[2].first, c.edges[2].second, c.edges[2].color_value), (1, 2, 7.0));
    /// ```
    pub fn from_legacy(value: &Value) -> core::result::Result<Self, String> {
        let object = value.as_object().ok_or("connectome is not an object")?;
        let nodes = object
            .get("nodes")
            .and_then(Value::as_object)
            .ok_or("connectome has no node table")?;

        let names: Vec<String> = column(nodes, "names")?
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let n = names.len();
        let numbers = |key: &str| -> core::result::Result<Vec<f64>, String> {
            let values = column(nodes, key)?
                .iter()
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect::<Vec<f64>>();
            if values.len() < n {
                return Err(f!("node column {key} has {} of {n} values", values.len()));
            }
            Ok(values)
        };
        let (x, y, z) = (numbers("X")?, numbers("Y")?, numbers("Z")?);
        let (color, size) = (numbers("Color")?, numbers("Size")?);

        // options present in the legacy record override the defaults
        let mut options = Map::new();
        for (key, v) in object {
            if key != "nodes" && key != "edges" {
                options.insert(key.clone(), v.clone());
            }
        }
        let mut connectome: Connectome =
            serde_json::from_value(Value::Object(options)).map_err(|e| e.to_string())?;

        connectome.nodes = (0..n)
            .map(|i| ConnectomeNode {
                name: names[i].clone(),
                x: x[i],
                y: y[i],
                z: z[i],
                color_value: color[i],
                size_value: size[i],
            })
            .collect();

        let matrix: Vec<f64> = object
            .get("edges")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect())
            .unwrap_or_default();
        if !matrix.is_empty() && matrix.len() < n * n {
            return Err(f!("edge matrix has {} of {} values", matrix.len(), n * n));
        }
        for i in 0..n.saturating_sub(1) {
            for j in (i + 1)..n {
                connectome.edges.push(ConnectomeEdge {
                    first: i,
                    second: j,
                    color_value: matrix.get(i * n + j).copied().unwrap_or(0.0),
                });
            }
        }
        Ok(connectome)
    }

    /// Check that every edge joins existing nodes
    pub fn validate(&self) -> core::result::Result<(), String> {
        let n = self.nodes.len();
        match self.edges.iter().find(|e| e.first >= n || e.second >= n) {
            Some(e) => Err(f!("edge {}-{} refers past {n} nodes", e.first, e.second)),
            None => Ok(()),
        }
    }
}

fn column<'a>(nodes: &'a Map<String, Value>, key: &str) -> core::result::Result<&'a Vec<Value>, String> {
    nodes
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| f!("node column {key} is missing"))
}

/// Any mesh held by a document
#[derive(Debug, Clone, PartialEq)]
pub enum MeshModel {
    Triangle(Mesh),
    Connectome(Connectome),
}

impl MeshModel {
    /// Display name
    pub fn name(&self) -> &str {
        match self {
            Self::Triangle(m) => &m.name,
            Self::Connectome(c) => &c.name,
        }
    }

    pub fn is_connectome(&self) -> bool {
        matches!(self, Self::Connectome(_))
    }

    pub fn validate(&self) -> core::result::Result<(), String> {
        match self {
            Self::Triangle(m) => m.validate(),
            Self::Connectome(c) => c.validate(),
        }
    }
}

impl From<Mesh> for MeshModel {
    fn from(mesh: Mesh) -> Self {
        Self::Triangle(mesh)
    }
}

impl From<Connectome> for MeshModel {
    fn from(connectome: Connectome) -> Self {
        Self::Connectome(connectome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_are_kept() {
        let mesh: Mesh = serde_json::from_value(json!({
            "name": "m",
            "pts": [0, 0, 0],
            "dpv": {"thickness": [1.5]}
        }))
        .unwrap();
        assert_eq!(mesh.extra["dpv"]["thickness"][0], 1.5);
        assert_eq!(serde_json::to_value(&mesh).unwrap()["dpv"], json!({"thickness": [1.5]}));
    }

    #[test]
    fn layer_sentinels() {
        let layer: MeshLayer = serde_json::from_value(json!({"cal_min": "-infinity", "cal_max": 3})).unwrap();
        assert_eq!(layer.cal_min, f64::NEG_INFINITY);
        assert_eq!(layer.cal_max, 3.0);
        assert!(layer.global_min.is_nan());
    }

    #[test]
    fn fiber_offsets_are_checked() {
        let mut fiber = Mesh {
            pts: vec![0.0; 12],
            offset_pt0: Some(vec![0, 2, 4]),
            ..Default::default()
        };
        assert!(fiber.validate().is_ok());
        fiber.mark_fiber_alpha();
        assert_eq!(fiber.rgba255, [255, 255, 255, 0]);
        fiber.offset_pt0 = Some(vec![0, 5]);
        assert!(fiber.validate().is_err());
    }

    #[test]
    fn legacy_connectome_needs_columns() {
        let err = Connectome::from_legacy(&json!({"nodes": {"names": ["a"]}})).unwrap_err();
        assert!(err.contains("X"));
    }
}
