//! Device-tree style panel description.
//!
//! A panel is described by a tree of nodes carrying named properties, the
//! same shape a flattened device tree has. The tree is loaded from JSON:
//!
//! ```json
//! {
//!   "name": "panel@0",
//!   "properties": {
//!     "compatible": ["google,dsi_s6e3hc2_gamma"],
//!     "qcom,mdss-dsi-bl-pmic-control-type": "bl_ctrl_dcs",
//!     "qcom,mdss-dsi-bl-max-level": 2047
//!   },
//!   "children": [ { "name": "google,hbm-ranges", "children": [] } ]
//! }
//! ```

use crate::dsi::{CmdSet, CmdState};
use crate::error::PanelError;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    /// Boolean flag; `false` behaves as if the property were absent.
    Bool(bool),
    /// One cell.
    U32(u32),
    /// A cell array (also used for byte strings).
    U32Array(Vec<u32>),
    /// A string.
    Str(String),
    /// A string list.
    StrArray(Vec<String>),
}

impl PropValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U32(_) => "u32",
            Self::U32Array(_) => "u32 array",
            Self::Str(_) => "string",
            Self::StrArray(_) => "string list",
        }
    }
}

/// One node of the panel description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceNode {
    /// Node name; children are looked up by it.
    #[serde(default)]
    pub name: String,
    /// Properties keyed by their full name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropValue>,
    /// Child nodes in declaration order.
    #[serde(default)]
    pub children: Vec<DeviceNode>,
}

impl DeviceNode {
    /// Create an empty node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Decode a node tree from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, PanelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a node tree from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PanelError> {
        let txt = fs::read_to_string(path)?;
        Self::from_json_str(&txt)
    }

    /// Set a property, returning the node for chaining.
    pub fn with(mut self, key: &str, value: PropValue) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Append a child, returning the node for chaining.
    pub fn with_child(mut self, child: DeviceNode) -> Self {
        self.children.push(child);
        self
    }

    /// Raw property lookup.
    pub fn property(&self, key: &str) -> Option<&PropValue> {
        self.properties.get(key)
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&DeviceNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Whether `compatible` lists `name`.
    pub fn is_compatible(&self, name: &str) -> bool {
        match self.property("compatible") {
            Some(PropValue::Str(s)) => s == name,
            Some(PropValue::StrArray(list)) => list.iter().any(|s| s == name),
            _ => false,
        }
    }

    /// Presence flag: true unless absent or explicitly `false`.
    pub fn read_bool(&self, key: &str) -> bool {
        !matches!(self.property(key), None | Some(PropValue::Bool(false)))
    }

    /// Read a single cell.
    pub fn read_u32(&self, key: &str) -> Result<Option<u32>, PanelError> {
        match self.property(key) {
            None => Ok(None),
            Some(PropValue::U32(v)) => Ok(Some(*v)),
            Some(PropValue::U32Array(v)) if v.len() == 1 => Ok(Some(v[0])),
            Some(other) => Err(wrong_type(key, "u32", other)),
        }
    }

    /// Read a cell array; a single cell reads as a one-element array.
    pub fn read_u32_array(&self, key: &str) -> Result<Option<Vec<u32>>, PanelError> {
        match self.property(key) {
            None => Ok(None),
            Some(PropValue::U32(v)) => Ok(Some(vec![*v])),
            Some(PropValue::U32Array(v)) => Ok(Some(v.clone())),
            Some(other) => Err(wrong_type(key, "u32 array", other)),
        }
    }

    /// Read a string.
    pub fn read_string(&self, key: &str) -> Result<Option<&str>, PanelError> {
        match self.property(key) {
            None => Ok(None),
            Some(PropValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    /// Read a byte string stored as a cell array.
    pub fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, PanelError> {
        let Some(cells) = self.read_u32_array(key)? else {
            return Ok(None);
        };
        cells
            .into_iter()
            .map(|c| {
                u8::try_from(c)
                    .map_err(|_| PanelError::config(key, format!("cell {c:#x} is not a byte")))
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Some)
    }

    /// Read a packed command set and its `state_key` transmission mode.
    ///
    /// Absent or empty properties read as `None`.
    pub fn read_cmd_set(&self, key: &str, state_key: &str) -> Result<Option<CmdSet>, PanelError> {
        let Some(bytes) = self.read_bytes(key)? else {
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }

        let state = self
            .read_string(state_key)?
            .map(CmdState::from_dt)
            .unwrap_or_default();
        CmdSet::from_packed(&bytes, state)
            .map(Some)
            .map_err(|e| PanelError::config(key, e.to_string()))
    }
}

fn wrong_type(key: &str, expected: &str, found: &PropValue) -> PanelError {
    PanelError::config(key, format!("expected {}, found {}", expected, found.kind()))
}

/// Pack payloads into the device-tree command layout with default header
/// fields (`dtype` from length, `last = 1`, no wait).
pub fn pack_cmds<I, P>(payloads: I) -> PropValue
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut cells = Vec::new();
    for payload in payloads {
        let payload = payload.as_ref();
        let dtype: u32 = match payload.len() {
            1 => 0x05,
            2 => 0x15,
            _ => 0x39,
        };
        let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
        let [hi, lo] = len.to_be_bytes();
        cells.extend([dtype, 1, 0, 0, 0, u32::from(hi), u32::from(lo)]);
        cells.extend(payload.iter().map(|&b| u32::from(b)));
    }
    PropValue::U32Array(cells)
}
