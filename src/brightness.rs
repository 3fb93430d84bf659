//! User brightness to panel level mapping.

use crate::config::DeviceNode;
use crate::error::PanelError;

use log::{debug, warn};

/// Full-scale value of `bl_scale`.
pub const MAX_BL_SCALE_LEVEL: u32 = 1024;
/// Full-scale value of `bl_scale_sv`.
pub const MAX_SV_BL_SCALE_LEVEL: u32 = 1024;
/// Default panel-side maximum when the config does not give one.
pub const MAX_BL_LEVEL: u32 = 4096;
/// Default user-space maximum.
pub const DEFAULT_BRIGHTNESS_MAX_LEVEL: u32 = 255;

const KEY_BL_MIN_LEVEL: &str = "qcom,mdss-dsi-bl-min-level";
const KEY_BL_MAX_LEVEL: &str = "qcom,mdss-dsi-bl-max-level";
const KEY_BRIGHTNESS_MAX_LEVEL: &str = "qcom,mdss-brightness-max-level";
const KEY_BL_LUT: &str = "qcom,mdss-dsi-bl-lut";

/// `x * numer / denom` without intermediate overflow, rounded down.
pub fn mult_frac(x: u32, numer: u32, denom: u32) -> u32 {
    if denom == 0 {
        return 0;
    }
    let v = u64::from(x) * u64::from(numer) / u64::from(denom);
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Linearly interpolate `x` from `[x1, x2]` into `[y1, y2]`, rounding to
/// the nearest integer.
///
/// `x <= x1` maps to `y1`, `x >= x2` maps to `y2`, and a degenerate source
/// range maps everything to `y1`.
pub fn lerp(x1: u32, x2: u32, y1: u32, y2: u32, x: u32) -> Result<u32, PanelError> {
    if x2 < x1 || y2 < y1 {
        return Err(PanelError::InvalidRange { x1, x2, y1, y2 });
    }

    if x2 == x1 || x <= x1 {
        Ok(y1)
    } else if x >= x2 {
        Ok(y2)
    } else {
        let num = u64::from(x - x1) * u64::from(y2 - y1);
        let den = u64::from(x2 - x1);
        let step = (num + den / 2) / den;
        Ok(y1 + u32::try_from(step).unwrap_or(y2 - y1))
    }
}

/// Apply both scale factors to a user brightness.
pub fn scale(brightness: u32, bl_scale: u32, bl_scale_sv: u32) -> u32 {
    let scaled = mult_frac(brightness, bl_scale, MAX_BL_SCALE_LEVEL);
    mult_frac(scaled, bl_scale_sv, MAX_SV_BL_SCALE_LEVEL)
}

/// The normal (non-HBM) mapping from user brightness to panel level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrightnessMap {
    /// Lowest non-zero panel level.
    pub bl_min_level: u32,
    /// Highest panel level.
    pub bl_max_level: u32,
    /// Highest user brightness.
    pub brightness_max_level: u32,
    /// Direct map indexed by user brightness (length `brightness_max_level + 1`).
    pub lut: Option<Vec<u16>>,
}

impl Default for BrightnessMap {
    fn default() -> Self {
        Self {
            bl_min_level: 0,
            bl_max_level: MAX_BL_LEVEL,
            brightness_max_level: DEFAULT_BRIGHTNESS_MAX_LEVEL,
            lut: None,
        }
    }
}

impl BrightnessMap {
    /// Read levels and the optional LUT from the panel node.
    pub fn from_node(node: &DeviceNode) -> Result<Self, PanelError> {
        let bl_min_level = node.read_u32(KEY_BL_MIN_LEVEL)?.unwrap_or_else(|| {
            debug!("bl-min-level unspecified, defaulting to zero");
            0
        });
        let bl_max_level = node.read_u32(KEY_BL_MAX_LEVEL)?.unwrap_or_else(|| {
            debug!("bl-max-level unspecified, defaulting to {}", MAX_BL_LEVEL);
            MAX_BL_LEVEL
        });
        let brightness_max_level = node
            .read_u32(KEY_BRIGHTNESS_MAX_LEVEL)?
            .unwrap_or(DEFAULT_BRIGHTNESS_MAX_LEVEL);
        let lut = parse_lut(node, brightness_max_level)?;
        debug!("bl-lut {}used", if lut.is_some() { "" } else { "un" });

        Ok(Self {
            bl_min_level,
            bl_max_level,
            brightness_max_level,
            lut,
        })
    }

    /// Map an already-scaled user brightness to a panel level.
    pub fn calculate(&self, brightness: u32) -> Result<u32, PanelError> {
        if let Some(lut) = &self.lut {
            let idx = if brightness > self.brightness_max_level {
                warn!(
                    "brightness {} above max {}, clamping",
                    brightness, self.brightness_max_level
                );
                self.brightness_max_level
            } else {
                brightness
            };
            return lut
                .get(idx as usize)
                .map(|&v| u32::from(v))
                .ok_or(PanelError::NoMatchingRange(brightness));
        }

        lerp(
            1,
            self.brightness_max_level,
            self.bl_min_level.max(1),
            self.bl_max_level,
            brightness,
        )
    }

    /// Map a panel level read back from hardware into user space.
    pub fn to_user(&self, bl_lvl: u32) -> Result<u32, PanelError> {
        lerp(
            self.bl_min_level,
            self.bl_max_level,
            1,
            self.brightness_max_level,
            bl_lvl,
        )
    }
}

/// Parse the LUT; a length mismatch leaves the LUT unused.
fn parse_lut(node: &DeviceNode, brightness_max_level: u32) -> Result<Option<Vec<u16>>, PanelError> {
    let Some(cells) = node.read_u32_array(KEY_BL_LUT)? else {
        return Ok(None);
    };

    let expected = brightness_max_level as usize + 1;
    if cells.len() != expected {
        warn!(
            "{} length {} doesn't match brightness_max_level + 1 {}",
            KEY_BL_LUT,
            cells.len(),
            expected
        );
        return Ok(None);
    }

    Ok(Some(cells.into_iter().map(|c| (c & 0xFFFF) as u16).collect()))
}
