//! Binned low-power (AOD) brightness modes.
//!
//! While the panel is in LP the brightness is expressed by choosing one of
//! a few pre-programmed LP modes instead of writing DCS brightness.

use crate::config::DeviceNode;
use crate::dsi::CmdSet;
use crate::error::PanelError;
use crate::panel::PanelCore;
use crate::state::BacklightProps;

use log::{debug, error, warn};

/// Maximum number of LP bins.
pub const MAX_BINNED_BL_MODES: usize = 10;

/// Compatible string selecting binned-LP backlight control.
pub const BINNED_LP_COMPATIBLE: &str = "google,dsi_binned_lp";

const NODE_LP_MODES: &str = "google,lp-modes";
const KEY_LP_THRESHOLD: &str = "google,dsi-lp-brightness-threshold";
const KEY_LP_CMD: &str = "google,dsi-lp-command";
const KEY_LP_CMD_STATE: &str = "google,dsi-lp-command-state";
const KEY_TE2_THRESHOLD: &str = "google,te2-lp-threshold";
const KEY_TE2_HIGH_CMD: &str = "google,te2-lp-high-command";
const KEY_TE2_LOW_CMD: &str = "google,te2-lp-low-command";
const KEY_TE2_STATE: &str = "google,te2-lp-command-state";

/// One LP mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpBin {
    /// Label of the mode.
    pub name: String,
    /// Highest user brightness served by this bin.
    pub bl_threshold: u32,
    /// Command selecting the mode.
    pub dsi_cmd: CmdSet,
}

/// What a binned update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStep {
    /// A bin expresses the brightness; no DCS write.
    Binned,
    /// LP just ended; the next DCS write must not be skipped.
    Left,
    /// Not in LP.
    Normal,
}

/// The sorted bin list and the bin applied last.
#[derive(Debug, Clone, Default)]
pub struct BinnedLp {
    /// Bins sorted by ascending threshold.
    pub modes: Vec<LpBin>,
    /// Index of the bin applied last.
    pub last_lp_mode: Option<usize>,
}

impl BinnedLp {
    /// Parse `google,lp-modes`.
    ///
    /// `Ok(None)` means binned LP is not available and the caller should
    /// fall back to its type-selected backlight.
    pub fn from_node(node: &DeviceNode) -> Result<Option<Self>, PanelError> {
        let Some(np) = node.child(NODE_LP_MODES) else {
            return Ok(None);
        };

        let num_modes = np.children.len();
        if num_modes == 0 || num_modes > MAX_BINNED_BL_MODES {
            error!("invalid binned brightness modes: {}", num_modes);
            return Ok(None);
        }

        let mut modes = np
            .children
            .iter()
            .map(parse_bin)
            .collect::<Result<Vec<_>, _>>()?;
        modes.sort_by_key(|m| m.bl_threshold);

        Ok(Some(Self {
            modes,
            last_lp_mode: None,
        }))
    }

    /// The first bin whose threshold covers `brightness`.
    pub fn select(&self, brightness: u32) -> Option<usize> {
        self.modes.iter().position(|m| brightness <= m.bl_threshold)
    }

    /// Name of the bin applied last.
    pub fn active_name(&self) -> Option<&str> {
        self.last_lp_mode.map(|i| self.modes[i].name.as_str())
    }

    /// Pick and apply the bin for `props`.
    ///
    /// The bin command is only sent when the choice changes.
    pub(crate) fn update(&mut self, core: &mut PanelCore, props: &BacklightProps) -> LpStep {
        let node = if props.state.is_lp() {
            let node = self.select(props.brightness);
            if node.is_none() {
                warn!("unable to find lp node for brightness {}", props.brightness);
            }
            node
        } else {
            None
        };

        let changed = node != self.last_lp_mode;
        self.last_lp_mode = node;

        match node {
            Some(i) => {
                if changed {
                    let bin = &self.modes[i];
                    debug!("switching display lp mode: {} ({})", bin.name, props.brightness);
                    if let Err(e) = bin.dsi_cmd.transfer(core.host.as_mut()) {
                        error!("failed to send lp mode {}: {}", bin.name, e);
                    }
                    if let Err(e) = core.update_te2(bin) {
                        debug!("TE2: LP '{}' mode not updated: {}", bin.name, e);
                    }
                }
                LpStep::Binned
            }
            None if changed => LpStep::Left,
            None => LpStep::Normal,
        }
    }
}

fn parse_bin(np: &DeviceNode) -> Result<LpBin, PanelError> {
    // lack of a threshold means the bin serves everything above
    let bl_threshold = np.read_u32(KEY_LP_THRESHOLD)?.unwrap_or(u32::MAX);

    let dsi_cmd = np
        .read_cmd_set(KEY_LP_CMD, KEY_LP_CMD_STATE)?
        .ok_or_else(|| PanelError::config(KEY_LP_CMD, "unable to parse dsi-lp-command"))?;

    let name = np
        .read_string("label")?
        .map(str::to_string)
        .unwrap_or_else(|| np.name.clone());

    debug!("parsed lp mode: {} threshold: {}", name, bl_threshold);
    Ok(LpBin {
        name,
        bl_threshold,
        dsi_cmd,
    })
}

// =============================================================================
// TE2 Edge
// =============================================================================

/// TE2 edge selection while in LP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Te2Edge {
    /// Not configured for LP yet.
    #[default]
    Normal,
    /// Bright LP bins.
    LpHigh,
    /// Dim LP bins.
    LpLow,
}

/// TE2 edge configuration.
#[derive(Debug, Clone, Default)]
pub struct Te2Config {
    /// Bins above this threshold use the high edge.
    pub lp_threshold: u32,
    /// Edge programmed last.
    pub current_type: Te2Edge,
    high_cmd: CmdSet,
    low_cmd: CmdSet,
}

impl Te2Config {
    /// Read the optional TE2 keys; a panel without them has no TE2 hook.
    pub fn from_node(node: &DeviceNode) -> Result<Option<Self>, PanelError> {
        let Some(lp_threshold) = node.read_u32(KEY_TE2_THRESHOLD)? else {
            return Ok(None);
        };
        let high_cmd = node.read_cmd_set(KEY_TE2_HIGH_CMD, KEY_TE2_STATE)?;
        let low_cmd = node.read_cmd_set(KEY_TE2_LOW_CMD, KEY_TE2_STATE)?;
        let (Some(high_cmd), Some(low_cmd)) = (high_cmd, low_cmd) else {
            warn!("TE2 threshold without both edge commands, TE2 disabled");
            return Ok(None);
        };

        Ok(Some(Self {
            lp_threshold,
            current_type: Te2Edge::Normal,
            high_cmd,
            low_cmd,
        }))
    }
}

impl PanelCore {
    /// Program the TE2 edge matching `bin`.
    pub(crate) fn update_te2(&mut self, bin: &LpBin) -> Result<(), PanelError> {
        let te2 = self.te2.as_mut().ok_or(PanelError::NotSupported)?;

        te2.current_type = if bin.bl_threshold > te2.lp_threshold {
            Te2Edge::LpHigh
        } else {
            Te2Edge::LpLow
        };
        let cmd = match te2.current_type {
            Te2Edge::LpHigh => &te2.high_cmd,
            _ => &te2.low_cmd,
        };
        cmd.transfer(self.host.as_mut()).inspect_err(|e| {
            warn!("TE2: LP '{}' mode failed: {}", bin.name, e);
        })
    }
}
