//! Display modes and mode-string parsing.

use crate::config::DeviceNode;
use crate::dsi::CmdSet;
use crate::error::PanelError;
use crate::gamma::GammaData;

use std::fmt;
use std::str::FromStr;

const NODE_TIMINGS: &str = "qcom,mdss-dsi-display-timings";
const KEY_WIDTH: &str = "qcom,mdss-dsi-panel-width";
const KEY_HEIGHT: &str = "qcom,mdss-dsi-panel-height";
const KEY_FRAMERATE: &str = "qcom,mdss-dsi-panel-framerate";
const KEY_TIMING_SWITCH: &str = "qcom,mdss-dsi-timing-switch-command";
const KEY_TIMING_SWITCH_STATE: &str = "qcom,mdss-dsi-timing-switch-command-state";

/// One display timing the panel can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMode {
    /// Active width in pixels.
    pub width: u32,
    /// Active height in pixels.
    pub height: u32,
    /// Refresh rate in Hz.
    pub refresh_rate: u32,
    /// Sent to switch the panel into this timing.
    pub timing_switch: CmdSet,
    /// Gamma tables read for this mode.
    pub(crate) gamma: Option<GammaData>,
}

impl DisplayMode {
    /// A mode without switch commands.
    pub fn new(width: u32, height: u32, refresh_rate: u32) -> Self {
        Self {
            width,
            height,
            refresh_rate,
            timing_switch: CmdSet::default(),
            gamma: None,
        }
    }

    fn from_node(np: &DeviceNode) -> Result<Self, PanelError> {
        let required = |key: &'static str| {
            np.read_u32(key)?
                .ok_or_else(|| PanelError::config(key, "missing"))
        };

        let mut mode = Self::new(
            required(KEY_WIDTH)?,
            required(KEY_HEIGHT)?,
            required(KEY_FRAMERATE)?,
        );
        if let Some(cmd) = np.read_cmd_set(KEY_TIMING_SWITCH, KEY_TIMING_SWITCH_STATE)? {
            mode.timing_switch = cmd;
        }
        Ok(mode)
    }

    /// Whether `req` selects this mode.
    pub fn matches(&self, req: &ModeRequest) -> bool {
        req.refresh_rate == self.refresh_rate
            && req.size.is_none_or(|(w, h)| w == self.width && h == self.height)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh_rate)
    }
}

/// Read every timing under `qcom,mdss-dsi-display-timings`.
pub fn parse_modes(node: &DeviceNode) -> Result<Vec<DisplayMode>, PanelError> {
    let Some(np) = node.child(NODE_TIMINGS) else {
        return Ok(Vec::new());
    };
    np.children.iter().map(DisplayMode::from_node).collect()
}

/// The first mode selected by `req`.
pub fn find_mode(modes: &[DisplayMode], req: &ModeRequest) -> Option<usize> {
    modes.iter().position(|m| m.matches(req))
}

/// A parsed mode string: `<W>x<H>@<Hz>`, `@<Hz>` or a bare `<Hz>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    /// Required size, if given.
    pub size: Option<(u32, u32)>,
    /// Required refresh rate.
    pub refresh_rate: u32,
}

impl FromStr for ModeRequest {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || PanelError::ParseError(format!("invalid mode string '{s}'"));
        let num = |v: &str| v.trim().parse::<u32>().map_err(|_| bad());

        let (size, rate) = match s.split_once('@') {
            Some(("", rate)) => (None, rate),
            Some((size, rate)) => {
                let (w, h) = size.split_once('x').ok_or_else(bad)?;
                (Some((num(w)?, num(h)?)), rate)
            }
            None => (None, s),
        };

        let refresh_rate = num(rate)?;
        if refresh_rate == 0 {
            return Err(bad());
        }
        Ok(Self { size, refresh_rate })
    }
}
