//! Panel descriptions shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dsi_panel_core::{DeviceNode, MockDisplay, MockHost, Panel, PanelDeps, PropValue, pack_cmds};

pub const BL_TYPE: &str = "qcom,mdss-dsi-bl-pmic-control-type";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// DCS panel: `bl_min_level = 1`, `bl_max_level = bl_max`, 255 user steps.
pub fn dcs_node(bl_max: u32) -> DeviceNode {
    DeviceNode::new("panel@0")
        .with(BL_TYPE, PropValue::Str("bl_ctrl_dcs".into()))
        .with("qcom,mdss-dsi-bl-min-level", PropValue::U32(1))
        .with("qcom,mdss-dsi-bl-max-level", PropValue::U32(bl_max))
}

pub fn timing(rate: u32, switch_param: u8) -> DeviceNode {
    DeviceNode::new(format!("timing@{rate}"))
        .with("qcom,mdss-dsi-panel-width", PropValue::U32(1080))
        .with("qcom,mdss-dsi-panel-height", PropValue::U32(2340))
        .with("qcom,mdss-dsi-panel-framerate", PropValue::U32(rate))
        .with(
            "qcom,mdss-dsi-timing-switch-command",
            pack_cmds([[0x60u8, switch_param]]),
        )
}

/// 60 Hz and 90 Hz timings; their switch commands write `60 00` and `60 01`.
pub fn with_modes(node: DeviceNode) -> DeviceNode {
    node.with_child(
        DeviceNode::new("qcom,mdss-dsi-display-timings")
            .with_child(timing(60, 0x00))
            .with_child(timing(90, 0x01)),
    )
}

pub fn hbm_range(threshold: u32, min: u32, max: u32, entry: [u8; 2]) -> DeviceNode {
    DeviceNode::new(format!("range@{threshold}"))
        .with(
            "google,dsi-hbm-range-brightness-threshold",
            PropValue::U32(threshold),
        )
        .with("google,dsi-hbm-range-bl-min-level", PropValue::U32(min))
        .with("google,dsi-hbm-range-bl-max-level", PropValue::U32(max))
        .with("google,dsi-hbm-range-entry-command", pack_cmds([entry]))
}

pub fn with_dimming(range: DeviceNode, frames: u32, stop: [u8; 2]) -> DeviceNode {
    range
        .with(
            "google,dsi-hbm-range-num-dimming-frames",
            PropValue::U32(frames),
        )
        .with("google,dsi-hbm-range-dimming-stop-command", pack_cmds([stop]))
}

/// Two HBM ranges: `[1..200 -> 100..800]` entered with `53 E0` and
/// `[201..255 -> 801..1023]` entered with `53 E8`.
pub fn hbm_ranges(range1: DeviceNode) -> DeviceNode {
    DeviceNode::new("google,hbm-ranges")
        .with_child(hbm_range(1, 100, 800, [0x53, 0xE0]))
        .with_child(range1)
}

pub fn register(node: &DeviceNode) -> (Panel, MockHost, Arc<MockDisplay>) {
    init_logger();
    let host = MockHost::new();
    let display = Arc::new(MockDisplay::new());
    let panel = Panel::register(node, PanelDeps::new(host.clone(), display.clone()))
        .expect("panel registers");
    (panel, host, display)
}

/// Fire TEs until dimming ends, at most `max` of them.
pub fn fire_until_dimming_stops(panel: &Panel, display: &MockDisplay, max: usize) {
    for _ in 0..max {
        if !panel.snapshot().dimming_active {
            return;
        }
        display.fire_te();
        thread::sleep(Duration::from_millis(10));
    }
}
