//! Example: Drive a simulated panel through a typical display session.
//!
//! Run with: `cargo run --example panel_walkthrough [panel.json]`
//!
//! Without an argument a 60/90 Hz panel with two HBM ranges and binned
//! LP is built in code.

use std::sync::Arc;

use dsi_panel_core::{
    DeviceNode, HbmMode, MockDisplay, MockHost, ModeRequest, Panel, PanelDeps, PanelError,
    PropValue, pack_cmds,
};

fn timing(rate: u32, switch_param: u8) -> DeviceNode {
    DeviceNode::new(format!("timing@{rate}"))
        .with("qcom,mdss-dsi-panel-width", PropValue::U32(1080))
        .with("qcom,mdss-dsi-panel-height", PropValue::U32(2340))
        .with("qcom,mdss-dsi-panel-framerate", PropValue::U32(rate))
        .with(
            "qcom,mdss-dsi-timing-switch-command",
            pack_cmds([[0x60u8, switch_param]]),
        )
}

fn hbm_range(threshold: u32, min: u32, max: u32, entry: u8) -> DeviceNode {
    DeviceNode::new(format!("range@{threshold}"))
        .with(
            "google,dsi-hbm-range-brightness-threshold",
            PropValue::U32(threshold),
        )
        .with("google,dsi-hbm-range-bl-min-level", PropValue::U32(min))
        .with("google,dsi-hbm-range-bl-max-level", PropValue::U32(max))
        .with("google,dsi-hbm-range-entry-command", pack_cmds([[0x53u8, entry]]))
}

fn lp_bin(label: &str, threshold: u32, cmd: u8) -> DeviceNode {
    DeviceNode::new(label)
        .with("label", PropValue::Str(label.into()))
        .with("google,dsi-lp-brightness-threshold", PropValue::U32(threshold))
        .with("google,dsi-lp-command", pack_cmds([[0x51u8, cmd]]))
}

fn demo_node() -> DeviceNode {
    DeviceNode::new("panel@0")
        .with(
            "compatible",
            PropValue::StrArray(vec!["google,dsi_binned_lp".into()]),
        )
        .with(
            "qcom,mdss-dsi-bl-pmic-control-type",
            PropValue::Str("bl_ctrl_dcs".into()),
        )
        .with("qcom,mdss-dsi-bl-min-level", PropValue::U32(1))
        .with("qcom,mdss-dsi-bl-max-level", PropValue::U32(1023))
        .with_child(
            DeviceNode::new("qcom,mdss-dsi-display-timings")
                .with_child(timing(60, 0x00))
                .with_child(timing(90, 0x01)),
        )
        .with_child(
            DeviceNode::new("google,hbm-ranges")
                .with_child(hbm_range(1, 100, 800, 0xE0))
                .with_child(hbm_range(201, 801, 1023, 0xE8)),
        )
        .with_child(
            DeviceNode::new("google,lp-modes")
                .with_child(lp_bin("low", 30, 0xE1))
                .with_child(lp_bin("high", 1023, 0xE3)),
        )
}

fn main() -> Result<(), PanelError> {
    env_logger::init();

    let node = match std::env::args().nth(1) {
        Some(path) => DeviceNode::load(path)?,
        None => demo_node(),
    };

    let host = MockHost::new();
    let display = Arc::new(MockDisplay::new());
    let panel = Panel::register(&node, PanelDeps::new(host.clone(), display))?;
    println!("Registered {} with modes {:?}", panel.name(), panel.modes());

    panel.enable()?;
    panel.post_enable()?;
    println!("State: {}", panel.attr_show("state")?.trim_end());

    for brightness in [10, 128, 255] {
        panel.set_brightness(brightness)?;
        println!(
            "brightness={} -> panel level {}",
            brightness,
            panel.actual_brightness()
        );
    }

    match panel.set_hbm_mode(HbmMode::On) {
        Ok(()) => {
            panel.set_brightness(230)?;
            println!(
                "HBM on: level {} ({})",
                panel.actual_brightness(),
                panel.attr_show("state")?.trim_end()
            );
            panel.set_hbm_mode(HbmMode::Off)?;
        }
        Err(e) => eprintln!("HBM unavailable: {}", e),
    }

    match "@90".parse::<ModeRequest>().and_then(|req| panel.set_mode(&req)) {
        Ok(()) => {
            panel.flush_switch_queue();
            println!("Switched to {} Hz", panel.refresh_rate());
        }
        Err(e) => eprintln!("Error switching mode: {}", e),
    }

    panel.set_brightness(20)?;
    panel.set_lp1()?;
    println!("LP1: lp_mode={}", panel.attr_show("lp_mode")?.trim_end());
    panel.set_nolp()?;

    panel.disable()?;
    println!("State: {}", panel.attr_show("state")?.trim_end());
    println!("{} DSI messages sent", host.transactions().len());

    Ok(())
}
