//! End-to-end backlight, HBM and LP scenarios on a simulated panel.

mod common;

use std::sync::Arc;

use common::*;
use dsi_panel_core::{
    BlState, DeviceNode, Dpms, HbmMode, MockDisplay, MockHost, MockPwm, MockRegulator, Panel,
    PanelDeps, PanelError, PanelEvent, PropValue, RegulatorMode, pack_cmds,
};

// =============================================================================
// Normal Brightness
// =============================================================================

#[test]
fn test_plain_dcs_brightness_write() {
    let (panel, host, _display) = register(&dcs_node(255));
    panel.enable().unwrap();

    panel.set_brightness(128).unwrap();

    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0x80]));
    assert_eq!(panel.actual_brightness(), 128);
}

#[test]
fn test_identical_update_writes_once() {
    let (panel, host, _display) = register(&dcs_node(255));
    panel.enable().unwrap();
    host.clear_transactions();

    panel.set_brightness(100).unwrap();
    panel.update_status().unwrap();
    panel.set_brightness(100).unwrap();

    assert_eq!(host.writes_to(0x51), vec![vec![0x51, 100]]);
}

#[test]
fn test_brightness_above_max_is_rejected() {
    let (panel, _host, _display) = register(&dcs_node(255));
    assert!(matches!(
        panel.set_brightness(256),
        Err(PanelError::InvalidArgument(_))
    ));
}

#[test]
fn test_blank_writes_zero_and_reports_state() {
    let (panel, host, display) = register(&dcs_node(255));
    panel.enable().unwrap();
    display.clear_events();

    panel.set_dpms(Dpms::Off).unwrap();

    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0x00]));
    // zero brightness is not reported, the state change is
    assert_eq!(display.events(), vec![PanelEvent::AttrChanged("state")]);
}

#[test]
fn test_dpms_round_trip() {
    let (panel, _host, _display) = register(&dcs_node(255));
    panel.enable().unwrap();

    panel.set_dpms(Dpms::Off).unwrap();
    assert_eq!(panel.snapshot().props.state, BlState::FBBLANK);
    assert_eq!(panel.get_dpms(), Dpms::Off);

    panel.set_dpms(Dpms::On).unwrap();
    panel.set_dpms(Dpms::Lp2).unwrap();
    assert_eq!(panel.snapshot().props.state, BlState::LP | BlState::LP2);
    assert_eq!(panel.get_dpms(), Dpms::Lp2);

    panel.set_dpms(Dpms::On).unwrap();
    assert_eq!(panel.snapshot().props.state, BlState::empty());
    assert_eq!(panel.get_dpms(), Dpms::On);
}

#[test]
fn test_disable_stops_panel_writes() {
    let node = dcs_node(255)
        .with("qcom,mdss-dsi-off-command", pack_cmds([[0x28u8], [0x10u8]]));
    let (panel, host, _display) = register(&node);
    panel.enable().unwrap();

    panel.disable().unwrap();
    assert_eq!(host.writes_to(0x28), vec![vec![0x28]]);
    assert_eq!(host.writes_to(0x10), vec![vec![0x10]]);
    host.clear_transactions();

    panel.set_dpms(Dpms::On).unwrap();
    panel.set_brightness(10).unwrap();
    assert!(host.transactions().is_empty());
}

#[test]
fn test_scale_reduces_level() {
    let (panel, host, _display) = register(&dcs_node(255));
    panel.enable().unwrap();
    panel.set_brightness(200).unwrap();

    panel.set_scale(512, 1024).unwrap();

    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 100]));
}

#[test]
fn test_lut_overrides_interpolation() {
    let lut: Vec<u32> = (0..=255u32).map(|b| b * 2).collect();
    let node = dcs_node(1023).with("qcom,mdss-dsi-bl-lut", PropValue::U32Array(lut));
    let (panel, host, _display) = register(&node);
    panel.enable().unwrap();

    panel.set_brightness(200).unwrap();

    // 400 = 0x190
    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0x01, 0x90]));
}

#[test]
fn test_first_frame_gate_defers_update() {
    let node = dcs_node(255).with(
        "qcom,bl-update-flag",
        PropValue::Str("delay_until_first_frame".into()),
    );
    let (panel, host, _display) = register(&node);

    panel.enable().unwrap();
    assert!(host.writes_to(0x51).is_empty());
    assert!(panel.snapshot().bl_update_pending);

    panel.pre_kickoff().unwrap();
    assert_eq!(host.writes_to(0x51), vec![vec![0x51, 127]]);
    assert!(!panel.snapshot().bl_update_pending);

    // the gate stays open afterwards
    panel.set_brightness(20).unwrap();
    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 20]));
}

#[test]
fn test_brightness_handoff_adopts_panel_level() {
    let (panel, host, _display) = register(&dcs_node(255));
    host.set_register(0x52, &[0x80]);

    assert_eq!(panel.brightness_handoff().unwrap(), 128);
    assert_eq!(panel.brightness(), 128);
}

#[test]
fn test_als_notifier_reports_category_changes() {
    let node = dcs_node(255).with(
        "qcom,mdss-dsi-bl-notifier-ranges",
        PropValue::U32Array(vec![10, 100, 255]),
    );
    let (panel, _host, display) = register(&node);

    panel.enable().unwrap();
    let events = display.events();
    assert!(events.contains(&PanelEvent::Brightness(127)));
    assert!(events.contains(&PanelEvent::AttrChanged("brightness")));

    display.clear_events();
    panel.set_brightness(120).unwrap();
    // same category, only the brightness itself is reported
    assert_eq!(display.events(), vec![PanelEvent::Brightness(120)]);

    display.clear_events();
    panel.set_brightness(50).unwrap();
    assert!(display.events().contains(&PanelEvent::AttrChanged("brightness")));
}

// =============================================================================
// Other Actuators
// =============================================================================

#[test]
fn test_pwm_backlight_follows_level() {
    init_logger();
    let node = DeviceNode::new("panel")
        .with(BL_TYPE, PropValue::Str("bl_ctrl_pwm".into()))
        .with("qcom,mdss-dsi-bl-max-level", PropValue::U32(255))
        .with("qcom,bl-pmic-pwm-period-usecs", PropValue::U32(100));
    let pwm = MockPwm::new();
    let deps = PanelDeps::new(MockHost::new(), Arc::new(MockDisplay::new())).with_pwm(pwm.clone());
    let panel = Panel::register(&node, deps).unwrap();

    panel.enable().unwrap();
    assert!(pwm.is_enabled());
    panel.set_brightness(255).unwrap();
    assert_eq!(pwm.last_config(), Some((100_000, 100_000)));

    panel.set_dpms(Dpms::Off).unwrap();
    assert!(!pwm.is_enabled());
}

#[test]
fn test_pwm_without_backend_fails_registration() {
    init_logger();
    let node = DeviceNode::new("panel")
        .with(BL_TYPE, PropValue::Str("bl_ctrl_pwm".into()))
        .with("qcom,bl-pmic-pwm-period-usecs", PropValue::U32(100));
    let deps = PanelDeps::new(MockHost::new(), Arc::new(MockDisplay::new()));
    assert!(matches!(
        Panel::register(&node, deps),
        Err(PanelError::NoDevice)
    ));
}

#[test]
fn test_regulator_tracks_power_modes() {
    init_logger();
    let reg = MockRegulator::new();
    let deps = PanelDeps::new(MockHost::new(), Arc::new(MockDisplay::new()))
        .with_regulator(reg.clone());
    let panel = Panel::register(&dcs_node(255), deps).unwrap();
    panel.enable().unwrap();

    panel.set_lp1().unwrap();
    panel.set_nolp().unwrap();
    panel.disable().unwrap();

    assert_eq!(
        reg.modes(),
        vec![
            RegulatorMode::Idle,
            RegulatorMode::Normal,
            RegulatorMode::Standby
        ]
    );
}

// =============================================================================
// High Brightness Mode
// =============================================================================

#[test]
fn test_hbm_range_entry_and_interpolation() {
    let node = dcs_node(1023).with_child(hbm_ranges(hbm_range(201, 801, 1023, [0x53, 0xE8])));
    let (panel, host, _display) = register(&node);
    panel.enable().unwrap();

    panel.set_hbm_mode(HbmMode::On).unwrap();
    panel.set_brightness(220).unwrap();

    // lerp(201, 255, 801, 1023, 220) = 879 = 0x36F
    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0x03, 0x6F]));
    assert_eq!(host.writes_to(0x53), vec![vec![0x53, 0xE0], vec![0x53, 0xE8]]);
    assert_eq!(panel.snapshot().hbm_range, Some(1));
    assert_eq!(panel.actual_brightness(), 879);
}

#[test]
fn test_hbm_dimming_counts_frames_then_stops() {
    let range1 = with_dimming(hbm_range(201, 801, 1023, [0x53, 0xE8]), 10, [0xB9, 0x01]);
    let node = dcs_node(1023).with_child(hbm_ranges(range1));
    let (panel, host, display) = register(&node);
    panel.enable().unwrap();
    panel.set_hbm_mode(HbmMode::On).unwrap();

    panel.set_brightness(220).unwrap();
    assert!(panel.snapshot().dimming_active);
    assert_eq!(display.vblank_refs(), 1);

    fire_until_dimming_stops(&panel, &display, 50);

    assert!(!panel.snapshot().dimming_active);
    assert!(display.te_fired() >= 10);
    assert_eq!(host.writes_to(0xB9), vec![vec![0xB9, 0x01]]);
    assert_eq!(display.vblank_refs(), 0);
}

#[test]
fn test_hbm_exit_dims_then_stops() {
    let hbm = hbm_ranges(hbm_range(201, 801, 1023, [0x53, 0xE8]))
        .with("google,dsi-hbm-exit-command", pack_cmds([[0x53u8, 0x20]]))
        .with("google,dsi-hbm-exit-num-dimming-frames", PropValue::U32(2))
        .with(
            "google,dsi-hbm-exit-dimming-stop-command",
            pack_cmds([[0xBAu8, 0x01]]),
        );
    let (panel, host, display) = register(&dcs_node(1023).with_child(hbm));
    panel.enable().unwrap();
    panel.set_hbm_mode(HbmMode::On).unwrap();

    panel.set_hbm_mode(HbmMode::Off).unwrap();
    assert_eq!(host.writes_to(0x53).last(), Some(&vec![0x53, 0x20]));
    assert_eq!(panel.snapshot().hbm_range, None);
    assert!(display.events().contains(&PanelEvent::AttrChanged("hbm_mode")));

    fire_until_dimming_stops(&panel, &display, 50);
    assert_eq!(host.writes_to(0xBA).len(), 1);
    assert_eq!(display.vblank_refs(), 0);
}

#[test]
fn test_disable_ends_dimming_without_stop_command() {
    let range1 = with_dimming(hbm_range(201, 801, 1023, [0x53, 0xE8]), 10, [0xB9, 0x01]);
    let (panel, host, display) = register(&dcs_node(1023).with_child(hbm_ranges(range1)));
    panel.enable().unwrap();
    panel.set_hbm_mode(HbmMode::On).unwrap();
    panel.set_brightness(220).unwrap();
    assert!(panel.snapshot().dimming_active);

    panel.disable().unwrap();

    assert!(!panel.snapshot().dimming_active);
    assert_eq!(display.vblank_refs(), 0);
    assert!(host.writes_to(0xB9).is_empty());
}

#[test]
fn test_sunlight_mode_toggles_irc() {
    let hbm = hbm_ranges(hbm_range(201, 801, 1023, [0x53, 0xE8]))
        .with("google,dsi-irc-addr", PropValue::U32(0xB5))
        .with("google,dsi-irc-bit-offset", PropValue::U32(11))
        .with("google,dsi-irc-unlock-command", pack_cmds([[0xF0u8, 0x5A, 0x5A]]))
        .with("google,dsi-irc-lock-command", pack_cmds([[0xF0u8, 0xA5, 0xA5]]));
    let (panel, host, _display) = register(&dcs_node(1023).with_child(hbm));
    host.set_register(0xB5, &[0x12, 0x08]);
    panel.enable().unwrap();

    assert!(matches!(
        panel.set_hbm_mode(HbmMode::Sv),
        Err(PanelError::InvalidArgument(_))
    ));

    panel.set_hbm_sv_enabled(true).unwrap();
    panel.set_hbm_mode(HbmMode::Sv).unwrap();
    assert_eq!(host.writes_to(0xB5), vec![vec![0xB5, 0x12, 0x00]]);
    assert!(matches!(panel.set_hbm_sv_enabled(false), Err(PanelError::Busy)));

    panel.set_hbm_mode(HbmMode::On).unwrap();
    assert_eq!(host.writes_to(0xB5).last(), Some(&vec![0xB5, 0x12, 0x08]));

    // the register is only read once
    let reads = host
        .transactions()
        .iter()
        .filter(|m| m.is_read() && m.cmd() == 0xB5)
        .count();
    assert_eq!(reads, 1);
}

#[test]
fn test_bad_hbm_config_fails_registration() {
    init_logger();
    let node = dcs_node(1023).with_child(
        DeviceNode::new("google,hbm-ranges")
            .with_child(hbm_range(201, 801, 1023, [0x53, 0xE8]))
            .with_child(hbm_range(1, 100, 800, [0x53, 0xE0])),
    );
    let deps = PanelDeps::new(MockHost::new(), Arc::new(MockDisplay::new()));
    assert!(matches!(
        Panel::register(&node, deps),
        Err(PanelError::Config { .. })
    ));
}

// =============================================================================
// Binned LP
// =============================================================================

fn lp_bin(label: &str, threshold: u32, cmd: u8) -> DeviceNode {
    DeviceNode::new(label)
        .with("label", PropValue::Str(label.into()))
        .with(
            "google,dsi-lp-brightness-threshold",
            PropValue::U32(threshold),
        )
        .with("google,dsi-lp-command", pack_cmds([[cmd, 0x01]]))
}

fn binned_node() -> DeviceNode {
    dcs_node(255)
        .with(
            "compatible",
            PropValue::StrArray(vec!["google,dsi_binned_lp".into()]),
        )
        .with_child(
            DeviceNode::new("google,lp-modes")
                .with_child(lp_bin("low", 30, 0xE1))
                .with_child(lp_bin("mid", 60, 0xE2))
                .with_child(lp_bin("high", 120, 0xE3)),
        )
}

#[test]
fn test_lp_bins_replace_dcs_brightness() {
    let (panel, host, _display) = register(&binned_node());
    panel.enable().unwrap();
    panel.set_brightness(50).unwrap();
    host.clear_transactions();

    panel.set_lp1().unwrap();
    assert_eq!(host.writes_to(0xE2), vec![vec![0xE2, 0x01]]);
    assert_eq!(panel.snapshot().lp_mode.as_deref(), Some("mid"));

    panel.set_brightness(100).unwrap();
    assert_eq!(host.writes_to(0xE3), vec![vec![0xE3, 0x01]]);

    // same bin, nothing to send
    panel.set_brightness(110).unwrap();
    panel.set_lp2().unwrap();
    assert_eq!(host.writes_to(0xE3).len(), 1);

    assert!(host.writes_to(0x51).is_empty());

    panel.set_nolp().unwrap();
    assert_eq!(host.writes_to(0x51), vec![vec![0x51, 110]]);
    assert_eq!(panel.snapshot().lp_mode, None);
}

#[test]
fn test_lp_attribute_reports_bin() {
    let (panel, _host, _display) = register(&binned_node());
    panel.enable().unwrap();
    panel.set_brightness(10).unwrap();

    assert_eq!(panel.attr_store("alpm_mode", "1"), 1);
    assert_eq!(panel.attr_show("lp_mode").unwrap(), "low\n");
    assert_eq!(panel.attr_show("alpm_mode").unwrap(), "1\n");
    assert_eq!(panel.attr_show("state").unwrap(), "LP\n");
}
