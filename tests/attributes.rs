//! Attribute reads and writes as seen from user space.

mod common;

use common::*;
use dsi_panel_core::{HbmMode, PropValue};

#[test]
fn test_brightness_attribute() {
    let (panel, host, _display) = register(&with_modes(dcs_node(255)));
    panel.enable().unwrap();

    assert_eq!(panel.attr_store("brightness", "200\n"), 4);
    assert_eq!(panel.attr_show("brightness").unwrap(), "200\n");
    assert_eq!(panel.attr_show("actual_brightness").unwrap(), "200\n");
    assert_eq!(panel.attr_show("max_brightness").unwrap(), "255\n");
    assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0xC8]));

    assert_eq!(panel.attr_store("brightness", "abc"), -22);
    assert_eq!(panel.attr_store("brightness", "300"), -22);
    assert_eq!(panel.attr_show("brightness").unwrap(), "200\n");
}

#[test]
fn test_read_only_and_unknown_attributes() {
    let (panel, _host, _display) = register(&with_modes(dcs_node(255)));

    for name in ["actual_brightness", "max_brightness", "state", "lp_mode"] {
        assert_eq!(panel.attr_store(name, "1"), -22, "{name}");
    }
    assert_eq!(panel.attr_store("bogus", "1"), -95);
    assert!(panel.attr_show("bogus").is_err());
}

#[test]
fn test_state_strings() {
    let node = dcs_node(1023).with_child(hbm_ranges(hbm_range(201, 801, 1023, [0x53, 0xE8])));
    let (panel, _host, _display) = register(&with_modes(node));
    panel.enable().unwrap();
    assert_eq!(panel.attr_show("state").unwrap(), "On: 1080x2340@60\n");

    assert_eq!(panel.attr_store("hbm_mode", "1"), 1);
    assert_eq!(panel.attr_show("state").unwrap(), "HBM: 1080x2340@60\n");
    assert_eq!(panel.attr_show("hbm_mode").unwrap(), "1\n");

    assert_eq!(panel.attr_store("hbm_mode", "0"), 1);
    assert_eq!(panel.attr_store("alpm_mode", "2"), 1);
    assert_eq!(panel.attr_show("state").unwrap(), "LP\n");
    assert_eq!(panel.attr_show("alpm_mode").unwrap(), "2\n");

    assert_eq!(panel.attr_store("alpm_mode", "0"), 1);
    assert_eq!(panel.attr_show("alpm_mode").unwrap(), "0\n");

    panel.disable().unwrap();
    assert_eq!(panel.attr_show("state").unwrap(), "Off\n");
    assert_eq!(panel.attr_store("alpm_mode", "1"), -22);
}

#[test]
fn test_hbm_attributes_without_ranges() {
    let (panel, _host, _display) = register(&dcs_node(255));

    assert_eq!(panel.attr_show("hbm_mode").unwrap(), "unsupported\n");
    assert_eq!(panel.attr_show("hbm_sv_enabled").unwrap(), "unsupported\n");
    assert_eq!(panel.attr_store("hbm_mode", "1"), -95);
    assert_eq!(panel.attr_store("hbm_sv_enabled", "1"), -95);
}

#[test]
fn test_hbm_mode_store_validates_value() {
    let node = dcs_node(1023).with_child(hbm_ranges(hbm_range(201, 801, 1023, [0x53, 0xE8])));
    let (panel, _host, _display) = register(&node);
    panel.enable().unwrap();

    assert_eq!(panel.attr_store("hbm_mode", "7"), -22);
    assert_eq!(panel.attr_store("hbm_mode", "x"), -22);
    // decimal only
    assert_eq!(panel.attr_store("hbm_mode", "0x1"), -22);
    assert_eq!(panel.hbm_mode(), HbmMode::Off);
    assert_eq!(panel.attr_store("hbm_mode", "1\n"), 2);
    assert_eq!(panel.hbm_mode(), HbmMode::On);
    assert_eq!(panel.attr_store("hbm_mode", "0"), 1);

    assert_eq!(panel.attr_show("hbm_sv_enabled").unwrap(), "false\n");
    assert_eq!(panel.attr_store("hbm_sv_enabled", "y"), 1);
    assert_eq!(panel.attr_show("hbm_sv_enabled").unwrap(), "true\n");
}

#[test]
fn test_als_table_attribute() {
    let node = dcs_node(255).with(
        "qcom,mdss-dsi-bl-notifier-ranges",
        PropValue::U32Array(vec![10, 100, 255]),
    );
    let (panel, _host, _display) = register(&node);

    assert_eq!(panel.attr_show("als_table").unwrap(), "10 100 255 \n");
    assert_eq!(panel.attr_store("als_table", "5 50\n"), 5);
    assert_eq!(panel.attr_show("als_table").unwrap(), "5 50 \n");
    assert_eq!(panel.attr_store("als_table", ""), -22);
    assert_eq!(panel.attr_store("als_table", "1 two"), -22);
    assert_eq!(panel.als_table().unwrap(), vec![5, 50]);
}

#[test]
fn test_als_table_needs_notifier() {
    let (panel, _host, _display) = register(&dcs_node(255));

    assert!(panel.attr_show("als_table").is_err());
    assert_eq!(panel.attr_store("als_table", "1 2"), -22);
}
