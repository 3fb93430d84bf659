//! Brightness, HBM, low-power and refresh-rate switching for MIPI-DSI
//! command-mode OLED panels.
//!
//! This crate is the policy core of a panel driver. It maps user brightness
//! to panel levels, runs high-brightness-mode ranges with TE-counted
//! dimming, bins brightness in low-power (AOD) mode, and switches refresh
//! rates on a worker thread, replaying per-mode gamma on panels that need
//! it.
//!
//! Hardware stays behind traits: bytes go out through a [`DsiHost`], vblank
//! and TE come from a [`DisplayController`], and an optional [`PwmBackend`]
//! and [`Regulator`] complete the picture. The panel itself is described by
//! a device-tree style [`DeviceNode`], usually loaded from JSON.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dsi_panel_core::{DeviceNode, Dpms, MockDisplay, MockHost, Panel, PanelDeps, PanelError};
//!
//! fn main() -> Result<(), PanelError> {
//!     let node = DeviceNode::from_json_str(
//!         r#"{
//!             "name": "panel@0",
//!             "properties": {
//!                 "qcom,mdss-dsi-bl-pmic-control-type": "bl_ctrl_dcs",
//!                 "qcom,mdss-dsi-bl-min-level": 1,
//!                 "qcom,mdss-dsi-bl-max-level": 255
//!             }
//!         }"#,
//!     )?;
//!
//!     let host = MockHost::new();
//!     let display = Arc::new(MockDisplay::new());
//!     let panel = Panel::register(&node, PanelDeps::new(host.clone(), display))?;
//!
//!     panel.enable()?;
//!     panel.set_brightness(128)?;
//!     assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0x80]));
//!
//!     panel.set_dpms(Dpms::Off)?;
//!     assert_eq!(panel.attr_show("state")?, "Off\n");
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! [`MockHost`], [`MockDisplay`], [`MockPwm`] and [`MockRegulator`] record
//! everything the core does so behaviour can be checked without hardware.
//! TE is delivered by hand with [`MockDisplay::fire_te`].

#![warn(missing_docs)]

mod attrs;
mod backlight;
pub mod brightness;
mod config;
mod controller;
pub mod dsi;
mod error;
mod gamma;
mod hbm;
mod lp;
mod mock;
mod modes;
mod panel;
mod state;
mod switch;

// Re-export public API
pub use attrs::ATTRIBUTES;
pub use backlight::{
    BL_RANGE_MAX, BacklightConfig, BacklightType, BlNotifier, BlUpdate, dpms_from_props,
    regulator_mode, update_dcs,
};
pub use brightness::BrightnessMap;
pub use config::{DeviceNode, PropValue, pack_cmds};
pub use controller::{
    DisplayController, PanelEvent, PwmBackend, Regulator, RegulatorMode, TeListener,
};
pub use dsi::{CmdSet, CmdState, DsiCmd, DsiHost, DsiMsg, MsgType};
pub use error::PanelError;
pub use gamma::{GammaData, GammaTable, S6E3HC2_GAMMA_TABLES};
pub use hbm::{Dimming, DimmingStop, HBM_RANGE_MAX, HbmData, HbmRange, Irc};
pub use lp::{BINNED_LP_COMPATIBLE, BinnedLp, LpBin, LpStep, MAX_BINNED_BL_MODES, Te2Config, Te2Edge};
pub use mock::{MockDisplay, MockHost, MockPwm, MockRegulator};
pub use modes::{DisplayMode, ModeRequest};
pub use panel::{Panel, PanelDeps};
pub use state::{BacklightProps, BacklightSnapshot, BlState, Dpms, HbmMode, Power};
pub use switch::{S6E3HC2_COMPATIBLE, SwitchFamily, TE_TIMEOUT_MS, TeSignal};
