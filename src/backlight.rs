//! Backlight state machine: composite state, DPMS phases and actuators.
//!
//! [`BacklightState`] sits behind the backlight lock. Every path that
//! reaches the panel also holds the panel lock, always taken first.

use crate::brightness::{self, BrightnessMap, MAX_BL_SCALE_LEVEL, MAX_SV_BL_SCALE_LEVEL};
use crate::config::DeviceNode;
use crate::controller::{PanelEvent, PwmBackend, Regulator, RegulatorMode};
use crate::dsi::{self, DsiHost, dcs};
use crate::error::PanelError;
use crate::lp::{BINNED_LP_COMPATIBLE, BinnedLp, LpStep};
use crate::panel::PanelCore;
use crate::state::{BacklightProps, BlState, Dpms, Power};

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};

/// Maximum number of ALS notifier thresholds.
pub const BL_RANGE_MAX: usize = 10;

const KEY_BL_TYPE: &str = "qcom,mdss-dsi-bl-pmic-control-type";
const KEY_BL_UPDATE_FLAG: &str = "qcom,bl-update-flag";
const KEY_HIGH_BYTE_OFFSET: &str = "google,dsi-bl-cmd-high-byte-offset";
const KEY_NOTIFIER_RANGES: &str = "qcom,mdss-dsi-bl-notifier-ranges";
const KEY_DIMMING_ENABLE: &str = "google,dsi-panel-dimming-enable";
const KEY_PWM_PERIOD: &str = "qcom,bl-pmic-pwm-period-usecs";

const DEFAULT_HIGH_BYTE_OFFSET: u32 = 8;

static DISPLAY_COUNT: AtomicU32 = AtomicU32::new(0);

/// How the backlight is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklightType {
    /// PWM output.
    Pwm,
    /// DCS brightness command.
    Dcs,
    /// WLED driver outside the core.
    Wled,
    /// External driver.
    External,
    /// Not configured.
    Unknown,
}

impl BacklightType {
    /// Decode `qcom,mdss-dsi-bl-pmic-control-type`.
    pub fn from_dt(value: Option<&str>) -> Self {
        match value {
            Some("bl_ctrl_pwm") => Self::Pwm,
            Some("bl_ctrl_wled") => Self::Wled,
            Some("bl_ctrl_dcs") => Self::Dcs,
            Some("bl_ctrl_external") => Self::External,
            Some(other) => {
                debug!("bl-pmic-control-type unknown-{}", other);
                Self::Unknown
            }
            None => Self::Unknown,
        }
    }
}

/// When backlight writes are allowed after enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlUpdate {
    /// Immediately.
    #[default]
    None,
    /// Only once the first frame has been kicked off.
    DelayUntilFirstFrame,
}

/// Backlight configuration read at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklightConfig {
    /// Actuation path.
    pub bl_type: BacklightType,
    /// Normal brightness mapping.
    pub map: BrightnessMap,
    /// Bits in the low byte of a two-byte brightness payload.
    pub high_byte_offset: u32,
    /// Write gating after enable.
    pub bl_update: BlUpdate,
    /// Panel-side dimming enabled.
    pub dimming_mode: bool,
    /// ALS notifier thresholds, if configured.
    pub notifier_ranges: Option<Vec<u32>>,
    /// PWM period in microseconds.
    pub pwm_period_us: Option<u32>,
}

impl BacklightConfig {
    /// Read the backlight keys of the panel node.
    pub fn from_node(node: &DeviceNode) -> Result<Self, PanelError> {
        let bl_type = BacklightType::from_dt(node.read_string(KEY_BL_TYPE)?);

        let bl_update = match node.read_string(KEY_BL_UPDATE_FLAG)? {
            Some("delay_until_first_frame") => BlUpdate::DelayUntilFirstFrame,
            Some(other) => {
                debug!("no valid bl-update-flag: {}", other);
                BlUpdate::None
            }
            None => BlUpdate::None,
        };

        let map = BrightnessMap::from_node(node)?;

        let notifier_ranges = match node.read_u32_array(KEY_NOTIFIER_RANGES)? {
            Some(r) if r.len() > BL_RANGE_MAX => {
                debug!("unable to parse optional backlight ranges ({} entries)", r.len());
                None
            }
            other => other,
        };

        let high_byte_offset = node.read_u32(KEY_HIGH_BYTE_OFFSET)?.unwrap_or_else(|| {
            debug!("dsi-bl-cmd-high-byte-offset unspecified, defaulting to 8");
            DEFAULT_HIGH_BYTE_OFFSET
        });

        Ok(Self {
            bl_type,
            map,
            high_byte_offset,
            bl_update,
            dimming_mode: node.read_bool(KEY_DIMMING_ENABLE),
            notifier_ranges,
            pwm_period_us: node.read_u32(KEY_PWM_PERIOD)?,
        })
    }
}

/// ALS notifier: reports when the brightness category changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlNotifier {
    /// Thresholds, ascending.
    pub ranges: Vec<u32>,
    /// Category reported last.
    pub cur_range: usize,
}

impl BlNotifier {
    /// The first range whose threshold covers `brightness`.
    pub fn find_range(&self, brightness: u32) -> Option<usize> {
        self.ranges.iter().position(|&r| brightness <= r)
    }
}

/// The regulator mode implied by `state`.
pub fn regulator_mode(state: BlState) -> RegulatorMode {
    if state.is_standby() {
        RegulatorMode::Standby
    } else if state.is_lp() {
        RegulatorMode::Idle
    } else {
        RegulatorMode::Normal
    }
}

/// The DPMS level reported for `props`.
pub fn dpms_from_props(props: &BacklightProps) -> Dpms {
    if props.power == Power::Powerdown {
        Dpms::Off
    } else if props.state.contains(BlState::LP2) {
        Dpms::Lp2
    } else if props.state.contains(BlState::LP) {
        Dpms::Lp1
    } else {
        Dpms::On
    }
}

/// Write `bl_lvl` with DCS `SET_DISPLAY_BRIGHTNESS`.
///
/// A value equal to `bl_actual` is not sent again.
pub fn update_dcs(
    host: &mut dyn DsiHost,
    config: &BacklightConfig,
    bl_actual: Option<u32>,
    bl_lvl: u32,
) -> Result<(), PanelError> {
    if bl_lvl > 0xFFFF {
        error!("invalid backlight level {}", bl_lvl);
        return Err(PanelError::InvalidArgument("backlight level above 0xffff"));
    }
    if bl_actual == Some(bl_lvl) {
        return Ok(());
    }

    let hbyte = config.high_byte_offset;
    let two_bytes = 1u32
        .checked_shl(hbyte)
        .is_some_and(|bit| config.map.bl_max_level >= bit);

    let rc = if two_bytes {
        let low_mask = (1u32 << hbyte) - 1;
        let high = bl_lvl.checked_shr(hbyte).unwrap_or(0);
        dsi::dcs_write(
            host,
            dcs::SET_DISPLAY_BRIGHTNESS,
            &[high as u8, (bl_lvl & low_mask) as u8],
        )
    } else {
        dsi::dcs_write(host, dcs::SET_DISPLAY_BRIGHTNESS, &[bl_lvl as u8])
    };
    rc.inspect_err(|e| error!("failed to update dcs backlight {}: {}", bl_lvl, e))
}

// =============================================================================
// Actuators
// =============================================================================

/// PWM-driven backlight.
pub(crate) struct PwmActuator {
    backend: Box<dyn PwmBackend>,
    period_us: u32,
    enabled: bool,
}

impl PwmActuator {
    fn update(&mut self, bl_lvl: u32, bl_max_level: u32) -> Result<(), PanelError> {
        if bl_lvl == 0 {
            if self.enabled {
                self.backend.disable();
                self.enabled = false;
            }
            return Ok(());
        }

        let period_ns = u64::from(self.period_us) * 1000;
        let duty_ns = match bl_max_level {
            0 => period_ns,
            max => u64::from(bl_lvl.min(max)) * period_ns / u64::from(max),
        };
        self.backend.config(duty_ns, period_ns)?;
        if !self.enabled {
            self.backend.enable()?;
            self.enabled = true;
        }
        Ok(())
    }
}

pub(crate) enum Actuator {
    /// Driven outside the core (WLED).
    External,
    Dcs,
    BinnedLp(BinnedLp),
    Pwm(PwmActuator),
}

impl Actuator {
    fn select(
        node: &DeviceNode,
        config: &BacklightConfig,
        pwm: Option<Box<dyn PwmBackend>>,
    ) -> Result<Self, PanelError> {
        if node.is_compatible(BINNED_LP_COMPATIBLE) {
            if let Some(lp) = BinnedLp::from_node(node)? {
                info!("binned lp backlight with {} modes", lp.modes.len());
                return Ok(Self::BinnedLp(lp));
            }
        }

        match config.bl_type {
            BacklightType::Wled => Ok(Self::External),
            BacklightType::Dcs => Ok(Self::Dcs),
            BacklightType::Pwm => {
                let backend = pwm.ok_or_else(|| {
                    error!("failed to request pwm");
                    PanelError::NoDevice
                })?;
                let period_us = config.pwm_period_us.ok_or_else(|| {
                    error!("bl-pmic-pwm-period-usecs is not defined");
                    PanelError::config(KEY_PWM_PERIOD, "missing")
                })?;
                Ok(Self::Pwm(PwmActuator {
                    backend,
                    period_us,
                    enabled: false,
                }))
            }
            other => {
                error!("backlight type {:?} not supported", other);
                Err(PanelError::NotSupported)
            }
        }
    }
}

// =============================================================================
// Backlight State
// =============================================================================

/// Everything guarded by the backlight lock.
pub(crate) struct BacklightState {
    pub name: String,
    pub config: BacklightConfig,
    pub props: BacklightProps,
    /// Last level written; `None` forces the next write.
    pub bl_actual: Option<u32>,
    pub last_state: BlState,
    pub bl_scale: u32,
    pub bl_scale_sv: u32,
    pub allow_bl_update: bool,
    pub bl_update_pending: bool,
    pub notifier: Option<BlNotifier>,
    actuator: Actuator,
    regulator: Option<Box<dyn Regulator>>,
}

impl BacklightState {
    /// Pick the actuator and register the `panel<N>-backlight` device.
    pub fn register(
        node: &DeviceNode,
        config: BacklightConfig,
        pwm: Option<Box<dyn PwmBackend>>,
        regulator: Option<Box<dyn Regulator>>,
    ) -> Result<Self, PanelError> {
        let actuator = Actuator::select(node, &config, pwm)?;

        let name = format!(
            "panel{}-backlight",
            DISPLAY_COUNT.fetch_add(1, Ordering::SeqCst)
        );
        if regulator.is_some() {
            info!("LAB regulator found");
        }

        let max = config.map.brightness_max_level;
        let notifier = config.notifier_ranges.clone().map(|ranges| BlNotifier {
            ranges,
            cur_range: 0,
        });

        Ok(Self {
            name,
            props: BacklightProps {
                brightness: max / 2,
                max_brightness: max,
                power: Power::Unblank,
                state: BlState::empty(),
            },
            bl_actual: None,
            last_state: BlState::empty(),
            bl_scale: MAX_BL_SCALE_LEVEL,
            bl_scale_sv: MAX_SV_BL_SCALE_LEVEL,
            allow_bl_update: true,
            bl_update_pending: false,
            notifier,
            actuator,
            regulator,
            config,
        })
    }

    /// Name of the active LP bin.
    pub fn lp_mode(&self) -> Option<String> {
        match &self.actuator {
            Actuator::BinnedLp(lp) => lp.active_name().map(str::to_string),
            _ => None,
        }
    }

    /// Map a user brightness to a panel level under the current HBM mode.
    pub fn calculate(&self, core: &mut PanelCore, brightness: u32) -> Result<u32, PanelError> {
        if brightness == 0 {
            return Ok(0);
        }

        let scaled = brightness::scale(brightness, self.bl_scale, self.bl_scale_sv);
        let bl_lvl = if core.hbm_mode.is_on() {
            core.hbm_calculate(scaled)?
        } else {
            self.config.map.calculate(scaled)?
        };

        info!(
            "brightness={}, bl_scale={}, sv={}, bl_lvl={}, hbm={:?}",
            brightness, self.bl_scale, self.bl_scale_sv, bl_lvl, core.hbm_mode
        );
        Ok(bl_lvl)
    }

    /// The single backlight write path.
    ///
    /// Returns the user brightness to report once both locks are dropped.
    pub fn update_status(&mut self, core: &mut PanelCore) -> Result<Option<u32>, PanelError> {
        let mut brightness = self.props.brightness;
        if self.props.state.is_standby() || self.props.power != Power::Unblank {
            brightness = 0;
        }

        let bl_lvl = self.calculate(core, brightness).inspect_err(|e| {
            error!("unable to calculate backlight for {}: {}", brightness, e);
        })?;
        if self.bl_actual == Some(bl_lvl) && self.last_state == self.props.state {
            return Ok(None);
        }

        if !self.allow_bl_update {
            self.bl_update_pending = true;
            return Ok(None);
        }

        core.hbm_dimming_restart();

        let mut need_notify = false;
        if core.initialized {
            info!(
                "req:{} bl:{} state:{:?}",
                self.props.brightness, bl_lvl, self.props.state
            );
            self.actuate(core, bl_lvl).inspect_err(|e| {
                error!("unable to set backlight: {}", e);
            })?;
            self.bl_update_pending = false;
            need_notify = true;

            if self.props.state.is_on() && !core.hbm_mode.is_on() {
                self.update_notifier(core, brightness);
            }
        }

        self.bl_actual = Some(bl_lvl);
        self.last_state = self.props.state;

        Ok((need_notify && brightness > 0).then_some(brightness))
    }

    fn actuate(&mut self, core: &mut PanelCore, bl_lvl: u32) -> Result<(), PanelError> {
        match &mut self.actuator {
            Actuator::External => Ok(()),
            Actuator::Dcs => update_dcs(core.host.as_mut(), &self.config, self.bl_actual, bl_lvl),
            Actuator::BinnedLp(lp) => match lp.update(core, &self.props) {
                LpStep::Binned => Ok(()),
                LpStep::Left => {
                    // ensure update after lpm
                    self.bl_actual = None;
                    update_dcs(core.host.as_mut(), &self.config, None, bl_lvl)
                }
                LpStep::Normal => {
                    update_dcs(core.host.as_mut(), &self.config, self.bl_actual, bl_lvl)
                }
            },
            Actuator::Pwm(pwm) => pwm.update(bl_lvl, self.config.map.bl_max_level),
        }
    }

    fn update_notifier(&mut self, core: &PanelCore, brightness: u32) {
        let Some(notifier) = self.notifier.as_mut() else {
            return;
        };
        match notifier.find_range(brightness) {
            None => error!("unable to find range from the backlight table for {}", brightness),
            Some(range) if range != notifier.cur_range => {
                notifier.cur_range = range;
                debug!("cur_range = {}, brightness = {}", range, brightness);
                core.display.notify(PanelEvent::AttrChanged("brightness"));
            }
            Some(_) => {}
        }
    }

    fn update_regulator(&mut self, state: BlState) -> Result<(), PanelError> {
        let Some(reg) = self.regulator.as_mut() else {
            return Ok(());
        };
        let mode = regulator_mode(state);
        if mode != regulator_mode(self.last_state) {
            debug!("set lab vreg mode: {:?}", mode);
            reg.set_mode(mode)?;
        }
        Ok(())
    }

    /// First DPMS phase: the regulator drops to idle before LP is entered.
    pub fn early_dpms(&mut self, dpms: Dpms) -> Result<(), PanelError> {
        info!("power_mode:{:?} state:{:?}", dpms, self.props.state);

        let state = dpms.apply(self.props.state);
        if state.is_lp() {
            self.update_regulator(state).inspect_err(|e| {
                warn!("error updating regulator state {:?}: {}", state, e);
            })?;
        }
        Ok(())
    }

    /// Second DPMS phase: commit the new state.
    ///
    /// The caller recomputes brightness and announces `state` afterwards.
    pub fn late_dpms(&mut self, dpms: Dpms) {
        debug!("power_mode:{:?} state:{:?}", dpms, self.props.state);

        let state = dpms.apply(self.props.state);
        if !state.is_lp() {
            if let Err(e) = self.update_regulator(state) {
                warn!("error updating regulator state {:?}: {}", state, e);
            }
        }

        self.props.power = if state.contains(BlState::FBBLANK) {
            Power::Powerdown
        } else {
            Power::Unblank
        };
        self.props.state = state;
    }

    /// Read the brightness the bootloader left and adopt it as the user value.
    pub fn brightness_handoff(&mut self, host: &mut dyn DsiHost) -> Result<u32, PanelError> {
        let rx = dsi::dcs_read(host, dcs::GET_DISPLAY_BRIGHTNESS, 2)?;
        let bl_lvl = match rx.as_slice() {
            [lvl] => u32::from(*lvl),
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            _ => {
                error!("unexpected buffer size: {}", rx.len());
                return Err(PanelError::Transfer {
                    cmd: dcs::GET_DISPLAY_BRIGHTNESS,
                    reason: format!("read {} bytes", rx.len()),
                });
            }
        };

        // some panels may not clear non-functional bits
        let bits = u32::BITS - self.config.map.bl_max_level.leading_zeros();
        let mask = 1u32.checked_shl(bits).map_or(u32::MAX, |b| b - 1);
        let bl_lvl = bl_lvl & mask;

        let brightness = self.config.map.to_user(bl_lvl).inspect_err(|e| {
            error!("failed to map brightness to user space: {}", e);
        })?;
        debug!("brightness 0x{:x} to user space {}", bl_lvl, brightness);
        self.props.brightness = brightness;
        Ok(brightness)
    }

    /// Replace the ALS thresholds.
    pub fn set_als_table(&mut self, ranges: Vec<u32>) -> Result<(), PanelError> {
        let notifier = self
            .notifier
            .as_mut()
            .ok_or(PanelError::InvalidArgument("no backlight notifier"))?;
        if ranges.is_empty() || ranges.len() > BL_RANGE_MAX {
            warn!("als: incorrect parameters from als table node");
            return Err(PanelError::InvalidArgument("als table size"));
        }
        notifier.ranges = ranges;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropValue;
    use crate::mock::{MockHost, MockPwm, MockRegulator};

    fn dcs_config(bl_max_level: u32) -> BacklightConfig {
        BacklightConfig {
            bl_type: BacklightType::Dcs,
            map: BrightnessMap {
                bl_min_level: 1,
                bl_max_level,
                brightness_max_level: 255,
                lut: None,
            },
            high_byte_offset: DEFAULT_HIGH_BYTE_OFFSET,
            bl_update: BlUpdate::None,
            dimming_mode: false,
            notifier_ranges: None,
            pwm_period_us: None,
        }
    }

    #[test]
    fn test_dcs_payload_width_follows_max_level() {
        let host = MockHost::new();
        let mut dev = host.clone();

        update_dcs(&mut dev, &dcs_config(255), None, 128).unwrap();
        update_dcs(&mut dev, &dcs_config(2047), None, 0x3FF).unwrap();
        // unchanged value is not resent
        update_dcs(&mut dev, &dcs_config(2047), Some(0x3FF), 0x3FF).unwrap();

        let log = host.transactions();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].tx, vec![0x51, 0x80]);
        assert_eq!(log[1].tx, vec![0x51, 0x03, 0xFF]);

        assert!(update_dcs(&mut dev, &dcs_config(2047), None, 0x1_0000).is_err());
    }

    #[test]
    fn test_high_byte_offset_splits_payload() {
        let host = MockHost::new();
        let mut dev = host.clone();
        let config = BacklightConfig {
            high_byte_offset: 4,
            ..dcs_config(255)
        };

        update_dcs(&mut dev, &config, None, 0xAB).unwrap();
        assert_eq!(host.transactions()[0].tx, vec![0x51, 0x0A, 0x0B]);
    }

    #[test]
    fn test_config_defaults_and_types() {
        let config = BacklightConfig::from_node(&DeviceNode::new("panel")).unwrap();
        assert_eq!(config.bl_type, BacklightType::Unknown);
        assert_eq!(config.high_byte_offset, 8);
        assert_eq!(config.bl_update, BlUpdate::None);
        assert_eq!(config.map.bl_max_level, brightness::MAX_BL_LEVEL);

        let node = DeviceNode::new("panel")
            .with(KEY_BL_TYPE, PropValue::Str("bl_ctrl_pwm".into()))
            .with(KEY_BL_UPDATE_FLAG, PropValue::Str("delay_until_first_frame".into()))
            .with(KEY_NOTIFIER_RANGES, PropValue::U32Array((0..11).collect()));
        let config = BacklightConfig::from_node(&node).unwrap();
        assert_eq!(config.bl_type, BacklightType::Pwm);
        assert_eq!(config.bl_update, BlUpdate::DelayUntilFirstFrame);
        assert!(config.notifier_ranges.is_none());
    }

    #[test]
    fn test_registration_rejects_unsupported_types() {
        let node = DeviceNode::new("panel");
        let mut config = dcs_config(255);

        config.bl_type = BacklightType::External;
        assert!(matches!(
            BacklightState::register(&node, config.clone(), None, None),
            Err(PanelError::NotSupported)
        ));

        config.bl_type = BacklightType::Wled;
        let bl = BacklightState::register(&node, config.clone(), None, None).unwrap();
        assert!(bl.name.starts_with("panel"));
        assert!(bl.name.ends_with("-backlight"));
        assert_eq!(bl.props.brightness, 127);

        config.bl_type = BacklightType::Pwm;
        assert!(matches!(
            BacklightState::register(&node, config.clone(), None, None),
            Err(PanelError::NoDevice)
        ));
        let pwm = MockPwm::new();
        assert!(BacklightState::register(&node, config, Some(Box::new(pwm)), None).is_err());
    }

    #[test]
    fn test_pwm_duty_and_disable() {
        let pwm = MockPwm::new();
        let mut act = PwmActuator {
            backend: Box::new(pwm.clone()),
            period_us: 100,
            enabled: false,
        };

        act.update(512, 1024).unwrap();
        assert_eq!(pwm.last_config(), Some((50_000, 100_000)));
        assert!(pwm.is_enabled());

        act.update(0, 1024).unwrap();
        assert!(!pwm.is_enabled());
    }

    #[test]
    fn test_regulator_follows_dpms_phases() {
        let reg = MockRegulator::new();
        let node = DeviceNode::new("panel");
        let mut bl =
            BacklightState::register(&node, dcs_config(255), None, Some(Box::new(reg.clone())))
                .unwrap();

        // leaving on for LP switches the regulator in the early phase
        bl.early_dpms(Dpms::Lp1).unwrap();
        assert_eq!(reg.modes(), vec![RegulatorMode::Idle]);
        bl.late_dpms(Dpms::Lp1);
        assert_eq!(reg.modes().len(), 1);
        assert_eq!(dpms_from_props(&bl.props), Dpms::Lp1);

        bl.last_state = bl.props.state;
        bl.early_dpms(Dpms::Off).unwrap();
        bl.late_dpms(Dpms::Off);
        assert_eq!(reg.modes(), vec![RegulatorMode::Idle, RegulatorMode::Standby]);
        assert_eq!(bl.props.power, Power::Powerdown);
        assert_eq!(dpms_from_props(&bl.props), Dpms::Off);
    }

    #[test]
    fn test_handoff_masks_and_maps() {
        let host = MockHost::new();
        // bits above fls(1023) are garbage
        host.set_register(0x52, &[0xF3, 0xFF]);
        let mut dev = host.clone();

        let mut config = dcs_config(1023);
        config.map.bl_min_level = 0;
        let mut bl = BacklightState::register(&DeviceNode::new("p"), config, None, None).unwrap();

        assert_eq!(bl.brightness_handoff(&mut dev).unwrap(), 255);
        assert_eq!(bl.props.brightness, 255);

        host.set_register(0x52, &[]);
        assert!(bl.brightness_handoff(&mut dev).is_err());
    }

    #[test]
    fn test_notifier_ranges() {
        let notifier = BlNotifier {
            ranges: vec![10, 100, 255],
            cur_range: 0,
        };
        assert_eq!(notifier.find_range(5), Some(0));
        assert_eq!(notifier.find_range(100), Some(1));
        assert_eq!(notifier.find_range(300), None);
    }
}
