//! The panel: ownership root, locking and power orchestration.
//!
//! [`Panel`] owns the backlight, HBM, LP and switch data. Worker threads
//! only hold weak handles back to it, so dropping the panel tears them
//! down.

use crate::backlight::{self, BacklightConfig, BacklightState, BlUpdate};
use crate::config::DeviceNode;
use crate::controller::{DisplayController, PanelEvent, PwmBackend, Regulator};
use crate::dsi::{CmdSet, DsiHost};
use crate::error::PanelError;
use crate::hbm::{self, DimmingStop, HbmData};
use crate::lp::Te2Config;
use crate::modes::{self, DisplayMode, ModeRequest};
use crate::state::{BacklightSnapshot, BlState, Dpms, HbmMode};
use crate::switch::{self, SwitchData, SwitchFamily, TeSignal};

use log::{debug, error, info, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Lock `m`, recovering the data if a worker panicked while holding it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Panel power command sets.
#[derive(Debug, Clone, Default)]
pub(crate) struct PanelCmds {
    pub on: CmdSet,
    pub off: CmdSet,
    pub lp1: CmdSet,
    pub lp2: CmdSet,
    pub nolp: CmdSet,
}

impl PanelCmds {
    fn from_node(node: &DeviceNode) -> Result<Self, PanelError> {
        let read = |name: &str| -> Result<CmdSet, PanelError> {
            let key = format!("qcom,mdss-dsi-{name}-command");
            let state_key = format!("qcom,mdss-dsi-{name}-command-state");
            Ok(node.read_cmd_set(&key, &state_key)?.unwrap_or_default())
        };

        Ok(Self {
            on: read("on")?,
            off: read("off")?,
            lp1: read("lp1")?,
            lp2: read("lp2")?,
            nolp: read("nolp")?,
        })
    }
}

/// Everything guarded by the panel lock.
pub(crate) struct PanelCore {
    pub host: Box<dyn DsiHost>,
    pub display: Arc<dyn DisplayController>,
    pub initialized: bool,
    pub hbm: Option<HbmData>,
    pub hbm_mode: HbmMode,
    pub hbm_sv_enabled: bool,
    pub hbm_pending_irc_on: bool,
    pub modes: Vec<DisplayMode>,
    pub cur_mode: Option<usize>,
    pub family: SwitchFamily,
    pub switch: SwitchData,
    pub te2: Option<Te2Config>,
    pub dimming_mode: bool,
    pub cmds: PanelCmds,
}

impl PanelCore {
    fn mode_string(&self, idx: Option<usize>) -> Option<String> {
        idx.and_then(|i| self.modes.get(i)).map(DisplayMode::to_string)
    }
}

/// State shared with the worker threads.
///
/// Lock order is always `core` then `bl`.
pub(crate) struct PanelInner {
    pub core: Mutex<PanelCore>,
    pub bl: Mutex<BacklightState>,
    pub display: Arc<dyn DisplayController>,
    /// Signalled when `switch_pending` clears; paired with `core`.
    pub switch_wq: Condvar,
    pub te: Arc<TeSignal>,
}

/// Collaborators handed to [`Panel::register`].
pub struct PanelDeps {
    /// DSI transport.
    pub host: Box<dyn DsiHost>,
    /// Display controller the panel is attached to.
    pub display: Arc<dyn DisplayController>,
    /// PWM output for `bl_ctrl_pwm` panels.
    pub pwm: Option<Box<dyn PwmBackend>>,
    /// Optional LAB regulator.
    pub regulator: Option<Box<dyn Regulator>>,
}

impl PanelDeps {
    /// Host and display only.
    pub fn new(host: impl DsiHost + 'static, display: Arc<dyn DisplayController>) -> Self {
        Self {
            host: Box::new(host),
            display,
            pwm: None,
            regulator: None,
        }
    }

    /// Attach a PWM backend.
    pub fn with_pwm(mut self, pwm: impl PwmBackend + 'static) -> Self {
        self.pwm = Some(Box::new(pwm));
        self
    }

    /// Attach a LAB regulator.
    pub fn with_regulator(mut self, regulator: impl Regulator + 'static) -> Self {
        self.regulator = Some(Box::new(regulator));
        self
    }
}

/// A registered DSI panel.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use dsi_panel_core::{DeviceNode, MockDisplay, MockHost, Panel, PanelDeps, PropValue};
///
/// let node = DeviceNode::new("panel@0")
///     .with("qcom,mdss-dsi-bl-pmic-control-type", PropValue::Str("bl_ctrl_dcs".into()))
///     .with("qcom,mdss-dsi-bl-max-level", PropValue::U32(255));
///
/// let host = MockHost::new();
/// let panel = Panel::register(&node, PanelDeps::new(host.clone(), Arc::new(MockDisplay::new())))?;
/// panel.enable()?;
/// panel.set_brightness(128)?;
/// assert_eq!(host.writes_to(0x51).last(), Some(&vec![0x51, 0x80]));
/// # Ok::<(), dsi_panel_core::PanelError>(())
/// ```
pub struct Panel {
    inner: Arc<PanelInner>,
}

impl Panel {
    /// Parse `node` and bring up the backlight and the worker threads.
    ///
    /// Configuration invariant violations are fatal.
    pub fn register(node: &DeviceNode, deps: PanelDeps) -> Result<Self, PanelError> {
        let config = BacklightConfig::from_node(node)?;
        let hbm = HbmData::from_node(node, config.map.brightness_max_level).inspect_err(|e| {
            error!("error while parsing high brightness mode (hbm) details: {}", e);
        })?;
        let modes = modes::parse_modes(node)?;
        let te2 = Te2Config::from_node(node)?;
        let cmds = PanelCmds::from_node(node)?;
        let family = SwitchFamily::from_node(node);
        let dimming_mode = config.dimming_mode;

        let bl = BacklightState::register(node, config, deps.pwm, deps.regulator)?;
        info!(
            "registered {} with {} modes, hbm {}",
            bl.name,
            modes.len(),
            if hbm.is_some() { "on" } else { "off" }
        );

        let core = PanelCore {
            host: deps.host,
            display: Arc::clone(&deps.display),
            initialized: false,
            hbm,
            hbm_mode: HbmMode::Off,
            hbm_sv_enabled: false,
            hbm_pending_irc_on: false,
            cur_mode: (!modes.is_empty()).then_some(0),
            modes,
            family,
            switch: SwitchData::default(),
            te2,
            dimming_mode,
            cmds,
        };

        let panel = Self {
            inner: Arc::new(PanelInner {
                core: Mutex::new(core),
                bl: Mutex::new(bl),
                display: deps.display,
                switch_wq: Condvar::new(),
                te: Arc::new(TeSignal::default()),
            }),
        };

        {
            let weak = Arc::downgrade(&panel.inner);
            let mut core = lock(&panel.inner.core);
            switch::start_switch_worker(&mut core, weak.clone())?;
            hbm::start_dimming_worker(&mut core, weak)?;
        }
        Ok(panel)
    }

    /// Backlight device name, `panel<N>-backlight`.
    pub fn name(&self) -> String {
        lock(&self.inner.bl).name.clone()
    }

    // =========================================================================
    // Brightness
    // =========================================================================

    /// Set the user brightness and push it to the panel.
    pub fn set_brightness(&self, brightness: u32) -> Result<(), PanelError> {
        {
            let mut bl = lock(&self.inner.bl);
            if brightness > bl.props.max_brightness {
                return Err(PanelError::InvalidArgument("brightness above max"));
            }
            bl.props.brightness = brightness;
        }
        self.update_status()
    }

    /// Requested user brightness.
    pub fn brightness(&self) -> u32 {
        lock(&self.inner.bl).props.brightness
    }

    /// Panel level written last, 0 when unknown.
    pub fn actual_brightness(&self) -> u32 {
        lock(&self.inner.bl).bl_actual.unwrap_or(0)
    }

    /// Recompute the panel level from the current state and write it.
    pub fn update_status(&self) -> Result<(), PanelError> {
        let notify = {
            let mut core = lock(&self.inner.core);
            let mut bl = lock(&self.inner.bl);
            bl.update_status(&mut core)?
        };

        if let Some(brightness) = notify {
            self.inner.display.notify(PanelEvent::Brightness(brightness));
        }
        Ok(())
    }

    /// Set both brightness scale factors.
    pub fn set_scale(&self, bl_scale: u32, bl_scale_sv: u32) -> Result<(), PanelError> {
        if bl_scale > crate::brightness::MAX_BL_SCALE_LEVEL
            || bl_scale_sv > crate::brightness::MAX_SV_BL_SCALE_LEVEL
        {
            return Err(PanelError::InvalidArgument("scale above max"));
        }
        {
            let mut bl = lock(&self.inner.bl);
            bl.bl_scale = bl_scale;
            bl.bl_scale_sv = bl_scale_sv;
        }
        self.update_status()
    }

    /// Adopt the brightness left by the bootloader.
    pub fn brightness_handoff(&self) -> Result<u32, PanelError> {
        let mut core = lock(&self.inner.core);
        let mut bl = lock(&self.inner.bl);
        bl.brightness_handoff(core.host.as_mut())
    }

    /// A consistent view of the backlight state.
    pub fn snapshot(&self) -> BacklightSnapshot {
        let core = lock(&self.inner.core);
        let bl = lock(&self.inner.bl);
        BacklightSnapshot {
            props: bl.props,
            bl_actual: bl.bl_actual,
            last_state: bl.last_state,
            hbm_mode: core.hbm_mode,
            hbm_range: core.hbm.as_ref().and_then(|h| h.cur_range),
            dimming_active: core.hbm.as_ref().is_some_and(|h| h.dimming.is_active()),
            lp_mode: bl.lp_mode(),
            bl_update_pending: bl.bl_update_pending,
        }
    }

    // =========================================================================
    // Power
    // =========================================================================

    /// First DPMS phase.
    pub fn early_dpms(&self, dpms: Dpms) -> Result<(), PanelError> {
        lock(&self.inner.bl).early_dpms(dpms)
    }

    /// Second DPMS phase: commit the state, recompute brightness, announce.
    pub fn late_dpms(&self, dpms: Dpms) {
        lock(&self.inner.bl).late_dpms(dpms);

        if let Err(e) = self.update_status() {
            warn!("backlight update after dpms {:?} failed: {}", dpms, e);
        }
        self.inner.display.notify(PanelEvent::AttrChanged("state"));
        info!("sysfs_notify state:{:?}", lock(&self.inner.bl).props.state);
    }

    /// Both DPMS phases back to back.
    pub fn set_dpms(&self, dpms: Dpms) -> Result<(), PanelError> {
        self.early_dpms(dpms)?;
        self.late_dpms(dpms);
        Ok(())
    }

    /// Current DPMS level.
    pub fn get_dpms(&self) -> Dpms {
        backlight::dpms_from_props(&lock(&self.inner.bl).props)
    }

    fn send_power_cmds(&self, pick: fn(&PanelCmds) -> &CmdSet, name: &str) -> Result<(), PanelError> {
        let mut core = lock(&self.inner.core);
        let core = &mut *core;
        pick(&core.cmds)
            .transfer(core.host.as_mut())
            .inspect_err(|e| error!("failed to send {} cmds: {}", name, e))
    }

    /// Power the panel on.
    pub fn enable(&self) -> Result<(), PanelError> {
        self.early_dpms(Dpms::On)?;
        self.send_power_cmds(|c| &c.on, "on")?;
        {
            let mut core = lock(&self.inner.core);
            core.initialized = true;
            let mut bl = lock(&self.inner.bl);
            if bl.config.bl_update == BlUpdate::DelayUntilFirstFrame {
                bl.allow_bl_update = false;
            }
        }
        self.late_dpms(Dpms::On);
        Ok(())
    }

    /// Late enable hook; s6e3hc2 panels read their gamma tables here.
    pub fn post_enable(&self) -> Result<(), PanelError> {
        self.inner.flush_switch_queue();
        self.inner.queue_gamma_read()
    }

    /// Power the panel off.
    pub fn disable(&self) -> Result<(), PanelError> {
        self.inner.flush_switch_queue();
        self.early_dpms(Dpms::Off)?;

        let rc = self.send_power_cmds(|c| &c.off, "off");
        {
            let mut core = lock(&self.inner.core);
            core.initialized = false;
            core.hbm_dimming_stop();
            core.invalidate_irc();
            if let Some(hbm) = core.hbm.as_mut() {
                hbm.cur_range = None;
            }
        }
        self.late_dpms(Dpms::Off);
        rc
    }

    /// Enter LP1.
    pub fn set_lp1(&self) -> Result<(), PanelError> {
        self.inner.flush_switch_queue();
        self.early_dpms(Dpms::Lp1)?;
        let rc = self.send_power_cmds(|c| &c.lp1, "lp1");
        self.late_dpms(Dpms::Lp1);
        rc
    }

    /// Enter LP2.
    pub fn set_lp2(&self) -> Result<(), PanelError> {
        self.early_dpms(Dpms::Lp2)?;
        let rc = self.send_power_cmds(|c| &c.lp2, "lp2");
        self.late_dpms(Dpms::Lp2);
        rc
    }

    /// Leave LP.
    pub fn set_nolp(&self) -> Result<(), PanelError> {
        self.early_dpms(Dpms::On)?;
        let rc = self.send_power_cmds(|c| &c.nolp, "nolp");
        self.late_dpms(Dpms::On);
        rc
    }

    /// LP level: 0 off, 1 for LP1, 2 for LP2.
    pub fn alpm_mode(&self) -> u32 {
        let state = lock(&self.inner.bl).props.state;
        if state.contains(BlState::LP2) {
            2
        } else {
            u32::from(state.contains(BlState::LP))
        }
    }

    /// Move between LP levels; rejected while blanked.
    pub fn set_alpm_mode(&self, alpm_mode: u32) -> Result<(), PanelError> {
        let state = lock(&self.inner.bl).props.state;
        if state.contains(BlState::FBBLANK) {
            return Err(PanelError::InvalidArgument("panel blanked"));
        }

        let lp_state = state.contains(BlState::LP);
        let lp2_state = state.contains(BlState::LP2);
        match alpm_mode {
            1 if !lp_state || lp2_state => {
                info!("activating lp1 mode");
                self.set_lp1()
            }
            m if m > 1 && !lp2_state => {
                info!("activating lp2 mode");
                self.set_lp2()
            }
            0 if state.is_lp() => {
                info!("activating normal mode");
                self.set_nolp()
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // HBM
    // =========================================================================

    /// Current HBM mode.
    pub fn hbm_mode(&self) -> HbmMode {
        lock(&self.inner.core).hbm_mode
    }

    /// Whether the panel has HBM ranges.
    pub fn has_hbm(&self) -> bool {
        lock(&self.inner.core).hbm.is_some()
    }

    /// Switch HBM on, off or to sunlight-visibility.
    pub fn set_hbm_mode(&self, mode: HbmMode) -> Result<(), PanelError> {
        {
            let mut core = lock(&self.inner.core);
            if core.hbm.is_none() {
                return Err(PanelError::NotSupported);
            }
            if mode == core.hbm_mode {
                return Ok(());
            }
            if mode == HbmMode::Sv && !core.hbm_sv_enabled {
                return Err(PanelError::InvalidArgument("hbm sv not enabled"));
            }

            let prev = core.hbm_mode;
            info!("hbm mode {:?} -> {:?}", prev, mode);
            core.hbm_mode = mode;

            if mode == HbmMode::Off {
                let frames = core.hbm.as_ref().map_or(0, |h| h.exit_num_dimming_frames);
                if let Err(e) = core.hbm_dimming_start(frames, DimmingStop::Exit) {
                    warn!("hbm: unable to start exit dimming: {}", e);
                }
                let rc = match core.update_hbm_hook() {
                    Err(PanelError::NotSupported) => {
                        let core = &mut *core;
                        match core.hbm.as_ref() {
                            Some(hbm) => hbm.exit_cmd.transfer(core.host.as_mut()),
                            None => Ok(()),
                        }
                    }
                    other => other,
                };
                if let Err(e) = rc {
                    error!("failed to send hbm exit cmd: {}", e);
                }
                if let Some(hbm) = core.hbm.as_mut() {
                    hbm.cur_range = None;
                }
            }

            if mode == HbmMode::Sv {
                if let Err(e) = core.update_irc(false) {
                    debug!("hbm sv: irc not disabled: {}", e);
                }
            } else if prev == HbmMode::Sv {
                let dimming = core.hbm.as_ref().is_some_and(|h| h.dimming.is_active());
                if dimming {
                    core.hbm_pending_irc_on = true;
                } else if let Err(e) = core.update_irc(true) {
                    debug!("hbm sv: irc not enabled: {}", e);
                }
            }
        }

        self.update_status()?;
        self.inner.display.notify(PanelEvent::AttrChanged("hbm_mode"));
        Ok(())
    }

    /// Whether sunlight-visibility HBM may be entered.
    pub fn hbm_sv_enabled(&self) -> Result<bool, PanelError> {
        let core = lock(&self.inner.core);
        core.hbm.as_ref().ok_or(PanelError::NotSupported)?;
        Ok(core.hbm_sv_enabled)
    }

    /// Allow or forbid sunlight-visibility HBM.
    pub fn set_hbm_sv_enabled(&self, enabled: bool) -> Result<(), PanelError> {
        let mut core = lock(&self.inner.core);
        core.hbm.as_ref().ok_or(PanelError::NotSupported)?;
        if !enabled && core.hbm_mode == HbmMode::Sv {
            return Err(PanelError::Busy);
        }
        core.hbm_sv_enabled = enabled;
        Ok(())
    }

    /// Set or clear the IRC bit.
    pub fn update_irc(&self, enable: bool) -> Result<(), PanelError> {
        lock(&self.inner.core).update_irc(enable)
    }

    // =========================================================================
    // Modes and Switching
    // =========================================================================

    /// Every mode as `WxH@Hz`.
    pub fn modes(&self) -> Vec<String> {
        lock(&self.inner.core).modes.iter().map(DisplayMode::to_string).collect()
    }

    /// The current mode as `WxH@Hz`.
    pub fn current_mode(&self) -> Option<String> {
        let core = lock(&self.inner.core);
        core.mode_string(core.cur_mode)
    }

    /// Refresh rate of the current mode, 0 without one.
    pub fn refresh_rate(&self) -> u32 {
        let core = lock(&self.inner.core);
        core.cur_mode
            .and_then(|i| core.modes.get(i))
            .map_or(0, |m| m.refresh_rate)
    }

    fn find_mode(&self, req: &ModeRequest) -> Result<usize, PanelError> {
        let core = lock(&self.inner.core);
        modes::find_mode(&core.modes, req).ok_or_else(|| {
            warn!("no mode matches {:?}", req);
            PanelError::InvalidArgument("no matching mode")
        })
    }

    /// Make `req` the current mode and schedule the switch.
    pub fn set_mode(&self, req: &ModeRequest) -> Result<(), PanelError> {
        let idx = self.find_mode(req)?;
        lock(&self.inner.core).cur_mode = Some(idx);
        self.inner.queue_switch(idx)
    }

    /// Schedule a switch to `req` without changing the current mode.
    pub fn switch_to(&self, req: &ModeRequest) -> Result<(), PanelError> {
        if !lock(&self.inner.core).initialized {
            return Err(PanelError::InvalidArgument("panel not initialized"));
        }
        let idx = self.find_mode(req)?;
        self.inner.queue_switch(idx)
    }

    /// Barrier before a frame: waits for a pending switch and opens the
    /// backlight gate, replaying a held-back update.
    pub fn pre_kickoff(&self) -> Result<(), PanelError> {
        self.inner.wait_switch_done();

        let replay = {
            let mut bl = lock(&self.inner.bl);
            if bl.allow_bl_update {
                false
            } else {
                bl.allow_bl_update = true;
                bl.bl_update_pending
            }
        };
        if replay {
            debug!("replaying backlight update held until first frame");
            self.update_status()?;
        }
        Ok(())
    }

    /// Wait until every queued switch has run.
    pub fn flush_switch_queue(&self) {
        self.inner.flush_switch_queue();
    }

    /// Drop to the idle mode before clocks go away.
    pub fn idle(&self) {
        self.inner.switch_idle();
    }

    /// Return from idle to the current mode.
    pub fn wakeup(&self) -> Result<(), PanelError> {
        self.inner.switch_wakeup()
    }

    /// Idle mode as `WxH@Hz`.
    pub fn idle_mode(&self) -> Option<String> {
        let core = lock(&self.inner.core);
        core.mode_string(core.switch.idle_mode)
    }

    /// Set or clear the idle mode.
    pub fn set_idle_mode(&self, req: Option<&ModeRequest>) -> Result<(), PanelError> {
        let idx = req.map(|r| self.find_mode(r)).transpose()?;
        lock(&self.inner.core).switch.idle_mode = idx;
        Ok(())
    }

    /// Number of TEs awaited after each switch.
    pub fn te_listen_count(&self) -> u32 {
        lock(&self.inner.core).switch.te_listen_count
    }

    /// Set the number of TEs awaited after each switch.
    pub fn set_te_listen_count(&self, count: u32) {
        lock(&self.inner.core).switch.te_listen_count = count;
    }

    /// TE events seen while listening.
    pub fn te_counter(&self) -> u32 {
        self.inner.te.count()
    }

    /// Overwrite the TE counter.
    pub fn set_te_counter(&self, value: u32) {
        self.inner.te.set_count(value);
    }

    // =========================================================================
    // Gamma
    // =========================================================================

    /// Read the gamma tables if needed and dump every mode.
    pub fn gamma_dump(&self) -> Result<String, PanelError> {
        let mut core = lock(&self.inner.core);
        if !core.initialized {
            return Err(PanelError::NoDevice);
        }
        core.gamma_read_tables()?;
        Ok(core.gamma_dump())
    }

    /// Force the next enable to read the gamma tables again.
    pub fn invalidate_gamma(&self) -> Result<(), PanelError> {
        let mut core = lock(&self.inner.core);
        match core.family {
            SwitchFamily::S6e3hc2 { .. } => {
                core.family = SwitchFamily::S6e3hc2 { gamma_ready: false };
                Ok(())
            }
            SwitchFamily::Generic => Err(PanelError::NotSupported),
        }
    }

    /// Whether gamma tables are loaded, `None` for panels without them.
    pub fn gamma_ready(&self) -> Option<bool> {
        match lock(&self.inner.core).family {
            SwitchFamily::S6e3hc2 { gamma_ready } => Some(gamma_ready),
            SwitchFamily::Generic => None,
        }
    }

    // =========================================================================
    // Attribute Helpers
    // =========================================================================

    /// `Off`, `LP`, or `On`/`HBM` followed by the current mode.
    pub fn state_string(&self) -> Result<String, PanelError> {
        let core = lock(&self.inner.core);
        let state = lock(&self.inner.bl).props.state;

        if state.is_standby() {
            return Ok("Off".into());
        }
        if state.is_lp() {
            return Ok("LP".into());
        }

        let label = if core.hbm_mode.is_on() { "HBM" } else { "On" };
        let mode = core.mode_string(core.cur_mode).ok_or(PanelError::NoDevice)?;
        Ok(format!("{label}: {mode}"))
    }

    /// ALS notifier thresholds.
    pub fn als_table(&self) -> Result<Vec<u32>, PanelError> {
        lock(&self.inner.bl)
            .notifier
            .as_ref()
            .map(|n| n.ranges.clone())
            .ok_or(PanelError::InvalidArgument("no backlight notifier"))
    }

    /// Replace the ALS notifier thresholds.
    pub fn set_als_table(&self, ranges: Vec<u32>) -> Result<(), PanelError> {
        lock(&self.inner.bl).set_als_table(ranges)
    }
}

impl Drop for Panel {
    fn drop(&mut self) {
        let (switch_worker, dimming_worker) = {
            let mut core = lock(&self.inner.core);
            core.hbm_dimming_stop();
            (
                switch::take_switch_worker(&mut core),
                hbm::take_dimming_worker(&mut core),
            )
        };

        // joined without the panel lock; both queues drain first
        for handle in [switch_worker, dimming_worker].into_iter().flatten() {
            if handle.join().is_err() {
                error!("panel worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PropValue;
    use crate::mock::{MockDisplay, MockHost};

    fn dcs_panel() -> (Panel, MockHost, Arc<MockDisplay>) {
        let node = DeviceNode::new("panel")
            .with(
                "qcom,mdss-dsi-bl-pmic-control-type",
                PropValue::Str("bl_ctrl_dcs".into()),
            )
            .with("qcom,mdss-dsi-bl-min-level", PropValue::U32(1))
            .with("qcom,mdss-dsi-bl-max-level", PropValue::U32(255));
        let host = MockHost::new();
        let display = Arc::new(MockDisplay::new());
        let panel = Panel::register(&node, PanelDeps::new(host.clone(), display.clone())).unwrap();
        (panel, host, display)
    }

    #[test]
    fn test_nothing_is_written_before_enable() {
        let (panel, host, _display) = dcs_panel();
        panel.set_brightness(200).unwrap();

        assert!(host.transactions().is_empty());
        // the level is still tracked
        assert_eq!(panel.actual_brightness(), 200);
    }

    #[test]
    fn test_alpm_requires_unblanked_panel() {
        let (panel, _host, _display) = dcs_panel();
        panel.set_dpms(Dpms::Off).unwrap();
        assert!(matches!(
            panel.set_alpm_mode(1),
            Err(PanelError::InvalidArgument(_))
        ));

        panel.set_dpms(Dpms::On).unwrap();
        panel.set_alpm_mode(1).unwrap();
        assert_eq!(panel.alpm_mode(), 1);
        panel.set_alpm_mode(2).unwrap();
        assert_eq!(panel.alpm_mode(), 2);
        assert_eq!(panel.get_dpms(), Dpms::Lp2);
        panel.set_alpm_mode(0).unwrap();
        assert_eq!(panel.alpm_mode(), 0);
    }

    #[test]
    fn test_hbm_requires_ranges() {
        let (panel, _host, _display) = dcs_panel();
        assert!(!panel.has_hbm());
        assert!(matches!(
            panel.set_hbm_mode(HbmMode::On),
            Err(PanelError::NotSupported)
        ));
        assert!(matches!(
            panel.set_hbm_sv_enabled(true),
            Err(PanelError::NotSupported)
        ));
    }

    #[test]
    fn test_scale_bounds() {
        let (panel, _host, _display) = dcs_panel();
        assert!(panel.set_scale(2048, 1024).is_err());
        panel.set_scale(512, 1024).unwrap();
    }
}
