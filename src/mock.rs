//! In-memory collaborators for testing.
//!
//! These stand in for the DSI host, the display controller, the PWM output
//! and the regulator so the core can be exercised without hardware.

use crate::controller::{DisplayController, PanelEvent, PwmBackend, Regulator, RegulatorMode, TeListener};
use crate::dsi::{DsiHost, DsiMsg};
use crate::error::PanelError;
use crate::panel::lock;

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

// =============================================================================
// Mock DSI Host
// =============================================================================

const FLASH_DATA_REG: u8 = 0xFB;
const FLASH_CTRL_REG: u8 = 0xC1;
const FLASH_READ_INST: u8 = 0x6B;
const GPAR_REG: u8 = 0xB0;

#[derive(Debug, Default)]
struct HostState {
    log: Vec<DsiMsg>,
    registers: HashMap<u8, Vec<u8>>,
    flash: HashMap<u32, u8>,
    flash_addr: u32,
    failing: Vec<u8>,
}

/// A DSI host that records every message and serves reads from a
/// register file.
///
/// Writes with parameters update the register they address, so a value
/// written can be read back. GPAR (`0xB0`) writes only move the parameter
/// pointer and never touch the register file. Register `0xFB` serves the serial flash byte
/// selected by the last flash read instruction.
///
/// Clones share state: hand one clone to the panel and inspect another.
///
/// # Example
///
/// ```
/// use dsi_panel_core::{dsi, MockHost};
///
/// let host = MockHost::new();
/// let mut dev = host.clone();
/// dsi::dcs_write(&mut dev, 0x51, &[0x80]).unwrap();
/// assert_eq!(host.register(0x51), Some(vec![0x80]));
/// assert_eq!(host.transactions().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHost(Arc<Mutex<HostState>>);

impl MockHost {
    /// Create a host with an empty register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message transferred so far.
    pub fn transactions(&self) -> Vec<DsiMsg> {
        lock(&self.0).log.clone()
    }

    /// Forget the recorded messages.
    pub fn clear_transactions(&self) {
        lock(&self.0).log.clear();
    }

    /// Payloads of every write to `cmd`, command byte included.
    pub fn writes_to(&self, cmd: u8) -> Vec<Vec<u8>> {
        lock(&self.0)
            .log
            .iter()
            .filter(|m| !m.is_read() && m.cmd() == cmd)
            .map(|m| m.tx.clone())
            .collect()
    }

    /// Preload the bytes register `cmd` reads back.
    ///
    /// A later write with parameters to `cmd` replaces them; GPAR writes
    /// do not.
    pub fn set_register(&self, cmd: u8, data: &[u8]) {
        lock(&self.0).registers.insert(cmd, data.to_vec());
    }

    /// Current contents of register `cmd`.
    pub fn register(&self, cmd: u8) -> Option<Vec<u8>> {
        lock(&self.0).registers.get(&cmd).cloned()
    }

    /// Preload serial flash starting at `addr`.
    pub fn set_flash(&self, addr: u32, data: &[u8]) {
        let mut state = lock(&self.0);
        for (i, &b) in data.iter().enumerate() {
            state.flash.insert(addr + i as u32, b);
        }
    }

    /// Make every transfer of `cmd` fail.
    pub fn fail_cmd(&self, cmd: u8) {
        lock(&self.0).failing.push(cmd);
    }
}

impl DsiHost for MockHost {
    fn transfer(&mut self, msg: &DsiMsg) -> Result<Vec<u8>, PanelError> {
        let mut state = lock(&self.0);
        state.log.push(msg.clone());

        let cmd = msg.cmd();
        if state.failing.contains(&cmd) {
            return Err(PanelError::Transfer {
                cmd,
                reason: "injected failure".into(),
            });
        }

        if msg.is_read() {
            if cmd == FLASH_DATA_REG {
                let byte = state.flash.get(&state.flash_addr).copied().unwrap_or(0);
                return Ok(vec![0x00, byte]);
            }
            return Ok(state.registers.get(&cmd).cloned().unwrap_or_default());
        }

        let tx = &msg.tx;
        if cmd == FLASH_CTRL_REG && tx.len() >= 11 && tx[4] == FLASH_READ_INST {
            state.flash_addr = (u32::from(tx[9]) << 8) | u32::from(tx[10]);
        } else if cmd != GPAR_REG && tx.len() > 1 {
            state.registers.insert(cmd, tx[1..].to_vec());
        }
        Ok(Vec::new())
    }
}

// =============================================================================
// Mock Display Controller
// =============================================================================

const VBLANK_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct DisplayState {
    vblank_refs: u32,
    pending_vblanks: u32,
    listeners: Vec<Arc<dyn TeListener>>,
    events: Vec<PanelEvent>,
    te_fired: u32,
}

/// A display controller whose TE is driven by hand with
/// [`MockDisplay::fire_te`].
///
/// Vblank waits only complete while a vblank reference is held, and only
/// for TEs fired after it was taken.
#[derive(Default)]
pub struct MockDisplay {
    state: Mutex<DisplayState>,
    cv: Condvar,
}

impl MockDisplay {
    /// Create a display with no listeners and no vblank references.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one TE: wake vblank waiters and call the TE listeners.
    pub fn fire_te(&self) {
        let listeners = {
            let mut state = lock(&self.state);
            state.te_fired += 1;
            if state.vblank_refs > 0 {
                state.pending_vblanks += 1;
            }
            state.listeners.clone()
        };
        self.cv.notify_all();

        for l in listeners {
            l.handle_te();
        }
    }

    /// Vblank references currently held.
    pub fn vblank_refs(&self) -> u32 {
        lock(&self.state).vblank_refs
    }

    /// TEs fired but not yet consumed by a vblank wait.
    pub fn pending_vblanks(&self) -> u32 {
        lock(&self.state).pending_vblanks
    }

    /// Number of TE listeners registered.
    pub fn te_listeners(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// TEs fired so far.
    pub fn te_fired(&self) -> u32 {
        lock(&self.state).te_fired
    }

    /// Every event reported so far.
    pub fn events(&self) -> Vec<PanelEvent> {
        lock(&self.state).events.clone()
    }

    /// Forget the recorded events.
    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }
}

impl DisplayController for MockDisplay {
    fn vblank_get(&self) -> Result<(), PanelError> {
        let mut state = lock(&self.state);
        state.vblank_refs += 1;
        Ok(())
    }

    fn vblank_put(&self) {
        let mut state = lock(&self.state);
        state.vblank_refs = state.vblank_refs.saturating_sub(1);
        if state.vblank_refs == 0 {
            state.pending_vblanks = 0;
        }
        drop(state);
        self.cv.notify_all();
    }

    fn wait_for_vblank(&self) -> Result<(), PanelError> {
        let state = lock(&self.state);
        if state.vblank_refs == 0 {
            return Err(PanelError::NoDevice);
        }

        let (mut state, res) = self
            .cv
            .wait_timeout_while(state, VBLANK_WAIT_TIMEOUT, |s| {
                s.pending_vblanks == 0 && s.vblank_refs > 0
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.pending_vblanks > 0 {
            state.pending_vblanks -= 1;
            Ok(())
        } else if res.timed_out() {
            Err(PanelError::IoTimeout("vblank"))
        } else {
            Err(PanelError::NoDevice)
        }
    }

    fn add_te_listener(&self, listener: Arc<dyn TeListener>) {
        lock(&self.state).listeners.push(listener);
    }

    fn remove_te_listener(&self, listener: &Arc<dyn TeListener>) {
        lock(&self.state)
            .listeners
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify(&self, event: PanelEvent) {
        lock(&self.state).events.push(event);
    }
}

// =============================================================================
// Mock Power Collaborators
// =============================================================================

#[derive(Debug, Default)]
struct PwmState {
    config: Option<(u64, u64)>,
    enabled: bool,
}

/// A PWM output remembering its last configuration.
#[derive(Debug, Clone, Default)]
pub struct MockPwm(Arc<Mutex<PwmState>>);

impl MockPwm {
    /// Create a disabled, unconfigured output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last `(duty_ns, period_ns)` programmed.
    pub fn last_config(&self) -> Option<(u64, u64)> {
        lock(&self.0).config
    }

    /// Whether the output is enabled.
    pub fn is_enabled(&self) -> bool {
        lock(&self.0).enabled
    }
}

impl PwmBackend for MockPwm {
    fn config(&mut self, duty_ns: u64, period_ns: u64) -> Result<(), PanelError> {
        if duty_ns > period_ns {
            return Err(PanelError::InvalidArgument("duty above period"));
        }
        lock(&self.0).config = Some((duty_ns, period_ns));
        Ok(())
    }

    fn enable(&mut self) -> Result<(), PanelError> {
        lock(&self.0).enabled = true;
        Ok(())
    }

    fn disable(&mut self) {
        lock(&self.0).enabled = false;
    }
}

/// A regulator recording every mode change.
#[derive(Debug, Clone, Default)]
pub struct MockRegulator(Arc<Mutex<Vec<RegulatorMode>>>);

impl MockRegulator {
    /// Create a regulator with no recorded changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Modes set so far, oldest first.
    pub fn modes(&self) -> Vec<RegulatorMode> {
        lock(&self.0).clone()
    }
}

impl Regulator for MockRegulator {
    fn set_mode(&mut self, mode: RegulatorMode) -> Result<(), PanelError> {
        lock(&self.0).push(mode);
        Ok(())
    }
}
