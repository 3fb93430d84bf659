//! Refresh-rate switching on a dedicated worker thread.
//!
//! Switches are shadowed by the panel until the next TE, so the worker
//! issues them ahead of the frame and optionally listens for the TE that
//! commits them.

use crate::controller::{PanelEvent, TeListener};
use crate::dsi::{self, dcs};
use crate::error::PanelError;
use crate::gamma::{LOCK_CMD, UNLOCK_CMD};
use crate::panel::{PanelCore, PanelInner, lock};

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on TE and switch waits.
pub const TE_TIMEOUT_MS: u64 = 50;

/// Compatible string of the s6e3hc2 gamma-replaying family.
pub const S6E3HC2_COMPATIBLE: &str = "google,dsi_s6e3hc2_gamma";

const TE_TIMEOUT: Duration = Duration::from_millis(TE_TIMEOUT_MS);

bitflags::bitflags! {
    /// WRCTRLD (0x53) register bits on s6e3hc2 panels.
    #[derive(Debug)]
    #[derive(Clone, Copy)]
    #[derive(PartialEq, Eq)]
    #[derive(Default)]
    pub(crate) struct Wrctrld: u8 {
        const DIMMING_ON = 1 << 3;
        const FRAME_RATE_90HZ = 1 << 4;
        const BRIGHTNESS_CONTROL_ON = 1 << 5;
        const HBM_ON = 0b11 << 6;
    }
}

/// Panel family selecting how switches are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchFamily {
    /// Send the mode's timing-switch command set.
    Generic,
    /// Samsung s6e3hc2: WRCTRLD plus per-mode gamma replay.
    S6e3hc2 {
        /// All modes' gamma tables have been read.
        gamma_ready: bool,
    },
}

impl SwitchFamily {
    /// Pick the family from the panel's compatible list.
    pub fn from_node(node: &crate::config::DeviceNode) -> Self {
        if node.is_compatible(S6E3HC2_COMPATIBLE) {
            Self::S6e3hc2 { gamma_ready: false }
        } else {
            Self::Generic
        }
    }
}

pub(crate) enum SwitchJob {
    Switch,
    ReadGamma,
    Flush(Sender<()>),
}

/// Switch bookkeeping, guarded by the panel lock.
#[derive(Debug, Default)]
pub(crate) struct SwitchData {
    pub display_mode: Option<usize>,
    pub idle_mode: Option<usize>,
    pub switch_pending: bool,
    pub te_listen_count: u32,
    queue: Option<Sender<SwitchJob>>,
    worker: Option<JoinHandle<()>>,
}

// =============================================================================
// TE Completion
// =============================================================================

/// Counts TE interrupts and completes waiters.
#[derive(Debug, Default)]
pub struct TeSignal {
    counter: AtomicU32,
    done: Mutex<u32>,
    cv: Condvar,
}

impl TeSignal {
    /// TE events seen while listening.
    pub fn count(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Overwrite the TE counter.
    pub fn set_count(&self, value: u32) {
        self.counter.store(value, Ordering::Relaxed);
    }

    fn reset(&self) {
        *lock(&self.done) = 0;
    }

    /// Wait for one completion; `false` on timeout.
    fn wait(&self, timeout: Duration) -> bool {
        let done = lock(&self.done);
        let (mut done, res) = self
            .cv
            .wait_timeout_while(done, timeout, |n| *n == 0)
            .unwrap_or_else(PoisonError::into_inner);
        if res.timed_out() {
            return false;
        }
        *done -= 1;
        true
    }
}

impl TeListener for TeSignal {
    fn handle_te(&self) {
        *lock(&self.done) += 1;
        self.cv.notify_all();
        self.counter.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Performing Switches (panel lock held)
// =============================================================================

impl PanelCore {
    /// The WRCTRLD value for the current HBM and dimming state at `refresh_rate`.
    pub(crate) fn wrctrld_value(&self, refresh_rate: u32) -> Wrctrld {
        let dimming = self.hbm.as_ref().is_some_and(|h| h.dimming.is_active());

        let mut val = Wrctrld::BRIGHTNESS_CONTROL_ON;
        val.set(Wrctrld::HBM_ON, self.hbm_mode.is_on());
        val.set(Wrctrld::FRAME_RATE_90HZ, refresh_rate == 90);
        val.set(Wrctrld::DIMMING_ON, dimming || self.dimming_mode);
        val
    }

    /// Refresh rate the panel runs at, as last scheduled.
    pub(crate) fn active_refresh_rate(&self) -> Option<u32> {
        self.switch
            .display_mode
            .or(self.cur_mode)
            .and_then(|i| self.modes.get(i))
            .map(|m| m.refresh_rate)
    }

    /// Family hook updating HBM state in the panel.
    ///
    /// Families without one return `NotSupported` so callers fall back to
    /// the configured command sets.
    pub(crate) fn update_hbm_hook(&mut self) -> Result<(), PanelError> {
        match self.family {
            SwitchFamily::Generic => Err(PanelError::NotSupported),
            SwitchFamily::S6e3hc2 { .. } => {
                let rate = self.active_refresh_rate().unwrap_or(60);
                let val = self.wrctrld_value(rate);
                debug!("WRCTRLD {:?}", val);
                dsi::dcs_write(self.host.as_mut(), dcs::WRITE_CONTROL_DISPLAY, &[val.bits()])
            }
        }
    }

    fn send_timing_switch(&mut self, mode: usize) {
        let Some(m) = self.modes.get(mode) else {
            return;
        };
        if let Err(e) = m.timing_switch.transfer(self.host.as_mut()) {
            warn!("failed to send TIMING switch cmd: {}", e);
        }
    }

    /// Switch the panel to `mode` now.
    pub(crate) fn perform_switch(&mut self, mode: usize) {
        match self.family {
            SwitchFamily::Generic => self.send_timing_switch(mode),
            SwitchFamily::S6e3hc2 { .. } => {
                if dsi::dcs_write_buffer(self.host.as_mut(), &UNLOCK_CMD, true).is_err() {
                    error!("unlock failed, switch to mode #{} dropped", mode);
                    return;
                }
                self.send_timing_switch(mode);

                let rate = self.modes.get(mode).map_or(0, |m| m.refresh_rate);
                let val = self.wrctrld_value(rate);
                if let Err(e) =
                    dsi::dcs_write(self.host.as_mut(), dcs::WRITE_CONTROL_DISPLAY, &[val.bits()])
                {
                    warn!("failed to update WRCTRLD: {}", e);
                }

                self.gamma_replay(mode);

                if let Err(e) = dsi::dcs_write_buffer(self.host.as_mut(), &LOCK_CMD, true) {
                    warn!("lock after switch failed: {}", e);
                }
            }
        }
    }
}

// =============================================================================
// Switch Worker
// =============================================================================

/// Spawn the `panel` worker thread serving the switch queue.
pub(crate) fn start_switch_worker(core: &mut PanelCore, inner: Weak<PanelInner>) -> Result<(), PanelError> {
    let (tx, rx) = mpsc::channel::<SwitchJob>();

    // std threads have no SCHED_FIFO; the worker runs at normal priority
    let handle = thread::Builder::new()
        .name("panel".into())
        .spawn(move || {
            for job in rx {
                match job {
                    SwitchJob::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    SwitchJob::Switch | SwitchJob::ReadGamma => {
                        let Some(inner) = inner.upgrade() else {
                            break;
                        };
                        if matches!(job, SwitchJob::Switch) {
                            inner.switch_work();
                        } else {
                            inner.gamma_work();
                        }
                    }
                }
            }
        })
        .map_err(PanelError::Io)?;

    core.switch.queue = Some(tx);
    core.switch.worker = Some(handle);
    Ok(())
}

/// Detach the switch queue so it can be joined without the panel lock.
pub(crate) fn take_switch_worker(core: &mut PanelCore) -> Option<JoinHandle<()>> {
    core.switch.queue = None;
    core.switch.worker.take()
}

impl PanelInner {
    fn queue(&self, job: SwitchJob) -> Result<(), PanelError> {
        let queue = lock(&self.core).switch.queue.clone();
        let queue = queue.ok_or(PanelError::NoDevice)?;
        queue.send(job).map_err(|_| {
            error!("panel switch worker is gone");
            PanelError::NoDevice
        })
    }

    /// Wait until every job queued so far has run.
    ///
    /// Must not be called with the panel lock held.
    pub(crate) fn flush_switch_queue(&self) {
        let (tx, rx) = mpsc::channel();
        if self.queue(SwitchJob::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Schedule a switch to `mode`.
    pub(crate) fn queue_switch(&self, mode: usize) -> Result<(), PanelError> {
        self.flush_switch_queue();

        {
            let mut core = lock(&self.core);
            core.switch.display_mode = Some(mode);
            core.switch.switch_pending = true;
        }

        self.queue(SwitchJob::Switch).inspect_err(|_| {
            let mut core = lock(&self.core);
            core.switch.switch_pending = false;
            self.switch_wq.notify_all();
        })
    }

    /// Queue a gamma read unless the tables are ready.
    pub(crate) fn queue_gamma_read(&self) -> Result<(), PanelError> {
        let ready = match lock(&self.core).family {
            SwitchFamily::S6e3hc2 { gamma_ready } => gamma_ready,
            SwitchFamily::Generic => return Ok(()),
        };
        if ready {
            return Ok(());
        }
        self.queue(SwitchJob::ReadGamma)
    }

    fn gamma_work(&self) {
        let mut core = lock(&self.core);
        if let Err(e) = core.gamma_read_tables() {
            error!("gamma read failed: {}", e);
        }
    }

    pub(crate) fn switch_work(&self) {
        let listener: Arc<dyn TeListener> = self.te.clone();

        let (rate, te_listen_cnt) = {
            let mut core = lock(&self.core);
            let Some(mode) = core.switch.display_mode else {
                return;
            };
            let rate = core.modes.get(mode).map_or(0, |m| m.refresh_rate);
            debug!("switching mode to {}hz", rate);

            let te_listen_cnt = core.switch.te_listen_count;
            if te_listen_cnt > 0 {
                self.te.reset();
                self.display.add_te_listener(Arc::clone(&listener));
            }

            // switch is shadowed by vsync so this can be done ahead of TE
            core.perform_switch(mode);

            if core.switch.switch_pending {
                core.switch.switch_pending = false;
                self.switch_wq.notify_all();
            }
            (rate, te_listen_cnt)
        };
        self.display.notify(PanelEvent::AttrChanged("state"));

        if te_listen_cnt == 0 {
            return;
        }

        let start = Instant::now();
        let mut got = self.te.wait(TE_TIMEOUT);
        if got {
            debug!("TE received after {}us", start.elapsed().as_micros());
        } else {
            warn!("timed out waiting for TE while switching to {}hz", rate);
        }

        // debug aid: keep TE enabled a few extra frames to see alignment
        let mut extra = te_listen_cnt - 1;
        debug!("waiting for {} extra te", extra);
        while got && extra > 0 {
            got = self.te.wait(TE_TIMEOUT);
            extra -= 1;
        }
        self.display.remove_te_listener(&listener);
    }

    /// Block until no switch is pending, bounded by [`TE_TIMEOUT_MS`].
    pub(crate) fn wait_switch_done(&self) {
        let core = lock(&self.core);
        let (_core, res) = self
            .switch_wq
            .wait_timeout_while(core, TE_TIMEOUT, |c| c.switch.switch_pending)
            .unwrap_or_else(PoisonError::into_inner);
        if res.timed_out() {
            warn!("timed out waiting for panel switch");
        }
    }

    /// Synchronously drop to the idle mode, if one is set.
    pub(crate) fn switch_idle(&self) {
        let mut core = lock(&self.core);
        let Some(idle) = core.switch.idle_mode else {
            return;
        };
        if Some(idle) == core.switch.display_mode.or(core.cur_mode) {
            return;
        }
        if !core.initialized {
            return;
        }

        info!("entering idle mode #{}", idle);
        core.perform_switch(idle);
        core.switch.display_mode = Some(idle);
    }

    /// Requeue the current mode if idle moved the panel away from it.
    pub(crate) fn switch_wakeup(&self) -> Result<(), PanelError> {
        let (cur, scheduled) = {
            let core = lock(&self.core);
            (core.cur_mode, core.switch.display_mode)
        };
        match cur {
            Some(cur) if Some(cur) != scheduled => {
                info!("leaving idle, back to mode #{}", cur);
                self.queue_switch(cur)
            }
            _ => Ok(()),
        }
    }
}
