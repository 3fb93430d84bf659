//! High-brightness mode: range dispatch, TE-counted dimming and IRC.

use crate::brightness::lerp;
use crate::config::DeviceNode;
use crate::dsi::{self, CmdSet, DsiHost};
use crate::error::PanelError;
use crate::panel::{PanelCore, PanelInner};

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, TryLockError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Maximum number of HBM ranges.
pub const HBM_RANGE_MAX: usize = 4;

const NODE_HBM_RANGES: &str = "google,hbm-ranges";
const KEY_EXIT_CMD: &str = "google,dsi-hbm-exit-command";
const KEY_EXIT_STATE: &str = "google,dsi-hbm-commands-state";
const KEY_EXIT_FRAMES: &str = "google,dsi-hbm-exit-num-dimming-frames";
const KEY_EXIT_STOP_CMD: &str = "google,dsi-hbm-exit-dimming-stop-command";
const KEY_RANGE_THRESHOLD: &str = "google,dsi-hbm-range-brightness-threshold";
const KEY_RANGE_MIN: &str = "google,dsi-hbm-range-bl-min-level";
const KEY_RANGE_MAX: &str = "google,dsi-hbm-range-bl-max-level";
const KEY_RANGE_ENTRY_CMD: &str = "google,dsi-hbm-range-entry-command";
const KEY_RANGE_STATE: &str = "google,dsi-hbm-range-commands-state";
const KEY_RANGE_FRAMES: &str = "google,dsi-hbm-range-num-dimming-frames";
const KEY_RANGE_STOP_CMD: &str = "google,dsi-hbm-range-dimming-stop-command";
const KEY_IRC_ADDR: &str = "google,dsi-irc-addr";
const KEY_IRC_BIT_OFFSET: &str = "google,dsi-irc-bit-offset";
const KEY_IRC_UNLOCK: &str = "google,dsi-irc-unlock-command";
const KEY_IRC_UNLOCK_STATE: &str = "google,dsi-irc-unlock-commands-state";
const KEY_IRC_LOCK: &str = "google,dsi-irc-lock-command";
const KEY_IRC_LOCK_STATE: &str = "google,dsi-irc-lock-commands-state";

/// One HBM brightness band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HbmRange {
    /// First user brightness of the band.
    pub user_bri_start: u32,
    /// Last user brightness of the band.
    pub user_bri_end: u32,
    /// Panel level at `user_bri_start`.
    pub panel_bri_start: u32,
    /// Panel level at `user_bri_end`.
    pub panel_bri_end: u32,
    /// Sent when entering the band.
    pub entry_cmd: CmdSet,
    /// Sent when dimming into the band completes.
    pub dimming_stop_cmd: CmdSet,
    /// Frames to keep dimming enabled after entering.
    pub num_dimming_frames: u32,
}

/// Which command set ends the current dimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimmingStop {
    /// The stop command of range `n`.
    Range(usize),
    /// The HBM exit stop command.
    Exit,
}

/// Frame-counting dimming controller.
#[derive(Debug, Default)]
pub struct Dimming {
    active: Arc<AtomicBool>,
    /// Frames requested by the last start.
    pub frames_total: u32,
    /// Frames still to count.
    pub frames_left: u32,
    /// Command ending the dimming.
    pub stop_cmd: Option<DimmingStop>,
    queue: Option<Sender<DimmingJob>>,
    worker: Option<JoinHandle<()>>,
}

impl Dimming {
    /// Whether frames are being counted.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

enum DimmingJob {
    Run,
}

/// Image-retention compensation bit control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Irc {
    /// Register holding the IRC bit.
    pub addr: u8,
    /// Bit position counted from the first register byte.
    pub bit_offset: u32,
    /// Cached register contents, read on first use.
    pub data: Option<Vec<u8>>,
    /// Sent before touching the register.
    pub unlock_cmd: CmdSet,
    /// Sent after touching the register.
    pub lock_cmd: CmdSet,
}

impl Irc {
    fn byte_offset(&self) -> usize {
        (self.bit_offset / 8) as usize
    }

    fn bit_mask(&self) -> u8 {
        1 << (self.bit_offset % 8)
    }

    fn apply(&mut self, host: &mut dyn DsiHost, enable: bool) -> Result<(), PanelError> {
        let size = self.byte_offset() + 1;

        let data = match self.data.take() {
            Some(data) => data,
            None => {
                let rx = dsi::dcs_read(host, self.addr, size)?;
                if rx.len() != size {
                    error!("failed to read irc ({} / {} bytes)", rx.len(), size);
                    return Err(PanelError::Transfer {
                        cmd: self.addr,
                        reason: "short irc read".into(),
                    });
                }
                info!("read back irc initial configuration");
                rx
            }
        };
        let (idx, mask) = (self.byte_offset(), self.bit_mask());
        let data = self.data.insert(data);

        if enable {
            data[idx] |= mask;
        } else {
            data[idx] &= !mask;
        }

        dsi::dcs_write(host, self.addr, data)
    }
}

/// Parsed HBM configuration plus runtime state.
#[derive(Debug)]
pub struct HbmData {
    /// Bands sorted by `user_bri_start`.
    pub ranges: Vec<HbmRange>,
    /// Band currently programmed; `None` until the first entry.
    pub cur_range: Option<usize>,
    /// Sent when leaving HBM.
    pub exit_cmd: CmdSet,
    /// Sent when exit dimming completes.
    pub exit_dimming_stop_cmd: CmdSet,
    /// Frames of dimming when leaving HBM.
    pub exit_num_dimming_frames: u32,
    /// Dimming controller.
    pub dimming: Dimming,
    /// IRC control, when configured.
    pub irc: Option<Irc>,
}

impl HbmData {
    /// Parse the `google,hbm-ranges` subtree.
    ///
    /// Returns `Ok(None)` when the panel has no HBM ranges. Any invariant
    /// violation is fatal.
    pub fn from_node(node: &DeviceNode, brightness_max_level: u32) -> Result<Option<Self>, PanelError> {
        let Some(np) = node.child(NODE_HBM_RANGES) else {
            info!("HBM modes list not found");
            return Ok(None);
        };

        let num_ranges = np.children.len();
        if num_ranges == 0 || num_ranges > HBM_RANGE_MAX {
            return Err(PanelError::config(
                NODE_HBM_RANGES,
                format!("invalid number of HBM ranges: {num_ranges}"),
            ));
        }

        let exit_cmd = np.read_cmd_set(KEY_EXIT_CMD, KEY_EXIT_STATE)?.unwrap_or_default();
        let exit_num_dimming_frames = np.read_u32(KEY_EXIT_FRAMES)?.unwrap_or(0);
        let exit_dimming_stop_cmd = np
            .read_cmd_set(KEY_EXIT_STOP_CMD, KEY_EXIT_STATE)?
            .unwrap_or_default();
        check_dimming_pair(KEY_EXIT_STOP_CMD, &exit_dimming_stop_cmd, exit_num_dimming_frames)?;

        let irc = parse_irc(np)?;

        let mut ranges = np
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                parse_range(child, brightness_max_level).inspect_err(|e| {
                    error!("failed to parse HBM range {} of {}: {}", i + 1, num_ranges, e)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for i in 1..ranges.len() {
            if ranges[i - 1].user_bri_start >= ranges[i].user_bri_start {
                return Err(PanelError::config(
                    KEY_RANGE_THRESHOLD,
                    "HBM ranges must be sorted by brightness threshold",
                ));
            }
            ranges[i - 1].user_bri_end = ranges[i].user_bri_start - 1;
        }
        if let Some(last) = ranges.last_mut() {
            last.user_bri_end = brightness_max_level;
        }

        Ok(Some(Self {
            ranges,
            cur_range: None,
            exit_cmd,
            exit_dimming_stop_cmd,
            exit_num_dimming_frames,
            dimming: Dimming::default(),
            irc,
        }))
    }

    /// Whether any range or the exit path uses dimming.
    pub fn dimming_used(&self) -> bool {
        self.exit_num_dimming_frames > 0 || self.ranges.iter().any(|r| r.num_dimming_frames > 0)
    }

    /// The first range whose end covers `brightness`.
    pub fn find_range(&self, brightness: u32) -> Option<usize> {
        self.ranges.iter().position(|r| brightness <= r.user_bri_end)
    }

    fn stop_cmd_set(&self, stop: DimmingStop) -> Option<&CmdSet> {
        match stop {
            DimmingStop::Range(i) => self.ranges.get(i).map(|r| &r.dimming_stop_cmd),
            DimmingStop::Exit => Some(&self.exit_dimming_stop_cmd),
        }
    }
}

fn check_dimming_pair(key: &str, stop_cmd: &CmdSet, frames: u32) -> Result<(), PanelError> {
    if stop_cmd.is_empty() != (frames == 0) {
        return Err(PanelError::config(
            key,
            "HBM dimming requires both stop command and number of frames",
        ));
    }
    Ok(())
}

fn parse_range(np: &DeviceNode, brightness_max_level: u32) -> Result<HbmRange, PanelError> {
    let threshold = np
        .read_u32(KEY_RANGE_THRESHOLD)?
        .ok_or_else(|| PanelError::config(KEY_RANGE_THRESHOLD, "missing"))?;
    if threshold > brightness_max_level {
        return Err(PanelError::config(
            KEY_RANGE_THRESHOLD,
            "threshold exceeds max userspace brightness",
        ));
    }

    let panel_bri_start = np
        .read_u32(KEY_RANGE_MIN)?
        .ok_or_else(|| PanelError::config(KEY_RANGE_MIN, "unspecified"))?;
    let panel_bri_end = np
        .read_u32(KEY_RANGE_MAX)?
        .ok_or_else(|| PanelError::config(KEY_RANGE_MAX, "unspecified"))?;
    if panel_bri_end < panel_bri_start {
        return Err(PanelError::config(
            KEY_RANGE_MAX,
            "bl-max-level < bl-min-level",
        ));
    }

    let entry_cmd = np
        .read_cmd_set(KEY_RANGE_ENTRY_CMD, KEY_RANGE_STATE)?
        .unwrap_or_else(|| {
            info!("no optional HBM range entry command");
            CmdSet::default()
        });
    let num_dimming_frames = np.read_u32(KEY_RANGE_FRAMES)?.unwrap_or(0);
    let dimming_stop_cmd = np
        .read_cmd_set(KEY_RANGE_STOP_CMD, KEY_RANGE_STATE)?
        .unwrap_or_default();
    check_dimming_pair(KEY_RANGE_STOP_CMD, &dimming_stop_cmd, num_dimming_frames)?;

    Ok(HbmRange {
        user_bri_start: threshold,
        user_bri_end: brightness_max_level,
        panel_bri_start,
        panel_bri_end,
        entry_cmd,
        dimming_stop_cmd,
        num_dimming_frames,
    })
}

fn parse_irc(np: &DeviceNode) -> Result<Option<Irc>, PanelError> {
    let Some(addr) = np.read_u32(KEY_IRC_ADDR)? else {
        debug!("no irc address");
        return Ok(None);
    };
    let addr = u8::try_from(addr)
        .map_err(|_| PanelError::config(KEY_IRC_ADDR, format!("{addr:#x} is not a DCS register")))?;
    if addr == 0 {
        return Ok(None);
    }

    let Some(bit_offset) = np.read_u32(KEY_IRC_BIT_OFFSET)? else {
        warn!("unable to parse {}, irc disabled", KEY_IRC_BIT_OFFSET);
        return Ok(None);
    };

    let unlock_cmd = np.read_cmd_set(KEY_IRC_UNLOCK, KEY_IRC_UNLOCK_STATE)?;
    let lock_cmd = np.read_cmd_set(KEY_IRC_LOCK, KEY_IRC_LOCK_STATE)?;
    if unlock_cmd.is_some() != lock_cmd.is_some() {
        warn!("unable to get a pair of irc unlock/lock commands, irc disabled");
        return Ok(None);
    }

    Ok(Some(Irc {
        addr,
        bit_offset,
        data: None,
        unlock_cmd: unlock_cmd.unwrap_or_default(),
        lock_cmd: lock_cmd.unwrap_or_default(),
    }))
}

// =============================================================================
// Runtime (panel lock held)
// =============================================================================

impl PanelCore {
    /// Map a scaled brightness through the HBM ranges, entering a new range
    /// first when needed.
    pub(crate) fn hbm_calculate(&mut self, brightness: u32) -> Result<u32, PanelError> {
        let hbm = self.hbm.as_ref().ok_or(PanelError::NotSupported)?;

        // brightness 0 should not get here, but if it does use the dimmest range
        let target = if brightness == 0 {
            0
        } else {
            hbm.find_range(brightness).ok_or_else(|| {
                error!("no matching HBM range for brightness {}", brightness);
                PanelError::NoMatchingRange(brightness)
            })?
        };

        if hbm.cur_range != Some(target) {
            let frames = hbm.ranges[target].num_dimming_frames;
            info!("hbm: range {:?} -> {}", hbm.cur_range, target);

            if let Err(e) = self.hbm_dimming_start(frames, DimmingStop::Range(target)) {
                warn!("hbm: unable to start dimming: {}", e);
            }
            if let Some(hbm) = self.hbm.as_mut() {
                hbm.cur_range = Some(target);
            }

            let rc = match self.update_hbm_hook() {
                Err(PanelError::NotSupported) => match self.hbm.as_ref() {
                    Some(hbm) => hbm.ranges[target].entry_cmd.transfer(self.host.as_mut()),
                    None => Ok(()),
                },
                other => other,
            };
            if let Err(e) = rc {
                error!("failed to send command for range {}: {}", target, e);
                return Err(e);
            }
        }

        let range = &self.hbm.as_ref().ok_or(PanelError::NotSupported)?.ranges[target];
        debug!(
            "hbm: user {}-{}, panel {}-{}",
            range.user_bri_start, range.user_bri_end, range.panel_bri_start, range.panel_bri_end
        );
        lerp(
            range.user_bri_start,
            range.user_bri_end,
            range.panel_bri_start,
            range.panel_bri_end,
            brightness,
        )
    }

    /// Start counting `num_frames` TE events before sending `stop`.
    ///
    /// Takes one vblank reference when dimming becomes active; an already
    /// running count is refreshed instead.
    pub(crate) fn hbm_dimming_start(&mut self, num_frames: u32, stop: DimmingStop) -> Result<(), PanelError> {
        let Some(hbm) = self.hbm.as_mut() else {
            return Ok(());
        };
        if num_frames == 0 {
            return Ok(());
        }
        let Some(queue) = hbm.dimming.queue.as_ref() else {
            error!("hbm: tried to start dimming, but missing worker thread");
            return Err(PanelError::InvalidArgument("no dimming worker"));
        };

        if !hbm.dimming.is_active() {
            self.display.vblank_get().inspect_err(|e| {
                error!("hbm: failed to get vblank: {}", e);
            })?;
            hbm.dimming.set_active(true);
            if queue.send(DimmingJob::Run).is_err() {
                error!("hbm: dimming worker is gone");
                hbm.dimming.set_active(false);
                self.display.vblank_put();
                return Err(PanelError::NoDevice);
            }
            debug!("hbm dimming starting");
        }

        hbm.dimming.frames_total = num_frames;
        hbm.dimming.frames_left = num_frames;
        hbm.dimming.stop_cmd = Some(stop);
        Ok(())
    }

    /// End dimming: release the vblank reference and send the stop command.
    ///
    /// The stop command is only sent while the panel is initialized.
    pub(crate) fn hbm_dimming_stop(&mut self) {
        let Some(hbm) = self.hbm.as_mut() else {
            return;
        };
        if !hbm.dimming.is_active() {
            return;
        }

        self.display.vblank_put();
        hbm.dimming.frames_total = 0;
        hbm.dimming.frames_left = 0;
        hbm.dimming.set_active(false);
        let stop = hbm.dimming.stop_cmd.take();

        if let Some(stop) = stop {
            if self.initialized {
                let rc = match self.update_hbm_hook() {
                    Err(PanelError::NotSupported) => {
                        match self.hbm.as_ref().and_then(|h| h.stop_cmd_set(stop)) {
                            Some(cmd) => cmd.transfer(self.host.as_mut()),
                            None => Ok(()),
                        }
                    }
                    other => other,
                };
                if let Err(e) = rc {
                    error!("hbm: failed to disable brightness dimming: {}", e);
                }
            } else {
                debug!("hbm: panel off, skipping dimming stop command");
            }
        }

        if self.hbm_pending_irc_on {
            if let Err(e) = self.update_irc(true) {
                error!("hbm sv: failed to enable IRC: {}", e);
            }
            self.hbm_pending_irc_on = false;
        }

        debug!("hbm dimming stopped");
    }

    /// Restart the frame count on new backlight activity.
    pub(crate) fn hbm_dimming_restart(&mut self) {
        if let Some(hbm) = self.hbm.as_mut() {
            if hbm.dimming.is_active() {
                hbm.dimming.frames_left = hbm.dimming.frames_total;
                debug!("hbm: dimming restarted");
            }
        }
    }

    /// Set or clear the IRC bit.
    ///
    /// The lock command is sent even when the read-modify-write fails.
    pub(crate) fn update_irc(&mut self, enable: bool) -> Result<(), PanelError> {
        let Some(irc) = self.hbm.as_mut().and_then(|h| h.irc.as_mut()) else {
            return Err(PanelError::NotSupported);
        };
        let host = self.host.as_mut();

        info!("irc update: {}", enable);
        if let Err(e) = irc.unlock_cmd.transfer(host) {
            warn!("irc unlock failed: {}", e);
        }
        let rc = irc.apply(host, enable);
        if let Err(e) = &rc {
            error!("failed to send irc cmd: {}", e);
        }
        if let Err(e) = irc.lock_cmd.transfer(host) {
            warn!("irc lock failed: {}", e);
        }
        rc
    }

    /// Drop the cached IRC register so the next toggle reads it again.
    pub(crate) fn invalidate_irc(&mut self) {
        if let Some(irc) = self.hbm.as_mut().and_then(|h| h.irc.as_mut()) {
            irc.data = None;
        }
    }
}

// =============================================================================
// Dimming Worker
// =============================================================================

/// Spawn the single-threaded dimming queue for `inner`'s HBM data.
pub(crate) fn start_dimming_worker(core: &mut PanelCore, inner: Weak<PanelInner>) -> Result<(), PanelError> {
    let Some(hbm) = core.hbm.as_mut() else {
        return Ok(());
    };
    if !hbm.dimming_used() {
        return Ok(());
    }

    let (tx, rx) = mpsc::channel::<DimmingJob>();
    let active = Arc::clone(&hbm.dimming.active);
    let handle = thread::Builder::new()
        .name("dsi_dimming_workq".into())
        .spawn(move || {
            for DimmingJob::Run in rx {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                dimming_work(&inner, &active);
            }
        })
        .map_err(PanelError::Io)?;

    hbm.dimming.queue = Some(tx);
    hbm.dimming.worker = Some(handle);
    Ok(())
}

/// Detach the dimming queue so it can be joined without the panel lock.
pub(crate) fn take_dimming_worker(core: &mut PanelCore) -> Option<JoinHandle<()>> {
    let hbm = core.hbm.as_mut()?;
    hbm.dimming.queue = None;
    hbm.dimming.worker.take()
}

fn dimming_work(inner: &PanelInner, active: &AtomicBool) {
    while active.load(Ordering::SeqCst) {
        let rc = inner.display.wait_for_vblank();

        // teardown signals the stop while holding the panel lock, so back
        // off instead of blocking on it
        let mut core = match inner.core.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                thread::sleep(Duration::from_micros(1500));
                continue;
            }
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };

        if !active.load(Ordering::SeqCst) {
            break;
        }
        let Some(hbm) = core.hbm.as_mut() else {
            break;
        };

        debug!(
            "hbm: dimming waited on frame {} of {}",
            hbm.dimming.frames_left, hbm.dimming.frames_total
        );
        match rc {
            Err(e) => {
                error!("hbm: failed to wait for vblank, disabling dimming now: {}", e);
                hbm.dimming.frames_left = 0;
            }
            Ok(()) => hbm.dimming.frames_left = hbm.dimming.frames_left.saturating_sub(1),
        }

        if hbm.dimming.frames_left == 0 {
            core.hbm_dimming_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PropValue, pack_cmds};

    fn range(threshold: u32, min: u32, max: u32) -> DeviceNode {
        DeviceNode::new(format!("range@{threshold}"))
            .with(KEY_RANGE_THRESHOLD, PropValue::U32(threshold))
            .with(KEY_RANGE_MIN, PropValue::U32(min))
            .with(KEY_RANGE_MAX, PropValue::U32(max))
    }

    fn panel_with(ranges: Vec<DeviceNode>) -> DeviceNode {
        let mut np = DeviceNode::new(NODE_HBM_RANGES);
        np.children = ranges;
        DeviceNode::new("panel").with_child(np)
    }

    #[test]
    fn test_ranges_are_chained_and_closed() {
        let node = panel_with(vec![range(1, 100, 800), range(201, 801, 1023)]);
        let hbm = HbmData::from_node(&node, 255).unwrap().unwrap();

        assert_eq!(hbm.ranges[0].user_bri_end, 200);
        assert_eq!(hbm.ranges[1].user_bri_end, 255);
        assert_eq!(hbm.cur_range, None);
        assert_eq!(hbm.find_range(200), Some(0));
        assert_eq!(hbm.find_range(220), Some(1));
        assert_eq!(hbm.find_range(256), None);
        assert!(!hbm.dimming_used());
    }

    #[test]
    fn test_unsorted_ranges_are_fatal() {
        let node = panel_with(vec![range(201, 801, 1023), range(1, 100, 800)]);
        assert!(matches!(
            HbmData::from_node(&node, 255),
            Err(PanelError::Config { .. })
        ));
    }

    #[test]
    fn test_inverted_panel_range_is_fatal() {
        let node = panel_with(vec![range(1, 800, 100)]);
        assert!(HbmData::from_node(&node, 255).is_err());
    }

    #[test]
    fn test_threshold_above_max_is_fatal() {
        let node = panel_with(vec![range(1, 1, 2), range(300, 3, 4)]);
        assert!(HbmData::from_node(&node, 255).is_err());
    }

    #[test]
    fn test_unpaired_dimming_is_fatal() {
        let node = panel_with(vec![range(1, 100, 800).with(KEY_RANGE_FRAMES, PropValue::U32(10))]);
        assert!(HbmData::from_node(&node, 255).is_err());

        let node = panel_with(vec![range(1, 100, 800).with(
            KEY_RANGE_STOP_CMD,
            pack_cmds([&[0x53u8, 0x20][..]]),
        )]);
        assert!(HbmData::from_node(&node, 255).is_err());

        let node = panel_with(vec![range(1, 100, 800)
            .with(KEY_RANGE_FRAMES, PropValue::U32(10))
            .with(KEY_RANGE_STOP_CMD, pack_cmds([&[0x53u8, 0x20][..]]))]);
        let hbm = HbmData::from_node(&node, 255).unwrap().unwrap();
        assert!(hbm.dimming_used());
    }

    #[test]
    fn test_too_many_ranges() {
        let ranges = (0..=HBM_RANGE_MAX as u32).map(|i| range(i * 10 + 1, 1, 2)).collect();
        assert!(HbmData::from_node(&panel_with(ranges), 255).is_err());
        assert!(HbmData::from_node(&panel_with(Vec::new()), 255).is_err());
    }

    #[test]
    fn test_irc_requires_paired_lock_commands() {
        let mut node = panel_with(vec![range(1, 100, 800)]);
        node.children[0] = node.children[0]
            .clone()
            .with(KEY_IRC_ADDR, PropValue::U32(0xB5))
            .with(KEY_IRC_BIT_OFFSET, PropValue::U32(11))
            .with(KEY_IRC_UNLOCK, pack_cmds([&[0xF0u8, 0x5A, 0x5A][..]]));
        let hbm = HbmData::from_node(&node, 255).unwrap().unwrap();
        assert!(hbm.irc.is_none());

        node.children[0] = node.children[0]
            .clone()
            .with(KEY_IRC_LOCK, pack_cmds([&[0xF0u8, 0xA5, 0xA5][..]]));
        let hbm = HbmData::from_node(&node, 255).unwrap().unwrap();
        let irc = hbm.irc.unwrap();
        assert_eq!(irc.addr, 0xB5);
        assert_eq!(irc.byte_offset(), 1);
        assert_eq!(irc.bit_mask(), 0x08);
    }
}
