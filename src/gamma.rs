//! Per-mode gamma calibration for the s6e3hc2 family.
//!
//! The 60 Hz tables come from OTP, the 90 Hz tables from the DDIC's serial
//! flash. Both are kept per mode and replayed on every switch.

use crate::dsi::{self, DsiHost};
use crate::error::PanelError;
use crate::panel::PanelCore;
use crate::switch::SwitchFamily;

use log::{debug, error, trace, warn};
use std::fmt::Write as _;
use std::thread;
use std::time::Duration;

/// Level-2 key unlock.
pub const UNLOCK_CMD: [u8; 3] = [0xF0, 0x5A, 0x5A];
/// Level-2 key lock.
pub const LOCK_CMD: [u8; 3] = [0xF0, 0xA5, 0xA5];

const FLASH_MODE_EN: [u8; 3] = [0xF1, 0xF1, 0xA2];
const FLASH_MODE_DIS: [u8; 3] = [0xF1, 0xA5, 0xA5];
const PGM_DIS: [u8; 2] = [0xC0, 0x00];
const PGM_EN: [u8; 2] = [0xC0, 0x02];
const EXE_INST: [u8; 2] = [0xC0, 0x03];
const WRITE_EN: [u8; 13] = [
    0xC1, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05,
];
const QUAD_EN: [u8; 12] = [
    0xC1, 0x00, 0x00, 0x00, 0x01, 0x40, 0x02, 0x00, 0x00, 0x00, 0x00, 0x10,
];
const FLASH_RD: [u8; 14] = [
    0xC1, 0x00, 0x00, 0x00, 0x6B, 0x00, 0x00, 0x00, // read instruction
    0x0A, 0x00, 0x00, // flash data address 0A0000h
    0x00, 0x05, // bit rate
    0x01,
];
const GPAR: u8 = 0xB0;
const GPAR_FLASH_DATA: [u8; 2] = [GPAR, 0x0B];
const FLASH_DATA_REG: u8 = 0xFB;

/// One gamma register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GammaTable {
    /// Register command byte.
    pub cmd: u8,
    /// Payload length.
    pub len: usize,
    /// Leading bytes taken from OTP rather than flash.
    pub prefix_len: usize,
    /// Payload location in flash.
    pub flash_offset: u32,
    /// Sent in one burst with the next table.
    pub group_with_next: bool,
    /// GPAR offset selected before the OTP read, 0 for none.
    pub par_offset: u8,
}

/// The s6e3hc2 gamma registers, in replay order.
pub const S6E3HC2_GAMMA_TABLES: [GammaTable; 3] = [
    GammaTable {
        cmd: 0xC8,
        len: 135,
        prefix_len: 0,
        flash_offset: 0x0000,
        group_with_next: false,
        par_offset: 0x00,
    },
    GammaTable {
        cmd: 0xC9,
        len: 180,
        prefix_len: 0,
        flash_offset: 0x0087,
        group_with_next: true,
        par_offset: 0x00,
    },
    GammaTable {
        cmd: 0xB3,
        len: 45,
        prefix_len: 2,
        flash_offset: 0x013B,
        group_with_next: false,
        par_offset: 0x02,
    },
];

/// All gamma tables of one mode in one buffer.
///
/// Each table occupies `len + 1` bytes with its command byte first, so a
/// table slice is written to the panel as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaData {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl GammaData {
    /// Zeroed tables with their command bytes in place.
    pub fn new(tables: &[GammaTable]) -> Self {
        let mut buf = Vec::with_capacity(tables.iter().map(|t| t.len + 1).sum());
        let mut offsets = Vec::with_capacity(tables.len());
        for t in tables {
            offsets.push(buf.len());
            buf.push(t.cmd);
            buf.resize(buf.len() + t.len, 0);
        }
        Self { buf, offsets }
    }

    /// Table `i` including its command byte.
    pub fn table(&self, i: usize) -> &[u8] {
        let end = self.offsets.get(i + 1).copied().unwrap_or(self.buf.len());
        &self.buf[self.offsets[i]..end]
    }

    /// Payload of table `i`, without the command byte.
    pub fn payload(&self, i: usize) -> &[u8] {
        &self.table(i)[1..]
    }

    fn payload_mut(&mut self, i: usize) -> &mut [u8] {
        let end = self.offsets.get(i + 1).copied().unwrap_or(self.buf.len());
        &mut self.buf[self.offsets[i] + 1..end]
    }

    /// Copy each table's OTP prefix from `otp` over this buffer.
    pub fn merge_prefix(&mut self, otp: &GammaData, tables: &[GammaTable]) {
        for (i, t) in tables.iter().enumerate() {
            if t.prefix_len == 0 {
                continue;
            }
            let n = t.prefix_len.min(t.len);
            let src = otp.payload(i)[..n].to_vec();
            self.payload_mut(i)[..n].copy_from_slice(&src);
        }
    }
}

fn write(host: &mut dyn DsiHost, data: &[u8]) -> Result<(), PanelError> {
    dsi::dcs_write_buffer(host, data, true)
}

/// Read every table from OTP.
///
/// Only a failed GPAR write aborts; short or failed reads keep what arrived.
fn read_otp(host: &mut dyn DsiHost, tables: &[GammaTable]) -> Result<GammaData, PanelError> {
    let mut data = GammaData::new(tables);

    for (i, t) in tables.iter().enumerate() {
        if t.par_offset != 0 {
            write(host, &[GPAR, t.par_offset])
                .inspect_err(|e| error!("failed to read gamma from otp: {}", e))?;
        }
        match dsi::dcs_read(host, t.cmd, t.len) {
            Ok(rx) => {
                if rx.len() != t.len {
                    warn!("only got {} / {} bytes", rx.len(), t.len);
                }
                data.payload_mut(i)[..rx.len()].copy_from_slice(&rx);
            }
            Err(e) => warn!("gamma otp read 0x{:02X} failed: {}", t.cmd, e),
        }
    }
    Ok(data)
}

/// Read every table from flash, skipping each OTP prefix.
fn read_flash(host: &mut dyn DsiHost, tables: &[GammaTable]) -> Result<GammaData, PanelError> {
    let mut data = GammaData::new(tables);
    read_flash_into(host, tables, &mut data)
        .inspect_err(|e| error!("failed to read gamma from flash: {}", e))?;
    Ok(data)
}

fn read_flash_into(
    host: &mut dyn DsiHost,
    tables: &[GammaTable],
    data: &mut GammaData,
) -> Result<(), PanelError> {
    write(host, &FLASH_MODE_EN)?;
    write(host, &PGM_EN)?;
    write(host, &WRITE_EN)?;
    write(host, &EXE_INST)?;
    thread::sleep(Duration::from_micros(1000));

    write(host, &QUAD_EN)?;
    write(host, &EXE_INST)?;
    thread::sleep(Duration::from_millis(30));

    for (i, t) in tables.iter().enumerate() {
        for j in t.prefix_len..t.len {
            let offset = t.flash_offset + j as u32;
            let mut flash_rd = FLASH_RD;
            flash_rd[9] = ((offset >> 8) & 0xFF) as u8;
            flash_rd[10] = (offset & 0xFF) as u8;

            write(host, &flash_rd)?;
            write(host, &EXE_INST)?;
            thread::sleep(Duration::from_micros(200));
            write(host, &GPAR_FLASH_DATA)?;

            let rx = dsi::dcs_read(host, FLASH_DATA_REG, 2).unwrap_or_default();
            if rx.len() != 2 {
                warn!("only got {} / 2 bytes", rx.len());
            }
            trace!("read flash offset {:04x}: {:02X?}", offset, rx);
            data.payload_mut(i)[j] = rx.get(1).copied().unwrap_or(0);
        }
    }

    write(host, &PGM_DIS)?;
    write(host, &FLASH_MODE_DIS)
}

// =============================================================================
// Panel Integration
// =============================================================================

impl PanelCore {
    /// Read the gamma tables of every mode once.
    ///
    /// No-op when the tables are already ready. The whole read runs between
    /// unlock and lock.
    pub(crate) fn gamma_read_tables(&mut self) -> Result<(), PanelError> {
        let SwitchFamily::S6e3hc2 { gamma_ready } = self.family else {
            return Err(PanelError::NotSupported);
        };
        if gamma_ready {
            return Ok(());
        }

        write(self.host.as_mut(), &UNLOCK_CMD)?;
        let rc = self.gamma_read_modes();
        if rc.is_ok() {
            self.family = SwitchFamily::S6e3hc2 { gamma_ready: true };
        }
        write(self.host.as_mut(), &LOCK_CMD)?;
        rc
    }

    fn gamma_read_modes(&mut self) -> Result<(), PanelError> {
        let tables = &S6E3HC2_GAMMA_TABLES;

        for i in 0..self.modes.len() {
            let rate = self.modes[i].refresh_rate;
            let data = match rate {
                60 => read_otp(self.host.as_mut(), tables)?,
                90 => read_flash(self.host.as_mut(), tables)?,
                _ => {
                    error!("unable to read gamma for mode #{}: unknown refresh rate {}", i, rate);
                    return Err(PanelError::InvalidArgument("unknown refresh rate"));
                }
            };
            debug!("read gamma for mode #{} ({}hz)", i, rate);
            self.modes[i].gamma = Some(data);
        }

        let otp = self
            .modes
            .iter()
            .find(|m| m.refresh_rate == 60)
            .and_then(|m| m.gamma.clone());
        if let Some(otp) = otp {
            for mode in self.modes.iter_mut().filter(|m| m.refresh_rate == 90) {
                if let Some(flash) = mode.gamma.as_mut() {
                    flash.merge_prefix(&otp, tables);
                }
            }
        }
        Ok(())
    }

    /// Write the gamma tables of `mode`, honouring table grouping.
    pub(crate) fn gamma_replay(&mut self, mode: usize) {
        let Some(gamma) = self.modes.get(mode).and_then(|m| m.gamma.as_ref()) else {
            warn!("gamma tables for mode #{} not read", mode);
            return;
        };

        for (i, t) in S6E3HC2_GAMMA_TABLES.iter().enumerate() {
            if let Err(e) = dsi::dcs_write_buffer(self.host.as_mut(), gamma.table(i), !t.group_with_next) {
                warn!("failed sending gamma cmd 0x{:02X}: {}", t.cmd, e);
            }
        }
    }

    /// Render every mode's tables for the debug attribute.
    pub(crate) fn gamma_dump(&self) -> String {
        let mut out = String::new();
        for mode in &self.modes {
            let _ = write!(out, "\n=== {}hz Mode Gamma ===\n", mode.refresh_rate);
            let Some(gamma) = mode.gamma.as_ref() else {
                out.push_str("No data available!\n");
                continue;
            };
            for (i, t) in S6E3HC2_GAMMA_TABLES.iter().enumerate() {
                let _ = write!(out, "0x{:02X}:", t.cmd);
                for (j, b) in gamma.payload(i).iter().enumerate() {
                    if j > 0 && j % 8 == 0 {
                        out.push_str("\n     ");
                    }
                    let _ = write!(out, " {:02X}", b);
                }
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;

    #[test]
    fn test_layout_reserves_command_byte() {
        let data = GammaData::new(&S6E3HC2_GAMMA_TABLES);
        assert_eq!(data.table(0).len(), 136);
        assert_eq!(data.table(1)[0], 0xC9);
        assert_eq!(data.table(2).len(), 46);
        assert_eq!(data.payload(2).len(), 45);
    }

    #[test]
    fn test_prefix_merge_copies_otp_bytes() {
        let mut otp = GammaData::new(&S6E3HC2_GAMMA_TABLES);
        otp.payload_mut(2)[..3].copy_from_slice(&[0x5A, 0x3C, 0x77]);
        otp.payload_mut(0)[0] = 0x11;
        let mut flash = GammaData::new(&S6E3HC2_GAMMA_TABLES);
        flash.payload_mut(2)[2] = 0x99;

        flash.merge_prefix(&otp, &S6E3HC2_GAMMA_TABLES);

        assert_eq!(&flash.payload(2)[..3], &[0x5A, 0x3C, 0x99]);
        // tables without a prefix are untouched
        assert_eq!(flash.payload(0)[0], 0x00);
    }

    #[test]
    fn test_otp_short_read_keeps_partial_data() {
        let host = MockHost::new();
        host.set_register(0xC8, &[0x01, 0x02]);
        let mut dev = host.clone();

        let data = read_otp(&mut dev, &S6E3HC2_GAMMA_TABLES).unwrap();
        assert_eq!(&data.payload(0)[..3], &[0x01, 0x02, 0x00]);
        assert_eq!(data.table(0)[0], 0xC8);
    }

    #[test]
    fn test_otp_read_selects_gpar_offset() {
        let host = MockHost::new();
        let mut dev = host.clone();

        read_otp(&mut dev, &S6E3HC2_GAMMA_TABLES).unwrap();

        let log = host.transactions();
        let b3 = log.iter().position(|m| m.cmd() == 0xB3).unwrap();
        assert_eq!(log[b3 - 1].tx, vec![0xB0, 0x02]);
        // only B3 carries an offset
        assert_eq!(host.writes_to(0xB0), vec![vec![0xB0, 0x02]]);
    }

    #[test]
    fn test_otp_read_aborts_when_gpar_write_fails() {
        let host = MockHost::new();
        host.fail_cmd(0xB0);
        let mut dev = host.clone();

        assert!(read_otp(&mut dev, &S6E3HC2_GAMMA_TABLES).is_err());
        assert!(!host.transactions().iter().any(|m| m.cmd() == 0xB3));
    }

    #[test]
    fn test_flash_read_skips_prefix_and_closes_flash_mode() {
        let host = MockHost::new();
        host.set_flash(0x013B + 2, &[0xAB, 0xCD]);
        let mut dev = host.clone();

        let data = read_flash(&mut dev, &S6E3HC2_GAMMA_TABLES).unwrap();
        assert_eq!(&data.payload(2)[..4], &[0x00, 0x00, 0xAB, 0xCD]);

        let log = host.transactions();
        let tail: Vec<_> = log[log.len() - 2..].iter().map(|m| m.tx.clone()).collect();
        assert_eq!(tail, vec![PGM_DIS.to_vec(), FLASH_MODE_DIS.to_vec()]);
    }
}
