//! MIPI DCS message framing and the host transport seam.
//!
//! Every byte that reaches the panel goes through [`DsiHost::transfer`].
//! The helpers here pick the packet type from the payload length and carry
//! the "last command in group" flag the host uses to commit bursts
//! atomically against a frame.

use crate::error::PanelError;

use log::{trace, warn};
use std::thread;
use std::time::Duration;

/// DCS command bytes used by the core.
pub mod dcs {
    /// Write display brightness value.
    pub const SET_DISPLAY_BRIGHTNESS: u8 = 0x51;
    /// Read display brightness value.
    pub const GET_DISPLAY_BRIGHTNESS: u8 = 0x52;
    /// Write control display (WRCTRLD).
    pub const WRITE_CONTROL_DISPLAY: u8 = 0x53;
}

/// DSI packet data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// DCS short write without parameter.
    DcsShortWrite,
    /// DCS short write with one parameter.
    DcsShortWriteParam,
    /// DCS long write.
    DcsLongWrite,
    /// DCS read request.
    DcsRead,
    /// Any other data type taken verbatim from a command set.
    Raw(u8),
}

impl MsgType {
    /// The on-wire data type identifier.
    pub fn code(self) -> u8 {
        match self {
            Self::DcsShortWrite => 0x05,
            Self::DcsShortWriteParam => 0x15,
            Self::DcsLongWrite => 0x39,
            Self::DcsRead => 0x06,
            Self::Raw(code) => code,
        }
    }

    /// Decode a data type identifier.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x05 => Self::DcsShortWrite,
            0x15 => Self::DcsShortWriteParam,
            0x39 => Self::DcsLongWrite,
            0x06 => Self::DcsRead,
            other => Self::Raw(other),
        }
    }

    /// Infer the DCS write type from a payload length (command byte included).
    pub fn for_write_len(len: usize) -> Result<Self, PanelError> {
        match len {
            0 => Err(PanelError::InvalidArgument("empty DCS write")),
            1 => Ok(Self::DcsShortWrite),
            2 => Ok(Self::DcsShortWriteParam),
            _ => Ok(Self::DcsLongWrite),
        }
    }

    /// Whether the packet is a short (4-byte) packet.
    pub fn is_short(self) -> bool {
        matches!(
            self,
            Self::DcsShortWrite | Self::DcsShortWriteParam | Self::DcsRead
        )
    }
}

/// One message handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsiMsg {
    /// Packet data type.
    pub msg_type: MsgType,
    /// Bytes sent to the panel; the first byte is the DCS command.
    pub tx: Vec<u8>,
    /// Bytes expected back (reads only).
    pub rx_len: usize,
    /// Last command of a group: the host may commit the burst.
    pub last_command: bool,
    /// Send in low-power (LP) instead of high-speed mode.
    pub low_power: bool,
}

impl DsiMsg {
    /// The DCS command byte, or 0 for an empty message.
    pub fn cmd(&self) -> u8 {
        self.tx.first().copied().unwrap_or(0)
    }

    /// Whether this message reads from the panel.
    pub fn is_read(&self) -> bool {
        self.msg_type == MsgType::DcsRead
    }
}

/// The DSI wire transport.
///
/// Implementations perform the transfer synchronously and return the bytes
/// read back (empty for writes). A read may return fewer bytes than asked
/// for; callers decide whether that is fatal.
pub trait DsiHost: Send {
    /// Transfer one message.
    fn transfer(&mut self, msg: &DsiMsg) -> Result<Vec<u8>, PanelError>;
}

/// Write a raw buffer whose first byte is the DCS command.
pub fn dcs_write_buffer(
    host: &mut dyn DsiHost,
    data: &[u8],
    send_last: bool,
) -> Result<(), PanelError> {
    let msg = DsiMsg {
        msg_type: MsgType::for_write_len(data.len())?,
        tx: data.to_vec(),
        rx_len: 0,
        last_command: send_last,
        low_power: false,
    };
    trace!("dcs write {:02X?} last={}", data, send_last);
    host.transfer(&msg).map(|_| ())
}

/// Write `cmd` followed by `params` as a single last-in-group command.
pub fn dcs_write(host: &mut dyn DsiHost, cmd: u8, params: &[u8]) -> Result<(), PanelError> {
    let mut data = Vec::with_capacity(params.len() + 1);
    data.push(cmd);
    data.extend_from_slice(params);
    dcs_write_buffer(host, &data, true)
}

/// Read `len` bytes from register `cmd`.
///
/// The returned buffer may be shorter than `len` on a short read.
pub fn dcs_read(host: &mut dyn DsiHost, cmd: u8, len: usize) -> Result<Vec<u8>, PanelError> {
    if len == 0 {
        return Err(PanelError::InvalidArgument("zero-length DCS read"));
    }

    let msg = DsiMsg {
        msg_type: MsgType::DcsRead,
        tx: vec![cmd],
        rx_len: len,
        last_command: true,
        low_power: false,
    };
    let mut rx = host.transfer(&msg)?;
    rx.truncate(len);
    trace!("dcs read 0x{:02X}: {:02X?}", cmd, rx);
    Ok(rx)
}

// =============================================================================
// Command Sets
// =============================================================================

/// Transmission mode of a command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CmdState {
    /// Low-power mode.
    Lp,
    /// High-speed mode.
    #[default]
    Hs,
}

impl CmdState {
    /// Parse the `*-state` device-tree string.
    pub fn from_dt(value: &str) -> Self {
        if value == "dsi_lp_mode" {
            Self::Lp
        } else {
            Self::Hs
        }
    }
}

/// One command of a command set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsiCmd {
    /// Packet data type.
    pub msg_type: MsgType,
    /// Last command of its group.
    pub last: bool,
    /// Delay after the command, in milliseconds.
    pub wait_ms: u32,
    /// Command byte followed by its parameters.
    pub payload: Vec<u8>,
}

/// An ordered list of commands sent as one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CmdSet {
    /// Commands in send order.
    pub cmds: Vec<DsiCmd>,
    /// LP or HS transmission.
    pub state: CmdState,
}

/// Header bytes preceding each payload in the packed layout.
const PACKED_HEADER_LEN: usize = 7;

impl CmdSet {
    /// Build a command set from plain DCS payloads, each last in its group.
    pub fn from_payloads<I, P>(payloads: I) -> Result<Self, PanelError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let cmds = payloads
            .into_iter()
            .map(|payload| {
                let payload = payload.as_ref().to_vec();
                Ok(DsiCmd {
                    msg_type: MsgType::for_write_len(payload.len())?,
                    last: true,
                    wait_ms: 0,
                    payload,
                })
            })
            .collect::<Result<Vec<_>, PanelError>>()?;

        Ok(Self {
            cmds,
            state: CmdState::Hs,
        })
    }

    /// Decode the packed layout
    /// `[dtype, last, vc, ack, wait_ms, len_hi, len_lo, payload...]*`.
    pub fn from_packed(bytes: &[u8], state: CmdState) -> Result<Self, PanelError> {
        let mut cmds = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let Some((header, tail)) = rest.split_at_checked(PACKED_HEADER_LEN) else {
                return Err(PanelError::ParseError(format!(
                    "truncated command header ({} bytes left)",
                    rest.len()
                )));
            };
            let len = usize::from(u16::from_be_bytes([header[5], header[6]]));
            let Some((payload, tail)) = tail.split_at_checked(len) else {
                return Err(PanelError::ParseError(format!(
                    "command payload needs {} bytes, {} left",
                    len,
                    tail.len()
                )));
            };
            if payload.is_empty() {
                return Err(PanelError::ParseError("empty command payload".into()));
            }

            cmds.push(DsiCmd {
                msg_type: MsgType::from_code(header[0]),
                last: header[1] != 0,
                wait_ms: u32::from(header[4]),
                payload: payload.to_vec(),
            });
            rest = tail;
        }

        Ok(Self { cmds, state })
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    /// Whether the set holds no commands.
    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Send every command in order, honouring post-command delays.
    ///
    /// An empty set is a successful no-op. The first failure aborts the
    /// remaining commands.
    pub fn transfer(&self, host: &mut dyn DsiHost) -> Result<(), PanelError> {
        for cmd in &self.cmds {
            let msg = DsiMsg {
                msg_type: cmd.msg_type,
                tx: cmd.payload.clone(),
                rx_len: 0,
                last_command: cmd.last,
                low_power: self.state == CmdState::Lp,
            };
            if let Err(e) = host.transfer(&msg) {
                warn!("cmd set transfer failed at 0x{:02X}: {}", msg.cmd(), e);
                return Err(e);
            }
            if cmd.wait_ms > 0 {
                thread::sleep(Duration::from_millis(u64::from(cmd.wait_ms)));
            }
        }
        Ok(())
    }
}
