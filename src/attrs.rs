//! The text attribute surface.
//!
//! Attributes are read and written as strings the way sysfs and debugfs
//! files are. Writes return the number of bytes consumed or a negative
//! errno.

use crate::backlight::BL_RANGE_MAX;
use crate::error::PanelError;
use crate::modes::ModeRequest;
use crate::panel::Panel;
use crate::state::HbmMode;

use log::{debug, warn};

/// Every attribute name [`Panel::attr_show`] understands.
pub const ATTRIBUTES: &[&str] = &[
    "brightness",
    "actual_brightness",
    "max_brightness",
    "state",
    "alpm_mode",
    "hbm_mode",
    "hbm_sv_enabled",
    "als_table",
    "lp_mode",
    "idle_mode",
    "switch/mode",
    "switch/te_listen_count",
    "switch/te_counter",
    "switch/gamma",
];

/// Parse an integer in `kstrtoint` style: decimal, `0x` hex or `0` octal.
fn parse_int(buf: &str) -> Result<i64, PanelError> {
    let s = buf.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<i64>()
    };

    let v = parsed.map_err(|_| PanelError::ParseError(format!("invalid integer '{s}'")))?;
    Ok(if neg { -v } else { v })
}

/// Parse a base-10 integer, as `kstrtoint(buf, 10, ..)` does.
fn parse_dec(buf: &str) -> Result<i32, PanelError> {
    let s = buf.trim();
    s.parse::<i32>()
        .map_err(|_| PanelError::ParseError(format!("invalid decimal '{s}'")))
}

fn parse_u32(buf: &str) -> Result<u32, PanelError> {
    let v = parse_int(buf)?;
    u32::try_from(v).map_err(|_| PanelError::ParseError(format!("{v} out of range")))
}

/// Parse a boolean in `kstrtobool` style.
fn parse_bool(buf: &str) -> Result<bool, PanelError> {
    let s = buf.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "y" | "yes" | "true" | "on" => Ok(true),
        "0" | "n" | "no" | "false" | "off" => Ok(false),
        _ => Err(PanelError::ParseError(format!("invalid bool '{s}'"))),
    }
}

/// Parse a space separated list of at most [`BL_RANGE_MAX`] values.
fn parse_u32_list(buf: &str) -> Result<Vec<u32>, PanelError> {
    let values = buf
        .split_whitespace()
        .map(parse_u32)
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() || values.len() > BL_RANGE_MAX {
        warn!("als: incorrect parameters from als table node");
        return Err(PanelError::InvalidArgument("bad als table length"));
    }
    Ok(values)
}

impl Panel {
    /// Read attribute `name`.
    pub fn attr_show(&self, name: &str) -> Result<String, PanelError> {
        let out = match name {
            "brightness" => format!("{}\n", self.brightness()),
            "actual_brightness" => format!("{}\n", self.actual_brightness()),
            "max_brightness" => format!("{}\n", self.snapshot().props.max_brightness),
            "state" => format!("{}\n", self.state_string()?),
            "alpm_mode" => format!("{}\n", self.alpm_mode()),
            "hbm_mode" => {
                if self.has_hbm() {
                    format!("{}\n", self.hbm_mode().as_i32())
                } else {
                    "unsupported\n".into()
                }
            }
            "hbm_sv_enabled" => match self.hbm_sv_enabled() {
                Ok(enabled) => format!("{enabled}\n"),
                Err(PanelError::NotSupported) => "unsupported\n".into(),
                Err(e) => return Err(e),
            },
            "als_table" => {
                let mut out: String = self.als_table()?.iter().map(|r| format!("{r} ")).collect();
                out.push('\n');
                out
            }
            "lp_mode" => format!("{}\n", self.snapshot().lp_mode.unwrap_or_default()),
            "idle_mode" => format!("{}\n", self.idle_mode().as_deref().unwrap_or("none")),
            "switch/mode" => format!("{}\n", self.refresh_rate()),
            "switch/te_listen_count" => format!("{}\n", self.te_listen_count()),
            "switch/te_counter" => format!("{}\n", self.te_counter()),
            "switch/gamma" => self.gamma_dump()?,
            _ => return Err(PanelError::NotSupported),
        };
        Ok(out)
    }

    /// Write `buf` to attribute `name`.
    ///
    /// Returns `buf.len()` on success and a negative errno on failure.
    pub fn attr_store(&self, name: &str, buf: &str) -> isize {
        match self.store(name, buf) {
            Ok(()) => buf.len() as isize,
            Err(e) => {
                debug!("{} store failed: {}", name, e);
                e.errno()
            }
        }
    }

    fn store(&self, name: &str, buf: &str) -> Result<(), PanelError> {
        match name {
            "brightness" => self.set_brightness(parse_u32(buf)?),
            "alpm_mode" => {
                let mode = parse_int(buf)?;
                self.set_alpm_mode(u32::try_from(mode.max(0)).unwrap_or(u32::MAX))
            }
            "hbm_mode" => {
                if !self.has_hbm() {
                    return Err(PanelError::NotSupported);
                }
                let mode = HbmMode::from_i32(parse_dec(buf)?)
                    .ok_or(PanelError::InvalidArgument("unknown hbm mode"))?;
                self.set_hbm_mode(mode)
            }
            "hbm_sv_enabled" => {
                if !self.has_hbm() {
                    return Err(PanelError::NotSupported);
                }
                self.set_hbm_sv_enabled(parse_bool(buf)?)
            }
            "als_table" => {
                // validated against the notifier before parsing
                self.als_table()?;
                self.set_als_table(parse_u32_list(buf)?)
            }
            "idle_mode" => {
                let s = buf.trim();
                if s == "none" {
                    self.set_idle_mode(None)
                } else {
                    self.set_idle_mode(Some(&s.parse::<ModeRequest>()?))
                }
            }
            "switch/mode" => self.switch_to(&buf.parse::<ModeRequest>()?),
            "switch/te_listen_count" => {
                self.set_te_listen_count(parse_u32(buf)?);
                Ok(())
            }
            "switch/te_counter" => {
                self.set_te_counter(parse_u32(buf)?);
                Ok(())
            }
            "switch/gamma" => self.invalidate_gamma(),
            "actual_brightness" | "max_brightness" | "state" | "lp_mode" => {
                Err(PanelError::InvalidArgument("read-only attribute"))
            }
            _ => Err(PanelError::NotSupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_parsing_follows_kstrtoint() {
        assert_eq!(parse_int("42\n").unwrap(), 42);
        assert_eq!(parse_int("0x1F").unwrap(), 31);
        assert_eq!(parse_int("010").unwrap(), 8);
        assert_eq!(parse_int("-1").unwrap(), -1);
        assert_eq!(parse_int("0").unwrap(), 0);
        assert!(parse_int("ten").is_err());
        assert!(parse_u32("-1").is_err());
    }

    #[test]
    fn test_decimal_parsing_rejects_prefixes() {
        assert_eq!(parse_dec("2\n").unwrap(), 2);
        assert_eq!(parse_dec("-1").unwrap(), -1);
        assert!(parse_dec("0x1").is_err());
        assert!(parse_dec("").is_err());
    }

    #[test]
    fn test_bool_parsing() {
        assert!(parse_bool("Y\n").unwrap());
        assert!(parse_bool("on").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_als_list_length_bounds() {
        assert_eq!(parse_u32_list("10 100 0x100\n").unwrap(), vec![10, 100, 256]);
        assert!(parse_u32_list("").is_err());
        assert!(parse_u32_list("1 2 3 4 5 6 7 8 9 10 11").is_err());
        assert!(parse_u32_list("1 x").is_err());
    }
}
