//! Composite backlight state and snapshots.

bitflags::bitflags! {
    /// Backlight state bits: `FBBLANK | SUSPENDED | LP | LP2`.
    #[derive(Debug)]
    #[derive(Clone, Copy)]
    #[derive(PartialEq, Eq)]
    #[derive(Default)]
    #[derive(Hash)]
    pub struct BlState: u32 {
        /// Backlight core suspended.
        const SUSPENDED = 1 << 0;
        /// Framebuffer blanked.
        const FBBLANK = 1 << 1;
        /// Low-power (AOD) mode.
        const LP = 1 << 29;
        /// Second low-power level.
        const LP2 = 1 << 30;
    }
}

impl BlState {
    /// LP or LP2 is active.
    pub const fn is_lp(self) -> bool {
        self.intersects(Self::LP.union(Self::LP2))
    }

    /// The panel is blanked or suspended.
    pub const fn is_standby(self) -> bool {
        self.intersects(Self::FBBLANK.union(Self::SUSPENDED))
    }

    /// Fully on: neither LP nor standby.
    pub const fn is_on(self) -> bool {
        !self.is_lp() && !self.is_standby()
    }
}

/// Framebuffer power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Power {
    /// Unblanked.
    #[default]
    Unblank,
    /// Powered down.
    Powerdown,
}

/// Display power management state requested from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpms {
    /// Fully on.
    On,
    /// Off.
    Off,
    /// Low power (AOD).
    Lp1,
    /// Deeper low power.
    Lp2,
}

impl Dpms {
    /// The state bits after this transition, starting from `state`.
    pub fn apply(self, mut state: BlState) -> BlState {
        match self {
            Self::On => state.remove(BlState::FBBLANK | BlState::LP | BlState::LP2),
            Self::Off => {
                state.remove(BlState::LP | BlState::LP2);
                state.insert(BlState::FBBLANK);
            }
            Self::Lp1 => {
                state.insert(BlState::LP);
                state.remove(BlState::LP2);
            }
            Self::Lp2 => state.insert(BlState::LP | BlState::LP2),
        }
        state
    }
}

/// High-brightness mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HbmMode {
    /// Normal brightness mapping.
    #[default]
    Off,
    /// HBM ranges in effect.
    On,
    /// Sunlight-visibility HBM.
    Sv,
}

impl HbmMode {
    /// Decode the integer written to `hbm_mode`.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            2 => Some(Self::Sv),
            _ => None,
        }
    }

    /// The integer shown by `hbm_mode`.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Sv => 2,
        }
    }

    /// Any HBM variant is active.
    pub fn is_on(self) -> bool {
        self != Self::Off
    }
}

/// Backlight device properties as seen by user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklightProps {
    /// Requested user brightness.
    pub brightness: u32,
    /// Upper bound of `brightness`.
    pub max_brightness: u32,
    /// Framebuffer power.
    pub power: Power,
    /// State bits.
    pub state: BlState,
}

/// A snapshot of the backlight's current state.
///
/// Use [`Panel::snapshot`](crate::Panel::snapshot) to obtain one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklightSnapshot {
    /// User-visible properties.
    pub props: BacklightProps,
    /// Last value written to the panel; `None` after invalidation.
    pub bl_actual: Option<u32>,
    /// State bits at the last write.
    pub last_state: BlState,
    /// Current HBM mode.
    pub hbm_mode: HbmMode,
    /// Current HBM range index.
    pub hbm_range: Option<usize>,
    /// Whether HBM dimming is counting frames.
    pub dimming_active: bool,
    /// Name of the active LP bin.
    pub lp_mode: Option<String>,
    /// A write was gated and is waiting.
    pub bl_update_pending: bool,
}
