//! Contracts of the collaborators around the panel core.
//!
//! The core never owns the display pipeline. It borrows a vblank reference
//! from the CRTC, waits on its events, listens to TE, and reports events
//! upward. These traits are the seams; [`crate::mock`] provides in-memory
//! implementations for tests.

use crate::error::PanelError;

use std::sync::Arc;

// =============================================================================
// Display Controller Trait
// =============================================================================

/// The display controller (CRTC/encoder) the panel is attached to.
pub trait DisplayController: Send + Sync {
    /// Take a vblank reference so the event source stays enabled.
    fn vblank_get(&self) -> Result<(), PanelError>;

    /// Drop a reference taken by [`DisplayController::vblank_get`].
    fn vblank_put(&self);

    /// Block until the next vblank/TE event.
    fn wait_for_vblank(&self) -> Result<(), PanelError>;

    /// Start delivering TE events to `listener`.
    fn add_te_listener(&self, listener: Arc<dyn TeListener>);

    /// Stop delivering TE events to `listener`.
    fn remove_te_listener(&self, listener: &Arc<dyn TeListener>);

    /// Report an event to user space.
    fn notify(&self, event: PanelEvent);
}

/// Receives TE interrupts.
pub trait TeListener: Send + Sync {
    /// Called from the TE interrupt path; must not block.
    fn handle_te(&self);
}

/// Events surfaced to user space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// The backlight changed to a non-zero user brightness.
    Brightness(u32),
    /// An observable attribute changed (sysfs-style poll wakeup).
    AttrChanged(&'static str),
}

// =============================================================================
// Power Collaborators
// =============================================================================

/// Operating mode of the panel supply regulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulatorMode {
    /// Full load.
    Normal,
    /// Light load (LP/AOD).
    Idle,
    /// Display blanked.
    Standby,
}

/// The optional LAB supply regulator.
pub trait Regulator: Send {
    /// Switch the regulator's operating mode.
    fn set_mode(&mut self, mode: RegulatorMode) -> Result<(), PanelError>;
}

/// A PWM output driving an external backlight.
pub trait PwmBackend: Send {
    /// Program duty cycle and period.
    fn config(&mut self, duty_ns: u64, period_ns: u64) -> Result<(), PanelError>;

    /// Enable the output.
    fn enable(&mut self) -> Result<(), PanelError>;

    /// Disable the output.
    fn disable(&mut self);
}
