//! Device connection state that's shared with the rest of the program

use core::sync::atomic::{AtomicU8, Ordering};

/// The device's attach / power / enumeration state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceState {
    /// No VBUS, or the device detached itself.
    #[default]
    Unattached,
    /// VBUS is present, but the host hasn't reset the bus.
    Powered,
    /// The host reset the bus; the device answers on address 0.
    Default,
    /// The host assigned an address.
    Addressed,
    /// The host selected a configuration.
    Configured,
    /// The host suspended the bus.
    Suspended,
}

impl DeviceState {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => DeviceState::Powered,
            2 => DeviceState::Default,
            3 => DeviceState::Addressed,
            4 => DeviceState::Configured,
            5 => DeviceState::Suspended,
            _ => DeviceState::Unattached,
        }
    }

    /// Returns `true` if VBUS is present, or was present when the
    /// device suspended.
    pub fn is_attached(self) -> bool {
        self != DeviceState::Unattached
    }
}

/// Something that moves the device between states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    /// VBUS appeared.
    Connect,
    /// VBUS disappeared.
    Disconnect,
    /// The host finished a bus reset.
    EndOfReset,
    Suspend,
    Wake,
    /// The address from SET_ADDRESS is now active.
    Addressed,
    /// SET_CONFIGURATION selected this configuration value.
    Configured(u8),
    /// The program detached the device from the bus.
    Detach,
}

/// Device state that any context can observe
///
/// Allocate a `static` object and supply it to your [`Device`](crate::Device)
/// constructor. Only the driver's event handling writes the state; the rest
/// of your program can read it at any time, knowing that it may be
/// stale by the time it acts on it.
///
/// ```
/// use at90usb_usbd::{DeviceState, DeviceStatus};
///
/// static STATUS: DeviceStatus = DeviceStatus::new();
/// assert_eq!(STATUS.get(), DeviceState::Unattached);
/// ```
pub struct DeviceStatus {
    state: AtomicU8,
    /// Where to go when the host resumes a suspended bus.
    resume: AtomicU8,
}

impl DeviceStatus {
    /// Create a status that starts out unattached.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(DeviceState::Unattached as u8),
            resume: AtomicU8::new(DeviceState::Unattached as u8),
        }
    }

    /// Returns the most recent device state.
    pub fn get(&self) -> DeviceState {
        DeviceState::from_bits(self.state.load(Ordering::Acquire))
    }

    /// Returns the state the device held before it suspended.
    ///
    /// When the device isn't suspended, this is the current state.
    pub fn active(&self) -> DeviceState {
        match self.get() {
            DeviceState::Suspended => DeviceState::from_bits(self.resume.load(Ordering::Acquire)),
            state => state,
        }
    }

    fn set(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Apply the event, and return the new state.
    ///
    /// Events that don't make sense in the current state leave it
    /// unchanged.
    pub(crate) fn apply(&self, event: Event) -> DeviceState {
        use DeviceState::*;
        let current = self.get();
        let next = match (event, current) {
            (Event::Connect, _) => Powered,
            (Event::Disconnect | Event::Detach, _) => Unattached,
            (Event::EndOfReset, Unattached) => Unattached,
            (Event::EndOfReset, _) => Default,
            (Event::Suspend, Unattached | Suspended) => current,
            (Event::Suspend, _) => {
                self.resume.store(current as u8, Ordering::Release);
                Suspended
            }
            (Event::Wake, Suspended) => DeviceState::from_bits(self.resume.load(Ordering::Acquire)),
            (Event::Addressed, Default | Addressed) => Addressed,
            (Event::Configured(0), Addressed | Configured) => Addressed,
            (Event::Configured(_), Addressed | Configured) => Configured,
            (Event::Wake | Event::Addressed | Event::Configured(_), _) => current,
        };
        self.set(next);
        next
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::new()
    }
}
