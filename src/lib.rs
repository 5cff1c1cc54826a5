//! A USB device transfer engine for AT90USB processors
//!
//! `at90usb-usbd` runs the device side of USB transfers: control
//! transfers on endpoint 0, and resumable byte streams on bulk and
//! interrupt endpoints. It tracks the device's attach, reset and suspend
//! state from controller events. Each transfer stops early when the host
//! disconnects, suspends the bus, sends a new SETUP packet or stalls
//! the endpoint.
//!
//! The engine runs on any controller that implements the [`hal`] traits.
//! The [`at90usb`] module implements them for AT90USB processors. To
//! use it, you must define a safe implementation of [`Peripherals`].
//!
//! Everything happens in one place, the [`Device`]. It owns the
//! controller and your [`Callbacks`], and it shares its state through a
//! `static` [`DeviceStatus`]. Request handling, descriptors and classes
//! live outside of this crate. They use [`Device::read_setup`] and the
//! transfer methods to talk to the host.

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

pub mod at90usb;
mod control;
mod device;
mod endpoint;
mod error;
mod events;
pub mod hal;
mod setup;
mod state;
mod stream;

#[cfg(test)]
mod testing;

pub use device::{Config, Device, ZeroLengthPacket};
pub use endpoint::{configure, Banks, EndpointConfig, EndpointSize, Select, Selected};
pub use error::{Error, Result};
pub use events::Callbacks;
pub use hal::{Interrupts, Speed};
pub use setup::{Recipient, RequestKind, SetupPacket};
pub use state::{DeviceState, DeviceStatus};

/// Endpoints in the controller, including the control endpoint.
pub const MAX_ENDPOINTS: usize = 7;

/// A type that owns the USB register blocks
///
/// An implementation of `Peripherals` is expected to own
///
/// - the USB controller registers, UHWCON through UEINT
/// - the PLL control register, PLLCSR
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that
/// owns the register blocks required for all USB operation.
/// The pointers returned by the methods are assumed to be valid,
/// and will be cast to register definitions.
///
/// # Example
///
/// A safe implementation of `Peripherals` for the AT90USB1287. The
/// addresses are data-space addresses.
///
/// ```
/// use at90usb_usbd::Peripherals;
///
/// /// Only one of these may exist.
/// struct Usb(());
///
/// impl Usb {
///     /// # Safety
///     ///
///     /// Call this once.
///     unsafe fn steal() -> Self {
///         Usb(())
///     }
/// }
///
/// unsafe impl Peripherals for Usb {
///     fn usb(&self) -> *const () {
///         0xD7 as *const ()
///     }
///     fn pll(&self) -> *const () {
///         0x49 as *const ()
///     }
/// }
///
/// let usb = unsafe { Usb::steal() };
/// assert_eq!(usb.usb(), 0xD7 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the USB controller registers,
    /// starting at UHWCON
    fn usb(&self) -> *const ();
    /// Returns the address of the PLL control register
    fn pll(&self) -> *const ();
}
