//! Transfer and configuration outcomes

use usb_device::UsbError;

/// Why a transfer or configuration request did not finish
///
/// Every engine call returns `Ok(())` when it ran to completion. The
/// variants describe the first condition that ended it early. None of
/// them leave the driver in a bad state; the next transfer can start
/// after the caller selects its endpoint again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// VBUS dropped, or the device detached, while the transfer waited.
    Disconnected,
    /// The host suspended the bus while the transfer waited.
    Suspended,
    /// A new SETUP packet arrived on the control endpoint.
    ///
    /// The SETUP packet is left pending for the request dispatcher.
    AbortedByHost,
    /// The endpoint is stalled.
    Stalled,
    /// The endpoint didn't become ready within the frame budget.
    TimedOut,
    /// The bank filled or emptied, and the caller asked to resume later.
    ///
    /// The progress cursor records how many bytes were moved.
    Incomplete,
    /// The controller rejected an endpoint configuration.
    ConfigurationFailed,
}

/// Results for transfers and endpoint configuration
pub type Result<T> = core::result::Result<T, Error>;

impl From<Error> for UsbError {
    fn from(error: Error) -> Self {
        match error {
            Error::TimedOut | Error::Incomplete => UsbError::WouldBlock,
            Error::ConfigurationFailed => UsbError::InvalidEndpoint,
            Error::Disconnected | Error::Suspended | Error::AbortedByHost | Error::Stalled => {
                UsbError::InvalidState
            }
        }
    }
}
