//! Hardware primitives consumed by the transfer engine
//!
//! The engine never touches registers. It drives the controller through
//! [`EndpointBank`], which covers one endpoint bank at a time, and
//! [`Bus`], which covers the controller-wide interrupts, clocks and
//! addressing. See the [`at90usb`](crate::at90usb) module for an
//! implementation.

use crate::endpoint::EndpointConfig;
use usb_device::UsbDirection;

/// USB low / full speed setting.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Speed {
    /// 1.5 Mbit/s.
    Low,
    /// 12 Mbit/s.
    #[default]
    Full,
}

bitflags::bitflags! {
    /// Controller-wide interrupt sources
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Interrupts : u8 {
        /// VBUS appeared or disappeared.
        const VBUS = 1 << 0;
        /// The host suspended the bus.
        const SUSPEND = 1 << 1;
        /// Bus activity resumed after a suspend.
        const WAKE = 1 << 2;
        /// The host finished a bus reset.
        const END_OF_RESET = 1 << 3;
        /// A start-of-frame token arrived.
        const START_OF_FRAME = 1 << 4;
    }
}

/// Operations on the currently selected endpoint bank
///
/// The controller exposes one set of endpoint registers, multiplexed
/// by a selection register. Every method except [`select`](Self::select)
/// and [`current`](Self::current) acts on the selected endpoint.
pub trait EndpointBank {
    /// Select the endpoint with this index.
    fn select(&mut self, index: u8);
    /// Returns the selected endpoint index.
    fn current(&self) -> u8;

    /// Returns the configured direction of the selected endpoint.
    fn direction(&self) -> UsbDirection;
    /// The IN bank is free to accept data.
    fn in_ready(&self) -> bool;
    /// An OUT packet sits in the bank.
    fn out_received(&self) -> bool;
    /// A SETUP packet sits in the bank.
    fn setup_received(&self) -> bool;
    fn is_stalled(&self) -> bool;
    fn set_stalled(&mut self, stalled: bool);
    /// The bank can take another byte (IN) or has another byte (OUT).
    fn read_write_allowed(&self) -> bool;
    /// Number of bytes in the bank.
    fn byte_count(&self) -> u16;
    fn read_byte(&mut self) -> u8;
    fn write_byte(&mut self, byte: u8);
    /// Hand the IN bank to the host, even if it's empty.
    fn flush_in(&mut self);
    /// Release the OUT bank back to the controller.
    fn ack_out(&mut self);
    /// Release the SETUP packet.
    fn ack_setup(&mut self);
    /// Maximum packet size of the selected endpoint, in bytes.
    fn max_packet_size(&self) -> u16;

    /// Read back the configuration, if the endpoint holds endpoint memory.
    fn allocation(&self) -> Option<EndpointConfig>;
    fn enable(&mut self);
    fn disable(&mut self);
    /// Release the endpoint memory.
    fn deallocate(&mut self);
    /// Write the configuration, and request endpoint memory.
    fn allocate(&mut self, config: &EndpointConfig);
    /// The controller accepted the last configuration.
    fn configuration_accepted(&self) -> bool;
}

/// Controller-wide operations
pub trait Bus: EndpointBank {
    /// The 11-bit frame number of the last start-of-frame.
    fn frame_number(&self) -> u16;

    /// Interrupt sources that are signaled, whether or not they're enabled.
    fn pending_interrupts(&self) -> Interrupts;
    fn enabled_interrupts(&self) -> Interrupts;
    fn clear_interrupts(&mut self, interrupts: Interrupts);
    fn enable_interrupts(&mut self, interrupts: Interrupts);
    fn disable_interrupts(&mut self, interrupts: Interrupts);

    fn vbus_present(&self) -> bool;
    /// Start the USB clock, or stop it to save power.
    fn set_pll(&mut self, enable: bool);
    /// Freeze the controller clock while the bus is suspended.
    fn set_clock_frozen(&mut self, frozen: bool);

    /// Reset and enable the controller in device mode.
    fn power_up(&mut self, speed: Speed);
    fn power_down(&mut self);
    /// Connect the pull-up, making the device visible to the host.
    fn attach(&mut self);
    fn detach(&mut self);

    /// Store the device address, without enabling it.
    fn set_address(&mut self, address: u8);
    /// Answer on the address stored by [`set_address`](Self::set_address).
    fn enable_address(&mut self);
}
