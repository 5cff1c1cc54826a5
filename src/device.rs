//! The USB device driver context

use crate::{
    endpoint::{self, EndpointConfig, EndpointSize, Select, Selected},
    error::{Error, Result},
    events::Callbacks,
    hal::{Bus, Speed},
    state::{DeviceState, DeviceStatus},
};

/// When to end a transfer with a zero-length packet
///
/// The host only knows that an IN transfer ended when it receives a
/// packet shorter than the endpoint's maximum packet size, or when it
/// receives all the bytes it asked for. A transfer that ends on a full
/// packet may need an empty packet to terminate it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ZeroLengthPacket {
    /// Never send a trailing empty packet.
    Never,
    /// Send one when the last packet was full, and the host expects
    /// more bytes than were sent.
    IfRequired,
    /// Always follow the data with an empty packet.
    Always,
}

impl ZeroLengthPacket {
    /// Should a transfer of `sent` bytes end with an empty packet?
    ///
    /// `requested` is the host's expected length, if the host shared it.
    pub(crate) fn trailing_packet(self, sent: usize, max_packet: usize, requested: Option<usize>) -> bool {
        match self {
            ZeroLengthPacket::Never => false,
            ZeroLengthPacket::Always => true,
            ZeroLengthPacket::IfRequired => {
                let full = sent % max_packet.max(1) == 0;
                match requested {
                    Some(requested) => full && sent < requested,
                    None => full && sent > 0,
                }
            }
        }
    }
}

/// Driver configuration
///
/// Chosen once, when you create the [`Device`].
///
/// ```
/// use at90usb_usbd::{Config, EndpointSize, ZeroLengthPacket};
///
/// let config = Config {
///     control_size: EndpointSize::Bytes64,
///     stream_zlp: ZeroLengthPacket::IfRequired,
///     ..Config::default()
/// };
/// assert_eq!(config.timeout_frames, 100);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub speed: Speed,
    /// Size of the control endpoint, endpoint 0.
    pub control_size: EndpointSize,
    /// Call [`Callbacks::on_start_of_frame`] every frame.
    pub start_of_frame: bool,
    /// Frames that a stream transfer may wait for its endpoint.
    pub timeout_frames: u16,
    /// Trailing packet policy for control IN transfers.
    pub control_zlp: ZeroLengthPacket,
    /// Trailing packet policy for stream IN transfers.
    pub stream_zlp: ZeroLengthPacket,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            speed: Speed::Full,
            control_size: EndpointSize::Bytes8,
            start_of_frame: false,
            timeout_frames: 100,
            control_zlp: ZeroLengthPacket::IfRequired,
            stream_zlp: ZeroLengthPacket::Never,
        }
    }
}

/// Which endpoint condition ends a wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pipe {
    /// A new SETUP packet aborts the transfer.
    Control,
    /// A stall aborts the transfer.
    Stream,
}

/// A USB device
///
/// `Device` owns the controller, your callbacks, and a reference to the
/// [`DeviceStatus`] that the rest of your program observes. Every
/// transfer runs on the controller that this object owns.
///
/// After you create a `Device` with [`new()`](Device::new), you must
///
/// - call [`init()`](Device::init) once
/// - call [`poll()`](Device::poll) regularly, at least whenever you're not
///   inside a transfer
///
/// Transfers poll the controller's events on their own while they wait.
pub struct Device<B, C = ()> {
    pub(crate) bus: B,
    pub(crate) status: &'static DeviceStatus,
    pub(crate) callbacks: C,
    pub(crate) config: Config,
    /// Endpoint 0 didn't configure after the last bus reset.
    pub(crate) control_fault: bool,
}

impl<B: Bus, C: Callbacks> Device<B, C> {
    /// Create a new `Device`
    ///
    /// Creation doesn't touch the controller. Call [`init()`](Device::init)
    /// when you're ready to appear on the bus.
    pub fn new(bus: B, status: &'static DeviceStatus, callbacks: C, config: Config) -> Self {
        Device {
            bus,
            status,
            callbacks,
            config,
            control_fault: false,
        }
    }

    /// Returns the most recent device state.
    pub fn state(&self) -> DeviceState {
        self.status.get()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the controller.
    ///
    /// Changing the endpoint selection here affects the next stream transfer.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Select the endpoint for the next stream transfers.
    pub fn select(&mut self, index: u8) {
        self.bus.select(index);
    }

    /// Select an endpoint until the returned guard drops.
    pub fn selected(&mut self, index: u8) -> Selected<'_, Self> {
        Selected::new(self, index)
    }

    /// Configure an endpoint.
    ///
    /// Endpoints other than endpoint 0 can only be configured once the host
    /// has reset the bus. The currently selected endpoint stays selected.
    pub fn configure_endpoint(&mut self, config: &EndpointConfig) -> Result<()> {
        let reset = matches!(
            self.status.active(),
            DeviceState::Default | DeviceState::Addressed | DeviceState::Configured
        );
        if config.address.index() != 0 && !reset {
            warn!("EP{} CONFIGURED BEFORE RESET", config.address.index());
            return Err(Error::ConfigurationFailed);
        }
        endpoint::configure(&mut self.bus, config)
    }

    /// Stall, or clear the stall on, an endpoint.
    pub fn set_stalled(&mut self, index: u8, stalled: bool) {
        let mut ep = self.selected(index);
        ep.bus.set_stalled(stalled);
    }

    pub fn is_stalled(&mut self, index: u8) -> bool {
        let ep = self.selected(index);
        ep.bus.is_stalled()
    }

    /// Service events, then fail if the device can't move data.
    pub(crate) fn attached(&mut self) -> Result<()> {
        self.poll();
        match self.status.get() {
            DeviceState::Unattached => Err(Error::Disconnected),
            DeviceState::Suspended => Err(Error::Suspended),
            _ => Ok(()),
        }
    }

    /// Checked at the top of every wait iteration.
    pub(crate) fn check(&mut self, pipe: Pipe) -> Result<()> {
        self.attached()?;
        match pipe {
            Pipe::Control if self.bus.setup_received() => Err(Error::AbortedByHost),
            Pipe::Stream if self.bus.is_stalled() => Err(Error::Stalled),
            _ => Ok(()),
        }
    }
}

impl<B: Bus, C> Select for Device<B, C> {
    fn current_endpoint(&self) -> u8 {
        self.bus.current()
    }
    fn select_endpoint(&mut self, index: u8) {
        self.bus.select(index)
    }
}

#[cfg(test)]
mod tests {
    use super::{Pipe, ZeroLengthPacket};
    use crate::{
        endpoint::{Banks, EndpointConfig, EndpointSize},
        error::Error,
        hal::EndpointBank,
        testing::{self, MockBus, Scripted},
        Config, DeviceState,
    };
    use usb_device::{
        endpoint::{EndpointAddress, EndpointType},
        UsbDirection,
    };

    fn interrupt_in(index: usize) -> EndpointConfig {
        EndpointConfig::new(
            EndpointAddress::from_parts(index, UsbDirection::In),
            EndpointType::Interrupt,
            EndpointSize::Bytes16,
            Banks::Single,
        )
    }

    #[test]
    fn zlp_policies() {
        use ZeroLengthPacket::*;
        assert!(!Never.trailing_packet(16, 8, Some(64)));
        assert!(Always.trailing_packet(5, 8, Some(64)));

        assert!(IfRequired.trailing_packet(16, 8, Some(64)));
        assert!(!IfRequired.trailing_packet(16, 8, Some(16)));
        assert!(!IfRequired.trailing_packet(12, 8, Some(64)));
        assert!(IfRequired.trailing_packet(0, 8, Some(64)));
        assert!(!IfRequired.trailing_packet(0, 8, Some(0)));

        assert!(IfRequired.trailing_packet(64, 64, None));
        assert!(!IfRequired.trailing_packet(0, 64, None));
        assert!(!IfRequired.trailing_packet(63, 64, None));
    }

    #[test]
    fn endpoints_wait_for_reset() {
        let mut device = testing::device(MockBus::new(), Config::default());
        device.init();
        assert_eq!(
            device.configure_endpoint(&interrupt_in(1)),
            Err(Error::ConfigurationFailed)
        );

        let mut device = testing::reset(Config::default());
        device.configure_endpoint(&interrupt_in(1)).unwrap();
        assert_eq!(device.bus().config(1), Some(interrupt_in(1)));
    }

    #[test]
    fn state_checks() {
        let mut device = testing::configured(Config::default());
        device.configure_endpoint(&interrupt_in(1)).unwrap();
        device.select(1);
        assert_eq!(device.check(Pipe::Stream), Ok(()));

        device.set_stalled(1, true);
        assert_eq!(device.bus().current(), 1);
        assert!(device.is_stalled(1));
        assert_eq!(device.check(Pipe::Stream), Err(Error::Stalled));
        // Stalls don't concern control transfers.
        assert_eq!(device.check(Pipe::Control), Ok(()));
        device.set_stalled(1, false);

        device.bus_mut().fire(Scripted::Interrupt(crate::Interrupts::SUSPEND));
        assert_eq!(device.check(Pipe::Stream), Err(Error::Suspended));
        assert_eq!(device.state(), DeviceState::Suspended);

        device.bus_mut().fire(Scripted::Disconnect);
        assert_eq!(device.check(Pipe::Stream), Err(Error::Disconnected));
    }

    #[test]
    fn setup_aborts_control_only() {
        let mut device = testing::configured(Config::default());
        device.bus_mut().fire(Scripted::Setup([0; 8]));
        device.select(0);
        assert_eq!(device.check(Pipe::Control), Err(Error::AbortedByHost));
        assert_eq!(device.check(Pipe::Stream), Ok(()));
    }
}
