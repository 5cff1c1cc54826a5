//! Controller events and device state transitions

use crate::{
    device::Device,
    endpoint::{self, EndpointConfig},
    error::{Error, Result},
    hal::{Bus, Interrupts},
    state::{DeviceState, Event},
};
use usb_device::UsbDirection;

/// Application hooks for device events
///
/// Every method has an empty default. The driver calls these from
/// [`Device::poll()`], which also runs inside transfers, so keep them
/// short and don't start transfers from them.
pub trait Callbacks {
    /// VBUS appeared. The host will reset the bus next.
    fn on_connect(&mut self) {}
    /// VBUS disappeared.
    fn on_disconnect(&mut self) {}
    /// The host reset the bus, and endpoint 0 is ready.
    fn on_end_of_reset(&mut self) {}
    /// The host reset the bus, but endpoint 0 didn't configure.
    ///
    /// The device won't accept an address until the next bus reset
    /// configures endpoint 0.
    fn on_configure_error(&mut self) {}
    fn on_suspend(&mut self) {}
    fn on_wake(&mut self) {}
    /// Only called when [`Config::start_of_frame`](crate::Config::start_of_frame)
    /// is set.
    fn on_start_of_frame(&mut self) {}
}

impl Callbacks for () {}

impl<B: Bus, C: Callbacks> Device<B, C> {
    /// Interrupt sources that are enabled while the bus is active.
    fn active_interrupts(&self) -> Interrupts {
        let mut interrupts = Interrupts::VBUS | Interrupts::SUSPEND | Interrupts::END_OF_RESET;
        if self.config.start_of_frame {
            interrupts |= Interrupts::START_OF_FRAME;
        }
        interrupts
    }

    /// Power the controller, and attach to the bus.
    ///
    /// Call this once. If VBUS is already present, the device becomes
    /// powered right away.
    pub fn init(&mut self) {
        self.bus.disable_interrupts(Interrupts::all());
        self.bus.clear_interrupts(Interrupts::all());
        self.bus.power_up(self.config.speed);
        self.status.apply(Event::Detach);
        self.control_fault = false;

        let interrupts = self.active_interrupts();
        self.bus.enable_interrupts(interrupts);
        if self.bus.vbus_present() {
            self.connect();
        }
        self.bus.attach();
        debug!("INITIALIZED");
    }

    /// Detach from the bus, and power down the controller.
    pub fn detach(&mut self) {
        self.bus.disable_interrupts(Interrupts::all());
        self.bus.clear_interrupts(Interrupts::all());
        self.bus.detach();
        self.bus.set_pll(false);
        self.bus.power_down();
        self.status.apply(Event::Detach);
        debug!("DETACHED");
    }

    /// Handle pending controller events.
    ///
    /// Updates the device state, and calls the callbacks that match
    /// each event.
    pub fn poll(&mut self) {
        let pending = self.bus.pending_interrupts() & self.bus.enabled_interrupts();
        if pending.is_empty() {
            return;
        }

        if pending.contains(Interrupts::START_OF_FRAME) {
            self.bus.clear_interrupts(Interrupts::START_OF_FRAME);
            self.callbacks.on_start_of_frame();
        }

        if pending.contains(Interrupts::VBUS) {
            self.bus.clear_interrupts(Interrupts::VBUS);
            if self.bus.vbus_present() {
                self.connect();
            } else {
                self.bus.set_pll(false);
                self.status.apply(Event::Disconnect);
                debug!("VBUS OFF");
                self.callbacks.on_disconnect();
            }
        }

        if pending.contains(Interrupts::SUSPEND) {
            self.bus.clear_interrupts(Interrupts::SUSPEND);
            self.bus.disable_interrupts(Interrupts::SUSPEND);
            self.bus.enable_interrupts(Interrupts::WAKE);
            self.bus.set_clock_frozen(true);
            self.status.apply(Event::Suspend);
            debug!("SUSPEND");
            self.callbacks.on_suspend();
        }

        if pending.contains(Interrupts::WAKE) {
            self.bus.set_clock_frozen(false);
            self.bus.clear_interrupts(Interrupts::WAKE);
            self.bus.disable_interrupts(Interrupts::WAKE);
            self.bus.enable_interrupts(Interrupts::SUSPEND);
            let suspended = self.status.get() == DeviceState::Suspended;
            self.status.apply(Event::Wake);
            if suspended {
                debug!("WAKE");
                self.callbacks.on_wake();
            }
        }

        if pending.contains(Interrupts::END_OF_RESET) {
            self.bus
                .clear_interrupts(Interrupts::END_OF_RESET | Interrupts::SUSPEND);
            self.bus.disable_interrupts(Interrupts::SUSPEND);
            self.bus.enable_interrupts(Interrupts::WAKE);
            if self.status.apply(Event::EndOfReset) == DeviceState::Unattached {
                debug!("RESET IGNORED");
                return;
            }
            debug!("RESET");

            let control = EndpointConfig::control(self.config.control_size);
            match endpoint::configure(&mut self.bus, &control) {
                Ok(()) => {
                    self.control_fault = false;
                    self.callbacks.on_end_of_reset();
                }
                Err(_) => {
                    self.control_fault = true;
                    warn!("EP0 UNAVAILABLE");
                    self.callbacks.on_configure_error();
                }
            }
        }
    }

    fn connect(&mut self) {
        self.bus.set_pll(true);
        self.status.apply(Event::Connect);
        debug!("VBUS ON");
        self.callbacks.on_connect();
    }

    /// Finish a SET_ADDRESS request.
    ///
    /// Call this after [`read_setup()`](Device::read_setup) returns the
    /// request. The new address takes effect once the status stage
    /// completes, and the device becomes addressed. Address 0 leaves the
    /// device in the default state.
    pub fn set_address(&mut self, address: u8) -> Result<()> {
        if self.control_fault {
            return Err(Error::ConfigurationFailed);
        }
        let address = address & 0x7F;
        self.bus.set_address(address);
        self.status_stage(UsbDirection::Out)?;
        self.bus.enable_address();
        if address != 0 {
            self.status.apply(Event::Addressed);
        }
        debug!("ADDRESS {}", address);
        Ok(())
    }

    /// Apply a SET_CONFIGURATION request.
    ///
    /// Configures every endpoint in `endpoints`, then moves to the
    /// configured state. A `value` of 0 returns to the addressed state.
    /// If any endpoint fails to configure, the state doesn't change.
    /// You're responsible for the status stage.
    pub fn set_configuration(&mut self, value: u8, endpoints: &[EndpointConfig]) -> Result<()> {
        let addressed = matches!(
            self.status.active(),
            DeviceState::Addressed | DeviceState::Configured
        );
        if self.control_fault || !addressed {
            return Err(Error::ConfigurationFailed);
        }
        for endpoint in endpoints {
            self.configure_endpoint(endpoint)?;
        }
        self.status.apply(Event::Configured(value));
        debug!("CONFIGURED {}", value);
        Ok(())
    }
}
