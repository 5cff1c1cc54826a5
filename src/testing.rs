//! A simulated controller and host for unit tests

use core::cell::{Cell, RefCell};
use std::{boxed::Box, collections::VecDeque, vec::Vec};

use crate::{
    endpoint::EndpointConfig,
    events::Callbacks,
    hal::{Bus, EndpointBank, Interrupts, Speed},
    state::{DeviceStatus, Event},
    Config, Device, MAX_ENDPOINTS,
};
use usb_device::UsbDirection;

/// Endpoint memory operations, in the order they happened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Allocate(u8),
    Deallocate(u8),
}

/// Something that happens on the bus while the driver polls
#[derive(Clone, Copy, Debug)]
pub enum Scripted {
    Connect,
    Disconnect,
    Interrupt(Interrupts),
    Setup([u8; 8]),
    Stall(u8),
}

/// A host reading the data stage of a control IN transfer
#[derive(Debug)]
pub struct ControlHost {
    requested: usize,
    received: usize,
    packets: usize,
    done: bool,
    /// Move to the status stage after this many packets.
    pub give_up_after: Option<usize>,
}

impl ControlHost {
    pub fn new(requested: usize) -> Self {
        ControlHost {
            requested,
            received: 0,
            packets: 0,
            done: false,
            give_up_after: None,
        }
    }

    /// Returns `true` if this packet finishes the data stage.
    fn take(&mut self, packet: usize, max_packet: usize) -> bool {
        if self.done {
            return false;
        }
        self.received += packet;
        self.packets += 1;
        self.done = packet < max_packet
            || self.received >= self.requested
            || self.give_up_after == Some(self.packets);
        self.done
    }
}

#[derive(Default)]
pub struct Endpoint {
    pub config: Option<EndpointConfig>,
    pub enabled: bool,
    accepted: bool,
    pub stalled: Cell<bool>,
    /// The IN bank, while software fills it.
    pub bank: Vec<u8>,
    /// Every IN packet the host took.
    pub sent: Vec<Vec<u8>>,
    /// The host takes a flushed packet after this many readiness polls.
    pub in_delay: usize,
    busy: Cell<usize>,
    /// The host never takes IN packets.
    pub stuck: bool,
    /// OUT packets from the host. The front packet is in the bank.
    pub out: VecDeque<Vec<u8>>,
    position: usize,
    /// OUT banks released by software.
    pub acks: usize,
    setup: Cell<Option<[u8; 8]>>,
    setup_position: usize,
}

pub struct MockBus {
    pub endpoints: [Endpoint; MAX_ENDPOINTS],
    selected: u8,
    /// Reject configurations for this endpoint.
    pub reject: Option<u8>,
    pub ops: Vec<Op>,
    /// Drives the status stage of control IN transfers.
    pub host: Option<ControlHost>,
    pub setup_acks: usize,

    frame: Cell<u16>,
    pub frame_reads: Cell<usize>,
    /// Frame number reads per frame.
    pub frame_period: usize,

    ticks: Cell<usize>,
    script: RefCell<VecDeque<(usize, Scripted)>>,
    pending: Cell<Interrupts>,
    pub enabled: Interrupts,

    pub vbus: Cell<bool>,
    pub pll: bool,
    pub frozen: bool,
    pub speed: Option<Speed>,
    pub attached: bool,
    pub address: u8,
    pub address_enabled: bool,
}

impl MockBus {
    pub fn new() -> Self {
        MockBus {
            endpoints: core::array::from_fn(|_| Endpoint::default()),
            selected: 0,
            reject: None,
            ops: Vec::new(),
            host: None,
            setup_acks: 0,
            frame: Cell::new(0),
            frame_reads: Cell::new(0),
            frame_period: 1,
            ticks: Cell::new(0),
            script: RefCell::new(VecDeque::new()),
            pending: Cell::new(Interrupts::empty()),
            enabled: Interrupts::empty(),
            vbus: Cell::new(false),
            pll: false,
            frozen: false,
            speed: None,
            attached: false,
            address: 0,
            address_enabled: false,
        }
    }

    pub fn config(&self, index: usize) -> Option<EndpointConfig> {
        self.endpoints[index].config
    }

    pub fn pending(&self) -> Interrupts {
        self.pending.get()
    }

    /// Happens on the next poll.
    pub fn fire(&self, event: Scripted) {
        match event {
            Scripted::Connect => {
                self.vbus.set(true);
                self.raise(Interrupts::VBUS);
            }
            Scripted::Disconnect => {
                self.vbus.set(false);
                self.raise(Interrupts::VBUS);
            }
            Scripted::Interrupt(interrupts) => self.raise(interrupts),
            Scripted::Setup(raw) => self.endpoints[0].setup.set(Some(raw)),
            Scripted::Stall(index) => self.endpoints[usize::from(index)].stalled.set(true),
        }
    }

    /// Happens after `polls` more polls.
    pub fn schedule(&mut self, polls: usize, event: Scripted) {
        let at = self.ticks.get() + polls;
        self.script.get_mut().push_back((at, event));
    }

    fn raise(&self, interrupts: Interrupts) {
        self.pending.set(self.pending.get() | interrupts);
    }

    fn ep(&self) -> &Endpoint {
        &self.endpoints[usize::from(self.selected)]
    }

    fn ep_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoints[usize::from(self.selected)]
    }

    fn reading_setup(&self) -> bool {
        self.selected == 0 && self.ep().setup.get().is_some()
    }
}

impl EndpointBank for MockBus {
    fn select(&mut self, index: u8) {
        self.selected = index;
    }
    fn current(&self) -> u8 {
        self.selected
    }
    fn direction(&self) -> UsbDirection {
        self.ep()
            .config
            .map_or(UsbDirection::Out, |config| config.address.direction())
    }
    fn in_ready(&self) -> bool {
        let ep = self.ep();
        if ep.stuck {
            return false;
        }
        let busy = ep.busy.get();
        if busy > 0 {
            ep.busy.set(busy - 1);
            return false;
        }
        true
    }
    fn out_received(&self) -> bool {
        !self.ep().out.is_empty()
    }
    fn setup_received(&self) -> bool {
        self.reading_setup()
    }
    fn is_stalled(&self) -> bool {
        self.ep().stalled.get()
    }
    fn set_stalled(&mut self, stalled: bool) {
        self.ep().stalled.set(stalled);
    }
    fn read_write_allowed(&self) -> bool {
        let ep = self.ep();
        match self.direction() {
            UsbDirection::In => {
                !ep.stuck && ep.busy.get() == 0 && ep.bank.len() < usize::from(self.max_packet_size())
            }
            UsbDirection::Out => ep.out.front().map_or(false, |packet| ep.position < packet.len()),
        }
    }
    fn byte_count(&self) -> u16 {
        let ep = self.ep();
        if self.reading_setup() {
            return (8 - ep.setup_position) as u16;
        }
        match self.direction() {
            UsbDirection::In => ep.bank.len() as u16,
            UsbDirection::Out => ep
                .out
                .front()
                .map_or(0, |packet| (packet.len() - ep.position) as u16),
        }
    }
    fn read_byte(&mut self) -> u8 {
        if self.reading_setup() {
            let ep = self.ep_mut();
            let raw = ep.setup.get().unwrap_or_default();
            let byte = raw.get(ep.setup_position).copied().unwrap_or(0);
            ep.setup_position += 1;
            return byte;
        }
        let ep = self.ep_mut();
        let byte = ep
            .out
            .front()
            .and_then(|packet| packet.get(ep.position).copied())
            .unwrap_or(0);
        ep.position += 1;
        byte
    }
    fn write_byte(&mut self, byte: u8) {
        self.ep_mut().bank.push(byte);
    }
    fn flush_in(&mut self) {
        let max_packet = usize::from(self.max_packet_size());
        let control = self.selected == 0;
        let ep = self.ep_mut();
        let packet = core::mem::take(&mut ep.bank);
        let len = packet.len();
        ep.sent.push(packet);
        ep.busy.set(ep.in_delay);
        if control {
            if let Some(host) = self.host.as_mut() {
                if host.take(len, max_packet) {
                    self.endpoints[0].out.push_back(Vec::new());
                }
            }
        }
    }
    fn ack_out(&mut self) {
        let ep = self.ep_mut();
        ep.out.pop_front();
        ep.position = 0;
        ep.acks += 1;
    }
    fn ack_setup(&mut self) {
        let ep = self.ep_mut();
        ep.setup.set(None);
        ep.setup_position = 0;
        self.setup_acks += 1;
    }
    fn max_packet_size(&self) -> u16 {
        self.ep().config.map_or(8, |config| config.size.bytes())
    }
    fn allocation(&self) -> Option<EndpointConfig> {
        self.ep().config
    }
    fn enable(&mut self) {
        self.ep_mut().enabled = true;
    }
    fn disable(&mut self) {
        self.ep_mut().enabled = false;
    }
    fn deallocate(&mut self) {
        let index = self.selected;
        self.ops.push(Op::Deallocate(index));
        self.ep_mut().config = None;
    }
    fn allocate(&mut self, config: &EndpointConfig) {
        let index = self.selected;
        self.ops.push(Op::Allocate(index));
        let accepted = self.reject != Some(index);
        let ep = self.ep_mut();
        ep.accepted = accepted;
        if accepted {
            ep.config = Some(*config);
        }
    }
    fn configuration_accepted(&self) -> bool {
        self.ep().accepted
    }
}

impl Bus for MockBus {
    fn frame_number(&self) -> u16 {
        let reads = self.frame_reads.get() + 1;
        self.frame_reads.set(reads);
        if reads % self.frame_period.max(1) == 0 {
            self.frame.set(self.frame.get().wrapping_add(1));
        }
        self.frame.get() & 0x7FF
    }
    fn pending_interrupts(&self) -> Interrupts {
        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        loop {
            let next = {
                let mut script = self.script.borrow_mut();
                match script.front() {
                    Some(&(at, _)) if at <= tick => script.pop_front(),
                    _ => None,
                }
            };
            match next {
                Some((_, event)) => self.fire(event),
                None => break,
            }
        }
        self.pending.get()
    }
    fn enabled_interrupts(&self) -> Interrupts {
        self.enabled
    }
    fn clear_interrupts(&mut self, interrupts: Interrupts) {
        self.pending.set(self.pending.get() - interrupts);
    }
    fn enable_interrupts(&mut self, interrupts: Interrupts) {
        self.enabled |= interrupts;
    }
    fn disable_interrupts(&mut self, interrupts: Interrupts) {
        self.enabled -= interrupts;
    }
    fn vbus_present(&self) -> bool {
        self.vbus.get()
    }
    fn set_pll(&mut self, enable: bool) {
        self.pll = enable;
    }
    fn set_clock_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }
    fn power_up(&mut self, speed: Speed) {
        self.speed = Some(speed);
    }
    fn power_down(&mut self) {
        self.speed = None;
    }
    fn attach(&mut self) {
        self.attached = true;
    }
    fn detach(&mut self) {
        self.attached = false;
    }
    fn set_address(&mut self, address: u8) {
        self.address = address;
        self.address_enabled = false;
    }
    fn enable_address(&mut self) {
        self.address_enabled = true;
    }
}

/// Records the callbacks it receives
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<&'static str>,
}

impl Callbacks for Recorder {
    fn on_connect(&mut self) {
        self.events.push("connect");
    }
    fn on_disconnect(&mut self) {
        self.events.push("disconnect");
    }
    fn on_end_of_reset(&mut self) {
        self.events.push("reset");
    }
    fn on_configure_error(&mut self) {
        self.events.push("configure error");
    }
    fn on_suspend(&mut self) {
        self.events.push("suspend");
    }
    fn on_wake(&mut self) {
        self.events.push("wake");
    }
    fn on_start_of_frame(&mut self) {
        self.events.push("frame");
    }
}

pub fn device(bus: MockBus, config: Config) -> Device<MockBus, Recorder> {
    let status: &'static DeviceStatus = Box::leak(Box::new(DeviceStatus::new()));
    Device::new(bus, status, Recorder::default(), config)
}

/// A device that saw VBUS and a bus reset, followed by bus activity.
pub fn reset(config: Config) -> Device<MockBus, Recorder> {
    let mut device = device(MockBus::new(), config);
    device.init();
    device.bus_mut().fire(Scripted::Connect);
    device.bus_mut().fire(Scripted::Interrupt(Interrupts::END_OF_RESET));
    device.poll();
    device.bus_mut().fire(Scripted::Interrupt(Interrupts::WAKE));
    device.poll();
    device
}

/// A device the host addressed and configured.
pub fn configured(config: Config) -> Device<MockBus, Recorder> {
    let device = reset(config);
    device.status.apply(Event::Addressed);
    device.status.apply(Event::Configured(1));
    device
}
