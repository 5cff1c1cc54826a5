//! Endpoint and controller primitives for AT90USB processors
//!
//! [`At90Usb`] implements [`EndpointBank`] and [`Bus`] for the USB
//! controller in the AT90USB646, AT90USB647, AT90USB1286 and AT90USB1287.
//! Hand it to a [`Device`](crate::Device).

mod ral;

use crate::{
    endpoint::{Banks, EndpointConfig, EndpointSize},
    hal::{Bus, EndpointBank, Interrupts, Speed},
    Peripherals,
};
use usb_device::{
    endpoint::{
        EndpointAddress, EndpointType, IsochronousSynchronizationType, IsochronousUsageType,
    },
    UsbDirection,
};

/// The clock that feeds the USB PLL
///
/// The PLL multiplies this clock up to the 48 MHz that the controller
/// needs. The prescaler values match the AT90USB128x.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Crystal {
    #[default]
    Mhz8,
    Mhz16,
}

impl Crystal {
    fn prescaler(self) -> u8 {
        match self {
            Crystal::Mhz8 => 0b011,
            Crystal::Mhz16 => 0b101,
        }
    }
}

/// AT90USB USB controller
pub struct At90Usb {
    usb: &'static ral::RegisterBlock,
    pll: &'static ral::PllBlock,
    crystal: Crystal,
}

impl At90Usb {
    /// Take the USB registers from `peripherals`.
    pub fn new<P: Peripherals>(peripherals: P, crystal: Crystal) -> Self {
        // Safety: a Peripherals implementation owns these register
        // blocks, and its pointers are valid for the life of the program.
        let (usb, pll) = unsafe {
            (
                &*(peripherals.usb() as *const ral::RegisterBlock),
                &*(peripherals.pll() as *const ral::PllBlock),
            )
        };
        At90Usb { usb, pll, crystal }
    }
}

/// UDINT and UDIEN share a layout.
fn device_interrupt_bits(interrupts: Interrupts) -> u8 {
    let mut bits = 0;
    if interrupts.contains(Interrupts::SUSPEND) {
        bits |= ral::UDINT::SUSPI::mask;
    }
    if interrupts.contains(Interrupts::START_OF_FRAME) {
        bits |= ral::UDINT::SOFI::mask;
    }
    if interrupts.contains(Interrupts::END_OF_RESET) {
        bits |= ral::UDINT::EORSTI::mask;
    }
    if interrupts.contains(Interrupts::WAKE) {
        bits |= ral::UDINT::WAKEUPI::mask;
    }
    bits
}

fn device_interrupts(bits: u8) -> Interrupts {
    let mut interrupts = Interrupts::empty();
    for (mask, interrupt) in [
        (ral::UDINT::SUSPI::mask, Interrupts::SUSPEND),
        (ral::UDINT::SOFI::mask, Interrupts::START_OF_FRAME),
        (ral::UDINT::EORSTI::mask, Interrupts::END_OF_RESET),
        (ral::UDINT::WAKEUPI::mask, Interrupts::WAKE),
    ] {
        if bits & mask != 0 {
            interrupts |= interrupt;
        }
    }
    interrupts
}

fn type_bits(kind: EndpointType) -> u8 {
    match kind {
        EndpointType::Control => 0,
        EndpointType::Isochronous { .. } => 1,
        EndpointType::Bulk => 2,
        EndpointType::Interrupt => 3,
    }
}

fn endpoint_type(bits: u8) -> EndpointType {
    match bits {
        0 => EndpointType::Control,
        1 => EndpointType::Isochronous {
            synchronization: IsochronousSynchronizationType::NoSynchronization,
            usage: IsochronousUsageType::Data,
        },
        2 => EndpointType::Bulk,
        _ => EndpointType::Interrupt,
    }
}

impl EndpointBank for At90Usb {
    fn select(&mut self, index: u8) {
        ral::write_reg!(ral, self.usb, UENUM, EPNUM: index);
    }
    fn current(&self) -> u8 {
        ral::read_reg!(ral, self.usb, UENUM, EPNUM)
    }
    fn direction(&self) -> UsbDirection {
        if ral::read_reg!(ral, self.usb, UECFG0X, EPDIR == 1) {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
    fn in_ready(&self) -> bool {
        ral::read_reg!(ral, self.usb, UEINTX, TXINI == 1)
    }
    fn out_received(&self) -> bool {
        ral::read_reg!(ral, self.usb, UEINTX, RXOUTI == 1)
    }
    fn setup_received(&self) -> bool {
        ral::read_reg!(ral, self.usb, UEINTX, RXSTPI == 1)
    }
    fn is_stalled(&self) -> bool {
        ral::read_reg!(ral, self.usb, UECONX, STALLRQ == 1)
    }
    fn set_stalled(&mut self, stalled: bool) {
        if stalled {
            ral::modify_reg!(ral, self.usb, UECONX, STALLRQ: 1);
        } else {
            ral::modify_reg!(ral, self.usb, UECONX, STALLRQC: 1);
        }
    }
    fn read_write_allowed(&self) -> bool {
        ral::read_reg!(ral, self.usb, UEINTX, RWAL == 1)
    }
    fn byte_count(&self) -> u16 {
        let high = ral::read_reg!(ral, self.usb, UEBCHX, BYCT);
        let low = ral::read_reg!(ral, self.usb, UEBCLX);
        u16::from_le_bytes([low, high])
    }
    fn read_byte(&mut self) -> u8 {
        ral::read_reg!(ral, self.usb, UEDATX)
    }
    fn write_byte(&mut self, byte: u8) {
        ral::write_reg!(ral, self.usb, UEDATX, byte);
    }
    fn flush_in(&mut self) {
        ral::modify_reg!(ral, self.usb, UEINTX, TXINI: 0, FIFOCON: 0);
    }
    fn ack_out(&mut self) {
        ral::modify_reg!(ral, self.usb, UEINTX, RXOUTI: 0, FIFOCON: 0);
    }
    fn ack_setup(&mut self) {
        ral::modify_reg!(ral, self.usb, UEINTX, RXSTPI: 0);
    }
    fn max_packet_size(&self) -> u16 {
        EndpointSize::from_bits(ral::read_reg!(ral, self.usb, UECFG1X, EPSIZE)).bytes()
    }

    fn allocation(&self) -> Option<EndpointConfig> {
        if ral::read_reg!(ral, self.usb, UECFG1X, ALLOC == 0) {
            return None;
        }
        let (kind, direction) = ral::read_reg!(ral, self.usb, UECFG0X, EPTYPE, EPDIR);
        let (size, banks) = ral::read_reg!(ral, self.usb, UECFG1X, EPSIZE, EPBK);
        let direction = if direction == 1 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        };
        Some(EndpointConfig::new(
            EndpointAddress::from_parts(usize::from(self.current()), direction),
            endpoint_type(kind),
            EndpointSize::from_bits(size),
            if banks == 0 { Banks::Single } else { Banks::Double },
        ))
    }
    fn enable(&mut self) {
        ral::modify_reg!(ral, self.usb, UECONX, EPEN: 1);
    }
    fn disable(&mut self) {
        ral::modify_reg!(ral, self.usb, UECONX, EPEN: 0);
    }
    fn deallocate(&mut self) {
        ral::modify_reg!(ral, self.usb, UECFG1X, ALLOC: 0);
    }
    fn allocate(&mut self, config: &EndpointConfig) {
        let direction = (config.address.direction() == UsbDirection::In) as u8;
        let banks = (config.banks == Banks::Double) as u8;
        ral::write_reg!(ral, self.usb, UECFG0X, EPTYPE: type_bits(config.kind), EPDIR: direction);
        ral::write_reg!(ral, self.usb, UECFG1X, EPSIZE: config.size as u8, EPBK: banks, ALLOC: 1);
    }
    fn configuration_accepted(&self) -> bool {
        ral::read_reg!(ral, self.usb, UESTA0X, CFGOK == 1)
    }
}

impl Bus for At90Usb {
    fn frame_number(&self) -> u16 {
        let high = ral::read_reg!(ral, self.usb, UDFNUMH, FNUM);
        let low = ral::read_reg!(ral, self.usb, UDFNUML);
        u16::from_le_bytes([low, high])
    }

    fn pending_interrupts(&self) -> Interrupts {
        let mut pending = device_interrupts(ral::read_reg!(ral, self.usb, UDINT));
        if ral::read_reg!(ral, self.usb, USBINT, VBUSTI == 1) {
            pending |= Interrupts::VBUS;
        }
        pending
    }
    fn enabled_interrupts(&self) -> Interrupts {
        let mut enabled = device_interrupts(ral::read_reg!(ral, self.usb, UDIEN));
        if ral::read_reg!(ral, self.usb, USBCON, VBUSTE == 1) {
            enabled |= Interrupts::VBUS;
        }
        enabled
    }
    fn clear_interrupts(&mut self, interrupts: Interrupts) {
        if interrupts.contains(Interrupts::VBUS) {
            ral::modify_reg!(ral, self.usb, USBINT, VBUSTI: 0);
        }
        let bits = device_interrupt_bits(interrupts);
        if bits != 0 {
            ral::modify_reg!(ral, self.usb, UDINT, |udint| udint & !bits);
        }
    }
    fn enable_interrupts(&mut self, interrupts: Interrupts) {
        if interrupts.contains(Interrupts::VBUS) {
            ral::modify_reg!(ral, self.usb, USBCON, VBUSTE: 1);
        }
        let bits = device_interrupt_bits(interrupts);
        ral::modify_reg!(ral, self.usb, UDIEN, |udien| udien | bits);
    }
    fn disable_interrupts(&mut self, interrupts: Interrupts) {
        if interrupts.contains(Interrupts::VBUS) {
            ral::modify_reg!(ral, self.usb, USBCON, VBUSTE: 0);
        }
        let bits = device_interrupt_bits(interrupts);
        ral::modify_reg!(ral, self.usb, UDIEN, |udien| udien & !bits);
    }

    fn vbus_present(&self) -> bool {
        ral::read_reg!(ral, self.usb, USBSTA, VBUS == 1)
    }
    fn set_pll(&mut self, enable: bool) {
        if enable {
            let prescaler = self.crystal.prescaler();
            ral::modify_reg!(ral, self.pll, PLLCSR, PLLP: prescaler, PLLE: 1);
            while ral::read_reg!(ral, self.pll, PLLCSR, PLOCK == 0) {}
            ral::modify_reg!(ral, self.usb, USBCON, FRZCLK: 0);
        } else {
            ral::modify_reg!(ral, self.usb, USBCON, FRZCLK: 1);
            ral::write_reg!(ral, self.pll, PLLCSR, 0);
        }
    }
    fn set_clock_frozen(&mut self, frozen: bool) {
        ral::modify_reg!(ral, self.usb, USBCON, FRZCLK: frozen as u8);
    }

    fn power_up(&mut self, speed: Speed) {
        ral::modify_reg!(ral, self.usb, USBCON, USBE: 0);
        ral::modify_reg!(ral, self.usb, USBCON, USBE: 1);
        ral::modify_reg!(ral, self.usb, UHWCON, UVREGE: 1, UIMOD: 1);
        ral::modify_reg!(ral, self.usb, USBCON, OTGPADE: 1);
        ral::modify_reg!(ral, self.usb, UDCON, LSM: (speed == Speed::Low) as u8);
    }
    fn power_down(&mut self) {
        ral::modify_reg!(ral, self.usb, USBCON, USBE: 0, OTGPADE: 0);
        ral::modify_reg!(ral, self.usb, UHWCON, UVREGE: 0);
    }
    fn attach(&mut self) {
        ral::modify_reg!(ral, self.usb, UDCON, DETACH: 0);
    }
    fn detach(&mut self) {
        ral::modify_reg!(ral, self.usb, UDCON, DETACH: 1);
    }

    fn set_address(&mut self, address: u8) {
        ral::write_reg!(ral, self.usb, UDADDR, UADD: address);
    }
    fn enable_address(&mut self) {
        ral::modify_reg!(ral, self.usb, UDADDR, ADDEN: 1);
    }
}
