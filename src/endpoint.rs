//! Endpoint configuration and selection

use core::ops::{Deref, DerefMut};

use crate::{
    hal::EndpointBank,
    error::{Error, Result},
    MAX_ENDPOINTS,
};
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// Bank size for an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum EndpointSize {
    Bytes8 = 0,
    Bytes16 = 1,
    Bytes32 = 2,
    Bytes64 = 3,
    Bytes128 = 4,
    Bytes256 = 5,
}

impl EndpointSize {
    /// Returns the smallest size that holds `bytes`.
    ///
    /// Returns `None` if `bytes` exceeds 256.
    pub fn from_bytes(bytes: u16) -> Option<Self> {
        Some(match bytes {
            0..=8 => EndpointSize::Bytes8,
            9..=16 => EndpointSize::Bytes16,
            17..=32 => EndpointSize::Bytes32,
            33..=64 => EndpointSize::Bytes64,
            65..=128 => EndpointSize::Bytes128,
            129..=256 => EndpointSize::Bytes256,
            _ => return None,
        })
    }

    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            0 => EndpointSize::Bytes8,
            1 => EndpointSize::Bytes16,
            2 => EndpointSize::Bytes32,
            3 => EndpointSize::Bytes64,
            4 => EndpointSize::Bytes128,
            _ => EndpointSize::Bytes256,
        }
    }

    pub fn bytes(self) -> u16 {
        8 << self as u8
    }
}

/// Single or double buffering
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Banks {
    #[default]
    Single,
    /// One bank is on the bus while software works on the other.
    Double,
}

/// How an endpoint is laid out in endpoint memory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub address: EndpointAddress,
    pub kind: EndpointType,
    pub size: EndpointSize,
    pub banks: Banks,
}

impl EndpointConfig {
    pub fn new(address: EndpointAddress, kind: EndpointType, size: EndpointSize, banks: Banks) -> Self {
        EndpointConfig {
            address,
            kind,
            size,
            banks,
        }
    }

    /// The default control endpoint, endpoint 0.
    pub fn control(size: EndpointSize) -> Self {
        Self::new(
            EndpointAddress::from_parts(0, UsbDirection::Out),
            EndpointType::Control,
            size,
            Banks::Single,
        )
    }

    /// Endpoint 0 must be a single-banked control endpoint of at most
    /// 64 bytes.
    fn is_valid(&self) -> bool {
        let index = self.address.index();
        if index >= MAX_ENDPOINTS {
            return false;
        }
        index != 0
            || (self.kind == EndpointType::Control
                && self.banks == Banks::Single
                && self.size <= EndpointSize::Bytes64)
    }
}

/// Something that multiplexes endpoint registers through a selection
pub trait Select {
    fn current_endpoint(&self) -> u8;
    fn select_endpoint(&mut self, index: u8);
}

impl<B: EndpointBank + ?Sized> Select for B {
    fn current_endpoint(&self) -> u8 {
        self.current()
    }
    fn select_endpoint(&mut self, index: u8) {
        self.select(index)
    }
}

/// Keeps an endpoint selected for the life of the guard
///
/// On drop, the guard selects whatever endpoint was selected when it
/// was created. Nest guards freely; each one restores its own caller's
/// selection, even when a transfer returns early.
pub struct Selected<'a, T: Select + ?Sized> {
    target: &'a mut T,
    previous: u8,
}

impl<'a, T: Select + ?Sized> Selected<'a, T> {
    pub fn new(target: &'a mut T, index: u8) -> Self {
        let previous = target.current_endpoint();
        target.select_endpoint(index);
        Selected { target, previous }
    }
}

impl<T: Select + ?Sized> Deref for Selected<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: Select + ?Sized> DerefMut for Selected<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: Select + ?Sized> Drop for Selected<'_, T> {
    fn drop(&mut self) {
        self.target.select_endpoint(self.previous);
    }
}

/// Configure an endpoint, keeping the endpoints above it intact.
///
/// The controller packs endpoint memory in index order, so changing an
/// endpoint shifts the memory of every higher endpoint. Those endpoints
/// are released, then written back in ascending order once `config`
/// is in place. Every write is checked against the controller's
/// acceptance flag.
pub fn configure<B: EndpointBank + ?Sized>(bank: &mut B, config: &EndpointConfig) -> Result<()> {
    let index = config.address.index();
    if !config.is_valid() {
        warn!("EP{} INVALID CONFIGURATION", index);
        return Err(Error::ConfigurationFailed);
    }

    let mut bank = Selected::new(bank, index as u8);

    let mut layout: [Option<EndpointConfig>; MAX_ENDPOINTS] = [None; MAX_ENDPOINTS];
    for (higher, slot) in layout.iter_mut().enumerate().skip(index + 1) {
        bank.select(higher as u8);
        *slot = bank.allocation();
    }

    for ep in (index..MAX_ENDPOINTS).rev() {
        if ep == index || layout[ep].is_some() {
            bank.select(ep as u8);
            bank.disable();
            bank.deallocate();
        }
    }

    layout[index] = Some(*config);
    for (ep, config) in layout.iter().enumerate().skip(index) {
        let Some(config) = config else {
            continue;
        };
        bank.select(ep as u8);
        bank.enable();
        bank.allocate(config);
        if !bank.configuration_accepted() {
            warn!("EP{} CONFIGURATION REJECTED", ep);
            return Err(Error::ConfigurationFailed);
        }
    }

    debug!("EP{} CONFIGURED {} BYTES", index, config.size.bytes());
    Ok(())
}
