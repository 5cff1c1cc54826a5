//! AT90USB USB controller registers
//!
//! The module implements a RAL-compatible interface for the USB
//! controller's memory-mapped I/O registers, and the PLL control
//! register that clocks it.

#![allow(non_snake_case, non_upper_case_globals)]

use core::cell::UnsafeCell;

pub use ral_registers::{modify_reg, read_reg, write_reg};

/// An 8-bit I/O register
#[repr(transparent)]
pub struct Reg(UnsafeCell<u8>);

impl Reg {
    #[cfg(test)]
    pub const fn new(value: u8) -> Self {
        Reg(UnsafeCell::new(value))
    }

    pub fn read(&self) -> u8 {
        // Safety: the cell is only accessed through volatile, byte-sized
        // operations, which the AVR performs atomically.
        unsafe { self.0.get().read_volatile() }
    }

    pub fn write(&self, value: u8) {
        unsafe { self.0.get().write_volatile(value) }
    }
}

/// USB controller registers, from UHWCON (0xD7) through UEINT (0xF4)
#[repr(C)]
pub struct RegisterBlock {
    pub UHWCON: Reg,
    pub USBCON: Reg,
    pub USBSTA: Reg,
    pub USBINT: Reg,
    // OTG registers; not used in device mode.
    _reserved0: [u8; 5],
    pub UDCON: Reg,
    pub UDINT: Reg,
    pub UDIEN: Reg,
    pub UDADDR: Reg,
    pub UDFNUML: Reg,
    pub UDFNUMH: Reg,
    pub UDMFN: Reg,
    _reserved1: [u8; 1],
    pub UEINTX: Reg,
    pub UENUM: Reg,
    pub UERST: Reg,
    pub UECONX: Reg,
    pub UECFG0X: Reg,
    pub UECFG1X: Reg,
    pub UESTA0X: Reg,
    pub UESTA1X: Reg,
    pub UEIENX: Reg,
    pub UEDATX: Reg,
    pub UEBCLX: Reg,
    pub UEBCHX: Reg,
    pub UEINT: Reg,
}

impl RegisterBlock {
    #[cfg(test)]
    pub const fn new() -> Self {
        RegisterBlock {
            UHWCON: Reg::new(0),
            USBCON: Reg::new(0),
            USBSTA: Reg::new(0),
            USBINT: Reg::new(0),
            _reserved0: [0; 5],
            UDCON: Reg::new(0),
            UDINT: Reg::new(0),
            UDIEN: Reg::new(0),
            UDADDR: Reg::new(0),
            UDFNUML: Reg::new(0),
            UDFNUMH: Reg::new(0),
            UDMFN: Reg::new(0),
            _reserved1: [0; 1],
            UEINTX: Reg::new(0),
            UENUM: Reg::new(0),
            UERST: Reg::new(0),
            UECONX: Reg::new(0),
            UECFG0X: Reg::new(0),
            UECFG1X: Reg::new(0),
            UESTA0X: Reg::new(0),
            UESTA1X: Reg::new(0),
            UEIENX: Reg::new(0),
            UEDATX: Reg::new(0),
            UEBCLX: Reg::new(0),
            UEBCHX: Reg::new(0),
            UEINT: Reg::new(0),
        }
    }
}

/// The PLL control register (PLLCSR, 0x49)
#[repr(C)]
pub struct PllBlock {
    pub PLLCSR: Reg,
}

impl PllBlock {
    #[cfg(test)]
    pub const fn new() -> Self {
        PllBlock {
            PLLCSR: Reg::new(0),
        }
    }
}

macro_rules! fields {
    ($($reg:ident { $($field:ident @ $offset:literal : $width:literal),* $(,)? })*) => {
        $(
            pub mod $reg {
                $(
                    // Not every field is in use.
                    #[allow(dead_code)]
                    pub mod $field {
                        pub const offset: u8 = $offset;
                        pub const mask: u8 = (((1u16 << $width) - 1) << offset) as u8;
                        pub mod R {}
                        pub mod W {}
                        pub mod RW {}
                    }
                )*
            }
        )*
    };
}

fields! {
    UHWCON { UVREGE @ 0 : 1, UIDE @ 6 : 1, UIMOD @ 7 : 1 }
    USBCON { VBUSTE @ 0 : 1, OTGPADE @ 4 : 1, FRZCLK @ 5 : 1, USBE @ 7 : 1 }
    USBSTA { VBUS @ 0 : 1 }
    USBINT { VBUSTI @ 0 : 1 }
    UDCON { DETACH @ 0 : 1, RMWKUP @ 1 : 1, LSM @ 2 : 1 }
    UDINT { SUSPI @ 0 : 1, SOFI @ 2 : 1, EORSTI @ 3 : 1, WAKEUPI @ 4 : 1, EORSMI @ 5 : 1 }
    UDIEN { SUSPE @ 0 : 1, SOFE @ 2 : 1, EORSTE @ 3 : 1, WAKEUPE @ 4 : 1, EORSME @ 5 : 1 }
    UDADDR { UADD @ 0 : 7, ADDEN @ 7 : 1 }
    UDFNUMH { FNUM @ 0 : 3 }
    UEINTX {
        TXINI @ 0 : 1,
        STALLEDI @ 1 : 1,
        RXOUTI @ 2 : 1,
        RXSTPI @ 3 : 1,
        NAKOUTI @ 4 : 1,
        RWAL @ 5 : 1,
        NAKINI @ 6 : 1,
        FIFOCON @ 7 : 1,
    }
    UENUM { EPNUM @ 0 : 3 }
    UECONX { EPEN @ 0 : 1, RSTDT @ 3 : 1, STALLRQC @ 4 : 1, STALLRQ @ 5 : 1 }
    UECFG0X { EPDIR @ 0 : 1, EPTYPE @ 6 : 2 }
    UECFG1X { ALLOC @ 1 : 1, EPBK @ 2 : 2, EPSIZE @ 4 : 3 }
    UESTA0X { NBUSYBK @ 0 : 2, DTSEQ @ 2 : 2, UNDERFI @ 5 : 1, OVERFI @ 6 : 1, CFGOK @ 7 : 1 }
    UEBCHX { BYCT @ 0 : 3 }
    PLLCSR { PLOCK @ 0 : 1, PLLE @ 1 : 1, PLLP @ 2 : 3 }
}

const _: [(); 1] = [(); (core::mem::size_of::<RegisterBlock>() == 0xF4 - 0xD7 + 1) as usize];
