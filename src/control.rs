//! Control transfers on endpoint 0
//!
//! A control transfer is a SETUP packet, an optional data stage split
//! into packets of the control endpoint's size, and a status stage that
//! runs opposite to the data. The request dispatcher reads the SETUP
//! packet with [`Device::read_setup`], then finishes the transfer with
//! [`Device::control_in`], [`Device::control_out`], or a bare
//! [`Device::status_stage`].
//!
//! These calls always act on endpoint 0, and restore the caller's
//! endpoint selection when they return. It's safe to run a control
//! transfer in the middle of a stream transfer on another endpoint.

use crate::{
    device::{Device, Pipe},
    error::Result,
    events::Callbacks,
    hal::Bus,
    setup::SetupPacket,
};
use usb_device::UsbDirection;

const CONTROL_ENDPOINT: u8 = 0;

impl<B: Bus, C: Callbacks> Device<B, C> {
    /// Wait on endpoint 0 until `ready` holds.
    fn wait_control(&mut self, ready: impl Fn(&B) -> bool) -> Result<()> {
        loop {
            self.check(Pipe::Control)?;
            if ready(&self.bus) {
                return Ok(());
            }
        }
    }

    /// Read and acknowledge a pending SETUP packet.
    ///
    /// Returns `None` if there's no SETUP packet waiting.
    pub fn read_setup(&mut self) -> Result<Option<SetupPacket>> {
        let mut ep0 = self.selected(CONTROL_ENDPOINT);
        ep0.attached()?;
        if !ep0.bus.setup_received() {
            return Ok(None);
        }

        let mut raw = [0; 8];
        for byte in raw.iter_mut() {
            *byte = ep0.bus.read_byte();
        }
        ep0.bus.ack_setup();

        let setup = SetupPacket::parse(&raw);
        trace!(
            "SETUP {=u8:#x} {=u8} LEN {=u16}",
            setup.request_type,
            setup.request,
            setup.length
        );
        Ok(Some(setup))
    }

    /// Send `data` to the host, then complete the status stage.
    ///
    /// `requested` is the SETUP packet's length. The transfer sends at most
    /// that many bytes, and it ends early if the host moves on to the
    /// status stage before it receives everything.
    pub fn control_in(&mut self, data: &[u8], requested: u16) -> Result<()> {
        let policy = self.config.control_zlp;
        let mut ep0 = self.selected(CONTROL_ENDPOINT);

        let length = data.len().min(requested as usize);
        let max_packet = usize::from(ep0.bus.max_packet_size()).max(1);
        let mut sent = 0;
        let mut ended_by_host = false;

        while sent < length {
            ep0.check(Pipe::Control)?;
            if ep0.bus.out_received() {
                ended_by_host = true;
                break;
            }
            if ep0.bus.in_ready() {
                let end = length.min(sent + max_packet);
                for &byte in &data[sent..end] {
                    ep0.bus.write_byte(byte);
                }
                ep0.bus.flush_in();
                sent = end;
            }
        }

        // An empty data stage is a single empty packet, whatever the policy.
        let empty_stage = sent == 0 && requested > 0;
        if !ended_by_host
            && (empty_stage || policy.trailing_packet(sent, max_packet, Some(requested.into())))
        {
            ep0.wait_control(|bus| bus.in_ready())?;
            ep0.bus.flush_in();
        }

        ep0.wait_control(|bus| bus.out_received())?;
        ep0.bus.ack_out();
        debug!("EP0 IN {}", sent);
        Ok(())
    }

    /// Receive the data stage into `buffer`, then complete the status stage.
    ///
    /// Size `buffer` to the SETUP packet's length. A short packet from
    /// the host ends the data stage early. Returns the number of bytes
    /// received.
    pub fn control_out(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut ep0 = self.selected(CONTROL_ENDPOINT);
        let max_packet = usize::from(ep0.bus.max_packet_size());
        let mut received = 0;

        while received < buffer.len() {
            ep0.check(Pipe::Control)?;
            if !ep0.bus.out_received() {
                continue;
            }
            let packet = usize::from(ep0.bus.byte_count());
            let take = packet.min(buffer.len() - received);
            for byte in &mut buffer[received..received + take] {
                *byte = ep0.bus.read_byte();
            }
            received += take;
            ep0.bus.ack_out();
            if packet < max_packet {
                break;
            }
        }

        ep0.wait_control(|bus| bus.in_ready())?;
        ep0.bus.flush_in();
        ep0.wait_control(|bus| bus.in_ready())?;
        debug!("EP0 OUT {}", received);
        Ok(received)
    }

    /// Complete the status stage of a request.
    ///
    /// `direction` is the direction of the request's data stage, from
    /// [`SetupPacket::direction`]. For `In` requests, wait for and
    /// acknowledge the host's empty OUT packet. Otherwise, send an empty
    /// IN packet, and wait for the host to take it.
    pub fn status_stage(&mut self, direction: UsbDirection) -> Result<()> {
        let mut ep0 = self.selected(CONTROL_ENDPOINT);
        match direction {
            UsbDirection::In => {
                ep0.wait_control(|bus| bus.out_received())?;
                ep0.bus.ack_out();
            }
            UsbDirection::Out => {
                ep0.wait_control(|bus| bus.in_ready())?;
                ep0.bus.flush_in();
                ep0.wait_control(|bus| bus.in_ready())?;
            }
        }
        Ok(())
    }

    /// Reject the current request.
    ///
    /// The controller clears the stall when the next SETUP packet arrives.
    pub fn stall_control(&mut self) {
        self.set_stalled(CONTROL_ENDPOINT, true);
        debug!("EP0 STALL");
    }
}
