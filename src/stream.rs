//! Byte streams on bulk and interrupt endpoints
//!
//! Stream transfers act on the selected endpoint. Select it with
//! [`Device::select`] before the first call.
//!
//! Both directions can run to completion, or return
//! [`Error::Incomplete`] whenever they fill (IN) or drain (OUT) one
//! bank. Pass a progress cursor to choose the second mode. The cursor
//! counts the bytes already moved; call again with the same buffer and
//! cursor to pick up where the last call stopped.
//!
//! ```no_run
//! # use at90usb_usbd::{Device, Error, hal::Bus, Callbacks};
//! # fn send<B: Bus, C: Callbacks>(device: &mut Device<B, C>, report: &[u8]) -> Result<(), Error> {
//! let mut progress = 0;
//! device.select(1);
//! loop {
//!     match device.data_in(report, Some(&mut progress)) {
//!         Err(Error::Incomplete) => { /* do other work */ }
//!         result => break result,
//!     }
//! }
//! # }
//! ```

use crate::{
    device::{Device, Pipe},
    error::{Error, Result},
    events::Callbacks,
    hal::Bus,
};
use usb_device::UsbDirection;

impl<B: Bus, C: Callbacks> Device<B, C> {
    /// Wait until the selected endpoint can move data.
    ///
    /// An IN endpoint is ready when its bank is free. An OUT endpoint is
    /// ready when it holds a packet. Each change of the frame number uses
    /// one frame of `timeout_frames`; when they're used up, the wait fails
    /// with [`Error::TimedOut`]. A timeout of 0 behaves like a timeout of 1.
    pub fn wait_until_ready(&mut self, timeout_frames: u16) -> Result<()> {
        let direction = self.bus.direction();
        let mut frame = self.bus.frame_number();
        let mut remaining = timeout_frames;

        loop {
            self.check(Pipe::Stream)?;
            let ready = match direction {
                UsbDirection::In => self.bus.in_ready(),
                UsbDirection::Out => self.bus.out_received(),
            };
            if ready {
                return Ok(());
            }

            let now = self.bus.frame_number();
            if now != frame {
                frame = now;
                remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    debug!("EP{} TIMEOUT", self.bus.current());
                    return Err(Error::TimedOut);
                }
            }
        }
    }

    /// Send `data` on the selected IN endpoint.
    ///
    /// Without a cursor, the call returns once all of `data` is handed to
    /// the controller. With a cursor, it skips the bytes the cursor
    /// covers, and returns [`Error::Incomplete`] each time it hands over
    /// a full bank.
    pub fn data_in(&mut self, data: &[u8], mut progress: Option<&mut usize>) -> Result<()> {
        let timeout = self.config.timeout_frames;
        self.wait_until_ready(timeout)?;

        let mut sent = progress.as_deref().map_or(0, |&sent| sent.min(data.len()));
        while sent < data.len() {
            if self.bus.read_write_allowed() {
                self.bus.write_byte(data[sent]);
                sent += 1;
                continue;
            }

            self.bus.flush_in();
            if let Some(progress) = progress.as_deref_mut() {
                *progress = sent;
                return Err(Error::Incomplete);
            }
            self.wait_until_ready(timeout)?;
        }
        self.bus.flush_in();
        if let Some(progress) = progress {
            *progress = sent;
        }

        let max_packet = usize::from(self.bus.max_packet_size());
        if self.config.stream_zlp.trailing_packet(sent, max_packet, None) {
            self.wait_until_ready(timeout)?;
            self.bus.flush_in();
        }
        trace!("EP{} IN {}", self.bus.current(), sent);
        Ok(())
    }

    /// Receive `buffer.len()` bytes on the selected OUT endpoint.
    ///
    /// The mirror of [`data_in`](Device::data_in). Each emptied bank
    /// goes back to the controller; with a cursor, the call returns
    /// [`Error::Incomplete`] after each one. The bank that holds the last
    /// byte is released before the call returns, along with any bytes
    /// past the end of `buffer`.
    pub fn data_out(&mut self, buffer: &mut [u8], mut progress: Option<&mut usize>) -> Result<()> {
        let timeout = self.config.timeout_frames;
        self.wait_until_ready(timeout)?;

        let mut received = progress
            .as_deref()
            .map_or(0, |&received| received.min(buffer.len()));
        while received < buffer.len() {
            if self.bus.read_write_allowed() {
                buffer[received] = self.bus.read_byte();
                received += 1;
                continue;
            }

            self.bus.ack_out();
            if let Some(progress) = progress.as_deref_mut() {
                *progress = received;
                return Err(Error::Incomplete);
            }
            self.wait_until_ready(timeout)?;
        }
        self.bus.ack_out();
        if let Some(progress) = progress {
            *progress = received;
        }
        trace!("EP{} OUT {}", self.bus.current(), received);
        Ok(())
    }
}
