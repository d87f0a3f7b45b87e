use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{Context, Result};

use crate::render::frame::PixelFrame;

/// Control payload asking the display to leave streaming mode.
pub const EXIT_MESSAGE: &[u8] = b"EXIT";

/// Fire-and-forget sender for raw LED frames.
///
/// Every datagram is exactly `3 * max_leds` bytes. Frames that are shorter are
/// zero-padded and longer ones truncated, so the receiver always sees the same
/// layout.
pub struct FrameSender {
    socket: UdpSocket,
    target: SocketAddr,
    packet: Vec<u8>,
}

impl FrameSender {
    pub fn new(host: &str, port: u16, max_leds: usize) -> Result<Self> {
        let target = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve display address {}:{}", host, port))?
            .next()
            .with_context(|| format!("No address found for {}:{}", host, port))?;
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind UDP socket")?;

        log::debug!("UDP frames -> {} ({} bytes each)", target, max_leds * 3);

        Ok(Self {
            socket,
            target,
            packet: vec![0; max_leds * 3],
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn payload_len(&self) -> usize {
        self.packet.len()
    }

    /// Send one frame. No acknowledgement and no retry; the next frame supersedes it.
    pub fn send(&mut self, frame: &PixelFrame) -> io::Result<()> {
        let bytes = frame.as_bytes();
        let n = bytes.len().min(self.packet.len());
        self.packet[..n].copy_from_slice(&bytes[..n]);
        self.packet[n..].fill(0);
        self.socket.send_to(&self.packet, self.target)?;
        Ok(())
    }

    pub fn send_exit(&self) -> io::Result<()> {
        self.socket.send_to(EXIT_MESSAGE, self.target)?;
        Ok(())
    }
}
