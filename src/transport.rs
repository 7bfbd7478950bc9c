//! Datagram transport for streamed audio

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::{Error, Result};

/// Connectionless, non-blocking send/receive primitive
///
/// Both directions report progress as a byte count; 0 means nothing moved
/// this call.
pub trait Transport {
    /// Send one datagram to `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the socket rejects the datagram
    fn send_to(&mut self, addr: SocketAddr, data: &[u8]) -> Result<usize>;

    /// Receive one datagram into `buf` if one is waiting
    ///
    /// # Errors
    ///
    /// Returns error if the socket fails
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// UDP socket transport
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to `port` on all interfaces
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::Setup(format!("could not bind UDP port {port}: {e}")))?;

        tracing::info!(addr = %socket.local_addr()?, "audio transport bound");
        Ok(Self { socket })
    }

    /// Address the socket is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn send_to(&mut self, addr: SocketAddr, data: &[u8]) -> Result<usize> {
        match self.socket.try_send_to(data, addr) {
            Ok(sent) => Ok(sent),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.socket.try_recv_from(buf) {
            Ok((received, _from)) => Ok(received),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_socket_receives_nothing() {
        let mut transport = UdpTransport::bind(0).await.unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(transport.receive(&mut buf).unwrap(), 0);
    }

    #[tokio::test]
    async fn datagram_round_trip_on_loopback() {
        let mut a = UdpTransport::bind(0).await.unwrap();
        let mut b = UdpTransport::bind(0).await.unwrap();
        let b_addr = SocketAddr::from(([127, 0, 0, 1], b.local_addr().unwrap().port()));

        // Readiness is only known once the reactor has polled the socket
        let mut sent = 0;
        for _ in 0..100 {
            sent = a.send_to(b_addr, &[1, 2, 3, 4]).unwrap();
            if sent > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(sent, 4);

        let mut buf = [0u8; 16];
        let mut received = 0;
        for _ in 0..100 {
            received = b.receive(&mut buf).unwrap();
            if received > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(&buf[..received], &[1, 2, 3, 4]);
    }
}
