//! Datagram transport adapter.
//!
//! Wraps a connected [`UdpSocket`] in `AsyncRead`/`AsyncWrite` so the
//! session's line framing runs over it unchanged. Each write becomes one
//! datagram; each read drains one datagram into the caller's buffer.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

/// A connected UDP socket seen as a byte stream.
#[derive(Debug)]
pub struct UdpStream {
    socket: UdpSocket,
}

impl UdpStream {
    /// Wrap a socket that has already been `connect`ed to its peer.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind an ephemeral local port of the peer's address family and
    /// connect it to `peer`.
    pub async fn connect(peer: std::net::SocketAddr) -> io::Result<Self> {
        let local = if peer.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).await?;
        socket
            .connect(peer)
            .await?;
        Ok(Self::new(socket))
    }

    /// The underlying socket.
    pub fn get_ref(&self) -> &UdpSocket {
        &self.socket
    }
}

impl AsyncRead for UdpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.socket
            .poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket
            .poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn datagrams_flow_both_ways() {
        let server = UdpSocket::bind("127.0.0.1:0")
            .await
            .unwrap();
        let server_addr = server
            .local_addr()
            .unwrap();

        let mut client = UdpStream::connect(server_addr)
            .await
            .unwrap();
        client
            .write_all(b"Action: Ping\r\n\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 128];
        let (n, from) = server
            .recv_from(&mut buf)
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"Action: Ping\r\n\r\n");

        server
            .send_to(b"Response: Success\r\nPing: Pong\r\n\r\n", from)
            .await
            .unwrap();

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .unwrap();
        assert_eq!(line, "Response: Success\r\n");
    }
}
