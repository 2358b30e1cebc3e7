use bytes::Bytes;
use futures_core::ready;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use crate::codec::PacketEncode;
use crate::error::Result;
use super::channel::{Channel, ChannelReceiver, ChannelEvent, ChannelConfig, DATA_STANDARD};
use super::client::Client;

/// Handle to an SSH tunnel (TCP/IP forwarding channel).
///
/// TCP/IP forwarding channels (RFC 4254, section 7), commonly called "tunnels", allow you to
/// transmit ordinary TCP/IP sockets over SSH. There are two ways how to obtain a tunnel:
///
/// - You can ask the server to connect to an address using [`Client::connect_tunnel()`]. This
/// is the building block of "local forwarding": accept connections from a local socket
/// yourself and open one tunnel per connection.
/// - You can ask the server to bind to an address and listen for incoming connections using
/// [`Client::forward_remote()`], commonly called "remote forwarding". Accepted connections
/// arrive as [`ForwardedTunnel`]s.
#[derive(Clone)]
pub struct Tunnel {
    pub(super) channel: Channel,
}

impl Tunnel {
    pub(super) async fn connect(
        client: &Client,
        config: ChannelConfig,
        connect_addr: (String, u16),
        originator_addr: (String, u16),
    ) -> Result<(Tunnel, TunnelReceiver)> {
        // RFC 4254, section 7.2
        let mut open_payload = PacketEncode::new();
        open_payload.put_str(&connect_addr.0);
        open_payload.put_u32(connect_addr.1 as u32);
        open_payload.put_str(&originator_addr.0);
        open_payload.put_u32(originator_addr.1 as u32);

        let (channel, channel_rx, _) = client.open_channel(
            "direct-tcpip".into(), config, open_payload.finish()).await?;
        Ok((Tunnel { channel }, TunnelReceiver { channel_rx }))
    }

    /// Get the low level [`Channel`] of this tunnel.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Send data to the tunnel.
    ///
    /// This method returns after all bytes have been accepted by the flow control mechanism and
    /// written to the internal send buffer, but before we send them to the socket (or other I/O
    /// stream that backs this SSH connection).
    pub async fn send_data(&self, data: Bytes) -> Result<()> {
        self.channel.send_data(data, DATA_STANDARD).await
    }

    /// Signal that no more data will be sent to this tunnel.
    ///
    /// This method returns after all bytes previously sent to this tunnel have been accepted by
    /// the flow control mechanism, but before we write the message to the socket (or other I/O
    /// stream that backs this SSH connection).
    ///
    /// If the tunnel is closed before you call this method, or if it closes before this method
    /// returns, we quietly ignore this error and return `Ok`.
    pub async fn send_eof(&self) -> Result<()> {
        self.channel.send_eof().await
    }

    /// Close the tunnel (see [`Channel::close()`]).
    pub fn close(&self) -> Result<()> {
        self.channel.close()
    }
}

/// Receiving half of a [`Tunnel`].
///
/// [`TunnelReceiver`] produces [`TunnelEvent`]s, which correspond to the data sent by the
/// server on the tunnel. You can ignore these events if you don't need them, but you **must**
/// receive them, otherwise the client will stall when the internal buffer of events fills up.
#[derive(Debug)]
pub struct TunnelReceiver {
    channel_rx: ChannelReceiver,
}

/// An event returned from [`TunnelReceiver`].
///
/// This enum is marked as `#[non_exhaustive]`, so that we can add new variants without breaking
/// backwards compatibility. It should always be safe to ignore any events that you don't intend
/// to handle.
#[derive(Debug)]
#[non_exhaustive]
pub enum TunnelEvent {
    /// Data received from the tunnel.
    ///
    /// You should handle this data as a byte stream, the boundaries between consecutive `Data`
    /// events might be arbitrary.
    Data(Bytes),

    /// End of file received from the tunnel.
    ///
    /// After this, we should not receive more data from the tunnel, but the tunnel is not yet
    /// closed.
    Eof,
}

impl TunnelReceiver {
    pub(super) fn new(event_rx: mpsc::Receiver<ChannelEvent>) -> TunnelReceiver {
        TunnelReceiver { channel_rx: ChannelReceiver { event_rx } }
    }

    /// Receive an event from the tunnel.
    ///
    /// Returns `None` if the tunnel was closed.
    pub async fn recv(&mut self) -> Result<Option<TunnelEvent>> {
        struct Recv<'a> { rx: &'a mut TunnelReceiver }
        impl<'a> Future for Recv<'a> {
            type Output = Result<Option<TunnelEvent>>;
            fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
                self.rx.poll_recv(cx)
            }
        }
        Recv { rx: self }.await
    }

    /// Poll-friendly variant of [`.recv()`][Self::recv()].
    pub fn poll_recv(&mut self, cx: &mut Context) -> Poll<Result<Option<TunnelEvent>>> {
        loop {
            match ready!(self.channel_rx.poll_recv(cx)) {
                Some(ChannelEvent::Data(data, DATA_STANDARD)) =>
                    return Poll::Ready(Ok(Some(TunnelEvent::Data(data)))),
                Some(ChannelEvent::Eof) =>
                    return Poll::Ready(Ok(Some(TunnelEvent::Eof))),
                Some(ChannelEvent::Data(_, _) | ChannelEvent::Request(_)) =>
                    continue,
                None => return Poll::Ready(Ok(None)),
            }
        }
    }
}


/// A connection accepted by a [remote forward][Client::forward_remote].
///
/// The server opened a `"forwarded-tcpip"` channel for a connection that it accepted on the
/// forwarded address. Bytes from the connection arrive on
/// [`receiver`][ForwardedTunnel::receiver]; bytes sent to [`tunnel`][ForwardedTunnel::tunnel]
/// go out on the connection.
pub struct ForwardedTunnel {
    /// The address on which the server accepted the connection.
    pub connected_host: String,
    /// The port on which the server accepted the connection.
    pub connected_port: u32,
    /// The address of the connection originator, as reported by the server.
    pub originator_host: String,
    /// The port of the connection originator, as reported by the server.
    pub originator_port: u32,
    /// Sending half of the tunnel.
    pub tunnel: Tunnel,
    /// Receiving half of the tunnel.
    pub receiver: TunnelReceiver,
}

/// Handle to a remote forward created with [`Client::forward_remote()`].
#[derive(Debug, Clone)]
pub struct RemoteForward {
    /// The address that the server bound.
    pub bind_host: String,
    /// The port that the server bound; if you asked for port 0, this is the port that the
    /// server chose.
    pub bind_port: u32,
}
