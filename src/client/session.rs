use bytes::Bytes;
use futures_core::ready;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use crate::codec::{PacketDecode, PacketEncode};
use crate::error::{Result, Error};
use super::channel::{
    Channel, ChannelConfig, ChannelEvent, ChannelReceiver, ChannelReq, ChannelReply,
    DATA_STANDARD, DATA_STDERR,
};
use super::client::Client;

/// Handle to an SSH session channel.
///
/// A session is a remote execution of a program (RFC 4254, section 6): use it to execute
/// commands, start shells or subsystems, feed them stdin and control their terminal. To receive
/// the output, use the matching [`SessionReceiver`]. To obtain an instance of [`Session`] and
/// [`SessionReceiver`], use [`Client::open_session()`].
///
/// You can cheaply clone this object and safely share the clones between tasks.
#[derive(Clone)]
pub struct Session {
    channel: Channel,
}

impl Session {
    pub(super) async fn open(client: &Client, config: ChannelConfig) -> Result<(Session, SessionReceiver)> {
        let (channel, channel_rx, _) =
            client.open_channel("session".into(), config, Bytes::new()).await?;
        Ok((Session { channel }, SessionReceiver { channel_rx }))
    }

    /// Get the low level [`Channel`] of this session.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Send data to the standard input of the remote process.
    ///
    /// This method is subject to the flow control mechanism, see
    /// [`Channel::send_data()`] for details.
    pub async fn send_stdin(&self, data: Bytes) -> Result<()> {
        self.channel.send_data(data, DATA_STANDARD).await
    }

    /// Close the standard input of the remote process.
    pub async fn send_eof(&self) -> Result<()> {
        self.channel.send_eof().await
    }

    /// Set an environment variable for the future program (`"env"` request).
    pub fn env(&self, name: &str, value: &[u8]) -> Result<SessionResp> {
        let mut payload = PacketEncode::new();
        payload.put_str(name);
        payload.put_bytes(value);
        self.send_session_request("env", payload.finish())
    }

    /// Request a pseudo-terminal for the future program (`"pty-req"` request).
    pub fn pty_request(&self, request: &PtyRequest) -> Result<SessionResp> {
        // RFC 4254, section 6.2
        let mut payload = PacketEncode::new();
        payload.put_str(&request.term);
        payload.put_u32(request.width);
        payload.put_u32(request.height);
        payload.put_u32(request.width_px);
        payload.put_u32(request.height_px);
        payload.put_bytes(&request.modes.encode());
        self.send_session_request("pty-req", payload.finish())
    }

    /// Execute a command (`"exec"` request).
    pub fn exec(&self, command: &[u8]) -> Result<SessionResp> {
        let mut payload = PacketEncode::new();
        payload.put_bytes(command);
        self.send_session_request("exec", payload.finish())
    }

    /// Start the default shell of the user (`"shell"` request).
    pub fn shell(&self) -> Result<SessionResp> {
        self.send_session_request("shell", Bytes::new())
    }

    /// Start a well-known service, such as `"sftp"` (`"subsystem"` request).
    pub fn subsystem(&self, name: &str) -> Result<SessionResp> {
        let mut payload = PacketEncode::new();
        payload.put_str(name);
        self.send_session_request("subsystem", payload.finish())
    }

    /// Tell the remote process that the terminal size has changed (`"window-change"` request).
    pub fn window_change(&self, change: &WindowChange) -> Result<()> {
        let mut payload = PacketEncode::new();
        payload.put_u32(change.width);
        payload.put_u32(change.height);
        payload.put_u32(change.width_px);
        payload.put_u32(change.height_px);
        self.channel.send_request(ChannelReq {
            request_type: "window-change".into(),
            payload: payload.finish(),
            reply_tx: None,
        })
    }

    /// Deliver a signal to the remote process (`"signal"` request).
    ///
    /// The signal names are listed in [`numbers::signal`][crate::numbers::signal].
    pub fn signal(&self, signal_name: &str) -> Result<()> {
        let mut payload = PacketEncode::new();
        payload.put_str(signal_name);
        self.channel.send_request(ChannelReq {
            request_type: "signal".into(),
            payload: payload.finish(),
            reply_tx: None,
        })
    }

    /// Ask the server to forward X11 connections (`"x11-req"` request).
    ///
    /// After the server accepts, it opens an `"x11"` channel for every connection to the remote
    /// X11 display; these arrive as [`ClientEvent::ChannelOpen`][super::ClientEvent::ChannelOpen].
    pub fn x11_request(
        &self,
        single_connection: bool,
        auth_protocol: &str,
        auth_cookie: &str,
        screen: u32,
    ) -> Result<SessionResp> {
        // RFC 4254, section 6.3.1
        let mut payload = PacketEncode::new();
        payload.put_bool(single_connection);
        payload.put_str(auth_protocol);
        payload.put_str(auth_cookie);
        payload.put_u32(screen);
        self.send_session_request("x11-req", payload.finish())
    }

    /// Ask the server to forward connections to the authentication agent
    /// (`"auth-agent-req@openssh.com"` request).
    ///
    /// Accepted agent connections arrive as `"auth-agent@openssh.com"` channels in
    /// [`ClientEvent::ChannelOpen`][super::ClientEvent::ChannelOpen]; speaking the agent
    /// protocol on them is up to you.
    pub fn auth_agent_request(&self) -> Result<SessionResp> {
        self.send_session_request("auth-agent-req@openssh.com", Bytes::new())
    }

    /// Close the session (see [`Channel::close()`]).
    pub fn close(&self) -> Result<()> {
        self.channel.close()
    }

    fn send_session_request(&self, request_type: &str, payload: Bytes) -> Result<SessionResp> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.channel.send_request(ChannelReq {
            request_type: request_type.into(),
            payload,
            reply_tx: Some(reply_tx),
        })?;
        Ok(SessionResp { reply_rx })
    }
}


/// The reply to a [`Session`] request.
///
/// The request has already been enqueued; use [`want_reply()`][Self::want_reply] to wait until
/// the server confirms it, or [`no_reply()`][Self::no_reply] if you don't care.
#[must_use = "the request fails silently unless you call `want_reply()` or `no_reply()`"]
#[derive(Debug)]
pub struct SessionResp {
    reply_rx: oneshot::Receiver<ChannelReply>,
}

impl SessionResp {
    /// Wait for the reply from the server and fail on [`ChannelReply::Failure`].
    pub async fn want_reply(self) -> Result<()> {
        match self.reply_rx.await {
            Ok(ChannelReply::Success) => Ok(()),
            Ok(ChannelReply::Failure) => Err(Error::ChannelReq),
            Err(_) => Err(Error::ChannelClosed),
        }
    }

    /// Ignore the reply.
    pub fn no_reply(self) {}
}


/// An event returned from [`SessionReceiver`].
///
/// These events correspond to the output and requests of the remote process.
///
/// This enum is marked as `#[non_exhaustive]`, so that we can add new variants without breaking
/// backwards compatibility. It should always be safe to ignore any events that you don't intend
/// to handle.
#[non_exhaustive]
pub enum SessionEvent {
    /// Data from the standard output of the remote process.
    StdoutData(Bytes),

    /// Data from the standard error of the remote process.
    StderrData(Bytes),

    /// The remote process exited with an exit status (`"exit-status"` request).
    ExitStatus(u32),

    /// The remote process was killed by a signal (`"exit-signal"` request).
    ExitSignal(ExitSignal),

    /// The remote process will produce no more output.
    Eof,

    /// Another request from the server that we don't interpret.
    Request(ChannelReq),
}

/// Signal that terminated the remote process (RFC 4254, section 6.10).
#[derive(Debug)]
pub struct ExitSignal {
    /// Name of the signal, without the "SIG" prefix (e.g. `"TERM"`); the names are listed in
    /// [`numbers::signal`][crate::numbers::signal].
    pub signal_name: String,
    /// True if the process dumped core.
    pub core_dumped: bool,
    /// Human-readable error message.
    pub message: String,
    /// Language tag of `message` (per RFC 3066).
    pub message_lang: String,
}

/// Receiving half of a [`Session`].
///
/// [`SessionReceiver`] produces [`SessionEvent`]s. You can ignore these events if you don't
/// need them, but you **must** receive them, otherwise the client will stall when the internal
/// buffer of events fills up.
#[derive(Debug)]
pub struct SessionReceiver {
    channel_rx: ChannelReceiver,
}

impl SessionReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` if the session was closed.
    pub async fn recv(&mut self) -> Result<Option<SessionEvent>> {
        struct Recv<'a> { rx: &'a mut SessionReceiver }
        impl<'a> Future for Recv<'a> {
            type Output = Result<Option<SessionEvent>>;
            fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
                self.rx.poll_recv(cx)
            }
        }
        Recv { rx: self }.await
    }

    /// Poll-friendly variant of [`.recv()`][Self::recv()].
    pub fn poll_recv(&mut self, cx: &mut Context) -> Poll<Result<Option<SessionEvent>>> {
        loop {
            let event = match ready!(self.channel_rx.poll_recv(cx)) {
                Some(ChannelEvent::Data(data, DATA_STANDARD)) =>
                    SessionEvent::StdoutData(data),
                Some(ChannelEvent::Data(data, DATA_STDERR)) =>
                    SessionEvent::StderrData(data),
                Some(ChannelEvent::Data(_, _)) =>
                    continue,
                Some(ChannelEvent::Request(req)) =>
                    match translate_request(req)? {
                        Some(event) => event,
                        None => continue,
                    },
                Some(ChannelEvent::Eof) =>
                    SessionEvent::Eof,
                None =>
                    return Poll::Ready(Ok(None)),
            };
            return Poll::Ready(Ok(Some(event)))
        }
    }
}

fn translate_request(req: ChannelReq) -> Result<Option<SessionEvent>> {
    match req.request_type.as_str() {
        "exit-status" => {
            // RFC 4254, section 6.10
            let mut payload = PacketDecode::new(req.payload.clone());
            let status = payload.get_u32()?;
            if let Some(reply_tx) = req.reply_tx {
                let _ = reply_tx.send(ChannelReply::Success);
            }
            Ok(Some(SessionEvent::ExitStatus(status)))
        },
        "exit-signal" => {
            // RFC 4254, section 6.10
            let mut payload = PacketDecode::new(req.payload.clone());
            let exit_signal = ExitSignal {
                signal_name: payload.get_string()?,
                core_dumped: payload.get_bool()?,
                message: payload.get_string()?,
                message_lang: payload.get_string()?,
            };
            if let Some(reply_tx) = req.reply_tx {
                let _ = reply_tx.send(ChannelReply::Success);
            }
            Ok(Some(SessionEvent::ExitSignal(exit_signal)))
        },
        _ => Ok(Some(SessionEvent::Request(req))),
    }
}


/// Request for a pseudo-terminal (RFC 4254, section 6.2).
#[derive(Debug, Clone)]
pub struct PtyRequest {
    /// Value of the `TERM` environment variable (e.g. `"xterm"`).
    pub term: String,
    /// Width of the terminal in characters.
    pub width: u32,
    /// Height of the terminal in rows.
    pub height: u32,
    /// Width of the terminal in pixels (may be zero).
    pub width_px: u32,
    /// Height of the terminal in pixels (may be zero).
    pub height_px: u32,
    /// Terminal modes.
    pub modes: PtyTerminalModes,
}

impl Default for PtyRequest {
    fn default() -> Self {
        PtyRequest {
            term: "xterm".into(),
            width: 80,
            height: 24,
            width_px: 0,
            height_px: 0,
            modes: PtyTerminalModes::default(),
        }
    }
}

/// Terminal modes for a [`PtyRequest`] (RFC 4254, section 8).
///
/// The opcodes are listed in [`numbers::terminal_mode`][crate::numbers::terminal_mode].
#[derive(Debug, Clone, Default)]
pub struct PtyTerminalModes {
    modes: Vec<(u8, u32)>,
}

impl PtyTerminalModes {
    /// Create an empty set of modes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mode with the given opcode and value.
    ///
    /// The opcode must not be `TTY_OP_END` (0), it is added automatically during encoding.
    pub fn add(&mut self, opcode: u8, value: u32) {
        assert!(opcode != crate::numbers::terminal_mode::TTY_OP_END);
        self.modes.push((opcode, value));
    }

    fn encode(&self) -> Bytes {
        let mut encoded = PacketEncode::new();
        for &(opcode, value) in self.modes.iter() {
            encoded.put_u8(opcode);
            encoded.put_u32(value);
        }
        encoded.put_u8(crate::numbers::terminal_mode::TTY_OP_END);
        encoded.finish()
    }
}

/// Change of the terminal size (RFC 4254, section 6.7).
#[derive(Debug, Clone)]
pub struct WindowChange {
    /// Width of the terminal in characters.
    pub width: u32,
    /// Height of the terminal in rows.
    pub height: u32,
    /// Width of the terminal in pixels (may be zero).
    pub width_px: u32,
    /// Height of the terminal in pixels (may be zero).
    pub height_px: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_modes_encoding() {
        use crate::numbers::terminal_mode;

        let mut modes = PtyTerminalModes::new();
        modes.add(terminal_mode::VINTR, 3);
        modes.add(terminal_mode::TTY_OP_ISPEED, 38400);
        let encoded = modes.encode();
        assert_eq!(encoded.as_ref(), &[
            1, 0, 0, 0, 3,
            128, 0, 0, 0x96, 0,
            0,
        ]);
    }

    #[test]
    fn test_empty_terminal_modes_encoding() {
        let modes = PtyTerminalModes::new();
        assert_eq!(modes.encode().as_ref(), &[0]);
    }
}
