//! Asynchronous SSH-2 client library.
//!
//! The crate implements the client side of the SSH protocol (RFC 4250 to 4254) on top of any
//! [`AsyncRead`][tokio::io::AsyncRead] + [`AsyncWrite`][tokio::io::AsyncWrite] stream: the
//! binary packet transport with negotiated encryption, integrity and compression, key exchange
//! with periodic rekeying, user authentication, and multiplexed channels with flow control
//! (sessions, tunnels and port forwarding).
//!
//! Start with [`Client::open()`].
pub use crate::client::{
    Channel, ChannelReceiver, ChannelEvent, ChannelReq, ChannelReply, ChannelConfig,
    DataType, DATA_STANDARD, DATA_STDERR,
};
pub use crate::client::{Client, ClientReceiver, ClientFuture, ClientConfig, ExecResult};
pub use crate::client::{ClientEvent, DebugMsg, AuthBanner, AcceptPubkeySender, ChannelOpenRequest};
pub use crate::client::{GlobalReq, GlobalReply};
pub use crate::client::{
    AuthFailure, AuthNoneResult, AuthPasswordResult, AuthPasswordPrompt, AuthPubkeyResult,
    AuthKeyboardResult, AuthHostbasedResult, AuthInfoHandler, AuthInfoRequest,
    AuthOptions, PasswordPrompt, ChangePasswordPrompt, HostbasedIdentity,
};
pub use crate::client::{
    Session, SessionReceiver, SessionEvent, SessionResp, ExitSignal,
    PtyRequest, PtyTerminalModes, WindowChange,
};
pub use crate::client::{Tunnel, TunnelReceiver, TunnelEvent, ForwardedTunnel, RemoteForward};
pub use crate::codec::{PacketEncode, PacketDecode};
pub use crate::error::{Result, Error, AlgoNegotiateError, DisconnectError, ChannelOpenError};
pub use crate::msg::AuthInfoPrompt;
pub use crate::pubkey::{Pubkey, Privkey};

pub mod cipher;
pub mod client;
pub mod codec;
pub mod compress;
pub mod error;
pub mod kex;
pub mod mac;
pub mod msg;
pub mod numbers;
pub mod pubkey;
mod util;
