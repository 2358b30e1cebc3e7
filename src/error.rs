use std::fmt;
use crate::numbers::{disconnect, open};

/// Result type for the whole library.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the whole library.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Cryptographic operation failed.
    #[error("cryptography error: {0}")]
    Crypto(&'static str),
    /// Could not generate randomness.
    #[error("randomness error: {0}")]
    Random(&'static str),
    /// The peer sent a packet with an invalid message authentication code.
    #[error("mac verification failed")]
    Mac,
    /// The server signed its key exchange reply with an invalid signature.
    #[error("signature verification failed")]
    Signature,
    /// The user rejected the server public key.
    #[error("server public key was not accepted")]
    PubkeyAccept(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// A public key in an unexpected format was given.
    #[error("unexpected format of public key")]
    PubkeyFormat,
    /// A private key in an unexpected format was given.
    #[error("unexpected format of private key")]
    PrivkeyFormat,
    /// The peer did not follow the SSH protocol.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Received bytes could not be decoded.
    #[error("could not decode bytes: {0}")]
    Decode(&'static str),
    /// A zlib stream could not be processed.
    #[error("compression error: {0}")]
    Compress(&'static str),
    /// We and the server did not agree on a common algorithm.
    #[error("could not negotiate algorithm: {0}")]
    AlgoNegotiate(AlgoNegotiateError),
    /// Received a packet that we do not implement.
    #[error("packet {0} not implemented")]
    PacketNotImplemented(u8),
    /// Another authentication method is already in progress.
    #[error("another authentication method is pending")]
    AuthMethodPending,
    /// The in-flight authentication method was aborted.
    #[error("authentication method was aborted")]
    AuthAborted,
    /// Authentication failed.
    #[error("authentication failed")]
    AuthFailed,
    /// Authentication did not complete within the configured timeout.
    #[error("authentication timed out")]
    AuthTimeout,
    /// Authentication exceeded the configured number of attempts.
    #[error("too many authentication attempts")]
    AuthAttemptsExceeded,
    /// Every authentication method that we could try was rejected.
    #[error("all authentication methods were exhausted")]
    AuthMethodsExhausted,
    /// A keyboard-interactive response did not match the prompts.
    #[error("number of responses does not match number of prompts")]
    AuthInfoMismatch,
    /// The channel is closed.
    #[error("channel is closed")]
    ChannelClosed,
    /// The server rejected our attempt to open a channel.
    #[error("could not open channel: {0}")]
    ChannelOpen(ChannelOpenError),
    /// The server replied with failure to a channel request.
    #[error("channel request failed")]
    ChannelReq,
    /// The server replied with failure to a global request.
    #[error("global request failed")]
    GlobalReq,
    /// The server stopped answering our keepalive requests.
    #[error("server does not answer keepalive requests")]
    KeepaliveTimeout,
    /// Reading from the underlying stream failed.
    #[error("IO error when reading")]
    ReadIo(#[source] std::io::Error),
    /// Writing to the underlying stream failed.
    #[error("IO error when writing")]
    WriteIo(#[source] std::io::Error),
    /// The peer closed the stream without a disconnection message.
    #[error("connection unexpectedly closed by peer")]
    PeerClosed,
    /// The peer disconnected on purpose.
    #[error("peer disconnected: {0}")]
    PeerDisconnected(DisconnectError),
    /// We have already disconnected from the peer.
    #[error("client has already disconnected")]
    ClientDisconnected,
    /// The client object was dropped and the connection is gone.
    #[error("client is closed")]
    ClientClosed,
}

/// Error when the client and the server did not negotiate a common algorithm.
#[derive(Debug, Clone, thiserror::Error)]
#[error("for {algo_name:}, our algos are {our_algos:?}, their algos are {their_algos:?}")]
pub struct AlgoNegotiateError {
    /// Name of the algorithm kind (e.g. "cipher client-to-server").
    pub algo_name: String,
    /// The algorithms that we support.
    pub our_algos: Vec<String>,
    /// The algorithms that the server supports.
    pub their_algos: Vec<String>,
}

/// Error or reason for disconnection (`SSH_MSG_DISCONNECT`).
///
/// The reason codes are listed in [`numbers::disconnect`][crate::numbers::disconnect].
#[derive(Debug, Clone, thiserror::Error)]
pub struct DisconnectError {
    /// Machine-readable reason code.
    pub reason_code: u32,
    /// Human-readable description of the reason.
    pub description: String,
    /// Language tag of `description` (per RFC 3066).
    pub description_lang: String,
}

impl DisconnectError {
    /// A disconnect with reason code `SSH_DISCONNECT_BY_APPLICATION`.
    pub fn by_app() -> DisconnectError {
        DisconnectError {
            reason_code: disconnect::BY_APPLICATION,
            description: "disconnected by application".into(),
            description_lang: "".into(),
        }
    }
}

impl fmt::Display for DisconnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_reason(f, disconnect::to_str(self.reason_code), self.reason_code, &self.description)
    }
}

/// Error when the server rejects our attempt to open a channel
/// (`SSH_MSG_CHANNEL_OPEN_FAILURE`).
///
/// The reason codes are listed in [`numbers::open`][crate::numbers::open].
#[derive(Debug, Clone, thiserror::Error)]
pub struct ChannelOpenError {
    /// Machine-readable reason code.
    pub reason_code: u32,
    /// Human-readable description of the reason.
    pub description: String,
    /// Language tag of `description` (per RFC 3066).
    pub description_lang: String,
}

impl fmt::Display for ChannelOpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt_reason(f, open::to_str(self.reason_code), self.reason_code, &self.description)
    }
}

fn fmt_reason(
    f: &mut fmt::Formatter,
    reason: Option<&'static str>,
    reason_code: u32,
    description: &str,
) -> fmt::Result {
    write!(f, "server returned error ")?;
    if let Some(reason) = reason {
        write!(f, "`{}` ({})", reason, reason_code)?;
    } else {
        write!(f, "{}", reason_code)?;
    }
    if !description.is_empty() {
        write!(f, ": {:?}", description)?;
    }
    Ok(())
}
