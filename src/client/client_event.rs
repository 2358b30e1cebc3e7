use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Weak;
use tokio::sync::oneshot;
use crate::error::{Result, Error, ChannelOpenError};
use crate::pubkey::Pubkey;
use super::channel::{Channel, ChannelReceiver, ChannelConfig};
use super::client_state::ClientState;
use super::conn::AcceptedChannel;

/// An event from the server, received from [`ClientReceiver`][super::ClientReceiver].
///
/// This enum is marked as `#[non_exhaustive]`, so that we can add new variants without breaking
/// backwards compatibility. It should always be safe to ignore any events that you don't intend
/// to handle, with one exception: when you receive [`ServerPubkey`][Self::ServerPubkey], you
/// must decide whether to accept or reject the key, otherwise the connection will not proceed.
#[non_exhaustive]
pub enum ClientEvent {
    /// The server sent its public key and we must verify it.
    ///
    /// This event corresponds to the `verify_host_key` step of the key exchange: call
    /// [`AcceptPubkeySender::accept()`] if you trust the key (e.g. after checking it against
    /// your known-hosts store), or [`AcceptPubkeySender::reject()`] to abort the connection.
    /// The event is repeated on every rekeying.
    ServerPubkey(Pubkey, AcceptPubkeySender),

    /// The server sent a debugging message (`SSH_MSG_DEBUG`).
    DebugMsg(DebugMsg),

    /// The server sent an authentication banner (`SSH_MSG_USERAUTH_BANNER`).
    ///
    /// The text has been [sanitized][super::sanitize_banner]: it is safe to display it to the
    /// user, but it must never be used to steer program logic.
    AuthBanner(AuthBanner),

    /// The server asks us to open a channel (`SSH_MSG_CHANNEL_OPEN`).
    ///
    /// This is used for channel types such as `"x11"` and `"auth-agent@openssh.com"`, which the
    /// server opens after we have requested the corresponding forwarding on a session.
    /// Channels of type `"forwarded-tcpip"` are matched to their
    /// [`RemoteForward`][super::RemoteForward] internally and are not surfaced here.
    ChannelOpen(ChannelOpenRequest),

    /// The server announced its current host keys (`hostkeys-00@openssh.com`).
    ///
    /// OpenSSH sends this global request after authentication so that clients can update their
    /// known-hosts stores when the server rotates its keys. Keys in unknown formats are
    /// skipped.
    HostKeysUpdated(Vec<Pubkey>),
}

/// Debugging message sent by the server (`SSH_MSG_DEBUG`).
#[derive(Debug)]
pub struct DebugMsg {
    /// If true, the server asks us to display the message to the user.
    pub always_display: bool,
    /// The message text.
    pub message: String,
    /// Language tag of `message` (per RFC 3066).
    pub message_lang: String,
}

/// Authentication banner sent by the server (RFC 4252, section 5.4).
#[derive(Debug)]
pub struct AuthBanner {
    /// The sanitized banner text.
    pub message: String,
    /// Language tag of `message` (per RFC 3066).
    pub message_lang: String,
}


/// Object for accepting or rejecting the server public key.
#[derive(Debug)]
pub struct AcceptPubkeySender {
    pub(super) accept_tx: oneshot::Sender<Result<PubkeyAccepted>>,
}

#[derive(Debug)]
pub(super) struct PubkeyAccepted(());

impl AcceptPubkeySender {
    /// Accept the server public key and continue the key exchange.
    pub fn accept(self) {
        let _ = self.accept_tx.send(Ok(PubkeyAccepted(())));
    }

    /// Reject the server public key and abort the connection with your error.
    pub fn reject<E: std::error::Error + Send + Sync + 'static>(self, err: E) {
        let _ = self.accept_tx.send(Err(Error::PubkeyAccept(Box::new(err))));
    }
}


/// A channel that the server asks us to open.
///
/// Call [`accept()`][Self::accept] to confirm the channel or [`reject()`][Self::reject] to
/// refuse it. If you drop this object without deciding, we refuse the channel as
/// administratively prohibited.
pub struct ChannelOpenRequest {
    /// The channel type, such as `"x11"` or `"auth-agent@openssh.com"`.
    pub channel_type: String,
    /// Raw type-specific data from the `SSH_MSG_CHANNEL_OPEN` packet.
    pub open_data: Bytes,
    pub(super) client_st: Weak<Mutex<ClientState>>,
    pub(super) accept_tx: oneshot::Sender<AcceptDecision>,
}

pub(super) enum AcceptDecision {
    Accept {
        config: ChannelConfig,
        result_tx: oneshot::Sender<AcceptedChannel>,
    },
    Reject(ChannelOpenError),
}

impl ChannelOpenRequest {
    /// Accept the channel and obtain its handle and receiver.
    pub async fn accept(self, config: ChannelConfig) -> Result<(Channel, ChannelReceiver)> {
        let client_st = self.client_st.clone();
        let (result_tx, result_rx) = oneshot::channel();
        self.accept_tx.send(AcceptDecision::Accept { config, result_tx })
            .map_err(|_| Error::ClientClosed)?;

        let accepted = result_rx.await.map_err(|_| Error::ChannelClosed)?;
        let channel = Channel {
            client_st,
            channel_st: accepted.channel_st,
        };
        let channel_rx = ChannelReceiver { event_rx: accepted.event_rx };
        Ok((channel, channel_rx))
    }

    /// Reject the channel with the given reason.
    ///
    /// The reason codes are listed in [`numbers::open`][crate::numbers::open].
    pub fn reject(self, error: ChannelOpenError) {
        let _ = self.accept_tx.send(AcceptDecision::Reject(error));
    }
}
