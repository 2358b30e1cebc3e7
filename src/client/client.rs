use bytes::{Bytes, BytesMut, BufMut as _};
use parking_lot::Mutex;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use crate::{cipher, compress, kex, mac, pubkey};
use crate::cipher::CipherAlgo;
use crate::codec::{PacketDecode, PacketEncode};
use crate::compress::CompressAlgo;
use crate::error::{Error, Result, DisconnectError};
use crate::kex::KexAlgo;
use crate::mac::MacAlgo;
use crate::pubkey::{Privkey, Pubkey, PubkeyAlgo};
use super::auth;
use super::auth_flow::{self, AuthOptions};
use super::auth_method::hostbased::{AuthHostbased, AuthHostbasedResult, HostbasedIdentity};
use super::auth_method::keyboard_interactive::{
    AuthKeyboardInteractive, AuthKeyboardResult, AuthInfoHandler,
};
use super::auth_method::none::{AuthNone, AuthNoneResult};
use super::auth_method::password::{AuthPassword, AuthPasswordResult};
use super::auth_method::pubkey::{AuthPubkey, AuthPubkeyResult, CheckPubkey};
use super::channel::{Channel, ChannelConfig, ChannelReceiver};
use super::client_event::ClientEvent;
use super::client_state::{self, ClientState};
use super::conn::{self, ForwardRecord, OpenChannel};
use super::session::{ExitSignal, Session, SessionEvent, SessionReceiver};
use super::tunnel::{ForwardedTunnel, RemoteForward, Tunnel, TunnelReceiver};

/// Configuration of a [`Client`].
///
/// You should start from the [default][Default] instance, which has reasonable default
/// configuration, and modify it according to your needs. You may also find the method
/// [`ClientConfig::with()`] syntactically convenient.
///
/// The default algorithm lists prefer modern algorithms but keep the legacy ones at the end,
/// so the client can talk to old servers out of the box. This struct is `#[non_exhaustive]`,
/// so we may add more fields without breaking backward compatibility.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Our identification string (without the trailing CRLF).
    pub ident: String,

    /// Key exchange algorithms, in order of preference.
    pub kex_algos: Vec<&'static KexAlgo>,

    /// Server public key algorithms, in order of preference.
    pub server_pubkey_algos: Vec<&'static PubkeyAlgo>,

    /// Encryption algorithms (both directions), in order of preference.
    pub cipher_algos: Vec<&'static CipherAlgo>,

    /// Message authentication algorithms (both directions), in order of preference.
    pub mac_algos: Vec<&'static MacAlgo>,

    /// Compression algorithms (both directions), in order of preference.
    pub compress_algos: Vec<&'static CompressAlgo>,

    /// Rekey after this many bytes have been sent or received with one set of keys.
    pub rekey_bytes_limit: u64,

    /// Rekey after this many packets have been sent or received with one set of keys.
    pub rekey_packets_limit: u64,

    /// Send a `keepalive@openssh.com` request every interval once authenticated.
    ///
    /// If several keepalives in a row stay unanswered, the connection fails with
    /// [`Error::KeepaliveTimeout`]. `None` disables keepalives.
    pub keepalive_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            ident: "SSH-2.0-hawser".into(),
            kex_algos: vec![
                &kex::CURVE25519_SHA256_LIBSSH, &kex::CURVE25519_SHA256,
                &kex::ECDH_SHA2_NISTP521, &kex::ECDH_SHA2_NISTP384, &kex::ECDH_SHA2_NISTP256,
                &kex::DIFFIE_HELLMAN_GROUP16_SHA512, &kex::DIFFIE_HELLMAN_GROUP14_SHA256,
                &kex::DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA256,
                &kex::DIFFIE_HELLMAN_GROUP14_SHA1,
                &kex::DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA1,
                &kex::DIFFIE_HELLMAN_GROUP1_SHA1,
            ],
            server_pubkey_algos: vec![
                &pubkey::SSH_ED25519,
                &pubkey::ECDSA_SHA2_NISTP256, &pubkey::ECDSA_SHA2_NISTP384,
                &pubkey::ECDSA_SHA2_NISTP521,
                &pubkey::RSA_SHA2_512, &pubkey::RSA_SHA2_256,
                &pubkey::SSH_RSA_SHA1,
            ],
            cipher_algos: vec![
                &cipher::AES128_CTR, &cipher::AES192_CTR, &cipher::AES256_CTR,
                &cipher::AES128_GCM, &cipher::AES256_GCM, &cipher::CHACHA20_POLY1305,
                &cipher::AES128_CBC, &cipher::AES192_CBC, &cipher::AES256_CBC,
                &cipher::TDES_CBC,
            ],
            mac_algos: vec![
                &mac::HMAC_SHA2_512, &mac::HMAC_SHA2_256,
                &mac::HMAC_SHA1, &mac::HMAC_SHA1_96, &mac::HMAC_MD5,
            ],
            compress_algos: vec![
                &compress::NONE, &compress::ZLIB, &compress::ZLIB_OPENSSH,
            ],
            rekey_bytes_limit: 1 << 30,
            rekey_packets_limit: 1 << 31,
            keepalive_interval: None,
        }
    }
}

impl ClientConfig {
    /// Update the configuration in pseudo-builder pattern style.
    ///
    /// This method applies your closure to `self` and returns the mutated configuration.
    pub fn with<F: FnOnce(&mut Self)>(mut self, f: F) -> Self {
        f(&mut self);
        self
    }
}


/// Handle to an SSH connection.
///
/// Use this object to send requests to the server. In tandem, you will also need to use
/// [`ClientReceiver`] to handle events that we receive from the server, and [`ClientFuture`] to
/// perform the actual I/O.
///
/// To connect to a server, pass your I/O stream (such as a `tokio::net::TcpStream`) to
/// [`Client::open()`], spawn the returned [`ClientFuture`], handle the events from
/// [`ClientReceiver`] (at the very least the
/// [`ServerPubkey`][ClientEvent::ServerPubkey] event), and authenticate with one of the
/// `auth_*` methods or with [`authenticate()`][Self::authenticate]. Afterwards you can open
/// sessions and tunnels.
///
/// You can cheaply clone this object and safely share the clones between tasks.
#[derive(Clone)]
pub struct Client {
    pub(super) client_st: Weak<Mutex<ClientState>>,
}

impl Client {
    /// Create an SSH connection on top of `stream`.
    ///
    /// The connection is not performed by this call: all I/O happens in the returned
    /// [`ClientFuture`], which you must poll to completion (most likely by spawning a task for
    /// it).
    pub fn open<IO>(stream: IO, config: ClientConfig) -> Result<(Client, ClientReceiver, ClientFuture<IO>)>
        where IO: AsyncRead + AsyncWrite
    {
        let rng = Box::new(rand::rngs::OsRng);
        let (event_tx, event_rx) = mpsc::channel(1);
        let client_st = client_state::new_client(config, rng, event_tx)?;
        let client_st = Arc::new(Mutex::new(client_st));
        client_st.lock().weak_self = Arc::downgrade(&client_st);

        let client = Client { client_st: Arc::downgrade(&client_st) };
        let client_rx = ClientReceiver { event_rx };
        let client_fut = ClientFuture { client_st, stream };
        Ok((client, client_rx, client_fut))
    }

    fn upgrade(&self) -> Result<Arc<Mutex<ClientState>>> {
        self.client_st.upgrade().ok_or(Error::ClientClosed)
    }

    /// Try to authenticate using the "none" method.
    ///
    /// Most servers reject this method, but the failure lists the methods that can continue,
    /// so this is a cheap way to probe the server.
    pub async fn auth_none(&self, username: String) -> Result<AuthNoneResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = AuthNone::new(username, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)
    }

    /// Try to authenticate using the "password" method.
    ///
    /// Note that the caller is responsible for checking that the transport is encrypted and
    /// authenticated before sending a password; [`authenticate()`][Self::authenticate] does
    /// this for you.
    pub async fn auth_password(&self, username: String, password: String) -> Result<AuthPasswordResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = AuthPassword::new(username, password, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)
    }

    /// Try to authenticate using the "password" method, asking the server to change the
    /// password at the same time.
    ///
    /// Use this when a previous password authentication returned
    /// [`AuthPasswordResult::ChangePassword`].
    pub async fn auth_password_change(
        &self,
        username: String,
        old_password: String,
        new_password: String,
    ) -> Result<AuthPasswordResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = AuthPassword::new_change(username, old_password, new_password, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)
    }

    /// Try to authenticate using the "publickey" method.
    ///
    /// The `pubkey_algo` must be compatible with the `privkey`.
    pub async fn auth_pubkey(
        &self,
        username: String,
        privkey: Privkey,
        pubkey_algo: &'static PubkeyAlgo,
    ) -> Result<AuthPubkeyResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = AuthPubkey::new(username, privkey, pubkey_algo, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)?
    }

    /// Ask the server whether authentication with a public key would be acceptable, without
    /// signing anything.
    pub async fn check_pubkey(
        &self,
        username: String,
        pubkey: &Pubkey,
        pubkey_algo: &'static PubkeyAlgo,
    ) -> Result<bool> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = CheckPubkey::new(username, pubkey, pubkey_algo, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)
    }

    /// Try to authenticate using the "keyboard-interactive" method (RFC 4256).
    ///
    /// The `handler` is called for every set of prompts that the server sends.
    pub async fn auth_keyboard_interactive(
        &self,
        username: String,
        handler: AuthInfoHandler,
    ) -> Result<AuthKeyboardResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = AuthKeyboardInteractive::new(username, String::new(), handler, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)?
    }

    /// Try to authenticate using the "hostbased" method (RFC 4252, section 9).
    pub async fn auth_hostbased(
        &self,
        username: String,
        identity: HostbasedIdentity,
    ) -> Result<AuthHostbasedResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let method = AuthHostbased::new(username, identity, result_tx);
        auth::start_method(&mut self.upgrade()?.lock(), Box::new(method))?;
        result_rx.await.map_err(|_| Error::AuthAborted)?
    }

    /// Authenticate by trying the available methods in order of preference.
    ///
    /// This drives the whole authentication dialog: it discovers the methods that the server
    /// accepts with a "none" request, intersects them with the credentials in `options`, and
    /// tries method after method until the server accepts us, applying the attempt cap and
    /// timeout from `options`. See [`AuthOptions`] for details.
    pub async fn authenticate(&self, username: String, options: AuthOptions) -> Result<()> {
        auth_flow::authenticate(self, username, options).await
    }

    /// Check whether the server has authenticated us.
    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(auth::is_authenticated(&self.upgrade()?.lock()))
    }

    /// Wait until the server has authenticated us.
    pub async fn authenticated(&self) -> Result<()> {
        let mut success_rx = auth::subscribe_success(&self.upgrade()?.lock());
        loop {
            if *success_rx.borrow() {
                return Ok(())
            }
            success_rx.changed().await.map_err(|_| Error::ClientClosed)?;
        }
    }

    /// Open an SSH channel (low level API).
    ///
    /// All connection operations wait until authentication has completed. On success you
    /// receive the channel handle, its receiver and the type-specific bytes from the
    /// `SSH_MSG_CHANNEL_OPEN_CONFIRMATION`.
    pub async fn open_channel(
        &self,
        channel_type: String,
        config: ChannelConfig,
        open_payload: Bytes,
    ) -> Result<(Channel, ChannelReceiver, Bytes)> {
        self.authenticated().await?;

        let (result_tx, result_rx) = oneshot::channel();
        let open = OpenChannel { channel_type, config, open_payload, result_tx };
        conn::open_channel(&mut self.upgrade()?.lock(), open);

        let result = result_rx.await.map_err(|_| Error::ChannelClosed)??;

        let channel = Channel {
            client_st: self.client_st.clone(),
            channel_st: result.channel_st,
        };
        let channel_rx = ChannelReceiver { event_rx: result.event_rx };
        Ok((channel, channel_rx, result.confirm_payload))
    }

    /// Open a session to execute a program or a subsystem.
    pub async fn open_session(&self, config: ChannelConfig) -> Result<(Session, SessionReceiver)> {
        Session::open(self, config).await
    }

    /// Execute a command and collect its output.
    ///
    /// This is a convenience on top of [`open_session()`][Self::open_session]: it requests an
    /// `"exec"`, buffers stdout and stderr and waits until the remote process finishes.
    pub async fn exec(&self, command: &[u8]) -> Result<ExecResult> {
        let (session, mut session_rx) = self.open_session(ChannelConfig::default()).await?;
        session.exec(command)?.want_reply().await?;
        session.send_eof().await?;

        let mut stdout = BytesMut::new();
        let mut stderr = BytesMut::new();
        let mut exit_status = None;
        let mut exit_signal = None;
        while let Some(event) = session_rx.recv().await? {
            match event {
                SessionEvent::StdoutData(data) => stdout.put(data),
                SessionEvent::StderrData(data) => stderr.put(data),
                SessionEvent::ExitStatus(status) => exit_status = Some(status),
                SessionEvent::ExitSignal(signal) => exit_signal = Some(signal),
                SessionEvent::Eof => { session.close()?; },
                _ => {},
            }
        }

        Ok(ExecResult { stdout: stdout.freeze(), stderr: stderr.freeze(), exit_status, exit_signal })
    }

    /// Open a session and start the `"sftp"` subsystem on it.
    ///
    /// The SFTP protocol itself is not part of this crate: speak it over the returned session
    /// (the subsystem data flows as standard channel data).
    pub async fn sftp(&self) -> Result<(Session, SessionReceiver)> {
        let (session, session_rx) = self.open_session(ChannelConfig::default()).await?;
        session.subsystem("sftp")?.want_reply().await?;
        Ok((session, session_rx))
    }

    /// Ask the server to connect to `connect_addr` and tunnel the connection to us
    /// ("local forwarding", `"direct-tcpip"` channel).
    ///
    /// `originator_addr` is reported to the server as the origin of the connection.
    pub async fn connect_tunnel(
        &self,
        config: ChannelConfig,
        connect_addr: (String, u16),
        originator_addr: (String, u16),
    ) -> Result<(Tunnel, TunnelReceiver)> {
        Tunnel::connect(self, config, connect_addr, originator_addr).await
    }

    /// Ask the server to listen on `bind_addr` and tunnel accepted connections to us
    /// ("remote forwarding", RFC 4254, section 7.1).
    ///
    /// Bind host `""` means "listen on all addresses", port 0 means "pick a port"; the port
    /// that the server actually bound is in the returned [`RemoteForward`]. The `filter`, if
    /// given, decides per originator `(host, port)` whether a connection is accepted; rejected
    /// connections are refused as administratively prohibited. Accepted connections arrive on
    /// the returned receiver.
    pub async fn forward_remote(
        &self,
        bind_addr: (String, u16),
        filter: Option<Box<dyn Fn(&str, u32) -> bool + Send>>,
        config: ChannelConfig,
    ) -> Result<(RemoteForward, mpsc::Receiver<ForwardedTunnel>)> {
        self.authenticated().await?;

        let mut payload = PacketEncode::new();
        payload.put_str(&bind_addr.0);
        payload.put_u32(bind_addr.1 as u32);
        let reply = self.global_request_with_reply("tcpip-forward", payload.finish()).await?;

        let response_data = match reply {
            GlobalReply::Success(response_data) => response_data,
            GlobalReply::Failure => return Err(Error::GlobalReq),
        };

        // when we bind port 0, the server tells us the port it chose
        let bind_port = if bind_addr.1 == 0 {
            PacketDecode::new(response_data).get_u32()?
        } else {
            bind_addr.1 as u32
        };

        let (tunnel_tx, tunnel_rx) = mpsc::channel(1);
        let record = ForwardRecord {
            config,
            filter,
            tunnel_tx: tokio_util::sync::PollSender::new(tunnel_tx),
        };
        conn::register_forward(&mut self.upgrade()?.lock(), bind_addr.0.clone(), bind_port, record);

        let forward = RemoteForward { bind_host: bind_addr.0, bind_port };
        Ok((forward, tunnel_rx))
    }

    /// Cancel a remote forward created with [`forward_remote()`][Self::forward_remote].
    pub async fn cancel_forward_remote(&self, forward: &RemoteForward) -> Result<()> {
        let mut payload = PacketEncode::new();
        payload.put_str(&forward.bind_host);
        payload.put_u32(forward.bind_port);
        let reply = self.global_request_with_reply("cancel-tcpip-forward", payload.finish()).await;

        conn::unregister_forward(&mut self.upgrade()?.lock(), &forward.bind_host, forward.bind_port);

        match reply? {
            GlobalReply::Success(_) => Ok(()),
            GlobalReply::Failure => Err(Error::GlobalReq),
        }
    }

    /// Check that the server still responds, using a `keepalive@openssh.com` global request.
    ///
    /// A reply of either polarity proves that the connection is alive (OpenSSH answers the
    /// unknown request with a failure).
    pub async fn ping(&self) -> Result<()> {
        self.authenticated().await?;
        match self.global_request_with_reply("keepalive@openssh.com", Bytes::new()).await {
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Send a global request (low level API).
    ///
    /// Use [`GlobalReq::reply_tx`] to receive the reply; the server answers global requests
    /// strictly in order.
    pub fn send_global_request(&self, req: GlobalReq) -> Result<()> {
        conn::send_request(&mut self.upgrade()?.lock(), req)
    }

    async fn global_request_with_reply(&self, request_type: &str, payload: Bytes) -> Result<GlobalReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_global_request(GlobalReq {
            request_type: request_type.into(),
            payload,
            reply_tx: Some(reply_tx),
        })?;
        reply_rx.await.map_err(|_| Error::ClientClosed)
    }

    /// True if both directions of the transport use a real cipher and a real MAC (or an AEAD
    /// cipher). The ["password" method][Self::auth_password] should not be used otherwise.
    pub fn transport_is_protected(&self) -> Result<bool> {
        let st = self.upgrade()?;
        let st = st.lock();
        Ok(st.has_confidentiality && st.has_mac_protection)
    }

    /// Disconnect from the server.
    ///
    /// The [`ClientFuture`] resolves once the disconnection message has been written and
    /// flushed; all in-flight operations fail.
    pub fn disconnect(&self, error: DisconnectError) -> Result<()> {
        client_state::disconnect(&mut self.upgrade()?.lock(), error)
    }
}

/// Output of one command executed with [`Client::exec()`].
#[derive(Debug)]
pub struct ExecResult {
    /// Collected standard output of the command.
    pub stdout: Bytes,
    /// Collected standard error of the command.
    pub stderr: Bytes,
    /// The exit status, if the remote process exited normally.
    pub exit_status: Option<u32>,
    /// The signal that killed the remote process, if any.
    pub exit_signal: Option<ExitSignal>,
}


/// A global request (low level API).
///
/// This corresponds to `SSH_MSG_GLOBAL_REQUEST` (RFC 4254, section 4).
pub struct GlobalReq {
    /// The type of the request, such as `"tcpip-forward"`.
    pub request_type: String,
    /// The raw type-specific request data.
    pub payload: Bytes,
    /// Sender for the reply; if `Some`, the request is sent with `want reply`.
    pub reply_tx: Option<oneshot::Sender<GlobalReply>>,
}

/// Reply to a [`GlobalReq`] (low level API).
#[derive(Debug)]
pub enum GlobalReply {
    /// Successful reply (`SSH_MSG_REQUEST_SUCCESS`) with its type-specific data.
    Success(Bytes),
    /// Failure reply (`SSH_MSG_REQUEST_FAILURE`).
    Failure,
}


/// Receiving half of a [`Client`].
///
/// [`ClientReceiver`] produces [`ClientEvent`]s. You **must** receive these events, otherwise
/// the client will stall when the internal buffer of events fills up, and you must respond to
/// the [`ServerPubkey`][ClientEvent::ServerPubkey] event, otherwise the key exchange will never
/// complete.
pub struct ClientReceiver {
    event_rx: mpsc::Receiver<ClientEvent>,
}

impl ClientReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` if the connection was closed.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.event_rx.recv().await
    }

    /// Poll-friendly variant of [`.recv()`][Self::recv()].
    pub fn poll_recv(&mut self, cx: &mut Context) -> Poll<Option<ClientEvent>> {
        self.event_rx.poll_recv(cx)
    }
}


/// Future that performs the I/O of an SSH connection.
///
/// You must poll this future to completion, most likely by spawning a task for it. It resolves
/// when the connection is disconnected (with `Ok` after a clean disconnect, with an error
/// otherwise).
#[pin_project]
pub struct ClientFuture<IO> {
    client_st: Arc<Mutex<ClientState>>,
    #[pin] stream: IO,
}

impl<IO> Future for ClientFuture<IO>
    where IO: AsyncRead + AsyncWrite
{
    type Output = Result<()>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<()>> {
        let this = self.project();
        let mut client_st = this.client_st.lock();
        client_state::poll_client(&mut client_st, this.stream, cx)
    }
}
