use bytes::Bytes;
use guard::guard;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future as _;
use std::mem::{drop, replace};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, mpsc};
use tokio_util::sync::PollSender;
use crate::codec::PacketDecode;
use crate::error::{Result, ChannelOpenError, Error};
use crate::msg::Msg;
use crate::numbers::open;
use crate::pubkey::Pubkey;
use super::{auth, negotiate, recv};
use super::channel::{Channel, ChannelEvent, ChannelConfig};
use super::channel_state::{self, ChannelState, ChannelInit};
use super::client::{GlobalReq, GlobalReply};
use super::client_event::{AcceptDecision, ClientEvent, ChannelOpenRequest};
use super::client_state::{self, ClientState};
use super::pump::Pump;
use super::recv::ResultRecvState;
use super::tunnel::{ForwardedTunnel, Tunnel, TunnelReceiver};

// outstanding keepalive requests tolerated before the connection is considered dead
const KEEPALIVE_MAX_OUTSTANDING: u32 = 3;
const KEEPALIVE_REQUEST_TYPE: &str = "keepalive@openssh.com";

#[derive(Default)]
pub(super) struct ConnState {
    open_channels: VecDeque<OpenChannel>,
    channels: Arc<Mutex<HashMap<u32, ConnChannelState>>>,
    open_failures: VecDeque<(u32, ChannelOpenError)>,
    send_reqs: VecDeque<GlobalReq>,
    recv_replies: VecDeque<RecvReply>,
    pending_request_failures: u32,
    forwards: HashMap<(String, u32), ForwardRecord>,
    keepalive: KeepaliveState,
}

#[derive(Default)]
struct KeepaliveState {
    interval: Option<tokio::time::Interval>,
    outstanding: u32,
}

enum ConnChannelState {
    Open(OpenChannelState),
    Accept(AcceptChannelState),
    AcceptForward(AcceptForwardState),
    Ready(Arc<Mutex<ChannelState>>),
    Closed,
}

struct OpenChannelState {
    our_id: u32,
    open: OpenChannel,
    open_sent: bool,
}

pub(super) struct OpenChannel {
    pub channel_type: String,
    pub config: ChannelConfig,
    pub open_payload: Bytes,
    pub result_tx: oneshot::Sender<Result<OpenChannelResult>>,
}

pub(super) struct OpenChannelResult {
    pub channel_st: Weak<Mutex<ChannelState>>,
    pub event_rx: mpsc::Receiver<ChannelEvent>,
    pub confirm_payload: Bytes,
}

struct ConfirmChannel {
    their_id: u32,
    send_window: u32,
    send_packet_len_max: usize,
    confirm_payload: Bytes,
}

struct AcceptChannelState {
    our_id: u32,
    their_id: u32,
    send_window: u32,
    send_packet_len_max: usize,
    decision_rx: oneshot::Receiver<AcceptDecision>,
}

/// The channel and its receiver, handed back through
/// [`ChannelOpenRequest::accept()`][super::ChannelOpenRequest::accept].
pub(super) struct AcceptedChannel {
    pub channel_st: Weak<Mutex<ChannelState>>,
    pub event_rx: mpsc::Receiver<ChannelEvent>,
}

struct AcceptForwardState {
    our_id: u32,
    their_id: u32,
    send_window: u32,
    send_packet_len_max: usize,
    forward_key: (String, u32),
    connected_host: String,
    connected_port: u32,
    originator_host: String,
    originator_port: u32,
}

/// A registered remote forward, consulted when the server opens a `forwarded-tcpip` channel.
pub(super) struct ForwardRecord {
    pub config: ChannelConfig,
    pub filter: Option<Box<dyn Fn(&str, u32) -> bool + Send>>,
    pub tunnel_tx: PollSender<ForwardedTunnel>,
}

#[derive(Debug)]
struct RecvReply {
    reply_tx: Option<oneshot::Sender<GlobalReply>>,
    keepalive: bool,
}


pub(super) fn init_conn() -> ConnState {
    ConnState::default()
}

pub(super) fn pump_conn(st: &mut ClientState, cx: &mut Context) -> Result<Pump> {
    if !auth::is_authenticated(st) {
        return Ok(Pump::Pending)
    }

    let mut progress = pump_keepalive(st, cx)?;

    if negotiate::is_ready(st) {
        while st.conn_st.pending_request_failures > 0 {
            client_state::send_msg(st, &Msg::RequestFailure)?;
            st.conn_st.pending_request_failures -= 1;
            log::debug!("sending SSH_MSG_REQUEST_FAILURE for a request we do not handle");
            progress = Pump::Progress;
        }

        while let Some((their_id, error)) = st.conn_st.open_failures.pop_front() {
            send_channel_open_failure(st, their_id, &error)?;
            progress = Pump::Progress;
        }

        if let Some(req) = st.conn_st.send_reqs.pop_front() {
            let keepalive = req.request_type == KEEPALIVE_REQUEST_TYPE;
            let want_reply = req.reply_tx.is_some() || keepalive;
            send_global_request(st, &req, want_reply)?;
            if want_reply {
                st.conn_st.recv_replies.push_back(RecvReply { reply_tx: req.reply_tx, keepalive });
            }
            return Ok(Pump::Progress)
        }
    }

    progress |= pump_channels(st, cx)?;
    Ok(progress)
}

fn pump_keepalive(st: &mut ClientState, cx: &mut Context) -> Result<Pump> {
    guard!{let Some(period) = st.config.keepalive_interval else { return Ok(Pump::Pending) }};

    if st.conn_st.keepalive.interval.is_none() {
        let start = tokio::time::Instant::now() + period;
        st.conn_st.keepalive.interval = Some(tokio::time::interval_at(start, period));
    }

    let mut progress = Pump::Pending;
    while st.conn_st.keepalive.interval.as_mut().unwrap().poll_tick(cx).is_ready() {
        // a healthy server answers long before the next tick; several unanswered keepalives
        // mean that the connection is dead
        if st.conn_st.keepalive.outstanding >= KEEPALIVE_MAX_OUTSTANDING {
            log::debug!("server did not answer {} keepalive requests",
                st.conn_st.keepalive.outstanding);
            return Err(Error::KeepaliveTimeout)
        }

        st.conn_st.keepalive.outstanding += 1;
        st.conn_st.send_reqs.push_back(GlobalReq {
            request_type: KEEPALIVE_REQUEST_TYPE.into(),
            payload: Bytes::new(),
            reply_tx: None,
        });
        progress = Pump::Progress;
    }
    Ok(progress)
}

fn pump_channels(st: &mut ClientState, cx: &mut Context) -> Result<Pump> {
    let channels = st.conn_st.channels.clone();
    let mut channels = channels.lock();
    let mut progress = Pump::Pending;

    while let Some(open) = st.conn_st.open_channels.pop_front() {
        let our_id = alloc_our_id(&channels);
        let open_st = OpenChannelState { our_id, open, open_sent: false };
        channels.insert(our_id, ConnChannelState::Open(open_st));
        progress = Pump::Progress;
    }

    for conn_channel_st in channels.values_mut() {
        while pump_channel(st, conn_channel_st, cx)?.is_progress() {
            progress = Pump::Progress
        }
    }

    // closed channels are removed from the table, which frees their local ids
    channels.retain(|_, conn_channel_st| {
        !matches!(conn_channel_st, ConnChannelState::Closed)
    });

    Ok(progress)
}

fn pump_channel(
    st: &mut ClientState,
    conn_channel_st: &mut ConnChannelState,
    cx: &mut Context,
) -> Result<Pump> {
    let mut progress = Pump::Pending;
    // NOTE: we move out of `*conn_channel_st` here to make the borrow checker happy, remember
    // to restore the state when necessary!
    match replace(conn_channel_st, ConnChannelState::Closed) {
        ConnChannelState::Open(mut open_st) => {
            if !open_st.open_sent && negotiate::is_ready(st) {
                send_channel_open(st, &open_st)?;
                open_st.open_sent = true;
                progress = Pump::Progress;
            }
            *conn_channel_st = ConnChannelState::Open(open_st);
        },
        ConnChannelState::Accept(mut accept_st) => {
            if !negotiate::is_ready(st) {
                *conn_channel_st = ConnChannelState::Accept(accept_st);
                return Ok(progress)
            }

            match Pin::new(&mut accept_st.decision_rx).poll(cx) {
                Poll::Ready(Ok(AcceptDecision::Accept { config, result_tx })) => {
                    send_channel_open_confirmation(st, accept_st.their_id, accept_st.our_id, &config)?;
                    *conn_channel_st = init_accepted_channel(accept_st, config, result_tx);
                    progress = Pump::Progress;
                },
                Poll::Ready(Ok(AcceptDecision::Reject(open_err))) => {
                    send_channel_open_failure(st, accept_st.their_id, &open_err)?;
                    progress = Pump::Progress;
                },
                Poll::Ready(Err(_)) => {
                    send_channel_open_failure(st, accept_st.their_id, &administratively_prohibited())?;
                    progress = Pump::Progress;
                },
                Poll::Pending => {
                    *conn_channel_st = ConnChannelState::Accept(accept_st);
                },
            }
        },
        ConnChannelState::AcceptForward(accept_st) => {
            let (next_st, next_progress) = pump_accept_forward(st, accept_st, cx)?;
            progress = next_progress;
            *conn_channel_st = next_st;
        },
        ConnChannelState::Ready(channel_mutex) => {
            let mut channel_st = channel_mutex.lock();
            if !channel_state::is_closed(&channel_st) {
                progress |= channel_state::pump_channel(st, &mut channel_st, cx)?;
                drop(channel_st);
                *conn_channel_st = ConnChannelState::Ready(channel_mutex);
            }
        },
        ConnChannelState::Closed => {},
    }
    Ok(progress)
}

fn pump_accept_forward(
    st: &mut ClientState,
    mut accept_st: AcceptForwardState,
    cx: &mut Context,
) -> Result<(ConnChannelState, Pump)> {
    if !negotiate::is_ready(st) {
        return Ok((ConnChannelState::AcceptForward(accept_st), Pump::Pending))
    }

    // the forward may have been cancelled while this open was in flight
    if !st.conn_st.forwards.contains_key(&accept_st.forward_key) {
        send_channel_open_failure(st, accept_st.their_id, &administratively_prohibited())?;
        return Ok((ConnChannelState::Closed, Pump::Progress))
    }

    {
        let record = st.conn_st.forwards.get_mut(&accept_st.forward_key).unwrap();
        match record.tunnel_tx.poll_reserve(cx) {
            Poll::Ready(Ok(())) => {},
            Poll::Ready(Err(_)) => {
                // the user dropped the receiving end of the forward
                send_channel_open_failure(st, accept_st.their_id, &administratively_prohibited())?;
                return Ok((ConnChannelState::Closed, Pump::Progress))
            },
            Poll::Pending =>
                return Ok((ConnChannelState::AcceptForward(accept_st), Pump::Pending)),
        }
    }

    let config = st.conn_st.forwards[&accept_st.forward_key].config.clone();
    send_channel_open_confirmation(st, accept_st.their_id, accept_st.our_id, &config)?;

    let (event_tx, event_rx) = mpsc::channel(1);
    let channel_init = ChannelInit {
        our_id: accept_st.our_id,
        their_id: accept_st.their_id,
        event_tx,
        send_window: accept_st.send_window,
        send_len_max: packet_len_max_to_len_max(accept_st.send_packet_len_max),
        recv_window: config.recv_window(),
        recv_window_min: config.recv_window_min(),
        recv_window_max: config.recv_window_max(),
    };
    let channel_st = Arc::new(Mutex::new(channel_state::init_channel(channel_init)));

    let tunnel = ForwardedTunnel {
        connected_host: replace(&mut accept_st.connected_host, String::new()),
        connected_port: accept_st.connected_port,
        originator_host: replace(&mut accept_st.originator_host, String::new()),
        originator_port: accept_st.originator_port,
        tunnel: Tunnel {
            channel: Channel {
                client_st: st.weak_self.clone(),
                channel_st: Arc::downgrade(&channel_st),
            },
        },
        receiver: TunnelReceiver::new(event_rx),
    };

    let record = st.conn_st.forwards.get_mut(&accept_st.forward_key).unwrap();
    let _ = record.tunnel_tx.send_item(tunnel);

    Ok((ConnChannelState::Ready(channel_st), Pump::Progress))
}

pub(super) fn recv_conn_msg(st: &mut ClientState, msg: Msg) -> ResultRecvState {
    // the connection layer does not exist until the user has authenticated (RFC 4252,
    // section 6)
    if !auth::is_authenticated(st) {
        return Err(Error::Protocol("received connection message before authentication"))
    }

    match msg {
        Msg::GlobalRequest { request_type, want_reply, request_data } =>
            recv_global_request(st, request_type, want_reply, request_data),
        Msg::RequestSuccess { response_data } =>
            recv_request_success(st, response_data),
        Msg::RequestFailure =>
            recv_request_failure(st),
        Msg::ChannelOpen { channel_type, sender_channel, initial_window, max_packet_len, open_data } =>
            recv_channel_open(st, channel_type, sender_channel, initial_window, max_packet_len, open_data),
        Msg::ChannelOpenConfirmation { recipient_channel, sender_channel, initial_window, max_packet_len, confirm_data } =>
            recv_channel_open_confirmation(
                st, recipient_channel, sender_channel, initial_window, max_packet_len, confirm_data),
        Msg::ChannelOpenFailure { recipient_channel, reason_code, description, description_lang } =>
            recv_channel_open_failure(st, recipient_channel, ChannelOpenError {
                reason_code, description, description_lang,
            }),
        msg => recv_channel_scoped_msg(st, msg),
    }
}

fn recv_channel_scoped_msg(st: &mut ClientState, msg: Msg) -> ResultRecvState {
    let our_id = match &msg {
        Msg::ChannelWindowAdjust { recipient_channel, .. }
            | Msg::ChannelData { recipient_channel, .. }
            | Msg::ChannelExtendedData { recipient_channel, .. }
            | Msg::ChannelEof { recipient_channel }
            | Msg::ChannelClose { recipient_channel }
            | Msg::ChannelRequest { recipient_channel, .. }
            | Msg::ChannelSuccess { recipient_channel }
            | Msg::ChannelFailure { recipient_channel } => *recipient_channel,
        _ => return Err(Error::PacketNotImplemented(msg.msg_id())),
    };

    let channels = st.conn_st.channels.clone();
    let mut channels = channels.lock();
    guard!{let Some(conn_channel_st) = channels.get_mut(&our_id) else {
        return Err(Error::Protocol("received channel message for unknown channel"));
    }};
    guard!{let ConnChannelState::Ready(channel_mutex) = conn_channel_st else {
        return Err(Error::Protocol("received channel message for a channel that is not ready"));
    }};

    let channel_mutex = channel_mutex.clone();
    let mut channel_st = channel_mutex.lock();
    match msg {
        Msg::ChannelWindowAdjust { adjust_len, .. } =>
            channel_state::recv_channel_window_adjust(&mut channel_st, adjust_len),
        Msg::ChannelData { data, .. } =>
            channel_state::recv_channel_data(&mut channel_st, channel_mutex.clone(), data),
        Msg::ChannelExtendedData { data_type_code, data, .. } =>
            channel_state::recv_channel_extended_data(
                &mut channel_st, channel_mutex.clone(), data_type_code, data),
        Msg::ChannelEof { .. } =>
            channel_state::recv_channel_eof(&mut channel_st, channel_mutex.clone()),
        Msg::ChannelClose { .. } => {
            let res = channel_state::recv_channel_close(&mut channel_st);
            drop(channel_st);
            client_state::wakeup_client(st);
            res
        },
        Msg::ChannelRequest { request_type, want_reply, request_data, .. } =>
            channel_state::recv_channel_request(
                &mut channel_st, channel_mutex.clone(), request_type, want_reply, request_data),
        Msg::ChannelSuccess { .. } =>
            channel_state::recv_channel_success(&mut channel_st),
        Msg::ChannelFailure { .. } =>
            channel_state::recv_channel_failure(&mut channel_st),
        _ => unreachable!(),
    }
}


pub(super) fn open_channel(st: &mut ClientState, open: OpenChannel) {
    st.conn_st.open_channels.push_back(open);
    client_state::wakeup_client(st);
}

// local channel ids come from a dense pool: the smallest unused id is allocated and close
// returns it to the pool
fn alloc_our_id(channels: &HashMap<u32, ConnChannelState>) -> u32 {
    for our_id in 0.. {
        if !channels.contains_key(&our_id) {
            return our_id
        }
    }
    panic!("no free channel ids")
}

fn send_channel_open(st: &mut ClientState, open_st: &OpenChannelState) -> Result<()> {
    let msg = Msg::ChannelOpen {
        channel_type: open_st.open.channel_type.clone(),
        sender_channel: open_st.our_id,
        initial_window: open_st.open.config.recv_window() as u32,
        max_packet_len: open_st.open.config.recv_packet_len_max() as u32,
        open_data: open_st.open.open_payload.clone(),
    };
    client_state::send_msg(st, &msg)?;
    log::debug!("sending SSH_MSG_CHANNEL_OPEN {:?} for our channel {}",
        open_st.open.channel_type, open_st.our_id);
    Ok(())
}

fn recv_channel_open_confirmation(
    st: &mut ClientState,
    our_id: u32,
    their_id: u32,
    send_window: u32,
    send_packet_len_max: u32,
    confirm_payload: Bytes,
) -> ResultRecvState {
    log::debug!("received SSH_MSG_CHANNEL_OPEN_CONFIRMATION for our channel {}, \
        window {}, max packet size {}", our_id, send_window, send_packet_len_max);

    let mut channels = st.conn_st.channels.lock();
    guard!{let Some(conn_channel_st) = channels.get_mut(&our_id) else {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_OPEN_CONFIRMATION for unknown channel"));
    }};

    guard!{let ConnChannelState::Open(_) = conn_channel_st else {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_OPEN_CONFIRMATION \
            for a channel that is not being opened"));
    }};
    // use `replace()` only after we are sure that `*conn_channel_st` is `Open`
    guard!{let ConnChannelState::Open(open_st) = replace(conn_channel_st, ConnChannelState::Closed) else {
        unreachable!()
    }};

    let confirm = ConfirmChannel {
        their_id,
        send_window,
        send_packet_len_max: send_packet_len_max as usize,
        confirm_payload,
    };
    *conn_channel_st = init_confirmed_channel(open_st, confirm);
    Ok(None)
}

fn init_confirmed_channel(
    open_st: OpenChannelState,
    confirm: ConfirmChannel,
) -> ConnChannelState {
    let (event_tx, event_rx) = mpsc::channel(1);
    let config = &open_st.open.config;
    let channel_init = ChannelInit {
        our_id: open_st.our_id,
        their_id: confirm.their_id,
        event_tx,
        send_window: confirm.send_window,
        send_len_max: packet_len_max_to_len_max(confirm.send_packet_len_max),
        recv_window: config.recv_window(),
        recv_window_min: config.recv_window_min(),
        recv_window_max: config.recv_window_max(),
    };

    let channel_st = channel_state::init_channel(channel_init);
    let channel_st = Arc::new(Mutex::new(channel_st));

    let result = OpenChannelResult {
        channel_st: Arc::downgrade(&channel_st),
        event_rx,
        confirm_payload: confirm.confirm_payload,
    };
    let _ = open_st.open.result_tx.send(Ok(result));

    ConnChannelState::Ready(channel_st)
}

fn recv_channel_open_failure(
    st: &mut ClientState,
    our_id: u32,
    error: ChannelOpenError,
) -> ResultRecvState {
    let mut channels = st.conn_st.channels.lock();
    guard!{let Some(conn_channel_st) = channels.get_mut(&our_id) else {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_OPEN_FAILURE for unknown channel"));
    }};
    guard!{let ConnChannelState::Open(_) = conn_channel_st else {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_OPEN_FAILURE \
            for a channel that is not being opened"));
    }};
    // use `replace()` only after we are sure that `*conn_channel_st` is `Open`
    guard!{let ConnChannelState::Open(open_st) = replace(conn_channel_st, ConnChannelState::Closed) else {
        unreachable!()
    }};

    log::debug!("received SSH_MSG_CHANNEL_OPEN_FAILURE for our channel {}", our_id);

    let _ = open_st.open.result_tx.send(Err(Error::ChannelOpen(error)));

    Ok(None)
}



fn recv_channel_open(
    st: &mut ClientState,
    channel_type: String,
    their_id: u32,
    send_window: u32,
    send_packet_len_max: u32,
    open_data: Bytes,
) -> ResultRecvState {
    log::debug!("received SSH_MSG_CHANNEL_OPEN {:?}, their channel {}", channel_type, their_id);

    match channel_type.as_str() {
        "forwarded-tcpip" =>
            recv_channel_open_forward(st, their_id, send_window, send_packet_len_max, open_data),
        "x11" | "auth-agent@openssh.com" =>
            recv_channel_open_event(st, channel_type, their_id, send_window, send_packet_len_max, open_data),
        _ => {
            let error = ChannelOpenError {
                reason_code: open::UNKNOWN_CHANNEL_TYPE,
                description: "unknown channel type".into(),
                description_lang: "".into(),
            };
            st.conn_st.open_failures.push_back((their_id, error));
            client_state::wakeup_client(st);
            Ok(None)
        },
    }
}

fn recv_channel_open_forward(
    st: &mut ClientState,
    their_id: u32,
    send_window: u32,
    send_packet_len_max: u32,
    open_data: Bytes,
) -> ResultRecvState {
    // RFC 4254, section 7.2
    let mut open_data = PacketDecode::new(open_data);
    let connected_host = open_data.get_string()?;
    let connected_port = open_data.get_u32()?;
    let originator_host = open_data.get_string()?;
    let originator_port = open_data.get_u32()?;

    let forward_key = (connected_host.clone(), connected_port);
    let error = match st.conn_st.forwards.get(&forward_key) {
        None => Some(ChannelOpenError {
            reason_code: open::UNKNOWN_CHANNEL_TYPE,
            description: "unknown channel type".into(),
            description_lang: "".into(),
        }),
        Some(record) => match record.filter.as_ref() {
            Some(filter) if !filter(&originator_host, originator_port) =>
                Some(administratively_prohibited()),
            _ => None,
        },
    };

    if let Some(error) = error {
        log::debug!("refusing forwarded-tcpip channel for {:?}: {}", forward_key, error);
        st.conn_st.open_failures.push_back((their_id, error));
        client_state::wakeup_client(st);
        return Ok(None)
    }

    let mut channels = st.conn_st.channels.lock();
    let our_id = alloc_our_id(&channels);
    let accept_st = AcceptForwardState {
        our_id,
        their_id,
        send_window,
        send_packet_len_max: send_packet_len_max as usize,
        forward_key,
        connected_host,
        connected_port,
        originator_host,
        originator_port,
    };
    channels.insert(our_id, ConnChannelState::AcceptForward(accept_st));
    drop(channels);

    client_state::wakeup_client(st);
    Ok(None)
}

fn recv_channel_open_event(
    st: &mut ClientState,
    channel_type: String,
    their_id: u32,
    send_window: u32,
    send_packet_len_max: u32,
    open_data: Bytes,
) -> ResultRecvState {
    let mut channels = st.conn_st.channels.lock();
    let our_id = alloc_our_id(&channels);
    let (accept_tx, decision_rx) = oneshot::channel();
    let accept_st = AcceptChannelState {
        our_id,
        their_id,
        send_window,
        send_packet_len_max: send_packet_len_max as usize,
        decision_rx,
    };
    channels.insert(our_id, ConnChannelState::Accept(accept_st));
    drop(channels);

    let open_request = ChannelOpenRequest {
        channel_type,
        open_data,
        client_st: st.weak_self.clone(),
        accept_tx,
    };

    client_state::wakeup_client(st);
    recv::send_event(ClientEvent::ChannelOpen(open_request))
}

fn init_accepted_channel(
    accept_st: AcceptChannelState,
    config: ChannelConfig,
    result_tx: oneshot::Sender<AcceptedChannel>,
) -> ConnChannelState {
    let (event_tx, event_rx) = mpsc::channel(1);
    let channel_init = ChannelInit {
        our_id: accept_st.our_id,
        their_id: accept_st.their_id,
        event_tx,
        send_window: accept_st.send_window,
        send_len_max: packet_len_max_to_len_max(accept_st.send_packet_len_max),
        recv_window: config.recv_window(),
        recv_window_min: config.recv_window_min(),
        recv_window_max: config.recv_window_max(),
    };

    let channel_st = channel_state::init_channel(channel_init);
    let channel_st = Arc::new(Mutex::new(channel_st));

    let _ = result_tx.send(AcceptedChannel {
        channel_st: Arc::downgrade(&channel_st),
        event_rx,
    });

    ConnChannelState::Ready(channel_st)
}

fn send_channel_open_confirmation(
    st: &mut ClientState,
    their_id: u32,
    our_id: u32,
    config: &ChannelConfig,
) -> Result<()> {
    let msg = Msg::ChannelOpenConfirmation {
        recipient_channel: their_id,
        sender_channel: our_id,
        initial_window: config.recv_window() as u32,
        max_packet_len: config.recv_packet_len_max() as u32,
        confirm_data: Bytes::new(),
    };
    client_state::send_msg(st, &msg)?;
    log::debug!("sending SSH_MSG_CHANNEL_OPEN_CONFIRMATION for our channel {}", our_id);
    Ok(())
}

fn send_channel_open_failure(
    st: &mut ClientState,
    their_id: u32,
    error: &ChannelOpenError,
) -> Result<()> {
    let msg = Msg::ChannelOpenFailure {
        recipient_channel: their_id,
        reason_code: error.reason_code,
        description: error.description.clone(),
        description_lang: error.description_lang.clone(),
    };
    client_state::send_msg(st, &msg)?;
    log::debug!("sending SSH_MSG_CHANNEL_OPEN_FAILURE for their channel {}, reason: {}",
        their_id, open::to_str(error.reason_code).unwrap_or("unknown"));
    Ok(())
}

fn administratively_prohibited() -> ChannelOpenError {
    ChannelOpenError {
        reason_code: open::ADMINISTRATIVELY_PROHIBITED,
        description: "administratively prohibited".into(),
        description_lang: "".into(),
    }
}



pub(super) fn send_request(st: &mut ClientState, req: GlobalReq) -> Result<()> {
    st.conn_st.send_reqs.push_back(req);
    client_state::wakeup_client(st);
    Ok(())
}

fn send_global_request(st: &mut ClientState, req: &GlobalReq, want_reply: bool) -> Result<()> {
    let msg = Msg::GlobalRequest {
        request_type: req.request_type.clone(),
        want_reply,
        request_data: req.payload.clone(),
    };
    client_state::send_msg(st, &msg)?;
    log::debug!("sending SSH_MSG_GLOBAL_REQUEST {:?}", req.request_type);
    Ok(())
}

fn recv_request_success(st: &mut ClientState, response_data: Bytes) -> ResultRecvState {
    // global requests do not carry ids: replies are correlated to requests strictly in order
    guard!{let Some(reply) = st.conn_st.recv_replies.pop_front() else {
        return Err(Error::Protocol("received SSH_MSG_REQUEST_SUCCESS, but no reply was expected"))
    }};
    log::debug!("received SSH_MSG_REQUEST_SUCCESS");
    if reply.keepalive {
        st.conn_st.keepalive.outstanding = st.conn_st.keepalive.outstanding.saturating_sub(1);
    }
    if let Some(reply_tx) = reply.reply_tx {
        let _ = reply_tx.send(GlobalReply::Success(response_data));
    }
    Ok(None)
}

fn recv_request_failure(st: &mut ClientState) -> ResultRecvState {
    guard!{let Some(reply) = st.conn_st.recv_replies.pop_front() else {
        return Err(Error::Protocol("received SSH_MSG_REQUEST_FAILURE, but no reply was expected"))
    }};
    log::debug!("received SSH_MSG_REQUEST_FAILURE");
    if reply.keepalive {
        // OpenSSH answers unknown keepalive requests with a failure, which still proves that
        // the connection is alive
        st.conn_st.keepalive.outstanding = st.conn_st.keepalive.outstanding.saturating_sub(1);
    }
    if let Some(reply_tx) = reply.reply_tx {
        let _ = reply_tx.send(GlobalReply::Failure);
    }
    Ok(None)
}

fn recv_global_request(
    st: &mut ClientState,
    request_type: String,
    want_reply: bool,
    request_data: Bytes,
) -> ResultRecvState {
    log::debug!("received SSH_MSG_GLOBAL_REQUEST {:?}", request_type);

    if request_type == "hostkeys-00@openssh.com" {
        // we never prove possession of the keys, so a reply is refused
        if want_reply {
            st.conn_st.pending_request_failures += 1;
            client_state::wakeup_client(st);
        }
        return recv_host_keys(request_data)
    }

    if want_reply {
        st.conn_st.pending_request_failures += 1;
        client_state::wakeup_client(st);
    }
    Ok(None)
}

fn recv_host_keys(request_data: Bytes) -> ResultRecvState {
    let mut request_data = PacketDecode::new(request_data);
    let mut pubkeys = Vec::new();
    while request_data.remaining_len() > 0 {
        let blob = request_data.get_bytes()?;
        match Pubkey::decode(blob) {
            Ok(pubkey) => pubkeys.push(pubkey),
            Err(err) => log::debug!("ignoring a host key that we cannot decode: {}", err),
        }
    }

    log::debug!("server announced {} host keys", pubkeys.len());
    recv::send_event(ClientEvent::HostKeysUpdated(pubkeys))
}



pub(super) fn register_forward(st: &mut ClientState, bind_host: String, bind_port: u32, record: ForwardRecord) {
    st.conn_st.forwards.insert((bind_host, bind_port), record);
}

pub(super) fn unregister_forward(st: &mut ClientState, bind_host: &str, bind_port: u32) -> bool {
    st.conn_st.forwards.remove(&(bind_host.to_string(), bind_port)).is_some()
}



fn packet_len_max_to_len_max(packet_len_max: usize) -> usize {
    // the SSH specification is unclear about the exact semantics of the 'maximum packet size'
    // field in SSH_MSG_CHANNEL_OPEN and SSH_MSG_CHANNEL_OPEN_CONFIRMATION. does it limit only
    // the size of the data? size of the data plus the length field? size of the whole packet
    // payload? size of the packet including padding? including MAC tag? including the "packet
    // length" field?
    //
    // for this reason, we are conservative and limit the size of data chunks that we send to a
    // lower value than given by the peer.
    usize::max(packet_len_max, 200) - 100
}
