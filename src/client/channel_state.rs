use bytes::Bytes;
use futures_core::ready;
use guard::guard;
use parking_lot::Mutex;
use std::cmp::min;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::PollSender;
use crate::error::{Result, Error};
use crate::msg::Msg;
use super::negotiate;
use super::channel::{ChannelEvent, ChannelReq, ChannelReply, DataType};
use super::client_state::{self, ClientState};
use super::flow::WindowController;
use super::pump::Pump;
use super::recv::{ResultRecvState, RecvState};

pub(super) struct ChannelInit {
    pub our_id: u32,
    pub their_id: u32,
    pub event_tx: mpsc::Sender<ChannelEvent>,
    pub send_window: u32,
    pub send_len_max: usize,
    pub recv_window: usize,
    pub recv_window_min: usize,
    pub recv_window_max: usize,
}

pub(super) struct ChannelState {
    our_id: u32,
    their_id: u32,
    want_close: bool,
    close_sent: bool,
    close_recvd: bool,
    closed: bool,
    event_tx: PollSender<ChannelEvent>,
    send_reqs: VecDeque<ChannelReq>,
    send_datas: VecDeque<SendData>,
    recv_replies: VecDeque<RecvReply>,
    reply_queue: VecDeque<oneshot::Receiver<ChannelReply>>,
    send_window: u32,
    recv_window: usize,
    send_len_max: usize,
    flow: WindowController,
}

#[derive(Debug)]
struct SendData {
    data: ChannelSendData,
    sent_tx: oneshot::Sender<()>,
}

#[derive(Debug)]
pub(super) enum ChannelSendData {
    Data(Bytes, DataType),
    Eof,
}

#[derive(Debug)]
struct RecvReply {
    reply_tx: oneshot::Sender<ChannelReply>,
}

pub(super) fn init_channel(init: ChannelInit) -> ChannelState {
    ChannelState {
        our_id: init.our_id,
        their_id: init.their_id,
        want_close: false,
        close_sent: false,
        close_recvd: false,
        closed: false,
        event_tx: PollSender::new(init.event_tx),
        send_reqs: VecDeque::new(),
        send_datas: VecDeque::new(),
        recv_replies: VecDeque::new(),
        reply_queue: VecDeque::new(),
        send_window: init.send_window,
        recv_window: init.recv_window,
        send_len_max: init.send_len_max,
        flow: WindowController::new(
            init.recv_window, init.recv_window_min, init.recv_window_max, Instant::now()),
    }
}

pub(super) fn pump_channel(
    st: &mut ClientState,
    channel_st: &mut ChannelState,
    cx: &mut Context,
) -> Result<Pump> {
    debug_assert!(!channel_st.closed);

    if (channel_st.close_recvd || channel_st.want_close) && !channel_st.close_sent {
        if negotiate::is_ready(st) {
            client_state::send_msg(st, &Msg::ChannelClose { recipient_channel: channel_st.their_id })?;
            log::debug!("sending SSH_MSG_CHANNEL_CLOSE for our channel {}", channel_st.our_id);
            channel_st.close_sent = true;
            return Ok(Pump::Progress)
        }
    }

    if channel_st.close_recvd && channel_st.close_sent {
        channel_st.closed = true;
        channel_st.send_reqs.clear();
        channel_st.send_datas.clear();
        channel_st.recv_replies.clear();
        channel_st.reply_queue.clear();
        return Ok(Pump::Progress)
    }

    if pump_reply_queue(st, channel_st, cx)?.is_progress() {
        return Ok(Pump::Progress)
    }

    if negotiate::is_ready(st) {
        if let Some(req) = channel_st.send_reqs.pop_front() {
            send_channel_request(st, channel_st, &req)?;
            if let Some(reply_tx) = req.reply_tx {
                channel_st.recv_replies.push_back(RecvReply { reply_tx });
            }
            return Ok(Pump::Progress)
        }

        if let Some(mut data) = channel_st.send_datas.pop_front() {
            if send_channel_data(st, channel_st, &mut data.data)? {
                let _ = data.sent_tx.send(());
                return Ok(Pump::Progress)
            } else {
                channel_st.send_datas.push_front(data);
            }
        }

        if let Some(adjust) = channel_st.flow.take_adjust(channel_st.recv_window, Instant::now()) {
            client_state::send_msg(st, &Msg::ChannelWindowAdjust {
                recipient_channel: channel_st.their_id,
                adjust_len: adjust as u32,
            })?;
            channel_st.recv_window += adjust;
            log::trace!("sending SSH_MSG_CHANNEL_WINDOW_ADJUST for our channel {} with {} bytes",
                channel_st.our_id, adjust);
            return Ok(Pump::Progress)
        }
    }

    Ok(Pump::Pending)
}

// replies to requests from the server must go out in request order, so only the head of the
// queue can make progress
fn pump_reply_queue(
    st: &mut ClientState,
    channel_st: &mut ChannelState,
    cx: &mut Context,
) -> Result<Pump> {
    if !negotiate::is_ready(st) {
        return Ok(Pump::Pending)
    }

    guard!{let Some(reply_rx) = channel_st.reply_queue.front_mut() else {
        return Ok(Pump::Pending)
    }};

    let reply = match std::pin::Pin::new(reply_rx).poll(cx) {
        Poll::Ready(Ok(reply)) => reply,
        // the user dropped the reply sender without replying
        Poll::Ready(Err(_)) => ChannelReply::Failure,
        Poll::Pending => return Ok(Pump::Pending),
    };
    channel_st.reply_queue.pop_front();

    log::debug!("sending reply {:?} for our channel {}", reply, channel_st.our_id);
    let msg = match reply {
        ChannelReply::Success => Msg::ChannelSuccess { recipient_channel: channel_st.their_id },
        ChannelReply::Failure => Msg::ChannelFailure { recipient_channel: channel_st.their_id },
    };
    client_state::send_msg(st, &msg)?;
    Ok(Pump::Progress)
}



pub(super) fn send_request(
    st: &mut ClientState,
    channel_st: &mut ChannelState,
    req: ChannelReq,
) -> Result<()> {
    if channel_st.closed {
        return Err(Error::ChannelClosed)
    }
    channel_st.send_reqs.push_back(req);
    client_state::wakeup_client(st);
    Ok(())
}

fn send_channel_request(st: &mut ClientState, channel_st: &ChannelState, req: &ChannelReq) -> Result<()> {
    let msg = Msg::ChannelRequest {
        recipient_channel: channel_st.their_id,
        request_type: req.request_type.clone(),
        want_reply: req.reply_tx.is_some(),
        request_data: req.payload.clone(),
    };
    client_state::send_msg(st, &msg)?;
    log::debug!("sending SSH_MSG_CHANNEL_REQUEST {:?} for our channel {}",
        req.request_type, channel_st.our_id);
    Ok(())
}

pub(super) fn recv_channel_request(
    channel_st: &mut ChannelState,
    channel_mutex: Arc<Mutex<ChannelState>>,
    request_type: String,
    want_reply: bool,
    request_data: Bytes,
) -> ResultRecvState {
    log::debug!("received SSH_MSG_CHANNEL_REQUEST {:?} for our channel {}",
        request_type, channel_st.our_id);

    let reply_tx = if want_reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        channel_st.reply_queue.push_back(reply_rx);
        Some(reply_tx)
    } else {
        None
    };

    let req = ChannelReq { request_type, payload: request_data, reply_tx };
    send_event(channel_mutex, ChannelEvent::Request(req))
}

pub(super) fn recv_channel_success(channel_st: &mut ChannelState) -> ResultRecvState {
    guard!{let Some(reply) = channel_st.recv_replies.pop_front() else {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_SUCCESS, but no reply was expected"))
    }};
    log::debug!("received SSH_MSG_CHANNEL_SUCCESS for our channel {}", channel_st.our_id);
    let _ = reply.reply_tx.send(ChannelReply::Success);
    Ok(None)
}

pub(super) fn recv_channel_failure(channel_st: &mut ChannelState) -> ResultRecvState {
    guard!{let Some(reply) = channel_st.recv_replies.pop_front() else {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_FAILURE, but no reply was expected"))
    }};
    log::debug!("received SSH_MSG_CHANNEL_FAILURE for our channel {}", channel_st.our_id);
    let _ = reply.reply_tx.send(ChannelReply::Failure);
    Ok(None)
}



pub(super) fn send_data(
    st: &mut ClientState,
    channel_st: &mut ChannelState,
    data: ChannelSendData,
) -> Result<impl Future<Output = Result<()>>> {
    if channel_st.closed {
        return Err(Error::ChannelClosed)
    }
    let (sent_tx, sent_rx) = oneshot::channel();
    channel_st.send_datas.push_back(SendData { data, sent_tx });
    client_state::wakeup_client(st);
    Ok(async { sent_rx.await.map_err(|_| Error::ChannelClosed) })
}

fn send_channel_data(st: &mut ClientState, channel_st: &mut ChannelState, data: &mut ChannelSendData) -> Result<bool> {
    match data {
        ChannelSendData::Data(ref mut data, data_type) => {
            if data.is_empty() { return Ok(true) }

            // respect both the flow control window and the maximum packet size of the peer
            let send_len =
                min(data.len(), min(channel_st.send_window as usize, channel_st.send_len_max));
            if send_len == 0 { return Ok(false) }
            let send_data = data.split_to(send_len);

            let msg = match data_type {
                DataType::Standard => {
                    log::trace!("sending SSH_MSG_CHANNEL_DATA for our channel {} with {} bytes",
                        channel_st.our_id, send_data.len());
                    Msg::ChannelData {
                        recipient_channel: channel_st.their_id,
                        data: send_data,
                    }
                },
                DataType::Extended(code) => {
                    log::trace!("sending SSH_MSG_CHANNEL_EXTENDED_DATA for our channel {}, code {}, with {} bytes",
                        channel_st.our_id, code, send_data.len());
                    Msg::ChannelExtendedData {
                        recipient_channel: channel_st.their_id,
                        data_type_code: *code,
                        data: send_data,
                    }
                },
            };
            client_state::send_msg(st, &msg)?;

            channel_st.send_window -= send_len as u32;
            Ok(false)
        },
        ChannelSendData::Eof => {
            client_state::send_msg(st, &Msg::ChannelEof { recipient_channel: channel_st.their_id })?;
            log::debug!("sending SSH_MSG_CHANNEL_EOF for our channel {}", channel_st.our_id);
            Ok(true)
        },
    }
}

pub(super) fn recv_channel_data(
    channel_st: &mut ChannelState,
    channel_mutex: Arc<Mutex<ChannelState>>,
    data: Bytes,
) -> ResultRecvState {
    accept_recv_data(channel_st, data.len())?;
    log::trace!("received SSH_MSG_CHANNEL_DATA for our channel {} with {} bytes",
        channel_st.our_id, data.len());
    send_event(channel_mutex, ChannelEvent::Data(data, DataType::Standard))
}

pub(super) fn recv_channel_extended_data(
    channel_st: &mut ChannelState,
    channel_mutex: Arc<Mutex<ChannelState>>,
    data_type_code: u32,
    data: Bytes,
) -> ResultRecvState {
    accept_recv_data(channel_st, data.len())?;
    log::trace!("received SSH_MSG_CHANNEL_EXTENDED_DATA for our channel {}, code {}, with {} bytes",
        channel_st.our_id, data_type_code, data.len());
    send_event(channel_mutex, ChannelEvent::Data(data, DataType::Extended(data_type_code)))
}

fn accept_recv_data(channel_st: &mut ChannelState, len: usize) -> Result<()> {
    if len > channel_st.recv_window {
        return Err(Error::Protocol("received channel data that exceeds window size"))
    }
    channel_st.recv_window -= len;
    channel_st.flow.on_data(len, channel_st.recv_window, Instant::now());
    Ok(())
}

pub(super) fn recv_channel_eof(
    channel_st: &mut ChannelState,
    channel_mutex: Arc<Mutex<ChannelState>>,
) -> ResultRecvState {
    log::debug!("received SSH_MSG_CHANNEL_EOF for our channel {}", channel_st.our_id);
    send_event(channel_mutex, ChannelEvent::Eof)
}

pub(super) fn recv_channel_window_adjust(
    channel_st: &mut ChannelState,
    adjust: u32,
) -> ResultRecvState {
    // the window is 32 bits on the wire and additions wrap modulo 2^32 (RFC 4254, section 5.2)
    channel_st.send_window = channel_st.send_window.wrapping_add(adjust);
    log::trace!("received SSH_MSG_CHANNEL_WINDOW_ADJUST for our channel {} with {} bytes",
        channel_st.our_id, adjust);
    Ok(None)
}



pub(super) fn close(st: &mut ClientState, channel_st: &mut ChannelState) {
    if !channel_st.want_close {
        channel_st.want_close = true;
        client_state::wakeup_client(st);
    }
}

pub(super) fn recv_channel_close(channel_st: &mut ChannelState) -> ResultRecvState {
    if channel_st.close_recvd {
        return Err(Error::Protocol("received SSH_MSG_CHANNEL_CLOSE twice"))
    }
    log::debug!("received SSH_MSG_CHANNEL_CLOSE for our channel {}", channel_st.our_id);
    channel_st.close_recvd = true;
    Ok(None)
}

pub(super) fn is_closed(channel_st: &ChannelState) -> bool {
    channel_st.closed
}



fn send_event(channel_mutex: Arc<Mutex<ChannelState>>, event: ChannelEvent) -> ResultRecvState {
    struct SendEventState {
        channel_mutex: Arc<Mutex<ChannelState>>,
        event: Option<ChannelEvent>,
    }

    impl RecvState for SendEventState {
        fn poll(&mut self, _st: &mut ClientState, cx: &mut Context) -> Poll<Result<()>> {
            let mut channel_st = self.channel_mutex.lock();
            let reserve_res = ready!(channel_st.event_tx.poll_reserve(cx));
            let event = self.event.take().unwrap();
            if reserve_res.is_ok() {
                let _ = channel_st.event_tx.send_item(event);
            }
            Poll::Ready(Ok(()))
        }
    }

    Ok(Some(Box::new(SendEventState { channel_mutex, event: Some(event) })))
}
