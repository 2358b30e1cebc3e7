use futures_core::ready;
use std::task::{Context, Poll};
use crate::codec::RecvPacket;
use crate::error::{Error, Result, DisconnectError};
use crate::msg::{Msg, MsgCx};
use super::{auth, conn, ext, negotiate};
use super::client_event::{ClientEvent, DebugMsg};
use super::client_state::{self, ClientState};
use super::pump::Pump;

pub(super) trait RecvState {
    fn poll(&mut self, st: &mut ClientState, cx: &mut Context) -> Poll<Result<()>>;
}

pub(super) type ResultRecvState = Result<Option<Box<dyn RecvState + Send>>>;

pub(super) fn pump_recv(st: &mut ClientState, cx: &mut Context) -> Result<Pump> {
    match st.recv_st.take() {
        Some(mut recv_st) => match recv_st.poll(st, cx) {
            Poll::Ready(Ok(())) => Ok(Pump::Progress),
            Poll::Ready(Err(err)) => Err(err),
            Poll::Pending => {
                st.recv_st = Some(recv_st);
                Ok(Pump::Pending)
            },
        },
        None => Ok(Pump::Pending),
    }
}


pub(super) fn recv_packet(st: &mut ClientState, packet: RecvPacket) -> ResultRecvState {
    let msg_cx = MsgCx {
        kex: negotiate::kex_family(st),
        auth: auth::method_kind(st),
    };

    let msg = match Msg::decode(packet.payload.clone(), msg_cx) {
        Ok(msg) => msg,
        Err(Error::PacketNotImplemented(msg_id)) => return not_implemented(st, msg_id, &packet),
        Err(err) => return Err(err),
    };

    log::trace!("received packet {}", msg.msg_id());
    recv_msg_dispatch(st, msg, packet)
}

fn recv_msg_dispatch(st: &mut ClientState, msg: Msg, packet: RecvPacket) -> ResultRecvState {
    match msg {
        Msg::Disconnect { .. } => recv_disconnect(msg),
        Msg::Ignore { .. } => Ok(None),
        Msg::Unimplemented { packet_seq } => {
            log::debug!("received SSH_MSG_UNIMPLEMENTED for packet seq {}", packet_seq);
            Ok(None)
        },
        Msg::Debug { always_display, message, message_lang } => {
            let debug_msg = DebugMsg { always_display, message, message_lang };
            send_event(ClientEvent::DebugMsg(debug_msg))
        },
        Msg::ServiceAccept { service } => recv_service_accept(st, service),
        Msg::ExtInfo { extensions } => ext::recv_ext_info(st, extensions),

        Msg::KexInit(kex_init) =>
            negotiate::recv_kex_init(st, kex_init, packet.payload),
        Msg::NewKeys =>
            negotiate::recv_new_keys(st),
        Msg::KexEcdhInit { .. } | Msg::KexEcdhReply { .. }
            | Msg::KexDhInit { .. } | Msg::KexDhReply { .. }
            | Msg::KexGexRequestOld { .. } | Msg::KexGexRequest { .. }
            | Msg::KexGexGroup { .. } | Msg::KexGexInit { .. } | Msg::KexGexReply { .. } =>
            negotiate::recv_kex_msg(st, msg),

        Msg::UserauthFailure { .. } | Msg::UserauthSuccess | Msg::UserauthBanner { .. }
            | Msg::UserauthPkOk { .. } | Msg::UserauthPasswdChangereq { .. }
            | Msg::UserauthInfoRequest { .. } =>
            auth::recv_auth_msg(st, msg),

        Msg::GlobalRequest { .. } | Msg::RequestSuccess { .. } | Msg::RequestFailure
            | Msg::ChannelOpen { .. } | Msg::ChannelOpenConfirmation { .. }
            | Msg::ChannelOpenFailure { .. } | Msg::ChannelWindowAdjust { .. }
            | Msg::ChannelData { .. } | Msg::ChannelExtendedData { .. }
            | Msg::ChannelEof { .. } | Msg::ChannelClose { .. } | Msg::ChannelRequest { .. }
            | Msg::ChannelSuccess { .. } | Msg::ChannelFailure { .. } =>
            conn::recv_conn_msg(st, msg),

        _ => Err(Error::PacketNotImplemented(msg.msg_id())),
    }
}

fn recv_disconnect(msg: Msg) -> ResultRecvState {
    let Msg::Disconnect { reason_code, description, description_lang } = msg
        else { unreachable!() };
    let disconnect = DisconnectError { reason_code, description, description_lang };
    log::debug!("received SSH_MSG_DISCONNECT: {:?}", disconnect);
    Err(Error::PeerDisconnected(disconnect))
}

fn recv_service_accept(st: &mut ClientState, service: String) -> ResultRecvState {
    if service == "ssh-userauth" {
        auth::recv_service_accept(st)
    } else {
        log::debug!("received SSH_MSG_SERVICE_ACCEPT for unknown service {:?}", service);
        Ok(None)
    }
}

pub(super) fn send_event(event: ClientEvent) -> ResultRecvState {
    struct SendEventState {
        event: Option<ClientEvent>,
    }

    impl RecvState for SendEventState {
        fn poll(&mut self, st: &mut ClientState, cx: &mut Context) -> Poll<Result<()>> {
            let reserve_res = ready!(st.event_tx.poll_reserve(cx));
            let event = self.event.take().unwrap();
            if reserve_res.is_ok() {
                let _ = st.event_tx.send_item(event);
            }
            Poll::Ready(Ok(()))
        }
    }

    Ok(Some(Box::new(SendEventState { event: Some(event) })))
}

fn not_implemented(st: &mut ClientState, msg_id: u8, packet: &RecvPacket) -> ResultRecvState {
    log::debug!("received unimplemented packet {}, seq {}", msg_id, packet.packet_seq);
    let reply = Msg::Unimplemented { packet_seq: packet.packet_seq };
    client_state::send_msg(st, &reply)?;
    Ok(None)
}
