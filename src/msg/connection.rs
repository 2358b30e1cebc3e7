use crate::codec::{PacketDecode, PacketEncode};
use crate::error::{Error, Result};
use crate::numbers::msg;
use super::{Msg, expect_end};

pub(super) fn decode(msg_id: u8, p: &mut PacketDecode) -> Result<Msg> {
    match msg_id {
        msg::GLOBAL_REQUEST => {
            Ok(Msg::GlobalRequest {
                request_type: p.get_string()?,
                want_reply: p.get_bool()?,
                request_data: p.remaining(),
            })
        },
        msg::REQUEST_SUCCESS => {
            Ok(Msg::RequestSuccess { response_data: p.remaining() })
        },
        msg::REQUEST_FAILURE => {
            expect_end(p)?;
            Ok(Msg::RequestFailure)
        },
        msg::CHANNEL_OPEN => {
            Ok(Msg::ChannelOpen {
                channel_type: p.get_string()?,
                sender_channel: p.get_u32()?,
                initial_window: p.get_u32()?,
                max_packet_len: p.get_u32()?,
                open_data: p.remaining(),
            })
        },
        msg::CHANNEL_OPEN_CONFIRMATION => {
            Ok(Msg::ChannelOpenConfirmation {
                recipient_channel: p.get_u32()?,
                sender_channel: p.get_u32()?,
                initial_window: p.get_u32()?,
                max_packet_len: p.get_u32()?,
                confirm_data: p.remaining(),
            })
        },
        msg::CHANNEL_OPEN_FAILURE => {
            let m = Msg::ChannelOpenFailure {
                recipient_channel: p.get_u32()?,
                reason_code: p.get_u32()?,
                description: p.get_string()?,
                description_lang: p.get_string()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_WINDOW_ADJUST => {
            let m = Msg::ChannelWindowAdjust {
                recipient_channel: p.get_u32()?,
                adjust_len: p.get_u32()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_DATA => {
            let m = Msg::ChannelData {
                recipient_channel: p.get_u32()?,
                data: p.get_bytes()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_EXTENDED_DATA => {
            let m = Msg::ChannelExtendedData {
                recipient_channel: p.get_u32()?,
                data_type_code: p.get_u32()?,
                data: p.get_bytes()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_EOF => {
            let m = Msg::ChannelEof { recipient_channel: p.get_u32()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_CLOSE => {
            let m = Msg::ChannelClose { recipient_channel: p.get_u32()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_REQUEST => {
            Ok(Msg::ChannelRequest {
                recipient_channel: p.get_u32()?,
                request_type: p.get_string()?,
                want_reply: p.get_bool()?,
                request_data: p.remaining(),
            })
        },
        msg::CHANNEL_SUCCESS => {
            let m = Msg::ChannelSuccess { recipient_channel: p.get_u32()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::CHANNEL_FAILURE => {
            let m = Msg::ChannelFailure { recipient_channel: p.get_u32()? };
            expect_end(p)?;
            Ok(m)
        },
        _ => Err(Error::PacketNotImplemented(msg_id)),
    }
}

pub(super) fn encode(m: &Msg, p: &mut PacketEncode) {
    match m {
        Msg::GlobalRequest { request_type, want_reply, request_data } => {
            p.put_str(request_type);
            p.put_bool(*want_reply);
            p.put_raw(request_data);
        },
        Msg::RequestSuccess { response_data } => p.put_raw(response_data),
        Msg::RequestFailure => {},
        Msg::ChannelOpen { channel_type, sender_channel, initial_window, max_packet_len, open_data } => {
            p.put_str(channel_type);
            p.put_u32(*sender_channel);
            p.put_u32(*initial_window);
            p.put_u32(*max_packet_len);
            p.put_raw(open_data);
        },
        Msg::ChannelOpenConfirmation {
            recipient_channel, sender_channel, initial_window, max_packet_len, confirm_data,
        } => {
            p.put_u32(*recipient_channel);
            p.put_u32(*sender_channel);
            p.put_u32(*initial_window);
            p.put_u32(*max_packet_len);
            p.put_raw(confirm_data);
        },
        Msg::ChannelOpenFailure { recipient_channel, reason_code, description, description_lang } => {
            p.put_u32(*recipient_channel);
            p.put_u32(*reason_code);
            p.put_str(description);
            p.put_str(description_lang);
        },
        Msg::ChannelWindowAdjust { recipient_channel, adjust_len } => {
            p.put_u32(*recipient_channel);
            p.put_u32(*adjust_len);
        },
        Msg::ChannelData { recipient_channel, data } => {
            p.put_u32(*recipient_channel);
            p.put_bytes(data);
        },
        Msg::ChannelExtendedData { recipient_channel, data_type_code, data } => {
            p.put_u32(*recipient_channel);
            p.put_u32(*data_type_code);
            p.put_bytes(data);
        },
        Msg::ChannelEof { recipient_channel } => p.put_u32(*recipient_channel),
        Msg::ChannelClose { recipient_channel } => p.put_u32(*recipient_channel),
        Msg::ChannelRequest { recipient_channel, request_type, want_reply, request_data } => {
            p.put_u32(*recipient_channel);
            p.put_str(request_type);
            p.put_bool(*want_reply);
            p.put_raw(request_data);
        },
        Msg::ChannelSuccess { recipient_channel } => p.put_u32(*recipient_channel),
        Msg::ChannelFailure { recipient_channel } => p.put_u32(*recipient_channel),
        _ => unreachable!("message is not a connection message"),
    }
}
