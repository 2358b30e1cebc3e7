//! Catalog of SSH protocol messages.
//!
//! Every packet payload starts with a message id byte and the rest of the payload is determined
//! by the id (RFC 4253, section 6). The ids are grouped into ranges: 1 to 19 for the transport
//! layer, 20 to 29 for algorithm negotiation, 30 to 49 for the key exchange method, 50 to 59
//! for authentication, 60 to 79 for the authentication method, 80 to 89 for the connection
//! layer and 90 to 127 for channels.
//!
//! The ids in the ranges 30 to 49 and 60 to 79 are reused between methods: what id 30 or id 60
//! means depends on what the connection is currently doing. [`Msg::decode()`] therefore takes a
//! [`MsgCx`] with the negotiated key exchange family and the authentication method in flight.
use bytes::Bytes;
use num_bigint_dig::BigUint;
use crate::codec::{PacketDecode, PacketEncode};
use crate::error::{Error, Result};

pub use self::userauth::{AuthInfoPrompt};

mod connection;
mod transport;
mod userauth;

/// A decoded SSH message.
///
/// This is a closed sum of every message that the client can send or receive. Messages that
/// carry method-specific or type-specific data (such as `SSH_MSG_CHANNEL_REQUEST`) keep that
/// data as unparsed [`Bytes`], to be decoded by the component that understands the type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Msg {
    // transport layer protocol (RFC 4253)
    Disconnect { reason_code: u32, description: String, description_lang: String },
    Ignore { data: Bytes },
    Unimplemented { packet_seq: u32 },
    Debug { always_display: bool, message: String, message_lang: String },
    ServiceRequest { service: String },
    ServiceAccept { service: String },
    ExtInfo { extensions: Vec<(String, Bytes)> },
    KexInit(KexInitMsg),
    NewKeys,

    // ECDH key exchange (RFC 5656), also used for curve25519 (RFC 8731)
    KexEcdhInit { client_eph_pubkey: Bytes },
    KexEcdhReply { server_pubkey: Bytes, server_eph_pubkey: Bytes, exchange_hash_sign: Bytes },

    // finite field Diffie-Hellman key exchange (RFC 4253, section 8)
    KexDhInit { e: BigUint },
    KexDhReply { server_pubkey: Bytes, f: BigUint, exchange_hash_sign: Bytes },

    // Diffie-Hellman group exchange (RFC 4419)
    KexGexRequestOld { n: u32 },
    KexGexRequest { min: u32, n: u32, max: u32 },
    KexGexGroup { p: BigUint, g: BigUint },
    KexGexInit { e: BigUint },
    KexGexReply { server_pubkey: Bytes, f: BigUint, exchange_hash_sign: Bytes },

    // authentication protocol (RFC 4252)
    UserauthRequest { username: String, service: String, method: String, method_data: Bytes },
    UserauthFailure { methods_can_continue: Vec<String>, partial_success: bool },
    UserauthSuccess,
    UserauthBanner { message: String, message_lang: String },
    UserauthPkOk { pubkey_algo_name: String, pubkey: Bytes },
    UserauthPasswdChangereq { prompt: String, prompt_lang: String },
    UserauthInfoRequest {
        name: String,
        instruction: String,
        language_tag: String,
        prompts: Vec<AuthInfoPrompt>,
    },
    UserauthInfoResponse { responses: Vec<String> },

    // connection protocol (RFC 4254)
    GlobalRequest { request_type: String, want_reply: bool, request_data: Bytes },
    RequestSuccess { response_data: Bytes },
    RequestFailure,
    ChannelOpen {
        channel_type: String,
        sender_channel: u32,
        initial_window: u32,
        max_packet_len: u32,
        open_data: Bytes,
    },
    ChannelOpenConfirmation {
        recipient_channel: u32,
        sender_channel: u32,
        initial_window: u32,
        max_packet_len: u32,
        confirm_data: Bytes,
    },
    ChannelOpenFailure {
        recipient_channel: u32,
        reason_code: u32,
        description: String,
        description_lang: String,
    },
    ChannelWindowAdjust { recipient_channel: u32, adjust_len: u32 },
    ChannelData { recipient_channel: u32, data: Bytes },
    ChannelExtendedData { recipient_channel: u32, data_type_code: u32, data: Bytes },
    ChannelEof { recipient_channel: u32 },
    ChannelClose { recipient_channel: u32 },
    ChannelRequest {
        recipient_channel: u32,
        request_type: String,
        want_reply: bool,
        request_data: Bytes,
    },
    ChannelSuccess { recipient_channel: u32 },
    ChannelFailure { recipient_channel: u32 },
}

/// Payload of `SSH_MSG_KEXINIT` (RFC 4253, section 7.1).
#[derive(Debug, Clone, PartialEq)]
pub struct KexInitMsg {
    pub cookie: [u8; 16],
    pub kex_algos: Vec<String>,
    pub server_pubkey_algos: Vec<String>,
    pub cipher_algos_cts: Vec<String>,
    pub cipher_algos_stc: Vec<String>,
    pub mac_algos_cts: Vec<String>,
    pub mac_algos_stc: Vec<String>,
    pub compress_algos_cts: Vec<String>,
    pub compress_algos_stc: Vec<String>,
    pub languages_cts: Vec<String>,
    pub languages_stc: Vec<String>,
    pub first_kex_packet_follows: bool,
}

/// Key exchange message family for decoding the overloaded ids 30 to 49.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KexFamily {
    /// `SSH_MSG_KEX_ECDH_*` (RFC 5656).
    Ecdh,
    /// `SSH_MSG_KEXDH_*` (RFC 4253, section 8).
    DiffieHellman,
    /// `SSH_MSG_KEX_DH_GEX_*` (RFC 4419).
    DiffieHellmanGex,
}

/// Authentication method for decoding the overloaded ids 60 to 79.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthMethodKind {
    None,
    Password,
    Pubkey,
    KeyboardInteractive,
    Hostbased,
}

/// Decoding context for the overloaded message id ranges.
///
/// The SSH wire format reuses ids 30 to 49 between key exchange methods and ids 60 to 79
/// between authentication methods, so the decoder must know what the connection is doing.
#[derive(Debug, Copy, Clone, Default)]
pub struct MsgCx {
    /// The key exchange family in progress, if any.
    pub kex: Option<KexFamily>,
    /// The authentication method in flight, if any.
    pub auth: Option<AuthMethodKind>,
}

impl Msg {
    /// Decode a packet payload.
    pub fn decode(payload: Bytes, cx: MsgCx) -> Result<Msg> {
        let mut payload = PacketDecode::new(payload);
        let msg_id = payload.get_u8()?;
        match msg_id {
            1..=49 => transport::decode(msg_id, &mut payload, cx),
            50..=79 => userauth::decode(msg_id, &mut payload, cx),
            80..=127 => connection::decode(msg_id, &mut payload),
            _ => Err(Error::PacketNotImplemented(msg_id)),
        }
    }

    /// Encode the message into a packet payload.
    pub fn encode(&self) -> Bytes {
        let mut payload = PacketEncode::new();
        payload.put_u8(self.msg_id());
        match self.msg_id() {
            1..=49 => transport::encode(self, &mut payload),
            50..=79 => userauth::encode(self, &mut payload),
            _ => connection::encode(self, &mut payload),
        }
        payload.finish()
    }

    /// The message id of the first payload byte.
    pub fn msg_id(&self) -> u8 {
        use crate::numbers::msg;
        match self {
            Msg::Disconnect { .. } => msg::DISCONNECT,
            Msg::Ignore { .. } => msg::IGNORE,
            Msg::Unimplemented { .. } => msg::UNIMPLEMENTED,
            Msg::Debug { .. } => msg::DEBUG,
            Msg::ServiceRequest { .. } => msg::SERVICE_REQUEST,
            Msg::ServiceAccept { .. } => msg::SERVICE_ACCEPT,
            Msg::ExtInfo { .. } => msg::EXT_INFO,
            Msg::KexInit(_) => msg::KEXINIT,
            Msg::NewKeys => msg::NEWKEYS,
            Msg::KexEcdhInit { .. } => msg::KEX_ECDH_INIT,
            Msg::KexEcdhReply { .. } => msg::KEX_ECDH_REPLY,
            Msg::KexDhInit { .. } => msg::KEXDH_INIT,
            Msg::KexDhReply { .. } => msg::KEXDH_REPLY,
            Msg::KexGexRequestOld { .. } => msg::KEX_DH_GEX_REQUEST_OLD,
            Msg::KexGexRequest { .. } => msg::KEX_DH_GEX_REQUEST,
            Msg::KexGexGroup { .. } => msg::KEX_DH_GEX_GROUP,
            Msg::KexGexInit { .. } => msg::KEX_DH_GEX_INIT,
            Msg::KexGexReply { .. } => msg::KEX_DH_GEX_REPLY,
            Msg::UserauthRequest { .. } => msg::USERAUTH_REQUEST,
            Msg::UserauthFailure { .. } => msg::USERAUTH_FAILURE,
            Msg::UserauthSuccess => msg::USERAUTH_SUCCESS,
            Msg::UserauthBanner { .. } => msg::USERAUTH_BANNER,
            Msg::UserauthPkOk { .. } => msg::USERAUTH_PK_OK,
            Msg::UserauthPasswdChangereq { .. } => msg::USERAUTH_PASSWD_CHANGEREQ,
            Msg::UserauthInfoRequest { .. } => msg::USERAUTH_INFO_REQUEST,
            Msg::UserauthInfoResponse { .. } => msg::USERAUTH_INFO_RESPONSE,
            Msg::GlobalRequest { .. } => msg::GLOBAL_REQUEST,
            Msg::RequestSuccess { .. } => msg::REQUEST_SUCCESS,
            Msg::RequestFailure => msg::REQUEST_FAILURE,
            Msg::ChannelOpen { .. } => msg::CHANNEL_OPEN,
            Msg::ChannelOpenConfirmation { .. } => msg::CHANNEL_OPEN_CONFIRMATION,
            Msg::ChannelOpenFailure { .. } => msg::CHANNEL_OPEN_FAILURE,
            Msg::ChannelWindowAdjust { .. } => msg::CHANNEL_WINDOW_ADJUST,
            Msg::ChannelData { .. } => msg::CHANNEL_DATA,
            Msg::ChannelExtendedData { .. } => msg::CHANNEL_EXTENDED_DATA,
            Msg::ChannelEof { .. } => msg::CHANNEL_EOF,
            Msg::ChannelClose { .. } => msg::CHANNEL_CLOSE,
            Msg::ChannelRequest { .. } => msg::CHANNEL_REQUEST,
            Msg::ChannelSuccess { .. } => msg::CHANNEL_SUCCESS,
            Msg::ChannelFailure { .. } => msg::CHANNEL_FAILURE,
        }
    }
}

/// Check that a fixed-grammar message has no trailing bytes.
fn expect_end(payload: &PacketDecode) -> Result<()> {
    if payload.remaining_len() == 0 {
        Ok(())
    } else {
        Err(Error::Decode("unexpected trailing bytes in packet"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Msg, cx: MsgCx) {
        let encoded = msg.encode();
        let decoded = Msg::decode(encoded, cx).unwrap();
        assert_eq!(msg, decoded);
    }

    fn b(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_roundtrip_transport() {
        let cx = MsgCx::default();
        roundtrip(Msg::Disconnect {
            reason_code: 11,
            description: "bye".into(),
            description_lang: "".into(),
        }, cx);
        roundtrip(Msg::Ignore { data: b(b"padding") }, cx);
        roundtrip(Msg::Unimplemented { packet_seq: 42 }, cx);
        roundtrip(Msg::Debug {
            always_display: true,
            message: "hello".into(),
            message_lang: "en".into(),
        }, cx);
        roundtrip(Msg::ServiceRequest { service: "ssh-userauth".into() }, cx);
        roundtrip(Msg::ServiceAccept { service: "ssh-userauth".into() }, cx);
        roundtrip(Msg::ExtInfo {
            extensions: vec![("server-sig-algs".into(), b(b"ssh-ed25519,rsa-sha2-256"))],
        }, cx);
        roundtrip(Msg::NewKeys, cx);
    }

    #[test]
    fn test_roundtrip_kex_init() {
        roundtrip(Msg::KexInit(KexInitMsg {
            cookie: [7; 16],
            kex_algos: names(&["curve25519-sha256@libssh.org", "diffie-hellman-group14-sha256"]),
            server_pubkey_algos: names(&["ssh-ed25519"]),
            cipher_algos_cts: names(&["aes128-ctr"]),
            cipher_algos_stc: names(&["aes128-ctr"]),
            mac_algos_cts: names(&["hmac-sha2-256"]),
            mac_algos_stc: names(&["hmac-sha2-256"]),
            compress_algos_cts: names(&["none"]),
            compress_algos_stc: names(&["none"]),
            languages_cts: names(&[]),
            languages_stc: names(&[]),
            first_kex_packet_follows: false,
        }), MsgCx::default());
    }

    #[test]
    fn test_roundtrip_kex_methods() {
        let ecdh = MsgCx { kex: Some(KexFamily::Ecdh), auth: None };
        roundtrip(Msg::KexEcdhInit { client_eph_pubkey: b(b"Q_C") }, ecdh);
        roundtrip(Msg::KexEcdhReply {
            server_pubkey: b(b"K_S"),
            server_eph_pubkey: b(b"Q_S"),
            exchange_hash_sign: b(b"sig"),
        }, ecdh);

        let dh = MsgCx { kex: Some(KexFamily::DiffieHellman), auth: None };
        roundtrip(Msg::KexDhInit { e: BigUint::from(0xdeadbeefu32) }, dh);
        roundtrip(Msg::KexDhReply {
            server_pubkey: b(b"K_S"),
            f: BigUint::from(0xcafeu32),
            exchange_hash_sign: b(b"sig"),
        }, dh);

        let gex = MsgCx { kex: Some(KexFamily::DiffieHellmanGex), auth: None };
        roundtrip(Msg::KexGexRequestOld { n: 2048 }, gex);
        roundtrip(Msg::KexGexRequest { min: 1024, n: 2048, max: 8192 }, gex);
        roundtrip(Msg::KexGexGroup {
            p: BigUint::from(23u32),
            g: BigUint::from(5u32),
        }, gex);
        roundtrip(Msg::KexGexInit { e: BigUint::from(19u32) }, gex);
        roundtrip(Msg::KexGexReply {
            server_pubkey: b(b"K_S"),
            f: BigUint::from(8u32),
            exchange_hash_sign: b(b"sig"),
        }, gex);
    }

    #[test]
    fn test_kex_ids_share_wire_values() {
        let init = Msg::KexEcdhInit { client_eph_pubkey: b(b"Q_C") };
        assert_eq!(init.msg_id(), 30);
        let encoded = init.encode();

        // the same bytes decode differently depending on the kex family
        let dh = MsgCx { kex: Some(KexFamily::DiffieHellman), auth: None };
        assert!(matches!(Msg::decode(encoded.clone(), dh), Ok(Msg::KexDhInit { .. })));

        // and they do not decode at all without a key exchange in progress
        assert!(Msg::decode(encoded, MsgCx::default()).is_err());
    }

    #[test]
    fn test_roundtrip_userauth() {
        let cx = MsgCx::default();
        roundtrip(Msg::UserauthRequest {
            username: "alice".into(),
            service: "ssh-connection".into(),
            method: "none".into(),
            method_data: b(b""),
        }, cx);
        roundtrip(Msg::UserauthFailure {
            methods_can_continue: names(&["publickey", "password"]),
            partial_success: false,
        }, cx);
        roundtrip(Msg::UserauthSuccess, cx);
        roundtrip(Msg::UserauthBanner { message: "welcome".into(), message_lang: "en".into() }, cx);

        let pubkey = MsgCx { kex: None, auth: Some(AuthMethodKind::Pubkey) };
        roundtrip(Msg::UserauthPkOk {
            pubkey_algo_name: "ssh-ed25519".into(),
            pubkey: b(b"blob"),
        }, pubkey);

        let password = MsgCx { kex: None, auth: Some(AuthMethodKind::Password) };
        roundtrip(Msg::UserauthPasswdChangereq {
            prompt: "change your password".into(),
            prompt_lang: "en".into(),
        }, password);

        let kbi = MsgCx { kex: None, auth: Some(AuthMethodKind::KeyboardInteractive) };
        roundtrip(Msg::UserauthInfoRequest {
            name: "login".into(),
            instruction: "enter one-time code".into(),
            language_tag: "".into(),
            prompts: vec![
                AuthInfoPrompt { prompt: "Code:".into(), echo: false },
                AuthInfoPrompt { prompt: "Comment:".into(), echo: true },
            ],
        }, kbi);
        roundtrip(Msg::UserauthInfoResponse {
            responses: vec!["123456".into(), "hi".into()],
        }, kbi);
    }

    #[test]
    fn test_id_60_requires_method() {
        let msg = Msg::UserauthPkOk { pubkey_algo_name: "ssh-ed25519".into(), pubkey: b(b"blob") };
        let encoded = msg.encode();
        assert!(matches!(Msg::decode(encoded, MsgCx::default()), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_id_60_disambiguation() {
        // the same bytes are a PK_OK for publickey and a change request for password
        let mut p = PacketEncode::new();
        p.put_u8(60);
        p.put_str("prompt or algo");
        p.put_str("lang or blob");
        let payload = p.finish();

        let pubkey = MsgCx { kex: None, auth: Some(AuthMethodKind::Pubkey) };
        assert!(matches!(Msg::decode(payload.clone(), pubkey), Ok(Msg::UserauthPkOk { .. })));

        let password = MsgCx { kex: None, auth: Some(AuthMethodKind::Password) };
        assert!(matches!(
            Msg::decode(payload, password),
            Ok(Msg::UserauthPasswdChangereq { .. }),
        ));
    }

    #[test]
    fn test_roundtrip_connection() {
        let cx = MsgCx::default();
        roundtrip(Msg::GlobalRequest {
            request_type: "tcpip-forward".into(),
            want_reply: true,
            request_data: b(b"\x00\x00\x00\x00\x00\x00\x00\x00"),
        }, cx);
        roundtrip(Msg::RequestSuccess { response_data: b(b"\x00\x00\x12\x34") }, cx);
        roundtrip(Msg::RequestFailure, cx);
        roundtrip(Msg::ChannelOpen {
            channel_type: "session".into(),
            sender_channel: 0,
            initial_window: 2 * 1024 * 1024,
            max_packet_len: 32768,
            open_data: b(b""),
        }, cx);
        roundtrip(Msg::ChannelOpenConfirmation {
            recipient_channel: 0,
            sender_channel: 7,
            initial_window: 64000,
            max_packet_len: 32768,
            confirm_data: b(b""),
        }, cx);
        roundtrip(Msg::ChannelOpenFailure {
            recipient_channel: 0,
            reason_code: 1,
            description: "administratively prohibited".into(),
            description_lang: "".into(),
        }, cx);
        roundtrip(Msg::ChannelWindowAdjust { recipient_channel: 3, adjust_len: 100_000 }, cx);
        roundtrip(Msg::ChannelData { recipient_channel: 3, data: b(b"hi\n") }, cx);
        roundtrip(Msg::ChannelExtendedData {
            recipient_channel: 3,
            data_type_code: 1,
            data: b(b"oops\n"),
        }, cx);
        roundtrip(Msg::ChannelEof { recipient_channel: 3 }, cx);
        roundtrip(Msg::ChannelClose { recipient_channel: 3 }, cx);
        roundtrip(Msg::ChannelRequest {
            recipient_channel: 3,
            request_type: "exec".into(),
            want_reply: true,
            request_data: b(b"\x00\x00\x00\x07echo hi"),
        }, cx);
        roundtrip(Msg::ChannelSuccess { recipient_channel: 3 }, cx);
        roundtrip(Msg::ChannelFailure { recipient_channel: 3 }, cx);
    }

    #[test]
    fn test_fixed_grammar_rejects_trailing_bytes() {
        let mut p = PacketEncode::new();
        p.put_u8(crate::numbers::msg::NEWKEYS);
        p.put_u8(0xcc);
        assert!(Msg::decode(p.finish(), MsgCx::default()).is_err());

        let mut p = PacketEncode::new();
        p.put_u8(crate::numbers::msg::CHANNEL_EOF);
        p.put_u32(1);
        p.put_u8(0xcc);
        assert!(Msg::decode(p.finish(), MsgCx::default()).is_err());
    }

    #[test]
    fn test_extensible_grammar_keeps_trailing_bytes() {
        let mut p = PacketEncode::new();
        p.put_u8(crate::numbers::msg::CHANNEL_REQUEST);
        p.put_u32(3);
        p.put_str("exit-status");
        p.put_bool(false);
        p.put_u32(0);
        let decoded = Msg::decode(p.finish(), MsgCx::default()).unwrap();
        match decoded {
            Msg::ChannelRequest { request_type, request_data, .. } => {
                assert_eq!(request_type, "exit-status");
                assert_eq!(request_data.as_ref(), &[0, 0, 0, 0]);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_kex_init_rejects_invalid_names() {
        // a trailing comma produces an empty name, which the name-list grammar forbids
        let mut p = PacketEncode::new();
        p.put_u8(crate::numbers::msg::KEXINIT);
        p.put_raw(&[7; 16]);
        p.put_str("curve25519-sha256,");
        for _ in 0..9 {
            p.put_str("");
        }
        p.put_bool(false);
        p.put_u32(0);
        assert!(Msg::decode(p.finish(), MsgCx::default()).is_err());
    }

    #[test]
    fn test_unknown_id() {
        let payload = Bytes::from_static(&[101]);
        assert!(matches!(
            Msg::decode(payload, MsgCx::default()),
            Err(Error::PacketNotImplemented(101)),
        ));
    }
}
