use crate::codec::{PacketDecode, PacketEncode, validate_name_list};
use crate::error::{Error, Result};
use crate::numbers::msg;
use super::{Msg, MsgCx, KexFamily, KexInitMsg, expect_end};

pub(super) fn decode(msg_id: u8, p: &mut PacketDecode, cx: MsgCx) -> Result<Msg> {
    match msg_id {
        msg::DISCONNECT => {
            let m = Msg::Disconnect {
                reason_code: p.get_u32()?,
                description: p.get_string()?,
                description_lang: p.get_string()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::IGNORE => {
            let m = Msg::Ignore { data: p.get_bytes()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::UNIMPLEMENTED => {
            let m = Msg::Unimplemented { packet_seq: p.get_u32()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::DEBUG => {
            let m = Msg::Debug {
                always_display: p.get_bool()?,
                message: p.get_string()?,
                message_lang: p.get_string()?,
            };
            expect_end(p)?;
            Ok(m)
        },
        msg::SERVICE_REQUEST => {
            let m = Msg::ServiceRequest { service: p.get_string()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::SERVICE_ACCEPT => {
            let m = Msg::ServiceAccept { service: p.get_string()? };
            expect_end(p)?;
            Ok(m)
        },
        msg::EXT_INFO => {
            let ext_count = p.get_u32()?;
            let mut extensions = Vec::new();
            for _ in 0..ext_count {
                let name = p.get_string()?;
                let value = p.get_bytes()?;
                extensions.push((name, value));
            }
            let m = Msg::ExtInfo { extensions };
            expect_end(p)?;
            Ok(m)
        },
        msg::KEXINIT => decode_kex_init(p),
        msg::NEWKEYS => {
            expect_end(p)?;
            Ok(Msg::NewKeys)
        },
        30..=49 => decode_kex(msg_id, p, cx),
        _ => Err(Error::PacketNotImplemented(msg_id)),
    }
}

fn decode_kex_init(p: &mut PacketDecode) -> Result<Msg> {
    // RFC 4253, section 7.1
    let mut cookie = [0; 16];
    cookie.copy_from_slice(&p.get_raw(16)?);

    let kex_init = KexInitMsg {
        cookie,
        kex_algos: get_checked_name_list(p)?,
        server_pubkey_algos: get_checked_name_list(p)?,
        cipher_algos_cts: get_checked_name_list(p)?,
        cipher_algos_stc: get_checked_name_list(p)?,
        mac_algos_cts: get_checked_name_list(p)?,
        mac_algos_stc: get_checked_name_list(p)?,
        compress_algos_cts: get_checked_name_list(p)?,
        compress_algos_stc: get_checked_name_list(p)?,
        languages_cts: p.get_name_list()?,
        languages_stc: p.get_name_list()?,
        first_kex_packet_follows: p.get_bool()?,
    };
    p.get_u32()?; // reserved
    expect_end(p)?;
    Ok(Msg::KexInit(kex_init))
}

fn get_checked_name_list(p: &mut PacketDecode) -> Result<Vec<String>> {
    let names = p.get_name_list()?;
    validate_name_list(&names)?;
    Ok(names)
}

fn decode_kex(msg_id: u8, p: &mut PacketDecode, cx: MsgCx) -> Result<Msg> {
    let family = match cx.kex {
        Some(family) => family,
        None => return Err(Error::Protocol("received key exchange message outside of key exchange")),
    };

    let m = match (family, msg_id) {
        (KexFamily::Ecdh, msg::KEX_ECDH_INIT) => Msg::KexEcdhInit {
            client_eph_pubkey: p.get_bytes()?,
        },
        (KexFamily::Ecdh, msg::KEX_ECDH_REPLY) => Msg::KexEcdhReply {
            server_pubkey: p.get_bytes()?,
            server_eph_pubkey: p.get_bytes()?,
            exchange_hash_sign: p.get_bytes()?,
        },
        (KexFamily::DiffieHellman, msg::KEXDH_INIT) => Msg::KexDhInit {
            e: p.get_biguint()?,
        },
        (KexFamily::DiffieHellman, msg::KEXDH_REPLY) => Msg::KexDhReply {
            server_pubkey: p.get_bytes()?,
            f: p.get_biguint()?,
            exchange_hash_sign: p.get_bytes()?,
        },
        (KexFamily::DiffieHellmanGex, msg::KEX_DH_GEX_REQUEST_OLD) => Msg::KexGexRequestOld {
            n: p.get_u32()?,
        },
        (KexFamily::DiffieHellmanGex, msg::KEX_DH_GEX_REQUEST) => Msg::KexGexRequest {
            min: p.get_u32()?,
            n: p.get_u32()?,
            max: p.get_u32()?,
        },
        (KexFamily::DiffieHellmanGex, msg::KEX_DH_GEX_GROUP) => Msg::KexGexGroup {
            p: p.get_biguint()?,
            g: p.get_biguint()?,
        },
        (KexFamily::DiffieHellmanGex, msg::KEX_DH_GEX_INIT) => Msg::KexGexInit {
            e: p.get_biguint()?,
        },
        (KexFamily::DiffieHellmanGex, msg::KEX_DH_GEX_REPLY) => Msg::KexGexReply {
            server_pubkey: p.get_bytes()?,
            f: p.get_biguint()?,
            exchange_hash_sign: p.get_bytes()?,
        },
        _ => return Err(Error::PacketNotImplemented(msg_id)),
    };
    expect_end(p)?;
    Ok(m)
}

pub(super) fn encode(m: &Msg, p: &mut PacketEncode) {
    match m {
        Msg::Disconnect { reason_code, description, description_lang } => {
            p.put_u32(*reason_code);
            p.put_str(description);
            p.put_str(description_lang);
        },
        Msg::Ignore { data } => p.put_bytes(data),
        Msg::Unimplemented { packet_seq } => p.put_u32(*packet_seq),
        Msg::Debug { always_display, message, message_lang } => {
            p.put_bool(*always_display);
            p.put_str(message);
            p.put_str(message_lang);
        },
        Msg::ServiceRequest { service } => p.put_str(service),
        Msg::ServiceAccept { service } => p.put_str(service),
        Msg::ExtInfo { extensions } => {
            p.put_u32(extensions.len() as u32);
            for (name, value) in extensions {
                p.put_str(name);
                p.put_bytes(value);
            }
        },
        Msg::KexInit(kex_init) => {
            p.put_raw(&kex_init.cookie);
            p.put_name_list_owned(&kex_init.kex_algos);
            p.put_name_list_owned(&kex_init.server_pubkey_algos);
            p.put_name_list_owned(&kex_init.cipher_algos_cts);
            p.put_name_list_owned(&kex_init.cipher_algos_stc);
            p.put_name_list_owned(&kex_init.mac_algos_cts);
            p.put_name_list_owned(&kex_init.mac_algos_stc);
            p.put_name_list_owned(&kex_init.compress_algos_cts);
            p.put_name_list_owned(&kex_init.compress_algos_stc);
            p.put_name_list_owned(&kex_init.languages_cts);
            p.put_name_list_owned(&kex_init.languages_stc);
            p.put_bool(kex_init.first_kex_packet_follows);
            p.put_u32(0); // reserved
        },
        Msg::NewKeys => {},
        Msg::KexEcdhInit { client_eph_pubkey } => p.put_bytes(client_eph_pubkey),
        Msg::KexEcdhReply { server_pubkey, server_eph_pubkey, exchange_hash_sign } => {
            p.put_bytes(server_pubkey);
            p.put_bytes(server_eph_pubkey);
            p.put_bytes(exchange_hash_sign);
        },
        Msg::KexDhInit { e } => p.put_biguint(e),
        Msg::KexDhReply { server_pubkey, f, exchange_hash_sign } => {
            p.put_bytes(server_pubkey);
            p.put_biguint(f);
            p.put_bytes(exchange_hash_sign);
        },
        Msg::KexGexRequestOld { n } => p.put_u32(*n),
        Msg::KexGexRequest { min, n, max } => {
            p.put_u32(*min);
            p.put_u32(*n);
            p.put_u32(*max);
        },
        Msg::KexGexGroup { p: prime, g } => {
            p.put_biguint(prime);
            p.put_biguint(g);
        },
        Msg::KexGexInit { e } => p.put_biguint(e),
        Msg::KexGexReply { server_pubkey, f, exchange_hash_sign } => {
            p.put_bytes(server_pubkey);
            p.put_biguint(f);
            p.put_bytes(exchange_hash_sign);
        },
        _ => unreachable!("message is not a transport message"),
    }
}
