use bytes::Bytes;
use std::future::Future as _;
use std::pin::Pin;
use std::task::Context;
use tokio::sync::oneshot;
use crate::cipher::{CipherAlgo, CipherAlgoVariant, PacketEncrypt, PacketDecrypt};
use crate::codec::PacketEncode;
use crate::compress::CompressAlgo;
use crate::error::{Error, Result, AlgoNegotiateError};
use crate::kex::{Kex, KexAlgo, KexInput, KexOutput};
use crate::mac::MacAlgo;
use crate::msg::{Msg, KexFamily, KexInitMsg};
use crate::pubkey::{Pubkey, PubkeyAlgo};
use super::auth;
use super::client_event::{ClientEvent, AcceptPubkeySender, PubkeyAccepted};
use super::client_state::{self, ClientState};
use super::pump::Pump;
use super::recv::ResultRecvState;

#[derive(Default)]
pub(super) struct NegotiateState {
    state: State,
    our_kex_init: Option<OurKexInit>,
    their_kex_init: Option<TheirKexInit>,
    algos: Option<Algos>,
    kex: Option<Box<dyn Kex + Send>>,
    kex_family: Option<KexFamily>,
    kex_output: Option<KexOutput>,
    signature_ok: bool,
    pubkey_event: Option<ClientEvent>,
    accept_rx: Option<oneshot::Receiver<Result<PubkeyAccepted>>>,
    pubkey_accepted: Option<PubkeyAccepted>,
    new_keys_sent: bool,
    new_keys_recvd: bool,
}

#[derive(Debug, Copy, Clone, Default)]
enum State {
    #[default]
    Idle,
    KexInit,
    Kex,
    AcceptPubkey,
    NewKeys,
    Done,
}

struct OurKexInit {
    payload: Bytes,
    kex_algos: Vec<&'static KexAlgo>,
    server_pubkey_algos: Vec<&'static PubkeyAlgo>,
    cipher_algos_cts: Vec<&'static CipherAlgo>,
    cipher_algos_stc: Vec<&'static CipherAlgo>,
    mac_algos_cts: Vec<&'static MacAlgo>,
    mac_algos_stc: Vec<&'static MacAlgo>,
    compress_algos_cts: Vec<&'static CompressAlgo>,
    compress_algos_stc: Vec<&'static CompressAlgo>,
}

#[derive(Debug)]
struct TheirKexInit {
    payload: Bytes,
    msg: KexInitMsg,
}

struct Algos {
    kex: &'static KexAlgo,
    server_pubkey: &'static PubkeyAlgo,
    cipher_cts: &'static CipherAlgo,
    cipher_stc: &'static CipherAlgo,
    mac_cts: &'static MacAlgo,
    mac_stc: &'static MacAlgo,
    compress_cts: &'static CompressAlgo,
    compress_stc: &'static CompressAlgo,
}

pub(super) fn init_negotiate() -> NegotiateState {
    NegotiateState { state: State::KexInit, .. NegotiateState::default() }
}

pub(super) fn pump_negotiate(st: &mut ClientState, cx: &mut Context) -> Result<Pump> {
    match st.negotiate_st.state {
        State::Idle => {
            // the transport enforces a rekey after the configured traffic limits, or when a
            // sequence number approaches its wrap
            let bytes_limit = st.config.rekey_bytes_limit;
            let packets_limit = st.config.rekey_packets_limit;
            if st.codec.send_pipe.rekey_pressure(bytes_limit, packets_limit)
                || st.codec.recv_pipe.rekey_pressure(bytes_limit, packets_limit)
            {
                log::debug!("initiating rekey");
                st.negotiate_st.state = State::KexInit;
                return Ok(Pump::Progress)
            }
        },
        State::KexInit => {
            if st.negotiate_st.our_kex_init.is_none() {
                st.negotiate_st.our_kex_init = Some(send_kex_init(st)?);
            }

            if st.negotiate_st.our_kex_init.is_some() && st.negotiate_st.their_kex_init.is_some() {
                st.negotiate_st.algos = Some(negotiate_algos(st)?);
                let kex_algo = st.negotiate_st.algos.as_ref().unwrap().kex;
                st.negotiate_st.kex = Some((kex_algo.make_kex)(&mut *st.rng)?);
                st.negotiate_st.kex_family = Some(kex_algo.family);
                st.negotiate_st.state = State::Kex;
                return Ok(Pump::Progress)
            }
        },
        State::Kex => {
            if let Some(msg) = st.negotiate_st.kex.as_mut().unwrap().send_msg()? {
                client_state::send_msg(st, &msg)?;
                return Ok(Pump::Progress)
            }

            let kex_input = KexInput {
                client_ident: &st.our_ident,
                server_ident: st.their_ident.as_ref().unwrap(),
                client_kex_init: &st.negotiate_st.our_kex_init.as_ref().unwrap().payload,
                server_kex_init: &st.negotiate_st.their_kex_init.as_ref().unwrap().payload,
            };
            let kex_output = pump_ready!(st.negotiate_st.kex.as_mut().unwrap().poll(kex_input))?;
            log::debug!("finished kex");

            // the exchange hash of the first kex becomes the session id and never changes
            if st.session_id.is_none() {
                st.session_id = Some(kex_output.exchange_hash.clone());
            }

            let pubkey = Pubkey::decode(kex_output.server_pubkey.clone())?;
            log::debug!("server pubkey {}", pubkey);

            let pubkey_algo = st.negotiate_st.algos.as_ref().unwrap().server_pubkey;
            (pubkey_algo.verify)(
                &pubkey, &kex_output.exchange_hash, kex_output.server_exchange_hash_sign.clone())?;
            st.negotiate_st.signature_ok = true;
            st.negotiate_st.kex_output = Some(kex_output);

            let (accept_tx, accept_rx) = oneshot::channel();
            let accept_tx = AcceptPubkeySender { accept_tx };
            st.negotiate_st.pubkey_event = Some(ClientEvent::ServerPubkey(pubkey, accept_tx));
            st.negotiate_st.accept_rx = Some(accept_rx);
            st.negotiate_st.state = State::AcceptPubkey;
            return Ok(Pump::Progress)
        },
        State::AcceptPubkey => {
            if st.negotiate_st.pubkey_event.is_some() {
                let reserve_res = pump_ready!(st.event_tx.poll_reserve(cx));
                let pubkey_event = st.negotiate_st.pubkey_event.take().unwrap();
                if reserve_res.is_ok() {
                    let _ = st.event_tx.send_item(pubkey_event);
                }
            }

            let accepted = pump_ready!(Pin::new(st.negotiate_st.accept_rx.as_mut().unwrap()).poll(cx))
                .map_err(|err| Error::PubkeyAccept(Box::new(err)))??;
            log::debug!("server pubkey was accepted");
            st.negotiate_st.pubkey_accepted = Some(accepted);
            st.negotiate_st.state = State::NewKeys;
            return Ok(Pump::Progress)
        },
        State::NewKeys => {
            assert!(st.negotiate_st.signature_ok);
            assert!(st.negotiate_st.pubkey_accepted.is_some());

            if !st.negotiate_st.new_keys_sent {
                send_new_keys(st)?;
                st.negotiate_st.new_keys_sent = true;
                return Ok(Pump::Progress)
            }

            if st.negotiate_st.new_keys_sent && st.negotiate_st.new_keys_recvd {
                st.negotiate_st.state = State::Done;
                return Ok(Pump::Progress)
            }
        },
        State::Done => {
            let algos = st.negotiate_st.algos.as_ref().unwrap();
            st.has_confidentiality =
                algos.cipher_cts.is_confidential() && algos.cipher_stc.is_confidential();
            st.has_mac_protection =
                (algos.cipher_cts.is_aead() || algos.mac_cts.tag_len > 0)
                && (algos.cipher_stc.is_aead() || algos.mac_stc.tag_len > 0);

            st.negotiate_st = Box::new(NegotiateState::default());
            return Ok(Pump::Progress)
        },
    }
    Ok(Pump::Pending)
}

/// The key exchange message family in progress, used to decode message ids 30 to 49.
pub(super) fn kex_family(st: &ClientState) -> Option<KexFamily> {
    st.negotiate_st.kex_family
}

pub(super) fn recv_kex_msg(st: &mut ClientState, msg: Msg) -> ResultRecvState {
    if let Some(kex) = st.negotiate_st.kex.as_mut() {
        kex.recv_msg(msg)?;
        Ok(None)
    } else {
        Err(Error::Protocol("received unexpected kex message"))
    }
}

fn send_kex_init(st: &mut ClientState) -> Result<OurKexInit> {
    let kex_algos = st.config.kex_algos.clone();
    let server_pubkey_algos = st.config.server_pubkey_algos.clone();
    let cipher_algos = st.config.cipher_algos.clone();
    let mac_algos = st.config.mac_algos.clone();
    let compress_algos = st.config.compress_algos.clone();

    let mut cookie = [0; 16];
    st.rng.as_rngcore().try_fill_bytes(&mut cookie)
        .map_err(|_| Error::Random("could not generate random cookie"))?;

    fn get_algo_names<A: NamedAlgo>(algos: &[&A]) -> Vec<String> {
        algos.iter().map(|algo| algo.name().to_string()).collect()
    }

    // RFC 4253, section 7.1
    let msg = Msg::KexInit(KexInitMsg {
        cookie,
        kex_algos: get_algo_names(&kex_algos),
        server_pubkey_algos: get_algo_names(&server_pubkey_algos),
        cipher_algos_cts: get_algo_names(&cipher_algos),
        cipher_algos_stc: get_algo_names(&cipher_algos),
        mac_algos_cts: get_algo_names(&mac_algos),
        mac_algos_stc: get_algo_names(&mac_algos),
        compress_algos_cts: get_algo_names(&compress_algos),
        compress_algos_stc: get_algo_names(&compress_algos),
        languages_cts: Vec::new(),
        languages_stc: Vec::new(),
        first_kex_packet_follows: false,
    });

    let payload = msg.encode();
    st.codec.send_pipe.feed_packet(&payload)?;
    log::debug!("sending SSH_MSG_KEXINIT");

    Ok(OurKexInit {
        payload,
        kex_algos,
        server_pubkey_algos,
        cipher_algos_cts: cipher_algos.clone(),
        cipher_algos_stc: cipher_algos,
        mac_algos_cts: mac_algos.clone(),
        mac_algos_stc: mac_algos,
        compress_algos_cts: compress_algos.clone(),
        compress_algos_stc: compress_algos,
    })
}

pub(super) fn recv_kex_init(
    st: &mut ClientState,
    kex_init: KexInitMsg,
    payload: Bytes,
) -> ResultRecvState {
    if kex_init.first_kex_packet_follows {
        return Err(Error::Protocol("received SSH_MSG_KEXINIT with first_kex_packet_follows set"))
    }

    let kex_init = TheirKexInit { payload, msg: kex_init };
    log::debug!("received SSH_MSG_KEXINIT: {:?}", kex_init);

    match st.negotiate_st.state {
        // `Idle` means that the server is initiating a rekey
        State::Idle | State::KexInit if st.negotiate_st.their_kex_init.is_none() => {
            st.negotiate_st.their_kex_init = Some(kex_init);
            st.negotiate_st.state = State::KexInit;
            Ok(None)
        },
        _ => Err(Error::Protocol("received SSH_MSG_KEXINIT during negotiation")),
    }
}

fn negotiate_algos(st: &ClientState) -> Result<Algos> {
    // "the first algorithm on the client's list that is also supported by the server"
    // (RFC 4253, section 7.1)
    fn negotiate_algo<A: NamedAlgo>(
        our_algos: &[&'static A],
        their_algos: &[String],
        name: &'static str,
    ) -> Result<&'static A> {
        for our_algo in our_algos.iter() {
            for their_algo in their_algos.iter() {
                if our_algo.name() == their_algo.as_str() {
                    log::debug!("negotiated algo {:?} for {}", their_algo, name);
                    return Ok(our_algo)
                }
            }
        }

        Err(Error::AlgoNegotiate(AlgoNegotiateError {
            algo_name: name.into(),
            our_algos: our_algos.iter().map(|a| a.name().into()).collect(),
            their_algos: their_algos.into(),
        }))
    }

    let our = st.negotiate_st.our_kex_init.as_ref().unwrap();
    let their = &st.negotiate_st.their_kex_init.as_ref().unwrap().msg;

    let kex = negotiate_algo(&our.kex_algos, &their.kex_algos, "key exchange")?;
    let server_pubkey = negotiate_algo(
        &our.server_pubkey_algos, &their.server_pubkey_algos, "server public key")?;
    let cipher_cts = negotiate_algo(
        &our.cipher_algos_cts, &their.cipher_algos_cts, "cipher client-to-server")?;
    let cipher_stc = negotiate_algo(
        &our.cipher_algos_stc, &their.cipher_algos_stc, "cipher server-to-client")?;
    let mac_cts = negotiate_algo(
        &our.mac_algos_cts, &their.mac_algos_cts, "mac client-to-server")?;
    let mac_stc = negotiate_algo(
        &our.mac_algos_stc, &their.mac_algos_stc, "mac server-to-client")?;
    let compress_cts = negotiate_algo(
        &our.compress_algos_cts, &their.compress_algos_cts, "compression client-to-server")?;
    let compress_stc = negotiate_algo(
        &our.compress_algos_stc, &their.compress_algos_stc, "compression server-to-client")?;

    Ok(Algos {
        kex, server_pubkey,
        cipher_cts, cipher_stc,
        mac_cts, mac_stc,
        compress_cts, compress_stc,
    })
}

trait NamedAlgo { fn name(&self) -> &'static str; }
impl NamedAlgo for KexAlgo { fn name(&self) -> &'static str { self.name } }
impl NamedAlgo for CipherAlgo { fn name(&self) -> &'static str { self.name } }
impl NamedAlgo for MacAlgo { fn name(&self) -> &'static str { self.name } }
impl NamedAlgo for PubkeyAlgo { fn name(&self) -> &'static str { self.name } }
impl NamedAlgo for CompressAlgo { fn name(&self) -> &'static str { self.name } }

pub(super) fn recv_new_keys(st: &mut ClientState) -> ResultRecvState {
    match st.negotiate_st.state {
        State::Kex | State::AcceptPubkey | State::NewKeys => {
            if st.negotiate_st.new_keys_recvd {
                return Err(Error::Protocol("received SSH_MSG_NEWKEYS twice"))
            }
        },
        _ => return Err(Error::Protocol("received unexpected SSH_MSG_NEWKEYS")),
    }

    let algos = st.negotiate_st.algos.as_ref().unwrap();
    let cipher_algo = algos.cipher_stc;
    let mac_algo = algos.mac_stc;
    let compress_algo = algos.compress_stc;

    let cipher_key = derive_key(st, b'D', cipher_algo.key_len)?;
    let cipher_iv = derive_key(st, b'B', cipher_algo.iv_len)?;
    let mac_key = derive_key(st, b'F', mac_algo.key_len)?;

    let (decrypt, tag_len) = match &cipher_algo.variant {
        CipherAlgoVariant::Standard(standard) => {
            let decrypt = (standard.make_decrypt)(&cipher_key, &cipher_iv);
            let mac = (mac_algo.make_mac)(&mac_key);
            let decrypt = if mac_algo.etm {
                PacketDecrypt::EncryptThenMac(decrypt, mac)
            } else {
                PacketDecrypt::EncryptAndMac(decrypt, mac)
            };
            (decrypt, mac_algo.tag_len)
        },
        CipherAlgoVariant::Aead(aead) => {
            (PacketDecrypt::Aead((aead.make_decrypt)(&cipher_key, &cipher_iv)), aead.tag_len)
        },
    };
    st.codec.recv_pipe.set_decrypt(decrypt, cipher_algo.block_len, tag_len);

    // delayed compression only starts once the user has authenticated; on a rekey after
    // authentication it is active right away
    let delayed = compress_algo.delayed && !auth::is_authenticated(st);
    st.codec.recv_pipe.set_decompress((compress_algo.make_decompress)(), delayed);

    log::debug!("received SSH_MSG_NEWKEYS and applied new keys");
    st.negotiate_st.new_keys_recvd = true;
    Ok(None)
}

fn send_new_keys(st: &mut ClientState) -> Result<()> {
    let algos = st.negotiate_st.algos.as_ref().unwrap();
    let cipher_algo = algos.cipher_cts;
    let mac_algo = algos.mac_cts;
    let compress_algo = algos.compress_cts;

    let cipher_key = derive_key(st, b'C', cipher_algo.key_len)?;
    let cipher_iv = derive_key(st, b'A', cipher_algo.iv_len)?;
    let mac_key = derive_key(st, b'E', mac_algo.key_len)?;

    let (encrypt, tag_len) = match &cipher_algo.variant {
        CipherAlgoVariant::Standard(standard) => {
            let encrypt = (standard.make_encrypt)(&cipher_key, &cipher_iv);
            let mac = (mac_algo.make_mac)(&mac_key);
            let encrypt = if mac_algo.etm {
                PacketEncrypt::EncryptThenMac(encrypt, mac)
            } else {
                PacketEncrypt::EncryptAndMac(encrypt, mac)
            };
            (encrypt, mac_algo.tag_len)
        },
        CipherAlgoVariant::Aead(aead) => {
            (PacketEncrypt::Aead((aead.make_encrypt)(&cipher_key, &cipher_iv)), aead.tag_len)
        },
    };

    client_state::send_msg(st, &Msg::NewKeys)?;

    st.codec.send_pipe.set_encrypt(encrypt, cipher_algo.block_len, tag_len);
    let delayed = compress_algo.delayed && !auth::is_authenticated(st);
    st.codec.send_pipe.set_compress((compress_algo.make_compress)(), delayed);
    log::debug!("sent SSH_MSG_NEWKEYS and applied new keys");

    Ok(())
}

fn derive_key(st: &ClientState, key_type: u8, key_len: usize) -> Result<Vec<u8>> {
    // RFC 4253, section 7.2

    let kex = st.negotiate_st.kex.as_deref().unwrap();
    let kex_output = st.negotiate_st.kex_output.as_ref().unwrap();
    let session_id = st.session_id.as_ref().unwrap();

    let mut to_hash_prefix = PacketEncode::new();
    to_hash_prefix.put_mpint_uint_be(&kex_output.shared_secret_be);
    to_hash_prefix.put_raw(&kex_output.exchange_hash);

    let mut key = {
        let mut to_hash = to_hash_prefix.clone();
        to_hash.put_u8(key_type);
        to_hash.put_raw(session_id);
        kex.compute_hash(&to_hash.finish())
    };

    while key.len() < key_len {
        let mut to_hash = to_hash_prefix.clone();
        to_hash.put_raw(&key);
        key.extend_from_slice(&kex.compute_hash(&to_hash.finish()));
    }

    key.truncate(key_len);
    Ok(key)
}

pub(super) fn is_ready(st: &ClientState) -> bool {
    matches!(st.negotiate_st.state, State::Idle)
}
