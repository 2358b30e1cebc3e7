use bytes::Bytes;
use derivative::Derivative;
use num_bigint_dig::{BigUint, RandBigInt as _};
use rand::rngs::OsRng;
use std::task::Poll;
use crate::codec::PacketEncode;
use crate::error::{Error, Result};
use crate::msg::{Msg, KexFamily};
use crate::util::CryptoRngCore;
use super::{KexAlgo, KexInput, KexOutput, Kex};

/// "diffie-hellman-group-exchange-sha256" key exchange from RFC 4419.
///
/// Instead of a fixed group, the server picks a group within the bounds requested by the
/// client.
pub static DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA256: KexAlgo = KexAlgo {
    name: "diffie-hellman-group-exchange-sha256",
    family: KexFamily::DiffieHellmanGex,
    make_kex: |rng| Ok(Box::new(init_kex(super::dh::compute_hash_sha256, rng)?)),
};

/// "diffie-hellman-group-exchange-sha1" key exchange from RFC 4419, which SHOULD NOT be used
/// according to RFC 9142. It is provided for compatibility with old servers.
pub static DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA1: KexAlgo = KexAlgo {
    name: "diffie-hellman-group-exchange-sha1",
    family: KexFamily::DiffieHellmanGex,
    make_kex: |rng| Ok(Box::new(init_kex(super::dh::compute_hash_sha1, rng)?)),
};

// group size bounds that we request (RFC 8270 raised the minimum to 2048)
const GROUP_BITS_MIN: u32 = 2048;
const GROUP_BITS_PREFERRED: u32 = 3072;
const GROUP_BITS_MAX: u32 = 8192;

#[derive(Derivative)]
#[derivative(Debug)]
struct DiffieHellmanGexKex {
    #[derivative(Debug = "ignore")]
    compute_hash: fn(&[u8]) -> Vec<u8>,
    request_sent: bool,
    group: Option<GexGroup>,
    init_sent: bool,
    gex_reply: Option<GexReply>,
}

#[derive(Debug)]
struct GexGroup {
    p: BigUint,
    g: BigUint,
    p_minus_1: BigUint,
    our_eph_privkey: BigUint,
    our_eph_pubkey: BigUint,
}

#[derive(Debug)]
struct GexReply {
    server_pubkey: Bytes,
    server_eph_pubkey: BigUint,
    server_exchange_hash_sign: Bytes,
}

fn init_kex(
    compute_hash: fn(&[u8]) -> Vec<u8>,
    _rng: &mut dyn CryptoRngCore,
) -> Result<DiffieHellmanGexKex> {
    Ok(DiffieHellmanGexKex {
        compute_hash,
        request_sent: false,
        group: None,
        init_sent: false,
        gex_reply: None,
    })
}

impl Kex for DiffieHellmanGexKex {
    fn recv_msg(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::KexGexGroup { .. } => recv_gex_group(self, msg),
            Msg::KexGexReply { .. } => recv_gex_reply(self, msg),
            _ => Err(Error::PacketNotImplemented(msg.msg_id())),
        }
    }

    fn send_msg(&mut self) -> Result<Option<Msg>> {
        if !self.request_sent {
            // RFC 4419, section 3
            log::debug!("sending SSH_MSG_KEX_DH_GEX_REQUEST");
            self.request_sent = true;
            return Ok(Some(Msg::KexGexRequest {
                min: GROUP_BITS_MIN,
                n: GROUP_BITS_PREFERRED,
                max: GROUP_BITS_MAX,
            }))
        }

        if !self.init_sent {
            if let Some(group) = self.group.as_ref() {
                log::debug!("sending SSH_MSG_KEX_DH_GEX_INIT");
                self.init_sent = true;
                return Ok(Some(Msg::KexGexInit { e: group.our_eph_pubkey.clone() }))
            }
        }

        Ok(None)
    }

    fn poll(&mut self, input: KexInput) -> Poll<Result<KexOutput>> {
        if self.group.is_some() && self.gex_reply.is_some() {
            return Poll::Ready(exchange(self, input))
        }
        Poll::Pending
    }

    fn compute_hash(&self, data: &[u8]) -> Vec<u8> {
        (self.compute_hash)(data)
    }
}

fn recv_gex_group(kex: &mut DiffieHellmanGexKex, msg: Msg) -> Result<()> {
    if kex.group.is_some() {
        return Err(Error::Protocol("received duplicate SSH_MSG_KEX_DH_GEX_GROUP"))
    }

    // RFC 4419, section 3
    let Msg::KexGexGroup { p, g } = msg else { unreachable!() };

    let p_bits = p.bits() as u32;
    if !(GROUP_BITS_MIN..=GROUP_BITS_MAX).contains(&p_bits) {
        return Err(Error::Protocol("server sent group outside of the requested size bounds"))
    }

    let p_minus_1 = &p - BigUint::from(1u32);
    if g <= BigUint::from(1u32) || g >= p_minus_1 {
        return Err(Error::Protocol("server sent invalid group generator"))
    }

    let our_eph_privkey = OsRng.gen_biguint_range(&BigUint::from(1u32), &p_minus_1);
    let our_eph_pubkey = g.modpow(&our_eph_privkey, &p);

    kex.group = Some(GexGroup { p, g, p_minus_1, our_eph_privkey, our_eph_pubkey });
    log::debug!("received SSH_MSG_KEX_DH_GEX_GROUP with {} bit group", p_bits);

    Ok(())
}

fn recv_gex_reply(kex: &mut DiffieHellmanGexKex, msg: Msg) -> Result<()> {
    if kex.gex_reply.is_some() {
        return Err(Error::Protocol("received duplicate SSH_MSG_KEX_DH_GEX_REPLY"))
    }

    let group = kex.group.as_ref()
        .ok_or(Error::Protocol("received SSH_MSG_KEX_DH_GEX_REPLY before the group"))?;

    // RFC 4419, section 3
    let Msg::KexGexReply { server_pubkey, f, exchange_hash_sign } = msg else { unreachable!() };

    if f <= BigUint::from(1u32) || f >= group.p_minus_1 {
        return Err(Error::Protocol("server sent invalid Diffie-Hellman ephemeral public key"))
    }

    kex.gex_reply = Some(GexReply {
        server_pubkey,
        server_eph_pubkey: f,
        server_exchange_hash_sign: exchange_hash_sign,
    });
    log::debug!("received SSH_MSG_KEX_DH_GEX_REPLY");

    Ok(())
}

fn exchange(kex: &mut DiffieHellmanGexKex, input: KexInput) -> Result<KexOutput> {
    let group = kex.group.take().unwrap();
    let gex_reply = kex.gex_reply.take().unwrap();
    let GexReply { server_pubkey, server_eph_pubkey, server_exchange_hash_sign } = gex_reply;

    let shared_secret = (server_eph_pubkey.clone()).modpow(&group.our_eph_privkey, &group.p);
    let shared_secret_be = shared_secret.to_bytes_be();

    // RFC 4419, section 3: the hash covers the group request bounds and the group itself
    let mut exchange_data = PacketEncode::new();
    exchange_data.put_bytes(input.client_ident);
    exchange_data.put_bytes(input.server_ident);
    exchange_data.put_bytes(input.client_kex_init);
    exchange_data.put_bytes(input.server_kex_init);
    exchange_data.put_bytes(&server_pubkey);
    exchange_data.put_u32(GROUP_BITS_MIN);
    exchange_data.put_u32(GROUP_BITS_PREFERRED);
    exchange_data.put_u32(GROUP_BITS_MAX);
    exchange_data.put_biguint(&group.p);
    exchange_data.put_biguint(&group.g);
    exchange_data.put_biguint(&group.our_eph_pubkey);
    exchange_data.put_biguint(&server_eph_pubkey);
    exchange_data.put_mpint_uint_be(&shared_secret_be);
    let exchange_hash = (kex.compute_hash)(&exchange_data.finish());

    Ok(KexOutput { shared_secret_be, exchange_hash, server_pubkey, server_exchange_hash_sign })
}
