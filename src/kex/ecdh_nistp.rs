use bytes::Bytes;
use elliptic_curve::{AffinePoint, CurveArithmetic, FieldBytesSize};
use elliptic_curve::ecdh::EphemeralSecret;
use elliptic_curve::point::PointCompression;
use elliptic_curve::sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint};
use sha2::digest::Digest;
use std::marker::PhantomData;
use std::task::Poll;
use crate::codec::PacketEncode;
use crate::error::{Error, Result};
use crate::msg::{Msg, KexFamily};
use super::{KexAlgo, KexInput, KexOutput, Kex};

/// "ecdh-sha2-nistp256" key exchange from RFC 5656.
pub static ECDH_SHA2_NISTP256: KexAlgo = KexAlgo {
    name: "ecdh-sha2-nistp256",
    family: KexFamily::Ecdh,
    make_kex: |_rng| Ok(Box::new(EcdhKex::<p256::NistP256, sha2::Sha256>::new())),
};

/// "ecdh-sha2-nistp384" key exchange from RFC 5656.
pub static ECDH_SHA2_NISTP384: KexAlgo = KexAlgo {
    name: "ecdh-sha2-nistp384",
    family: KexFamily::Ecdh,
    make_kex: |_rng| Ok(Box::new(EcdhKex::<p384::NistP384, sha2::Sha384>::new())),
};

/// "ecdh-sha2-nistp521" key exchange from RFC 5656.
pub static ECDH_SHA2_NISTP521: KexAlgo = KexAlgo {
    name: "ecdh-sha2-nistp521",
    family: KexFamily::Ecdh,
    make_kex: |_rng| Ok(Box::new(EcdhKex::<p521::NistP521, sha2::Sha512>::new())),
};


struct EcdhKex<C: CurveArithmetic, D> {
    our_eph_privkey: Option<EphemeralSecret<C>>,
    our_eph_pubkey_sec1: Bytes,
    ecdh_init_sent: bool,
    ecdh_reply: Option<EcdhReply>,
    _digest: PhantomData<D>,
}

#[derive(Debug)]
struct EcdhReply {
    server_pubkey: Bytes,
    server_eph_pubkey: Bytes,
    server_exchange_hash_sign: Bytes,
}

impl<C, D> EcdhKex<C, D>
    where C: CurveArithmetic + PointCompression,
          FieldBytesSize<C>: ModulusSize,
          AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
{
    fn new() -> EcdhKex<C, D> {
        // `EphemeralSecret::random()` requires an owned rng, so there is no way that we could
        // pass `&mut dyn CryptoRngCore` here
        let our_eph_privkey = EphemeralSecret::<C>::random(&mut rand::rngs::OsRng);
        let our_eph_pubkey_sec1 =
            Bytes::copy_from_slice(our_eph_privkey.public_key().to_encoded_point(false).as_bytes());
        log::debug!("initialized ecdh kex");
        EcdhKex {
            our_eph_privkey: Some(our_eph_privkey),
            our_eph_pubkey_sec1,
            ecdh_init_sent: false,
            ecdh_reply: None,
            _digest: PhantomData,
        }
    }
}

impl<C, D> Kex for EcdhKex<C, D>
    where C: CurveArithmetic + PointCompression,
          FieldBytesSize<C>: ModulusSize,
          AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
          D: Digest,
{
    fn recv_msg(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::KexEcdhReply { server_pubkey, server_eph_pubkey, exchange_hash_sign } => {
                if self.ecdh_reply.is_some() {
                    return Err(Error::Protocol("received duplicate SSH_MSG_KEX_ECDH_REPLY"))
                }
                // RFC 5656, section 4
                self.ecdh_reply = Some(EcdhReply {
                    server_pubkey,
                    server_eph_pubkey,
                    server_exchange_hash_sign: exchange_hash_sign,
                });
                log::debug!("received SSH_MSG_KEX_ECDH_REPLY");
                Ok(())
            },
            _ => Err(Error::PacketNotImplemented(msg.msg_id())),
        }
    }

    fn send_msg(&mut self) -> Result<Option<Msg>> {
        if !self.ecdh_init_sent {
            // RFC 5656, section 4
            log::debug!("sending SSH_MSG_KEX_ECDH_INIT");
            self.ecdh_init_sent = true;
            return Ok(Some(Msg::KexEcdhInit {
                client_eph_pubkey: self.our_eph_pubkey_sec1.clone(),
            }))
        }
        Ok(None)
    }

    fn poll(&mut self, input: KexInput) -> Poll<Result<KexOutput>> {
        if self.our_eph_privkey.is_some() && self.ecdh_reply.is_some() {
            return Poll::Ready(exchange::<C, D>(self, input))
        }
        Poll::Pending
    }

    fn compute_hash(&self, data: &[u8]) -> Vec<u8> {
        D::digest(data).to_vec()
    }
}

fn exchange<C, D>(kex: &mut EcdhKex<C, D>, input: KexInput) -> Result<KexOutput>
    where C: CurveArithmetic + PointCompression,
          FieldBytesSize<C>: ModulusSize,
          AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
          D: Digest,
{
    let our_eph_privkey = kex.our_eph_privkey.take().unwrap();
    let ecdh_reply = kex.ecdh_reply.take().unwrap();
    let EcdhReply { server_pubkey, server_eph_pubkey, server_exchange_hash_sign } = ecdh_reply;

    let server_eph = elliptic_curve::PublicKey::<C>::from_sec1_bytes(&server_eph_pubkey)
        .map_err(|_| Error::Protocol("server sent invalid ecdh ephemeral public key"))?;

    // the shared secret K is the x coordinate of the shared point (RFC 5656, section 4)
    let shared_secret = our_eph_privkey.diffie_hellman(&server_eph);
    let shared_secret_be = shared_secret.raw_secret_bytes().to_vec();

    let mut exchange_data = PacketEncode::new();
    exchange_data.put_bytes(input.client_ident);
    exchange_data.put_bytes(input.server_ident);
    exchange_data.put_bytes(input.client_kex_init);
    exchange_data.put_bytes(input.server_kex_init);
    exchange_data.put_bytes(&server_pubkey);
    exchange_data.put_bytes(&kex.our_eph_pubkey_sec1);
    exchange_data.put_bytes(&server_eph_pubkey);
    exchange_data.put_mpint_uint_be(&shared_secret_be);
    let exchange_hash = D::digest(&exchange_data.finish()).to_vec();

    Ok(KexOutput { shared_secret_be, exchange_hash, server_pubkey, server_exchange_hash_sign })
}
