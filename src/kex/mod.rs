//! Key exchange algorithms.
//!
//! The key exchange (kex) runs at the start of the connection and then again on every rekeying.
//! It produces a shared secret `K` and an exchange hash `H`, which are used to derive the
//! encryption keys; the `H` of the very first exchange becomes the session id for the lifetime
//! of the connection (RFC 4253, section 7).
//!
//! The client and the server exchange lists of supported algorithms, and the first algorithm on
//! the client's list that is also supported by the server is used for the connection.
//!
//! # Supported algorithms
//!
//! - "curve25519-sha256" ([`CURVE25519_SHA256`])
//! - "curve25519-sha256@libssh.org" ([`CURVE25519_SHA256_LIBSSH`])
//! - "ecdh-sha2-nistp256" ([`ECDH_SHA2_NISTP256`])
//! - "ecdh-sha2-nistp384" ([`ECDH_SHA2_NISTP384`])
//! - "ecdh-sha2-nistp521" ([`ECDH_SHA2_NISTP521`])
//! - "diffie-hellman-group16-sha512" ([`DIFFIE_HELLMAN_GROUP16_SHA512`])
//! - "diffie-hellman-group14-sha256" ([`DIFFIE_HELLMAN_GROUP14_SHA256`])
//! - "diffie-hellman-group14-sha1" ([`DIFFIE_HELLMAN_GROUP14_SHA1`])
//! - "diffie-hellman-group1-sha1" ([`DIFFIE_HELLMAN_GROUP1_SHA1`])
//! - "diffie-hellman-group-exchange-sha256" ([`DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA256`])
//! - "diffie-hellman-group-exchange-sha1" ([`DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA1`])
use bytes::Bytes;
use derivative::Derivative;
use std::task::Poll;
use crate::Result;
use crate::msg::{Msg, KexFamily};
use crate::util::CryptoRngCore;
pub use self::curve25519::{CURVE25519_SHA256, CURVE25519_SHA256_LIBSSH};
pub use self::dh::{
    DIFFIE_HELLMAN_GROUP1_SHA1, DIFFIE_HELLMAN_GROUP14_SHA1, DIFFIE_HELLMAN_GROUP14_SHA256,
    DIFFIE_HELLMAN_GROUP16_SHA512,
};
pub use self::dh_gex::{
    DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA1, DIFFIE_HELLMAN_GROUP_EXCHANGE_SHA256,
};
pub use self::ecdh_nistp::{ECDH_SHA2_NISTP256, ECDH_SHA2_NISTP384, ECDH_SHA2_NISTP521};

mod curve25519;
mod dh;
mod dh_gex;
mod ecdh_nistp;

/// Algorithm for key exchange.
///
/// See the [module documentation][self] for details.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct KexAlgo {
    /// Name of the algorithm.
    pub name: &'static str,
    /// The wire-message family of this method (ids 30 to 49 are method-specific).
    pub(crate) family: KexFamily,
    #[derivative(Debug = "ignore")]
    pub(crate) make_kex: fn(rng: &mut dyn CryptoRngCore) -> Result<Box<dyn Kex + Send>>,
}

/// Inputs to the exchange hash that are owned by the transport engine.
#[derive(Debug)]
pub struct KexInput<'a> {
    pub client_ident: &'a [u8],
    pub server_ident: &'a [u8],
    pub client_kex_init: &'a [u8],
    pub server_kex_init: &'a [u8],
}

/// The product of a key exchange: the shared secret `K` and the exchange hash `H`.
pub struct KexOutput {
    /// Shared secret `K` as an unsigned big endian integer.
    pub shared_secret_be: Vec<u8>,
    /// Exchange hash `H`.
    pub exchange_hash: Vec<u8>,
    /// The server public host key blob `K_S`.
    pub server_pubkey: Bytes,
    /// The signature of `H` by the server host key.
    pub server_exchange_hash_sign: Bytes,
}

pub trait Kex {
    fn recv_msg(&mut self, msg: Msg) -> Result<()>;
    fn send_msg(&mut self) -> Result<Option<Msg>>;
    fn poll(&mut self, input: KexInput) -> Poll<Result<KexOutput>>;
    fn compute_hash(&self, data: &[u8]) -> Vec<u8>;
}
