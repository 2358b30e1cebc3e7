//! Message authentication algorithms.
//!
//! The SSH protocol uses MACs (message authentication codes) to provide **integrity** (the
//! attacker cannot modify the messages that we exchange over SSH).
//!
//! The client and the server exchange lists of supported algorithms, and the first algorithm on
//! the client's list that is also supported by the server is used for the connection. MACs are
//! not used with [AEAD ciphers][crate::cipher] such as chacha20-poly1305, which protect the
//! integrity of the packet themselves.
//!
//! # Supported algorithms
//!
//! - "hmac-sha2-256" ([`HMAC_SHA2_256`])
//! - "hmac-sha2-512" ([`HMAC_SHA2_512`])
//! - "hmac-sha1" ([`HMAC_SHA1`])
//! - "hmac-sha1-96" ([`HMAC_SHA1_96`])
//! - "hmac-md5" ([`HMAC_MD5`])
//! - "hmac-sha2-256-etm@openssh.com" ([`HMAC_SHA2_256_ETM`])
//! - "hmac-sha2-512-etm@openssh.com" ([`HMAC_SHA2_512_ETM`])
//! - "hmac-sha1-etm@openssh.com" ([`HMAC_SHA1_ETM`])
//! - "none" ([`NONE`])
use crate::Result;
pub use self::hmac::{
    HMAC_SHA2_256, HMAC_SHA2_512, HMAC_SHA1, HMAC_SHA1_96, HMAC_MD5,
    HMAC_SHA2_256_ETM, HMAC_SHA2_512_ETM, HMAC_SHA1_ETM,
};
pub use self::none::NONE;
pub(crate) use self::none::Empty;

mod hmac;
mod none;

/// Algorithm for authenticating messages.
///
/// See the [module documentation][self] for details.
#[derive(Debug)]
pub struct MacAlgo {
    /// Name of the algorithm.
    pub name: &'static str,
    /// Length of the tag in bytes.
    pub tag_len: usize,
    /// Length of the key in bytes.
    pub key_len: usize,
    /// Encrypt-then-MAC: the MAC is computed over the encrypted packet and the packet length is
    /// not encrypted.
    pub(crate) etm: bool,
    pub(crate) make_mac: fn(key: &[u8]) -> Box<dyn Mac + Send>,
}

pub(crate) trait Mac {
    fn sign(&mut self, packet_seq: u32, data: &[u8], tag: &mut [u8]);
    fn verify(&mut self, packet_seq: u32, data: &[u8], tag: &[u8]) -> Result<MacVerified>;
}

/// Proof that the MAC of a packet has been verified.
#[derive(Debug)]
pub struct MacVerified(());

impl MacVerified {
    pub fn assertion() -> Self {
        Self(())
    }
}
