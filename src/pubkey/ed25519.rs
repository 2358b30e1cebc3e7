use bytes::Bytes;
use guard::guard;
use std::fmt;
use crate::codec::{PacketDecode, PacketEncode};
use crate::error::{Result, Error};
use super::{PubkeyAlgo, Pubkey, Privkey, SignatureVerified};

/// "ssh-ed25519" public key algorithm from RFC 8709.
///
/// This algorithm is compatible with [`Ed25519Pubkey`] and [`Ed25519Privkey`].
pub static SSH_ED25519: PubkeyAlgo = PubkeyAlgo {
    name: "ssh-ed25519",
    verify,
    sign,
};

/// Ed25519 public key from RFC 8032.
///
/// This key is compatible with [`SSH_ED25519`]. You can convert it to and from
/// [`ed25519_dalek::VerifyingKey`] using `from()`/`into()`.
#[derive(Debug, Clone)]
pub struct Ed25519Pubkey {
    pub(crate) pubkey: ed25519_dalek::VerifyingKey,
}

/// Ed25519 keypair from RFC 8032.
///
/// This key is compatible with [`SSH_ED25519`]. You can convert it to and from
/// [`ed25519_dalek::SigningKey`] using `from()`/`into()`.
#[derive(Clone)]
pub struct Ed25519Privkey {
    pub(crate) keypair: ed25519_dalek::SigningKey,
}

impl Ed25519Privkey {
    /// Get the public key associated with this private key.
    pub fn pubkey(&self) -> Ed25519Pubkey {
        Ed25519Pubkey { pubkey: self.keypair.verifying_key() }
    }
}

fn verify(pubkey: &Pubkey, message: &[u8], signature: Bytes) -> Result<SignatureVerified> {
    guard!{let Pubkey::Ed25519(pubkey) = pubkey else { return Err(Error::PubkeyFormat) }};

    let mut signature = PacketDecode::new(signature);
    if signature.get_string()? != "ssh-ed25519" {
        return Err(Error::Decode("expected signature format 'ssh-ed25519'"))
    }

    let signature_data = signature.get_byte_array::<64>()?;
    let ed_signature = ed25519_dalek::Signature::from_bytes(&signature_data);

    match pubkey.pubkey.verify_strict(message, &ed_signature) {
        Ok(_) => Ok(SignatureVerified::assertion()),
        Err(_) => Err(Error::Signature),
    }
}

fn sign(privkey: &Privkey, message: &[u8]) -> Result<Bytes> {
    guard!{let Privkey::Ed25519(privkey) = privkey else { return Err(Error::PrivkeyFormat) }};

    use ed25519_dalek::Signer as _;
    let ed_signature = privkey.keypair.try_sign(message)
        .map_err(|_| Error::Crypto("could not sign with ed25519"))?;

    let mut signature = PacketEncode::new();
    signature.put_str("ssh-ed25519");
    signature.put_bytes(&ed_signature.to_bytes());
    Ok(signature.finish())
}

pub(super) fn decode(blob: &mut PacketDecode) -> Result<Ed25519Pubkey> {
    let pubkey_data = blob.get_byte_array::<32>()?;
    let pubkey = ed25519_dalek::VerifyingKey::from_bytes(&pubkey_data)
        .map_err(|_| Error::Decode("decoded ssh-ed25519 pubkey is invalid"))?;
    Ok(Ed25519Pubkey { pubkey })
}

pub(super) fn encode(blob: &mut PacketEncode, pubkey: &Ed25519Pubkey) {
    blob.put_str("ssh-ed25519");
    blob.put_bytes(pubkey.pubkey.as_bytes());
}

impl From<ed25519_dalek::VerifyingKey> for Ed25519Pubkey {
    fn from(pubkey: ed25519_dalek::VerifyingKey) -> Self {
        Self { pubkey }
    }
}

impl From<Ed25519Pubkey> for ed25519_dalek::VerifyingKey {
    fn from(pubkey: Ed25519Pubkey) -> Self {
        pubkey.pubkey
    }
}

impl From<ed25519_dalek::SigningKey> for Ed25519Privkey {
    fn from(keypair: ed25519_dalek::SigningKey) -> Self {
        Self { keypair }
    }
}

impl From<Ed25519Privkey> for ed25519_dalek::SigningKey {
    fn from(privkey: Ed25519Privkey) -> Self {
        privkey.keypair
    }
}

impl fmt::Display for Ed25519Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ed25519 {:x}", Bytes::copy_from_slice(self.pubkey.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubkey::{Pubkey, Privkey};

    fn keypair() -> Ed25519Privkey {
        let keypair = ed25519_dalek::SigningKey::from_bytes(&[0x17; 32]);
        Ed25519Privkey { keypair }
    }

    #[test]
    fn test_pubkey_blob_roundtrip() {
        let pubkey = Pubkey::Ed25519(keypair().pubkey());
        let blob = pubkey.encode();
        let decoded = Pubkey::decode(blob.clone()).unwrap();
        assert_eq!(decoded.encode(), blob);
    }

    #[test]
    fn test_sign_and_verify() {
        let privkey = Privkey::Ed25519(keypair());
        let pubkey = privkey.pubkey();

        let signature = (SSH_ED25519.sign)(&privkey, b"a signed message").unwrap();
        assert!((SSH_ED25519.verify)(&pubkey, b"a signed message", signature.clone()).is_ok());
        assert!((SSH_ED25519.verify)(&pubkey, b"a different message", signature).is_err());
    }
}
