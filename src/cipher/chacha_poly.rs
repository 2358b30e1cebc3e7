use cipher::{KeyIvInit as _, StreamCipherCore as _};
use cipher::generic_array::GenericArray;
use cipher::inout::InOutBuf;
use poly1305::universal_hash::KeyInit as _;
use subtle::ConstantTimeEq as _;
use crate::{Result, Error};
use crate::mac::MacVerified;
use super::{CipherAlgo, CipherAlgoVariant, AeadCipherAlgo, AeadEncrypt, AeadDecrypt};

/// "chacha20-poly1305@openssh.com" cipher as introduced by OpenSSH.
///
/// This is an AEAD cipher that does not use an additional [mac algorithm][crate::mac]. The 64
/// derived key bytes are split into two ChaCha20 keys: the first 32 bytes key the payload
/// cipher, the second 32 bytes key a separate cipher that only encrypts the packet length
/// field (OpenSSH PROTOCOL.chacha20poly1305).
pub static CHACHA20_POLY1305: CipherAlgo = CipherAlgo {
    name: "chacha20-poly1305@openssh.com",
    block_len: 8,
    key_len: 64,
    iv_len: 0,
    variant: CipherAlgoVariant::Aead(AeadCipherAlgo {
        tag_len: 16,
        make_encrypt: |key, _| Box::new(new_chacha_poly(key)),
        make_decrypt: |key, _| Box::new(new_chacha_poly(key)),
    }),
};


struct ChachaPolyCipher {
    payload_key: chacha20::Key,
    len_key: chacha20::Key,
}

fn new_chacha_poly(key: &[u8]) -> ChachaPolyCipher {
    let payload_key = *chacha20::Key::from_slice(&key[..32]);
    let len_key = *chacha20::Key::from_slice(&key[32..]);
    ChachaPolyCipher { payload_key, len_key }
}

impl ChachaPolyCipher {
    fn poly_key(&self, nonce: &chacha20::LegacyNonce) -> (chacha20::ChaCha20LegacyCore, poly1305::Key) {
        // the Poly1305 key is the first 32 bytes of the keystream at counter 0, the payload
        // starts at counter 1
        let mut chacha = chacha20::ChaCha20LegacyCore::new(&self.payload_key, nonce);
        let mut key_block = [0; 64].into();
        chacha.write_keystream_block(&mut key_block);
        let poly_key = *poly1305::Key::from_slice(&key_block[..32]);
        (chacha, poly_key)
    }
}

impl AeadEncrypt for ChachaPolyCipher {
    fn encrypt_and_sign(&mut self, packet_seq: u64, packet: &mut [u8], tag: &mut [u8]) {
        let nonce = chacha20::LegacyNonce::from(packet_seq.to_be_bytes());

        let len_chacha = chacha20::ChaCha20LegacyCore::new(&self.len_key, &nonce);
        len_chacha.apply_keystream_partial(InOutBuf::from(&mut packet[..4]));

        let (mut payload_chacha, poly_key) = self.poly_key(&nonce);
        payload_chacha.apply_keystream_partial(InOutBuf::from(&mut packet[4..]));

        let poly = poly1305::Poly1305::new(&poly_key);
        let poly_tag = poly.compute_unpadded(packet);
        tag.copy_from_slice(&poly_tag);
    }
}

impl AeadDecrypt for ChachaPolyCipher {
    fn decrypt_packet_len(&mut self, packet_seq: u64, ciphertext: &[u8], plaintext: &mut [u8]) {
        let nonce = chacha20::LegacyNonce::from(packet_seq.to_be_bytes());
        let len_chacha = chacha20::ChaCha20LegacyCore::new(&self.len_key, &nonce);
        len_chacha.apply_keystream_partial(InOutBuf::new(ciphertext, plaintext).unwrap());
    }

    fn decrypt_and_verify(&mut self, packet_seq: u64, packet: &mut [u8], tag: &[u8]) -> Result<MacVerified> {
        let nonce = chacha20::LegacyNonce::from(packet_seq.to_be_bytes());
        let (mut payload_chacha, poly_key) = self.poly_key(&nonce);

        // the tag is verified over the ciphertext before anything is decrypted
        let poly = poly1305::Poly1305::new(&poly_key);
        let poly_tag = poly.compute_unpadded(packet);
        let verified =
            if poly_tag.ct_eq(poly1305::Block::from_slice(tag)).into() {
                MacVerified::assertion()
            } else {
                return Err(Error::Mac)
            };

        payload_chacha.apply_keystream_partial(InOutBuf::from(&mut packet[4..]));
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = (0u8..64).collect::<Vec<_>>();
        let mut encrypt = new_chacha_poly(&key);
        let mut decrypt = new_chacha_poly(&key);

        let plaintext: &[u8] = b"\x00\x00\x00\x1c\x06payload bytes here\x00\x00\x00\x00\x00\x00";
        let mut packet = plaintext.to_vec();
        let mut tag = [0; 16];
        encrypt.encrypt_and_sign(3, &mut packet, &mut tag);
        assert_ne!(&packet, plaintext);

        let mut len = [0; 4];
        decrypt.decrypt_packet_len(3, &packet[..4], &mut len);
        assert_eq!(len, [0x00, 0x00, 0x00, 0x1c]);

        decrypt.decrypt_and_verify(3, &mut packet, &tag).unwrap();
        assert_eq!(&packet, plaintext);
    }

    #[test]
    fn test_bad_tag() {
        let key = (0u8..64).collect::<Vec<_>>();
        let mut encrypt = new_chacha_poly(&key);
        let mut decrypt = new_chacha_poly(&key);

        let mut packet = b"\x00\x00\x00\x0cdata00000000".to_vec();
        let mut tag = [0; 16];
        encrypt.encrypt_and_sign(0, &mut packet, &mut tag);
        tag[0] ^= 1;
        assert!(decrypt.decrypt_and_verify(0, &mut packet, &tag).is_err());
    }

    #[test]
    fn test_wrong_seq() {
        let key = vec![7; 64];
        let mut encrypt = new_chacha_poly(&key);
        let mut decrypt = new_chacha_poly(&key);

        let mut packet = b"\x00\x00\x00\x0cdata00000000".to_vec();
        let mut tag = [0; 16];
        encrypt.encrypt_and_sign(1, &mut packet, &mut tag);
        assert!(decrypt.decrypt_and_verify(2, &mut packet, &tag).is_err());
    }
}
