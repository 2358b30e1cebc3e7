pub use self::packet_encode::PacketEncode;
pub use self::packet_decode::{PacketDecode, validate_name_list};
pub(crate) use self::recv_pipe::{RecvPipe, RecvPacket};
pub(crate) use self::send_pipe::SendPipe;

/// Hard cap on `packet_length` (RFC 4253, section 6.1 allows implementations to refuse larger
/// packets; OpenSSH and this crate use 35000).
pub(crate) const PACKET_LEN_MAX: usize = 35000;

/// Hard cap on the size of an uncompressed payload (RFC 4253, section 6.1).
pub(crate) const PAYLOAD_LEN_MAX: usize = 32768;

/// Sending or receiving sequence numbers above this high-water mark signal that the connection
/// should rekey before the sequence number wraps.
pub(crate) const SEQ_REKEY_PRESSURE: u32 = 0xf000_0000;

pub(crate) struct Codec {
    pub recv_pipe: RecvPipe,
    pub send_pipe: SendPipe,
}

mod packet_encode;
mod packet_decode;
mod recv_pipe;
mod send_pipe;

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use super::*;
    use crate::cipher::{CipherAlgo, CipherAlgoVariant, PacketEncrypt, PacketDecrypt};
    use crate::cipher;
    use crate::mac::{self, MacAlgo};

    fn make_keying(
        cipher_algo: &'static CipherAlgo,
        mac_algo: &'static MacAlgo,
    ) -> (SendPipe, RecvPipe) {
        let key = vec![0x42; cipher_algo.key_len];
        let iv = vec![0x24; cipher_algo.iv_len];
        let mac_key = vec![0x77; mac_algo.key_len];

        let mut send_pipe = SendPipe::new(&mut OsRng).unwrap();
        let mut recv_pipe = RecvPipe::new();

        match &cipher_algo.variant {
            CipherAlgoVariant::Standard(standard) => {
                let encrypt = (standard.make_encrypt)(&key, &iv);
                let decrypt = (standard.make_decrypt)(&key, &iv);
                let sign_mac = (mac_algo.make_mac)(&mac_key);
                let verify_mac = (mac_algo.make_mac)(&mac_key);
                let (encrypt, decrypt) = if mac_algo.etm {
                    (PacketEncrypt::EncryptThenMac(encrypt, sign_mac),
                        PacketDecrypt::EncryptThenMac(decrypt, verify_mac))
                } else {
                    (PacketEncrypt::EncryptAndMac(encrypt, sign_mac),
                        PacketDecrypt::EncryptAndMac(decrypt, verify_mac))
                };
                send_pipe.set_encrypt(encrypt, cipher_algo.block_len, mac_algo.tag_len);
                recv_pipe.set_decrypt(decrypt, cipher_algo.block_len, mac_algo.tag_len);
            },
            CipherAlgoVariant::Aead(aead) => {
                let encrypt = PacketEncrypt::Aead((aead.make_encrypt)(&key, &iv));
                let decrypt = PacketDecrypt::Aead((aead.make_decrypt)(&key, &iv));
                send_pipe.set_encrypt(encrypt, cipher_algo.block_len, aead.tag_len);
                recv_pipe.set_decrypt(decrypt, cipher_algo.block_len, aead.tag_len);
            },
        }

        (send_pipe, recv_pipe)
    }

    fn check_roundtrip(cipher_algo: &'static CipherAlgo, mac_algo: &'static MacAlgo) {
        let (mut send_pipe, mut recv_pipe) = make_keying(cipher_algo, mac_algo);

        let payloads: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"\x05hello".to_vec(),
            (0u8..=255).cycle().take(1000).collect(),
            vec![0xaa; PAYLOAD_LEN_MAX],
        ];

        for payload in payloads.iter() {
            send_pipe.feed_packet(payload).unwrap();
        }

        recv_pipe.feed_buf().extend_from_slice(send_pipe.peek_bytes());
        for payload in payloads.iter() {
            let packet = recv_pipe.consume_packet()
                .unwrap_or_else(|err| panic!("{}/{}: {:?}", cipher_algo.name, mac_algo.name, err))
                .unwrap();
            assert_eq!(packet.payload.as_ref(), &payload[..],
                "{}/{}", cipher_algo.name, mac_algo.name);
        }
        assert!(recv_pipe.consume_packet().unwrap().is_none());
    }

    #[test]
    fn test_roundtrip_encrypt_and_mac() {
        check_roundtrip(&cipher::NONE, &mac::NONE);
        check_roundtrip(&cipher::AES128_CTR, &mac::HMAC_SHA2_256);
        check_roundtrip(&cipher::AES192_CTR, &mac::HMAC_SHA1);
        check_roundtrip(&cipher::AES256_CTR, &mac::HMAC_SHA2_512);
        check_roundtrip(&cipher::AES128_CBC, &mac::HMAC_SHA1_96);
        check_roundtrip(&cipher::AES256_CBC, &mac::HMAC_MD5);
        check_roundtrip(&cipher::TDES_CBC, &mac::HMAC_SHA1);
    }

    #[test]
    fn test_roundtrip_encrypt_then_mac() {
        check_roundtrip(&cipher::AES128_CTR, &mac::HMAC_SHA2_256_ETM);
        check_roundtrip(&cipher::AES256_CBC, &mac::HMAC_SHA2_512_ETM);
        check_roundtrip(&cipher::AES128_CBC, &mac::HMAC_SHA1_ETM);
    }

    #[test]
    fn test_roundtrip_aead() {
        check_roundtrip(&cipher::AES128_GCM, &mac::NONE);
        check_roundtrip(&cipher::AES256_GCM, &mac::NONE);
        check_roundtrip(&cipher::CHACHA20_POLY1305, &mac::NONE);
    }

    #[test]
    fn test_corrupted_packet_fails_verification() {
        let (mut send_pipe, mut recv_pipe) = make_keying(&cipher::AES128_CTR, &mac::HMAC_SHA2_256);
        send_pipe.feed_packet(b"some payload").unwrap();

        let mut bytes = send_pipe.peek_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        recv_pipe.feed_buf().extend_from_slice(&bytes);
        assert!(matches!(recv_pipe.consume_packet(), Err(crate::Error::Mac)));
    }
}
