use bytes::{Buf as _, BufMut as _, BytesMut};
use rand::{RngCore as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use crate::{Error, Result};
use crate::cipher::{self, PacketEncrypt};
use crate::compress::Compress;
use crate::mac;
use crate::util::CryptoRngCore;
use super::{PAYLOAD_LEN_MAX, SEQ_REKEY_PRESSURE};

pub(crate) struct SendPipe {
    buf: BytesMut,
    encrypt: PacketEncrypt,
    block_len: usize,
    tag_len: usize,
    packet_seq: u64,
    seq_at_new_keys: u64,
    packets_since_new_keys: u64,
    bytes_since_new_keys: u64,
    compress: Option<Box<dyn Compress + Send>>,
    delayed_compress: Option<Box<dyn Compress + Send>>,
    padding_rng: ChaCha8Rng,
}

impl SendPipe {
    pub fn new(rng: &mut dyn CryptoRngCore) -> Result<SendPipe> {
        let padding_rng = ChaCha8Rng::from_rng(rng.as_rngcore())
            .map_err(|_| Error::Random("could not generate seed for padding generator"))?;
        Ok(SendPipe {
            buf: BytesMut::new(),
            encrypt: PacketEncrypt::EncryptAndMac(Box::new(cipher::Identity), Box::new(mac::Empty)),
            block_len: 8,
            tag_len: 0,
            packet_seq: 0,
            seq_at_new_keys: 0,
            packets_since_new_keys: 0,
            bytes_since_new_keys: 0,
            compress: None,
            delayed_compress: None,
            padding_rng,
        })
    }

    pub fn feed_ident(&mut self, ident: &[u8]) {
        // RFC 4253, section 4.2
        self.buf.reserve(ident.len() + 2);
        self.buf.put_slice(ident);
        self.buf.put_slice(&b"\r\n"[..]);
    }

    pub fn feed_packet(&mut self, payload: &[u8]) -> Result<u32> {
        log::trace!("feed packet {}, len {}, seq {}",
            payload.first().cloned().unwrap_or(0), payload.len(), self.packet_seq);

        // the sequence number of the MAC is 32 bits: it must never repeat for a single set of
        // keys, so the connection must rekey before we send 2^32 packets
        if self.packets_since_new_keys >= u32::MAX as u64 {
            return Err(Error::Protocol("sequence number would wrap without rekey"))
        }

        let compressed;
        let payload = match self.compress.as_mut() {
            Some(compress) => {
                compressed = compress.compress(payload)?;
                &compressed[..]
            },
            None => payload,
        };

        if payload.len() > PAYLOAD_LEN_MAX {
            return Err(Error::Protocol("packet payload is too long"))
        }

        let len_plaintext = self.encrypt.is_len_plaintext();
        let padding_len = calculate_padding_len(payload.len(), self.block_len, len_plaintext);

        // RFC 4253, section 6
        //
        // packet layout:
        // 4 bytes: `packet_len = 1 + payload_len + padding_len` (u32 big endian)
        // 1 byte: padding_len (u8)
        // `payload_len` bytes: payload
        // `padding_len` bytes: random padding
        // `tag_len` bytes: mac tag

        let packet_begin = self.buf.len();
        self.buf.reserve(5 + payload.len() + padding_len + self.tag_len);
        self.buf.put_u32((1 + payload.len() + padding_len) as u32);
        self.buf.put_u8(padding_len as u8);
        self.buf.put_slice(payload);
        self.buf.put_bytes(0, padding_len + self.tag_len);

        let packet = &mut self.buf[packet_begin..];
        self.padding_rng.fill_bytes(&mut packet[5 + payload.len()..][..padding_len]);

        let (plaintext, tag) = packet.split_at_mut(5 + payload.len() + padding_len);
        match self.encrypt {
            PacketEncrypt::EncryptAndMac(ref mut encrypt, ref mut mac) => {
                mac.sign(self.packet_seq as u32, plaintext, tag);
                encrypt.encrypt(plaintext);
            },
            PacketEncrypt::EncryptThenMac(ref mut encrypt, ref mut mac) => {
                // the packet length stays in plaintext, the tag covers it plus the ciphertext
                let (_, ciphertext) = plaintext.split_at_mut(4);
                encrypt.encrypt(ciphertext);
                mac.sign(self.packet_seq as u32, plaintext, tag);
            },
            PacketEncrypt::Aead(ref mut aead) => {
                aead.encrypt_and_sign(self.packet_seq, plaintext, tag);
            },
        }

        let packet_seq = self.packet_seq as u32;
        self.packet_seq += 1;
        self.packets_since_new_keys += 1;
        self.bytes_since_new_keys += (self.buf.len() - packet_begin) as u64;
        Ok(packet_seq)
    }

    pub fn set_encrypt(&mut self, encrypt: PacketEncrypt, block_len: usize, tag_len: usize) {
        self.encrypt = encrypt;
        self.block_len = block_len;
        self.tag_len = tag_len;
        self.seq_at_new_keys = self.packet_seq;
        self.packets_since_new_keys = 0;
        self.bytes_since_new_keys = 0;
    }

    pub fn set_compress(&mut self, compress: Option<Box<dyn Compress + Send>>, delayed: bool) {
        if delayed {
            self.delayed_compress = compress;
        } else {
            self.compress = compress;
            self.delayed_compress = None;
        }
    }

    /// Start delayed compression (`zlib@openssh.com`) after authentication.
    pub fn activate_delayed_compress(&mut self) {
        if let Some(compress) = self.delayed_compress.take() {
            log::debug!("activating delayed compression for sending");
            self.compress = Some(compress);
        }
    }

    /// True once enough packets or bytes went out that the transport should rekey.
    ///
    /// The sequence number also forces a rekey when it crosses its high-water mark within the
    /// current keying epoch: the mark is crossed at most once per epoch, so the signal clears
    /// after the rekey even though the sequence number itself never resets.
    pub fn rekey_pressure(&self, bytes_limit: u64, packets_limit: u64) -> bool {
        (self.packet_seq as u32 > SEQ_REKEY_PRESSURE
                && self.seq_at_new_keys as u32 <= SEQ_REKEY_PRESSURE)
            || self.packets_since_new_keys >= packets_limit
            || self.bytes_since_new_keys >= bytes_limit
    }

    pub fn peek_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn consume_bytes(&mut self, len: usize) {
        self.buf.advance(len);
    }
}

fn calculate_padding_len(payload_len: usize, block_len: usize, len_plaintext: bool) -> usize {
    // RFC 4253, section 6: with AEAD ciphers and encrypt-then-MAC, the length field is not part
    // of the encrypted data, so it does not count towards the block alignment
    let header_len = if len_plaintext { 1 } else { 5 };
    let min_padded_len = header_len + payload_len + 4;
    let padded_len = (min_padded_len + block_len - 1) / block_len * block_len;
    padded_len - payload_len - header_len
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use super::*;

    #[test]
    fn test_is_send() {
        fn assert_is_send<T: Send>() {}
        assert_is_send::<SendPipe>()
    }

    #[test]
    fn test_calculate_padding_len() {
        for &block_len in &[1, 2, 4, 8, 16, 32] {
            for payload_len in 0..100 {
                let padding_len = calculate_padding_len(payload_len, block_len, false);
                assert_eq!((5 + payload_len + padding_len) % block_len, 0);
                assert!(padding_len >= 4);

                let padding_len = calculate_padding_len(payload_len, block_len, true);
                assert_eq!((1 + payload_len + padding_len) % block_len, 0);
                assert!(padding_len >= 4);
            }
        }
    }

    #[test]
    fn test_feed_ident() {
        let mut pipe = SendPipe::new(&mut OsRng).unwrap();
        pipe.feed_ident(b"SSH-2.0-hawser");
        assert_eq!(pipe.peek_bytes(), b"SSH-2.0-hawser\r\n");
    }

    #[test]
    fn test_feed_packet_plaintext_layout() {
        let mut pipe = SendPipe::new(&mut OsRng).unwrap();
        let seq = pipe.feed_packet(b"foo").unwrap();
        assert_eq!(seq, 0);

        let bytes = pipe.peek_bytes();
        // 4 + 1 + 3 + padding aligned to 8, padding >= 4
        assert_eq!(&bytes[..4], &[0, 0, 0, 12]);
        assert_eq!(bytes[4], 8);
        assert_eq!(&bytes[5..8], b"foo");
        assert_eq!(bytes.len(), 16);

        assert_eq!(pipe.feed_packet(b"bar").unwrap(), 1);
    }

    #[test]
    fn test_payload_too_long() {
        let mut pipe = SendPipe::new(&mut OsRng).unwrap();
        let payload = vec![0; PAYLOAD_LEN_MAX + 1];
        assert!(pipe.feed_packet(&payload).is_err());

        let payload = vec![0; PAYLOAD_LEN_MAX];
        assert!(pipe.feed_packet(&payload).is_ok());
    }
}
