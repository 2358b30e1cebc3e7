use hmac::{digest, Hmac};
use std::marker::PhantomData;
use subtle::ConstantTimeEq as _;
use crate::error::{Result, Error};
use super::{MacAlgo, Mac, MacVerified};

/// "hmac-sha2-256" MAC from RFC 6668.
pub static HMAC_SHA2_256: MacAlgo = MacAlgo {
    name: "hmac-sha2-256",
    tag_len: 32,
    key_len: 32,
    etm: false,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha2::Sha256>>::new(key, 32)),
};

/// "hmac-sha2-512" MAC from RFC 6668.
pub static HMAC_SHA2_512: MacAlgo = MacAlgo {
    name: "hmac-sha2-512",
    tag_len: 64,
    key_len: 64,
    etm: false,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha2::Sha512>>::new(key, 64)),
};

/// "hmac-sha1" MAC from RFC 4253.
pub static HMAC_SHA1: MacAlgo = MacAlgo {
    name: "hmac-sha1",
    tag_len: 20,
    key_len: 20,
    etm: false,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha1::Sha1>>::new(key, 20)),
};

/// "hmac-sha1-96" MAC from RFC 4253 (tag truncated to 96 bits).
pub static HMAC_SHA1_96: MacAlgo = MacAlgo {
    name: "hmac-sha1-96",
    tag_len: 12,
    key_len: 20,
    etm: false,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha1::Sha1>>::new(key, 12)),
};

/// "hmac-md5" MAC from RFC 4253.
pub static HMAC_MD5: MacAlgo = MacAlgo {
    name: "hmac-md5",
    tag_len: 16,
    key_len: 16,
    etm: false,
    make_mac: |key| Box::new(HmacMac::<Hmac<md5::Md5>>::new(key, 16)),
};

/// "hmac-sha2-256-etm@openssh.com" MAC (encrypt-then-MAC) as introduced by OpenSSH.
pub static HMAC_SHA2_256_ETM: MacAlgo = MacAlgo {
    name: "hmac-sha2-256-etm@openssh.com",
    tag_len: 32,
    key_len: 32,
    etm: true,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha2::Sha256>>::new(key, 32)),
};

/// "hmac-sha2-512-etm@openssh.com" MAC (encrypt-then-MAC) as introduced by OpenSSH.
pub static HMAC_SHA2_512_ETM: MacAlgo = MacAlgo {
    name: "hmac-sha2-512-etm@openssh.com",
    tag_len: 64,
    key_len: 64,
    etm: true,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha2::Sha512>>::new(key, 64)),
};

/// "hmac-sha1-etm@openssh.com" MAC (encrypt-then-MAC) as introduced by OpenSSH.
pub static HMAC_SHA1_ETM: MacAlgo = MacAlgo {
    name: "hmac-sha1-etm@openssh.com",
    tag_len: 20,
    key_len: 20,
    etm: true,
    make_mac: |key| Box::new(HmacMac::<Hmac<sha1::Sha1>>::new(key, 20)),
};


struct HmacMac<M> {
    key: Vec<u8>,
    tag_len: usize,
    _phantom: PhantomData<M>,
}

impl<M> HmacMac<M> {
    fn new(key: &[u8], tag_len: usize) -> HmacMac<M> {
        HmacMac { key: key.into(), tag_len, _phantom: PhantomData }
    }
}

impl<M: digest::Mac + digest::KeyInit + Send> HmacMac<M> {
    fn compute(&self, packet_seq: u32, data: &[u8]) -> digest::Output<M> {
        let mut digest = <M as digest::Mac>::new_from_slice(&self.key)
            .expect("hmac accepts keys of any length");
        digest.update(&packet_seq.to_be_bytes());
        digest.update(data);
        digest.finalize().into_bytes()
    }
}

impl<M: digest::Mac + digest::KeyInit + Send> Mac for HmacMac<M> {
    fn sign(&mut self, packet_seq: u32, data: &[u8], tag: &mut [u8]) {
        let computed = self.compute(packet_seq, data);
        tag.copy_from_slice(&computed[..self.tag_len]);
    }

    fn verify(&mut self, packet_seq: u32, data: &[u8], tag: &[u8]) -> Result<MacVerified> {
        let computed = self.compute(packet_seq, data);
        // constant-time comparison, also for truncated tags such as hmac-sha1-96
        if computed[..self.tag_len].ct_eq(tag).into() {
            Ok(MacVerified::assertion())
        } else {
            Err(Error::Mac)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(algo: &MacAlgo) {
        let key = (0..algo.key_len as u8).collect::<Vec<_>>();
        let mut mac = (algo.make_mac)(&key);

        let mut tag = vec![0; algo.tag_len];
        mac.sign(7, b"some packet bytes", &mut tag);
        assert!(mac.verify(7, b"some packet bytes", &tag).is_ok());

        // a different sequence number or different data must not verify
        assert!(mac.verify(8, b"some packet bytes", &tag).is_err());
        assert!(mac.verify(7, b"some packet bytez", &tag).is_err());

        // a corrupted tag must not verify, whichever byte is corrupted
        for i in 0..tag.len() {
            let mut bad_tag = tag.clone();
            bad_tag[i] ^= 0x40;
            assert!(mac.verify(7, b"some packet bytes", &bad_tag).is_err());
        }
    }

    #[test]
    fn test_roundtrip() {
        for algo in [
            &HMAC_SHA2_256, &HMAC_SHA2_512, &HMAC_SHA1, &HMAC_SHA1_96, &HMAC_MD5,
            &HMAC_SHA2_256_ETM, &HMAC_SHA2_512_ETM, &HMAC_SHA1_ETM,
        ] {
            roundtrip(algo);
        }
    }

    #[test]
    fn test_truncated_tag_len() {
        let key = vec![0x0b; 20];
        let mut mac = (HMAC_SHA1_96.make_mac)(&key);
        let mut tag = vec![0; HMAC_SHA1_96.tag_len];
        mac.sign(0, b"hi", &mut tag);
        assert_eq!(tag.len(), 12);
    }

    #[test]
    fn test_verify_timing_independent_of_mismatch_position() {
        use std::time::Instant;

        // a comparison that branches on the first mismatching byte returns faster for tags
        // that differ early than for tags that differ late; with a constant-time comparison
        // the verification time must not depend on where the mismatch sits
        let key = vec![0x0b; 32];
        let mut mac = (HMAC_SHA2_256.make_mac)(&key);
        let data = [0x5a; 256];
        let mut good_tag = vec![0; 32];
        mac.sign(1, &data, &mut good_tag);

        const ITERS: usize = 2000;

        let mut median_for_position = |position: usize| -> u128 {
            let mut bad_tag = good_tag.clone();
            bad_tag[position] ^= 0x80;

            let mut samples = Vec::with_capacity(ITERS);
            for _ in 0..ITERS {
                let start = Instant::now();
                assert!(mac.verify(1, &data, &bad_tag).is_err());
                samples.push(start.elapsed().as_nanos());
            }
            samples.sort_unstable();
            samples[samples.len() / 2]
        };

        // warm up caches, branch predictors and frequency scaling before measuring
        let _ = median_for_position(0);

        let medians = (0..good_tag.len())
            .map(&mut median_for_position)
            .collect::<Vec<_>>();

        // medians over many runs are stable; allow a generous band for machine noise, which
        // is still far below the early-exit effect of a branching comparison
        let min = *medians.iter().min().unwrap() as f64;
        let max = *medians.iter().max().unwrap() as f64;
        assert!(max <= min * 3.0,
            "verification time varies with mismatch position: {:?}", medians);

        // in particular, a mismatch in the first byte must not verify measurably faster than
        // a mismatch in the last byte
        let first = medians[0] as f64;
        let last = *medians.last().unwrap() as f64;
        assert!(first <= last * 2.0 && last <= first * 2.0,
            "first-byte vs last-byte mismatch timing: {} vs {}", first, last);
    }
}
