//! Deterministic and random password generation.
//!
//! Both deterministic schemes key HMAC-SHA-512 with the master secret and
//! read the resulting bit stream a fixed number of bits per output character.
//! The bit stream is kept as ASCII `'0'`/`'1'` text because that text is also
//! fed back into the next HMAC block.

use super::{Charset, DeriveError, Result};
use crate::codec::RecordParams;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

/// Tag returned in place of a fingerprint for random passwords
pub const RANDOM_TAG: &str = "RANDOM";

const MIN_BITS_PER_CHAR: usize = 7;
const FINGERPRINT_LEN: usize = 8;
const LEGACY_BITS_PER_CHAR: usize = 7;
const LEGACY_TOTAL_BITS: usize = 1024;

/// Result of a deterministic derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub password: String,
    /// First 8 upper-case hex digits of `HMAC(secret, secret)`
    pub fingerprint: String,
}

/// Result of a random generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomPassword {
    pub password: String,
    pub tag: &'static str,
}

/// Deterministic derivation scheme, chosen by the record version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationScheme {
    /// Each HMAC block is chained on the bits emitted so far; unbounded length
    Ratchet,
    /// Two fixed blocks, 7 bits per character
    Legacy,
}

impl DerivationScheme {
    /// Non-negative versions use [`Ratchet`](Self::Ratchet), negative ones [`Legacy`](Self::Legacy)
    pub fn for_version(version: i32) -> Self {
        if version < 0 {
            DerivationScheme::Legacy
        } else {
            DerivationScheme::Ratchet
        }
    }

    /// Longest password the scheme can produce
    pub fn max_length(self) -> Option<usize> {
        match self {
            DerivationScheme::Ratchet => None,
            DerivationScheme::Legacy => Some(LEGACY_TOTAL_BITS / LEGACY_BITS_PER_CHAR),
        }
    }

    /// Descriptor string for a version and salt, `"<version>:<salt>"`
    pub fn descriptor(version: i32, salt: &str) -> String {
        format!("{}:{}", version.unsigned_abs(), salt)
    }
}

fn keyed_mac(secret: &str) -> Result<HmacSha512> {
    if secret.is_empty() {
        return Err(DeriveError::EmptySecret);
    }
    HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| DeriveError::KeyRejected(e.to_string()))
}

/// One HMAC block over the concatenation of `parts`
fn hmac_block(mac: &HmacSha512, parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = mac.clone();
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

/// Append the bits of `bytes` as ASCII digits, MSB first
fn push_bits(window: &mut Vec<u8>, bytes: &[u8]) {
    window.reserve(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            window.push(if (byte >> shift) & 1 == 1 { b'1' } else { b'0' });
        }
    }
}

fn bits_to_index(bits: &[u8], modulus: usize) -> usize {
    let value = bits
        .iter()
        .fold(0u128, |acc, bit| (acc << 1) | u128::from(*bit == b'1'));
    (value % modulus as u128) as usize
}

fn bits_per_char(charset_len: usize) -> usize {
    let needed = (usize::BITS - charset_len.saturating_sub(1).leading_zeros()) as usize;
    needed.max(MIN_BITS_PER_CHAR)
}

/// Fingerprint of the master secret, independent of the descriptor
pub fn fingerprint(secret: &str) -> Result<String> {
    let mac = keyed_mac(secret)?;
    let block = hmac_block(&mac, &[secret.as_bytes()]);
    Ok(hex::encode_upper(&block[..FINGERPRINT_LEN / 2]))
}

/// Derive a password with the ratchet scheme
pub fn derive(secret: &str, descriptor: &str, charset: &Charset, length: usize) -> Result<Derived> {
    derive_with_scheme(DerivationScheme::Ratchet, secret, descriptor, charset, length)
}

/// Derive a password with an explicit scheme
pub fn derive_with_scheme(
    scheme: DerivationScheme,
    secret: &str,
    descriptor: &str,
    charset: &Charset,
    length: usize,
) -> Result<Derived> {
    let mac = keyed_mac(secret)?;
    if charset.is_empty() {
        return Err(DeriveError::NoCharsetSelected);
    }
    if let Some(max) = scheme.max_length() {
        if length > max {
            return Err(DeriveError::LengthUnsupported {
                requested: length,
                max,
            });
        }
    }

    let password = match scheme {
        DerivationScheme::Ratchet => ratchet(&mac, descriptor.as_bytes(), charset, length),
        DerivationScheme::Legacy => legacy(&mac, descriptor.as_bytes(), charset, length),
    };
    let block = hmac_block(&mac, &[secret.as_bytes()]);

    debug!("Derived {} characters with {:?} scheme", length, scheme);

    Ok(Derived {
        password,
        fingerprint: hex::encode_upper(&block[..FINGERPRINT_LEN / 2]),
    })
}

fn ratchet(mac: &HmacSha512, descriptor: &[u8], charset: &Charset, length: usize) -> String {
    let width = bits_per_char(charset.len());
    let mut window: Vec<u8> = Vec::new();
    let mut seek = 0usize;
    let mut password = String::with_capacity(length);

    for i in 0..length {
        let start = i * width;
        let end = start + width;

        while end > seek + window.len() {
            let block = hmac_block(mac, &[descriptor, &window]);
            push_bits(&mut window, &block);
            window.drain(..start - seek);
            seek = start;
        }

        let index = bits_to_index(&window[start - seek..end - seek], charset.len());
        charset.push_to(index, &mut password);
    }

    password
}

fn legacy(mac: &HmacSha512, descriptor: &[u8], charset: &Charset, length: usize) -> String {
    let mut bits = Vec::with_capacity(LEGACY_TOTAL_BITS);
    push_bits(&mut bits, &hmac_block(mac, &[descriptor]));
    let chained = bits.clone();
    push_bits(&mut bits, &hmac_block(mac, &[descriptor, &chained]));

    let mut password = String::with_capacity(length);
    for chunk in bits.chunks_exact(LEGACY_BITS_PER_CHAR).take(length) {
        charset.push_to(bits_to_index(chunk, charset.len()), &mut password);
    }
    password
}

/// Draw each character from one OS RNG byte, reduced modulo the charset length
pub fn derive_random(charset: &Charset, length: usize) -> Result<RandomPassword> {
    if charset.is_empty() {
        return Err(DeriveError::NoCharsetSelected);
    }

    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| DeriveError::RandomFailed(e.to_string()))?;

    let mut password = String::with_capacity(length);
    for byte in bytes {
        charset.push_to(usize::from(byte) % charset.len(), &mut password);
    }

    Ok(RandomPassword {
        password,
        tag: RANDOM_TAG,
    })
}

fn requested_length(params: &RecordParams) -> usize {
    usize::try_from(params.pw_length).unwrap_or(0)
}

/// Derive the password described by a parameter record
pub fn derive_from_params(secret: &str, params: &RecordParams) -> Result<Derived> {
    let scheme = DerivationScheme::for_version(params.version);
    let descriptor = DerivationScheme::descriptor(params.version, &params.salt);
    derive_with_scheme(
        scheme,
        secret,
        &descriptor,
        &Charset::from_params(params),
        requested_length(params),
    )
}

/// Random password using a parameter record's charset and length
pub fn random_from_params(params: &RecordParams) -> Result<RandomPassword> {
    derive_random(&Charset::from_params(params), requested_length(params))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGITS: &str = "0123456789";
    const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
    const SYMBOLS: &str = "!@#$%^&*(){}[]=,.";

    fn default_charset() -> Charset {
        Charset::from(format!("{}{}{}{}", DIGITS, UPPER, LOWER, SYMBOLS).as_str())
    }

    #[test]
    fn test_known_vector() {
        let derived = derive("123456", "1:", &default_charset(), 40).unwrap();
        assert_eq!(derived.password, "o2=2O$TnER7O{60EG)T0TZwR}d.LkMsP2c0I2hO9");
        assert_eq!(derived.fingerprint, "4899F48B");
    }

    #[test]
    fn test_known_vector_utf8_descriptor() {
        let derived = derive("123456", "1:測試", &default_charset(), 40).unwrap();
        assert_eq!(derived.password, "Wh&D4eUvi#N88l3B0B2c6N3QMVX7jXmu^IP!0uy1");
        assert_eq!(derived.fingerprint, "4899F48B");
    }

    #[test]
    fn test_known_vector_multi_block() {
        let charset = Charset::from(
            format!("{}{}{}{}", DIGITS, UPPER, LOWER, ".,(){}&^%$#@!_-+=~`|<>?:\";").as_str(),
        );
        let derived = derive("12345678", "1:test", &charset, 100).unwrap();
        assert_eq!(
            derived.password,
            "ycPzHrS3V7LTL;B7MJ|R%FXQCg{iQJ\"&KVjA!B#9D:L7#TLJLLV4Zd0QHCPjGKX\"6F1Q=KHw{Y$NEercRIOR+QBX42%-OoqWSY0B"
        );
        assert_eq!(derived.fingerprint, "2D0D1BCB");
    }

    #[test]
    fn test_known_vector_tokens() {
        let tokens: Vec<String> = (0..1024).map(|i| format!("[{}]", i)).collect();
        let derived = derive("123456", "1:", &Charset::from(tokens), 200).unwrap();
        assert_eq!(derived.password.matches("][").count(), 199);
        assert_eq!(
            derived.password,
            "[400][166][8][784][472][795][746][689][548][342][483][703][125][512][239][157][426]\
             [317][669][581][790][433][616][666][504][261][940][984][728][13][134][690][596][905]\
             [970][9][73][214][481][567][827][720][821][681][67][319][884][888][376][349][617]\
             [876][174][940][989][40][851][827][832][115][398][520][950][168][120][284][989][591]\
             [819][318][260][15][815][693][750][700][129][263][803][779][688][623][825][526]\
             [1010][293][298][40][447][762][901][789][687][345][740][604][449][736][772][447]\
             [971][809][113][334][401][854][166][1007][335][328][628][458][389][879][804][785]\
             [18][665][904][34][661][427][549][848][544][947][635][903][545][456][233][164][968]\
             [921][468][409][852][228][304][559][534][968][850][330][582][692][326][796][273]\
             [976][141][543][352][159][859][790][24][589][554][524][617][690][659][580][937][675]\
             [956][983][835][364][817][159][295][882][92][586][891][361][334][936][817][331][386]\
             [111][252][885][707][283][579][482][308][605][633][76][702][233][278][456][928][841]"
        );
        assert_eq!(derived.fingerprint, "4899F48B");
    }

    #[test]
    fn test_deterministic_and_sensitive() {
        let charset = default_charset();
        let a = derive("secret", "1:example.com", &charset, 32).unwrap();
        let b = derive("secret", "1:example.com", &charset, 32).unwrap();
        assert_eq!(a, b);

        let other_site = derive("secret", "1:example.org", &charset, 32).unwrap();
        assert_ne!(a.password, other_site.password);
        assert_eq!(a.fingerprint, other_site.fingerprint);

        let other_secret = derive("secret2", "1:example.com", &charset, 32).unwrap();
        assert_ne!(a.password, other_secret.password);
        assert_ne!(a.fingerprint, other_secret.fingerprint);
    }

    #[test]
    fn test_prefix_stable_across_lengths() {
        let charset = default_charset();
        let short = derive("123456", "1:", &charset, 10).unwrap();
        let long = derive("123456", "1:", &charset, 40).unwrap();
        assert!(long.password.starts_with(&short.password));
    }

    #[test]
    fn test_output_length() {
        let charset = default_charset();
        for length in [0, 1, 73, 500] {
            let derived = derive("pw", "1:x", &charset, length).unwrap();
            assert_eq!(derived.password.chars().count(), length);
        }
    }

    #[test]
    fn test_fingerprint_matches_derivation() {
        assert_eq!(fingerprint("123456").unwrap(), "4899F48B");
        assert_eq!(fingerprint("").unwrap_err(), DeriveError::EmptySecret);
    }

    #[test]
    fn test_errors() {
        let charset = default_charset();
        assert_eq!(
            derive("", "1:", &charset, 10).unwrap_err(),
            DeriveError::EmptySecret
        );
        assert_eq!(
            derive("pw", "1:", &Charset::from(""), 10).unwrap_err(),
            DeriveError::NoCharsetSelected
        );
        assert_eq!(
            derive_random(&Charset::from(""), 10).unwrap_err(),
            DeriveError::NoCharsetSelected
        );
    }

    #[test]
    fn test_legacy_scheme() {
        let charset = default_charset();
        let derived =
            derive_with_scheme(DerivationScheme::Legacy, "123456", "1:", &charset, 146).unwrap();
        assert_eq!(derived.password.len(), 146);
        assert_eq!(derived.fingerprint, "4899F48B");

        // both schemes draw 7-bit indices from the same first two blocks
        let ratchet = derive("123456", "1:", &charset, 146).unwrap();
        assert_eq!(derived.password, ratchet.password);

        assert_eq!(
            derive_with_scheme(DerivationScheme::Legacy, "123456", "1:", &charset, 147)
                .unwrap_err(),
            DeriveError::LengthUnsupported {
                requested: 147,
                max: 146
            }
        );
    }

    #[test]
    fn test_legacy_known_vector() {
        let derived = derive_with_scheme(
            DerivationScheme::Legacy,
            "hunter2",
            "1:example.com",
            &default_charset(),
            20,
        )
        .unwrap();
        assert_eq!(derived.password, "J6$uC1[33KDxr[^cl64&");
    }

    #[test]
    fn test_legacy_diverges_for_wide_charsets() {
        let tokens: Vec<String> = (0..200).map(|i| format!("[{}]", i)).collect();
        let charset = Charset::from(tokens);

        let legacy =
            derive_with_scheme(DerivationScheme::Legacy, "123456", "1:", &charset, 8).unwrap();
        let ratchet = derive("123456", "1:", &charset, 8).unwrap();
        assert_eq!(legacy.password, "[50][2][76][2][24][65][108][49]");
        assert_eq!(ratchet.password, "[100][10][96][35][16][118][49][187]");
    }

    #[test]
    fn test_charset_order_matters() {
        let reordered =
            Charset::from(format!("{}{}{}{}", SYMBOLS, DIGITS, UPPER, LOWER).as_str());
        let original = derive("123456", "1:", &default_charset(), 40).unwrap();
        let permuted = derive("123456", "1:", &reordered, 40).unwrap();
        assert_ne!(original.password, permuted.password);
        assert_eq!(original.fingerprint, permuted.fingerprint);
    }

    #[test]
    fn test_scheme_selection() {
        assert_eq!(DerivationScheme::for_version(1), DerivationScheme::Ratchet);
        assert_eq!(DerivationScheme::for_version(0), DerivationScheme::Ratchet);
        assert_eq!(DerivationScheme::for_version(-1), DerivationScheme::Legacy);
        assert_eq!(DerivationScheme::descriptor(-3, "site"), "3:site");
        assert_eq!(DerivationScheme::descriptor(2, "測"), "2:測");
    }

    #[test]
    fn test_derive_from_params_matches_direct_call() {
        let params = RecordParams {
            salt: String::new(),
            ..RecordParams::defaults_at(0)
        };
        let derived = derive_from_params("123456", &params).unwrap();
        assert_eq!(derived.password, "o2=2O$TnER7O{60EG)T0TZwR}d.LkMsP2c0I2hO9");
    }

    #[test]
    fn test_bits_per_char() {
        assert_eq!(bits_per_char(1), 7);
        assert_eq!(bits_per_char(79), 7);
        assert_eq!(bits_per_char(128), 7);
        assert_eq!(bits_per_char(129), 8);
        assert_eq!(bits_per_char(1024), 10);
        assert_eq!(bits_per_char(1025), 11);
    }

    #[test]
    fn test_random_uses_charset() {
        let charset = Charset::from("ab");
        let random = derive_random(&charset, 64).unwrap();
        assert_eq!(random.tag, RANDOM_TAG);
        assert_eq!(random.password.len(), 64);
        assert!(random.password.chars().all(|c| c == 'a' || c == 'b'));
    }

    #[test]
    fn test_random_from_params_length() {
        let params = RecordParams {
            pw_length: 25,
            ..RecordParams::defaults_at(0)
        };
        assert_eq!(random_from_params(&params).unwrap().password.len(), 25);
    }
}
