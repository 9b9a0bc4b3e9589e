//! NIP-44 v2 authenticated encryption, used to seal every event-log payload
//! the wallet writes to itself (the "self-DM" pattern).

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::keys::{PublicKey, SecretKey};

const VERSION: u8 = 0x02;
const SALT: &[u8] = b"nip44-v2";
const MIN_PLAINTEXT_SIZE: usize = 1;
const MAX_PLAINTEXT_SIZE: usize = 65535;

type HmacSha256 = Hmac<Sha256>;

fn calc_padded_len(unpadded_len: usize) -> usize {
    let total_len = unpadded_len + 2;
    if total_len <= 32 {
        return 32;
    }
    let next_power = 1usize << ((usize::BITS - (total_len - 1).leading_zeros()) as usize);
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((total_len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT_SIZE..=MAX_PLAINTEXT_SIZE).contains(&len) {
        return Err(Error::InvalidPlaintextLength(len));
    }
    let padded_len = calc_padded_len(len);
    let mut out = Vec::with_capacity(padded_len);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(plaintext);
    out.resize(padded_len, 0);
    Ok(out)
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>, Error> {
    if padded.len() < 2 {
        return Err(Error::BadPadding);
    }
    let unpadded_len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if unpadded_len == 0 || padded.len() < 2 + unpadded_len {
        return Err(Error::BadPadding);
    }
    if padded.len() != calc_padded_len(unpadded_len) {
        return Err(Error::BadPadding);
    }
    Ok(padded[2..2 + unpadded_len].to_vec())
}

/// Derive the per-pair conversation key: HKDF-Extract(salt="nip44-v2", ikm=ecdh_x).
fn conversation_key(privkey: &SecretKey, pubkey: &PublicKey) -> [u8; 32] {
    let shared_x = privkey.shared_secret_x(pubkey);
    let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), &shared_x);
    let mut out = [0u8; 32];
    out.copy_from_slice(&prk);
    out
}

/// Derive (chacha_key, chacha_nonce, hmac_key) from the conversation key and a message nonce.
fn message_keys(conversation_key: &[u8; 32], nonce: &[u8; 32]) -> ([u8; 32], [u8; 12], [u8; 32]) {
    let hk = Hkdf::<Sha256>::from_prk(conversation_key).expect("conversation key is 32 bytes");
    let mut expanded = [0u8; 76];
    hk.expand(nonce, &mut expanded)
        .expect("76 bytes is a valid HKDF-SHA256 expand length");

    let mut chacha_key = [0u8; 32];
    let mut chacha_nonce = [0u8; 12];
    let mut hmac_key = [0u8; 32];
    chacha_key.copy_from_slice(&expanded[0..32]);
    chacha_nonce.copy_from_slice(&expanded[32..44]);
    hmac_key.copy_from_slice(&expanded[44..76]);
    (chacha_key, chacha_nonce, hmac_key)
}

fn hmac_aad(key: &[u8; 32], message: &[u8], aad: &[u8; 32]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(aad);
    mac.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn chacha20_apply(key: &[u8; 32], nonce: &[u8; 12], data: &mut [u8]) {
    let mut cipher = ChaCha20::new(key.into(), nonce.into());
    cipher.apply_keystream(data);
}

/// Encrypt `plaintext` from `sender_privkey` to `recipient_pubkey`.
///
/// Returns the base64-standard-encoded NIP-44 v2 payload
/// `0x02 || nonce(32) || ciphertext || mac(32)`.
pub fn encrypt(
    plaintext: &str,
    sender_privkey: &SecretKey,
    recipient_pubkey: &PublicKey,
) -> Result<String, Error> {
    use bitcoin::secp256k1::rand::RngCore;
    let mut nonce = [0u8; 32];
    bitcoin::secp256k1::rand::rngs::OsRng.fill_bytes(&mut nonce);

    let conv_key = conversation_key(sender_privkey, recipient_pubkey);
    let (chacha_key, chacha_nonce, hmac_key) = message_keys(&conv_key, &nonce);

    let mut padded = pad(plaintext.as_bytes())?;
    chacha20_apply(&chacha_key, &chacha_nonce, &mut padded);
    let ciphertext = padded;

    let mac = hmac_aad(&hmac_key, &ciphertext, &nonce);

    let mut payload = Vec::with_capacity(1 + 32 + ciphertext.len() + 32);
    payload.push(VERSION);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&mac);

    Ok(base64_encode(&payload))
}

/// Decrypt a NIP-44 v2 payload received by `recipient_privkey` from `sender_pubkey`.
pub fn decrypt(
    ciphertext: &str,
    recipient_privkey: &SecretKey,
    sender_pubkey: &PublicKey,
) -> Result<String, Error> {
    let payload = base64_decode(ciphertext)?;
    if payload.len() < 1 + 32 + 32 {
        return Err(Error::InvalidBase64("payload too short".into()));
    }
    if payload[0] != VERSION {
        return Err(Error::BadVersion);
    }

    let nonce: [u8; 32] = payload[1..33].try_into().expect("exact slice length");
    let mac: [u8; 32] = payload[payload.len() - 32..]
        .try_into()
        .expect("exact slice length");
    let encrypted_data = &payload[33..payload.len() - 32];

    let conv_key = conversation_key(recipient_privkey, sender_pubkey);
    let (chacha_key, chacha_nonce, hmac_key) = message_keys(&conv_key, &nonce);

    let calculated_mac = hmac_aad(&hmac_key, encrypted_data, &nonce);
    if calculated_mac.ct_eq(&mac).unwrap_u8() == 0 {
        return Err(Error::BadMac);
    }

    let mut padded_plaintext = encrypted_data.to_vec();
    chacha20_apply(&chacha_key, &chacha_nonce, &mut padded_plaintext);

    let plaintext_bytes = unpad(&padded_plaintext)?;
    String::from_utf8(plaintext_bytes)
        .map_err(|e| Error::Internal(format!("decrypted payload was not utf-8: {e}")))
}

fn base64_encode(bytes: &[u8]) -> String {
    use bitcoin::base64::engine::general_purpose::STANDARD;
    use bitcoin::base64::Engine;
    STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, Error> {
    use bitcoin::base64::engine::general_purpose::STANDARD;
    use bitcoin::base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| Error::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_padded_len() {
        assert_eq!(calc_padded_len(1), 32);
        assert_eq!(calc_padded_len(30), 32);
        assert_eq!(calc_padded_len(35), 64);
        assert_eq!(calc_padded_len(256), 320);
        assert_eq!(calc_padded_len(257), 320);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();

        let msg = "the quick brown fox jumps over the lazy dog";
        let ciphertext = encrypt(msg, &alice, &bob.public_key()).unwrap();
        let decrypted = decrypt(&ciphertext, &bob, &alice.public_key()).unwrap();
        assert_eq!(decrypted, msg);
    }

    #[test]
    fn test_self_dm_roundtrip() {
        let key = SecretKey::generate();
        let pubkey = key.public_key();
        let msg = r#"{"mints":["https://mint.example"]}"#;

        let ciphertext = encrypt(msg, &key, &pubkey).unwrap();
        let decrypted = decrypt(&ciphertext, &key, &pubkey).unwrap();
        assert_eq!(decrypted, msg);
    }

    #[test]
    fn test_tampered_mac_rejected() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();

        let ciphertext = encrypt("hello", &alice, &bob.public_key()).unwrap();
        let mut payload = base64_decode(&ciphertext).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let tampered = base64_encode(&payload);

        let err = decrypt(&tampered, &bob, &alice.public_key()).unwrap_err();
        assert!(matches!(err, Error::BadMac));
    }

    #[test]
    fn test_bad_version_rejected() {
        let alice = SecretKey::generate();
        let bob = SecretKey::generate();

        let ciphertext = encrypt("hello", &alice, &bob.public_key()).unwrap();
        let mut payload = base64_decode(&ciphertext).unwrap();
        payload[0] = 0x01;
        let bad = base64_encode(&payload);

        let err = decrypt(&bad, &bob, &alice.public_key()).unwrap_err();
        assert!(matches!(err, Error::BadVersion));
    }
}
