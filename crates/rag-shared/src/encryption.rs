use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Returned by [`decrypt_data`] instead of an error so a single corrupt
/// row cannot abort a whole pipeline run.
pub const DECRYPTION_FAILED: &str = "Decryption Failed (Wrong Password or Corrupt Token)";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Turns any password string into a 32-byte AES key.
fn derive_key(password: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(password.as_bytes());
    Key::<Aes256Gcm>::clone_from_slice(&digest)
}

/// Encrypts `data` under a password-derived key.
///
/// Envelope layout matches the web client: base64(IV(12) || TAG(16) || CIPHERTEXT).
pub fn encrypt_data(data: &str, password: &str) -> anyhow::Result<String> {
    let key = derive_key(password);
    let cipher = Aes256Gcm::new(&key);
    let iv = Aes256Gcm::generate_nonce(&mut OsRng);

    // aes-gcm appends the tag to the ciphertext
    let ct_with_tag = cipher
        .encrypt(&iv, data.as_bytes())
        .map_err(|_| anyhow::anyhow!("AES-GCM encryption failed"))?;

    let (ciphertext, tag) = ct_with_tag.split_at(ct_with_tag.len() - TAG_LEN);

    let mut envelope = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(tag);
    envelope.extend_from_slice(ciphertext);

    Ok(BASE64.encode(envelope))
}

/// Decrypts an envelope produced by [`encrypt_data`].
///
/// Never fails: any malformed or tampered input yields [`DECRYPTION_FAILED`].
pub fn decrypt_data(token: &str, password: &str) -> String {
    try_decrypt(token, password).unwrap_or_else(|| DECRYPTION_FAILED.to_string())
}

fn try_decrypt(token: &str, password: &str) -> Option<String> {
    let data = BASE64.decode(token).ok()?;
    if data.len() < IV_LEN + TAG_LEN {
        return None;
    }

    let iv = Nonce::from_slice(&data[..IV_LEN]);
    let tag = &data[IV_LEN..IV_LEN + TAG_LEN];
    let ciphertext = &data[IV_LEN + TAG_LEN..];

    // aes-gcm expects ciphertext || tag
    let mut ct_with_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    ct_with_tag.extend_from_slice(ciphertext);
    ct_with_tag.extend_from_slice(tag);

    let key = derive_key(password);
    let cipher = Aes256Gcm::new(&key);
    let plaintext = cipher.decrypt(iv, ct_with_tag.as_slice()).ok()?;

    String::from_utf8(plaintext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let plaintext = "some notebook content with markers <<<3>>>inside<<</3>>>";
        let token = encrypt_data(plaintext, "hunter2").unwrap();
        assert_ne!(token, plaintext);
        assert_eq!(decrypt_data(&token, "hunter2"), plaintext);
    }

    #[test]
    fn wrong_password_yields_sentinel() {
        let token = encrypt_data("secret", "right").unwrap();
        assert_eq!(decrypt_data(&token, "wrong"), DECRYPTION_FAILED);
    }

    #[test]
    fn corrupt_token_yields_sentinel() {
        let token = encrypt_data("secret", "pw").unwrap();
        let mut bytes = BASE64.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = BASE64.encode(bytes);
        assert_eq!(decrypt_data(&tampered, "pw"), DECRYPTION_FAILED);

        assert_eq!(decrypt_data("not base64!!!", "pw"), DECRYPTION_FAILED);
        assert_eq!(decrypt_data("AAAA", "pw"), DECRYPTION_FAILED);
    }

    #[test]
    fn fresh_iv_per_call() {
        let a = encrypt_data("same input", "pw").unwrap();
        let b = encrypt_data("same input", "pw").unwrap();
        assert_ne!(a, b);
    }
}
