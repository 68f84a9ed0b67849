//! Crypto protocol for relayed UDP packets
//!
//! Payload with stream cipher
//! ```plain
//! +-------+----------+
//! |  IV   | Payload  |
//! +-------+----------+
//! | Fixed | Variable |
//! +-------+----------+
//! ```
//!
//! Payload with AEAD cipher
//!
//! ```plain
//! UDP (after encryption, *ciphertext*)
//! +--------+-----------+-----------+
//! | NONCE  |  *Data*   |  Data_TAG |
//! +--------+-----------+-----------+
//! | Fixed  | Variable  |   Fixed   |
//! +--------+-----------+-----------+
//! ```
//!
//! Every datagram is independently keyed with a freshly generated IV or salt,
//! so packets survive loss and reordering without any cipher state shared
//! between them.

use byte_string::ByteStr;
use bytes::{BufMut, BytesMut};
use log::trace;

use crate::crypto::{CipherCategory, CipherKind, utils::random_iv_or_salt, v1::Cipher};

/// UDP packet protocol error
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("packet too short for nonce, at least {0} bytes, but only {1} bytes")]
    PacketTooShortForNonce(usize, usize),
    #[error("packet too short for tag, at least {0} bytes, but only {1} bytes")]
    PacketTooShortForTag(usize, usize),
    #[error("decrypt payload failed")]
    DecryptPayloadError,
}

/// UDP packet protocol result
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Encrypt `payload` into an outgoing UDP packet
pub fn encrypt_payload(method: CipherKind, key: &[u8], payload: &[u8], dst: &mut BytesMut) {
    match method.category() {
        CipherCategory::None => {
            dst.reserve(payload.len());
            dst.put_slice(payload);
        }
        #[cfg(feature = "stream-cipher")]
        CipherCategory::Stream => encrypt_payload_stream(method, key, payload, dst),
        CipherCategory::Aead => encrypt_payload_aead(method, key, payload, dst),
    }
}

#[cfg(feature = "stream-cipher")]
fn encrypt_payload_stream(method: CipherKind, key: &[u8], payload: &[u8], dst: &mut BytesMut) {
    let iv_len = method.iv_len();

    // Packet = IV + PAYLOAD
    dst.reserve(iv_len + payload.len());

    dst.resize(iv_len, 0);
    let iv = &mut dst[..iv_len];

    if iv_len > 0 {
        random_iv_or_salt(iv);
        trace!("UDP packet generated stream iv {:?}", ByteStr::new(iv));
    }

    let mut cipher = Cipher::new(method, key, iv);

    dst.put_slice(payload);
    let m = &mut dst[iv_len..];
    cipher.encrypt_packet(m);
}

fn encrypt_payload_aead(method: CipherKind, key: &[u8], payload: &[u8], dst: &mut BytesMut) {
    let salt_len = method.salt_len();

    // Packet = SALT + PAYLOAD + TAG
    dst.reserve(salt_len + payload.len() + method.tag_len());

    dst.resize(salt_len, 0);
    let salt = &mut dst[..salt_len];

    if salt_len > 0 {
        random_iv_or_salt(salt);
        trace!("UDP packet generated aead salt {:?}", ByteStr::new(salt));
    }

    let mut cipher = Cipher::new(method, key, salt);

    dst.put_slice(payload);

    unsafe {
        dst.advance_mut(method.tag_len());
    }

    let m = &mut dst[salt_len..];
    cipher.encrypt_packet(m);
}

/// Decrypt a received UDP packet in place
///
/// The plaintext is moved to the front of `payload`, and its length returned.
pub fn decrypt_payload(method: CipherKind, key: &[u8], payload: &mut [u8]) -> ProtocolResult<usize> {
    match method.category() {
        CipherCategory::None => Ok(payload.len()),
        #[cfg(feature = "stream-cipher")]
        CipherCategory::Stream => decrypt_payload_stream(method, key, payload),
        CipherCategory::Aead => decrypt_payload_aead(method, key, payload),
    }
}

#[cfg(feature = "stream-cipher")]
fn decrypt_payload_stream(method: CipherKind, key: &[u8], payload: &mut [u8]) -> ProtocolResult<usize> {
    let plen = payload.len();
    let iv_len = method.iv_len();

    if plen < iv_len {
        return Err(ProtocolError::PacketTooShortForNonce(iv_len, plen));
    }

    let (iv, data) = payload.split_at_mut(iv_len);
    trace!("UDP packet got stream iv {:?}", ByteStr::new(iv));

    let mut cipher = Cipher::new(method, key, iv);

    // Stream ciphers never fail to decrypt
    assert!(cipher.decrypt_packet(data));

    let data_len = data.len();
    payload.copy_within(iv_len.., 0);

    Ok(data_len)
}

fn decrypt_payload_aead(method: CipherKind, key: &[u8], payload: &mut [u8]) -> ProtocolResult<usize> {
    let plen = payload.len();
    let salt_len = method.salt_len();

    if plen < salt_len {
        return Err(ProtocolError::PacketTooShortForNonce(salt_len, plen));
    }

    let (salt, data) = payload.split_at_mut(salt_len);
    trace!("UDP packet got aead salt {:?}", ByteStr::new(salt));

    let mut cipher = Cipher::new(method, key, salt);
    let tag_len = cipher.tag_len();

    if data.len() < tag_len {
        return Err(ProtocolError::PacketTooShortForTag(tag_len, data.len()));
    }

    if !cipher.decrypt_packet(data) {
        return Err(ProtocolError::DecryptPayloadError);
    }

    let data_len = data.len() - tag_len;
    payload.copy_within(salt_len..salt_len + data_len, 0);

    Ok(data_len)
}
