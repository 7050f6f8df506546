use anyhow::Result;
use des::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

/// Answer a VNC authentication challenge.  The challenge is DES encrypted
/// with the password as key: at most 8 bytes, zero padded, and with the bits
/// of every key byte mirrored.
pub fn vnc_response(password: &[u8], challenge: &[u8; 16]) -> Result<[u8; 16]> {
    encrypt_challenge(&des_key(password), challenge)
}

fn des_key(password: &[u8]) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (k, p) in key.iter_mut().zip(password) {
        *k = p.reverse_bits();
    }
    key
}

fn encrypt_challenge(key: &[u8; 8], challenge: &[u8; 16]) -> Result<[u8; 16]> {
    let cipher = des::Des::new_from_slice(key)
        .map_err(|_| anyhow::anyhow!("Invalid DES key length"))?;
    let mut response = *challenge;
    for block in response.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(response)
}
