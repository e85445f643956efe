//! Ed25519 key unlocking, detached signatures and signature armor.
//!
//! Private keys travel as passphrase-encrypted PKCS#8 PEM documents and
//! public keys as SPKI PEM documents. Signatures are armored text blocks
//! carrying their creation time, which is covered by the signature itself.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

const ARMOR_BEGIN: &str = "-----BEGIN SCRIBE SIGNATURE-----";
const ARMOR_END: &str = "-----END SCRIBE SIGNATURE-----";
const CREATED_HEADER: &str = "Created: ";
const ARMOR_LINE_WIDTH: usize = 64;

/// Errors raised while loading or unlocking key material.
///
/// Messages never include key text or passphrases.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    #[error("reading private key: {0}")]
    Unlock(String),

    #[error("reading public key: {0}")]
    MalformedPublicKey(String),

    #[error("encoding key: {0}")]
    Encoding(String),
}

/// Errors raised while checking a detached signature.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("opening signature: {0}")]
    Malformed(String),

    #[error("signature created at {created} is later than verification time {at}")]
    NotYetValid {
        created: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    #[error("signature verification failed")]
    Invalid,
}

/// An unlocked private key, ready to sign.
pub struct SigningHandle {
    key: SigningKey,
}

impl SigningHandle {
    /// The public half of this key.
    pub fn verifying_handle(&self) -> VerifyingHandle {
        VerifyingHandle {
            key: self.key.verifying_key(),
        }
    }
}

impl fmt::Debug for SigningHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningHandle")
            .field("public_key", &hex::encode(self.key.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// A loaded public key, ready to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingHandle {
    key: VerifyingKey,
}

impl VerifyingHandle {
    /// Hex encoding of the raw 32-byte public key.
    pub fn fingerprint(&self) -> String {
        hex::encode(self.key.as_bytes())
    }
}

/// A freshly generated keypair in its armored (PEM) form.
#[derive(Clone)]
pub struct ArmoredKeyPair {
    /// Passphrase-encrypted PKCS#8 PEM.
    pub private_key: String,
    /// SPKI PEM.
    pub public_key: String,
}

impl fmt::Debug for ArmoredKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmoredKeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// A detached signature and the moment it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub armor: String,
    pub created_at: DateTime<Utc>,
}

/// Generate a new Ed25519 keypair and lock the private key with `passphrase`.
pub fn generate_keypair(passphrase: &str) -> Result<ArmoredKeyPair, KeyError> {
    if passphrase.is_empty() {
        return Err(KeyError::EmptyPassphrase);
    }

    let signing_key = SigningKey::generate(&mut OsRng);
    let private_key = signing_key
        .to_pkcs8_encrypted_pem(OsRng, passphrase.as_bytes(), LineEnding::LF)
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    let public_key = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyError::Encoding(e.to_string()))?;

    Ok(ArmoredKeyPair {
        private_key: String::from(private_key.as_str()),
        public_key,
    })
}

/// Decrypt an armored private key with its passphrase.
pub fn unlock_private_key(armored: &str, passphrase: &str) -> Result<SigningHandle, KeyError> {
    if passphrase.is_empty() {
        return Err(KeyError::EmptyPassphrase);
    }
    let key = SigningKey::from_pkcs8_encrypted_pem(armored.trim(), passphrase.as_bytes())
        .map_err(|e| KeyError::Unlock(e.to_string()))?;
    Ok(SigningHandle { key })
}

/// Parse an armored public key.
pub fn load_public_key(armored: &str) -> Result<VerifyingHandle, KeyError> {
    let key = VerifyingKey::from_public_key_pem(armored.trim())
        .map_err(|e| KeyError::MalformedPublicKey(e.to_string()))?;
    Ok(VerifyingHandle { key })
}

/// Produce an armored detached signature over `message`.
pub fn sign(handle: &SigningHandle, message: &[u8]) -> DetachedSignature {
    sign_at(handle, message, Utc::now())
}

fn sign_at(handle: &SigningHandle, message: &[u8], created_at: DateTime<Utc>) -> DetachedSignature {
    let stamp = created_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let signature = handle.key.sign(&signed_bytes(message, &stamp));

    DetachedSignature {
        armor: armor(&stamp, &signature.to_bytes()),
        created_at,
    }
}

/// Verify an armored detached signature over `message` as of `at`.
pub fn verify(
    handle: &VerifyingHandle,
    message: &[u8],
    armored: &str,
    at: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let parsed = ParsedArmor::parse(armored)?;
    let signature = ed25519_dalek::Signature::from_bytes(&parsed.signature);

    handle
        .key
        .verify(&signed_bytes(message, parsed.stamp), &signature)
        .map_err(|_| SignatureError::Invalid)?;

    if parsed.created > at {
        return Err(SignatureError::NotYetValid {
            created: parsed.created,
            at,
        });
    }
    Ok(())
}

/// The creation time is bound into the signed bytes so the armor header
/// cannot be rewritten without invalidating the signature.
fn signed_bytes(message: &[u8], stamp: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(message.len() + 1 + stamp.len());
    bytes.extend_from_slice(message);
    bytes.push(b'\n');
    bytes.extend_from_slice(stamp.as_bytes());
    bytes
}

fn armor(stamp: &str, signature: &[u8]) -> String {
    let encoded = STANDARD.encode(signature);
    let lines: Vec<&str> = (0..encoded.len())
        .step_by(ARMOR_LINE_WIDTH)
        .map(|start| &encoded[start..(start + ARMOR_LINE_WIDTH).min(encoded.len())])
        .collect();

    format!(
        "{ARMOR_BEGIN}\n{CREATED_HEADER}{stamp}\n\n{}\n{ARMOR_END}",
        lines.join("\n")
    )
}

struct ParsedArmor<'a> {
    stamp: &'a str,
    created: DateTime<Utc>,
    signature: [u8; 64],
}

impl<'a> ParsedArmor<'a> {
    fn parse(text: &'a str) -> Result<Self, SignatureError> {
        let malformed = |msg: &str| SignatureError::Malformed(msg.to_string());
        let mut lines = text.trim().lines();

        if lines.next() != Some(ARMOR_BEGIN) {
            return Err(malformed("missing armor header line"));
        }
        let stamp = lines
            .next()
            .and_then(|line| line.strip_prefix(CREATED_HEADER))
            .ok_or_else(|| malformed("missing Created header"))?;
        let created = DateTime::parse_from_rfc3339(stamp)
            .map_err(|e| SignatureError::Malformed(format!("bad Created header: {e}")))?
            .with_timezone(&Utc);
        if lines.next() != Some("") {
            return Err(malformed("expected a blank line after the headers"));
        }

        let mut body = String::new();
        let mut closed = false;
        for line in lines {
            if line == ARMOR_END {
                closed = true;
                break;
            }
            body.push_str(line.trim());
        }
        if !closed {
            return Err(malformed("missing armor footer line"));
        }

        let bytes = STANDARD
            .decode(body)
            .map_err(|e| SignatureError::Malformed(format!("bad base64 body: {e}")))?;
        let signature: [u8; 64] = bytes
            .try_into()
            .map_err(|_| malformed("signature must be 64 bytes"))?;

        Ok(Self {
            stamp,
            created,
            signature,
        })
    }
}
