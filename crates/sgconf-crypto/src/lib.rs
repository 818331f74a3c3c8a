//! sgconf-crypto: envelope encryption primitives for the sgconf config engine
//!
//! Layout of the envelope scheme:
//! ```text
//! password ──PBKDF2(salt = nonce)──▶ derived key ──AES-GCM──▶ pre-key blob
//!                                                               │
//! pre-key / shared key (AES-GCM, 13-byte nonce) ◀───────────────┘
//!   ├── content + config payloads:  base64(ciphertext || tag), nonce sent apart
//!   ├── encrypted tags:             "tag=" base64(nonce || ciphertext || tag)
//!   └── wrapped for each reader:    RSA-OAEP(public key, shared key)
//! ```

pub mod aead;
pub mod asymmetric;
pub mod attempt;
pub mod codec;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod prekey;
pub mod tags;

pub use aead::{
    decrypt_aead, decrypt_prefixed, encrypt_aead, generate_key, generate_nonce, AeadOutput,
};
pub use asymmetric::{
    to_public_from_private, unwrap_asymmetric, unwrap_with_composite, wrap_asymmetric,
    CompositeKey,
};
pub use attempt::{all_successes, first_success};
pub use codec::{base64_to_buffer, buffer_to_base64, normalize_to_buffer, KeyHandle, RawKeyMaterial};
pub use error::{CryptoError, CryptoResult};
pub use hash::{compute_hash, hash_key_material, hash_tagged, split_tagged_hash, HashAlgorithm};
pub use kdf::{derive_from_password, DerivedKey};
pub use prekey::{
    decrypt_first_pre_key, decrypt_first_pre_key_with, decrypt_pre_keys, encrypt_pre_key,
    PreKeyMatch,
};
pub use tags::{decrypt_tag, encrypt_tag, extract_tags, DecryptedTag, TagInput};

/// Size of an AES-GCM nonce used throughout the envelope scheme
pub const NONCE_SIZE: usize = 13;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a generated symmetric key (AES-256)
pub const KEY_SIZE: usize = 32;

/// Upper bound for password-derived key material (bits)
pub const MAX_DERIVED_BITS: usize = 256;
