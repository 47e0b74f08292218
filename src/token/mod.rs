//! Ed25519-signed license tokens.
//!
//! Token format: `base64url(identifier|product|version|expiry).base64url(signature)`,
//! optionally wrapped in grouped Base32 for people to type in.

mod claims;
mod encoding;
mod signing;

pub use claims::TokenPayload;
pub use encoding::{DecodedToken, decode, human_readable, normalize};
pub use signing::{
    generate_keypair, load_signing_key, load_verifying_key, parse_verifying_key, sign, verify,
    write_keypair,
};
