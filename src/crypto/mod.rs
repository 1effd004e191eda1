//! Cryptographic key handling.

pub mod key_pair;
