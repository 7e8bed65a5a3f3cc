//! Canonical CBOR encoding for grant signing.
//!
//! The owner signs the canonical bytes of a grant's content, so the same
//! content must always produce the same bytes:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats or tags
//!
//! Descriptor order is preserved: reordering policies changes the bytes.

use ciborium::value::Value;

use crate::error::{CoreError, Result};
use crate::grant::{GrantContent, PermissionGrant};
use crate::policy::PolicyDescriptor;

/// Grant content keys (integer keys for compact encoding).
mod keys {
    pub const VERSION: u64 = 0;
    pub const ACCOUNT_CHAIN: u64 = 1;
    pub const ACCOUNT: u64 = 2;
    pub const OWNER: u64 = 3;
    pub const REDEEMER: u64 = 4;
    pub const FEE_TOKEN: u64 = 5;
    pub const FEE_CHAIN: u64 = 6;
    pub const NONCE: u64 = 7;
    pub const POLICIES: u64 = 8;
}

/// Policy descriptor keys.
mod policy_keys {
    pub const CHAIN: u64 = 0;
    pub const TARGET: u64 = 1;
    pub const SELECTOR: u64 = 2;
    pub const POLICY: u64 = 3;
}

/// Encode grant content to canonical CBOR bytes.
pub fn canonical_content_bytes(content: &GrantContent) -> Result<Vec<u8>> {
    encode_canonical(&content_to_cbor_value(content))
}

/// Encode an entire grant to canonical bytes.
///
/// Format: canonical_content || signature
pub fn canonical_grant_bytes(grant: &PermissionGrant) -> Result<Vec<u8>> {
    let mut buf = canonical_content_bytes(&grant.content)?;
    buf.extend_from_slice(grant.signature.as_bytes());
    Ok(buf)
}

fn entry(key: u64, value: Value) -> (Value, Value) {
    (Value::Integer(key.into()), value)
}

fn content_to_cbor_value(content: &GrantContent) -> Value {
    let policies = content.policies.iter().map(policy_to_cbor_value).collect();

    Value::Map(vec![
        entry(keys::VERSION, Value::Integer(content.version.into())),
        entry(
            keys::ACCOUNT_CHAIN,
            Value::Integer(content.account.chain_id.get().into()),
        ),
        entry(keys::ACCOUNT, Value::Bytes(content.account.address.0.to_vec())),
        entry(keys::OWNER, Value::Bytes(content.owner.0.to_vec())),
        entry(keys::REDEEMER, Value::Bytes(content.redeemer.0.to_vec())),
        entry(keys::FEE_TOKEN, Value::Bytes(content.fee.token.0.to_vec())),
        entry(keys::FEE_CHAIN, Value::Integer(content.fee.chain_id.get().into())),
        entry(keys::NONCE, Value::Integer(content.nonce.into())),
        entry(keys::POLICIES, Value::Array(policies)),
    ])
}

fn policy_to_cbor_value(descriptor: &PolicyDescriptor) -> Value {
    Value::Map(vec![
        entry(
            policy_keys::CHAIN,
            Value::Integer(descriptor.chain_id.get().into()),
        ),
        entry(policy_keys::TARGET, Value::Bytes(descriptor.target.0.to_vec())),
        entry(
            policy_keys::SELECTOR,
            Value::Bytes(descriptor.selector.0.to_vec()),
        ),
        entry(
            policy_keys::POLICY,
            Value::Integer(descriptor.policy.code().into()),
        ),
    ])
}

/// Encode a CBOR value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not allowed in canonical encoding".into(),
            ))
        }
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported CBOR value in canonical encoding".into(),
            ))
        }
    }
    Ok(())
}

fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned argument with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
