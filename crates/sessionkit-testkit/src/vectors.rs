//! Known vectors from the EVM ecosystem.
//!
//! These pin hashing, selector derivation and address derivation to the
//! values every other EVM tool produces.

use sessionkit_core::{keccak256, Address, Keypair, Selector};

/// A function signature and its selector.
#[derive(Debug, Clone, Copy)]
pub struct SelectorVector {
    pub signature: &'static str,
    /// Expected selector (hex, no prefix).
    pub selector: &'static str,
}

/// A secp256k1 secret key and the address it controls.
#[derive(Debug, Clone, Copy)]
pub struct AddressVector {
    pub name: &'static str,
    /// Secret key (hex, no prefix).
    pub secret: &'static str,
    /// Expected address, checksummed as published.
    pub address: &'static str,
}

/// keccak256 of the empty string.
pub const KECCAK_EMPTY: &str = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";

pub fn selector_vectors() -> Vec<SelectorVector> {
    vec![
        SelectorVector {
            signature: "transfer(address,uint256)",
            selector: "a9059cbb",
        },
        SelectorVector {
            signature: "approve(address,uint256)",
            selector: "095ea7b3",
        },
        SelectorVector {
            signature: "balanceOf(address)",
            selector: "70a08231",
        },
    ]
}

/// Well-known development accounts.
pub fn address_vectors() -> Vec<AddressVector> {
    vec![
        AddressVector {
            name: "dev account 0",
            secret: "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        },
        AddressVector {
            name: "dev account 1",
            secret: "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
            address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
        },
    ]
}

/// Keypair for an address vector.
pub fn keypair_from_vector(vector: &AddressVector) -> Keypair {
    let bytes = hex::decode(vector.secret).expect("vector secret is hex");
    let secret: [u8; 32] = bytes.try_into().expect("vector secret is 32 bytes");
    Keypair::from_secret_bytes(&secret).expect("vector secret is a valid scalar")
}

/// Check every vector. Returns the names of the ones that failed.
pub fn verify_all_vectors() -> Vec<String> {
    let mut failures = Vec::new();

    if hex::encode(keccak256(b"").0) != KECCAK_EMPTY {
        failures.push("keccak256 of empty input".to_string());
    }

    for vector in selector_vectors() {
        if Selector::from_signature(vector.signature).to_hex() != format!("0x{}", vector.selector) {
            failures.push(vector.signature.to_string());
        }
    }

    for vector in address_vectors() {
        let expected: Address = match vector.address.parse() {
            Ok(address) => address,
            Err(_) => {
                failures.push(vector.name.to_string());
                continue;
            }
        };
        if keypair_from_vector(&vector).address() != expected {
            failures.push(vector.name.to_string());
        }
    }

    failures
}
