//! Policy descriptors and the actions they authorize.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::types::{Address, ChainId, Selector};

/// Runtime constraint applied on top of a (chain, target, selector) match.
///
/// New policies may be added; match on this enum with a wildcard arm.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementPolicy {
    /// No constraint beyond the target and selector match.
    #[default]
    Unrestricted,
}

impl EnforcementPolicy {
    /// Stable numeric code used in the canonical grant encoding.
    pub fn code(self) -> u64 {
        match self {
            EnforcementPolicy::Unrestricted => 0,
        }
    }

    /// Parse a policy from its canonical code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(EnforcementPolicy::Unrestricted),
            _ => None,
        }
    }

    /// Check whether this policy allows the given action.
    pub fn permits(self, _action: &Action) -> bool {
        match self {
            EnforcementPolicy::Unrestricted => true,
        }
    }
}

/// One authorized action: a callable entry point plus its enforcement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyDescriptor {
    /// The chain the target lives on.
    pub chain_id: ChainId,

    /// The contract that may be called.
    pub target: Address,

    /// The function on `target` that may be called.
    pub selector: Selector,

    /// Additional constraint on the call.
    pub policy: EnforcementPolicy,
}

impl PolicyDescriptor {
    pub fn new(
        chain_id: ChainId,
        target: Address,
        selector: Selector,
        policy: EnforcementPolicy,
    ) -> Self {
        Self {
            chain_id,
            target,
            selector,
            policy,
        }
    }

    /// A descriptor with no constraint beyond the entry-point match.
    pub fn unrestricted(chain_id: ChainId, target: Address, selector: Selector) -> Self {
        Self::new(chain_id, target, selector, EnforcementPolicy::Unrestricted)
    }

    /// Check whether `action` calls the entry point this descriptor names
    /// and satisfies its policy.
    pub fn matches(&self, action: &Action) -> bool {
        self.chain_id == action.chain_id
            && self.target == action.target
            && action.selector() == Some(self.selector)
            && self.policy.permits(action)
    }
}

/// A single call the session wants to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub chain_id: ChainId,
    pub target: Address,
    /// ABI-encoded calldata; the first four bytes are the selector.
    pub call_data: Bytes,
}

impl Action {
    pub fn new(chain_id: ChainId, target: Address, call_data: impl Into<Bytes>) -> Self {
        Self {
            chain_id,
            target,
            call_data: call_data.into(),
        }
    }

    /// Build an action from a selector and already-encoded arguments.
    pub fn call(chain_id: ChainId, target: Address, selector: Selector, args: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(4 + args.len());
        buf.put_slice(selector.as_bytes());
        buf.put_slice(args);
        Self::new(chain_id, target, buf.freeze())
    }

    /// The selector this action invokes, if the calldata carries one.
    pub fn selector(&self) -> Option<Selector> {
        Selector::from_call_data(&self.call_data)
    }
}
