//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sessionkit_core::{
    Action, Address, ChainId, EnforcementPolicy, FeeDesignation, GrantBuilder, Keypair,
    PermissionGrant, PolicyDescriptor, Selector, SmartAccountHandle,
};

/// Generate a chain id anywhere in the u64 range, biased towards values
/// that do not fit an i64 or a double.
pub fn chain_id() -> impl Strategy<Value = ChainId> {
    prop_oneof![
        Just(ChainId::ETHEREUM.get()),
        Just(ChainId::BASE.get()),
        (1u64 << 53)..=u64::MAX,
        Just(u64::MAX),
        any::<u64>(),
    ]
    .prop_map(ChainId::new)
}

/// Generate a random Address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate a random Selector.
pub fn selector() -> impl Strategy<Value = Selector> {
    any::<[u8; 4]>().prop_map(Selector::from_bytes)
}

/// Generate a valid secp256k1 keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_filter_map("secret out of range", |secret| {
        Keypair::from_secret_bytes(&secret).ok()
    })
}

pub fn account() -> impl Strategy<Value = SmartAccountHandle> {
    (chain_id(), address()).prop_map(|(chain_id, address)| SmartAccountHandle::new(chain_id, address))
}

pub fn fee() -> impl Strategy<Value = FeeDesignation> {
    (address(), chain_id()).prop_map(|(token, chain_id)| FeeDesignation::new(token, chain_id))
}

pub fn policy_descriptor() -> impl Strategy<Value = PolicyDescriptor> {
    (chain_id(), address(), selector()).prop_map(|(chain_id, target, selector)| {
        PolicyDescriptor::new(chain_id, target, selector, EnforcementPolicy::Unrestricted)
    })
}

/// Generate a non-empty descriptor list, duplicates allowed.
pub fn policies(max_len: usize) -> impl Strategy<Value = Vec<PolicyDescriptor>> {
    prop::collection::vec(policy_descriptor(), 1..=max_len.max(1))
}

/// Generate an action that calls `descriptor` with random arguments.
pub fn action_for(descriptor: PolicyDescriptor) -> impl Strategy<Value = Action> {
    prop::collection::vec(any::<u8>(), 0..=128).prop_map(move |args| {
        Action::call(descriptor.chain_id, descriptor.target, descriptor.selector, &args)
    })
}

/// Parameters for generating a signed grant.
#[derive(Debug)]
pub struct GrantParams {
    pub owner: Keypair,
    pub account: SmartAccountHandle,
    pub redeemer: Address,
    pub fee: FeeDesignation,
    pub nonce: u64,
    pub policies: Vec<PolicyDescriptor>,
}

impl Arbitrary for GrantParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            keypair(),
            account(),
            address(),
            fee(),
            any::<u64>(),
            policies(8),
        )
            .prop_map(|(owner, account, redeemer, fee, nonce, policies)| GrantParams {
                owner,
                account,
                redeemer,
                fee,
                nonce,
                policies,
            })
            .boxed()
    }
}

/// Build and sign a grant from parameters.
pub fn grant_from_params(params: &GrantParams) -> PermissionGrant {
    GrantBuilder::new(params.account, params.owner.address(), params.redeemer, params.fee)
        .nonce(params.nonce)
        .policies(params.policies.iter().copied())
        .build()
        .and_then(|unsigned| unsigned.sign(&params.owner))
        .expect("generated grant parameters are valid")
}
