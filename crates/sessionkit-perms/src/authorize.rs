//! Local authorization of actions against a grant.
//!
//! Runs before anything is signed or submitted: an action that no descriptor
//! covers never leaves the process.

use sessionkit_core::{Action, PermissionGrant};

use crate::error::{PermsError, Result};

/// Check every action against the grant's descriptors.
///
/// Returns, for each action in order, the index of the first descriptor that
/// authorizes it. Fails on the first action with no match.
pub fn authorize_actions(grant: &PermissionGrant, actions: &[Action]) -> Result<Vec<usize>> {
    if actions.is_empty() {
        return Err(PermsError::EmptyActionSet);
    }

    actions
        .iter()
        .enumerate()
        .map(|(index, action)| match grant.find_policy(action) {
            Some((policy_index, _)) => Ok(policy_index),
            None => Err(PermsError::ActionNotAuthorized {
                index,
                chain_id: action.chain_id,
                target: action.target,
                selector: action.selector(),
            }),
        })
        .collect()
}
