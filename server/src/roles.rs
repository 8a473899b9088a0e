//! Role dealing for a single round.

use crate::error::SessionError;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{PlayerId, Role, Variant};
use std::collections::BTreeMap;

/// Which card each player holds this round.
pub type RoleAssignment = BTreeMap<PlayerId, Role>;

/// Deals one card of `variant` to each player.
///
/// Both the player list and the card list are shuffled and then paired by
/// position, which yields a uniformly random bijection. The caller decides the
/// variant from the table size; a mismatch between the two is an error.
pub fn assign_roles<R: Rng + ?Sized>(
    player_ids: &[PlayerId],
    variant: Variant,
    rng: &mut R,
) -> Result<RoleAssignment, SessionError> {
    if player_ids.len() != variant.player_count() {
        return Err(SessionError::InvalidPlayerCount(player_ids.len()));
    }

    let mut ids = player_ids.to_vec();
    ids.shuffle(rng);
    let mut roles = variant.roles().to_vec();
    roles.shuffle(rng);

    let assignment: RoleAssignment = ids.into_iter().zip(roles).collect();
    if assignment.len() != variant.player_count() {
        return Err(SessionError::DuplicatePlayer);
    }
    Ok(assignment)
}

/// Returns the player holding `role`, if anyone does.
pub fn holder_of(assignment: &RoleAssignment, role: Role) -> Option<&PlayerId> {
    assignment
        .iter()
        .find(|(_, held)| **held == role)
        .map(|(id, _)| id)
}
