//! Point table and per-round score deltas.

use crate::roles::RoleAssignment;
use shared::{PlayerId, Role, Variant};
use std::collections::BTreeMap;

pub const RAJA_POINTS: u32 = 1000;
pub const RANI_POINTS: u32 = 900;
pub const PRADHAN_POINTS: u32 = 800;
pub const POLICE_POINTS: u32 = 700;

/// Face value of a card. The pradhan is worth nothing at four players
/// because the card is not in play.
pub fn base_points(role: Role, variant: Variant) -> u32 {
    match (role, variant) {
        (Role::Raja, _) => RAJA_POINTS,
        (Role::Rani, _) => RANI_POINTS,
        (Role::Pradhan, Variant::FivePlayer) => PRADHAN_POINTS,
        (Role::Pradhan, Variant::FourPlayer) => 0,
        (Role::Police, _) => POLICE_POINTS,
        (Role::Chor, _) => 0,
    }
}

/// Computes what each player earns for a finished round.
///
/// Raja, rani and pradhan always collect their face value. The police only
/// collects on a correct guess; on a wrong guess the chor takes the police's
/// points instead. Nothing here touches player scores.
pub fn score(
    roles: &RoleAssignment,
    guess_correct: bool,
    variant: Variant,
) -> BTreeMap<PlayerId, u32> {
    let police_value = base_points(Role::Police, variant);

    roles
        .iter()
        .map(|(id, role)| {
            let delta = match role {
                Role::Police if guess_correct => police_value,
                Role::Police => 0,
                Role::Chor if guess_correct => 0,
                Role::Chor => police_value,
                other => base_points(*other, variant),
            };
            (id.clone(), delta)
        })
        .collect()
}
