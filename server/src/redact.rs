//! Per-player views of a session.
//!
//! This is the only place session state is turned into something a client
//! can see, so every role label goes through [`visible_role`]:
//!
//! - a player always sees their own card once it has been dealt;
//! - the pradhan is public from `RevealPradhan` on;
//! - the police is public from `RevealPolice` on;
//! - every card is public in `Result` and `Scoreboard`.
//!
//! `police_id` and `pradhan_id` are passed through as soon as they exist.

use crate::session::Session;
use shared::{Phase, PlayerView, Role, SessionView};

pub fn redact(session: &Session, viewer_id: &str) -> SessionView {
    let players = session
        .players
        .values()
        .map(|player| PlayerView {
            id: player.id.clone(),
            name: player.name.clone(),
            score: player.score,
            connected: player.connected,
            role: visible_role(session, viewer_id, &player.id),
        })
        .collect();

    SessionView {
        your_id: viewer_id.to_string(),
        phase: session.phase,
        round: session.round,
        total_rounds: session.total_rounds,
        host_id: session.host_id.clone(),
        max_players: session.max_players,
        players,
        police_id: session.police_id.clone(),
        pradhan_id: session.pradhan_id.clone(),
        police_guess: session.police_guess.clone(),
        guess_correct: session.guess_correct,
        police_guess_deadline: session.police_guess_deadline,
        next_round_deadline: session.next_round_deadline,
    }
}

/// The role of `player_id` as `viewer_id` is allowed to see it.
pub fn visible_role(session: &Session, viewer_id: &str, player_id: &str) -> Option<Role> {
    let role = *session.current_roles.get(player_id)?;
    let phase = session.phase;

    let own_card = player_id == viewer_id && phase != Phase::Lobby;
    let stepped_forward = match role {
        Role::Pradhan => {
            phase.pradhan_revealed() && session.pradhan_id.as_deref() == Some(player_id)
        }
        Role::Police => phase.police_revealed() && session.police_id.as_deref() == Some(player_id),
        _ => false,
    };

    (own_card || stepped_forward || phase.all_revealed()).then_some(role)
}
