//! Scripted player used by the `bot` binary and by load tests.
//!
//! The bot looks only at the redacted view it was sent, exactly like a
//! human client. It answers a given situation once, so a burst of identical
//! state pushes does not turn into a burst of duplicate commands. A command
//! the server silently ignored gets retried as soon as the situation moves:
//! the roster changes, or a push arrives where the bot has nothing to do.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Command, Phase, PlayerId, SessionView, Variant};

/// The part of a view a move was based on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Situation {
    round: u32,
    phase: Phase,
    roster: Vec<(PlayerId, bool)>,
}

impl Situation {
    fn of(view: &SessionView) -> Self {
        Self {
            round: view.round,
            phase: view.phase,
            roster: view
                .players
                .iter()
                .map(|p| (p.id.clone(), p.connected))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Autoplayer {
    last_acted: Option<Situation>,
}

impl Autoplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_move<R: Rng + ?Sized>(
        &mut self,
        view: &SessionView,
        rng: &mut R,
    ) -> Option<Command> {
        let situation = Situation::of(view);
        if self.last_acted.as_ref() == Some(&situation) {
            return None;
        }

        match Self::choose(view, rng) {
            Some(command) => {
                self.last_acted = Some(situation);
                Some(command)
            }
            None => {
                self.last_acted = None;
                None
            }
        }
    }

    fn choose<R: Rng + ?Sized>(view: &SessionView, rng: &mut R) -> Option<Command> {
        let me = view.your_id.as_str();

        match view.phase {
            Phase::Lobby if view.is_host() => {
                if view.round > 0 && view.round >= view.total_rounds {
                    return Some(Command::EndGame);
                }
                let everyone_here = view.players.iter().all(|p| p.connected);
                let playable = Variant::from_player_count(view.players.len()).is_some();
                (everyone_here && playable).then_some(Command::StartRound)
            }
            Phase::RevealPradhan if view.pradhan_id.as_deref() == Some(me) => {
                Some(Command::RevealPradhan)
            }
            Phase::RevealPolice if view.police_id.as_deref() == Some(me) => {
                Some(Command::RevealPolice)
            }
            Phase::PoliceGuess if view.police_id.as_deref() == Some(me) => {
                let suspects: Vec<&PlayerId> = view
                    .players
                    .iter()
                    .map(|p| &p.id)
                    .filter(|id| id.as_str() != me && view.pradhan_id.as_ref() != Some(*id))
                    .collect();
                let target_id = (*suspects.choose(rng)?).clone();
                Some(Command::PoliceGuess { target_id })
            }
            Phase::Result if view.is_host() => Some(Command::NextRound),
            _ => None,
        }
    }
}
