//! The authoritative game session for one room.
//!
//! `Session` is a plain synchronous state machine. It never sleeps, never
//! talks to the network and never reads the clock or an RNG on its own: the
//! room actor passes in the current time and its random source, and gets back
//! an [`Outcome`] telling it whether anything changed and which timers to
//! arm or cancel. That keeps every transition deterministic under test.
//!
//! Commands that fail their guard (wrong phase, wrong sender, bad target) are
//! dropped without touching any field, so the room does not re-broadcast.

use crate::config::SessionConfig;
use crate::error::AdmissionError;
use crate::roles::{assign_roles, holder_of, RoleAssignment};
use crate::scoring::score;
use crate::timers::{PendingTimer, TimerKind, TimerOp, TimerToken};
use crate::utils::deadline_ms;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{
    Command, Phase, PlayerId, Role, RoomStatus, Variant, MAX_TOTAL_ROUNDS, MIN_TOTAL_ROUNDS,
};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Running total for the current game; only `play_again` resets it.
    pub score: u32,
    pub connected: bool,
}

/// What the room actor has to do after handing an event to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Session state changed and every connection needs a fresh view.
    pub changed: bool,
    pub timers: Vec<TimerOp>,
}

impl Outcome {
    pub fn unchanged() -> Self {
        Self::default()
    }

    fn changed(timers: Vec<TimerOp>) -> Self {
        Self {
            changed: true,
            timers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub phase: Phase,
    pub players: BTreeMap<PlayerId, Player>,
    /// `None` only while the room is empty.
    pub host_id: Option<PlayerId>,
    pub round: u32,
    pub total_rounds: u32,
    /// Empty outside an active round.
    pub current_roles: RoleAssignment,
    pub police_id: Option<PlayerId>,
    pub pradhan_id: Option<PlayerId>,
    pub police_guess: Option<PlayerId>,
    pub guess_correct: Option<bool>,
    pub max_players: u8,
    /// Milliseconds since the UNIX epoch; set only while the guess timer runs.
    pub police_guess_deadline: Option<u64>,
    /// Milliseconds since the UNIX epoch; set only while the next-round timer runs.
    pub next_round_deadline: Option<u64>,
    pending_timer: Option<PendingTimer>,
    next_token: u64,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            phase: Phase::Lobby,
            players: BTreeMap::new(),
            host_id: None,
            round: 0,
            total_rounds: config.total_rounds.clamp(MIN_TOTAL_ROUNDS, MAX_TOTAL_ROUNDS),
            current_roles: RoleAssignment::new(),
            police_id: None,
            pradhan_id: None,
            police_guess: None,
            guess_correct: None,
            max_players: config.max_players,
            police_guess_deadline: None,
            next_round_deadline: None,
            pending_timer: None,
            next_token: 1,
            config,
        }
    }

    pub fn pending_timer(&self) -> Option<PendingTimer> {
        self.pending_timer
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn player_name(&self, id: &str) -> Option<&str> {
        self.players.get(id).map(|p| p.name.as_str())
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    /// Coarse summary for the room directory.
    pub fn status(&self, room_id: &str) -> RoomStatus {
        RoomStatus {
            room_id: room_id.to_string(),
            player_count: self.players.len(),
            max_players: self.max_players,
            phase: self.phase,
            host_name: self
                .host_id
                .as_deref()
                .and_then(|id| self.player_name(id))
                .map(str::to_string),
            round: self.round,
            total_rounds: self.total_rounds,
        }
    }

    /// Admits a connection under `id`.
    ///
    /// A known identity is a reconnect and is always let back in, whatever the
    /// phase. A new identity only gets in while the room sits in the lobby and
    /// has a free seat. The first player ever admitted becomes host.
    pub fn join(&mut self, id: &str, name: &str) -> Result<(), AdmissionError> {
        if let Some(player) = self.players.get_mut(id) {
            player.connected = true;
            info!("Player {} reconnected", id);
            return Ok(());
        }

        if self.phase != Phase::Lobby {
            return Err(AdmissionError::GameInProgress);
        }
        if self.players.len() >= self.max_players as usize {
            return Err(AdmissionError::RoomFull);
        }

        self.players.insert(
            id.to_string(),
            Player {
                id: id.to_string(),
                name: name.to_string(),
                score: 0,
                connected: true,
            },
        );
        if self.host_id.is_none() {
            self.host_id = Some(id.to_string());
        }

        info!("Player {} ({}) joined, {} in room", id, name, self.players.len());
        Ok(())
    }

    /// Marks a player offline. The record stays so they can reconnect.
    pub fn disconnect(&mut self, id: &str) -> bool {
        match self.players.get_mut(id) {
            Some(player) if player.connected => {
                player.connected = false;
                info!("Player {} disconnected", id);
                true
            }
            _ => false,
        }
    }

    pub fn handle_command<R: Rng + ?Sized>(
        &mut self,
        sender: &str,
        command: Command,
        now_ms: u64,
        rng: &mut R,
    ) -> Outcome {
        match command {
            Command::StartRound => self.start_round(sender, now_ms, rng),
            Command::RevealPradhan => self.reveal_pradhan(sender),
            Command::RevealPolice => self.reveal_police(sender, now_ms),
            Command::PoliceGuess { target_id } => {
                if self.police_id.as_deref() != Some(sender) {
                    return self.ignore(sender, "police_guess");
                }
                self.resolve_guess(&target_id, now_ms)
            }
            Command::NextRound => self.next_round(sender),
            Command::EndGame => self.end_game(sender),
            Command::PlayAgain => self.play_again(sender),
            Command::SetMaxPlayers { count } => self.set_max_players(sender, count),
            Command::SetTotalRounds { rounds } => self.set_total_rounds(sender, rounds),
        }
    }

    /// Delivers a timer firing. Anything but the currently pending timer is
    /// stale and ignored.
    pub fn handle_timer<R: Rng + ?Sized>(
        &mut self,
        kind: TimerKind,
        token: TimerToken,
        now_ms: u64,
        rng: &mut R,
    ) -> Outcome {
        match self.pending_timer {
            Some(pending) if pending.kind == kind && pending.token == token => {}
            _ => {
                debug!("Ignoring stale {:?} timer {:?}", kind, token);
                return Outcome::unchanged();
            }
        }
        self.pending_timer = None;

        match kind {
            TimerKind::Deal => self.finish_dealing(),
            TimerKind::PoliceGuess => match self.random_suspect(rng) {
                Some(target) => {
                    info!("Police ran out of time, accusing {}", target);
                    self.resolve_guess(&target, now_ms)
                }
                None => {
                    warn!("Guess timer fired with nobody to accuse");
                    Outcome::unchanged()
                }
            },
            TimerKind::NextRound => self.advance_after_result(),
        }
    }

    fn start_round<R: Rng + ?Sized>(&mut self, sender: &str, now_ms: u64, rng: &mut R) -> Outcome {
        if self.phase != Phase::Lobby || !self.is_host(sender) {
            return self.ignore(sender, "start_round");
        }
        if self.round >= self.total_rounds {
            return self.ignore(sender, "start_round past the round cap");
        }
        let Some(variant) = Variant::from_player_count(self.players.len()) else {
            return self.ignore(sender, "start_round without 4 or 5 players");
        };

        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        let roles = match assign_roles(&ids, variant, rng) {
            Ok(roles) => roles,
            Err(e) => {
                warn!("Could not deal roles: {}", e);
                return Outcome::unchanged();
            }
        };

        self.round += 1;
        self.clear_guess();
        self.police_id = holder_of(&roles, Role::Police).cloned();
        self.pradhan_id = holder_of(&roles, Role::Pradhan).cloned();
        self.current_roles = roles;
        self.phase = Phase::Dealing;

        info!(
            "Round {}/{} dealt to {} players",
            self.round,
            self.total_rounds,
            ids.len()
        );

        let mut timers = Vec::new();
        self.arm(TimerKind::Deal, self.config.deal_delay, now_ms, &mut timers);
        Outcome::changed(timers)
    }

    fn finish_dealing(&mut self) -> Outcome {
        if self.phase != Phase::Dealing {
            return Outcome::unchanged();
        }
        self.phase = if self.pradhan_id.is_some() {
            Phase::RevealPradhan
        } else {
            Phase::RevealPolice
        };
        debug!("Dealing finished, now {:?}", self.phase);
        Outcome::changed(Vec::new())
    }

    fn reveal_pradhan(&mut self, sender: &str) -> Outcome {
        if self.phase != Phase::RevealPradhan || self.role_of(sender) != Some(Role::Pradhan) {
            return self.ignore(sender, "reveal_pradhan");
        }
        self.phase = Phase::RevealPolice;
        Outcome::changed(Vec::new())
    }

    fn reveal_police(&mut self, sender: &str, now_ms: u64) -> Outcome {
        if self.phase != Phase::RevealPolice || self.role_of(sender) != Some(Role::Police) {
            return self.ignore(sender, "reveal_police");
        }
        self.phase = Phase::PoliceGuess;

        let mut timers = Vec::new();
        self.arm(
            TimerKind::PoliceGuess,
            self.config.police_guess_timeout,
            now_ms,
            &mut timers,
        );
        Outcome::changed(timers)
    }

    /// Shared by the police's own guess and the guess timeout.
    fn resolve_guess(&mut self, target_id: &str, now_ms: u64) -> Outcome {
        if self.phase != Phase::PoliceGuess {
            return Outcome::unchanged();
        }
        let Some(target_role) = self.role_of(target_id) else {
            return Outcome::unchanged();
        };
        if self.police_id.as_deref() == Some(target_id) {
            return Outcome::unchanged();
        }
        let Some(variant) = Variant::from_player_count(self.current_roles.len()) else {
            return Outcome::unchanged();
        };

        let mut timers = Vec::new();
        self.cancel_timer(&mut timers);

        let guess_correct = target_role == Role::Chor;
        for (id, delta) in score(&self.current_roles, guess_correct, variant) {
            if let Some(player) = self.players.get_mut(&id) {
                player.score = player.score.saturating_add(delta);
            }
        }

        self.police_guess = Some(target_id.to_string());
        self.guess_correct = Some(guess_correct);
        self.phase = Phase::Result;
        info!(
            "Round {} resolved: accused {}, correct: {}",
            self.round, target_id, guess_correct
        );

        self.arm(
            TimerKind::NextRound,
            self.config.next_round_timeout,
            now_ms,
            &mut timers,
        );
        Outcome::changed(timers)
    }

    fn next_round(&mut self, sender: &str) -> Outcome {
        if self.phase != Phase::Result || !self.is_host(sender) {
            return self.ignore(sender, "next_round");
        }
        self.advance_after_result()
    }

    fn advance_after_result(&mut self) -> Outcome {
        if self.phase != Phase::Result {
            return Outcome::unchanged();
        }

        let mut timers = Vec::new();
        self.cancel_timer(&mut timers);

        if self.round < self.total_rounds {
            self.clear_round();
            self.phase = Phase::Lobby;
        } else {
            info!("Round cap of {} reached, game over", self.total_rounds);
            self.phase = Phase::Scoreboard;
        }
        Outcome::changed(timers)
    }

    fn end_game(&mut self, sender: &str) -> Outcome {
        let between_rounds = self.phase == Phase::Lobby && self.round > 0;
        if !(self.phase == Phase::Result || between_rounds) || !self.is_host(sender) {
            return self.ignore(sender, "end_game");
        }

        let mut timers = Vec::new();
        self.cancel_timer(&mut timers);
        self.phase = Phase::Scoreboard;
        info!("Host ended the game after round {}", self.round);
        Outcome::changed(timers)
    }

    fn play_again(&mut self, sender: &str) -> Outcome {
        if self.phase != Phase::Scoreboard || !self.is_member(sender) {
            return self.ignore(sender, "play_again");
        }

        let mut timers = Vec::new();
        self.cancel_timer(&mut timers);
        for player in self.players.values_mut() {
            player.score = 0;
        }
        self.clear_round();
        self.round = 0;
        self.phase = Phase::Lobby;
        info!("New game requested by {}", sender);
        Outcome::changed(timers)
    }

    fn set_max_players(&mut self, sender: &str, count: u8) -> Outcome {
        if self.phase != Phase::Lobby || !self.is_host(sender) {
            return self.ignore(sender, "set_max_players");
        }
        if Variant::from_player_count(count as usize).is_none() || count == self.max_players {
            return Outcome::unchanged();
        }
        self.max_players = count;
        Outcome::changed(Vec::new())
    }

    fn set_total_rounds(&mut self, sender: &str, rounds: u32) -> Outcome {
        if self.phase != Phase::Lobby || !self.is_host(sender) {
            return self.ignore(sender, "set_total_rounds");
        }
        let rounds = rounds.clamp(MIN_TOTAL_ROUNDS, MAX_TOTAL_ROUNDS);
        if rounds == self.total_rounds {
            return Outcome::unchanged();
        }
        self.total_rounds = rounds;
        Outcome::changed(Vec::new())
    }

    fn is_host(&self, id: &str) -> bool {
        self.host_id.as_deref() == Some(id)
    }

    fn role_of(&self, id: &str) -> Option<Role> {
        self.current_roles.get(id).copied()
    }

    /// Anyone but the police and the already-revealed pradhan.
    fn random_suspect<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<PlayerId> {
        let suspects: Vec<&PlayerId> = self
            .current_roles
            .iter()
            .filter(|(_, role)| !matches!(role, Role::Police | Role::Pradhan))
            .map(|(id, _)| id)
            .collect();
        suspects.choose(rng).map(|id| (*id).clone())
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration, now_ms: u64, timers: &mut Vec<TimerOp>) {
        self.cancel_timer(timers);

        let token = TimerToken(self.next_token);
        self.next_token += 1;
        let deadline = deadline_ms(now_ms, delay);
        match kind {
            TimerKind::PoliceGuess => self.police_guess_deadline = Some(deadline),
            TimerKind::NextRound => self.next_round_deadline = Some(deadline),
            TimerKind::Deal => {}
        }

        self.pending_timer = Some(PendingTimer { kind, token });
        timers.push(TimerOp::Arm { kind, token, delay });
    }

    fn cancel_timer(&mut self, timers: &mut Vec<TimerOp>) {
        if let Some(pending) = self.pending_timer.take() {
            timers.push(TimerOp::Cancel { kind: pending.kind });
        }
        self.police_guess_deadline = None;
        self.next_round_deadline = None;
    }

    fn clear_guess(&mut self) {
        self.police_guess = None;
        self.guess_correct = None;
    }

    fn clear_round(&mut self) {
        self.current_roles.clear();
        self.police_id = None;
        self.pradhan_id = None;
        self.clear_guess();
    }

    fn ignore(&self, sender: &str, what: &str) -> Outcome {
        debug!("Ignoring {} from {} in {:?}", what, sender, self.phase);
        Outcome::unchanged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: u64 = 1_700_000_000_000;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(2024)
    }

    fn lobby(count: usize) -> Session {
        let mut session = Session::new(SessionConfig::default());
        for i in 1..=count {
            session.join(&format!("p{}", i), &format!("Player {}", i)).unwrap();
        }
        session
    }

    fn holder(session: &Session, role: Role) -> PlayerId {
        holder_of(&session.current_roles, role).unwrap().clone()
    }

    fn fire_pending(session: &mut Session, rng: &mut StdRng) -> Outcome {
        let pending = session.pending_timer().expect("a timer should be pending");
        session.handle_timer(pending.kind, pending.token, NOW, rng)
    }

    /// Deals a round and walks it up to the police's guess.
    fn at_police_guess(count: usize, rng: &mut StdRng) -> Session {
        let mut session = lobby(count);
        session.handle_command("p1", Command::StartRound, NOW, rng);
        fire_pending(&mut session, rng);
        if let Some(pradhan) = session.pradhan_id.clone() {
            session.handle_command(&pradhan, Command::RevealPradhan, NOW, rng);
        }
        let police = holder(&session, Role::Police);
        session.handle_command(&police, Command::RevealPolice, NOW, rng);
        assert_eq!(session.phase, Phase::PoliceGuess);
        session
    }

    #[test]
    fn test_first_player_is_host() {
        let session = lobby(3);
        assert_eq!(session.host_id.as_deref(), Some("p1"));
        assert_eq!(session.players.len(), 3);
        assert_eq!(session.phase, Phase::Lobby);
    }

    #[test]
    fn test_join_rejected_when_full() {
        let mut session = lobby(5);
        assert_eq!(session.join("p6", "Late"), Err(AdmissionError::RoomFull));
        assert_eq!(session.players.len(), 5);
    }

    #[test]
    fn test_join_rejected_mid_game_but_reconnect_allowed() {
        let mut rng = rng();
        let mut session = lobby(4);
        session.handle_command("p1", Command::StartRound, NOW, &mut rng);

        assert_eq!(session.join("p9", "New"), Err(AdmissionError::GameInProgress));

        assert!(session.disconnect("p2"));
        let roles_before = session.current_roles.clone();
        session.join("p2", "ignored").unwrap();

        assert!(session.players["p2"].connected);
        assert_eq!(session.players["p2"].name, "Player 2");
        assert_eq!(session.phase, Phase::Dealing);
        assert_eq!(session.current_roles, roles_before);
    }

    #[test]
    fn test_disconnect_keeps_the_record() {
        let mut session = lobby(2);
        assert!(session.disconnect("p2"));
        assert!(!session.disconnect("p2"));
        assert!(!session.players["p2"].connected);
        assert_eq!(session.players.len(), 2);
        assert_eq!(session.connected_count(), 1);
    }

    #[test]
    fn test_start_round_needs_host_and_enough_players() {
        let mut rng = rng();
        let mut session = lobby(3);
        let before = session.clone();
        assert!(!session.handle_command("p1", Command::StartRound, NOW, &mut rng).changed);
        assert_eq!(session, before);

        session.join("p4", "Player 4").unwrap();
        assert!(!session.handle_command("p2", Command::StartRound, NOW, &mut rng).changed);
        assert_eq!(session.phase, Phase::Lobby);

        let outcome = session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        assert!(outcome.changed);
        assert_eq!(session.phase, Phase::Dealing);
        assert_eq!(session.round, 1);
    }

    #[test]
    fn test_four_player_round_skips_pradhan() {
        let mut rng = rng();
        let mut session = lobby(4);

        let outcome = session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        assert_eq!(session.round, 1);
        assert_eq!(session.phase, Phase::Dealing);
        assert_eq!(session.current_roles.len(), 4);
        assert!(session.pradhan_id.is_none());
        assert!(session.police_id.is_some());
        assert!(matches!(
            outcome.timers.as_slice(),
            [TimerOp::Arm {
                kind: TimerKind::Deal,
                delay,
                ..
            }] if *delay == Duration::from_secs(3)
        ));

        fire_pending(&mut session, &mut rng);
        assert_eq!(session.phase, Phase::RevealPolice);
    }

    #[test]
    fn test_five_player_round_reveals_pradhan_first() {
        let mut rng = rng();
        let mut session = lobby(5);
        session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        fire_pending(&mut session, &mut rng);
        assert_eq!(session.phase, Phase::RevealPradhan);

        let pradhan = holder(&session, Role::Pradhan);
        let police = holder(&session, Role::Police);
        assert_eq!(session.pradhan_id.as_ref(), Some(&pradhan));

        assert!(!session.handle_command(&police, Command::RevealPradhan, NOW, &mut rng).changed);
        assert!(session.handle_command(&pradhan, Command::RevealPradhan, NOW, &mut rng).changed);
        assert_eq!(session.phase, Phase::RevealPolice);

        assert!(!session.handle_command(&pradhan, Command::RevealPolice, NOW, &mut rng).changed);
        let outcome = session.handle_command(&police, Command::RevealPolice, NOW, &mut rng);
        assert_eq!(session.phase, Phase::PoliceGuess);
        assert_eq!(session.police_guess_deadline, Some(NOW + 30_000));
        assert!(session.next_round_deadline.is_none());
        assert!(matches!(
            outcome.timers.as_slice(),
            [TimerOp::Arm {
                kind: TimerKind::PoliceGuess,
                ..
            }]
        ));
    }

    #[test]
    fn test_correct_guess_scores_police() {
        let mut rng = rng();
        let mut session = at_police_guess(5, &mut rng);
        let police = holder(&session, Role::Police);
        let chor = holder(&session, Role::Chor);

        let outcome = session.handle_command(
            &police,
            Command::PoliceGuess {
                target_id: chor.clone(),
            },
            NOW,
            &mut rng,
        );

        assert_eq!(session.phase, Phase::Result);
        assert_eq!(session.guess_correct, Some(true));
        assert_eq!(session.police_guess.as_ref(), Some(&chor));
        assert_eq!(session.players[&police].score, 700);
        assert_eq!(session.players[&chor].score, 0);
        assert_eq!(session.players[&holder(&session, Role::Raja)].score, 1000);
        assert!(session.police_guess_deadline.is_none());
        assert_eq!(session.next_round_deadline, Some(NOW + 15_000));
        assert_eq!(
            outcome.timers.first(),
            Some(&TimerOp::Cancel {
                kind: TimerKind::PoliceGuess
            })
        );
        assert!(matches!(
            outcome.timers.last(),
            Some(TimerOp::Arm {
                kind: TimerKind::NextRound,
                ..
            })
        ));
    }

    #[test]
    fn test_wrong_guess_pays_chor() {
        let mut rng = rng();
        let mut session = at_police_guess(5, &mut rng);
        let police = holder(&session, Role::Police);
        let chor = holder(&session, Role::Chor);
        let rani = holder(&session, Role::Rani);

        session.handle_command(
            &police,
            Command::PoliceGuess {
                target_id: rani.clone(),
            },
            NOW,
            &mut rng,
        );

        assert_eq!(session.guess_correct, Some(false));
        assert_eq!(session.players[&police].score, 0);
        assert_eq!(session.players[&chor].score, 700);
        assert_eq!(session.players[&rani].score, 900);
        let total: u32 = session.players.values().map(|p| p.score).sum();
        assert_eq!(total, 3400);
    }

    #[test]
    fn test_guess_from_non_police_or_bad_target_is_ignored() {
        let mut rng = rng();
        let mut session = at_police_guess(4, &mut rng);
        let police = holder(&session, Role::Police);
        let chor = holder(&session, Role::Chor);
        let before = session.clone();

        let by_chor = Command::PoliceGuess {
            target_id: police.clone(),
        };
        assert!(!session.handle_command(&chor, by_chor, NOW, &mut rng).changed);

        let at_self = Command::PoliceGuess {
            target_id: police.clone(),
        };
        assert!(!session.handle_command(&police, at_self, NOW, &mut rng).changed);

        let at_stranger = Command::PoliceGuess {
            target_id: "nobody".to_string(),
        };
        assert!(!session.handle_command(&police, at_stranger, NOW, &mut rng).changed);

        assert_eq!(session, before);
    }

    #[test]
    fn test_replayed_guess_changes_nothing() {
        let mut rng = rng();
        let mut session = at_police_guess(5, &mut rng);
        let police = holder(&session, Role::Police);
        let chor = holder(&session, Role::Chor);
        let guess = Command::PoliceGuess { target_id: chor };

        session.handle_command(&police, guess.clone(), NOW, &mut rng);
        let after_first = session.clone();

        let outcome = session.handle_command(&police, guess, NOW + 5, &mut rng);
        assert_eq!(outcome, Outcome::unchanged());
        assert_eq!(session, after_first);
    }

    #[test]
    fn test_guess_timeout_accuses_someone_eligible() {
        let mut rng = rng();
        let mut session = at_police_guess(5, &mut rng);
        let police = holder(&session, Role::Police);
        let pradhan = holder(&session, Role::Pradhan);

        let outcome = fire_pending(&mut session, &mut rng);

        assert!(outcome.changed);
        assert_eq!(session.phase, Phase::Result);
        let accused = session.police_guess.clone().unwrap();
        assert_ne!(accused, police);
        assert_ne!(accused, pradhan);
        assert!(session.next_round_deadline.is_some());
        assert!(session.police_guess_deadline.is_none());
    }

    #[test]
    fn test_manual_guess_beats_queued_timeout() {
        let mut rng = rng();
        let mut session = at_police_guess(4, &mut rng);
        let guess_timer = session.pending_timer().unwrap();
        let police = holder(&session, Role::Police);
        let chor = holder(&session, Role::Chor);

        session.handle_command(&police, Command::PoliceGuess { target_id: chor }, NOW, &mut rng);
        let resolved = session.clone();

        // The timeout was already in the queue when the guess landed.
        let late = session.handle_timer(guess_timer.kind, guess_timer.token, NOW, &mut rng);
        assert_eq!(late, Outcome::unchanged());
        assert_eq!(session, resolved);
        assert_eq!(session.players[&police].score, 700);
    }

    #[test]
    fn test_timeout_beats_late_manual_guess() {
        let mut rng = rng();
        let mut session = at_police_guess(4, &mut rng);
        let police = holder(&session, Role::Police);
        let chor = holder(&session, Role::Chor);

        fire_pending(&mut session, &mut rng);
        let resolved = session.clone();

        let guess = Command::PoliceGuess { target_id: chor };
        let late = session.handle_command(&police, guess, NOW, &mut rng);
        assert!(!late.changed);
        assert_eq!(session, resolved);
    }

    #[test]
    fn test_stale_deal_timer_does_not_touch_a_later_round() {
        let mut rng = rng();
        let mut session = lobby(4);
        session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        let first_deal = session.pending_timer().unwrap();

        fire_pending(&mut session, &mut rng);
        let police = holder(&session, Role::Police);
        session.handle_command(&police, Command::RevealPolice, NOW, &mut rng);
        fire_pending(&mut session, &mut rng);
        session.handle_command("p1", Command::NextRound, NOW, &mut rng);
        session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        assert_eq!(session.phase, Phase::Dealing);
        assert_eq!(session.round, 2);

        let stale = session.handle_timer(first_deal.kind, first_deal.token, NOW, &mut rng);
        assert!(!stale.changed);
        assert_eq!(session.phase, Phase::Dealing);
    }

    #[test]
    fn test_next_round_returns_to_lobby_until_cap() {
        let mut rng = rng();
        let mut session = at_police_guess(4, &mut rng);
        session.handle_command("p1", Command::SetTotalRounds { rounds: 2 }, NOW, &mut rng);
        assert_eq!(session.total_rounds, 5, "cap can only change in the lobby");

        fire_pending(&mut session, &mut rng);
        assert!(!session.handle_command("p2", Command::NextRound, NOW, &mut rng).changed);

        let outcome = session.handle_command("p1", Command::NextRound, NOW, &mut rng);
        assert_eq!(
            outcome.timers,
            vec![TimerOp::Cancel {
                kind: TimerKind::NextRound
            }]
        );
        assert_eq!(session.phase, Phase::Lobby);
        assert!(session.current_roles.is_empty());
        assert!(session.police_id.is_none());
        assert!(session.guess_correct.is_none());
        assert!(session.next_round_deadline.is_none());
        assert!(session.pending_timer().is_none());
    }

    #[test]
    fn test_reaching_the_cap_goes_to_scoreboard() {
        let mut rng = rng();
        let mut session = lobby(4);
        session.handle_command("p1", Command::SetTotalRounds { rounds: 1 }, NOW, &mut rng);
        assert_eq!(session.total_rounds, 1);

        session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        fire_pending(&mut session, &mut rng);
        let police = holder(&session, Role::Police);
        session.handle_command(&police, Command::RevealPolice, NOW, &mut rng);
        fire_pending(&mut session, &mut rng);
        assert_eq!(session.phase, Phase::Result);

        // Next-round timeout at the cap.
        fire_pending(&mut session, &mut rng);
        assert_eq!(session.phase, Phase::Scoreboard);
        assert_eq!(session.current_roles.len(), 4);
        assert!(session.pending_timer().is_none());

        assert!(!session.handle_command("p1", Command::StartRound, NOW, &mut rng).changed);
    }

    #[test]
    fn test_end_game_cancels_next_round_timer() {
        let mut rng = rng();
        let mut session = at_police_guess(4, &mut rng);
        fire_pending(&mut session, &mut rng);
        let next_round = session.pending_timer().unwrap();

        assert!(!session.handle_command("p2", Command::EndGame, NOW, &mut rng).changed);
        let outcome = session.handle_command("p1", Command::EndGame, NOW, &mut rng);

        assert_eq!(session.phase, Phase::Scoreboard);
        assert_eq!(
            outcome.timers,
            vec![TimerOp::Cancel {
                kind: TimerKind::NextRound
            }]
        );
        let stale = session.handle_timer(next_round.kind, next_round.token, NOW, &mut rng);
        assert!(!stale.changed);
        assert_eq!(session.phase, Phase::Scoreboard);
    }

    #[test]
    fn test_end_game_only_between_or_after_rounds() {
        let mut rng = rng();
        let mut session = lobby(4);
        assert!(!session.handle_command("p1", Command::EndGame, NOW, &mut rng).changed);

        session.handle_command("p1", Command::StartRound, NOW, &mut rng);
        assert!(!session.handle_command("p1", Command::EndGame, NOW, &mut rng).changed);
        assert_eq!(session.phase, Phase::Dealing);
    }

    #[test]
    fn test_play_again_resets_scores_and_keeps_roster() {
        let mut rng = rng();
        let mut session = at_police_guess(5, &mut rng);
        fire_pending(&mut session, &mut rng);
        session.handle_command("p1", Command::EndGame, NOW, &mut rng);
        assert!(session.players.values().any(|p| p.score > 0));

        assert!(!session.handle_command("ghost", Command::PlayAgain, NOW, &mut rng).changed);
        assert!(session.handle_command("p3", Command::PlayAgain, NOW, &mut rng).changed);

        assert_eq!(session.phase, Phase::Lobby);
        assert_eq!(session.round, 0);
        assert_eq!(session.players.len(), 5);
        assert!(session.players.values().all(|p| p.score == 0));
        assert!(session.current_roles.is_empty());
        assert!(session.pradhan_id.is_none());
        assert_eq!(session.host_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_settings_only_change_in_lobby_by_host() {
        let mut rng = rng();
        let mut session = lobby(4);
        let mut changed = |session: &mut Session, by: &str, command: Command| {
            session.handle_command(by, command, NOW, &mut rng).changed
        };

        assert!(!changed(&mut session, "p2", Command::SetMaxPlayers { count: 4 }));
        assert!(!changed(&mut session, "p1", Command::SetMaxPlayers { count: 7 }));
        assert!(changed(&mut session, "p1", Command::SetMaxPlayers { count: 4 }));
        assert_eq!(session.max_players, 4);
        assert_eq!(session.join("p5", "Five"), Err(AdmissionError::RoomFull));

        assert!(changed(&mut session, "p1", Command::SetTotalRounds { rounds: 0 }));
        assert_eq!(session.total_rounds, 1);
        assert!(changed(&mut session, "p1", Command::SetTotalRounds { rounds: 50 }));
        assert_eq!(session.total_rounds, 20);

        changed(&mut session, "p1", Command::StartRound);
        assert!(!changed(&mut session, "p1", Command::SetTotalRounds { rounds: 3 }));
        assert_eq!(session.total_rounds, 20);
    }

    #[test]
    fn test_at_most_one_deadline_at_a_time() {
        let mut rng = rng();
        let mut session = at_police_guess(5, &mut rng);
        assert!(session.police_guess_deadline.is_some() && session.next_round_deadline.is_none());

        fire_pending(&mut session, &mut rng);
        assert!(session.police_guess_deadline.is_none() && session.next_round_deadline.is_some());
    }

    #[test]
    fn test_status_reports_host_name() {
        let session = lobby(2);
        let status = session.status("room-1");
        assert_eq!(status.room_id, "room-1");
        assert_eq!(status.player_count, 2);
        assert_eq!(status.host_name.as_deref(), Some("Player 1"));
        assert_eq!(status.phase, Phase::Lobby);
    }
}
