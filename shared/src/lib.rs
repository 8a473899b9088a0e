use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{decode, encode, read_frame, write_frame, ProtocolError};

/// Stable player identity chosen by the client and reused on reconnect.
pub type PlayerId = String;
pub type RoomId = String;

pub const MAX_FRAME_LEN: usize = 64 * 1024;
pub const MAX_NAME_LEN: usize = 24;
pub const DEFAULT_PLAYER_NAME: &str = "Player";
pub const MIN_TOTAL_ROUNDS: u32 = 1;
pub const MAX_TOTAL_ROUNDS: u32 = 20;
pub const MAX_PLAYERS: usize = 5;

/// The five cards of the game. `Raja` and `Rani` are the king and queen,
/// `Pradhan` the minister, `Police` the detective and `Chor` the thief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Raja,
    Rani,
    Pradhan,
    Police,
    Chor,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Raja => "Raja",
            Role::Rani => "Rani",
            Role::Pradhan => "Pradhan",
            Role::Police => "Police",
            Role::Chor => "Chor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Lobby,
    Dealing,
    RevealPradhan,
    RevealPolice,
    PoliceGuess,
    Result,
    Scoreboard,
}

impl Phase {
    /// True once the pradhan has been called forward (and for every later phase).
    pub fn pradhan_revealed(self) -> bool {
        matches!(
            self,
            Phase::RevealPradhan
                | Phase::RevealPolice
                | Phase::PoliceGuess
                | Phase::Result
                | Phase::Scoreboard
        )
    }

    pub fn police_revealed(self) -> bool {
        matches!(
            self,
            Phase::RevealPolice | Phase::PoliceGuess | Phase::Result | Phase::Scoreboard
        )
    }

    pub fn all_revealed(self) -> bool {
        matches!(self, Phase::Result | Phase::Scoreboard)
    }
}

/// Table size for a round. The pradhan only exists at five players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    FourPlayer,
    FivePlayer,
}

impl Variant {
    pub fn from_player_count(count: usize) -> Option<Self> {
        match count {
            4 => Some(Variant::FourPlayer),
            5 => Some(Variant::FivePlayer),
            _ => None,
        }
    }

    pub fn player_count(self) -> usize {
        match self {
            Variant::FourPlayer => 4,
            Variant::FivePlayer => 5,
        }
    }

    pub fn roles(self) -> &'static [Role] {
        match self {
            Variant::FourPlayer => &[Role::Raja, Role::Rani, Role::Police, Role::Chor],
            Variant::FivePlayer => &[
                Role::Raja,
                Role::Rani,
                Role::Pradhan,
                Role::Police,
                Role::Chor,
            ],
        }
    }
}

/// Game commands a room member can issue once joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    StartRound,
    RevealPradhan,
    RevealPolice,
    PoliceGuess { target_id: PlayerId },
    NextRound,
    EndGame,
    PlayAgain,
    SetMaxPlayers { count: u8 },
    SetTotalRounds { rounds: u32 },
}

/// Relayed to every room member, never touches game state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    Talking(bool),
    Emoji(String),
    Chat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Handshake: enter a room under a stable identity.
    Join {
        room_id: RoomId,
        player_id: PlayerId,
        name: String,
    },
    /// Handshake: receive room directory snapshots instead of joining.
    WatchRooms,
    Command(Command),
    /// Opaque peer-to-peer signaling forwarded to one room member.
    Signal {
        target_id: PlayerId,
        payload: Vec<u8>,
    },
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    State(SessionView),
    /// Terminal: the connection is closed right after this message.
    Error {
        message: String,
    },
    Signal {
        from_id: PlayerId,
        payload: Vec<u8>,
    },
    Notification {
        from_id: PlayerId,
        from_name: String,
        notification: Notification,
    },
    Rooms(Vec<RoomStatus>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub connected: bool,
    /// Only populated when the viewer is entitled to see it.
    pub role: Option<Role>,
}

/// The part of a room's state one player is allowed to observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub your_id: PlayerId,
    pub phase: Phase,
    pub round: u32,
    pub total_rounds: u32,
    pub host_id: Option<PlayerId>,
    pub max_players: u8,
    pub players: Vec<PlayerView>,
    pub police_id: Option<PlayerId>,
    pub pradhan_id: Option<PlayerId>,
    pub police_guess: Option<PlayerId>,
    pub guess_correct: Option<bool>,
    /// Milliseconds since the UNIX epoch.
    pub police_guess_deadline: Option<u64>,
    pub next_round_deadline: Option<u64>,
}

impl SessionView {
    pub fn player(&self, id: &str) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn me(&self) -> Option<&PlayerView> {
        self.player(&self.your_id)
    }

    pub fn is_host(&self) -> bool {
        self.host_id.as_deref() == Some(self.your_id.as_str())
    }
}

/// Coarse room summary published to the room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub player_count: usize,
    pub max_players: u8,
    pub phase: Phase,
    pub host_name: Option<String>,
    pub round: u32,
    pub total_rounds: u32,
}

/// Trims a requested display name, falling back to a default when empty.
pub fn sanitize_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_PLAYER_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}
