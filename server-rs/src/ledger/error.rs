#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("user is not an active member of this league")]
    NotLeagueMember,

    #[error("game is not active")]
    GameNotActive,

    #[error("game is still active")]
    GameStillActive,

    #[error("league already has an active game")]
    ActiveGameExists,

    #[error("{count} player(s) still active")]
    PlayersStillActive { count: usize },

    #[error("player is already inactive")]
    PlayerAlreadyInactive,

    #[error("player is already active")]
    AlreadyActive,

    #[error("player is not in this game")]
    PlayerNotInGame,

    #[error("no matching entry to undo")]
    NothingToUndo,

    #[error("invalid roster: {0}")]
    RosterInvalid(String),

    #[error("{0} is not configured")]
    Unavailable(&'static str),

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Stable machine-checkable reason carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::NotLeagueMember => "NOT_LEAGUE_MEMBER",
            LedgerError::GameNotActive => "GAME_NOT_ACTIVE",
            LedgerError::GameStillActive => "GAME_STILL_ACTIVE",
            LedgerError::ActiveGameExists => "ACTIVE_GAME_EXISTS",
            LedgerError::PlayersStillActive { .. } => "PLAYERS_STILL_ACTIVE",
            LedgerError::PlayerAlreadyInactive => "PLAYER_ALREADY_INACTIVE",
            LedgerError::AlreadyActive => "ALREADY_ACTIVE",
            LedgerError::PlayerNotInGame => "PLAYER_NOT_IN_GAME",
            LedgerError::NothingToUndo => "NOTHING_TO_UNDO",
            LedgerError::RosterInvalid(_) => "ROSTER_INVALID",
            LedgerError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            LedgerError::Storage(_) | LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
