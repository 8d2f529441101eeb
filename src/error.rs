use crate::datastore::DataStoreError;
use crate::session::PlayerId;

/// Errors surfaced by the public player data API
///
/// Per-key store failures never reach callers as errors; they are retried,
/// logged and contained. These variants cover misuse of the API itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerDataError {
    /// `init` was called more than once
    AlreadyInitialized,
    /// Operation requires store resolution to have completed
    NotReady,
    /// Key is not part of the default registry
    UnknownKey(String),
    /// A session for the player is already loaded or loading
    AlreadyLoaded(PlayerId),
    /// No active session for the player
    PlayerNotFound(PlayerId),
    /// No store could be resolved for the key
    StoreUnavailable(String),
    /// Configuration could not be loaded
    Config(String),
    /// Backing store failure
    Store(DataStoreError),
}

impl std::fmt::Display for PlayerDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerDataError::AlreadyInitialized => write!(f, "player data already initialized"),
            PlayerDataError::NotReady => write!(f, "player data is not ready"),
            PlayerDataError::UnknownKey(key) => write!(f, "unknown data key: {}", key),
            PlayerDataError::AlreadyLoaded(player) => {
                write!(f, "player {} is already loaded", player)
            }
            PlayerDataError::PlayerNotFound(player) => {
                write!(f, "no session for player {}", player)
            }
            PlayerDataError::StoreUnavailable(key) => {
                write!(f, "no store resolved for key: {}", key)
            }
            PlayerDataError::Config(msg) => write!(f, "configuration error: {}", msg),
            PlayerDataError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for PlayerDataError {}

impl From<DataStoreError> for PlayerDataError {
    fn from(e: DataStoreError) -> Self {
        PlayerDataError::Store(e)
    }
}
