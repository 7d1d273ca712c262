use thiserror::Error;

/// Errors surfaced to the user as a single reply.
///
/// Everything the command layer can fail with ends up here; none of these
/// terminate the process.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("join a voice channel first")]
    NotInVoice,
    #[error("not connected to a voice channel")]
    NoActiveSession,
    #[error("unknown bass level `{0}`, use one of: off, light, medium, hard, extreme")]
    InvalidPreset(String),
    #[error("could not reach the audio node: {0}")]
    NodeConnectFailure(String),
    #[error("no track found for `{0}`")]
    SearchEmpty(String),
    #[error("audio node request failed: {0:#}")]
    Node(#[from] anyhow::Error),
}

pub type MusicResult<T> = Result<T, MusicError>;
