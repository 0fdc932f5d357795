use crate::failsafe::Trigger;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Search(#[from] ie::Error),

    /// The fail-safe tripped. Scripts must let this unwind to the top.
    #[error("fail-safe triggered: {0}")]
    Interrupt(Trigger),

    #[error("input injection failed: {0}")]
    Input(String),

    #[error("unknown key name: {0:?}")]
    UnknownKey(String),
}

impl Error {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Interrupt(_))
    }

    /// Classification of a wrapped search error, if this is one.
    pub fn search_kind(&self) -> Option<ie::ErrorKind> {
        match self {
            Error::Search(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl From<enigo::InputError> for Error {
    fn from(err: enigo::InputError) -> Self {
        Error::Input(err.to_string())
    }
}

impl From<enigo::NewConError> for Error {
    fn from(err: enigo::NewConError) -> Self {
        Error::Input(err.to_string())
    }
}
