use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// An "Any"-typed error.
pub trait OrtegeCustomError: StdError + Send + Sync + Any {}

impl<E: StdError + Send + Sync + Any> OrtegeCustomError for E {}

/// Thin wrapper around a boxed OrtegeCustomError so foreign errors can be
/// carried inside `ChainCommunicationError` without a `From` impl.
#[repr(transparent)]
pub struct OrtegeCustomErrorWrapper(Box<dyn OrtegeCustomError>);

impl Debug for OrtegeCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", AsRef::<dyn OrtegeCustomError>::as_ref(&self))
    }
}

impl Display for OrtegeCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AsRef::<dyn OrtegeCustomError>::as_ref(&self))
    }
}

impl StdError for OrtegeCustomErrorWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl AsRef<dyn OrtegeCustomError> for OrtegeCustomErrorWrapper {
    fn as_ref(&self) -> &dyn OrtegeCustomError {
        self.0.as_ref()
    }
}

impl Deref for OrtegeCustomErrorWrapper {
    type Target = Box<dyn OrtegeCustomError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
#[repr(transparent)]
struct StringError(String);

impl Display for StringError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for StringError {}

/// ChainCommunicationError contains errors returned when attempting to
/// call a chain or dispatch a transaction
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// Protocol level error
    #[error(transparent)]
    ProtocolError(#[from] OrtegeProtocolError),
    /// The node or the contract refused the call. Retrying will not help.
    #[error(transparent)]
    ContractError(OrtegeCustomErrorWrapper),
    /// The RPC endpoint could not be reached or answered with garbage
    #[error(transparent)]
    Transport(OrtegeCustomErrorWrapper),
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(OrtegeCustomErrorWrapper),
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E: OrtegeCustomError>(err: E) -> Self {
        Self::Other(OrtegeCustomErrorWrapper(Box::new(err)))
    }

    /// Creates a chain communication error of the other error variant from a string
    pub fn from_other_str(err: impl Into<String>) -> Self {
        Self::from_other(StringError(err.into()))
    }

    /// Creates a chain communication error of the transport variant from any
    /// other existing error
    pub fn from_transport_error<E: OrtegeCustomError>(err: E) -> Self {
        Self::Transport(OrtegeCustomErrorWrapper(Box::new(err)))
    }

    /// Creates a chain communication error of the contract error variant from any other existing
    /// error
    pub fn from_contract_error<E: OrtegeCustomError>(err: E) -> Self {
        Self::ContractError(OrtegeCustomErrorWrapper(Box::new(err)))
    }

    /// Creates a chain communication error of the contract error variant from a string
    pub fn from_contract_error_str(err: impl Into<String>) -> Self {
        Self::from_contract_error(StringError(err.into()))
    }

    /// Whether the same call may succeed if it is attempted again later.
    /// Contract rejections and protocol errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Other(_) => true,
            Self::ProtocolError(_) | Self::ContractError(_) => false,
        }
    }
}

/// Error types for the Ortege protocol
#[derive(Debug, thiserror::Error)]
pub enum OrtegeProtocolError {
    /// A bridged message could not be decoded
    #[error("Malformed bridged message: {0}")]
    MalformedMessage(String),
}
