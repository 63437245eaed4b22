use snafu::{Backtrace, Snafu};

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// Error types
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("malformed packet: {message}"))]
    MalformedPacket { message: String },
    #[snafu(display("invalid armor wrappers"))]
    InvalidArmorWrappers,
    #[snafu(display("checksum mismatch: {message}"))]
    ChecksumMismatch { message: String },
    #[snafu(display("authentication tag mismatch"))]
    AuthenticationFailed,
    #[snafu(display("Modification Detection Code error"))]
    MdcError,
    #[snafu(display("previous sub-stream was not read to the end"))]
    Reentrancy,
    #[snafu(transparent)]
    Base64Decode { source: base64::DecodeError },
    #[snafu(transparent)]
    IO {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(transparent)]
    RSAError { source: rsa::errors::Error },
    #[snafu(transparent)]
    SignatureError { source: signature::Error },
    #[snafu(display("missing key"))]
    MissingKey,
    #[snafu(display("missing signature"))]
    MissingSignature,
    #[snafu(display("invalid key length"))]
    InvalidKeyLength,
    /// Public key material the verifier could not use.
    #[snafu(display("invalid public key: {message}"))]
    InvalidKey { message: String },
    #[snafu(display("Not yet implemented: {message}"))]
    Unimplemented { message: String },
    /// Signals packet versions and parameters we don't support.
    #[snafu(display("Unsupported: {message}"))]
    Unsupported { message: String },
    #[snafu(display("{message}"))]
    Message { message: String },
    #[snafu(transparent)]
    Utf8Error { source: std::str::Utf8Error },
    #[snafu(transparent)]
    TryFromInt { source: std::num::TryFromIntError },
    #[snafu(transparent)]
    TryFromSlice { source: std::array::TryFromSliceError },
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::InvalidKeyLength
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Message { message: err }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::IO { source, .. } => source,
            other => std::io::Error::other(other),
        }
    }
}

impl Error {
    pub(crate) fn invalid_key(err: impl std::fmt::Display) -> Self {
        Error::InvalidKey {
            message: err.to_string(),
        }
    }

    /// Unwraps an [`Error`] that was tunneled through an [`std::io::Error`].
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|e| e.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(err) = inner.downcast::<Error>() {
                    return *err;
                }
            }
            return Error::Message {
                message: "lost tunneled error".to_string(),
            };
        }
        err.into()
    }

    /// Recovers an [`Error`] that surfaced as [`Error::IO`] after passing
    /// through a reader.
    pub(crate) fn untunnel(self) -> Self {
        match self {
            Error::IO { source, .. } => Error::from_io(source),
            other => other,
        }
    }
}

macro_rules! malformed_err {
    ($e:expr) => {
        return Err($crate::errors::Error::MalformedPacket { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::MalformedPacket { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! unimplemented_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unimplemented { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unimplemented { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unsupported { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unsupported { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            $crate::errors::bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            $crate::errors::bail!($fmt, $($arg)+);
        }
    };
}

macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::errors::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::errors::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`: {}"#, left_val, right_val,
                           format_args!($($arg)+))
                }
            }
        }
    });
}

pub(crate) use bail;
pub(crate) use ensure;
pub(crate) use ensure_eq;
pub(crate) use format_err;
pub(crate) use malformed_err;
pub(crate) use unimplemented_err;
pub(crate) use unsupported_err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_tunnel_roundtrip() {
        let err = Error::AuthenticationFailed;
        let io: std::io::Error = err.into();
        assert!(matches!(Error::from_io(io), Error::AuthenticationFailed));

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        match Error::from_io(io) {
            Error::IO { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
