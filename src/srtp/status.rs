use std::fmt;

use thiserror::Error;

/// Kinds of SRTP failures.
///
/// The numeric codes are the ones libsrtp uses for its `srtp_err_status_t`,
/// which is what other SRTP stacks tend to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SrtpStatus {
    /// Nothing to report.
    Ok,
    /// Unspecified failure.
    Fail,
    /// Unsupported parameter, or a packet too short to be valid.
    BadParam,
    /// Couldn't allocate memory.
    AllocFail,
    /// Couldn't deallocate properly.
    DeallocFail,
    /// Couldn't initialize, the self test failed.
    InitFail,
    /// Can't process as much data as requested.
    Terminus,
    /// Authentication failure.
    AuthFail,
    /// Cipher failure.
    CipherFail,
    /// Replay check failed (bad index).
    ReplayFail,
    /// Replay check failed (index too old).
    ReplayOld,
    /// Algorithm failed test routine.
    AlgoFail,
    /// Unsupported operation.
    NoSuchOp,
    /// No appropriate context found.
    NoCtx,
    /// Unable to perform desired validation.
    CantCheck,
    /// Can't use key any more.
    KeyExpired,
    /// Error in use of socket.
    SocketErr,
    /// Error in use POSIX signals.
    SignalErr,
    /// Nonce check failed.
    NonceBad,
    /// Couldn't read data.
    ReadFail,
    /// Couldn't write data.
    WriteFail,
    /// Error parsing data.
    ParseErr,
    /// Error encoding data.
    EncodeErr,
    /// Error while using semaphores.
    SemaphoreErr,
    /// Error while using pfkey.
    PfkeyErr,
    /// A code outside the known table.
    Unknown(i32),
}

const TABLE: &[(SrtpStatus, &str)] = &[
    (SrtpStatus::Ok, "ok"),
    (SrtpStatus::Fail, "fail"),
    (SrtpStatus::BadParam, "bad_param"),
    (SrtpStatus::AllocFail, "alloc_fail"),
    (SrtpStatus::DeallocFail, "dealloc_fail"),
    (SrtpStatus::InitFail, "init_fail"),
    (SrtpStatus::Terminus, "terminus"),
    (SrtpStatus::AuthFail, "auth_fail"),
    (SrtpStatus::CipherFail, "cipher_fail"),
    (SrtpStatus::ReplayFail, "replay_fail"),
    (SrtpStatus::ReplayOld, "replay_old"),
    (SrtpStatus::AlgoFail, "algo_fail"),
    (SrtpStatus::NoSuchOp, "no_such_op"),
    (SrtpStatus::NoCtx, "no_ctx"),
    (SrtpStatus::CantCheck, "cant_check"),
    (SrtpStatus::KeyExpired, "key_expired"),
    (SrtpStatus::SocketErr, "socket_err"),
    (SrtpStatus::SignalErr, "signal_err"),
    (SrtpStatus::NonceBad, "nonce_bad"),
    (SrtpStatus::ReadFail, "read_fail"),
    (SrtpStatus::WriteFail, "write_fail"),
    (SrtpStatus::ParseErr, "parse_err"),
    (SrtpStatus::EncodeErr, "encode_err"),
    (SrtpStatus::SemaphoreErr, "semaphore_err"),
    (SrtpStatus::PfkeyErr, "pfkey_err"),
];

impl SrtpStatus {
    /// Map a numeric status code.
    pub fn from_code(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|i| TABLE.get(i))
            .map(|(s, _)| *s)
            .unwrap_or(SrtpStatus::Unknown(code))
    }

    /// The numeric status code.
    pub fn code(&self) -> i32 {
        if let SrtpStatus::Unknown(c) = self {
            return *c;
        }
        TABLE
            .iter()
            .position(|(s, _)| s == self)
            .map(|i| i as i32)
            .unwrap_or(-1)
    }

    /// Whether this is [`SrtpStatus::Ok`].
    pub fn is_ok(&self) -> bool {
        *self == SrtpStatus::Ok
    }

    fn name(&self) -> &'static str {
        TABLE
            .iter()
            .find(|(s, _)| s == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for SrtpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrtpStatus::Unknown(c) => write!(f, "unknown ({})", c),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// An SRTP protect or unprotect that did not succeed.
///
/// No output is ever produced alongside one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("SRTP failure: {kind}")]
pub struct CryptoFailure {
    /// What went wrong.
    pub kind: SrtpStatus,
}

impl From<SrtpStatus> for CryptoFailure {
    fn from(kind: SrtpStatus) -> Self {
        CryptoFailure { kind }
    }
}

impl From<openssl::error::ErrorStack> for CryptoFailure {
    fn from(e: openssl::error::ErrorStack) -> Self {
        debug!("OpenSSL cipher error: {:?}", e);
        SrtpStatus::CipherFail.into()
    }
}
