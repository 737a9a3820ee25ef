use std::sync::atomic::{AtomicU8, Ordering};

/// Coarse failure categories the scheduler and response pipeline can report.
///
/// Ranks mirror the process exit codes in §7/§6 of the design: lower numeric
/// rank is more severe and, once recorded, is never overwritten by a later,
/// less severe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    FatalStartup,
    ParseInit,
    Io,
    Tls,
    Network,
    Auth,
    Protocol,
    Remote,
    Quota,
    Signal,
}

impl ErrorKind {
    fn rank(self) -> u8 {
        match self {
            ErrorKind::FatalStartup => 1,
            ErrorKind::ParseInit => 2,
            ErrorKind::Tls => 5,
            ErrorKind::Io => 3,
            ErrorKind::Network => 4,
            ErrorKind::Auth => 6,
            ErrorKind::Protocol => 7,
            ErrorKind::Remote => 8,
            ErrorKind::Quota => 9,
            ErrorKind::Signal => 10,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to start up: {0}")]
    Startup(String),

    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    #[error("fetch failed with status {0}")]
    FetchFailed(reqwest::StatusCode),

    #[error("invalid redirect")]
    InvalidRedirect,

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("robots.txt disallows this path")]
    RobotsDisallowed,

    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Startup(_) => ErrorKind::FatalStartup,
            Error::Config(_) | Error::UrlParse(_) => ErrorKind::ParseInit,
            Error::Io(_) => ErrorKind::Io,
            Error::Reqwest(e) if e.is_connect() || e.is_timeout() => ErrorKind::Network,
            Error::Reqwest(_) => ErrorKind::Protocol,
            Error::FetchFailed(status) if status.as_u16() == 401 || status.as_u16() == 407 => {
                ErrorKind::Auth
            }
            Error::FetchFailed(_) | Error::InvalidContentType(_) | Error::InvalidRedirect => {
                ErrorKind::Protocol
            }
            Error::TooManyRedirects(_) => ErrorKind::Protocol,
            Error::RobotsDisallowed => ErrorKind::Protocol,
            Error::ChecksumMismatch(_) => ErrorKind::Remote,
            Error::QuotaExceeded => ErrorKind::Quota,
            Error::Other(_) => ErrorKind::Protocol,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Process-wide, monotonically-worsening exit status.
///
/// `record` only ever moves the stored rank towards "more severe"; a
/// well-behaved worker that sees a transient, already-handled error still
/// calls `record` unconditionally and lets the cell decide whether it
/// matters.
#[derive(Debug)]
pub struct ExitStatus {
    worst_rank: AtomicU8,
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self {
            worst_rank: AtomicU8::new(0),
        }
    }
}

impl ExitStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: ErrorKind) {
        let candidate = kind.rank();
        let mut current = self.worst_rank.load(Ordering::Relaxed);
        loop {
            if current != 0 && current <= candidate {
                return;
            }
            match self.worst_rank.compare_exchange_weak(
                current,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Maps the worst recorded `ErrorKind` back to a process exit code.
    pub fn code(&self) -> i32 {
        match self.worst_rank.load(Ordering::Relaxed) {
            0 => 0,
            1 => 1,
            2 => 2,
            3 => 3,
            4 => 4,
            5 => 5,
            6 => 6,
            7 | 8 => 8,
            9 => 0, // quota exceeded is a clean stop, not an error
            _ => 1,
        }
    }
}
