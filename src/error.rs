/// Error raised by a terminal AT result line other than `OK`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Plain `ERROR` final result.
    Error,
    /// `+CME ERROR: <code>` final result.
    Cme(u16),
    /// `+CMS ERROR: <code>` final result.
    Cms(u16),
}

#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed call, e.g. an empty command string.
    InvalidArgument,
    /// Operation invoked before the owning component was initialized.
    Uninitialized,
    /// The command channel already holds an outstanding command.
    Busy,
    /// No terminal result line arrived within the caller's timeout.
    Timeout,
    /// The underlying transport write failed.
    Transport,
    /// The wake handshake preceding a power-managed command failed.
    WakeHandshake,
    /// A fixed-capacity registry or queue is full.
    Overflow,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Self::Uninitialized => defmt::write!(f, "Uninitialized"),
            Self::Busy => defmt::write!(f, "Busy"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::Transport => defmt::write!(f, "Transport"),
            Self::WakeHandshake => defmt::write!(f, "WakeHandshake"),
            Self::Overflow => defmt::write!(f, "Overflow"),
            _ => defmt::write!(f, "non_exhaustive"),
        }
    }
}
