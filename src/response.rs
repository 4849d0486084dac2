//! Terminal result classification for AT response lines.
//!
//! A response line either ends the outstanding command (`OK`, `ERROR`,
//! `+CME ERROR: <n>`, `+CMS ERROR: <n>`) or it does not, in which case it is
//! an information line or an unsolicited notification and stays on the
//! notification path.

use crate::error::ProtocolError;

const CME_ERROR_PREFIX: &str = "+CME ERROR:";
const CMS_ERROR_PREFIX: &str = "+CMS ERROR:";

/// Classification of a terminal AT result line.
///
/// The integer codes follow the original serial-modem host ordering, so they
/// can be reported over FFI-style integer surfaces unchanged.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtResponse {
    Ok,
    Error,
    CmsError(u16),
    CmeError(u16),
}

impl AtResponse {
    /// Integer result code: 0 = OK, 1 = ERROR, 2 = CMS, 3 = CME.
    pub fn code(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::CmsError(_) => 2,
            Self::CmeError(_) => 3,
        }
    }

    /// Collapse the classification into pass/fail for callers that do not
    /// inspect the error class themselves.
    pub fn check(self) -> Result<(), ProtocolError> {
        match self {
            Self::Ok => Ok(()),
            Self::Error => Err(ProtocolError::Error),
            Self::CmsError(code) => Err(ProtocolError::Cms(code)),
            Self::CmeError(code) => Err(ProtocolError::Cme(code)),
        }
    }
}

/// Classify a complete response line.
///
/// Returns `None` for every non-terminal line. Classification itself cannot
/// fail: a line that merely resembles a terminal token (e.g. a `+CME ERROR:`
/// with a non-numeric code) is treated as non-terminal.
pub fn classify(line: &str) -> Option<AtResponse> {
    let line = line.trim_ascii_end();

    if line == "OK" {
        return Some(AtResponse::Ok);
    }
    if line == "ERROR" {
        return Some(AtResponse::Error);
    }
    if let Some(code) = error_code(line, CME_ERROR_PREFIX) {
        return Some(AtResponse::CmeError(code));
    }
    if let Some(code) = error_code(line, CMS_ERROR_PREFIX) {
        return Some(AtResponse::CmsError(code));
    }
    None
}

fn error_code(line: &str, prefix: &str) -> Option<u16> {
    line.strip_prefix(prefix)?.trim_ascii().parse().ok()
}
