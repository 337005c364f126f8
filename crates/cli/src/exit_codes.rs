//! CLI Exit Code Registry
//!
//! Single source of truth for `stlink` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 1    | General error (unspecified)                         |
//! | 2    | Usage error (bad args, unreadable file)             |
//! | 3    | Config file invalid (parse or validation)           |
//! | 4    | Input data invalid (missing column, bad CSV)        |
//! | 5    | No data for the requested locality                  |
//! | 10   | Arbiter disabled (`doctor` only)                    |
//! | 11   | Arbiter provider configured but API key missing     |
//! | 12   | Arbiter settings invalid or client failed to start  |

use streetlink_arbiter::ArbiterError;
use streetlink_linker::LinkError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, config or data file unreadable.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be parsed or failed validation.
pub const EXIT_CONFIG: u8 = 3;

/// Registry or map data unusable (missing column, undecodable CSV).
pub const EXIT_INPUT: u8 = 4;

/// No segments in scope for the requested locality.
pub const EXIT_NO_DATA: u8 = 5;

/// Arbitration disabled (provider=none). Informational.
pub const EXIT_ARBITER_DISABLED: u8 = 10;

/// Arbiter provider configured but no API key found.
pub const EXIT_ARBITER_MISSING_KEY: u8 = 11;

/// Arbiter settings unusable.
pub const EXIT_ARBITER_CONFIG: u8 = 12;

pub fn link_exit_code(err: &LinkError) -> u8 {
    match err {
        LinkError::ConfigParse(_) | LinkError::ConfigValidation(_) => EXIT_CONFIG,
        LinkError::InvalidRecord { .. }
        | LinkError::MissingColumn { .. }
        | LinkError::GeometryParse { .. }
        | LinkError::Io(_) => EXIT_INPUT,
        LinkError::NoData { .. } => EXIT_NO_DATA,
    }
}

pub fn arbiter_exit_code(err: &ArbiterError) -> u8 {
    match err {
        ArbiterError::MissingKey { .. } => EXIT_ARBITER_MISSING_KEY,
        ArbiterError::NotConfigured(_) => EXIT_ARBITER_CONFIG,
        _ => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_CONFIG,
            EXIT_INPUT,
            EXIT_NO_DATA,
            EXIT_ARBITER_DISABLED,
            EXIT_ARBITER_MISSING_KEY,
            EXIT_ARBITER_CONFIG,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn test_link_error_mapping() {
        assert_eq!(link_exit_code(&LinkError::ConfigParse("x".into())), EXIT_CONFIG);
        assert_eq!(
            link_exit_code(&LinkError::MissingColumn { source: "registry".into(), column: "name".into() }),
            EXIT_INPUT
        );
        assert_eq!(link_exit_code(&LinkError::NoData { locality: "חיפה".into() }), EXIT_NO_DATA);
    }

    #[test]
    fn test_arbiter_error_mapping() {
        let missing = ArbiterError::MissingKey { provider: "openai".into(), env_var: "X".into() };
        assert_eq!(arbiter_exit_code(&missing), EXIT_ARBITER_MISSING_KEY);
        assert_eq!(arbiter_exit_code(&ArbiterError::Network("down".into())), EXIT_ERROR);
    }
}
