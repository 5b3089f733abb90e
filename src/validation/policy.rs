use crate::error::DbError;

/// Phase at which arguments are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Execute,
    /// After a native failure, to produce a complete diagnosis.
    Failure,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Prepare => "prepare",
            Phase::Execute => "execute",
            Phase::Failure => "failure",
        })
    }
}

/// Which checks run in a given phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseChecks {
    /// Declared tag versus runtime type, including string conversion.
    pub types: bool,
    /// Only the string-conversion capability of `string` arguments.
    pub stringable: bool,
}

impl PhaseChecks {
    #[must_use]
    pub fn any(self) -> bool {
        self.types || self.stringable
    }
}

/// When arguments are validated.
///
/// The default validates when binding and again after a native failure,
/// keeping the happy path cheap while errors carry a full report.
///
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// let policy = ValidationPolicy::from_bits(ValidationPolicy::EXECUTE_STRINGABLE).unwrap();
/// assert!(policy.execute_stringable);
/// assert!(!policy.prepare);
/// assert_eq!(ValidationPolicy::default().bits(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub prepare: bool,
    pub execute: bool,
    pub failure: bool,
    pub execute_stringable: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            prepare: true,
            execute: false,
            failure: true,
            execute_stringable: false,
        }
    }
}

impl ValidationPolicy {
    pub const PREPARE: u8 = 1;
    pub const EXECUTE: u8 = 2;
    pub const FAILURE: u8 = 4;
    pub const EXECUTE_STRINGABLE: u8 = 8;
    pub const ALWAYS: u8 = 15;

    #[must_use]
    pub fn always() -> Self {
        Self {
            prepare: true,
            execute: true,
            failure: true,
            execute_stringable: true,
        }
    }

    /// No optional validation. Arguments that cannot be converted at all
    /// are still refused before reaching the driver.
    #[must_use]
    pub fn never() -> Self {
        Self {
            prepare: false,
            execute: false,
            failure: false,
            execute_stringable: false,
        }
    }

    /// Build from the `validate_params` bitmask.
    ///
    /// # Errors
    /// `InvalidArgument` when unknown bits are set.
    pub fn from_bits(bits: u8) -> Result<Self, DbError> {
        if bits & !Self::ALWAYS != 0 {
            return Err(DbError::invalid_argument(format!(
                "validate_params bitmask {bits} has unknown bits"
            )));
        }
        Ok(Self {
            prepare: bits & Self::PREPARE != 0,
            execute: bits & Self::EXECUTE != 0,
            failure: bits & Self::FAILURE != 0,
            execute_stringable: bits & Self::EXECUTE_STRINGABLE != 0,
        })
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        let mut bits = 0;
        if self.prepare {
            bits |= Self::PREPARE;
        }
        if self.execute {
            bits |= Self::EXECUTE;
        }
        if self.failure {
            bits |= Self::FAILURE;
        }
        if self.execute_stringable {
            bits |= Self::EXECUTE_STRINGABLE;
        }
        bits
    }

    #[must_use]
    pub fn checks(self, phase: Phase) -> PhaseChecks {
        match phase {
            Phase::Prepare => PhaseChecks {
                types: self.prepare,
                stringable: self.prepare,
            },
            Phase::Execute => PhaseChecks {
                types: self.execute,
                stringable: self.execute || self.execute_stringable,
            },
            Phase::Failure => PhaseChecks {
                types: self.failure,
                stringable: self.failure,
            },
        }
    }
}
