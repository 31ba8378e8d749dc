//! Sample and identity definitions
//!
//! The engine never looks inside the objects it profiles. The host hands it
//! stable identity tokens for functions and instruction addresses, and the
//! engine only compares them for equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Stable identity of a function object in the host engine.
///
/// Two `FuncId`s are the same function iff their raw values are equal; no
/// structural comparison ever happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncId(NonZeroU64);

impl FuncId {
    /// Build an identity from a raw token; 0 is reserved for "none".
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

/// Opaque instruction address inside a function's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pc(NonZeroU64);

impl Pc {
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

/// What was executing at one timer tick.
///
/// - `func` and `pc` set: interpreting `func` at `pc`
/// - `func` set, `pc` null: running natively inside `func` (e.g. a primitive)
/// - both null: no identifiable frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Sample {
    pub func: Option<FuncId>,
    pub pc: Option<Pc>,
}

impl Sample {
    pub const fn at(func: FuncId, pc: Option<Pc>) -> Self {
        Self {
            func: Some(func),
            pc,
        }
    }

    pub const fn native(func: FuncId) -> Self {
        Self {
            func: Some(func),
            pc: None,
        }
    }

    pub const fn unknown() -> Self {
        Self {
            func: None,
            pc: None,
        }
    }

    pub const fn is_unknown(&self) -> bool {
        self.func.is_none()
    }
}

/// Profiler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProfilerState {
    #[default]
    Inactive,
    Running,
    Paused,
}

impl fmt::Display for ProfilerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfilerState::Inactive => "inactive",
            ProfilerState::Running => "running",
            ProfilerState::Paused => "paused",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_not_an_identity() {
        assert!(FuncId::from_raw(0).is_none());
        assert!(Pc::from_raw(0).is_none());
        assert_eq!(FuncId::from_raw(0x40).unwrap().get(), 0x40);
    }

    #[test]
    fn test_sample_constructors() {
        let f = FuncId::from_raw(7).unwrap();
        let pc = Pc::from_raw(0x1000);

        assert_eq!(Sample::at(f, pc).pc, pc);
        assert_eq!(Sample::native(f).pc, None);
        assert_eq!(Sample::native(f).func, Some(f));
        assert!(Sample::unknown().is_unknown());
        assert_eq!(Sample::default(), Sample::unknown());
    }

    #[test]
    fn test_func_id_serializes_as_number() {
        let f = FuncId::from_raw(42).unwrap();
        assert_eq!(serde_json::to_string(&f).unwrap(), "42");
        let back: FuncId = serde_json::from_str("42").unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ProfilerState::default(), ProfilerState::Inactive);
        assert_eq!(ProfilerState::Paused.to_string(), "paused");
    }
}
