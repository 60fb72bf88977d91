use std::error;
use std::fmt;

/// Error returned by the checked map operations when the key argument is
/// absent. An absent key is a caller mistake, not a lookup miss, so it is
/// reported as an error and the map is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NilKeyError;

impl fmt::Display for NilKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nil key passed to map operation")
    }
}

impl error::Error for NilKeyError {}
