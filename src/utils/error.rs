//! Customized unified error type.

use std::error;
use std::fmt;
use std::io;
use std::num;
use std::string;

/// Customized error type for gnscore.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GnsError(pub String);

impl GnsError {
    pub fn msg(msg: impl ToString) -> Self {
        GnsError(msg.to_string())
    }
}

impl fmt::Display for GnsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for GnsError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `GnsError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for GnsError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                GnsError(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(string::FromUtf8Error);
impl_from_error!(num::ParseIntError);
impl_from_error!(num::ParseFloatError);
impl_from_error!(serde_json::Error);
impl_from_error!(toml::ser::Error);
impl_from_error!(toml::de::Error);
