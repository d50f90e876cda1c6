//! Compile directives

use precache_core::CallSignature;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction to compile one exact specialization ahead of time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Directive {
    pub signature: CallSignature,
}

impl Directive {
    pub fn new(signature: CallSignature) -> Self {
        Self { signature }
    }

    /// Line handed to the host toolchain
    pub fn render(&self) -> String {
        format!(
            "precompile({}, ({}))",
            self.signature.routine,
            self.signature.arg_types.join(", ")
        )
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<CallSignature> for Directive {
    fn from(signature: CallSignature) -> Self {
        Self::new(signature)
    }
}
