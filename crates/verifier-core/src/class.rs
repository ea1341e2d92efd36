//! # Object Classes
//!
//! The verifier runs two identical pipelines, one per object class. The
//! class selects the directory subtree for pending/verifying/verified
//! content and for Config/Status records; it never changes behavior.

use serde::{Deserialize, Serialize};

/// One of the independent verification pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectClass {
    /// Application (guest) images.
    AppImg,
    /// Base operating system images.
    BaseOs,
}

impl ObjectClass {
    /// Every class, in startup order.
    pub const ALL: [ObjectClass; 2] = [ObjectClass::AppImg, ObjectClass::BaseOs];

    /// Directory name used for this class under every root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppImg => "appImg.obj",
            Self::BaseOs => "baseOs.obj",
        }
    }

    /// Parse a class from its directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
