pub mod extractor;
pub mod identity;
pub mod jwt;
pub mod password;

pub use extractor::CallMetadata;
pub use identity::Identity;
pub use password::{Argon2Hasher, CredentialHasher};
