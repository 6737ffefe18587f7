pub mod directory;
pub mod identity;
pub mod validate;

pub use directory::DirectoryService;
pub use identity::IdentityService;
