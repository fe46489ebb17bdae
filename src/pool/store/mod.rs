// src/pool/store/mod.rs

pub mod file;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use file::FileCredentialStore;
#[cfg(feature = "redis")]
pub use redis::RedisCredentialStore;
pub use traits::CredentialStore;
