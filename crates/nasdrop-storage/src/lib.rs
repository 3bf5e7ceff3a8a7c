//! nasdrop remote storage
//!
//! The relay copies staged uploads to the NAS through the [`RemoteStorage`]
//! trait, and the web ingress reads stored files back through it. Two backends
//! exist: WebDAV over HTTP and a NAS share mounted into the local filesystem.
//!
//! # Remote path format
//!
//! Remote paths are absolute, `/`-separated and never contain `..`:
//! `{target_folder}/{job_id}_{display_name}`. Path generation lives in the `keys`
//! module so both backends agree.

pub mod factory;
pub mod keys;
pub mod local;
pub mod traits;
pub mod webdav;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::remote_path_for;
pub use local::LocalStorage;
pub use nasdrop_core::RemoteBackend;
pub use traits::{ByteStream, RemoteStorage, StorageError, StorageResult};
pub use webdav::WebDavStorage;
