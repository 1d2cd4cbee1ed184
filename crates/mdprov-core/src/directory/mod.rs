//! Source directory: advertised services, id/name indices and filtering

pub mod filters;
pub mod service;
pub mod store;

pub use filters::{encode_directory_msg, FilteredDirectory};
pub use service::{
    FilterAction, FilterEntry, MapAction, Service, ServiceGroupState, ServiceInfo, ServiceLink,
    ServiceLoad, ServiceState, ServiceUpdate,
};
pub use store::{DirectoryChange, ServiceDirectoryStore};
