//! Durable pending-request storage

mod json_store;

pub use json_store::JsonFilePendingStore;
