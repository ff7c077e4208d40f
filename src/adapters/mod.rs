// Adapters layer: concrete implementations for external systems (http, storage, credential cache).

pub mod credentials;
pub mod http;
pub mod storage;
