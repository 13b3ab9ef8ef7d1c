// CareSight API Library
//
// HTTP surface for shared-access grant management and guarded
// monitoring-resource access.

pub mod http;

// Re-export commonly used types
pub use http::AppState;
