pub mod grants;

pub use grants::{GrantStore, PgGrantStore};
