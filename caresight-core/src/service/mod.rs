pub mod gate;
pub mod grants;
pub mod shared_access;
pub mod target;

pub use gate::{AccessDecision, SharedAccessGate};
pub use grants::GrantService;
pub use shared_access::SharedAccessService;
pub use target::{TargetIdentityResolver, TargetSources};
