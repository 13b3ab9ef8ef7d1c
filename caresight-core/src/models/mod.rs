pub mod grant;
pub mod id;
pub mod requester;

pub use grant::AccessGrant;
pub use id::{
    generate_id, CameraId, EventId, NotificationId, RoomId, SnapshotId, UserId,
};
pub use requester::{ActorRole, Requester};
