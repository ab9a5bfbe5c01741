pub mod backend;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod fuzzy;
pub mod intent;
pub mod memory;
pub mod message;
pub mod normalize;
pub mod phrases;
pub mod policy;
pub mod resource;
pub mod routes;
pub mod session;
pub mod slots;

pub use backend::{ArrearsCampaign, SchoolBackend};
pub use error::{AssistantError, BackendError};
pub use intent::{Intent, classify};
pub use message::{Chip, Message, Navigation, Reply, Speaker, TurnStatus};
pub use policy::{Identity, Role};
pub use session::{DialogSession, SessionHandle};
