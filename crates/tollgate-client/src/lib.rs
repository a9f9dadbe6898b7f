//! Tollgate Client - Session lifecycle for applications talking to a Tollgate server
//!
//! - [`AuthSessionMachine`]: sign-in, second-factor step-up, refresh scheduling,
//!   idle timeout, and sign-out
//! - [`TokenStore`]: current token and activity marker with durable backends
//! - [`AuthApi`]: the network seam, with a reqwest implementation
//! - [`EventBus`]: typed session events

pub mod api;
pub mod clock;
pub mod events;
pub mod machine;
pub mod store;

pub use api::{AuthApi, HttpAuthApi};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventBus, SessionEvent, SignOutReason, Subscription};
pub use machine::{AuthSessionMachine, AuthState, IDLE_TIMEOUT_MESSAGE, SESSION_EXPIRED_MESSAGE};
pub use store::{FileStorage, MemoryStorage, StorageError, StoredToken, TokenStorage, TokenStore};
