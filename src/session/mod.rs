//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! session cookie ──▶ store.rs (lookup / create, expiry)
//!                       │
//!                       ▼
//!               Arc<SessionHandle> ──lock──▶ Session (state.rs)
//!                                              ├── roles (role.rs)
//!                                              ├── CookieBag / HeaderBag
//!                                              └── audit token, last access
//!
//! backend Set-Cookie ──▶ harvest.rs ──▶ control.rs (AL_CONTROL commands)
//!                                  └──▶ CookieBag (everything else)
//! ```
//!
//! # Design Decisions
//! - One async mutex per session serializes bag and role mutation
//! - The lock is held during authorization and harvesting, never while a
//!   backend response streams
//! - The control cookie never reaches the bag or the browser

pub mod control;
pub mod harvest;
pub mod role;
pub mod state;
pub mod store;

pub use control::{ControlCommand, ControlOutcome, CONTROL_COOKIE};
pub use harvest::{harvest_set_cookies, Harvest};
pub use role::Role;
pub use state::Session;
pub use store::{SessionHandle, SessionStore};
