//! Authenticated-session state.
//!
//! ```text
//! session/
//! ├── store   - SessionStore state machine and the AuthApi seam
//! └── storage - persistence backends and the on-disk envelope
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!             login()                    ok
//! Anonymous ──────────▶ Authenticating ──────▶ Authenticated
//!     ▲                      │ err                  │
//!     └──────────────────────┘                      │ logout() / failed refresh
//!     ▲                                             │
//!     └─────────────────────────────────────────────┘
//! ```

mod storage;
mod store;

pub use storage::{decode_session, encode_session, FileStorage, MemoryStorage, SessionStorage};
pub use store::{AuthApi, SessionStore};
