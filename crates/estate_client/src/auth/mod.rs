//! Session state and token renewal.
//!
//! Login and register store a fresh session, the request pipeline renews the
//! access token through the [`refresh::RefreshCoordinator`] when it expires,
//! and logout clears everything locally whether or not the server answered.

pub mod refresh;
pub mod session;

pub use refresh::RefreshCoordinator;
pub use session::{FileSessionStorage, MemorySessionStorage, Session, SessionStorage, SessionStore, User};
