pub mod api;
pub mod auth;
pub mod error;
pub mod masking;
pub mod models;
pub mod utils;

pub use api::client::ApiClient;
pub use api::endpoints::{ApplicationsApi, AuthApi, PropertiesApi};
pub use auth::refresh::RefreshCoordinator;
pub use auth::session::{
    FileSessionStorage, MemorySessionStorage, Session, SessionStorage, SessionStore, User,
};
pub use error::{ApiError, Result};
pub use estate_core::Config;
pub use masking::mask_secret;
pub use models::*;
