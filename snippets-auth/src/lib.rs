// Types shared with the auth API
pub mod common;

mod client;
mod error;

pub use client::auth_client::AuthClientError;
pub use client::validators;
pub use client::{
    AuthStateBroadcaster, BrowserNavigator, FileTokenStore, MemoryTokenStore, Navigator,
    OutboundRequest, RequestInterceptor, ServerAuthClient, SessionManager, Settings, Subscription,
    TokenStore,
};
pub use common::{
    ChangePasswordData, GoogleRegisterData, LoginData, RegisterData, Registration, TokenPair, User,
};
pub use error::AuthError;
