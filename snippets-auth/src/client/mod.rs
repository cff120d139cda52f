pub mod auth_client;
mod broadcaster;
mod config;
mod interceptor;
mod session;
mod token_storage;
pub mod validators;

pub use auth_client::ServerAuthClient;
pub use broadcaster::{AuthStateBroadcaster, Subscription};
pub use config::Settings;
pub use interceptor::{BrowserNavigator, Navigator, OutboundRequest, RequestInterceptor};
pub use session::SessionManager;
pub use token_storage::{FileTokenStore, MemoryTokenStore, TokenStore};
