//! Authenticated Subdomain Proxy (spec §4.7, C7).

mod error;
mod inject;
pub mod hostname;
pub mod pool;
pub mod server;
pub mod token;

pub use error::{ProxyError, ProxyResult};
pub use hostname::ProxyHostname;
pub use server::{build_router, ProxyState};
pub use token::TokenCodec;
