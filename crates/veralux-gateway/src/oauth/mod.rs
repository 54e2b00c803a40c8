//! Google sign-in: authorization-code exchange and identity token verification

mod claims;
mod exchange;
mod handler;
mod verify;

pub use claims::{ExchangeResponse, IdentityClaims};
pub use exchange::{ClientCredentials, ExchangeRequest, ProviderError, TokenSet, exchange_code};
pub use handler::google_exchange_handler;
pub use verify::{IdTokenVerifier, VerifyError};
