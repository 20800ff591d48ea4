pub mod emitter;
pub mod error;
pub mod http;
pub mod signer;
pub mod telemetry;

pub use emitter::InvalidationEmitter;
pub use error::InfraError;
pub use signer::{AuthError, Claims, TokenSigner, SERVER_IDENTITY};
