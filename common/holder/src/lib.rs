pub mod client;
pub mod config;
pub mod error;
pub mod holder;
pub mod registry;
pub mod store;
pub mod transport;
pub mod ws;

pub use client::AuthClient;
pub use config::{HolderConfig, DEFAULT_STORAGE_KEY};
pub use error::{HolderError, HolderResult};
pub use holder::{AuthSnapshot, Current, SetTokenOutcome, TokenHolder};
pub use registry::{Subscriber, SubscriberHandle, SubscriberRegistry, Subscription};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{ResponseCarrier, TransportAdapter};
pub use ws::ParamsSource;

pub use bearer_issuer::{ClaimSet, HeaderConvention};
