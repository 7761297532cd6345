pub mod aggregate;
pub mod api;
pub mod auth;
pub mod charts;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mutations;
pub mod request_tracker;
pub mod resolver;
pub mod session;
pub mod settings;

pub use aggregate::{AggregateSync, AlbumView};
pub use api::models::{Album, RatingAggregate, Review};
pub use api::ApiClient;
pub use auth::{AuthFlow, AuthState, BrowserNavigator, Navigator};
pub use charts::{ChartEntry, ChartsAggregator};
pub use config::{ConfigProvider, RuntimeConfig};
pub use credentials::{
    Credential, CredentialChanges, CredentialEvent, CredentialStore, KeyValueStorage, MemoryStorage,
};
pub use error::ClientError;
pub use mutations::MutationGateway;
pub use request_tracker::LoadOutcome;
pub use resolver::{AlbumIdentity, AlbumResolver, Resolution};
pub use session::Session;
pub use settings::ClientSettings;
