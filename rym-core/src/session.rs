use std::sync::Arc;

use crate::aggregate::AggregateSync;
use crate::api::{ApiClient, ReqwestTransport, Transport, TransportError};
use crate::auth::{AuthFlow, Navigator};
use crate::charts::ChartsAggregator;
use crate::config::ConfigProvider;
use crate::credentials::{CredentialStore, KeyValueStorage, KeyringStorage};
use crate::mutations::MutationGateway;
use crate::resolver::AlbumResolver;
use crate::settings::ClientSettings;

/// Every component wired over one transport, one config provider and one
/// storage.
pub struct Session {
    pub api: ApiClient,
    pub storage: Arc<dyn KeyValueStorage>,
    pub credentials: Arc<CredentialStore>,
    pub auth: AuthFlow,
    pub resolver: AlbumResolver,
    pub albums: AggregateSync,
    pub mutations: MutationGateway,
    pub charts: ChartsAggregator,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ConfigProvider>,
        storage: Arc<dyn KeyValueStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let api = ApiClient::new(transport, config);
        let credentials = Arc::new(CredentialStore::new(storage.clone()));
        Self {
            auth: AuthFlow::new(api.clone(), credentials.clone(), navigator),
            resolver: AlbumResolver::new(api.clone()),
            albums: AggregateSync::new(api.clone(), credentials.clone()),
            mutations: MutationGateway::new(api.clone(), credentials.clone()),
            charts: ChartsAggregator::new(api.clone(), storage.clone()),
            api,
            storage,
            credentials,
        }
    }

    /// Production wiring: reqwest transport and keyring storage.
    pub fn from_settings(
        settings: &ClientSettings,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(settings.http_timeout)?);
        let config = Arc::new(ConfigProvider::new(
            transport.clone(),
            settings.config_url.clone(),
        ));
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(KeyringStorage::new(settings.keyring_service.clone()));
        Ok(Self::new(transport, config, storage, navigator))
    }
}
