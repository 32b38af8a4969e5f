//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use beehive_core::{BeehiveConfig, Error, Result};
use beehive_deploy::{DeployPipeline, DeployTracker};
use beehive_ritual::{HttpRitualClient, RitualInvoker, RitualLedger};
use beehive_runtime::{
    BroadcastFanout, ChangedFilesSource, ChatWebhookChannel, DeliveryChannel, DeliveryDedup,
    GitHubFilesSource, Orchestrator, SnippetChannel,
};
use beehive_store::{BlobStore, MutationLog};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: BeehiveConfig,
    pub log: Arc<MutationLog>,
    pub ledger: Arc<RitualLedger>,
    pub orchestrator: Orchestrator,
    pub fanout: Arc<BroadcastFanout>,
    pub tracker: Arc<DeployTracker>,
    pub deploy: DeployPipeline,
}

/// Outbound collaborators. Swapped for fakes in tests.
pub struct Collaborators {
    pub rituals: Arc<dyn RitualInvoker>,
    pub files: Arc<dyn ChangedFilesSource>,
    pub channels: Vec<Arc<dyn DeliveryChannel>>,
    pub client: Client,
}

impl AppState {
    /// Wire the HTTP-backed collaborators from configuration.
    pub fn new(config: BeehiveConfig, store: Arc<dyn BlobStore>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client init failed: {}", e)))?;

        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(ChatWebhookChannel::new(client.clone(), config.chat_webhook_url.clone())),
            Arc::new(SnippetChannel::new(
                client.clone(),
                config.gist_api_url.clone(),
                config.github_token.clone(),
            )),
        ];

        let collaborators = Collaborators {
            rituals: Arc::new(HttpRitualClient::new(&config)?),
            files: Arc::new(GitHubFilesSource::new(client.clone())),
            channels,
            client,
        };
        Ok(Self::with_collaborators(config, store, collaborators))
    }

    pub fn with_collaborators(
        config: BeehiveConfig,
        store: Arc<dyn BlobStore>,
        collaborators: Collaborators,
    ) -> Self {
        let log = Arc::new(MutationLog::new(store.clone(), config.mutation_history_max));
        let ledger = Arc::new(RitualLedger::new());
        let dedup = Arc::new(DeliveryDedup::new(Duration::from_secs(config.dedup_ttl_secs)));

        let fanout = Arc::new(BroadcastFanout::new(collaborators.channels, log.clone()));
        let orchestrator = Orchestrator::new(
            collaborators.rituals,
            collaborators.files,
            log.clone(),
            ledger.clone(),
            dedup,
            config.github_token.clone(),
        )
        .with_broadcast(fanout.clone());

        let tracker = Arc::new(DeployTracker::new(
            store,
            config.deploy_history_max,
            config.deploy_history_max_days,
        ));
        let deploy = DeployPipeline::new(
            tracker.clone(),
            collaborators.client,
            config.build_hook_urls.clone(),
        );

        Self {
            config,
            log,
            ledger,
            orchestrator,
            fanout,
            tracker,
            deploy,
        }
    }

    /// Configured capability credential, if any.
    pub fn capability_key(&self) -> Option<&str> {
        self.config.capability_key.as_deref()
    }
}
