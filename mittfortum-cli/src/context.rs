//! Wiring shared by every command: config, HTTP, token store, clients,
//! statistics sink and persisted poll state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use mittfortum_api::{ApiClient, AuthClient, AuthorizedApi, Endpoints};
use mittfortum_core::{AvailabilityNotifier, IntegrationContext, Locale, PollState, SecretStore};
use mittfortum_fetch::{FetchContext, HttpClient};
use mittfortum_store::{
    Config, FileTokenStore, KeychainTokenStore, MemoryStatistics, SqliteStatistics, TokenStorage,
    default_data_dir, load_json_opt, save_json,
};
use mittfortum_sync::{BackfillSchedule, Poller, PollerSettings};
use tracing::{debug, info, warn};

use crate::Cli;

/// Logs availability changes; the CLI has no entity registry.
#[derive(Debug, Default)]
pub struct LogAvailability;

impl AvailabilityNotifier for LogAvailability {
    fn set_available(&self, entity_id: &str, available: bool, reason: Option<&str>) {
        if available {
            debug!(entity = entity_id, "Entity available");
        } else {
            warn!(entity = entity_id, reason = reason.unwrap_or(""), "Entity unavailable");
        }
    }

    fn reauth_required(&self, reason: &str) {
        warn!(reason, "Run `mittfortum login` to authorize again");
    }
}

/// Loads the config file and applies command-line overrides.
pub fn load_config(cli: &Cli) -> Result<(Config, PathBuf)> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_from(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if let Some(locale) = cli.locale {
        config.account.locale = locale;
    }
    Ok((config, path))
}

/// Everything a command needs, built from the config.
pub struct AppContext {
    pub config: Config,
    pub locale: Locale,
    pub auth: Arc<AuthClient>,
    pub api: AuthorizedApi,
    secrets: Arc<dyn SecretStore>,
    http: Arc<HttpClient>,
    endpoints: Endpoints,
}

impl AppContext {
    /// Builds clients for the effective configuration.
    pub fn new(cli: &Cli) -> Result<Self> {
        let (config, path) = load_config(cli)?;
        debug!(path = %path.display(), "Using configuration");
        let locale = config.account.locale;

        let fetch = FetchContext::with_settings(config.fetch_settings())
            .context("failed to build HTTP client")?;
        let endpoints = build_endpoints(&config, locale);

        let secrets: Arc<dyn SecretStore> = match config.auth.token_storage {
            TokenStorage::Keychain => Arc::new(
                KeychainTokenStore::new(fetch.keychain.clone())
                    .with_fallback(FileTokenStore::new(config.token_path())),
            ),
            TokenStorage::File => Arc::new(FileTokenStore::new(config.token_path())),
        };

        let auth = Arc::new(AuthClient::new(fetch.http.clone(), endpoints.clone(), secrets.clone()));
        let api = AuthorizedApi::new(
            auth.clone(),
            ApiClient::new(fetch.http.clone(), endpoints.clone()),
        );

        Ok(Self {
            config,
            locale,
            auth,
            api,
            secrets,
            http: fetch.http,
            endpoints,
        })
    }

    /// Opens the statistics database, or an in-memory sink for dry runs.
    pub fn statistics(&self, dry_run: bool) -> Result<Arc<dyn mittfortum_core::StatisticsSink>> {
        if dry_run {
            info!("Dry run, statistics are not persisted");
            return Ok(Arc::new(MemoryStatistics::new()));
        }
        let path = self.config.database_path();
        let store = SqliteStatistics::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// Opens the statistics database for reading.
    pub fn database(&self) -> Result<SqliteStatistics> {
        let path = self.config.database_path();
        SqliteStatistics::open(&path).with_context(|| format!("failed to open {}", path.display()))
    }

    /// Builds a poller whose retry state survives between runs.
    pub async fn poller(&self, dry_run: bool) -> Result<Poller> {
        let ctx = IntegrationContext::builder()
            .locale(self.locale)
            .secrets(self.secrets.clone())
            .statistics(self.statistics(dry_run)?)
            .availability(Arc::new(LogAvailability))
            .statistic_ids(self.config.statistic_ids())
            .build()?;

        let poll = &self.config.poll;
        let mut schedule = BackfillSchedule::new(self.locale.timezone())
            .with_retry_interval(
                chrono::Duration::from_std(poll.retry_interval())
                    .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            )
            .with_max_retries(poll.max_retries);
        if poll.respect_publication_time {
            schedule = schedule.with_publication_gate(poll.publication_hour);
        }

        let settings = PollerSettings {
            schedule,
            metering_points: self.config.account.metering_points.clone(),
            ..PollerSettings::for_context(&ctx)
        };
        let auth = Arc::new(AuthClient::for_context(
            self.http.clone(),
            self.endpoints.clone(),
            &ctx,
        ));
        let api = AuthorizedApi::new(auth, ApiClient::new(self.http.clone(), self.endpoints.clone()));
        let state = load_poll_state().await;
        Ok(Poller::new(Arc::new(api), ctx, settings).with_state(state))
    }
}

fn build_endpoints(config: &Config, locale: Locale) -> Endpoints {
    let mut endpoints = Endpoints::for_locale(locale);
    let auth = &config.auth;
    if let Some(base) = &auth.api_base_url {
        endpoints = endpoints.with_api_base(base.clone());
    }
    if let Some(base) = &auth.sso_base_url {
        endpoints = endpoints.with_sso_base(base.clone());
    }
    if let Some(client_id) = &auth.client_id {
        endpoints = endpoints.with_client_id(client_id.clone());
    }
    if let Some(scope) = &auth.scope {
        endpoints = endpoints.with_scope(scope.clone());
    }
    if let Some(name) = &config.statistics.quarter_hour_wire_name {
        endpoints = endpoints.with_quarter_hour_wire_name(name.clone());
    }
    endpoints
}

/// Where the poller's retry state is kept between runs.
pub fn poll_state_path() -> PathBuf {
    default_data_dir().join("poll_state.json")
}

async fn load_poll_state() -> PollState {
    let path = poll_state_path();
    match load_json_opt(&path).await {
        Ok(state) => state.unwrap_or_default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable poll state");
            PollState::default()
        }
    }
}

/// Persists the poller's retry state.
pub async fn save_poll_state(state: &PollState) -> Result<()> {
    save_state_to(&poll_state_path(), state).await
}

async fn save_state_to(path: &Path, state: &PollState) -> Result<()> {
    save_json(path, state)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
