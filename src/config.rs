use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Base URL of the CRM backend this service fronts.
    pub crm_base_url: String,
    /// Bearer token for the CRM backend.
    pub crm_token: String,
    /// Path of the JSON blob file backing the offline queue and interaction log.
    pub offline_store_path: String,
    /// Maximum replay attempts per queued action.
    pub queue_max_retries: u32,
    /// Delay between queue drain passes, in seconds.
    pub queue_retry_delay_secs: u64,
    /// Country calling code substituted for a leading zero in WhatsApp links.
    pub whatsapp_country_code: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            crm_base_url: std::env::var("CRM_BASE_URL")
                .map_err(|_| anyhow::anyhow!("CRM_BASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("CRM_BASE_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("CRM_BASE_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            crm_token: std::env::var("CRM_TOKEN")
                .map_err(|_| anyhow::anyhow!("CRM_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("CRM_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            offline_store_path: std::env::var("OFFLINE_STORE_PATH")
                .unwrap_or_else(|_| "offline_store.json".to_string()),
            queue_max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("QUEUE_MAX_RETRIES must be a non-negative number"))?,
            queue_retry_delay_secs: std::env::var("QUEUE_RETRY_DELAY_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("QUEUE_RETRY_DELAY_SECS must be a number"))?,
            whatsapp_country_code: std::env::var("WHATSAPP_COUNTRY_CODE")
                .unwrap_or_else(|_| "49".to_string())
                .trim()
                .to_string(),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("CRM Base URL: {}", config.crm_base_url);
        tracing::debug!("Offline store path: {}", config.offline_store_path);
        tracing::debug!(
            "Queue: max_retries={}, retry_delay={}s",
            config.queue_max_retries,
            config.queue_retry_delay_secs
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
