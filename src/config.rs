use serde::Deserialize;

/// Public copy of the TerraCred farmer dataset.
pub const DEFAULT_DATASET_URL: &str =
    "https://raw.githubusercontent.com/ayanatherate/TerraCred-AI/refs/heads/main/data/Data_with_phone_numbers.csv";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub dataset_url: String,
    pub dataset_timeout_secs: u64,
    pub model_path: Option<String>, // No model means plain lookups
    pub explanation_background_limit: Option<usize>, // None means the whole dataset
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            dataset_url: validate_dataset_url(
                std::env::var("DATASET_URL").unwrap_or_else(|_| DEFAULT_DATASET_URL.to_string()),
            )?,
            dataset_timeout_secs: std::env::var("DATASET_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .map_err(|_| anyhow::anyhow!("DATASET_TIMEOUT_SECS must be a positive integer"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("DATASET_TIMEOUT_SECS must be greater than zero");
                    }
                    Ok(secs)
                })?,
            model_path: std::env::var("MODEL_PATH")
                .ok()
                .map(|path| {
                    if path.trim().is_empty() {
                        anyhow::bail!("MODEL_PATH cannot be empty when set");
                    }
                    Ok(path)
                })
                .transpose()?,
            explanation_background_limit: std::env::var("EXPLANATION_BACKGROUND_LIMIT")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(|raw| parse_background_limit(&raw))
                .transpose()?,
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Dataset URL: {}", config.dataset_url);
        tracing::debug!("Dataset timeout: {}s", config.dataset_timeout_secs);
        match config.model_path {
            Some(ref path) => tracing::info!("Model artifact configured: {}", path),
            None => tracing::warn!("MODEL_PATH not set, predictions and explanations disabled"),
        }
        match config.explanation_background_limit {
            Some(limit) => tracing::debug!("Explanation background capped at {} rows", limit),
            None => tracing::debug!("Explanation background uses every dataset row"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn parse_background_limit(raw: &str) -> anyhow::Result<usize> {
    let limit = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow::anyhow!("EXPLANATION_BACKGROUND_LIMIT must be a positive integer"))?;
    if limit == 0 {
        anyhow::bail!("EXPLANATION_BACKGROUND_LIMIT must be greater than zero");
    }
    Ok(limit)
}

/// Checks that the dataset location is an absolute http(s) URL.
pub fn validate_dataset_url(raw: String) -> anyhow::Result<String> {
    if raw.trim().is_empty() {
        anyhow::bail!("DATASET_URL cannot be empty");
    }
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        anyhow::bail!("DATASET_URL must start with http:// or https://");
    }
    url::Url::parse(&raw).map_err(|e| anyhow::anyhow!("DATASET_URL is not a valid URL: {}", e))?;
    Ok(raw)
}
