use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub api_keys: ApiKeySettings,
    pub pipeline: PipelineSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

/// Keys for the external providers. An empty key means "provider
/// unavailable" and the owning client degrades to empty results.
#[derive(serde::Deserialize, Clone)]
pub struct ApiKeySettings {
    pub openai: String,
    pub serpapi: String,
}

/// Pipeline tunables. The similarity weights and floor have no derivation
/// beyond hand tuning, so they live here instead of in code.
#[derive(serde::Deserialize, Clone)]
pub struct PipelineSettings {
    pub fetch_timeout_secs: u64,
    pub fetch_max_retries: u8,
    pub results_per_query: u8,
    pub max_candidates: usize,
    pub extract_concurrency: usize,
    pub embedding_model: String,
    pub similarity_floor: f64,
    pub max_competitors: usize,
    pub weights: SimilarityWeights,
}

#[derive(serde::Deserialize, Clone, Copy)]
pub struct SimilarityWeights {
    pub embedding: f64,
    pub title: f64,
    pub identifier: f64,
    pub brand: f64,
    pub attribute: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        SimilarityWeights {
            embedding: 0.40,
            title: 0.22,
            identifier: 0.18,
            brand: 0.10,
            attribute: 0.10,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            fetch_timeout_secs: 30,
            fetch_max_retries: 2,
            results_per_query: 10,
            max_candidates: 20,
            extract_concurrency: 6,
            embedding_model: "text-embedding-3-small".to_string(),
            similarity_floor: 0.50,
            max_competitors: 5,
            weights: SimilarityWeights::default(),
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
