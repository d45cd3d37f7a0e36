use std::path::Path;

use facet::Facet;

use crate::error::KilnError;

#[derive(Debug, Clone, Facet)]
pub struct Config {
    pub api: ApiConfig,
    pub image: ImageConfig,
    #[facet(default)]
    pub builder: BuilderConfig,
    #[facet(default)]
    pub provision: ProvisionConfig,
}

#[derive(Debug, Clone, Facet)]
pub struct ApiConfig {
    /// Base URL of the VM cluster API, e.g. `http://10.221.188.20`.
    pub endpoint: String,
    #[facet(default)]
    pub user: String,
    #[facet(default)]
    pub password: String,
}

#[derive(Debug, Clone, Facet)]
pub struct ImageConfig {
    /// Base image the builder VM boots from.
    pub source: String,
    /// Name the provisioned image is saved under (or copied to, with precopy).
    #[facet(default)]
    pub destination: String,
    /// Copy source → destination before boot and commit into the copy,
    /// instead of saving a new image at the end.
    #[facet(default)]
    pub precopy: bool,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct BuilderConfig {
    #[facet(default = "kiln-builder")]
    pub vm_name: String,
    #[facet(default = 3)]
    pub cpu_cores: u32,
    /// Skip image creation entirely (the run leaves no image behind).
    #[facet(default)]
    pub no_create_image: bool,
    /// Leave the builder VM in place after the run.
    #[facet(default)]
    pub no_delete_vm: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            vm_name: "kiln-builder".into(),
            cpu_cores: 3,
            no_create_image: false,
            no_delete_vm: false,
        }
    }
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct ProvisionConfig {
    /// Shell command run against the deployed VM's SSH endpoint.
    pub command: Option<String>,
}

// ── env overrides ─────────────────────────────────────────

pub const ENV_USER: &str = "KILN_API_USER";
pub const ENV_PASSWORD: &str = "KILN_API_PASSWORD";

/// Let credentials come from the environment so they can stay out of
/// committed config files.
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(user) = var(ENV_USER) {
        config.api.user = user;
    }
    if let Some(password) = var(ENV_PASSWORD) {
        config.api.password = password;
    }
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), KilnError> {
    if config.api.endpoint.is_empty() {
        return Err(KilnError::Validation {
            message: "api.endpoint must be set".into(),
        });
    }
    if !config.api.endpoint.starts_with("http://") && !config.api.endpoint.starts_with("https://") {
        return Err(KilnError::Validation {
            message: format!(
                "api.endpoint must be an http(s) URL (got '{}')",
                config.api.endpoint
            ),
        });
    }
    if config.api.user.is_empty() {
        return Err(KilnError::Validation {
            message: format!("api.user must be set (in [api] or via {ENV_USER})"),
        });
    }
    if config.api.password.is_empty() {
        return Err(KilnError::Validation {
            message: format!("api.password must be set (in [api] or via {ENV_PASSWORD})"),
        });
    }

    if config.image.source.is_empty() {
        return Err(KilnError::Validation {
            message: "image.source must be set".into(),
        });
    }
    // The destination only matters when the run produces an image.
    if config.image.destination.is_empty() && !config.builder.no_create_image {
        return Err(KilnError::Validation {
            message: "image.destination must be set unless builder.no_create_image is enabled"
                .into(),
        });
    }

    if config.builder.cpu_cores < 1 {
        return Err(KilnError::Validation {
            message: "builder.cpu_cores must be at least 1".into(),
        });
    }
    validate_vm_name(&config.builder.vm_name)?;

    Ok(())
}

fn validate_vm_name(name: &str) -> Result<(), KilnError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(KilnError::Validation {
            message: format!("builder.vm_name must match [a-z0-9][a-z0-9-]* (got '{name}')"),
        });
    }
    Ok(())
}

// ── public API ────────────────────────────────────────────

pub fn load_config(path: &Path) -> Result<Config, KilnError> {
    let contents = std::fs::read_to_string(path).map_err(|source| KilnError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let mut config: Config = facet_toml::from_str(&contents).map_err(|e| KilnError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;

    Ok(config)
}
