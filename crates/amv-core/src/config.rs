use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::types::ResourceLimits;
use crate::{Error, Result};

pub const DEFAULT_DOCKER_IMAGE: &str = "ghcr.io/pterodactyl/yolks:java_21";
pub const DEFAULT_STARTUP: &str = "java -Xms128M -XX:MaxRAMPercentage=95.0 -Dterminal.jline=false -Dterminal.ansi=true -jar server.jar";

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub url: String,
    pub application_key: String,
    pub client_key: String,
    pub owner_id: u64,
    pub egg_id: u64,
    pub location_id: u64,
    pub docker_image: String,
    pub startup: String,
}

#[derive(Debug, Clone)]
pub struct PackageConfig {
    /// Project id or slug on the version feed.
    pub id: String,
    /// Human name embedded in server names.
    pub name: String,
    pub artifact_path: Option<PathBuf>,
    pub upload_dir: String,
    pub preferred_platforms: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct InstallConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmvConfig {
    pub panel: PanelConfig,
    pub feed_url: String,
    pub package: PackageConfig,
    pub limits: ResourceLimits,
    pub install: InstallConfig,
    pub retry: RetryPolicy,
    pub upload_timeout: Duration,
}

impl AmvConfig {
    /// Load from the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);

        let application_key = env.required("PTERODACTYL_API_KEY")?;
        let panel = PanelConfig {
            url: env.required("PTERODACTYL_API_URL")?,
            client_key: env
                .optional("PTERODACTYL_CLIENT_API_KEY")
                .unwrap_or_else(|| application_key.clone()),
            application_key,
            owner_id: env.parsed_required("PTERODACTYL_OWNER_ID")?,
            egg_id: env.parsed_required("PTERODACTYL_EGG_ID")?,
            location_id: env.parsed("PTERODACTYL_LOCATION_ID", 1)?,
            docker_image: env
                .optional("PTERODACTYL_DOCKER_IMAGE")
                .unwrap_or_else(|| DEFAULT_DOCKER_IMAGE.into()),
            startup: env
                .optional("PTERODACTYL_STARTUP")
                .unwrap_or_else(|| DEFAULT_STARTUP.into()),
        };

        let id = env.required("MOD_ID")?;
        let preferred_platforms: Vec<String> = env
            .optional("PREFERRED_LOADERS")
            .unwrap_or_else(|| "fabric".into())
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if preferred_platforms.is_empty() {
            return Err(Error::InvalidEnv {
                name: "PREFERRED_LOADERS".into(),
                value: env.optional("PREFERRED_LOADERS").unwrap_or_default(),
            });
        }
        let package = PackageConfig {
            name: env.optional("MOD_NAME").unwrap_or_else(|| id.clone()),
            id,
            artifact_path: env.optional("MOD_FILE_PATH").map(PathBuf::from),
            upload_dir: env
                .optional("MOD_UPLOAD_DIR")
                .unwrap_or_else(|| "mods".into()),
            preferred_platforms,
        };

        let defaults = ResourceLimits::default();
        let limits = ResourceLimits {
            memory_mb: env.parsed("SERVER_MEMORY_LIMIT", defaults.memory_mb)?,
            disk_mb: env.parsed("SERVER_DISK_LIMIT", defaults.disk_mb)?,
            cpu_percent: env.parsed("SERVER_CPU_LIMIT", defaults.cpu_percent)?,
            io_weight: env.parsed("SERVER_IO_WEIGHT", defaults.io_weight)?,
            swap_mb: defaults.swap_mb,
        };

        let install = InstallConfig {
            timeout: Duration::from_secs(env.parsed("INSTALL_TIMEOUT_SECS", 300)?),
            poll_interval: env.seconds("INSTALL_POLL_SECS", 5)?,
        };

        let retry = RetryPolicy {
            max_attempts: env.parsed("RETRY_MAX_ATTEMPTS", 3)?,
            base_backoff: Duration::from_millis(env.parsed("RETRY_BASE_MS", 1000)?),
            backoff_cap: Duration::from_millis(env.parsed("RETRY_CAP_MS", 10_000)?),
            timeout: env.seconds("REMOTE_CALL_TIMEOUT_SECS", 30)?,
            ..RetryPolicy::default()
        };

        Ok(Self {
            panel,
            feed_url: env
                .optional("MODRINTH_API_URL")
                .unwrap_or_else(|| modrinth_api::DEFAULT_BASE_URL.into()),
            package,
            limits,
            install,
            retry,
            upload_timeout: env.seconds("UPLOAD_TIMEOUT_SECS", 300)?,
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| Error::MissingEnv(name.to_string()))
    }

    fn parse<T: FromStr>(&self, name: &str, value: String) -> Result<T> {
        value.trim().parse().map_err(|_| Error::InvalidEnv {
            name: name.to_string(),
            value,
        })
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.optional(name) {
            Some(value) => self.parse(name, value),
            None => Ok(default),
        }
    }

    /// A whole number of seconds; zero is rejected.
    fn seconds(&self, name: &str, default: u64) -> Result<Duration> {
        match self.parsed(name, default)? {
            0 => Err(Error::InvalidEnv {
                name: name.to_string(),
                value: "0".into(),
            }),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    fn parsed_required<T: FromStr>(&self, name: &str) -> Result<T> {
        let value = self.required(name)?;
        self.parse(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("PTERODACTYL_API_URL", "https://panel.example.com"),
        ("PTERODACTYL_API_KEY", "ptla_app"),
        ("PTERODACTYL_OWNER_ID", "1"),
        ("PTERODACTYL_EGG_ID", "15"),
        ("MOD_ID", "example-mod"),
    ];

    #[test]
    fn defaults_fill_everything_optional() {
        let config = AmvConfig::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.panel.client_key, "ptla_app");
        assert_eq!(config.panel.location_id, 1);
        assert_eq!(config.panel.docker_image, DEFAULT_DOCKER_IMAGE);
        assert_eq!(config.feed_url, modrinth_api::DEFAULT_BASE_URL);
        assert_eq!(config.package.name, "example-mod");
        assert_eq!(config.package.upload_dir, "mods");
        assert_eq!(config.package.preferred_platforms, ["fabric"]);
        assert!(config.package.artifact_path.is_none());
        assert_eq!(config.limits, ResourceLimits::default());
        assert_eq!(config.install.timeout, Duration::from_secs(300));
        assert_eq!(config.install.poll_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_cap, Duration::from_secs(10));
        assert_eq!(config.retry.timeout, Duration::from_secs(30));
        assert_eq!(config.upload_timeout, Duration::from_secs(300));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("PTERODACTYL_CLIENT_API_KEY", "ptlc_client"),
            ("PREFERRED_LOADERS", " Quilt, fabric ,,"),
            ("SERVER_MEMORY_LIMIT", "4096"),
            ("MOD_FILE_PATH", "/build/libs/example.jar"),
            ("RETRY_BASE_MS", "250"),
        ]);
        let config = AmvConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.panel.client_key, "ptlc_client");
        assert_eq!(config.package.preferred_platforms, ["quilt", "fabric"]);
        assert_eq!(config.limits.memory_mb, 4096);
        assert_eq!(
            config.package.artifact_path,
            Some(PathBuf::from("/build/libs/example.jar"))
        );
        assert_eq!(config.retry.base_backoff, Duration::from_millis(250));
    }

    #[test]
    fn missing_required_variable_is_named() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "MOD_ID")
            .collect();
        let err = AmvConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(name) if name == "MOD_ID"));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SERVER_DISK_LIMIT", "lots"));
        let err = AmvConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, Error::InvalidEnv { name, .. } if name == "SERVER_DISK_LIMIT"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        for name in ["INSTALL_POLL_SECS", "REMOTE_CALL_TIMEOUT_SECS", "UPLOAD_TIMEOUT_SECS"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((name, "0"));
            let err = AmvConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, Error::InvalidEnv { name: ref n, .. } if n == name), "{name}");
        }
    }
}
