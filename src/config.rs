use std::env;

/// Environment variable overriding the relay's public origin.
pub const PUBLIC_ORIGIN_VAR: &str = "RELAY_PUBLIC_ORIGIN";
/// Environment variable holding the comma-separated host allow-list.
pub const ALLOWED_HOSTS_VAR: &str = "RELAY_ALLOWED_HOSTS";

/// Process configuration loaded once at startup
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Where per-request relay settings come from
    pub settings: SettingsSource,
}

/// Inputs consulted by every relay request.
///
/// Built once at request entry and handed by value to the host policy and
/// the callback URL builder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelaySettings {
    /// Explicit public origin of the relay (e.g. `https://relay.example.org`)
    pub public_origin: Option<String>,
    /// Lowercased hostnames or `*.suffix` patterns; empty allows any public host
    pub allowed_hosts: Vec<String>,
}

/// Source of [`RelaySettings`].
#[derive(Clone, Debug, PartialEq)]
pub enum SettingsSource {
    /// Re-read the environment on every request
    Environment,
    /// Use a pinned value
    Fixed(RelaySettings),
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode the port defaults to 3000. In PROD mode PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        Ok(Config {
            port,
            is_dev,
            settings: SettingsSource::Environment,
        })
    }
}

impl RelaySettings {
    /// Read the relay settings from the current environment.
    pub fn from_env() -> Self {
        let public_origin = env::var(PUBLIC_ORIGIN_VAR)
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        let allowed_hosts = env::var(ALLOWED_HOSTS_VAR)
            .map(|v| parse_allow_list(&v))
            .unwrap_or_default();

        Self {
            public_origin,
            allowed_hosts,
        }
    }
}

impl SettingsSource {
    pub fn load(&self) -> RelaySettings {
        match self {
            SettingsSource::Environment => RelaySettings::from_env(),
            SettingsSource::Fixed(settings) => settings.clone(),
        }
    }
}

/// Split a comma-separated allow-list into trimmed, lowercased entries.
pub fn parse_allow_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().trim_end_matches('.').to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all env-var tests to prevent races between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Set env vars, run `f`, then restore original state.
    ///
    /// `set` are vars to set; `unset` are vars to remove before running `f`.
    fn with_env(set: &[(&str, &str)], unset: &[&str], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        let save_set: Vec<(&str, Option<String>)> = set
            .iter()
            .map(|(k, _)| (*k, std::env::var(k).ok()))
            .collect();
        let save_unset: Vec<(&str, Option<String>)> =
            unset.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for (k, v) in set {
            // SAFETY: serialized by ENV_LOCK, no other thread modifies env vars concurrently.
            unsafe { std::env::set_var(k, v) };
        }
        for k in unset {
            unsafe { std::env::remove_var(k) };
        }

        f();

        for (k, old) in save_set.into_iter().chain(save_unset) {
            match old {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    #[test]
    fn dev_mode_uses_defaults() {
        with_env(&[("DEV_MODE", "true")], &["PORT"], || {
            let config = Config::from_env().expect("should succeed in dev mode");
            assert!(config.is_dev);
            assert_eq!(config.port, 3000);
            assert_eq!(config.settings, SettingsSource::Environment);
        });
    }

    #[test]
    fn prod_mode_requires_port() {
        with_env(&[], &["DEV_MODE", "PORT"], || {
            let result = Config::from_env();
            assert!(result.is_err(), "Should fail without PORT in prod mode");
        });
    }

    #[test]
    fn prod_mode_parses_port() {
        with_env(&[("PORT", "8080")], &["DEV_MODE"], || {
            let config = Config::from_env().unwrap();
            assert!(!config.is_dev);
            assert_eq!(config.port, 8080);
        });
    }

    #[test]
    fn invalid_port_is_rejected() {
        with_env(&[("DEV_MODE", "true"), ("PORT", "not-a-port")], &[], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn relay_settings_default_when_unset() {
        with_env(&[], &[PUBLIC_ORIGIN_VAR, ALLOWED_HOSTS_VAR], || {
            assert_eq!(RelaySettings::from_env(), RelaySettings::default());
        });
    }

    #[test]
    fn relay_settings_read_from_env() {
        with_env(
            &[
                (PUBLIC_ORIGIN_VAR, "https://relay.example.org/"),
                (ALLOWED_HOSTS_VAR, " CDN.example.com, *.akamaized.net ,,"),
            ],
            &[],
            || {
                let settings = RelaySettings::from_env();
                assert_eq!(
                    settings.public_origin.as_deref(),
                    Some("https://relay.example.org")
                );
                assert_eq!(
                    settings.allowed_hosts,
                    vec!["cdn.example.com".to_string(), "*.akamaized.net".to_string()]
                );
            },
        );
    }

    #[test]
    fn blank_public_origin_is_ignored() {
        with_env(&[(PUBLIC_ORIGIN_VAR, "   ")], &[], || {
            assert_eq!(RelaySettings::from_env().public_origin, None);
        });
    }

    #[test]
    fn environment_source_rereads_each_load() {
        with_env(&[(ALLOWED_HOSTS_VAR, "a.example.com")], &[], || {
            let source = SettingsSource::Environment;
            assert_eq!(source.load().allowed_hosts, vec!["a.example.com"]);

            // SAFETY: still holding ENV_LOCK inside with_env.
            unsafe { std::env::set_var(ALLOWED_HOSTS_VAR, "b.example.com") };
            assert_eq!(source.load().allowed_hosts, vec!["b.example.com"]);
        });
    }

    #[test]
    fn fixed_source_ignores_environment() {
        let pinned = RelaySettings {
            public_origin: Some("https://relay.test".into()),
            allowed_hosts: vec!["cdn.test".into()],
        };
        let source = SettingsSource::Fixed(pinned.clone());
        assert_eq!(source.load(), pinned);
    }

    #[test]
    fn allow_list_parsing() {
        assert!(parse_allow_list("").is_empty());
        assert!(parse_allow_list(" , ,").is_empty());
        assert_eq!(parse_allow_list("Example.COM"), vec!["example.com"]);
        assert_eq!(
            parse_allow_list(" cdn.example.com. ,*.akamaized.net."),
            vec!["cdn.example.com", "*.akamaized.net"]
        );
    }
}
