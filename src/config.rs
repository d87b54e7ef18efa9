use std::{env, fs, path::PathBuf, str::FromStr, time::Duration};

use log::LevelFilter;
use native_tls::Identity;
use tokio_native_tls::TlsAcceptor;

use crate::{
    error::StartupError,
    models::{game::ScoringPolicy, lobby::RoomSettings},
};

pub const DEFAULT_ADDR: &str = "127.0.0.1:9001";

#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub identity_path: PathBuf,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    pub pack_path: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub log_level: LevelFilter,
    pub pin_length: usize,
    pub player_grace: Duration,
    pub room_grace: Duration,
    pub results_retention: Duration,
    pub base_points: u32,
    pub speed_bonus: u32,
    pub tls: Option<TlsSettings>,
}

impl Config {
    /// Reads `QUIZ_*` variables. The first CLI argument overrides the address.
    pub fn from_env() -> Result<Config, StartupError> {
        let mut config = Config::from_lookup(|name| env::var(name).ok())?;
        if let Some(addr) = env::args().nth(1) {
            config.addr = addr;
        }
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pin_length = parse_or(&lookup, "QUIZ_PIN_LENGTH", 5usize)?;
        if pin_length == 0 {
            return Err(StartupError::InvalidSetting {
                name: "QUIZ_PIN_LENGTH",
                value: pin_length.to_string(),
            });
        }

        let tls = match lookup("QUIZ_TLS_IDENTITY") {
            Some(path) => Some(TlsSettings {
                identity_path: PathBuf::from(path),
                password: lookup("QUIZ_TLS_PASSWORD").unwrap_or_default(),
            }),
            None => None,
        };

        Ok(Config {
            addr: lookup("QUIZ_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            pack_path: lookup("QUIZ_PACK_PATH").map(PathBuf::from),
            log_dir: PathBuf::from(lookup("QUIZ_LOG_DIR").unwrap_or_else(|| "log".to_string())),
            log_level: parse_or(&lookup, "QUIZ_LOG_LEVEL", LevelFilter::Info)?,
            pin_length,
            player_grace: Duration::from_secs(parse_or(&lookup, "QUIZ_PLAYER_GRACE_SECS", 10)?),
            room_grace: Duration::from_secs(parse_or(&lookup, "QUIZ_ROOM_GRACE_SECS", 10)?),
            results_retention: Duration::from_secs(parse_or(
                &lookup,
                "QUIZ_RESULTS_RETENTION_SECS",
                60,
            )?),
            base_points: parse_or(&lookup, "QUIZ_BASE_POINTS", 100)?,
            speed_bonus: parse_or(&lookup, "QUIZ_SPEED_BONUS", 50)?,
            tls,
        })
    }

    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            scoring: ScoringPolicy {
                base_points: self.base_points,
                max_speed_bonus: self.speed_bonus,
            },
            player_grace: self.player_grace,
            room_grace: self.room_grace,
            results_retention: self.results_retention,
        }
    }

    pub fn tls_acceptor(&self) -> Result<Option<TlsAcceptor>, StartupError> {
        let settings = match &self.tls {
            Some(settings) => settings,
            None => return Ok(None),
        };
        let der = fs::read(&settings.identity_path).map_err(|source| StartupError::Read {
            path: settings.identity_path.display().to_string(),
            source,
        })?;
        let identity = Identity::from_pkcs12(&der, &settings.password)?;
        let acceptor = native_tls::TlsAcceptor::builder(identity).build()?;
        Ok(Some(TlsAcceptor::from(acceptor)))
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, StartupError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| StartupError::InvalidSetting { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, StartupError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.pin_length, 5);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(config.pack_path.is_none());
        assert!(config.tls.is_none());

        let settings = config.room_settings();
        assert_eq!(settings.player_grace, Duration::from_secs(10));
        assert_eq!(settings.results_retention, Duration::from_secs(60));
        assert_eq!(settings.scoring.base_points, 100);
        assert_eq!(settings.scoring.max_speed_bonus, 50);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_with(&[
            ("QUIZ_ADDR", "0.0.0.0:8080"),
            ("QUIZ_PIN_LENGTH", "6"),
            ("QUIZ_LOG_LEVEL", "debug"),
            ("QUIZ_SPEED_BONUS", "0"),
            ("QUIZ_PACK_PATH", "packs/engineering.json"),
        ])
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.pin_length, 6);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.speed_bonus, 0);
        assert_eq!(
            config.pack_path,
            Some(PathBuf::from("packs/engineering.json"))
        );
    }

    #[test]
    fn invalid_numbers_are_startup_errors() {
        let error = config_with(&[("QUIZ_PLAYER_GRACE_SECS", "ten")]).unwrap_err();
        assert!(matches!(
            error,
            StartupError::InvalidSetting { name: "QUIZ_PLAYER_GRACE_SECS", .. }
        ));
        assert!(config_with(&[("QUIZ_PIN_LENGTH", "0")]).is_err());
    }

    #[test]
    fn missing_identity_file_is_reported() {
        let config = config_with(&[("QUIZ_TLS_IDENTITY", "/nonexistent/identity.p12")]).unwrap();
        assert!(matches!(
            config.tls_acceptor(),
            Err(StartupError::Read { .. })
        ));
    }
}
