//! 运行配置（环境变量）
//!
//! - 数据库：`DATABASE_URL`，或 `POSTGRES_USER`/`POSTGRES_PASSWORD`/`POSTGRES_HOST`/`POSTGRES_PORT`/`POSTGRES_DB`；
//! - 运营商：`TWILIO_SID`、`TWILIO_SECRET`、`TWILIO_NUMBER`、`TWILIO_URL`（仅 `send` 需要）；
//! - 可选覆盖：`COURIER_RECONNECT_SECS`、`COURIER_BACKOFF_BASE_MS`、`COURIER_LOG_FORMAT`（text|json）。
//!
use courier_domain::error::{DomainError, DomainResult};
use sqlx::postgres::PgConnectOptions;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(DomainError::Config {
                reason: format!("unsupported log format: {other}"),
            }),
        }
    }
}

/// 数据库连接来源：完整 URL 或分项配置
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseSettings {
    Url(String),
    Parts {
        user: String,
        password: String,
        host: String,
        port: u16,
        database: String,
    },
}

impl DatabaseSettings {
    /// 分项配置逐项写入连接选项，密码无需做 URL 转义
    pub fn connect_options(&self) -> DomainResult<PgConnectOptions> {
        match self {
            DatabaseSettings::Url(url) => Ok(url.parse::<PgConnectOptions>()?),
            DatabaseSettings::Parts {
                user,
                password,
                host,
                port,
                database,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(database)),
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseSettings::Url(_) => f.debug_tuple("Url").field(&"***").finish(),
            DatabaseSettings::Parts {
                user,
                host,
                port,
                database,
                ..
            } => f
                .debug_struct("Parts")
                .field("user", user)
                .field("password", &"***")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CarrierSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// 默认发送号码
    pub number: Option<String>,
    pub base_url: Option<String>,
}

impl fmt::Debug for CarrierSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarrierSettings")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .field("number", &self.number)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub database: DatabaseSettings,
    pub carrier: Option<CarrierSettings>,
    pub reconnect_delay: Duration,
    pub backoff_base: Duration,
    pub log_format: LogFormat,
}

impl RelaySettings {
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database = match get("DATABASE_URL") {
            Some(url) => DatabaseSettings::Url(url),
            None => {
                let required = |key: &str| {
                    get(key).ok_or_else(|| DomainError::Config {
                        reason: format!("{key} must be set when DATABASE_URL is absent"),
                    })
                };
                DatabaseSettings::Parts {
                    user: required("POSTGRES_USER")?,
                    password: required("POSTGRES_PASSWORD")?,
                    host: required("POSTGRES_HOST")?,
                    port: match get("POSTGRES_PORT") {
                        Some(v) => parse_number("POSTGRES_PORT", &v)?,
                        None => 5432,
                    },
                    database: required("POSTGRES_DB")?,
                }
            }
        };

        let carrier = match (get("TWILIO_SID"), get("TWILIO_SECRET")) {
            (Some(account_sid), Some(auth_token)) => Some(CarrierSettings {
                account_sid,
                auth_token,
                number: get("TWILIO_NUMBER"),
                base_url: get("TWILIO_URL"),
            }),
            _ => None,
        };

        let reconnect_delay = match get("COURIER_RECONNECT_SECS") {
            Some(v) => Duration::from_secs(parse_number("COURIER_RECONNECT_SECS", &v)?),
            None => Duration::from_secs(5),
        };
        let backoff_base = match get("COURIER_BACKOFF_BASE_MS") {
            Some(v) => Duration::from_millis(parse_number("COURIER_BACKOFF_BASE_MS", &v)?),
            None => Duration::from_secs(1),
        };
        let log_format = get("COURIER_LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            database,
            carrier,
            reconnect_delay,
            backoff_base,
            log_format,
        })
    }
}

fn parse_number<T>(key: &str, value: &str) -> DomainResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| DomainError::Config {
        reason: format!("{key}={value}: {e}"),
    })
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn composes_database_options_from_parts() {
        let settings = RelaySettings::from_lookup(lookup(&[
            ("POSTGRES_USER", "courier"),
            ("POSTGRES_PASSWORD", "p@ss/w#rd"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_DB", "messages"),
        ]))
        .unwrap();

        assert_eq!(
            settings.database,
            DatabaseSettings::Parts {
                user: "courier".into(),
                password: "p@ss/w#rd".into(),
                host: "db".into(),
                port: 5432,
                database: "messages".into(),
            }
        );
        let options = settings.database.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "courier");
        assert_eq!(options.get_database(), Some("messages"));
        assert!(!format!("{:?}", settings.database).contains("p@ss"));
        assert_eq!(settings.carrier, None);
        assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
        assert_eq!(settings.backoff_base, Duration::from_secs(1));
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[test]
    fn database_url_wins_and_overrides_apply() {
        let settings = RelaySettings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/courier"),
            ("TWILIO_SID", "AC1"),
            ("TWILIO_SECRET", "s3cr3t"),
            ("TWILIO_NUMBER", "+15550002222"),
            ("COURIER_RECONNECT_SECS", "10"),
            ("COURIER_BACKOFF_BASE_MS", "250"),
            ("COURIER_LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(
            settings.database,
            DatabaseSettings::Url("postgres://localhost/courier".into())
        );
        assert_eq!(settings.database.connect_options().unwrap().get_host(), "localhost");
        let carrier = settings.carrier.unwrap();
        assert_eq!(carrier.account_sid, "AC1");
        assert_eq!(carrier.number.as_deref(), Some("+15550002222"));
        assert!(!format!("{carrier:?}").contains("s3cr3t"));
        assert_eq!(settings.reconnect_delay, Duration::from_secs(10));
        assert_eq!(settings.backoff_base, Duration::from_millis(250));
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_database_settings_is_config_error() {
        let err = RelaySettings::from_lookup(lookup(&[("POSTGRES_USER", "x")])).unwrap_err();
        assert!(matches!(err, DomainError::Config { reason } if reason.contains("POSTGRES_PASSWORD")));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let err = RelaySettings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/courier"),
            ("COURIER_RECONNECT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DomainError::Config { .. }));

        let err = RelaySettings::from_lookup(lookup(&[
            ("POSTGRES_USER", "courier"),
            ("POSTGRES_PASSWORD", "pw"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_PORT", "99999"),
            ("POSTGRES_DB", "messages"),
        ]))
        .unwrap_err();
        assert!(matches!(err, DomainError::Config { reason } if reason.contains("POSTGRES_PORT")));
    }
}
