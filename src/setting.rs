use crate::{Error, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// number of threads config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Thread {
    /// number of http server threads
    pub http: usize,
}

/// network config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Network {
    /// server bind host
    pub host: String,
    /// server bind port
    pub port: u16,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// payment processor type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Processor {
    /// in-process processor, nothing leaves the server
    #[default]
    Sandbox,
    /// marqeta card issuance with stripe charges
    Hosted,
}

/// Marqeta setting
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Marqeta {
    /// api base url, e.g. https://sandbox-api.marqeta.com/v3
    pub url: String,
    /// application token
    pub username: String,
    /// admin access token
    pub password: String,
    pub card_product_token: String,
}

/// Stripe setting
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Stripe {
    pub url: String,
    pub secret_key: String,
}

impl Default for Stripe {
    fn default() -> Self {
        Self {
            url: "https://api.stripe.com".to_owned(),
            secret_key: "".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Fee {
    /// contribution fee expressed as a percentage of the gross amount. (0-100)
    pub contribution_pct: f32,
    /// charge currency
    pub currency: String,
    /// largest single contribution, in cents
    pub max_contribution: i64,
}

impl Default for Fee {
    fn default() -> Self {
        Self {
            contribution_pct: 1.0,
            currency: "usd".to_owned(),
            max_contribution: 100_000_000,
        }
    }
}

impl Fee {
    /// fee rate in basis points
    pub fn bps(&self) -> i32 {
        (self.contribution_pct as f64 * 100.0).round() as i32
    }

    /// (fee, net) for a gross amount at a basis point rate
    pub fn cal(gross: i64, bps: i32) -> (i64, i64) {
        // bps is at most 10_000, so fee never exceeds gross
        let fee = (gross as i128 * bps as i128 / 10_000) as i64;
        (fee, gross - fee)
    }

    /// Whether `gross` may be charged as a single contribution.
    pub fn allows(&self, gross: i64) -> bool {
        gross > 0 && gross <= self.max_contribution
    }
}

/// auth config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Auth {
    /// secret shared with the identity service that signs access tokens
    pub secret: String,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            secret: "test".to_owned(),
        }
    }
}

/// processor call config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Gateway {
    /// upper bound of each processor call
    pub timeout_ms: u64,
}

impl Gateway {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// reconciliation sweep config
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Sync {
    /// seconds between sweeps
    pub interval_secs: u64,
    /// a pending contribution older than this is canceled at the processor
    pub pending_window_secs: u64,
    /// how far back to list processor charges
    pub lookback_secs: u64,
}

impl Default for Sync {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            pending_window_secs: 30 * 60,
            lookback_secs: 25 * 60 * 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Setting {
    /// database url
    /// https://www.sea-ql.org/SeaORM/docs/install-and-config/connection/
    pub db_url: String,

    pub fee: Fee,

    pub thread: Thread,
    pub network: Network,

    pub processor: Processor,
    pub marqeta: Option<Marqeta>,
    pub stripe: Option<Stripe>,

    pub gateway: Gateway,
    pub sync: Sync,

    pub auth: Auth,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            db_url: "sqlite://eventfund.sqlite?mode=rwc".to_string(),
            fee: Default::default(),
            thread: Default::default(),
            network: Default::default(),
            processor: Default::default(),
            marqeta: None,
            stripe: None,
            gateway: Default::default(),
            sync: Default::default(),
            auth: Default::default(),
        }
    }
}

impl Setting {
    /// read config from file and env
    pub fn read<P: AsRef<Path>>(file: P, env_prefix: Option<String>) -> Result<Self> {
        let path = file
            .as_ref()
            .to_str()
            .ok_or_else(|| Error::Message("invalid config path".to_owned()))?;
        let mut config = Config::builder()
            // override with file contents
            .add_source(File::with_name(path));
        if let Some(prefix) = env_prefix {
            config = config.add_source(Self::env_source(&prefix));
        }

        let config = config.build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    fn env_source(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .try_parsing(true)
            .prefix_separator("_")
            .separator("__")
    }

    /// read config from env
    pub fn from_env(env_prefix: String) -> Result<Self> {
        let mut config = Config::builder();
        config = config.add_source(Self::env_source(&env_prefix));

        let config = config.build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    /// config from str
    pub fn from_str(s: &str, format: FileFormat) -> Result<Self> {
        let builder = Config::builder();
        let config = builder.add_source(File::from_str(s, format)).build()?;
        let mut setting: Setting = config.try_deserialize()?;
        setting.validate()?;
        Ok(setting)
    }

    fn validate(&mut self) -> Result<()> {
        if !(0.0..100.0).contains(&self.fee.contribution_pct) {
            return Err(Error::Str("fee.contribution_pct must be in [0, 100)"));
        }
        if self.fee.max_contribution <= 0 {
            return Err(Error::Str("fee.max_contribution must be positive"));
        }
        if self.processor == Processor::Hosted && (self.marqeta.is_none() || self.stripe.is_none())
        {
            return Err(Error::Str("hosted processor needs marqeta and stripe config"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use config::FileFormat;
    use std::fs;
    use tempfile::Builder;

    #[test]
    fn der() -> Result<()> {
        let json = r#"{
            "processor": "sandbox",
            "network": {"port": 1},
            "thread": {"http": 1},
            "fee": {"contribution_pct": 2.5}
        }"#;

        let mut def = Setting::default();
        def.network.port = 1;
        def.thread.http = 1;
        def.fee.contribution_pct = 2.5;

        let s2 = serde_json::from_str::<Setting>(json)?;
        let s1: Setting = Setting::from_str(json, FileFormat::Json)?;

        assert_eq!(def, s1);
        assert_eq!(def, s2);

        Ok(())
    }

    #[test]
    fn hosted_needs_credentials() -> Result<()> {
        let res = Setting::from_str(r#"{"processor": "hosted"}"#, FileFormat::Json);
        assert!(res.is_err());

        let setting = Setting::from_str(
            r#"
            processor = "hosted"
            [marqeta]
            url = "https://sandbox-api.marqeta.com/v3"
            username = "app"
            password = "secret"
            card_product_token = "product"
            [stripe]
            secret_key = "sk_test"
            "#,
            FileFormat::Toml,
        )?;
        assert_eq!(setting.processor, Processor::Hosted);
        assert_eq!(setting.stripe.unwrap().url, "https://api.stripe.com");
        Ok(())
    }

    #[test]
    fn read() -> Result<()> {
        let setting = Setting::default();
        assert_eq!(setting.network.host, "127.0.0.1");

        let file = Builder::new()
            .prefix("eventfund-config-test-read")
            .suffix(".toml")
            .rand_bytes(0)
            .tempfile()?;

        let setting = Setting::read(&file, None)?;
        assert_eq!(setting.network.host, "127.0.0.1");
        fs::write(
            &file,
            r#"
        [network]
        host = "127.0.0.2"
        "#,
        )?;

        temp_env::with_vars(
            [
                ("EF_network.port", Some("1")),
                ("EF_network__host", Some("127.0.0.3")),
                ("EF_sync__pending_window_secs", Some("60")),
            ],
            || {
                let setting = Setting::read(&file, Some("EF".to_owned())).unwrap();
                assert_eq!(setting.network.host, "127.0.0.3".to_string());
                assert_eq!(setting.network.port, 1);
                assert_eq!(setting.sync.pending_window_secs, 60);
            },
        );
        Ok(())
    }

    #[test]
    fn fee() -> Result<()> {
        let fee = Fee::default();
        assert_eq!(fee.bps(), 100);
        assert_eq!(Fee::cal(2000, fee.bps()), (20, 1980));
        // floor, the contributor is never over charged
        assert_eq!(Fee::cal(199, 100), (1, 198));
        assert_eq!(Fee::cal(99, 100), (0, 99));

        let fee = Fee {
            contribution_pct: 2.9,
            ..Default::default()
        };
        assert_eq!(fee.bps(), 290);
        assert_eq!(Fee::cal(10_000, fee.bps()), (290, 9710));
        assert_eq!(Fee::cal(1000, 0), (0, 1000));

        // no overflow at the top of the range
        let (fee, net) = Fee::cal(i64::MAX, 100);
        assert_eq!(fee, i64::MAX / 100);
        assert_eq!(fee + net, i64::MAX);
        assert!(fee >= 0 && net <= i64::MAX);

        let fee = Fee::default();
        assert!(fee.allows(1));
        assert!(fee.allows(fee.max_contribution));
        assert!(!fee.allows(0));
        assert!(!fee.allows(-1));
        assert!(!fee.allows(fee.max_contribution + 1));
        assert!(!fee.allows(i64::MAX / 50));
        Ok(())
    }
}
