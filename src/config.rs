use crate::domain::Decimal;
use crate::domain::VaultParams;
use std::collections::HashMap;
use thiserror::Error;

/// Engine-wide tunables. Fee and split values here are defaults for
/// newly created vaults; existing vaults keep the parameters they were
/// created with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_path: String,
    pub default_open_fee_bps: u32,
    pub default_close_fee_bps: u32,
    /// Platform's own cut of realized profit, charged beside the vault's
    /// close fee.
    pub platform_close_fee_bps: u32,
    pub default_vault_share_pct: Decimal,
    pub default_owner_keep_pct: Decimal,
    pub min_fee_usd: Decimal,
    pub max_fee_usd: Option<Decimal>,
    /// Hard ceiling on position leverage, in basis points (50_000 = 5x).
    pub max_leverage_bps: u64,
    /// Sanity ceiling on sized underlying units per position.
    pub max_position_units: Decimal,
    /// Borrow rate recorded on new positions. Accrual is not charged yet.
    pub debt_apr_bps: u32,
    /// Balance update attempts before giving up as contended.
    pub balance_retry_limit: u32,
    /// Linear backoff base between balance attempts, in milliseconds.
    pub balance_retry_base_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: "levervault.db".to_string(),
            default_open_fee_bps: 1_000,
            default_close_fee_bps: 1_000,
            platform_close_fee_bps: 500,
            default_vault_share_pct: parse_literal("0.7"),
            default_owner_keep_pct: parse_literal("0.6"),
            min_fee_usd: parse_literal("0.01"),
            max_fee_usd: None,
            max_leverage_bps: 100_000,
            max_position_units: parse_literal("1000000000"),
            debt_apr_bps: 0,
            balance_retry_limit: 6,
            balance_retry_base_ms: 25,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let max_fee_usd = match env_map.get("MAX_FEE_USD") {
            Some(raw) => Some(parse_decimal_value("MAX_FEE_USD", raw)?),
            None => None,
        };

        Ok(EngineConfig {
            database_path,
            default_open_fee_bps: parse_u32(
                &env_map,
                "VAULT_OPEN_FEE_BPS",
                defaults.default_open_fee_bps,
            )?,
            default_close_fee_bps: parse_u32(
                &env_map,
                "VAULT_CLOSE_FEE_BPS",
                defaults.default_close_fee_bps,
            )?,
            platform_close_fee_bps: parse_u32(
                &env_map,
                "PLATFORM_CLOSE_FEE_BPS",
                defaults.platform_close_fee_bps,
            )?,
            default_vault_share_pct: parse_decimal(
                &env_map,
                "VAULT_SHARE_PCT",
                defaults.default_vault_share_pct,
            )?,
            default_owner_keep_pct: parse_decimal(
                &env_map,
                "OWNER_KEEP_PCT",
                defaults.default_owner_keep_pct,
            )?,
            min_fee_usd: parse_decimal(&env_map, "MIN_FEE_USD", defaults.min_fee_usd)?,
            max_fee_usd,
            max_leverage_bps: parse_u64(&env_map, "MAX_LEVERAGE_BPS", defaults.max_leverage_bps)?,
            max_position_units: parse_decimal(
                &env_map,
                "MAX_POSITION_UNITS",
                defaults.max_position_units,
            )?,
            debt_apr_bps: parse_u32(&env_map, "DEBT_APR_BPS", defaults.debt_apr_bps)?,
            balance_retry_limit: parse_u32(
                &env_map,
                "BALANCE_RETRY_LIMIT",
                defaults.balance_retry_limit,
            )?,
            balance_retry_base_ms: parse_u64(
                &env_map,
                "BALANCE_RETRY_BASE_MS",
                defaults.balance_retry_base_ms,
            )?,
        })
    }

    /// Vault parameters for a newly created vault, from the configured
    /// defaults.
    pub fn vault_params(&self) -> VaultParams {
        VaultParams {
            open_fee_bps: self.default_open_fee_bps,
            close_fee_bps: self.default_close_fee_bps,
            owner_keep_pct: self.default_owner_keep_pct,
            vault_share_pct: self.default_vault_share_pct,
        }
    }
}

fn parse_u32(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u32".to_string())
        }),
        None => Ok(default),
    }
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
        }),
        None => Ok(default),
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        Some(raw) => parse_decimal_value(key, raw),
        None => Ok(default),
    }
}

fn parse_decimal_value(key: &str, raw: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str_canonical(raw.trim()).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a valid decimal".to_string())
    })
}

fn parse_literal(s: &str) -> Decimal {
    // Compile-time constants; from_str_canonical cannot fail on them.
    Decimal::from_str_canonical(s).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/levervault.db".to_string());
        map
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_defaults_apply_when_env_sparse() {
        let config = EngineConfig::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.database_path, "/tmp/levervault.db");
        assert_eq!(config.default_open_fee_bps, 1_000);
        assert_eq!(config.default_close_fee_bps, 1_000);
        assert_eq!(config.platform_close_fee_bps, 500);
        assert_eq!(config.default_vault_share_pct, d("0.7"));
        assert_eq!(config.default_owner_keep_pct, d("0.6"));
        assert_eq!(config.min_fee_usd, d("0.01"));
        assert_eq!(config.max_fee_usd, None);
        assert_eq!(config.max_leverage_bps, 100_000);
        assert_eq!(config.balance_retry_limit, 6);
        assert_eq!(config.balance_retry_base_ms, 25);
    }

    #[test]
    fn test_missing_database_path() {
        let result = EngineConfig::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_overrides_parse() {
        let mut env_map = setup_required_env();
        env_map.insert("VAULT_OPEN_FEE_BPS".to_string(), "250".to_string());
        env_map.insert("MAX_FEE_USD".to_string(), "500".to_string());
        env_map.insert("OWNER_KEEP_PCT".to_string(), "0.8".to_string());

        let config = EngineConfig::from_env_map(env_map).unwrap();
        assert_eq!(config.default_open_fee_bps, 250);
        assert_eq!(config.max_fee_usd, Some(d("500")));
        assert_eq!(config.default_owner_keep_pct, d("0.8"));
    }

    #[test]
    fn test_invalid_bps_value() {
        let mut env_map = setup_required_env();
        env_map.insert("VAULT_OPEN_FEE_BPS".to_string(), "lots".to_string());
        let result = EngineConfig::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "VAULT_OPEN_FEE_BPS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_decimal_value() {
        let mut env_map = setup_required_env();
        env_map.insert("VAULT_SHARE_PCT".to_string(), "most of it".to_string());
        let result = EngineConfig::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "VAULT_SHARE_PCT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_vault_params_mirror_defaults() {
        let config = EngineConfig::default();
        let params = config.vault_params();
        assert_eq!(params.open_fee_bps, 1_000);
        assert_eq!(params.close_fee_bps, 1_000);
        assert_eq!(params.owner_keep_pct, d("0.6"));
        assert_eq!(params.vault_share_pct, d("0.7"));
    }
}
