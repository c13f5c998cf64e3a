//! Layered configuration loading using figment.
//!
//! Sources, highest priority first:
//! 1. Environment variables (`IAFISCAL_*` prefix, `__` between sections)
//! 2. The TOML file given on the command line, or `iafiscal.toml` in the
//!    working directory
//! 3. Built-in defaults
//!
//! `IAFISCAL_SERVER__PORT=9000` maps to `server.port`,
//! `IAFISCAL_LEDGER__FALLBACK_ACCOUNT=629` to `ledger.fallback_account`.

use std::path::{Path, PathBuf};

use bigdecimal::BigDecimal;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount;
use crate::export::ExportOptions;
use crate::ledger::LedgerAccounts;
use crate::tax::{VatAccounts, VatRate, WithholdingAccounts};
use crate::utils::validate_account_code;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "iafiscal.toml";

const ENV_PREFIX: &str = "IAFISCAL_";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Uploads larger than this are refused with 413
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// VAT rate for concepts posted on the fallback account (0.21 = 21%)
    #[serde(with = "amount::serde_number")]
    pub default_tax_rate: BigDecimal,
    pub bank_account: String,
    pub vat_input_account: String,
    pub vat_output_account: String,
    /// IRPF withheld on professional fees
    pub irpf_withheld_account: String,
    /// IRPF withheld on rents
    pub irpf_rent_account: String,
    pub irpf_prepaid_account: String,
    /// Account receiving concepts no rule matches; unset means they are rejected
    pub fallback_account: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let accounts = LedgerAccounts::default();
        Self {
            default_tax_rate: BigDecimal::from(21) / BigDecimal::from(100),
            bank_account: accounts.bank,
            vat_input_account: accounts.vat.input,
            vat_output_account: accounts.vat.output,
            irpf_withheld_account: accounts.withholding.withheld,
            irpf_rent_account: accounts.withholding.rent,
            irpf_prepaid_account: accounts.withholding.prepaid,
            fallback_account: None,
        }
    }
}

impl LedgerConfig {
    pub fn accounts(&self) -> LedgerAccounts {
        LedgerAccounts {
            bank: self.bank_account.clone(),
            vat: VatAccounts {
                input: self.vat_input_account.clone(),
                output: self.vat_output_account.clone(),
            },
            withholding: WithholdingAccounts {
                withheld: self.irpf_withheld_account.clone(),
                rent: self.irpf_rent_account.clone(),
                prepaid: self.irpf_prepaid_account.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    #[serde(flatten)]
    pub options: ExportOptions,
    /// Attachment name of the generated ledger file
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            options: ExportOptions::default(),
            file_name: "export_contasol.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract binary, looked up in `PATH` unless absolute
    pub command: String,
    pub language: String,
    /// PDFs with fewer text characters are treated as scans
    pub min_pdf_chars: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: "tesseract".to_string(),
            language: "spa".to_string(),
            min_pdf_chars: crate::ingest::pdf::MIN_TEXT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RulesConfig {
    /// `;`-separated rule file replacing the built-in PGC rules
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    /// tracing filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ledger: LedgerConfig::default(),
            export: ExportConfig::default(),
            ocr: OcrConfig::default(),
            rules: RulesConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load defaults, `iafiscal.toml` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load using an explicit TOML file instead of `iafiscal.toml`
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the working directory first, then the layered sources
    pub fn load_with_dotenv(path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();
        Self::load_from(path)
    }

    /// Provider chain, lowest priority first
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let accounts = [
            ("ledger.bank_account", Some(&self.ledger.bank_account)),
            ("ledger.vat_input_account", Some(&self.ledger.vat_input_account)),
            ("ledger.vat_output_account", Some(&self.ledger.vat_output_account)),
            ("ledger.irpf_withheld_account", Some(&self.ledger.irpf_withheld_account)),
            ("ledger.irpf_rent_account", Some(&self.ledger.irpf_rent_account)),
            ("ledger.irpf_prepaid_account", Some(&self.ledger.irpf_prepaid_account)),
            ("ledger.fallback_account", self.ledger.fallback_account.as_ref()),
        ];
        for (field, code) in accounts {
            if let Some(code) = code {
                validate_account_code(code).map_err(|e| invalid(field, e))?;
            }
        }

        VatRate::new(self.ledger.default_tax_rate.clone())
            .map_err(|e| invalid("ledger.default_tax_rate", e))?;

        if self.export.options.diario.trim().is_empty() {
            return Err(invalid("export.diario", "must not be empty"));
        }
        if self.export.options.max_concept_len == Some(0) {
            return Err(invalid("export.max_concept_len", "must be positive"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes", "must be positive"));
        }

        Ok(())
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn invalid(field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.ledger.accounts(), LedgerAccounts::default());
        assert_eq!(config.export.options.diario, "1");
        assert_eq!(config.ocr.language, "spa");
    }

    #[test]
    fn figment_builds_without_files() {
        Jail::expect_with(|_jail| {
            let config: AppConfig = AppConfig::figment(None).extract()?;
            assert_eq!(config, AppConfig::default());
            Ok(())
        });
    }

    #[test]
    fn toml_file_and_env_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                log_level = "debug"

                [server]
                port = 9000

                [ledger]
                default_tax_rate = 0.10
                fallback_account = "629"
                irpf_rent_account = "4751.21"

                [export]
                diario = "2"
                decimal_comma = true
                "#,
            )?;
            jail.set_env("IAFISCAL_SERVER__PORT", "9100");
            jail.set_env("IAFISCAL_OCR__LANGUAGE", "spa+eng");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.ledger.default_tax_rate, BigDecimal::from_str("0.10").unwrap());
            assert_eq!(config.ledger.fallback_account.as_deref(), Some("629"));
            assert_eq!(config.ledger.accounts().withholding.rent, "4751.21");
            assert_eq!(config.ledger.irpf_withheld_account, "4751.01");
            assert_eq!(config.export.options.diario, "2");
            assert!(config.export.options.decimal_comma);
            assert_eq!(config.export.file_name, "export_contasol.csv");
            assert_eq!(config.ocr.language, "spa+eng");
            Ok(())
        });
    }

    #[test]
    fn explicit_path_replaces_default_file() {
        Jail::expect_with(|jail| {
            jail.create_file("otro.toml", "[rules]\npath = \"reglas.csv\"\n")?;

            let config = AppConfig::load_from(Some(Path::new("otro.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.rules.path, Some(PathBuf::from("reglas.csv")));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, "[ledger]\nbank_account = \"57A\"\n")?;
            let err = AppConfig::load().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "ledger.bank_account"));
            Ok(())
        });

        let mut config = AppConfig::default();
        config.ledger.default_tax_rate = BigDecimal::from(2);
        assert!(config.validate().is_err());
    }
}
