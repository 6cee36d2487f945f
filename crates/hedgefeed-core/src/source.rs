use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Identifiers for the two interchangeable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Hosted financial-data REST service.
    FinancialDatasets,
    /// Brokerage gateway (Client Portal Web API).
    IbkrGateway,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::FinancialDatasets, Self::IbkrGateway];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FinancialDatasets => "financial_datasets",
            Self::IbkrGateway => "ibkr_gateway",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "financial_datasets" | "rest" => Ok(Self::FinancialDatasets),
            "ibkr_gateway" | "gateway" | "ibkr" => Ok(Self::IbkrGateway),
            other => Err(ConfigError::InvalidValue {
                name: "provider",
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(
            "REST".parse::<ProviderId>().expect("alias"),
            ProviderId::FinancialDatasets
        );
        assert_eq!(
            " ibkr ".parse::<ProviderId>().expect("alias"),
            ProviderId::IbkrGateway
        );
        assert!("polygon".parse::<ProviderId>().is_err());
    }
}
