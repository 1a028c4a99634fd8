use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Employment,
    Service,
    Lease,
    #[serde(alias = "non-disclosure")]
    Nda,
}

impl ContractType {
    pub const ALL: [ContractType; 4] = [
        ContractType::Employment,
        ContractType::Service,
        ContractType::Lease,
        ContractType::Nda,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Employment => "employment",
            ContractType::Service => "service",
            ContractType::Lease => "lease",
            ContractType::Nda => "nda",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employment" => Ok(ContractType::Employment),
            "service" => Ok(ContractType::Service),
            "lease" => Ok(ContractType::Lease),
            "nda" | "non-disclosure" => Ok(ContractType::Nda),
            other => Err(anyhow::anyhow!("Unknown contract type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Contract {
    pub id: i64,
    pub user_id: i64,
    pub contract_type: ContractType,
    pub content: String,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: i64,
    pub user_id: i64,
    pub contract_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl FromStr for Sender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            other => Err(anyhow::anyhow!("Unknown message sender '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_type_accepts_non_disclosure_alias() {
        let parsed: ContractType = serde_json::from_str("\"non-disclosure\"").unwrap();
        assert_eq!(parsed, ContractType::Nda);
        assert_eq!("non-disclosure".parse::<ContractType>().unwrap(), ContractType::Nda);
    }

    #[test]
    fn contract_type_rejects_unknown() {
        assert!(serde_json::from_str::<ContractType>("\"partnership\"").is_err());
        assert!("partnership".parse::<ContractType>().is_err());
    }

    #[test]
    fn contract_type_round_trips_through_str() {
        for ty in ContractType::ALL {
            assert_eq!(ty.as_str().parse::<ContractType>().unwrap(), ty);
        }
    }
}
