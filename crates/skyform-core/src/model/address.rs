//! リソースアドレス
//!
//! `aws_vpc.main` や `data.aws_ami.debian` のようにリソースを一意に識別します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// リソースのモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    /// プロバイダー上に作成・削除されるリソース
    Managed,
    /// 読み取り専用の問い合わせ（何も作成しない）
    Data,
}

impl fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceMode::Managed => write!(f, "resource"),
            ResourceMode::Data => write!(f, "data"),
        }
    }
}

/// リソースアドレス（モード・タイプ・ローカル名）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub mode: ResourceMode,
    pub resource_type: String,
    pub name: String,
}

impl Address {
    pub fn managed(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    pub fn data(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.mode == ResourceMode::Data
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.resource_type, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.resource_type, self.name),
        }
    }
}

/// アドレス文字列のパースエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError(pub String);

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "無効なリソースアドレス: {}", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            ["data", ty, name] if !ty.is_empty() && !name.is_empty() => {
                Ok(Address::data(*ty, *name))
            }
            [ty, name] if !ty.is_empty() && !name.is_empty() => Ok(Address::managed(*ty, *name)),
            _ => Err(AddressParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let vpc: Address = "aws_vpc.main".parse().unwrap();
        assert_eq!(vpc, Address::managed("aws_vpc", "main"));
        assert_eq!(vpc.to_string(), "aws_vpc.main");

        let ami: Address = "data.aws_ami.debian".parse().unwrap();
        assert!(ami.is_data());
        assert_eq!(ami.to_string(), "data.aws_ami.debian");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("aws_vpc".parse::<Address>().is_err());
        assert!("aws_vpc.".parse::<Address>().is_err());
        assert!("a.b.c.d".parse::<Address>().is_err());
    }
}
