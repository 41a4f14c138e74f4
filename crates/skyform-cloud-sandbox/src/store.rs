//! Simulated account: the objects the sandbox has created

use crate::error::{Result, SandboxError};
use crate::keys::digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyform_cloud::Attributes;
use std::collections::BTreeMap;
use std::path::Path;

/// Account id reported in ARNs and `owner_id`
pub const ACCOUNT_ID: &str = "123456789012";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    KeyPair,
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    RouteTableAssociation,
    SecurityGroup,
    Instance,
}

impl ObjectKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ObjectKind::KeyPair => "key",
            ObjectKind::Vpc => "vpc",
            ObjectKind::Subnet => "subnet",
            ObjectKind::InternetGateway => "igw",
            ObjectKind::RouteTable => "rtb",
            ObjectKind::RouteTableAssociation => "rtbassoc",
            ObjectKind::SecurityGroup => "sg",
            ObjectKind::Instance => "i",
        }
    }

    /// Error code prefix used when an id does not exist
    pub fn not_found(&self) -> &'static str {
        match self {
            ObjectKind::KeyPair => "InvalidKeyPair",
            ObjectKind::Vpc => "InvalidVpcID",
            ObjectKind::Subnet => "InvalidSubnetID",
            ObjectKind::InternetGateway => "InvalidInternetGatewayID",
            ObjectKind::RouteTable => "InvalidRouteTableID",
            ObjectKind::RouteTableAssociation => "InvalidAssociationID",
            ObjectKind::SecurityGroup => "InvalidGroup",
            ObjectKind::Instance => "InvalidInstanceID",
        }
    }

    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Some(match resource_type {
            "aws_key_pair" => ObjectKind::KeyPair,
            "aws_vpc" => ObjectKind::Vpc,
            "aws_subnet" => ObjectKind::Subnet,
            "aws_internet_gateway" => ObjectKind::InternetGateway,
            "aws_route_table" => ObjectKind::RouteTable,
            "aws_route_table_association" => ObjectKind::RouteTableAssociation,
            "aws_security_group" => ObjectKind::SecurityGroup,
            "aws_instance" => ObjectKind::Instance,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxObject {
    pub id: String,
    pub kind: ObjectKind,

    /// Address of the declaring resource
    pub address: String,

    pub attributes: Attributes,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Ids of objects this one refers to
    #[serde(default)]
    pub uses: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl SandboxObject {
    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub objects: BTreeMap<String, SandboxObject>,

    /// Creations per address, so a re-created resource gets a fresh id
    #[serde(default)]
    generations: BTreeMap<String, u64>,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::new());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }

    /// Deterministic id: same address and generation, same id
    pub fn next_id(&mut self, kind: ObjectKind, address: &str) -> String {
        let generation = self.generations.entry(address.to_string()).or_insert(0);
        *generation += 1;
        let hash = digest(&[kind.prefix(), address, &generation.to_string()]);
        format!("{}-{}", kind.prefix(), &hex::encode(hash)[..17])
    }

    pub fn get(&self, kind: ObjectKind, id: &str) -> Result<&SandboxObject> {
        self.objects
            .get(id)
            .filter(|o| o.kind == kind)
            .ok_or_else(|| SandboxError::NotFound {
                kind: kind.not_found(),
                id: id.to_string(),
            })
    }

    pub fn of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &SandboxObject> {
        self.objects.values().filter(move |o| o.kind == kind)
    }

    pub fn insert(&mut self, object: SandboxObject) {
        self.objects.insert(object.id.clone(), object);
    }

    /// Ids of objects that still refer to `id`
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.objects
            .values()
            .filter(|o| o.uses.iter().any(|u| u == id))
            .map(|o| o.id.clone())
            .collect()
    }

    /// Remove an object; refused while anything still refers to it
    pub fn remove(&mut self, id: &str) -> Result<Option<SandboxObject>> {
        let dependents = self.dependents(id);
        if !dependents.is_empty() {
            return Err(SandboxError::DependencyViolation {
                id: id.to_string(),
                dependents,
            });
        }
        Ok(self.objects.remove(id))
    }
}

pub fn arn(region: &str, resource: &str) -> String {
    format!("arn:aws:ec2:{}:{}:{}", region, ACCOUNT_ID, resource)
}
