//! Sandbox provider implementation
//!
//! Simulates the EC2 objects of the web-server stack in memory, optionally
//! persisted to a JSON file. Requests are checked the way the real service
//! checks them: referenced ids must exist, subnets must fit their VPC,
//! rule sources must be valid CIDRs, and nothing can be deleted while
//! something else still uses it.

use crate::catalog::{ImageQuery, find_image};
use crate::error::{Result, SandboxError};
use crate::keys::{KeySpec, digest, generate, openssh_fingerprint};
use crate::network::{Ipv4Cidr, parse_rule_cidr, parse_vpc_cidr};
use crate::store::{ACCOUNT_ID, Account, ObjectKind, SandboxObject, arn};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use skyform_cloud::{Attributes, AuthStatus, CloudProvider, ResourceConfig, ResourceState};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Region used when the document does not set one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Max user data size accepted by the instance API
const USER_DATA_LIMIT: usize = 16 * 1024;

/// Documentation range handed out as public addresses
const PUBLIC_POOL: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 0);

/// Injected failure for one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Fail,
    Throttle(u32),
}

pub struct SandboxProvider {
    account: Mutex<Account>,
    path: Option<PathBuf>,
    faults: Mutex<HashMap<String, Fault>>,
}

impl Default for SandboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxProvider {
    /// In-memory account, discarded on drop
    pub fn new() -> Self {
        Self {
            account: Mutex::new(Account::new()),
            path: None,
            faults: Mutex::new(HashMap::new()),
        }
    }

    /// Account persisted to `path`, loaded if it already exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let account = Account::load(&path).await?;
        debug!(path = %path.display(), objects = account.objects.len(), "Sandbox account loaded");
        Ok(Self {
            account: Mutex::new(account),
            path: Some(path),
            faults: Mutex::new(HashMap::new()),
        })
    }

    /// Every call for `address` fails permanently
    pub fn with_failure(mut self, address: impl Into<String>) -> Self {
        self.faults.get_mut().insert(address.into(), Fault::Fail);
        self
    }

    /// The next `times` calls for `address` are throttled
    pub fn with_throttling(mut self, address: impl Into<String>, times: u32) -> Self {
        self.faults
            .get_mut()
            .insert(address.into(), Fault::Throttle(times));
        self
    }

    /// Snapshot of the simulated account
    pub async fn account(&self) -> Account {
        self.account.lock().await.clone()
    }

    async fn check_fault(&self, address: &str) -> Result<()> {
        let mut faults = self.faults.lock().await;
        match faults.get_mut(address) {
            Some(Fault::Fail) => Err(SandboxError::Injected(address.to_string())),
            Some(Fault::Throttle(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(SandboxError::Throttled(address.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn persist(&self, account: &Account) -> Result<()> {
        if let Some(path) = &self.path {
            account.save(path).await?;
        }
        Ok(())
    }

    async fn create_resource(&self, resource: &ResourceConfig) -> Result<Attributes> {
        self.check_fault(&resource.address.to_string()).await?;

        // generated locally; nothing is stored in the account
        if resource.resource_type() == "tls_private_key" {
            return create_private_key(resource);
        }

        let kind = ObjectKind::from_resource_type(resource.resource_type())
            .ok_or_else(|| SandboxError::UnsupportedType(resource.resource_type().to_string()))?;
        let region = resource.region.as_deref().unwrap_or(DEFAULT_REGION);

        let mut account = self.account.lock().await;
        let request = Request {
            resource,
            region,
            address: resource.address.to_string(),
        };
        let object = match kind {
            ObjectKind::KeyPair => create_key_pair(&mut account, &request)?,
            ObjectKind::Vpc => create_vpc(&mut account, &request)?,
            ObjectKind::Subnet => create_subnet(&mut account, &request)?,
            ObjectKind::InternetGateway => create_internet_gateway(&mut account, &request)?,
            ObjectKind::RouteTable => create_route_table(&mut account, &request)?,
            ObjectKind::RouteTableAssociation => create_association(&mut account, &request)?,
            ObjectKind::SecurityGroup => create_security_group(&mut account, &request)?,
            ObjectKind::Instance => create_instance(&mut account, &request)?,
        };

        info!(address = %request.address, id = %object.id, "Sandbox object created");
        let attributes = object.attributes.clone();
        account.insert(object);
        self.persist(&account).await?;
        Ok(attributes)
    }

    async fn delete_resource(&self, resource: &ResourceState) -> Result<()> {
        self.check_fault(&resource.address.to_string()).await?;
        if resource.resource_type() == "tls_private_key" {
            return Ok(());
        }

        let mut account = self.account.lock().await;
        match account.remove(&resource.id)? {
            Some(object) => {
                info!(address = %object.address, id = %object.id, "Sandbox object deleted")
            }
            None => warn!(address = %resource.address, id = %resource.id, "Already gone"),
        }
        self.persist(&account).await
    }

    async fn read_resource(&self, resource: &ResourceConfig) -> Result<Attributes> {
        self.check_fault(&resource.address.to_string()).await?;
        if resource.resource_type() != "aws_ami" {
            return Err(SandboxError::UnsupportedType(format!(
                "data {}",
                resource.resource_type()
            )));
        }

        let query = ImageQuery {
            owners: resource.get_strings("owners"),
            filters: resource
                .get_blocks("filter")
                .into_iter()
                .map(|block| -> Result<(String, Vec<String>)> {
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| SandboxError::MissingParameter("filter.name".to_string()))?;
                    Ok((name.to_string(), strings(block.get("values"))))
                })
                .collect::<Result<_>>()?,
            name_regex: resource.get_config("name_regex"),
            most_recent: resource.get_config("most_recent").unwrap_or(false),
        };
        let image = find_image(&query)?;
        debug!(address = %resource.address, image = image.image_id, "Image resolved");

        let region = resource.region.as_deref().unwrap_or(DEFAULT_REGION);
        Ok(Attributes::from([
            ("id".to_string(), json!(image.image_id)),
            ("image_id".to_string(), json!(image.image_id)),
            (
                "arn".to_string(),
                json!(format!("arn:aws:ec2:{}::image/{}", region, image.image_id)),
            ),
            ("name".to_string(), json!(image.name)),
            ("owner_id".to_string(), json!(image.owner_id)),
            ("architecture".to_string(), json!(image.architecture)),
            ("creation_date".to_string(), json!(image.creation_date)),
            ("root_device_name".to_string(), json!(image.root_device_name)),
        ]))
    }
}

#[async_trait]
impl CloudProvider for SandboxProvider {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn display_name(&self) -> &str {
        "AWS (sandbox)"
    }

    async fn check_auth(&self) -> skyform_cloud::Result<AuthStatus> {
        Ok(AuthStatus::ok(format!("sandbox account {}", ACCOUNT_ID)))
    }

    async fn read(&self, resource: &ResourceConfig) -> skyform_cloud::Result<Attributes> {
        self.read_resource(resource)
            .await
            .map_err(|e| e.into_cloud(&resource.address))
    }

    async fn create(&self, resource: &ResourceConfig) -> skyform_cloud::Result<Attributes> {
        self.create_resource(resource)
            .await
            .map_err(|e| e.into_cloud(&resource.address))
    }

    async fn delete(&self, resource: &ResourceState) -> skyform_cloud::Result<()> {
        self.delete_resource(resource)
            .await
            .map_err(|e| e.into_cloud(&resource.address))
    }
}

struct Request<'a> {
    resource: &'a ResourceConfig,
    region: &'a str,
    address: String,
}

impl Request<'_> {
    fn required(&self, key: &str) -> Result<String> {
        self.resource
            .get_str(key)
            .map(str::to_string)
            .ok_or_else(|| SandboxError::MissingParameter(key.to_string()))
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.resource.get_config(key).unwrap_or(default)
    }

    fn object(&self, account: &mut Account, kind: ObjectKind) -> SandboxObject {
        let id = account.next_id(kind, &self.address);
        self.object_with_id(kind, id)
    }

    fn object_with_id(&self, kind: ObjectKind, id: String) -> SandboxObject {
        let mut attributes = Attributes::new();
        attributes.insert("id".to_string(), json!(id));
        attributes.insert("owner_id".to_string(), json!(ACCOUNT_ID));
        SandboxObject {
            id,
            kind,
            address: self.address.clone(),
            attributes,
            tags: self.resource.tags.clone(),
            uses: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A string or list of strings
fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn create_private_key(resource: &ResourceConfig) -> Result<Attributes> {
    let algorithm = resource
        .get_str("algorithm")
        .ok_or_else(|| SandboxError::MissingParameter("algorithm".to_string()))?;
    let spec = KeySpec::parse(
        algorithm,
        resource.get_config("rsa_bits"),
        resource.get_str("ecdsa_curve"),
    )?;
    let seed = format!("{}@{}", resource.address, Utc::now().timestamp_nanos_opt().unwrap_or(0));
    let key = generate(spec, &seed);
    let id = hex::encode(digest(&[&key.public_key_openssh]))[..40].to_string();

    Ok(Attributes::from([
        ("id".to_string(), json!(id)),
        ("algorithm".to_string(), json!(key.algorithm)),
        ("private_key_pem".to_string(), json!(key.private_key_pem)),
        ("public_key_pem".to_string(), json!(key.public_key_pem)),
        ("public_key_openssh".to_string(), json!(key.public_key_openssh)),
        (
            "public_key_fingerprint_md5".to_string(),
            json!(key.public_key_fingerprint_md5),
        ),
    ]))
}

fn create_key_pair(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let public_key = request.required("public_key")?;
    let fingerprint = openssh_fingerprint(&public_key)?;
    let key_pair_id = account.next_id(ObjectKind::KeyPair, &request.address);
    let key_name = match (
        request.resource.get_str("key_name"),
        request.resource.get_str("key_name_prefix"),
    ) {
        (Some(name), _) => name.to_string(),
        (None, Some(prefix)) => format!("{}{}", prefix, &key_pair_id[4..12]),
        (None, None) => format!("skyform-{}", &key_pair_id[4..12]),
    };
    if account
        .of_kind(ObjectKind::KeyPair)
        .any(|k| k.id == key_name)
    {
        return Err(SandboxError::DuplicateKeyPair(key_name));
    }

    // key pairs are addressed by name
    let mut object = request.object_with_id(ObjectKind::KeyPair, key_name.clone());
    object.attributes.extend([
        ("key_name".to_string(), json!(key_name)),
        ("key_pair_id".to_string(), json!(key_pair_id)),
        ("fingerprint".to_string(), json!(fingerprint)),
        (
            "arn".to_string(),
            json!(arn(request.region, &format!("key-pair/{}", key_name))),
        ),
    ]);
    Ok(object)
}

fn create_vpc(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let cidr = parse_vpc_cidr(&request.required("cidr_block")?)?;
    let mut object = request.object(account, ObjectKind::Vpc);
    let main_route_table = format!("rtb-{}", &hex::encode(digest(&[&object.id, "main"]))[..17]);
    object.attributes.extend([
        ("cidr_block".to_string(), json!(cidr.to_string())),
        (
            "enable_dns_support".to_string(),
            json!(request.flag("enable_dns_support", true)),
        ),
        (
            "enable_dns_hostnames".to_string(),
            json!(request.flag("enable_dns_hostnames", false)),
        ),
        (
            "instance_tenancy".to_string(),
            json!(request.resource.get_str("instance_tenancy").unwrap_or("default")),
        ),
        ("default_route_table_id".to_string(), json!(main_route_table)),
        ("main_route_table_id".to_string(), json!(main_route_table)),
        (
            "arn".to_string(),
            json!(arn(request.region, &format!("vpc/{}", object.id))),
        ),
    ]);
    Ok(object)
}

fn vpc_cidr(vpc: &SandboxObject) -> Result<Ipv4Cidr> {
    vpc.str_attr("cidr_block")
        .ok_or_else(|| SandboxError::InvalidCidr(format!("{} has no cidr_block", vpc.id)))?
        .parse()
}

fn create_subnet(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let vpc_id = request.required("vpc_id")?;
    let cidr: Ipv4Cidr = request.required("cidr_block")?.parse()?;
    let vpc_cidr = vpc_cidr(account.get(ObjectKind::Vpc, &vpc_id)?)?;

    if !vpc_cidr.contains(&cidr) {
        return Err(SandboxError::CidrOutsideVpc {
            cidr: cidr.to_string(),
            vpc_cidr: vpc_cidr.to_string(),
        });
    }
    for sibling in account
        .of_kind(ObjectKind::Subnet)
        .filter(|s| s.str_attr("vpc_id") == Some(vpc_id.as_str()))
    {
        let existing: Ipv4Cidr = sibling.str_attr("cidr_block").unwrap_or_default().parse()?;
        if existing.overlaps(&cidr) {
            return Err(SandboxError::CidrConflict {
                cidr: cidr.to_string(),
                existing: format!("{} ({})", existing, sibling.id),
            });
        }
    }

    let mut object = request.object(account, ObjectKind::Subnet);
    let availability_zone = request
        .resource
        .get_str("availability_zone")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}a", request.region));
    object.attributes.extend([
        ("vpc_id".to_string(), json!(vpc_id)),
        ("cidr_block".to_string(), json!(cidr.to_string())),
        ("availability_zone".to_string(), json!(availability_zone)),
        (
            "map_public_ip_on_launch".to_string(),
            json!(request.flag("map_public_ip_on_launch", false)),
        ),
        (
            "arn".to_string(),
            json!(arn(request.region, &format!("subnet/{}", object.id))),
        ),
    ]);
    object.uses.push(vpc_id);
    Ok(object)
}

fn create_internet_gateway(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let vpc_id = request.resource.get_str("vpc_id").map(str::to_string);
    if let Some(vpc_id) = &vpc_id {
        account.get(ObjectKind::Vpc, vpc_id)?;
        if let Some(attached) = account
            .of_kind(ObjectKind::InternetGateway)
            .find(|g| g.str_attr("vpc_id") == Some(vpc_id.as_str()))
        {
            return Err(SandboxError::InvalidParameter(format!(
                "Resource.AlreadyAssociated: {} already has {} attached",
                vpc_id, attached.id
            )));
        }
    }

    let mut object = request.object(account, ObjectKind::InternetGateway);
    object.attributes.insert(
        "arn".to_string(),
        json!(arn(request.region, &format!("internet-gateway/{}", object.id))),
    );
    if let Some(vpc_id) = vpc_id {
        object.attributes.insert("vpc_id".to_string(), json!(vpc_id));
        object.uses.push(vpc_id);
    }
    Ok(object)
}

fn create_route_table(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let vpc_id = request.required("vpc_id")?;
    account.get(ObjectKind::Vpc, &vpc_id)?;

    let mut uses = vec![vpc_id.clone()];
    let mut routes = Vec::new();
    for route in request.resource.get_blocks("route") {
        let destination: Ipv4Cidr = route
            .get("cidr_block")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SandboxError::MissingParameter("route.cidr_block".to_string()))?
            .parse()?;
        let mut entry = Map::new();
        entry.insert("cidr_block".to_string(), json!(destination.to_string()));

        if let Some(gateway_id) = route.get("gateway_id").and_then(|v| v.as_str()) {
            let gateway = account.get(ObjectKind::InternetGateway, gateway_id)?;
            if gateway.str_attr("vpc_id") != Some(vpc_id.as_str()) {
                return Err(SandboxError::InvalidParameter(format!(
                    "Gateway.NotAttached: {} is not attached to {}",
                    gateway_id, vpc_id
                )));
            }
            entry.insert("gateway_id".to_string(), json!(gateway_id));
            uses.push(gateway_id.to_string());
        } else {
            return Err(SandboxError::MissingParameter(
                "route target (gateway_id)".to_string(),
            ));
        }
        routes.push(Value::Object(entry));
    }

    let mut object = request.object(account, ObjectKind::RouteTable);
    object.attributes.extend([
        ("vpc_id".to_string(), json!(vpc_id)),
        ("route".to_string(), Value::Array(routes)),
        (
            "arn".to_string(),
            json!(arn(request.region, &format!("route-table/{}", object.id))),
        ),
    ]);
    object.uses = uses;
    Ok(object)
}

fn create_association(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let route_table_id = request.required("route_table_id")?;
    let route_table_vpc = account
        .get(ObjectKind::RouteTable, &route_table_id)?
        .str_attr("vpc_id")
        .map(str::to_string);

    let subnet_id = request.resource.get_str("subnet_id").map(str::to_string);
    let gateway_id = request.resource.get_str("gateway_id").map(str::to_string);
    let target = match (subnet_id, gateway_id) {
        (Some(subnet_id), None) => {
            let subnet = account.get(ObjectKind::Subnet, &subnet_id)?;
            if subnet.str_attr("vpc_id").map(str::to_string) != route_table_vpc {
                return Err(SandboxError::InvalidParameter(format!(
                    "{} and {} belong to different VPCs",
                    subnet_id, route_table_id
                )));
            }
            if let Some(existing) = account
                .of_kind(ObjectKind::RouteTableAssociation)
                .find(|a| a.str_attr("subnet_id") == Some(subnet_id.as_str()))
            {
                return Err(SandboxError::InvalidParameter(format!(
                    "Resource.AlreadyAssociated: {} via {}",
                    subnet_id, existing.id
                )));
            }
            ("subnet_id", subnet_id)
        }
        (None, Some(gateway_id)) => {
            account.get(ObjectKind::InternetGateway, &gateway_id)?;
            ("gateway_id", gateway_id)
        }
        _ => {
            return Err(SandboxError::InvalidParameter(
                "exactly one of subnet_id or gateway_id is required".to_string(),
            ));
        }
    };

    let mut object = request.object(account, ObjectKind::RouteTableAssociation);
    object
        .attributes
        .insert("route_table_id".to_string(), json!(route_table_id));
    object
        .attributes
        .insert(target.0.to_string(), json!(target.1));
    object.uses = vec![route_table_id, target.1];
    Ok(object)
}

fn create_security_group(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let vpc_id = request.resource.get_str("vpc_id").ok_or_else(|| {
        SandboxError::MissingParameter("vpc_id (the sandbox has no default VPC)".to_string())
    })?;
    account.get(ObjectKind::Vpc, vpc_id)?;

    let mut object = request.object(account, ObjectKind::SecurityGroup);
    let name = match (
        request.resource.get_str("name"),
        request.resource.get_str("name_prefix"),
    ) {
        (Some(name), _) => name.to_string(),
        (None, Some(prefix)) => format!("{}{}", prefix, &object.id[3..11]),
        (None, None) => format!("skyform-{}", &object.id[3..11]),
    };
    if account
        .of_kind(ObjectKind::SecurityGroup)
        .any(|g| g.str_attr("vpc_id") == Some(vpc_id) && g.str_attr("name") == Some(name.as_str()))
    {
        return Err(SandboxError::InvalidParameter(format!(
            "InvalidGroup.Duplicate: {} already exists in {}",
            name, vpc_id
        )));
    }

    let mut uses = vec![vpc_id.to_string()];
    let mut rules = |direction: &str| -> Result<Value> {
        let mut normalized = Vec::new();
        for rule in request.resource.get_blocks(direction) {
            normalized.push(Value::Object(normalize_rule(
                account, direction, rule, &mut uses,
            )?));
        }
        Ok(Value::Array(normalized))
    };
    let ingress = rules("ingress")?;
    let egress = rules("egress")?;

    object.attributes.extend([
        ("name".to_string(), json!(name)),
        (
            "description".to_string(),
            json!(
                request
                    .resource
                    .get_str("description")
                    .unwrap_or("Managed by skyform")
            ),
        ),
        ("vpc_id".to_string(), json!(vpc_id)),
        ("ingress".to_string(), ingress),
        ("egress".to_string(), egress),
        (
            "arn".to_string(),
            json!(arn(request.region, &format!("security-group/{}", object.id))),
        ),
    ]);
    object.uses = uses;
    Ok(object)
}

fn normalize_rule(
    account: &Account,
    direction: &str,
    rule: &Map<String, Value>,
    uses: &mut Vec<String>,
) -> Result<Map<String, Value>> {
    let port = |key: &str| -> Result<i64> {
        rule.get(key)
            .and_then(|v| v.as_i64())
            .filter(|p| (-1..=65535).contains(p))
            .ok_or_else(|| SandboxError::InvalidParameter(format!("{}.{}", direction, key)))
    };
    let from_port = port("from_port")?;
    let to_port = port("to_port")?;
    if from_port > to_port {
        return Err(SandboxError::InvalidParameter(format!(
            "{}: from_port {} is greater than to_port {}",
            direction, from_port, to_port
        )));
    }

    let protocol = match rule.get("protocol") {
        Some(Value::String(p)) => p.to_lowercase(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(SandboxError::MissingParameter(format!("{}.protocol", direction))),
    };
    if !matches!(
        protocol.as_str(),
        "tcp" | "udp" | "icmp" | "-1" | "all" | "6" | "17" | "1"
    ) {
        return Err(SandboxError::InvalidParameter(format!(
            "{}: unsupported protocol {}",
            direction, protocol
        )));
    }

    let cidr_blocks = strings(rule.get("cidr_blocks"))
        .iter()
        .map(|c| parse_rule_cidr(c).map(|c| c.to_string()))
        .collect::<Result<Vec<_>>>()?;
    let security_groups = strings(rule.get("security_groups"));
    for group in &security_groups {
        account.get(ObjectKind::SecurityGroup, group)?;
        uses.push(group.clone());
    }
    if cidr_blocks.is_empty()
        && security_groups.is_empty()
        && !rule.get("self").and_then(|v| v.as_bool()).unwrap_or(false)
    {
        return Err(SandboxError::MissingParameter(format!(
            "{}: a source (cidr_blocks, security_groups or self)",
            direction
        )));
    }

    let mut normalized = rule.clone();
    normalized.insert("protocol".to_string(), json!(protocol));
    normalized.insert("cidr_blocks".to_string(), json!(cidr_blocks));
    normalized.insert("security_groups".to_string(), json!(security_groups));
    Ok(normalized)
}

fn create_instance(account: &mut Account, request: &Request) -> Result<SandboxObject> {
    let ami = request.required("ami")?;
    let image_known = find_image(&ImageQuery {
        owners: vec!["self".to_string()],
        filters: vec![("image-id".to_string(), vec![ami.clone()])],
        name_regex: None,
        most_recent: false,
    })
    .is_ok();
    if !image_known {
        return Err(SandboxError::NotFound {
            kind: "InvalidAMIID",
            id: ami,
        });
    }

    let instance_type = request.required("instance_type")?;
    if !instance_type
        .split_once('.')
        .is_some_and(|(family, size)| !family.is_empty() && !size.is_empty())
    {
        return Err(SandboxError::InvalidParameter(format!(
            "invalid instance_type: {}",
            instance_type
        )));
    }

    let subnet_id = request.required("subnet_id")?;
    let subnet = account.get(ObjectKind::Subnet, &subnet_id)?;
    let vpc_id = subnet.str_attr("vpc_id").unwrap_or_default().to_string();
    let subnet_cidr: Ipv4Cidr = subnet.str_attr("cidr_block").unwrap_or_default().parse()?;
    let subnet_public = subnet
        .attributes
        .get("map_public_ip_on_launch")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let availability_zone = subnet.str_attr("availability_zone").map(str::to_string);
    let dns_hostnames = account
        .get(ObjectKind::Vpc, &vpc_id)?
        .attributes
        .get("enable_dns_hostnames")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut uses = vec![subnet_id.clone()];
    if let Some(key_name) = request.resource.get_str("key_name") {
        account.get(ObjectKind::KeyPair, key_name)?;
        uses.push(key_name.to_string());
    }
    for group in request.resource.get_strings("vpc_security_group_ids") {
        let group_vpc = account.get(ObjectKind::SecurityGroup, &group)?.str_attr("vpc_id");
        if group_vpc != Some(vpc_id.as_str()) {
            return Err(SandboxError::InvalidParameter(format!(
                "{} belongs to a different VPC than {}",
                group, subnet_id
            )));
        }
        uses.push(group);
    }

    if let Some(user_data) = request.resource.get_str("user_data")
        && user_data.len() > USER_DATA_LIMIT
    {
        return Err(SandboxError::InvalidParameter(format!(
            "user_data is {} bytes; the limit is {}",
            user_data.len(),
            USER_DATA_LIMIT
        )));
    }

    let instances: Vec<&SandboxObject> = account.of_kind(ObjectKind::Instance).collect();
    let used = |key: &str| -> Vec<String> {
        instances
            .iter()
            .filter_map(|i| i.str_attr(key).map(str::to_string))
            .collect()
    };

    // the first four addresses of a subnet are reserved
    let taken_private = used("private_ip");
    let private_ip = (4..)
        .map_while(|n| subnet_cidr.host(n))
        .find(|ip| !taken_private.contains(&ip.to_string()))
        .ok_or_else(|| {
            SandboxError::InvalidParameter(format!(
                "InsufficientFreeAddressesInSubnet: {}",
                subnet_id
            ))
        })?;

    let public_ip = if request.flag("associate_public_ip_address", subnet_public) {
        let taken_public = used("public_ip");
        let pool: Ipv4Cidr = format!("{}/24", PUBLIC_POOL).parse()?;
        Some(
            (10..255)
                .filter_map(|n| pool.host(n))
                .find(|ip| !taken_public.contains(&ip.to_string()))
                .ok_or_else(|| {
                    SandboxError::InvalidParameter("AddressLimitExceeded".to_string())
                })?,
        )
    } else {
        None
    };

    let region = request.region;
    let dashed = |ip: &Ipv4Addr| ip.to_string().replace('.', "-");
    let private_dns = format!("ip-{}.{}.compute.internal", dashed(&private_ip), region);
    let public_dns = match public_ip {
        Some(ip) if dns_hostnames => {
            format!("ec2-{}.{}.compute.amazonaws.com", dashed(&ip), region)
        }
        _ => String::new(),
    };

    let mut object = request.object(account, ObjectKind::Instance);
    object.attributes.extend([
        ("ami".to_string(), json!(ami)),
        ("instance_type".to_string(), json!(instance_type)),
        ("subnet_id".to_string(), json!(subnet_id)),
        ("availability_zone".to_string(), json!(availability_zone)),
        ("private_ip".to_string(), json!(private_ip.to_string())),
        ("private_dns".to_string(), json!(private_dns)),
        (
            "public_ip".to_string(),
            json!(public_ip.map(|ip| ip.to_string()).unwrap_or_default()),
        ),
        ("public_dns".to_string(), json!(public_dns)),
        ("instance_state".to_string(), json!("running")),
        (
            "arn".to_string(),
            json!(arn(region, &format!("instance/{}", object.id))),
        ),
    ]);
    object.uses = uses;
    Ok(object)
}
