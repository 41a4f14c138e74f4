//! リソースタイプのスキーマ
//!
//! 各リソースタイプが受け付ける引数・ネストブロックと、
//! 作成後にプロバイダーが返す属性 (exported) を定義します。
//! 参照 `${type.name.attr}` の attr はここに載っている名前でなければなりません。

use crate::model::ResourceMode;

/// ネストブロックのスキーマ（ingress, route, filter など）
#[derive(Debug, Clone, Copy)]
pub struct BlockSchema {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl BlockSchema {
    pub fn accepts(&self, key: &str) -> bool {
        self.required.contains(&key) || self.optional.contains(&key)
    }
}

/// リソースタイプのスキーマ
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    pub resource_type: &'static str,
    pub mode: ResourceMode,
    /// 必須引数
    pub required: &'static [&'static str],
    /// 任意引数
    pub optional: &'static [&'static str],
    /// ネストブロック引数
    pub blocks: &'static [BlockSchema],
    /// プロバイダーが割り当てる属性
    pub exported: &'static [&'static str],
    /// 平文で表示してはならない属性
    pub sensitive: &'static [&'static str],
    /// tags を持てるか（必須タグの対象）
    pub taggable: bool,
}

impl ResourceSchema {
    /// 引数として受け付けるか
    pub fn accepts_argument(&self, name: &str) -> bool {
        self.required.contains(&name)
            || self.optional.contains(&name)
            || self.blocks.iter().any(|b| b.name == name)
    }

    /// 参照可能な属性か（引数 + exported）
    pub fn has_attribute(&self, name: &str) -> bool {
        self.accepts_argument(name) || self.exported.contains(&name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(&name)
    }

    pub fn block(&self, name: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

const SG_RULE: &[&str] = &["from_port", "to_port", "protocol"];
const SG_RULE_OPTIONAL: &[&str] = &[
    "cidr_blocks",
    "ipv6_cidr_blocks",
    "security_groups",
    "self",
    "description",
];

static SCHEMAS: &[ResourceSchema] = &[
    ResourceSchema {
        resource_type: "tls_private_key",
        mode: ResourceMode::Managed,
        required: &["algorithm"],
        optional: &["rsa_bits", "ecdsa_curve"],
        blocks: &[],
        exported: &[
            "id",
            "private_key_pem",
            "public_key_pem",
            "public_key_openssh",
            "public_key_fingerprint_md5",
        ],
        sensitive: &["private_key_pem"],
        taggable: false,
    },
    ResourceSchema {
        resource_type: "aws_key_pair",
        mode: ResourceMode::Managed,
        required: &["public_key"],
        optional: &["key_name", "key_name_prefix"],
        blocks: &[],
        exported: &["id", "arn", "key_pair_id", "fingerprint"],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_vpc",
        mode: ResourceMode::Managed,
        required: &["cidr_block"],
        optional: &[
            "enable_dns_support",
            "enable_dns_hostnames",
            "instance_tenancy",
        ],
        blocks: &[],
        exported: &[
            "id",
            "arn",
            "owner_id",
            "default_route_table_id",
            "main_route_table_id",
        ],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_subnet",
        mode: ResourceMode::Managed,
        required: &["vpc_id", "cidr_block"],
        optional: &["availability_zone", "map_public_ip_on_launch"],
        blocks: &[],
        exported: &["id", "arn", "owner_id"],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_internet_gateway",
        mode: ResourceMode::Managed,
        required: &[],
        optional: &["vpc_id"],
        blocks: &[],
        exported: &["id", "arn", "owner_id"],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_route_table",
        mode: ResourceMode::Managed,
        required: &["vpc_id"],
        optional: &[],
        blocks: &[BlockSchema {
            name: "route",
            required: &["cidr_block"],
            optional: &["gateway_id", "nat_gateway_id", "network_interface_id"],
        }],
        exported: &["id", "arn", "owner_id"],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_route_table_association",
        mode: ResourceMode::Managed,
        required: &["route_table_id"],
        optional: &["subnet_id", "gateway_id"],
        blocks: &[],
        exported: &["id"],
        sensitive: &[],
        taggable: false,
    },
    ResourceSchema {
        resource_type: "aws_security_group",
        mode: ResourceMode::Managed,
        required: &[],
        optional: &[
            "name",
            "name_prefix",
            "description",
            "vpc_id",
            "revoke_rules_on_delete",
        ],
        blocks: &[
            BlockSchema {
                name: "ingress",
                required: SG_RULE,
                optional: SG_RULE_OPTIONAL,
            },
            BlockSchema {
                name: "egress",
                required: SG_RULE,
                optional: SG_RULE_OPTIONAL,
            },
        ],
        exported: &["id", "arn", "owner_id"],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_instance",
        mode: ResourceMode::Managed,
        required: &["ami", "instance_type"],
        optional: &[
            "subnet_id",
            "key_name",
            "vpc_security_group_ids",
            "associate_public_ip_address",
            "availability_zone",
            "private_ip",
            "user_data",
        ],
        blocks: &[],
        exported: &[
            "id",
            "arn",
            "public_ip",
            "public_dns",
            "private_dns",
            "instance_state",
        ],
        sensitive: &[],
        taggable: true,
    },
    ResourceSchema {
        resource_type: "aws_ami",
        mode: ResourceMode::Data,
        required: &["owners"],
        optional: &["most_recent", "name_regex"],
        blocks: &[BlockSchema {
            name: "filter",
            required: &["name", "values"],
            optional: &[],
        }],
        exported: &[
            "id",
            "arn",
            "image_id",
            "name",
            "architecture",
            "creation_date",
            "root_device_name",
        ],
        sensitive: &[],
        taggable: false,
    },
];

/// スキーマを検索
pub fn lookup(mode: ResourceMode, resource_type: &str) -> Option<&'static ResourceSchema> {
    SCHEMAS
        .iter()
        .find(|s| s.mode == mode && s.resource_type == resource_type)
}

/// 登録済みの全スキーマ
pub fn all() -> &'static [ResourceSchema] {
    SCHEMAS
}
