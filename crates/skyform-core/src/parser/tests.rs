use super::*;
use crate::graph::DependencyGraph;
use crate::model::{Address, Reference, TemplatePart, Value};
use crate::scripts::DEBIAN_WEB_STACK;
use crate::template::{TemplateProcessor, extract_variables};
use crate::validate::{DeviationKind, check_ssh_only_ingress, validate_structure};

/// 同梱スタックを default 値で展開してパース
fn golden(overrides: &[(&str, &str)]) -> Document {
    let mut processor = TemplateProcessor::new();
    for (name, variable) in extract_variables(DEBIAN_WEB_STACK).unwrap() {
        if let Some(default) = variable.default {
            processor.add_variable(name, default);
        }
    }
    for (name, value) in overrides {
        processor.add_variable(*name, serde_json::json!(value));
    }
    let rendered = processor.render_str(DEBIAN_WEB_STACK).unwrap();
    parse_kdl_string(&rendered, "stack".to_string()).unwrap()
}

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

#[test]
fn test_parse_golden_document() {
    let doc = golden(&[]);
    assert_eq!(doc.name, "debian-web");
    assert_eq!(doc.resources.len(), 10);
    assert_eq!(doc.managed_resources().count(), 9);
    assert_eq!(doc.data_sources().count(), 1);
    assert_eq!(doc.outputs.len(), 2);
    assert_eq!(doc.variables.len(), 5);
    assert_eq!(doc.region(), Some("eu-west-1"));
}

#[test]
fn test_parse_provider_default_tags() {
    let doc = golden(&[("candidate_name", "alice")]);
    let provider = doc.provider.as_ref().unwrap();
    assert_eq!(provider.name, "aws");
    assert_eq!(provider.default_tags["Owner"], "alice");
    assert_eq!(provider.default_tags["Project"], "debian-web");
    assert_eq!(provider.default_tags["Environment"], "test");
}

#[test]
fn test_parse_reference_attribute() {
    let doc = golden(&[]);
    let subnet = doc.resource(&addr("aws_subnet.public")).unwrap();
    assert_eq!(
        subnet.get("vpc_id"),
        Some(&Value::Reference(Reference::parse("aws_vpc.main.id").unwrap()))
    );
    assert_eq!(subnet.get("map_public_ip_on_launch"), Some(&Value::Bool(true)));
    assert_eq!(subnet.tags["Name"], "debian-web-public-subnet");
}

#[test]
fn test_parse_repeated_blocks() {
    let doc = golden(&[]);
    let ami = doc.resource(&addr("data.aws_ami.debian")).unwrap();
    let filters = ami.get("filter").unwrap().items();
    assert_eq!(filters.len(), 2);
    let first = filters[0].as_block().unwrap();
    assert_eq!(first["name"], Value::from("name"));
    assert_eq!(first["values"], Value::from("debian-12-amd64-*"));
    assert_eq!(ami.get("owners"), Some(&Value::from("136693071363")));
    assert_eq!(ami.get("most_recent"), Some(&Value::Bool(true)));
}

#[test]
fn test_parse_nested_reference_in_block() {
    let doc = golden(&[]);
    let rt = doc.resource(&addr("aws_route_table.public")).unwrap();
    let deps = rt.dependencies();
    assert!(deps.contains(&addr("aws_vpc.main")));
    assert!(deps.contains(&addr("aws_internet_gateway.main")));
}

#[test]
fn test_parse_user_data_block() {
    let doc = golden(&[]);
    let web = doc.resource(&addr("aws_instance.web")).unwrap();
    let user_data = web.get("user_data").and_then(Value::as_block).unwrap();
    assert_eq!(user_data["builtin"], Value::from("debian-apache"));
}

#[test]
fn test_parse_sensitive_output() {
    let doc = golden(&[]);
    let key = &doc.outputs["private_key_pem"];
    assert!(key.sensitive);
    assert!(!doc.outputs["public_ip"].sensitive);
}

#[test]
fn test_parse_template_string() {
    let kdl = r#"
        resource "aws_key_pair" "deployer" {
            key_name "key-${tls_private_key.ssh.id}"
            public_key "x"
        }
    "#;
    let doc = parse_kdl_string(kdl, "test".to_string()).unwrap();
    let key = doc.resource(&addr("aws_key_pair.deployer")).unwrap();
    assert_eq!(
        key.get("key_name"),
        Some(&Value::Template(vec![
            TemplatePart::Literal("key-".to_string()),
            TemplatePart::Reference(Reference::parse("tls_private_key.ssh.id").unwrap()),
        ]))
    );
}

#[test]
fn test_duplicate_resource_error() {
    let kdl = r#"
        resource "aws_vpc" "main" { cidr_block "10.0.0.0/16"; }
        resource "aws_vpc" "main" { cidr_block "10.1.0.0/16"; }
    "#;
    let result = parse_kdl_string(kdl, "test".to_string());
    assert!(matches!(result, Err(FlowError::DuplicateResource(a)) if a == "aws_vpc.main"));
}

#[test]
fn test_resource_and_data_with_same_name_are_distinct() {
    let kdl = r#"
        resource "aws_ami" "debian" { owners "self"; }
        data "aws_ami" "debian" { owners "self"; }
    "#;
    let doc = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(doc.resources.len(), 2);
}

#[test]
fn test_duplicate_provider_error() {
    let kdl = r#"
        provider "aws"
        provider "aws"
    "#;
    assert!(parse_kdl_string(kdl, "test".to_string()).is_err());
}

#[test]
fn test_unknown_top_level_node_is_error() {
    let kdl = r#"
        terraform { required_version ">= 1.5"; }
        resource "aws_vpc" "main" { cidr_block "10.0.0.0/16"; }
    "#;
    assert!(matches!(
        parse_kdl_string(kdl, "test".to_string()),
        Err(FlowError::UnknownNode(node)) if node == "terraform"
    ));
}

#[test]
fn test_misspelled_resource_keyword_is_error() {
    let kdl = r#"
        resource "aws_vpc" "main" { cidr_block "10.0.0.0/16"; }
        resorce "aws_instance" "web" { instance_type "t3.micro"; }
    "#;
    let err = parse_kdl_string(kdl, "test".to_string()).unwrap_err();
    assert!(err.to_string().contains("resorce"));
}

#[test]
fn test_inline_user_data_is_kept_verbatim() {
    let kdl = r##"
        resource "aws_instance" "web" {
            instance_type "t3.micro"
            user_data "#!/bin/bash\necho ${HOME} > /tmp/home\n"
        }
    "##;
    let doc = parse_kdl_string(kdl, "test".to_string()).unwrap();
    let web = doc.resource(&addr("aws_instance.web")).unwrap();
    assert_eq!(
        web.get("user_data"),
        Some(&Value::String(
            "#!/bin/bash\necho ${HOME} > /tmp/home\n".to_string()
        ))
    );
    // user_data 以外の引数は引き続き参照として解釈される
    let kdl = r#"
        resource "aws_instance" "web" {
            subnet_id "${HOME}"
        }
    "#;
    assert!(matches!(
        parse_kdl_string(kdl, "test".to_string()),
        Err(FlowError::InvalidReference(_))
    ));
}

#[test]
fn test_user_data_block_form_is_not_inline() {
    let kdl = r#"
        resource "aws_instance" "web" {
            user_data builtin="debian-apache"
        }
    "#;
    let doc = parse_kdl_string(kdl, "test".to_string()).unwrap();
    let web = doc.resource(&addr("aws_instance.web")).unwrap();
    assert!(matches!(web.get("user_data"), Some(Value::Block(_))));
}

#[test]
fn test_golden_graph_edges() {
    let doc = golden(&[]);
    let graph = DependencyGraph::from_document(&doc).unwrap();

    let expected: &[(&str, &[&str])] = &[
        ("tls_private_key.ssh", &[]),
        ("aws_key_pair.deployer", &["tls_private_key.ssh"]),
        ("aws_vpc.main", &[]),
        ("aws_subnet.public", &["aws_vpc.main"]),
        ("aws_internet_gateway.main", &["aws_vpc.main"]),
        (
            "aws_route_table.public",
            &["aws_internet_gateway.main", "aws_vpc.main"],
        ),
        (
            "aws_route_table_association.public",
            &["aws_route_table.public", "aws_subnet.public"],
        ),
        ("aws_security_group.ssh", &["aws_vpc.main"]),
        ("data.aws_ami.debian", &[]),
        (
            "aws_instance.web",
            &[
                "aws_key_pair.deployer",
                "aws_security_group.ssh",
                "aws_subnet.public",
                "data.aws_ami.debian",
            ],
        ),
    ];
    for (node, deps) in expected {
        let actual: Vec<String> = graph
            .dependencies(&addr(node))
            .map(ToString::to_string)
            .collect();
        assert_eq!(actual, *deps, "dependencies of {}", node);
    }

    let order = graph.topological_sort().unwrap();
    let position = |s: &str| order.iter().position(|a| *a == addr(s)).unwrap();
    assert!(position("data.aws_ami.debian") < position("aws_instance.web"));
    assert!(position("aws_key_pair.deployer") < position("aws_instance.web"));
    assert!(position("tls_private_key.ssh") < position("aws_key_pair.deployer"));
    assert!(position("aws_route_table.public") < position("aws_route_table_association.public"));
}

#[test]
fn test_golden_document_is_structurally_valid() {
    let doc = golden(&[]);
    let issues = validate_structure(&doc);
    assert!(issues.is_empty(), "{:?}", issues);
}

#[test]
fn test_golden_ssh_ingress() {
    // 運用者が単一ホストを指定した場合は逸脱なし
    let doc = golden(&[("ssh_ingress_cidr", "198.51.100.7/32")]);
    assert!(check_ssh_only_ingress(&doc).is_empty());

    // 0.0.0.0/0 は必ず検出される
    let doc = golden(&[("ssh_ingress_cidr", "0.0.0.0/0")]);
    let deviations = check_ssh_only_ingress(&doc);
    assert_eq!(deviations.len(), 1);
    assert_eq!(deviations[0].address, addr("aws_security_group.ssh"));
    assert_eq!(deviations[0].kind, DeviationKind::OpenToWorld);

    let doc = golden(&[("ssh_ingress_cidr", "10.0.0.0/8")]);
    assert_eq!(
        check_ssh_only_ingress(&doc)[0].kind,
        DeviationKind::NotSingleHost("10.0.0.0/8".to_string())
    );
}
