//! Provisioning engine
//!
//! Plans, applies and destroys a document against a [`CloudProvider`],
//! recording the outcome in the state store.
//!
//! - The document is validated and the dependency graph checked for cycles
//!   before any provider call.
//! - Creation runs wave by wave; nodes within a wave are independent and
//!   run concurrently. A failed wave stops the run; everything created so
//!   far stays recorded, so a repeated apply resumes.
//! - Teardown follows the reverse of the recorded dependency order. Data
//!   sources are dropped from state without a provider call.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::error::{CloudError, Result};
use crate::provider::{CloudProvider, ResourceConfig, RetryConfig};
use crate::resolve::Resolver;
use crate::state::{GlobalState, OutputState, ResourceState, StateManager};
use futures_util::future::join_all;
use skyform_core::{
    Address, DependencyGraph, Document, FlowError, ResourceNode, schema, validate_document,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub struct Engine {
    provider: Arc<dyn CloudProvider>,
    state: StateManager,
    retry: RetryConfig,
}

impl Engine {
    pub fn new(provider: Arc<dyn CloudProvider>, state: StateManager) -> Self {
        Self {
            provider,
            state,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &dyn CloudProvider {
        self.provider.as_ref()
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state
    }

    /// Validate the document and build its dependency graph
    ///
    /// Fails on schema, reference, tag or ingress policy problems and on
    /// cycles. Never calls the provider.
    pub fn prepare(document: &Document) -> Result<DependencyGraph> {
        validate_document(document)?;
        let graph = DependencyGraph::from_document(document).map_err(FlowError::from)?;
        graph.topological_sort().map_err(FlowError::from)?;
        Ok(graph)
    }

    /// Compute the actions an apply would take. No side effects.
    #[instrument(skip_all, fields(project = %document.name))]
    pub async fn plan(&self, document: &Document) -> Result<Plan> {
        let graph = Self::prepare(document)?;
        let state = self.state.load().await?;
        let plan = build_plan(document, &graph, &state)?;
        info!(summary = %plan.summary(), "Plan computed");
        Ok(plan)
    }

    /// Provision the document
    #[instrument(skip_all, fields(project = %document.name, provider = %self.provider.name()))]
    pub async fn apply(&self, document: &Document) -> Result<ApplyResult> {
        let start = Instant::now();
        let graph = Self::prepare(document)?;
        self.ensure_authenticated().await?;

        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        state.project = Some(document.name.clone());

        let plan = build_plan(document, &graph, &state)?;
        info!(summary = %plan.summary(), "Applying plan");
        let mut result = ApplyResult::new();

        // 1. Resources no longer declared
        for action in plan.actions_by_type(ActionType::Delete) {
            if !result.is_success() {
                result.skipped.push(action.address.to_string());
                continue;
            }
            self.delete_one(&mut state, &action.address, &mut result)
                .await?;
        }
        let stale_reads: Vec<Address> = state
            .resources
            .values()
            .filter(|r| r.address.is_data() && document.resource(&r.address).is_none())
            .map(|r| r.address.clone())
            .collect();
        for address in stale_reads {
            state.remove_resource(&address);
        }

        // 2. Reads and creations, wave by wave
        for (index, wave) in graph.levels().map_err(FlowError::from)?.into_iter().enumerate() {
            let pending: Vec<&ResourceNode> = wave
                .iter()
                .filter(|address| {
                    plan.action_for(address)
                        .is_some_and(|a| a.action_type != ActionType::NoOp)
                })
                .filter_map(|address| document.resource(address))
                .collect();
            if pending.is_empty() {
                continue;
            }
            if !result.is_success() {
                result
                    .skipped
                    .extend(pending.iter().map(|n| n.address.to_string()));
                continue;
            }

            debug!(wave = index, nodes = pending.len(), "Provisioning wave");
            let outcomes = join_all(
                pending
                    .iter()
                    .map(|node| self.provision(document, &state, node)),
            )
            .await;

            for (node, outcome) in pending.iter().zip(outcomes) {
                let address = node.address.to_string();
                match outcome {
                    Ok(resource) => {
                        info!(address = %address, id = %resource.id, "Resource ready");
                        let verb = if node.is_data() { "read" } else { "created" };
                        result.add_success(address, format!("{} ({})", verb, resource.id));
                        state.set_resource(resource);
                    }
                    Err(e) => {
                        warn!(address = %address, error = %e, "Provisioning failed");
                        result.add_failure(address, e.to_string());
                    }
                }
            }
            self.state.save(&state).await?;
        }

        // 3. Outputs
        if result.is_success() {
            state.outputs = compute_outputs(document, &state)?;
        }
        self.state.save(&state).await?;
        lock.release().await?;

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            duration_ms = result.duration_ms,
            "Apply finished"
        );
        Ok(result)
    }

    /// Remove everything recorded in state, in reverse dependency order
    #[instrument(skip_all, fields(provider = %self.provider.name()))]
    pub async fn destroy(&self) -> Result<ApplyResult> {
        let start = Instant::now();
        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        let order = state.destroy_order()?;

        if state.managed().next().is_some() {
            self.ensure_authenticated().await?;
        }

        let mut result = ApplyResult::new();
        for address in order {
            if address.is_data() {
                state.remove_resource(&address);
                continue;
            }
            if !result.is_success() {
                result.skipped.push(address.to_string());
                continue;
            }
            self.delete_one(&mut state, &address, &mut result).await?;
        }

        if result.is_success() {
            state.outputs.clear();
        }
        self.state.save(&state).await?;
        lock.release().await?;

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            destroyed = result.succeeded.len(),
            failed = result.failed.len(),
            "Destroy finished"
        );
        Ok(result)
    }

    /// Outputs recorded by the last successful apply
    pub async fn outputs(&self) -> Result<BTreeMap<String, OutputState>> {
        Ok(self.state.load().await?.outputs)
    }

    async fn ensure_authenticated(&self) -> Result<()> {
        let auth = self.provider.check_auth().await?;
        if !auth.authenticated {
            return Err(CloudError::AuthenticationFailed(
                auth.error.unwrap_or_else(|| self.provider.display_name().to_string()),
            ));
        }
        debug!(account = ?auth.account_info, "Provider authenticated");
        Ok(())
    }

    /// Read or create one node; dependencies are already in `state`
    async fn provision(
        &self,
        document: &Document,
        state: &GlobalState,
        node: &ResourceNode,
    ) -> Result<ResourceState> {
        let resolved = Resolver::apply(state).resolve_node(node)?;
        let taggable = schema::lookup(node.address.mode, &node.address.resource_type)
            .is_some_and(|s| s.taggable);
        let tags = if taggable {
            document.effective_tags(node)
        } else {
            BTreeMap::new()
        };
        let config = ResourceConfig::new(node.address.clone(), resolved.clone())
            .with_region(document.region().map(str::to_string))
            .with_tags(tags.clone());

        let exported = if node.is_data() {
            self.retrying(&node.address, || self.provider.read(&config)).await?
        } else {
            self.retrying(&node.address, || self.provider.create(&config)).await?
        };

        let id = exported
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CloudError::provider(&node.address, "provider returned no id"))?
            .to_string();

        let mut attributes = resolved;
        if taggable {
            attributes.insert("tags".to_string(), serde_json::json!(tags));
        }
        attributes.extend(exported);

        Ok(ResourceState::new(id, node.address.clone())
            .with_attributes(attributes)
            .with_depends_on(node.dependencies().into_iter().collect()))
    }

    async fn delete_one(
        &self,
        state: &mut GlobalState,
        address: &Address,
        result: &mut ApplyResult,
    ) -> Result<()> {
        let Some(resource) = state.get_resource(address).cloned() else {
            return Ok(());
        };
        match self
            .retrying(address, || self.provider.delete(&resource))
            .await
        {
            Ok(()) => {
                info!(address = %address, id = %resource.id, "Resource destroyed");
                state.remove_resource(address);
                result.add_success(address.to_string(), format!("destroyed ({})", resource.id));
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Destroy failed");
                result.add_failure(address.to_string(), e.to_string());
            }
        }
        self.state.save(state).await
    }

    async fn retrying<T, F, Fut>(&self, address: &Address, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        address = %address,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying provider call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

fn build_plan(document: &Document, graph: &DependencyGraph, state: &GlobalState) -> Result<Plan> {
    let mut actions = Vec::new();

    for address in state.destroy_order()? {
        if !address.is_data() && document.resource(&address).is_none() {
            actions.push(Action::new(address, ActionType::Delete));
        }
    }

    let preview = Resolver::preview(state);
    for address in graph.topological_sort().map_err(FlowError::from)? {
        let Some(node) = document.resource(&address) else {
            continue;
        };
        let action_type = if address.is_data() {
            ActionType::Read
        } else if state.contains(&address) {
            ActionType::NoOp
        } else {
            ActionType::Create
        };
        let mut action = Action::new(address, action_type);
        if action_type != ActionType::NoOp {
            action = action.with_details(preview.resolve_node(node)?);
        }
        actions.push(action);
    }

    Ok(Plan::new(actions))
}

fn compute_outputs(
    document: &Document,
    state: &GlobalState,
) -> Result<BTreeMap<String, OutputState>> {
    let resolver = Resolver::apply(state);
    let mut outputs = BTreeMap::new();
    for (name, output) in &document.outputs {
        let value = resolver.resolve(&format!("output.{}", name), &output.value)?;
        let output_state = OutputState::new(value, output.sensitive);
        debug!(output = %name, value = %output_state.display(), "Output computed");
        outputs.insert(name.clone(), output_state);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Attributes, AuthStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use skyform_core::parse_kdl_string;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const DOCUMENT: &str = r#"
project "web"
provider "aws" {
    region "eu-west-1"
    default_tags {
        Owner "alice"
        Project "web"
        Environment "test"
    }
}
resource "tls_private_key" "ssh" {
    algorithm "RSA"
}
resource "aws_key_pair" "deployer" {
    public_key "${tls_private_key.ssh.public_key_openssh}"
}
resource "aws_vpc" "main" {
    cidr_block "10.0.0.0/16"
}
resource "aws_subnet" "public" {
    vpc_id "${aws_vpc.main.id}"
    cidr_block "10.0.1.0/24"
}
resource "aws_security_group" "ssh" {
    vpc_id "${aws_vpc.main.id}"
    ingress {
        from_port 22
        to_port 22
        protocol "tcp"
        cidr_blocks "198.51.100.7/32"
    }
}
data "aws_ami" "debian" {
    owners "136693071363"
}
resource "aws_instance" "web" {
    ami "${data.aws_ami.debian.id}"
    instance_type "t3.micro"
    subnet_id "${aws_subnet.public.id}"
    key_name "${aws_key_pair.deployer.id}"
    vpc_security_group_ids "${aws_security_group.ssh.id}"
}
output "private_key_pem" sensitive=#true {
    value "${tls_private_key.ssh.private_key_pem}"
}
output "public_ip" {
    value "${aws_instance.web.public_ip}"
}
"#;

    /// Records calls; fails on demand
    #[derive(Default)]
    struct MockProvider {
        calls: Mutex<Vec<String>>,
        fail_on: Mutex<HashMap<String, u32>>,
        counter: Mutex<u32>,
    }

    impl MockProvider {
        /// Fail the next `times` calls for `address`
        fn fail(&self, address: &str, times: u32) {
            self.fail_on
                .lock()
                .unwrap()
                .insert(address.to_string(), times);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, verb: &str, address: &Address) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", verb, address));
            let mut fail_on = self.fail_on.lock().unwrap();
            if let Some(remaining) = fail_on.get_mut(&address.to_string())
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(CloudError::transient(address, "throttled"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CloudProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn display_name(&self) -> &str {
            "Mock"
        }

        async fn check_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus::ok("test"))
        }

        async fn read(&self, resource: &ResourceConfig) -> Result<Attributes> {
            self.record("read", &resource.address)?;
            Ok([("id".to_string(), json!("ami-123"))].into())
        }

        async fn create(&self, resource: &ResourceConfig) -> Result<Attributes> {
            self.record("create", &resource.address)?;
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            let mut attributes: Attributes =
                [("id".to_string(), json!(format!("id-{}", counter)))].into();
            match resource.resource_type() {
                "tls_private_key" => {
                    attributes.insert("private_key_pem".to_string(), json!("PRIVATE"));
                    attributes.insert("public_key_openssh".to_string(), json!("ssh-rsa AAA"));
                }
                "aws_instance" => {
                    assert_eq!(resource.get_str("ami"), Some("ami-123"));
                    attributes.insert("public_ip".to_string(), json!("203.0.113.10"));
                }
                _ => {}
            }
            Ok(attributes)
        }

        async fn delete(&self, resource: &ResourceState) -> Result<()> {
            self.record("delete", &resource.address)
        }
    }

    fn document(content: &str) -> Document {
        parse_kdl_string(content, "test".to_string()).unwrap()
    }

    fn engine(provider: Arc<MockProvider>, root: &std::path::Path) -> Engine {
        Engine::new(provider, StateManager::new(root)).with_retry(RetryConfig::none())
    }

    fn position(calls: &[String], call: &str) -> usize {
        calls
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{} not called: {:?}", call, calls))
    }

    #[tokio::test]
    async fn test_plan_on_empty_state() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let plan = engine(provider.clone(), temp_dir.path())
            .plan(&document(DOCUMENT))
            .await
            .unwrap();

        let summary = plan.summary();
        assert_eq!(summary.create, 6);
        assert_eq!(summary.read, 1);
        assert_eq!(summary.delete, 0);
        assert!(provider.calls().is_empty());

        let instance = plan.action_for(&"aws_instance.web".parse().unwrap()).unwrap();
        assert_eq!(instance.details["subnet_id"], json!("(known after apply)"));
        assert_eq!(instance.details["instance_type"], json!("t3.micro"));
    }

    #[tokio::test]
    async fn test_apply_creates_in_dependency_order_then_destroys_in_reverse() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let engine = engine(provider.clone(), temp_dir.path());
        let doc = document(DOCUMENT);

        let result = engine.apply(&doc).await.unwrap();
        assert!(result.is_success(), "{:?}", result.failed);
        assert_eq!(result.succeeded.len(), 7);

        let calls = provider.calls();
        let web = position(&calls, "create aws_instance.web");
        let subnet = position(&calls, "create aws_subnet.public");
        assert!(position(&calls, "create aws_vpc.main") < subnet);
        assert!(subnet < web);
        assert!(position(&calls, "read data.aws_ami.debian") < web);
        assert!(
            position(&calls, "create tls_private_key.ssh")
                < position(&calls, "create aws_key_pair.deployer")
        );

        let outputs = engine.outputs().await.unwrap();
        assert_eq!(outputs["public_ip"].display().to_string(), "203.0.113.10");
        assert_eq!(outputs["private_key_pem"].display().to_string(), "(sensitive)");
        assert_eq!(outputs["private_key_pem"].reveal(), &json!("PRIVATE"));

        let state = engine.state_manager().load().await.unwrap();
        let subnet = state.get_resource(&"aws_subnet.public".parse().unwrap()).unwrap();
        assert_eq!(subnet.depends_on, vec!["aws_vpc.main".parse().unwrap()]);
        assert_eq!(subnet.attributes["tags"]["Owner"], json!("alice"));

        // second apply is a no-op apart from the data source
        let plan = engine.plan(&doc).await.unwrap();
        assert!(!plan.has_changes);
        assert_eq!(plan.summary().no_change, 6);

        let creation: Vec<String> = provider
            .calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("create ").map(str::to_string))
            .collect();

        let destroyed = engine.destroy().await.unwrap();
        assert!(destroyed.is_success());
        let deletion: Vec<String> = provider
            .calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("delete ").map(str::to_string))
            .collect();
        assert_eq!(deletion.len(), 6);
        assert!(!deletion.iter().any(|a| a.starts_with("data.")));

        // every dependent is deleted before what it depends on
        let deleted_at = |s: &str| deletion.iter().position(|a| a == s).unwrap();
        assert!(deleted_at("aws_instance.web") < deleted_at("aws_subnet.public"));
        assert!(deleted_at("aws_subnet.public") < deleted_at("aws_vpc.main"));
        assert!(deleted_at("aws_security_group.ssh") < deleted_at("aws_vpc.main"));
        assert!(deleted_at("aws_key_pair.deployer") < deleted_at("tls_private_key.ssh"));
        assert_eq!(deletion.first(), creation.last());

        let state = engine.state_manager().load().await.unwrap();
        assert!(state.is_empty());
        assert!(state.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_before_any_provider_call() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let doc = document(
            r#"
provider "aws" {
    default_tags {
        Owner "alice"
        Project "web"
        Environment "test"
    }
}
resource "aws_vpc" "main" {
    cidr_block "${aws_subnet.public.cidr_block}"
}
resource "aws_subnet" "public" {
    vpc_id "${aws_vpc.main.id}"
    cidr_block "10.0.1.0/24"
}
"#,
        );

        let err = engine(provider.clone(), temp_dir.path())
            .apply(&doc)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CloudError::InvalidDocument(FlowError::Graph(skyform_core::GraphError::Cycle(_)))
        ));
        assert!(provider.calls().is_empty());
        assert!(!temp_dir.path().join(".skyform/state.json").exists());
    }

    #[tokio::test]
    async fn test_invalid_document_is_rejected_before_any_provider_call() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        // no default tags: every taggable resource misses Owner/Project/Environment
        let doc = document(
            r#"
resource "aws_vpc" "main" {
    cidr_block "10.0.0.0/16"
}
"#,
        );
        let err = engine(provider.clone(), temp_dir.path())
            .apply(&doc)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CloudError::InvalidDocument(FlowError::Validation(_))
        ));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_wave_stops_and_reapply_resumes() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let engine = engine(provider.clone(), temp_dir.path());
        let doc = document(DOCUMENT);

        provider.fail("aws_subnet.public", 1);
        let result = engine.apply(&doc).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.failed[0].address, "aws_subnet.public");
        assert!(result.skipped.contains(&"aws_instance.web".to_string()));
        assert!(!provider.calls().contains(&"create aws_instance.web".to_string()));

        let state = engine.state_manager().load().await.unwrap();
        assert!(state.contains(&"aws_vpc.main".parse().unwrap()));
        assert!(!state.contains(&"aws_subnet.public".parse().unwrap()));
        assert!(state.outputs.is_empty());

        let result = engine.apply(&doc).await.unwrap();
        assert!(result.is_success(), "{:?}", result.failed);
        let creates_of_vpc = provider
            .calls()
            .iter()
            .filter(|c| *c == "create aws_vpc.main")
            .count();
        assert_eq!(creates_of_vpc, 1);
        assert!(provider.calls().contains(&"create aws_instance.web".to_string()));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
            backoff_multiplier: 2.0,
        };
        let engine = Engine::new(provider.clone(), StateManager::new(temp_dir.path()))
            .with_retry(retry);

        provider.fail("aws_vpc.main", 2);
        let result = engine.apply(&document(DOCUMENT)).await.unwrap();
        assert!(result.is_success(), "{:?}", result.failed);
        let attempts = provider
            .calls()
            .iter()
            .filter(|c| *c == "create aws_vpc.main")
            .count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_orphans_are_deleted_on_apply() {
        let temp_dir = tempdir().unwrap();
        let provider = Arc::new(MockProvider::default());
        let engine = engine(provider.clone(), temp_dir.path());

        engine.apply(&document(DOCUMENT)).await.unwrap();

        // drop the instance and its security group from the document
        let trimmed = DOCUMENT
            .split("resource \"aws_security_group\"")
            .next()
            .unwrap()
            .to_string()
            + "data \"aws_ami\" \"debian\" {\n    owners \"136693071363\"\n}\n";
        let doc = document(&trimmed);

        let plan = engine.plan(&doc).await.unwrap();
        let deletes: Vec<String> = plan
            .actions_by_type(ActionType::Delete)
            .iter()
            .map(|a| a.address.to_string())
            .collect();
        assert_eq!(deletes, vec!["aws_instance.web", "aws_security_group.ssh"]);

        let result = engine.apply(&doc).await.unwrap();
        assert!(result.is_success());
        let state = engine.state_manager().load().await.unwrap();
        assert!(!state.contains(&"aws_instance.web".parse().unwrap()));
        assert!(state.contains(&"aws_vpc.main".parse().unwrap()));
        assert!(state.outputs.is_empty());
    }
}
