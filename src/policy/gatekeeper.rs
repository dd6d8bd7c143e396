//! Gatekeeper evaluator for deployment artifacts.
//!
//! Runs every gatekeeper check in the snapshot against each artifact and
//! concatenates the results. Output is grouped by artifact in input order,
//! then by check application order. Absent or oddly-shaped fields make a
//! check not apply; evaluation itself never fails.

use serde_json::Value;
use tracing::{debug, info_span};

use crate::models::artifact::Artifact;
use crate::models::rule::{CheckFunction, GatekeeperCheck};
use crate::models::snapshot::RuleSnapshot;
use crate::models::violation::Violation;
use crate::models::walk_path;

/// CIDR that opens a security group rule to the world.
const OPEN_CIDR: &str = "0.0.0.0/0";

/// Evaluate `artifacts` against the gatekeeper checks of `snapshot`.
#[must_use]
pub fn evaluate(snapshot: &RuleSnapshot, artifacts: &[Artifact]) -> Vec<Violation> {
    let _span = info_span!(
        "gatekeeper_evaluate",
        version = snapshot.version(),
        artifacts = artifacts.len(),
    )
    .entered();

    let mut violations = Vec::new();
    for artifact in artifacts {
        for check in snapshot.gatekeeper_checks() {
            if check.artifact_type.matches(&artifact.kind) {
                apply(check, artifact, &mut violations);
            }
        }
    }

    debug!(violations = violations.len(), "gatekeeper evaluation complete");
    violations
}

fn apply(check: &GatekeeperCheck, artifact: &Artifact, out: &mut Vec<Violation>) {
    let violation = |message: String| Violation {
        source_name: artifact.name.clone(),
        source_type: artifact.kind.clone(),
        rule_id: check.rule_id.clone(),
        message,
    };

    match &check.check {
        CheckFunction::OpenIngress => {
            for (group, rule) in open_ingress_rules(&artifact.content) {
                out.push(violation(format!(
                    "security group '{group}' rule '{rule}' allows ingress from {OPEN_CIDR}"
                )));
            }
        }
        CheckFunction::RunAsNonRoot => {
            for pod in root_pods(&artifact.content) {
                out.push(violation(format!(
                    "pod '{pod}' must set securityContext.runAsNonRoot: true"
                )));
            }
        }
        CheckFunction::SignedImage => {
            let verified = walk_path(&artifact.content, ["cosign_verified"])
                .is_some_and(crate::models::is_truthy);
            if !verified {
                out.push(violation(format!(
                    "container image '{}' is not cosign verified",
                    artifact.name
                )));
            }
        }
        CheckFunction::Requirement(requirement) => {
            if requirement.violated_by(artifact) {
                out.push(violation(requirement.render(artifact, &check.rule_id)));
            }
        }
    }
}

/// `(group, rule)` names of every security group rule open to the world.
///
/// `security_groups` may be a list of `{name, rules}` or a mapping of
/// name → `{rules}`; a rule matches when its `cidr`, or any entry of
/// `cidr_blocks`, is exactly `0.0.0.0/0`.
fn open_ingress_rules(content: &Value) -> Vec<(String, String)> {
    let mut open = Vec::new();
    for (index, (group_name, group)) in named_entries(content.get("security_groups"))
        .into_iter()
        .enumerate()
    {
        let group_name = group_name.unwrap_or_else(|| format!("security_groups[{index}]"));
        let rules = group.get("rules").or_else(|| group.get("ingress"));
        for (rule_index, (rule_name, rule)) in named_entries(rules).into_iter().enumerate() {
            if is_open(rule) {
                let rule_name = rule_name
                    .or_else(|| rule.get("id").and_then(Value::as_str).map(str::to_owned))
                    .unwrap_or_else(|| format!("rules[{rule_index}]"));
                open.push((group_name.clone(), rule_name));
            }
        }
    }
    open
}

fn is_open(rule: &Value) -> bool {
    let single = rule.get("cidr").and_then(Value::as_str) == Some(OPEN_CIDR);
    let listed = rule
        .get("cidr_blocks")
        .and_then(Value::as_array)
        .is_some_and(|blocks| blocks.iter().any(|b| b.as_str() == Some(OPEN_CIDR)));
    single || listed
}

/// Names of pods that do not run as non-root.
///
/// A pod is compliant when its own `securityContext.runAsNonRoot` is `true`
/// **or** any one of its containers sets it. `content.pods` lists pods; a
/// content body that looks like a single pod is treated as one.
fn root_pods(content: &Value) -> Vec<String> {
    let pods: Vec<(Option<String>, &Value)> = match content.get("pods") {
        Some(pods) => named_entries(Some(pods)),
        None if pod_spec(content).get("containers").is_some() => vec![(None, content)],
        None => Vec::new(),
    };

    pods.into_iter()
        .enumerate()
        .filter(|(_, (_, pod))| !pod_runs_as_non_root(pod))
        .map(|(index, (name, pod))| {
            name.or_else(|| {
                pod.get("name")
                    .or_else(|| walk_path(pod, ["metadata", "name"]))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| format!("pods[{index}]"))
        })
        .collect()
}

fn pod_runs_as_non_root(pod: &Value) -> bool {
    let spec = pod_spec(pod);
    let pod_level = run_as_non_root(spec);
    let any_container = spec
        .get("containers")
        .and_then(Value::as_array)
        .is_some_and(|containers| containers.iter().any(run_as_non_root));
    pod_level || any_container
}

/// `spec` when the pod is a full manifest, otherwise the pod itself.
fn pod_spec(pod: &Value) -> &Value {
    match pod.get("spec") {
        Some(spec) if spec.is_object() => spec,
        _ => pod,
    }
}

fn run_as_non_root(node: &Value) -> bool {
    walk_path(node, ["securityContext", "runAsNonRoot"]) == Some(&Value::Bool(true))
}

/// Entries of a list (unnamed) or a mapping (named by key), skipping non-objects.
fn named_entries(node: Option<&Value>) -> Vec<(Option<String>, &Value)> {
    match node {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| {
                let name = item.get("name").and_then(Value::as_str).map(str::to_owned);
                (name, item)
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, item)| item.is_object())
            .map(|(key, item)| (Some(key.clone()), item))
            .collect(),
        _ => Vec::new(),
    }
}
