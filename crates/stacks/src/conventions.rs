//! Organization rules every stack must satisfy, checked against the
//! program document before anything reaches a backend.

use serde_json::Value;
use stackrun_core::{ProgramDocument, ResourceSpec};
use thiserror::Error;

pub const SECURITY_GROUP_RULE: &str = "aws:ec2:SecurityGroupRule";
pub const EC2_INSTANCE: &str = "aws:ec2:Instance";

pub const ALLOWED_INGRESS_PORT: i64 = 80;
pub const ALLOWED_INSTANCE_TYPE: &str = "t4g.nano";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Violation {
    #[error(
        "ingress security group rule only allowed port {allowed} but fromPort {from_port}, toPort {to_port}"
    )]
    IngressPort {
        allowed: i64,
        from_port: String,
        to_port: String,
    },

    #[error("instanceType must be {allowed} but {actual}")]
    InstanceType { allowed: String, actual: String },
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "undefined".to_string(),
    }
}

/// Ingress rules may only open the allowed port. Egress is unrestricted.
pub fn check_security_group_rule(rule: &ResourceSpec) -> Result<(), Violation> {
    if rule.get("type").and_then(Value::as_str) != Some("ingress") {
        return Ok(());
    }
    let from_port = rule.get("fromPort");
    let to_port = rule.get("toPort");
    let allowed = |port: Option<&Value>| port.and_then(Value::as_i64) == Some(ALLOWED_INGRESS_PORT);
    if allowed(from_port) && allowed(to_port) {
        Ok(())
    } else {
        Err(Violation::IngressPort {
            allowed: ALLOWED_INGRESS_PORT,
            from_port: display(from_port),
            to_port: display(to_port),
        })
    }
}

pub fn check_ec2_instance(instance: &ResourceSpec) -> Result<(), Violation> {
    match instance.get("instanceType").and_then(Value::as_str) {
        Some(ALLOWED_INSTANCE_TYPE) => Ok(()),
        other => Err(Violation::InstanceType {
            allowed: ALLOWED_INSTANCE_TYPE.to_string(),
            actual: other.map_or_else(|| display(None), str::to_string),
        }),
    }
}

/// Apply every convention to the resources it covers.
pub fn check_document(document: &ProgramDocument) -> Vec<Violation> {
    document
        .resources_of_type(SECURITY_GROUP_RULE)
        .map(check_security_group_rule)
        .chain(document.resources_of_type(EC2_INSTANCE).map(check_ec2_instance))
        .filter_map(Result::err)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(kind: &str, from_port: i64, to_port: i64) -> ResourceSpec {
        ResourceSpec::new("rule", SECURITY_GROUP_RULE).properties(json!({
            "type": kind,
            "fromPort": from_port,
            "toPort": to_port,
        }))
    }

    #[test]
    fn test_ingress_port() {
        assert!(check_security_group_rule(&rule("ingress", 80, 80)).is_ok());
        assert!(check_security_group_rule(&rule("egress", 0, 0)).is_ok());

        let err = check_security_group_rule(&rule("ingress", 22, 22)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ingress security group rule only allowed port 80 but fromPort 22, toPort 22"
        );
        assert!(check_security_group_rule(&rule("ingress", 80, 443)).is_err());
    }

    #[test]
    fn test_instance_type() {
        let nano = ResourceSpec::new("web", EC2_INSTANCE).property("instanceType", "t4g.nano");
        assert!(check_ec2_instance(&nano).is_ok());

        let large = ResourceSpec::new("web", EC2_INSTANCE).property("instanceType", "m5.large");
        assert_eq!(
            check_ec2_instance(&large).unwrap_err().to_string(),
            "instanceType must be t4g.nano but m5.large"
        );

        let missing = ResourceSpec::new("web", EC2_INSTANCE);
        assert!(check_ec2_instance(&missing).is_err());
    }

    #[test]
    fn test_check_document_collects_violations() {
        let document = ProgramDocument {
            resources: vec![
                rule("ingress", 22, 22),
                rule("egress", 0, 0),
                ResourceSpec::new("web", EC2_INSTANCE).property("instanceType", "t3.micro"),
                ResourceSpec::new("sg", "aws:ec2:SecurityGroup"),
            ],
            ..Default::default()
        };

        let violations = check_document(&document);
        assert_eq!(violations.len(), 2);
        assert!(matches!(violations[0], Violation::IngressPort { .. }));
        assert!(matches!(violations[1], Violation::InstanceType { .. }));
    }
}
