//! Properties of the declared cron stack

use cron_stack_common::stack::{
    AssetLocation, AssetLocations, EgressPolicy, Ipv4Cidr, LogicalId, Peer, ResourceType,
    ScriptAsset, VpcLookup, ids,
};
use cron_stack_common::{StackDefinition, StackProps, define_stack};
use proptest::prelude::*;

const SCRIPT: &[u8] = b"print('hello from cron')\n";

fn asset() -> ScriptAsset {
    ScriptAsset::from_bytes("assets/python-scripts/simple.py", SCRIPT)
}

fn default_stack() -> StackDefinition {
    define_stack(&StackProps::default(), asset()).unwrap()
}

fn uploaded(stack: &StackDefinition) -> AssetLocations {
    let (id, asset) = stack.asset().unwrap();
    let mut locations = AssetLocations::new();
    locations.insert(
        id.clone(),
        AssetLocation::new("cron-stack-assets-123456789012-us-east-2", asset.object_key()),
    );
    locations
}

#[test]
fn one_resource_of_each_type() {
    let stack = default_stack();
    for ty in [
        ResourceType::Network,
        ResourceType::Firewall,
        ResourceType::Identity,
        ResourceType::Asset,
        ResourceType::BootConfiguration,
        ResourceType::Instance,
    ] {
        assert_eq!(stack.count(ty), 1, "{ty:?}");
    }
    assert_eq!(stack.resources().len(), 6);
}

#[test]
fn declaration_order() {
    let stack = default_stack();
    let order: Vec<&str> = stack.resources().iter().map(|r| r.logical_id.as_str()).collect();
    assert_eq!(
        order,
        vec![ids::NETWORK, ids::FIREWALL, ids::IDENTITY, ids::ASSET, ids::BOOT, ids::INSTANCE]
    );
}

#[test]
fn firewall_rules() {
    let stack = default_stack();
    let (_, firewall) = stack.firewall().unwrap();

    assert_eq!(firewall.description, "Allow SSH and SSM access");
    assert_eq!(firewall.egress, EgressPolicy::AllowAll);
    assert_eq!(firewall.ingress.len(), 2);

    let ssh = &firewall.ingress[0];
    assert_eq!(ssh.port, 22);
    assert_eq!(ssh.peer, Peer::AnyIpv4);
    assert_eq!(ssh.description, "Allow SSH access from anywhere");

    let ssm = &firewall.ingress[1];
    assert_eq!(ssm.port, 443);
    assert_eq!(ssm.peer, Peer::NetworkCidr(LogicalId::new(ids::NETWORK)));
    assert_eq!(ssm.description, "Allow SSM access within the VPC");
}

#[test]
fn identity_trust_and_policy() {
    let stack = default_stack();
    let (_, identity) = stack.identity().unwrap();
    assert_eq!(identity.service_principal, "ec2.amazonaws.com");
    assert_eq!(identity.managed_policies.len(), 1);
    assert_eq!(
        identity.managed_policies[0].arn(),
        "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore"
    );
}

#[test]
fn instance_defaults() {
    let stack = default_stack();
    let (_, instance) = stack.instance().unwrap();
    assert_eq!(instance.instance_type, "t3.micro");
    assert_eq!(instance.architecture.as_str(), "x86_64");
    assert_eq!(instance.init.as_str(), ids::BOOT);
    assert_eq!(instance.role.as_str(), ids::IDENTITY);
    assert_eq!(instance.firewall.as_str(), ids::FIREWALL);
}

#[test]
fn user_data_schedules_script() {
    let stack = default_stack();
    let script = stack.render_user_data(&uploaded(&stack)).unwrap();

    assert!(script.starts_with("#!/bin/bash\n"));
    assert_eq!(script.matches("#!/bin/bash").count(), 1);
    for expected in [
        "sudo dnf -y install cronie",
        "sudo systemctl enable crond",
        "sudo systemctl start crond",
        "echo \"* * * * * python3 /home/ec2-user/simple.py >> /home/ec2-user/output.log 2>&1\" >> tmpfile",
        "crontab tmpfile",
    ] {
        assert!(script.contains(expected), "missing {expected:?} in\n{script}");
    }
}

#[test]
fn boot_files_placed_before_instance_commands() {
    let stack = default_stack();
    let script = stack.render_user_data(&uploaded(&stack)).unwrap();

    let copy = script.find("aws s3 cp s3://").unwrap();
    let chmod = script.find("chmod 644 /home/ec2-user/simple.py").unwrap();
    let first_instance_command = script.find("sudo dnf -y update").unwrap();
    assert!(copy < first_instance_command);
    assert!(chmod < first_instance_command);
}

#[test]
fn user_data_needs_uploaded_asset() {
    let stack = default_stack();
    assert!(stack.render_user_data(&AssetLocations::new()).is_err());
}

#[test]
fn redeclaring_is_deterministic() {
    let a = default_stack();
    let b = default_stack();
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a.synth()).unwrap(),
        serde_json::to_string(&b.synth()).unwrap()
    );
}

#[test]
fn synth_shape() {
    let synth = default_stack().synth();
    assert_eq!(synth["stack"], "Ec2Stack");
    assert_eq!(synth["order"].as_array().unwrap().len(), 6);

    let instance = &synth["resources"][ids::INSTANCE];
    assert_eq!(instance["type"], "AWS::EC2::Instance");
    assert_eq!(
        instance["dependsOn"],
        serde_json::json!([ids::NETWORK, ids::FIREWALL, ids::IDENTITY, ids::BOOT])
    );
    assert_eq!(instance["properties"]["instanceType"], "t3.micro");

    let ingress = &synth["resources"][ids::FIREWALL]["properties"]["ingress"];
    assert_eq!(ingress[0]["peer"]["kind"], "anyIpv4");
    assert_eq!(ingress[1]["peer"]["value"], ids::NETWORK);
}

#[test]
fn default_ssh_rule_is_flagged() {
    let stack = default_stack();
    let findings = stack.security_findings();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].port, 22);
    assert_eq!(findings[0].resource.as_str(), ids::FIREWALL);
    assert_eq!(stack.synth()["findings"].as_array().unwrap().len(), 1);
}

#[test]
fn restricted_ssh_is_not_flagged() {
    let props = StackProps {
        ssh_cidr: "203.0.113.0/24".parse().unwrap(),
        ..StackProps::default()
    };
    let stack = define_stack(&props, asset()).unwrap();
    assert!(stack.security_findings().is_empty());

    let (_, firewall) = stack.firewall().unwrap();
    assert_eq!(firewall.ingress[0].description, "Allow SSH access from 203.0.113.0/24");
}

#[test]
fn vpc_override_is_declared() {
    let props = StackProps {
        vpc: VpcLookup::ById("vpc-0abc".to_string()),
        ..StackProps::default()
    };
    let stack = define_stack(&props, asset()).unwrap();
    let (_, network) = stack.network().unwrap();
    assert_eq!(network.lookup, VpcLookup::ById("vpc-0abc".to_string()));
}

#[test]
fn invalid_props_rejected() {
    let bad_name = StackProps {
        stack_name: "bad name".to_string(),
        ..StackProps::default()
    };
    assert!(define_stack(&bad_name, asset()).is_err());

    let bad_destination = StackProps {
        script_destination: "/home/ec2-user/\"x\".py".to_string(),
        ..StackProps::default()
    };
    assert!(define_stack(&bad_destination, asset()).is_err());

    let bad_type = StackProps {
        instance_type: "micro".to_string(),
        ..StackProps::default()
    };
    assert!(define_stack(&bad_type, asset()).is_err());
}

fn arb_cidr() -> impl Strategy<Value = Ipv4Cidr> {
    (any::<u32>(), 0u8..=32).prop_map(|(bits, prefix)| {
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
        Ipv4Cidr::new((bits & mask).into(), prefix).unwrap()
    })
}

proptest! {
    #[test]
    fn only_ssh_and_https_exposed(cidr in arb_cidr()) {
        let props = StackProps { ssh_cidr: cidr, ..StackProps::default() };
        let stack = define_stack(&props, asset()).unwrap();
        let (_, firewall) = stack.firewall().unwrap();

        let ports: Vec<u16> = firewall.exposed_ports().into_iter().collect();
        prop_assert_eq!(ports, vec![22, 443]);
        prop_assert_eq!(firewall.ingress.len(), 2);
        prop_assert_eq!(stack.security_findings().is_empty(), !cidr.is_any());
    }
}
