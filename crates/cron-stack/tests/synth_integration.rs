//! Synthesis through the public configuration, with a script on disk

use cron_stack::config::{AwsConfig, DeployConfig, RuntimeFlags};
use cron_stack::deploy::synthesize;
use cron_stack_common::StackProps;
use cron_stack_test_utils::{get_test_region, test_script};

const SCRIPT: &str = "import datetime\nprint(datetime.datetime.utcnow())\n";

fn config(script: &std::path::Path, props: StackProps) -> DeployConfig {
    DeployConfig {
        aws: AwsConfig {
            region: get_test_region(),
            aws_profile: None,
        },
        stack: props,
        script: script.to_path_buf(),
        flags: RuntimeFlags::default(),
    }
}

#[test]
fn test_synth_default_stack() {
    let script = test_script(SCRIPT).unwrap();
    let template = synthesize(&config(script.path(), StackProps::default())).unwrap();

    assert_eq!(template["stack"], "Ec2Stack");
    let order: Vec<&str> = template["order"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(
        order,
        vec![
            "DefaultVPC",
            "SecurityGroup",
            "InstanceRole",
            "PythonScript",
            "InstanceInit",
            "PythonEnvEC2Instance",
        ]
    );
    assert_eq!(
        template["resources"]["PythonEnvEC2Instance"]["type"],
        "AWS::EC2::Instance"
    );

    let findings = template["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["port"], 22);
}

#[test]
fn test_synth_contains_cron_setup() {
    let script = test_script(SCRIPT).unwrap();
    let template = synthesize(&config(script.path(), StackProps::default())).unwrap();
    let text = serde_json::to_string(&template["resources"]["PythonEnvEC2Instance"]).unwrap();

    assert!(text.contains("sudo dnf -y install cronie"));
    assert!(text.contains("sudo systemctl enable crond"));
    assert!(text.contains(
        "* * * * * python3 /home/ec2-user/simple.py >> /home/ec2-user/output.log 2>&1"
    ));
}

#[test]
fn test_synth_is_deterministic() {
    let script = test_script(SCRIPT).unwrap();
    let config = config(script.path(), StackProps::default());

    let first = serde_json::to_string(&synthesize(&config).unwrap()).unwrap();
    let second = serde_json::to_string(&synthesize(&config).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_synth_restricted_ssh_has_no_findings() {
    let script = test_script(SCRIPT).unwrap();
    let props = StackProps {
        ssh_cidr: "203.0.113.0/24".parse().unwrap(),
        ..StackProps::default()
    };
    let template = synthesize(&config(script.path(), props)).unwrap();

    assert!(template["findings"].as_array().unwrap().is_empty());
}

#[test]
fn test_synth_missing_script_fails() {
    let config = config(
        std::path::Path::new("/nonexistent/simple.py"),
        StackProps::default(),
    );
    let err = synthesize(&config).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/simple.py"));
}
