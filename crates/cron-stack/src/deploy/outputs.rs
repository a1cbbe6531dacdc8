//! Outputs of a finished deployment

use std::fmt;

use serde::Serialize;

/// Physical identifiers of a deployed stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutputs {
    pub stack_name: String,
    pub region: String,
    pub vpc_id: String,
    pub security_group_id: String,
    pub role_name: String,
    pub instance_profile_name: String,
    pub asset_bucket: String,
    pub asset_key: String,
    /// `s3://bucket/key` of the uploaded script
    pub asset_url: String,
    pub instance_id: String,
    /// Only known when the deployer waited for `running`
    pub public_ip: Option<String>,
}

impl fmt::Display for StackOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Stack", self.stack_name.as_str()),
            ("Region", self.region.as_str()),
            ("VPC", self.vpc_id.as_str()),
            ("Security group", self.security_group_id.as_str()),
            ("IAM role", self.role_name.as_str()),
            ("Instance profile", self.instance_profile_name.as_str()),
            ("Script", self.asset_url.as_str()),
            ("Instance", self.instance_id.as_str()),
            ("Public IP", self.public_ip.as_deref().unwrap_or("-")),
        ];
        for (label, value) in rows {
            writeln!(f, "{label:<18} {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> StackOutputs {
        StackOutputs {
            stack_name: "Ec2Stack".into(),
            region: "us-east-2".into(),
            vpc_id: "vpc-1".into(),
            security_group_id: "sg-1".into(),
            role_name: "Ec2Stack-InstanceRole".into(),
            instance_profile_name: "Ec2Stack-InstanceRole".into(),
            asset_bucket: "cron-stack-assets-123456789012-us-east-2".into(),
            asset_key: "assets/abc.py".into(),
            asset_url: "s3://cron-stack-assets-123456789012-us-east-2/assets/abc.py".into(),
            instance_id: "i-1".into(),
            public_ip: None,
        }
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(outputs()).unwrap();
        assert_eq!(json["securityGroupId"], "sg-1");
        assert_eq!(json["instanceProfileName"], "Ec2Stack-InstanceRole");
        assert!(json["publicIp"].is_null());
    }

    #[test]
    fn test_display_lists_instance() {
        let text = outputs().to_string();
        let line = |label: &str| {
            text.lines()
                .find(|l| l.starts_with(&format!("{label:<18} ")))
                .map(|l| l[19..].to_string())
        };
        assert_eq!(line("Instance").as_deref(), Some("i-1"));
        assert_eq!(line("Public IP").as_deref(), Some("-"));
    }
}
