//! A public web server: key pair, security group open on port 80 to one
//! address, and a Graviton instance serving a greeting page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stackrun_core::{
    InvokeSpec, Outputs, ProgramArgs, ProgramContext, ProviderArgs, ResourceSpec,
    StackDefinition, StackProgram,
};

pub const NAME: &str = "sample";
pub const ENVS: &[&str] = &["common"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleConfig {
    pub vpc_id: String,
    pub subnet_id: String,
    pub public_key: String,
    /// CIDR allowed to reach the web server.
    pub my_ip: String,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            vpc_id: "vpc-0d1dcd570bf13220d".to_string(),
            subnet_id: "subnet-0eea55807ccc40161".to_string(),
            public_key:
                "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIEC30Zr2DsR3fRJa0VInOLmBA5RoaNyzGgcS7la0cj0B"
                    .to_string(),
            my_ip: "125.130.178.156/32".to_string(),
        }
    }
}

fn user_data(name: &str) -> String {
    format!(
        "#!/bin/bash\n\
         sudo yum install -y httpd\n\
         sudo systemctl start httpd\n\
         echo 'Hi, {}' > /var/www/html/index.html",
        name
    )
}

#[derive(Debug, Default)]
pub struct SampleStack {
    config: SampleConfig,
}

impl SampleStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SampleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StackProgram for SampleStack {
    async fn config(&self, _env: &str) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(&self.config)?)
    }

    async fn program(
        &self,
        args: &ProgramArgs,
        config: Value,
        ctx: &ProgramContext,
    ) -> anyhow::Result<Outputs> {
        let config: SampleConfig = serde_json::from_value(config)?;
        let name = args.name.as_str();
        let tags = json!(args.tags);
        let provider = ctx.provider(ProviderArgs::default());

        // Logical names are unique per document, so each resource gets a
        // suffix. Physical names still derive from the stack name.
        let key = ctx.register(
            ResourceSpec::new(format!("{}-key", name), "aws:ec2:KeyPair")
                .properties(json!({
                    "keyNamePrefix": format!("{}-", name),
                    "publicKey": config.public_key,
                    "tags": tags,
                }))
                .provider(&provider),
        )?;

        let sg = ctx.register(
            ResourceSpec::new(format!("{}-sg", name), "aws:ec2:SecurityGroup")
                .properties(json!({
                    "namePrefix": format!("{}-", name),
                    "vpcId": config.vpc_id,
                    "tags": tags,
                }))
                .provider(&provider),
        )?;

        ctx.register(
            ResourceSpec::new(format!("{}-egress", name), "aws:ec2:SecurityGroupRule")
                .properties(json!({
                    "securityGroupId": sg.id(),
                    "type": "egress",
                    "description": "to anywhere",
                    "cidrBlocks": ["0.0.0.0/0"],
                    "ipv6CidrBlocks": ["::/0"],
                    "protocol": "-1",
                    "fromPort": 0,
                    "toPort": 0,
                }))
                .provider(&provider),
        )?;
        ctx.register(
            ResourceSpec::new(format!("{}-ingress", name), "aws:ec2:SecurityGroupRule")
                .properties(json!({
                    "securityGroupId": sg.id(),
                    "type": "ingress",
                    "description": "from my ip",
                    "cidrBlocks": [config.my_ip],
                    "protocol": "tcp",
                    "fromPort": 80,
                    "toPort": 80,
                }))
                .provider(&provider),
        )?;

        let ami = ctx.invoke(
            InvokeSpec::new(format!("{}-ami", name), "aws:ec2:getAmi")
                .arguments(json!({
                    "mostRecent": true,
                    "owners": ["amazon"],
                    "filters": [
                        { "name": "architecture", "values": ["arm64"] },
                        { "name": "name", "values": ["amzn2-ami-kernel-5.10-*"] },
                    ],
                }))
                .provider(&provider),
        )?;

        let instance = ctx.register(
            ResourceSpec::new(format!("{}-instance", name), "aws:ec2:Instance")
                .properties(json!({
                    "subnetId": config.subnet_id,
                    "ami": ami.field("id"),
                    "vpcSecurityGroupIds": [sg.id()],
                    "keyName": key.attr("keyName"),
                    "instanceType": "t4g.nano",
                    "associatePublicIpAddress": true,
                    "userData": user_data(name),
                    "tags": tags,
                }))
                .provider(&provider),
        )?;

        Ok(Outputs::from([(
            "instance".to_string(),
            json!({ "publicIp": instance.attr("publicIp") }),
        )]))
    }
}

impl StackDefinition for SampleStack {
    fn name(&self) -> &str {
        NAME
    }

    fn envs(&self) -> &[&str] {
        ENVS
    }
}
