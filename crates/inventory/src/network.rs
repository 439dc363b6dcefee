//! Environment-health summary over the network collections.

use crate::model::{GatewayPresence, NetworkSecurityGroup, Subnet};
use serde::Serialize;

const AVAILABLE: &str = "AVAILABLE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentHealth {
    pub subnet_count: usize,
    pub public_subnet_count: usize,
    pub private_subnet_count: usize,
    pub nsg_count: usize,
    pub nsg_rule_count: u32,
    pub vcn_count: usize,
    /// VCN names without a NAT gateway.
    pub vcns_without_nat: Vec<String>,
    /// VCN names without a service gateway.
    pub vcns_without_service_gateway: Vec<String>,
    /// Subnets and security groups whose state is not `AVAILABLE`, as
    /// `name (STATE)`.
    pub unavailable: Vec<String>,
}

impl EnvironmentHealth {
    pub fn summarize(
        subnets: &[Subnet],
        nsgs: &[NetworkSecurityGroup],
        gateways: &[GatewayPresence],
    ) -> Self {
        let access_count = |access: &str| {
            subnets
                .iter()
                .filter(|s| s.access.as_deref() == Some(access))
                .count()
        };
        let vcn_label = |g: &GatewayPresence| {
            if g.vcn_name.is_empty() {
                g.vcn_id.clone()
            } else {
                g.vcn_name.clone()
            }
        };

        let unavailable = subnets
            .iter()
            .map(|s| (&s.display_name, &s.id, &s.lifecycle_state))
            .chain(
                nsgs.iter()
                    .map(|n| (&n.display_name, &n.id, &n.lifecycle_state)),
            )
            .filter(|(_, _, state)| state.as_str() != AVAILABLE)
            .map(|(name, id, state)| {
                let name = if name.is_empty() { id } else { name };
                let state = if state.is_empty() { "UNKNOWN" } else { state.as_str() };
                format!("{name} ({state})")
            })
            .collect();

        Self {
            subnet_count: subnets.len(),
            public_subnet_count: access_count("public"),
            private_subnet_count: access_count("private"),
            nsg_count: nsgs.len(),
            nsg_rule_count: nsgs.iter().filter_map(|n| n.rule_count).sum(),
            vcn_count: gateways.len(),
            vcns_without_nat: gateways
                .iter()
                .filter(|g| !g.nat_gateway)
                .map(vcn_label)
                .collect(),
            vcns_without_service_gateway: gateways
                .iter()
                .filter(|g| !g.service_gateway)
                .map(vcn_label)
                .collect(),
            unavailable,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.vcns_without_nat.is_empty()
            && self.vcns_without_service_gateway.is_empty()
            && self.unavailable.is_empty()
    }
}
