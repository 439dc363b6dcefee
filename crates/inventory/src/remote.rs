use crate::error::RemoteError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// One list/get operation against the cloud control plane or the cluster
/// orchestrator. List operations always mean the complete collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteRequest {
    ListFabrics { compartment_id: String },
    ListGpuMemoryClusters { compartment_id: String },
    GetGpuMemoryCluster { cluster_id: String },
    ListInstanceConfigurations { compartment_id: String },
    ListComputeClusters { compartment_id: String },
    ListInstances { compartment_id: String },
    ListNodes { selector: String },
    ListCapacityTopologies { compartment_id: String },
    ListCapacityTopologyHosts { topology_id: String },
    ListAnnouncements { compartment_id: String },
    GetAnnouncement { announcement_id: String },
    ListVcns { compartment_id: String },
    ListSubnets { compartment_id: String },
    ListNetworkSecurityGroups { compartment_id: String },
    ListNsgRules { nsg_id: String },
    ListInternetGateways { compartment_id: String },
    ListNatGateways { compartment_id: String },
    ListServiceGateways { compartment_id: String },
}

impl RemoteRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListFabrics { .. } => "list-fabrics",
            Self::ListGpuMemoryClusters { .. } => "list-gpu-memory-clusters",
            Self::GetGpuMemoryCluster { .. } => "get-gpu-memory-cluster",
            Self::ListInstanceConfigurations { .. } => "list-instance-configurations",
            Self::ListComputeClusters { .. } => "list-compute-clusters",
            Self::ListInstances { .. } => "list-instances",
            Self::ListNodes { .. } => "list-nodes",
            Self::ListCapacityTopologies { .. } => "list-capacity-topologies",
            Self::ListCapacityTopologyHosts { .. } => "list-capacity-topology-hosts",
            Self::ListAnnouncements { .. } => "list-announcements",
            Self::GetAnnouncement { .. } => "get-announcement",
            Self::ListVcns { .. } => "list-vcns",
            Self::ListSubnets { .. } => "list-subnets",
            Self::ListNetworkSecurityGroups { .. } => "list-nsgs",
            Self::ListNsgRules { .. } => "list-nsg-rules",
            Self::ListInternetGateways { .. } => "list-internet-gateways",
            Self::ListNatGateways { .. } => "list-nat-gateways",
            Self::ListServiceGateways { .. } => "list-service-gateways",
        }
    }
}

impl fmt::Display for RemoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Executes remote requests and returns their raw JSON payload.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn call(&self, request: &RemoteRequest) -> Result<Value, RemoteError>;
}

/// Invocation of an external command-line tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// [`RemoteSource`] backed by the `oci` and `kubectl` command-line tools.
#[derive(Debug, Clone)]
pub struct CliRemote {
    oci_bin: PathBuf,
    kubectl_bin: PathBuf,
    region: String,
    profile: Option<String>,
}

impl CliRemote {
    pub fn new(
        oci_bin: impl Into<PathBuf>,
        kubectl_bin: impl Into<PathBuf>,
        region: impl Into<String>,
        profile: Option<String>,
    ) -> Self {
        Self {
            oci_bin: oci_bin.into(),
            kubectl_bin: kubectl_bin.into(),
            region: region.into(),
            profile,
        }
    }

    pub fn invocation(&self, request: &RemoteRequest) -> Invocation {
        use RemoteRequest as R;

        match request {
            R::ListNodes { selector } => self.kubectl_nodes(selector),
            R::ListFabrics { compartment_id } => self.oci(
                &["compute", "compute-gpu-memory-fabric", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListGpuMemoryClusters { compartment_id } => self.oci(
                &["compute", "compute-gpu-memory-cluster", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::GetGpuMemoryCluster { cluster_id } => self.oci(
                &["compute", "compute-gpu-memory-cluster", "get"],
                "--compute-gpu-memory-cluster-id",
                cluster_id,
                false,
            ),
            R::ListInstanceConfigurations { compartment_id } => self.oci(
                &["compute-management", "instance-configuration", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListComputeClusters { compartment_id } => self.oci(
                &["compute", "compute-cluster", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListInstances { compartment_id } => self.oci(
                &["compute", "instance", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListCapacityTopologies { compartment_id } => self.oci(
                &["compute", "capacity-topology", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListCapacityTopologyHosts { topology_id } => self.oci(
                &["compute", "capacity-topology", "bare-metal-host", "list"],
                "--capacity-topology-id",
                topology_id,
                true,
            ),
            R::ListAnnouncements { compartment_id } => self.oci(
                &["announce", "announcements", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::GetAnnouncement { announcement_id } => self.oci(
                &["announce", "announcements", "get"],
                "--announcement-id",
                announcement_id,
                false,
            ),
            R::ListVcns { compartment_id } => self.oci(
                &["network", "vcn", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListSubnets { compartment_id } => self.oci(
                &["network", "subnet", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListNetworkSecurityGroups { compartment_id } => self.oci(
                &["network", "nsg", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListNsgRules { nsg_id } => {
                self.oci(&["network", "nsg", "rules", "list"], "--nsg-id", nsg_id, true)
            }
            R::ListInternetGateways { compartment_id } => self.oci(
                &["network", "internet-gateway", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListNatGateways { compartment_id } => self.oci(
                &["network", "nat-gateway", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
            R::ListServiceGateways { compartment_id } => self.oci(
                &["network", "service-gateway", "list"],
                "--compartment-id",
                compartment_id,
                true,
            ),
        }
    }

    fn kubectl_nodes(&self, selector: &str) -> Invocation {
        let mut args = vec!["get".to_string(), "nodes".to_string()];
        if !selector.is_empty() {
            args.push("-l".to_string());
            args.push(selector.to_string());
        }
        args.push("-o".to_string());
        args.push("json".to_string());
        Invocation {
            program: self.kubectl_bin.clone(),
            args,
        }
    }

    fn oci(&self, command: &[&str], id_flag: &str, id: &str, paginate: bool) -> Invocation {
        let mut args: Vec<String> = command.iter().map(|s| (*s).to_string()).collect();
        args.push(id_flag.to_string());
        args.push(id.to_string());
        if paginate {
            args.push("--all".to_string());
        }
        if !self.region.is_empty() {
            args.push("--region".to_string());
            args.push(self.region.clone());
        }
        if let Some(profile) = self.profile.as_deref().filter(|p| !p.is_empty()) {
            args.push("--profile".to_string());
            args.push(profile.to_string());
        }
        args.push("--output".to_string());
        args.push("json".to_string());

        Invocation {
            program: self.oci_bin.clone(),
            args,
        }
    }
}

#[async_trait]
impl RemoteSource for CliRemote {
    async fn call(&self, request: &RemoteRequest) -> Result<Value, RemoteError> {
        let invocation = self.invocation(request);
        log::debug!("Running {}", invocation.display());

        let output = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: invocation.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RemoteError::Failed {
                command: invocation.display(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // `oci ... list` prints nothing at all for an empty collection.
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&output.stdout).map_err(|source| RemoteError::InvalidJson {
            command: invocation.display(),
            source,
        })
    }
}
