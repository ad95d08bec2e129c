//! Network performance monitoring through system-probe

use convoy_common::crd::{is_enabled, FleetAgent};

use super::{empty_dir_volume, env_var, host_path_volume};
use crate::error::Result;
use crate::feature::{ConfigureContext, Configured, Feature, FeatureId, FeaturePlan};
use crate::required::{RequiredComponent, RequiredComponents, Requirement};
use crate::template::{ContainerName, TemplateManagers};

const APPARMOR_ANNOTATION: &str = "container.apparmor.security.beta.kubernetes.io/system-probe";
const APPARMOR_UNCONFINED: &str = "unconfined";

/// Capabilities system-probe needs for eBPF based network tracing
pub const SYSTEM_PROBE_CAPABILITIES: [&str; 9] = [
    "SYS_ADMIN",
    "SYS_RESOURCE",
    "SYS_PTRACE",
    "NET_ADMIN",
    "NET_BROADCAST",
    "NET_RAW",
    "IPC_LOCK",
    "CHOWN",
    "DAC_READ_SEARCH",
];

const SOCKET_VOLUME: &str = "sysprobe-socket-dir";
const SOCKET_DIR: &str = "/var/run/sysprobe";
const SOCKET_PATH: &str = "/var/run/sysprobe/sysprobe.sock";

const DD_NPM_ENABLED: &str = "DD_SYSTEM_PROBE_NETWORK_ENABLED";
const DD_SYSTEM_PROBE_ENABLED: &str = "DD_SYSTEM_PROBE_ENABLED";
const DD_SYSPROBE_SOCKET: &str = "DD_SYSPROBE_SOCKET";
const DD_COLLECT_DNS_STATS: &str = "DD_COLLECT_DNS_STATS";
const DD_ENABLE_CONNTRACK: &str = "DD_ENABLE_CONNTRACK";
const DD_SYSTEM_PROBE_EXTERNAL: &str = "DD_SYSTEM_PROBE_EXTERNAL";

const CONTAINERS: [ContainerName; 3] = [
    ContainerName::CoreAgent,
    ContainerName::ProcessAgent,
    ContainerName::SystemProbe,
];
const HOST_READERS: [ContainerName; 2] = [ContainerName::ProcessAgent, ContainerName::SystemProbe];

/// Network performance monitoring
pub struct NpmFeature;

struct Plan {
    collect_dns_stats: bool,
    enable_conntrack: bool,
}

impl Feature for NpmFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Npm
    }

    fn configure(&self, desired: &FleetAgent, _: &ConfigureContext<'_>) -> Configured {
        let Some(cfg) = desired
            .spec
            .features
            .npm
            .as_ref()
            .filter(|c| is_enabled(c.enabled))
        else {
            return Configured::inactive();
        };

        Configured {
            required: RequiredComponents {
                node_agent: RequiredComponent::with_containers(Requirement::Required, CONTAINERS),
                ..Default::default()
            },
            plan: Box::new(Plan {
                collect_dns_stats: cfg.collect_dns_stats.unwrap_or(false),
                enable_conntrack: cfg.enable_conntrack.unwrap_or(false),
            }),
        }
    }
}

impl FeaturePlan for Plan {
    fn manage_node_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        managers
            .annotation()
            .add(APPARMOR_ANNOTATION, APPARMOR_UNCONFINED)?;
        managers
            .security_capability()
            .add_to_container(ContainerName::SystemProbe, SYSTEM_PROBE_CAPABILITIES);

        for (name, host, path, read_only) in [
            ("procdir", "/proc", "/host/proc", true),
            ("cgroups", "/sys/fs/cgroup", "/host/sys/fs/cgroup", true),
            ("debugfs", "/sys/kernel/debug", "/sys/kernel/debug", false),
        ] {
            let (volume, mount) = host_path_volume(name, host, path, read_only);
            managers.volume().add_to_containers(volume, mount, &HOST_READERS)?;
        }

        // system-probe owns the socket, the other containers only read it
        let (socket, rw_mount) = empty_dir_volume(SOCKET_VOLUME, SOCKET_DIR, false);
        let (_, ro_mount) = empty_dir_volume(SOCKET_VOLUME, SOCKET_DIR, true);
        managers
            .volume()
            .add_to_container(socket, rw_mount, ContainerName::SystemProbe)?;
        managers.volume_mount().add_to_containers(
            &[ContainerName::CoreAgent, ContainerName::ProcessAgent],
            ro_mount,
        )?;

        let mut env = managers.env_var();
        env.add_to_containers(&CONTAINERS, env_var(DD_NPM_ENABLED, "true"))?;
        env.add_to_containers(&CONTAINERS, env_var(DD_SYSTEM_PROBE_ENABLED, "true"))?;
        env.add_to_containers(&CONTAINERS, env_var(DD_SYSPROBE_SOCKET, SOCKET_PATH))?;

        let probe_readers = [ContainerName::CoreAgent, ContainerName::SystemProbe];
        env.add_to_containers(
            &probe_readers,
            env_var(DD_COLLECT_DNS_STATS, self.collect_dns_stats.to_string()),
        )?;
        env.add_to_containers(
            &probe_readers,
            env_var(DD_ENABLE_CONNTRACK, self.enable_conntrack.to_string()),
        )?;
        env.add_to_container(
            ContainerName::ProcessAgent,
            env_var(DD_SYSTEM_PROBE_EXTERNAL, "true"),
        )?;
        Ok(())
    }
}
