//! Builds a live [`HostConnection`] + [`ContainerRuntime`] pair for a
//! `Server` row, the way the orchestrator needs it registered (spec §4.1,
//! §4.2). A local-VM host (`local_vm_name` set) gets a `LocalVmConnection`;
//! anything else gets SSH.

use std::sync::Arc;

use crate::config::Settings;
use crate::host::local_vm::LocalVmConnection;
use crate::host::ssh::SshConnection;
use crate::host::HostConnection;
use crate::model::{Server, SshEndpoint};
use crate::runtime::sandboxed::SandboxedRuntime;
use crate::runtime::ContainerRuntime;

pub fn build_host_handle(server: &Server, settings: &Settings) -> anyhow::Result<(Arc<dyn HostConnection>, Arc<dyn ContainerRuntime>)> {
    let conn: Arc<dyn HostConnection> = if let Some(vm_name) = &server.local_vm_name {
        Arc::new(LocalVmConnection::new(vm_name.clone())?)
    } else {
        let endpoint = SshEndpoint {
            host: server.ip_address.clone(),
            port: server.ssh.port,
            user: server.ssh.user.clone(),
        };
        Arc::new(SshConnection::new(endpoint, settings.ssh_private_key_path.clone()))
    };

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(SandboxedRuntime::new(
        conn.clone(),
        settings.container_cli.clone(),
        if server.local_vm_name.is_some() { String::new() } else { settings.sandboxed_runtime_class.clone() },
    ));

    Ok((conn, runtime))
}
