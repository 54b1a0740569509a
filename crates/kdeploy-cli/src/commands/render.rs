//! Manifest rendering

use crate::output::{print_document, OutputFormat};
use kdeploy_core::{build_manifest, DeployConfig};

/// Print the manifest `deploy` would submit for `environment`
pub fn execute(config: &DeployConfig, environment: &str, format: OutputFormat) -> anyhow::Result<()> {
    let spec = config.workload_spec(environment)?;
    spec.validate().map_err(anyhow::Error::msg)?;

    print_document(&build_manifest(&spec), format)
}
